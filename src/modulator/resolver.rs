// Frequency to segment lookup.

use crate::error::{ConfigError, ConfigResult};
use crate::state::{ModulationSegment, PatternTable};

/// A segment together with its position in the table.
///
/// The position is what identifies the segment: two segments with equal
/// contents at different positions are still different segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSegment {
    pub index: usize,
    pub segment: ModulationSegment,
}

/// Find the segment governing `frequency`.
///
/// The first segment whose upper bound admits the frequency wins. When
/// none does, the last segment applies. Lower bounds are not consulted.
pub fn resolve(table: &PatternTable, frequency: f64) -> ConfigResult<ResolvedSegment> {
    let segments = table.segments();
    let index = segments
        .iter()
        .position(|s| s.upper_bound.admits(frequency))
        .or_else(|| segments.len().checked_sub(1))
        .ok_or(ConfigError::EmptyTable)?;

    Ok(ResolvedSegment {
        index,
        segment: segments[index],
    })
}

impl PatternTable {
    /// See [`resolve`].
    #[inline]
    pub fn resolve(&self, frequency: f64) -> ConfigResult<ResolvedSegment> {
        resolve(self, frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CarrierSpec, Pulse, SegmentKind, UpperBound};

    fn two_segment_table() -> PatternTable {
        PatternTable::new(vec![
            ModulationSegment::asynchronous(0.0, UpperBound::Hz(20.0), CarrierSpec::Fixed(400.0)),
            ModulationSegment::sync(20.0, UpperBound::Max, Pulse::Count(1)),
        ])
        .unwrap()
    }

    #[test]
    fn test_boundary_between_async_and_sync() {
        let table = two_segment_table();

        let below = table.resolve(19.99).unwrap();
        assert_eq!(below.index, 0);
        assert_eq!(below.segment.kind, SegmentKind::Async(CarrierSpec::Fixed(400.0)));

        let at = table.resolve(20.0).unwrap();
        assert_eq!(at.index, 1, "upper bounds are exclusive");

        let above = table.resolve(20.01).unwrap();
        assert_eq!(above.segment.kind, SegmentKind::Sync(Pulse::Count(1)));
    }

    #[test]
    fn test_every_frequency_resolves() {
        let table = two_segment_table();
        for step in 0..2_000 {
            let f = step as f64 * 0.37;
            assert!(table.resolve(f).is_ok(), "no segment for {f}");
        }
        assert_eq!(table.resolve(f64::INFINITY).unwrap().index, 1);
    }

    #[test]
    fn test_falls_back_to_last_segment() {
        let table = PatternTable::new(vec![
            ModulationSegment::mute(0.0, UpperBound::Hz(10.0)),
            ModulationSegment::sync(10.0, UpperBound::Hz(30.0), Pulse::Count(9)),
        ])
        .unwrap();
        assert_eq!(table.resolve(55.0).unwrap().index, 1);
    }

    #[test]
    fn test_first_match_wins() {
        let table = PatternTable::new(vec![
            ModulationSegment::sync(40.0, UpperBound::Max, Pulse::Count(1)),
            ModulationSegment::mute(0.0, UpperBound::Hz(40.0)),
        ])
        .unwrap();
        assert_eq!(table.resolve(5.0).unwrap().index, 0);
    }

    #[test]
    fn test_empty_table() {
        let err = PatternTable::default().resolve(10.0).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTable));
    }
}
