// Modulation-index shaping.

use serde::{Deserialize, Serialize};

use crate::state::SegmentKind;

/// How the signal amplitude is derived from the drive frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AmplitudeLaw {
    /// Each segment scales by drive over its own carrier frequency.
    #[default]
    PerSegment,
    /// Amplitude rises linearly with the drive frequency and reaches 1 where
    /// one-pulse operation begins. Continuous across segment boundaries.
    VoltsPerHertz,
}

pub struct AmplitudeShaper {
    law: AmplitudeLaw,
}

impl AmplitudeShaper {
    pub fn new(law: AmplitudeLaw) -> Self {
        Self { law }
    }

    /// Scale factor in `[0, 1]` for the three signal phases.
    ///
    /// `full_voltage_frequency` is the table's one-pulse entry point; tables
    /// without one fall back to the per-segment law.
    #[inline]
    pub fn amplitude(
        &self,
        kind: SegmentKind,
        drive: f64,
        carrier_frequency: f64,
        full_voltage_frequency: Option<f64>,
    ) -> f64 {
        if kind == SegmentKind::Mute {
            return 0.0;
        }
        match (self.law, full_voltage_frequency) {
            (AmplitudeLaw::VoltsPerHertz, Some(full)) if full > 0.0 => {
                (drive / full).clamp(0.0, 1.0)
            }
            (AmplitudeLaw::VoltsPerHertz, Some(_)) => 1.0,
            _ => per_segment(kind, drive, carrier_frequency),
        }
    }
}

fn per_segment(kind: SegmentKind, drive: f64, carrier_frequency: f64) -> f64 {
    match kind {
        SegmentKind::Mute => 0.0,
        SegmentKind::Async(_) if carrier_frequency > 0.0 => {
            (drive / carrier_frequency).clamp(0.0, 1.0)
        }
        SegmentKind::Async(_) => 1.0,
        SegmentKind::Sync(pulse) if pulse.is_one_pulse() => 1.0,
        SegmentKind::Sync(pulse) => {
            let effective = drive * f64::from(pulse.multiplier());
            if drive < effective {
                (drive / effective).clamp(0.0, 1.0)
            } else {
                1.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CarrierSpec, ModulationSegment, PatternTable, Pulse, UpperBound};

    const ASYNC_400: SegmentKind = SegmentKind::Async(CarrierSpec::Fixed(400.0));

    fn amplitude_at(shaper: &AmplitudeShaper, table: &PatternTable, drive: f64) -> f64 {
        let resolved = table.resolve(drive).unwrap();
        let carrier = match resolved.segment.kind {
            SegmentKind::Async(CarrierSpec::Fixed(hz)) => hz,
            SegmentKind::Sync(pulse) => pulse.carrier_frequency(drive),
            _ => 0.0,
        };
        shaper.amplitude(resolved.segment.kind, drive, carrier, table.full_voltage_frequency())
    }

    #[test]
    fn test_per_segment_law() {
        let shaper = AmplitudeShaper::new(AmplitudeLaw::PerSegment);
        assert_eq!(shaper.amplitude(SegmentKind::Mute, 30.0, 0.0, None), 0.0);
        assert_eq!(shaper.amplitude(ASYNC_400, 100.0, 400.0, None), 0.25);
        assert_eq!(shaper.amplitude(ASYNC_400, 800.0, 400.0, None), 1.0);
        assert_eq!(shaper.amplitude(ASYNC_400, 10.0, 0.0, None), 1.0);
        assert_eq!(
            shaper.amplitude(SegmentKind::Sync(Pulse::Count(1)), 45.0, 45.0, Some(40.0)),
            1.0
        );

        let a = shaper.amplitude(SegmentKind::Sync(Pulse::Count(9)), 30.0, 270.0, None);
        assert!((a - 1.0 / 9.0).abs() < 1e-12);
        let wide = shaper.amplitude(SegmentKind::Sync(Pulse::Wide3), 39.0, 117.0, None);
        assert!((wide - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_volts_per_hertz_is_continuous_into_one_pulse() {
        let table = PatternTable::new(vec![
            ModulationSegment::asynchronous(0.0, UpperBound::Hz(20.0), CarrierSpec::Fixed(400.0)),
            ModulationSegment::sync(20.0, UpperBound::Hz(35.0), Pulse::Count(9)),
            ModulationSegment::sync(35.0, UpperBound::Hz(40.0), Pulse::Wide3),
            ModulationSegment::sync(40.0, UpperBound::Max, Pulse::Count(1)),
        ])
        .unwrap();
        let shaper = AmplitudeShaper::new(AmplitudeLaw::VoltsPerHertz);

        for boundary in [20.0, 35.0, 40.0] {
            let below = amplitude_at(&shaper, &table, boundary - 1e-6);
            let above = amplitude_at(&shaper, &table, boundary + 1e-6);
            assert!((below - above).abs() < 1e-6, "jump at {boundary}: {below} -> {above}");
        }
        assert_eq!(amplitude_at(&shaper, &table, 40.0), 1.0);
        assert_eq!(amplitude_at(&shaper, &table, 10.0), 0.25);
    }

    #[test]
    fn test_volts_per_hertz_without_one_pulse_falls_back() {
        let shaper = AmplitudeShaper::new(AmplitudeLaw::VoltsPerHertz);
        assert_eq!(shaper.amplitude(ASYNC_400, 100.0, 400.0, None), 0.25);
        assert_eq!(shaper.amplitude(SegmentKind::Mute, 100.0, 0.0, Some(40.0)), 0.0);
        assert_eq!(
            shaper.amplitude(SegmentKind::Sync(Pulse::Count(1)), 5.0, 5.0, Some(0.0)),
            1.0
        );
    }
}
