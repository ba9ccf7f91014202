// src/state/pattern.rs
//
// Modulation pattern tables.
//
// A table is an ordered list of frequency segments for one travel
// direction. Tables are immutable once built and are swapped wholesale.
// The serializable schema (`SegmentDef`) is kept separate from the
// strongly typed segment so that validation happens exactly once, on the
// control side.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

// ═══════════════════════════════════════════════════════════════════
// Segment model
// ═══════════════════════════════════════════════════════════════════

/// Upper end of a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpperBound {
    /// Exclusive upper bound in Hz.
    Hz(f64),
    /// Open-ended segment (`"max"`).
    Max,
}

impl UpperBound {
    /// Whether `frequency` lies below this bound.
    #[inline]
    pub fn admits(self, frequency: f64) -> bool {
        match self {
            UpperBound::Hz(upper) => frequency < upper,
            UpperBound::Max => true,
        }
    }

    /// The bound as a number, infinite for `Max`.
    #[inline]
    pub fn value(self) -> f64 {
        match self {
            UpperBound::Hz(upper) => upper,
            UpperBound::Max => f64::INFINITY,
        }
    }
}

/// Pulse count of a synchronous segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
    /// Carrier is `n` times the drive frequency.
    Count(u32),
    /// Three-pulse carrier with a half-cycle shift in the middle third.
    Wide3,
}

impl Pulse {
    /// Carrier cycles per fundamental cycle.
    #[inline]
    pub fn multiplier(self) -> u32 {
        match self {
            Pulse::Count(n) => n,
            Pulse::Wide3 => 3,
        }
    }

    /// Whether this is one-pulse (square-wave) operation.
    #[inline]
    pub fn is_one_pulse(self) -> bool {
        self == Pulse::Count(1)
    }
}

/// Carrier specification of an asynchronous segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CarrierSpec {
    /// Constant carrier frequency in Hz.
    Fixed(f64),
    /// Carrier frequency is `drive × ratio`.
    Ratio(f64),
    /// Carrier sweeps linearly across the segment's frequency range.
    LinearRamp { from: f64, to: f64 },
}

/// Modulation strategy of a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentKind {
    /// No output.
    Mute,
    /// Carrier locked to the drive frequency.
    Sync(Pulse),
    /// Carrier independent of (or loosely tied to) the drive frequency.
    Async(CarrierSpec),
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKind::Mute => write!(f, "mute"),
            SegmentKind::Sync(Pulse::Wide3) => write!(f, "sync wide 3-pulse"),
            SegmentKind::Sync(Pulse::Count(n)) => write!(f, "sync {n}-pulse"),
            SegmentKind::Async(CarrierSpec::Fixed(hz)) => write!(f, "async {hz} Hz"),
            SegmentKind::Async(CarrierSpec::Ratio(ratio)) => write!(f, "async {ratio}x drive"),
            SegmentKind::Async(CarrierSpec::LinearRamp { from, to }) => {
                write!(f, "async {from} to {to} Hz")
            }
        }
    }
}

/// One frequency range governed by a single modulation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "SegmentDef")]
pub struct ModulationSegment {
    pub lower_bound: f64,
    pub upper_bound: UpperBound,
    pub kind: SegmentKind,
}

impl ModulationSegment {
    pub fn mute(lower_bound: f64, upper_bound: UpperBound) -> Self {
        Self {
            lower_bound,
            upper_bound,
            kind: SegmentKind::Mute,
        }
    }

    pub fn sync(lower_bound: f64, upper_bound: UpperBound, pulse: Pulse) -> Self {
        Self {
            lower_bound,
            upper_bound,
            kind: SegmentKind::Sync(pulse),
        }
    }

    pub fn asynchronous(lower_bound: f64, upper_bound: UpperBound, carrier: CarrierSpec) -> Self {
        Self {
            lower_bound,
            upper_bound,
            kind: SegmentKind::Async(carrier),
        }
    }

    /// Width of the segment, infinite when open-ended.
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper_bound.value() - self.lower_bound
    }

    /// Check bounds and carrier values.
    pub fn validate(&self, index: usize) -> ConfigResult<()> {
        let upper = self.upper_bound.value();
        let bounds_ok = self.lower_bound.is_finite()
            && self.lower_bound >= 0.0
            && !upper.is_nan()
            && upper >= self.lower_bound;
        if !bounds_ok {
            return Err(ConfigError::InvalidBounds {
                index,
                lower: self.lower_bound,
                upper,
            });
        }

        match self.kind {
            SegmentKind::Mute => Ok(()),
            SegmentKind::Sync(Pulse::Count(0)) => Err(ConfigError::InvalidPulse { index }),
            SegmentKind::Sync(_) => Ok(()),
            SegmentKind::Async(carrier) => {
                let values = match carrier {
                    CarrierSpec::Fixed(hz) => [hz, hz],
                    CarrierSpec::Ratio(ratio) => [ratio, ratio],
                    CarrierSpec::LinearRamp { from, to } => [from, to],
                };
                match values.into_iter().find(|v| !(v.is_finite() && *v > 0.0)) {
                    Some(value) => Err(ConfigError::InvalidCarrier { index, value }),
                    None => Ok(()),
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Serializable schema
// ═══════════════════════════════════════════════════════════════════

/// Serialized form of a segment.
///
/// Field aliases accept the short names used by older pattern data
/// (`from`, `to`, `type`, `carrierFreq`, `carrierFreqRatio`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDef {
    #[serde(alias = "from")]
    pub lower_bound: f64,

    #[serde(alias = "to")]
    pub upper_bound: BoundDef,

    #[serde(alias = "type")]
    pub kind: KindTag,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<PulseDef>,

    #[serde(default, alias = "carrierFreq", skip_serializing_if = "Option::is_none")]
    pub carrier_frequency: Option<CarrierFrequencyDef>,

    #[serde(default, alias = "carrierFreqRatio", skip_serializing_if = "Option::is_none")]
    pub carrier_frequency_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundDef {
    Hz(f64),
    Sentinel(MaxTag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxTag {
    #[serde(rename = "max")]
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindTag {
    Mute,
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PulseDef {
    Count(u32),
    Named(PulseName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PulseName {
    #[serde(rename = "wide3", alias = "wide_3")]
    Wide3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CarrierFrequencyDef {
    Fixed(f64),
    Ramp { from: f64, to: f64 },
}

impl SegmentDef {
    /// Convert to a typed segment, validating it.
    ///
    /// `index` is only used to label errors.
    pub fn into_segment(self, index: usize) -> ConfigResult<ModulationSegment> {
        let kind = match self.kind {
            KindTag::Mute => SegmentKind::Mute,
            KindTag::Sync => match self.pulse {
                None => return Err(ConfigError::MissingPulse { index }),
                Some(PulseDef::Count(n)) => SegmentKind::Sync(Pulse::Count(n)),
                Some(PulseDef::Named(PulseName::Wide3)) => SegmentKind::Sync(Pulse::Wide3),
            },
            KindTag::Async => match (self.carrier_frequency, self.carrier_frequency_ratio) {
                (None, None) => return Err(ConfigError::MissingCarrier { index }),
                (Some(_), Some(_)) => return Err(ConfigError::AmbiguousCarrier { index }),
                (Some(CarrierFrequencyDef::Fixed(hz)), None) => {
                    SegmentKind::Async(CarrierSpec::Fixed(hz))
                }
                (Some(CarrierFrequencyDef::Ramp { from, to }), None) => {
                    SegmentKind::Async(CarrierSpec::LinearRamp { from, to })
                }
                (None, Some(ratio)) => SegmentKind::Async(CarrierSpec::Ratio(ratio)),
            },
        };

        let upper_bound = match self.upper_bound {
            BoundDef::Hz(hz) => UpperBound::Hz(hz),
            BoundDef::Sentinel(MaxTag::Max) => UpperBound::Max,
        };

        let segment = ModulationSegment {
            lower_bound: self.lower_bound,
            upper_bound,
            kind,
        };
        segment.validate(index)?;
        Ok(segment)
    }
}

impl From<ModulationSegment> for SegmentDef {
    fn from(segment: ModulationSegment) -> Self {
        let upper_bound = match segment.upper_bound {
            UpperBound::Hz(hz) => BoundDef::Hz(hz),
            UpperBound::Max => BoundDef::Sentinel(MaxTag::Max),
        };
        let mut def = SegmentDef {
            lower_bound: segment.lower_bound,
            upper_bound,
            kind: KindTag::Mute,
            pulse: None,
            carrier_frequency: None,
            carrier_frequency_ratio: None,
        };
        match segment.kind {
            SegmentKind::Mute => {}
            SegmentKind::Sync(pulse) => {
                def.kind = KindTag::Sync;
                def.pulse = Some(match pulse {
                    Pulse::Count(n) => PulseDef::Count(n),
                    Pulse::Wide3 => PulseDef::Named(PulseName::Wide3),
                });
            }
            SegmentKind::Async(carrier) => {
                def.kind = KindTag::Async;
                match carrier {
                    CarrierSpec::Fixed(hz) => {
                        def.carrier_frequency = Some(CarrierFrequencyDef::Fixed(hz))
                    }
                    CarrierSpec::LinearRamp { from, to } => {
                        def.carrier_frequency = Some(CarrierFrequencyDef::Ramp { from, to })
                    }
                    CarrierSpec::Ratio(ratio) => def.carrier_frequency_ratio = Some(ratio),
                }
            }
        }
        def
    }
}

// ═══════════════════════════════════════════════════════════════════
// Table
// ═══════════════════════════════════════════════════════════════════

/// Immutable, shared list of segments for one travel direction.
///
/// Cloning shares the segment storage, so handing a table to the audio
/// thread never copies or allocates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SegmentDef>", into = "Vec<SegmentDef>")]
pub struct PatternTable {
    segments: Arc<[ModulationSegment]>,
    /// Lower bound of the first one-pulse segment, if any.
    full_voltage_frequency: Option<f64>,
}

impl PatternTable {
    /// Build a table from typed segments.
    ///
    /// Every segment is validated. An empty list is accepted here; the
    /// resolver reports it when the table is actually used.
    pub fn new(segments: Vec<ModulationSegment>) -> ConfigResult<Self> {
        for (index, segment) in segments.iter().enumerate() {
            segment.validate(index)?;
        }
        let full_voltage_frequency = segments
            .iter()
            .find(|s| matches!(s.kind, SegmentKind::Sync(p) if p.is_one_pulse()))
            .map(|s| s.lower_bound);

        Ok(Self {
            segments: segments.into(),
            full_voltage_frequency,
        })
    }

    /// Build a table from the serialized schema.
    pub fn from_defs(defs: Vec<SegmentDef>) -> ConfigResult<Self> {
        let segments = defs
            .into_iter()
            .enumerate()
            .map(|(index, def)| def.into_segment(index))
            .collect::<ConfigResult<Vec<_>>>()?;
        Self::new(segments)
    }

    /// Parse a JSON array of segments.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let defs: Vec<SegmentDef> = serde_json::from_str(json)?;
        Self::from_defs(defs)
    }

    #[inline]
    pub fn segments(&self) -> &[ModulationSegment] {
        &self.segments
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&ModulationSegment> {
        self.segments.get(index)
    }

    /// Drive frequency at which one-pulse operation (full voltage) begins.
    #[inline]
    pub fn full_voltage_frequency(&self) -> Option<f64> {
        self.full_voltage_frequency
    }

    /// Whether both tables share the same storage.
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.segments, &b.segments)
    }

    /// Report authoring hazards.
    ///
    /// Resolution is first-match-wins on the upper bound, so a badly
    /// ordered table still resolves; it just silently shadows segments.
    /// Nothing here changes the table.
    pub fn audit(&self) -> Vec<TableIssue> {
        let mut issues = Vec::new();
        let Some(first) = self.segments.first() else {
            issues.push(TableIssue::Empty);
            return issues;
        };
        if first.lower_bound > 0.0 {
            issues.push(TableIssue::DoesNotStartAtZero {
                lower: first.lower_bound,
            });
        }

        let last = self.segments.len() - 1;
        let mut reach = f64::NEG_INFINITY;
        for (index, segment) in self.segments.iter().enumerate() {
            let upper = segment.upper_bound.value();

            if index > 0 {
                let previous = self.segments[index - 1].upper_bound.value();
                if segment.lower_bound > previous {
                    issues.push(TableIssue::Gap {
                        index,
                        from: previous,
                        to: segment.lower_bound,
                    });
                } else if segment.lower_bound < previous {
                    issues.push(TableIssue::Overlap {
                        index,
                        lower: segment.lower_bound,
                        previous_upper: previous,
                    });
                }

                let fallback_only = index == last && reach.is_finite();
                if upper <= reach && !fallback_only {
                    issues.push(TableIssue::Shadowed { index });
                }
            }

            if segment.upper_bound == UpperBound::Max && index != last {
                issues.push(TableIssue::UnboundedNotLast { index });
            }
            reach = reach.max(upper);
        }
        issues
    }
}

impl TryFrom<Vec<SegmentDef>> for PatternTable {
    type Error = ConfigError;

    fn try_from(defs: Vec<SegmentDef>) -> ConfigResult<Self> {
        Self::from_defs(defs)
    }
}

impl From<PatternTable> for Vec<SegmentDef> {
    fn from(table: PatternTable) -> Self {
        table.segments.iter().copied().map(SegmentDef::from).collect()
    }
}

/// Authoring hazard found by [`PatternTable::audit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableIssue {
    Empty,
    DoesNotStartAtZero { lower: f64 },
    Gap { index: usize, from: f64, to: f64 },
    Overlap { index: usize, lower: f64, previous_upper: f64 },
    /// The segment can never be selected.
    Shadowed { index: usize },
    UnboundedNotLast { index: usize },
}

impl fmt::Display for TableIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableIssue::Empty => write!(f, "table has no segments"),
            TableIssue::DoesNotStartAtZero { lower } => {
                write!(f, "first segment starts at {lower} Hz instead of 0")
            }
            TableIssue::Gap { index, from, to } => {
                write!(f, "segment {index}: gap between {from} Hz and {to} Hz")
            }
            TableIssue::Overlap {
                index,
                lower,
                previous_upper,
            } => write!(
                f,
                "segment {index}: starts at {lower} Hz, below previous upper bound {previous_upper} Hz"
            ),
            TableIssue::Shadowed { index } => {
                write!(f, "segment {index}: unreachable under first-match resolution")
            }
            TableIssue::UnboundedNotLast { index } => {
                write!(f, "segment {index}: open-ended segment is not last")
            }
        }
    }
}
