//! Error types.
//!
//! [`ConfigError`] covers everything the control side can reject while
//! building tables, profiles and configuration. [`EngineFault`] is the
//! realtime-side diagnostic: it is `Copy` so the audio thread can raise it
//! without allocating, and it never aborts a buffer.

use serde::Serialize;
use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building pattern tables, profiles or engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A table with no segments cannot produce a deterministic output.
    #[error("pattern table is empty")]
    EmptyTable,

    /// Sync segment without a pulse count.
    #[error("segment {index}: sync modulation requires a pulse")]
    MissingPulse {
        /// Segment position in the table.
        index: usize,
    },

    /// Sync segment with a pulse count of zero.
    #[error("segment {index}: pulse count must be at least 1")]
    InvalidPulse {
        /// Segment position in the table.
        index: usize,
    },

    /// Async segment with neither a fixed carrier nor a carrier ratio.
    #[error("segment {index}: async modulation requires carrierFrequency or carrierFrequencyRatio")]
    MissingCarrier {
        /// Segment position in the table.
        index: usize,
    },

    /// Async segment with both a fixed carrier and a carrier ratio.
    #[error("segment {index}: carrierFrequency and carrierFrequencyRatio are mutually exclusive")]
    AmbiguousCarrier {
        /// Segment position in the table.
        index: usize,
    },

    /// Carrier frequency or ratio that is not a positive finite number.
    #[error("segment {index}: invalid carrier value {value}")]
    InvalidCarrier {
        /// Segment position in the table.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// Bound that is negative, non-finite, or below the lower bound.
    #[error("segment {index}: invalid bounds [{lower}, {upper})")]
    InvalidBounds {
        /// Segment position in the table.
        index: usize,
        /// Lower bound.
        lower: f64,
        /// Upper bound (infinite for the `max` sentinel).
        upper: f64,
    },

    /// Invalid engine configuration value.
    #[error("invalid config value '{name}': {message}")]
    InvalidConfig {
        /// Field name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// Lookup of a bundled vehicle profile failed.
    #[error("unknown vehicle profile: {name}")]
    UnknownProfile {
        /// Requested profile name.
        name: String,
    },

    /// JSON decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates an invalid config error.
    pub fn invalid_config(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            name,
            message: message.into(),
        }
    }
}

/// Diagnostic raised by the realtime loop.
///
/// The loop degrades instead of failing: silence for a missing or empty
/// table, the last good carrier for an unresolvable one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EngineFault {
    /// Driving was requested before any table was installed.
    #[error("no modulation pattern table installed")]
    NoPatternTable,

    /// The installed table has no segments.
    #[error("modulation pattern table is empty")]
    EmptyPatternTable,

    /// An async segment produced a carrier frequency that is not usable.
    #[error("segment {segment}: carrier frequency could not be resolved")]
    UnresolvedCarrier {
        /// Segment position in the table.
        segment: usize,
    },
}

impl EngineFault {
    /// Bit used to remember that this fault kind was already reported.
    pub(crate) fn mask(self) -> u8 {
        match self {
            EngineFault::NoPatternTable => 0b001,
            EngineFault::EmptyPatternTable => 0b010,
            EngineFault::UnresolvedCarrier { .. } => 0b100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_helper() {
        let err = ConfigError::invalid_config("sample_rate", "must be positive");
        assert!(err.to_string().contains("sample_rate"));
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_fault_masks_are_distinct() {
        let a = EngineFault::NoPatternTable.mask();
        let b = EngineFault::EmptyPatternTable.mask();
        let c = EngineFault::UnresolvedCarrier { segment: 3 }.mask();
        assert_eq!(a & b, 0);
        assert_eq!(a & c, 0);
        assert_eq!(b & c, 0);
    }

    #[test]
    fn test_fault_serializes_with_kind_tag() {
        let json = serde_json::to_string(&EngineFault::UnresolvedCarrier { segment: 2 }).unwrap();
        assert_eq!(json, r#"{"kind":"unresolvedCarrier","segment":2}"#);
    }
}
