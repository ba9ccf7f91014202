// src/config.rs
//
// Engine configuration.
//
// Everything the realtime side needs to know up front: the sample rate,
// output scaling, the amplitude law and the queue capacities of the bridge.
// Missing JSON fields fall back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::modulator::AmplitudeLaw;

pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;
/// Minimum audio-clock time between two waveform snapshots, in seconds.
pub const DEFAULT_TELEMETRY_INTERVAL: f64 = 0.016;
pub const DEFAULT_OUTPUT_GAIN: f32 = 0.1;
pub const DEFAULT_LINE_RESISTANCE: f64 = 1.0;
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;
pub const DEFAULT_MESSAGE_CAPACITY: usize = 256;
pub const DEFAULT_RETIRE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub telemetry_interval: f64,

    /// Trim applied to the line signal before it is written out.
    pub output_gain: f32,

    /// Divisor of the line-current proxy.
    pub line_resistance: f64,

    pub amplitude_law: AmplitudeLaw,

    /// Control updates in flight towards the engine.
    pub command_capacity: usize,
    /// Engine messages in flight towards the control side.
    pub message_capacity: usize,
    /// Replaced tables in flight back to the control side.
    pub retire_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            output_gain: DEFAULT_OUTPUT_GAIN,
            line_resistance: DEFAULT_LINE_RESISTANCE,
            amplitude_law: AmplitudeLaw::default(),
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            retire_capacity: DEFAULT_RETIRE_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_amplitude_law(mut self, law: AmplitudeLaw) -> Self {
        self.amplitude_law = law;
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::invalid_config(
                "sampleRate",
                format!("must be positive, got {}", self.sample_rate),
            ));
        }
        if !(self.telemetry_interval.is_finite() && self.telemetry_interval >= 0.0) {
            return Err(ConfigError::invalid_config(
                "telemetryInterval",
                format!("must be non-negative, got {}", self.telemetry_interval),
            ));
        }
        if !self.output_gain.is_finite() {
            return Err(ConfigError::invalid_config("outputGain", "must be finite"));
        }
        if !(self.line_resistance.is_finite() && self.line_resistance > 0.0) {
            return Err(ConfigError::invalid_config(
                "lineResistance",
                format!("must be positive, got {}", self.line_resistance),
            ));
        }
        let capacities = [
            ("commandCapacity", self.command_capacity),
            ("messageCapacity", self.message_capacity),
            ("retireCapacity", self.retire_capacity),
        ];
        for (name, capacity) in capacities {
            if capacity == 0 {
                return Err(ConfigError::invalid_config(name, "must be at least 1"));
            }
        }
        Ok(())
    }

    /// Highest drive frequency the engine accepts.
    #[inline]
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }
}
