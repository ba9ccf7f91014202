// src/state/profile.rs
//
// Vehicle profiles.
//
// A profile is literal configuration data: notch counts, the speed to
// drive-frequency scale and one pattern table per travel direction. The
// bundled profiles are JSON assets compiled into the crate.

use serde::{Deserialize, Serialize};

use super::{Direction, HandlePosition, PatternTable};
use crate::error::{ConfigError, ConfigResult};

const BUILTIN_PROFILES: &[(&str, &str)] = &[
    (
        "seibu-6000",
        include_str!("../../assets/profiles/seibu-6000.json"),
    ),
    ("e231-500", include_str!("../../assets/profiles/e231-500.json")),
];

/// Physical parameters used on the control side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalSpec {
    pub power_notches: u8,
    pub brake_notches: u8,

    /// Top speed in km/h.
    pub max_speed: f64,

    /// Drive frequency at top speed in Hz.
    pub max_frequency: f64,
}

/// Pattern tables for both travel directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalPatterns {
    pub accel: PatternTable,
    pub decel: PatternTable,
}

/// A complete vehicle definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleProfile {
    pub name: String,
    pub physical: PhysicalSpec,
    pub modulation_patterns: DirectionalPatterns,
}

impl VehicleProfile {
    /// Parse and validate a profile.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let profile: VehicleProfile = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Load one of the bundled profiles by key.
    pub fn builtin(key: &str) -> ConfigResult<Self> {
        let (_, json) = BUILTIN_PROFILES
            .iter()
            .find(|(name, _)| *name == key)
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: key.to_string(),
            })?;
        Self::from_json(json)
    }

    /// Keys of the bundled profiles.
    pub fn builtin_keys() -> impl Iterator<Item = &'static str> {
        BUILTIN_PROFILES.iter().map(|(name, _)| *name)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let physical = &self.physical;
        if !(physical.max_speed.is_finite() && physical.max_speed > 0.0) {
            return Err(ConfigError::invalid_config(
                "maxSpeed",
                format!("must be positive, got {}", physical.max_speed),
            ));
        }
        if !(physical.max_frequency.is_finite() && physical.max_frequency > 0.0) {
            return Err(ConfigError::invalid_config(
                "maxFrequency",
                format!("must be positive, got {}", physical.max_frequency),
            ));
        }
        if self.modulation_patterns.accel.is_empty() || self.modulation_patterns.decel.is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        Ok(())
    }

    /// Table for a travel direction.
    pub fn table_for(&self, direction: Direction) -> &PatternTable {
        match direction {
            Direction::Accelerating => &self.modulation_patterns.accel,
            Direction::Braking => &self.modulation_patterns.decel,
        }
    }

    /// Drive frequency for a vehicle speed in km/h.
    pub fn drive_frequency(&self, speed_kmh: f64) -> f64 {
        let speed = if speed_kmh.is_nan() {
            0.0
        } else {
            speed_kmh.clamp(0.0, self.physical.max_speed)
        };
        speed / self.physical.max_speed * self.physical.max_frequency
    }

    /// The emergency-brake position, one past the last service brake notch.
    pub fn emergency_brake(&self) -> HandlePosition {
        HandlePosition::Notch(-(i32::from(self.physical.brake_notches) + 1))
    }

    /// Clamp a handle position to the notches this vehicle has.
    pub fn clamp_handle(&self, handle: HandlePosition) -> HandlePosition {
        let lowest = self.emergency_brake().index();
        let highest = i32::from(self.physical.power_notches);
        HandlePosition::from_index(handle.index().clamp(lowest, highest))
    }
}
