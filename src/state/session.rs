// src/state/session.rs
//
// Driver-facing state.
//
// `Session` is the control-side mirror: the selected vehicle, the handle
// and the current speed. `ControlInputs` is the engine-side copy, only ever
// changed by applying a `ControlUpdate` at a buffer boundary.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use super::{ControlUpdate, PatternTable, VehicleProfile};

/// Driver's brake/power handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlePosition {
    /// Coasting. The inverter is off.
    #[default]
    Neutral,
    /// Power notch when positive, brake notch when negative.
    Notch(i32),
}

impl HandlePosition {
    /// Build from a signed notch index. `0` is neutral.
    pub fn from_index(index: i32) -> Self {
        if index == 0 {
            HandlePosition::Neutral
        } else {
            HandlePosition::Notch(index)
        }
    }

    #[inline]
    pub fn index(self) -> i32 {
        match self {
            HandlePosition::Neutral => 0,
            HandlePosition::Notch(index) => index,
        }
    }

    #[inline]
    pub fn is_neutral(self) -> bool {
        self.index() == 0
    }

    /// Braking notches select the deceleration table.
    #[inline]
    pub fn direction(self) -> Direction {
        if self.index() < 0 {
            Direction::Braking
        } else {
            Direction::Accelerating
        }
    }
}

impl Serialize for HandlePosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HandlePosition::Neutral => serializer.serialize_str("N"),
            HandlePosition::Notch(index) => serializer.serialize_i32(*index),
        }
    }
}

impl<'de> Deserialize<'de> for HandlePosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Index(i32),
            Label(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Index(index) => Ok(HandlePosition::from_index(index)),
            Repr::Label(label) if label == "N" => Ok(HandlePosition::Neutral),
            Repr::Label(label) => Err(de::Error::invalid_value(
                de::Unexpected::Str(&label),
                &"a notch index or \"N\"",
            )),
        }
    }
}

/// Travel direction, selects which pattern table is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    #[default]
    Accelerating,
    Braking,
}

/// Clamp a speed/frequency input into `[0, max]`. NaN becomes 0.
#[inline]
pub fn sanitize_speed(speed: f64, max: f64) -> f64 {
    if speed.is_nan() {
        0.0
    } else {
        speed.clamp(0.0, max)
    }
}

/// Inputs the realtime loop acts on.
#[derive(Debug, Clone, Default)]
pub struct ControlInputs {
    pub handle: HandlePosition,

    /// Drive-frequency target in Hz (the frequency axis of the tables).
    pub speed: f64,

    pub patterns: Option<PatternTable>,
}

impl ControlInputs {
    /// Neutral handle or a stationary vehicle.
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.handle.is_neutral() || self.speed == 0.0
    }

    /// Apply a partial update. Returns the table it replaced, if any.
    pub fn apply(&mut self, update: ControlUpdate, max_speed: f64) -> Option<PatternTable> {
        if let Some(handle) = update.handle_position {
            self.handle = handle;
        }
        if let Some(speed) = update.speed {
            self.speed = sanitize_speed(speed, max_speed);
        }
        match update.modulation_patterns {
            Some(table) => self.patterns.replace(table),
            None => None,
        }
    }
}

/// Control-side session state.
#[derive(Debug, Clone)]
pub struct Session {
    /// Selected vehicle.
    pub profile: VehicleProfile,

    /// Current handle position (already clamped to the profile).
    pub handle: HandlePosition,

    /// Drive-frequency target in Hz.
    pub speed: f64,

    /// Direction whose table was last sent to the engine.
    pub direction: Direction,
}

impl Session {
    pub fn new(profile: VehicleProfile) -> Self {
        Self {
            profile,
            handle: HandlePosition::Neutral,
            speed: 0.0,
            direction: Direction::Accelerating,
        }
    }

    /// Table matching the current direction.
    pub fn active_table(&self) -> &PatternTable {
        self.profile.table_for(self.direction)
    }

    /// Update carrying the complete state.
    pub fn full_update(&self) -> ControlUpdate {
        ControlUpdate {
            handle_position: Some(self.handle),
            speed: Some(self.speed),
            modulation_patterns: Some(self.active_table().clone()),
        }
    }
}

/// Read-only engine status for display.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineReadback {
    /// Frames rendered since the engine was created.
    pub frames_rendered: u64,

    /// Drive frequency at the end of the last buffer.
    pub drive_frequency: f64,

    /// Whether the last buffer was driving (not silent).
    pub driving: bool,

    /// Messages dropped because the control side fell behind.
    pub dropped_messages: u64,
}
