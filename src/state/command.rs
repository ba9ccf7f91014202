// Messages between the control context and the realtime engine.
//
// `ControlUpdate` is the ONLY way the control side can change what the
// engine renders. Updates are queued, drained at the start of a buffer and
// applied atomically. `EngineMessage` flows the other way.

use serde::{Deserialize, Serialize};

use super::{HandlePosition, PatternTable};
use crate::error::EngineFault;
use crate::telemetry::WaveformSnapshot;

/// Partial update of the engine's control inputs.
///
/// Only the fields that changed are present. When several updates are
/// merged, the newest value of each field wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_position: Option<HandlePosition>,

    /// Drive-frequency target in Hz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    /// Replacement table for the active direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulation_patterns: Option<PatternTable>,
}

impl ControlUpdate {
    pub fn with_handle(mut self, handle: HandlePosition) -> Self {
        self.handle_position = Some(handle);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_patterns(mut self, table: PatternTable) -> Self {
        self.modulation_patterns = Some(table);
        self
    }

    /// Parse a JSON message such as `{"handlePosition": "N", "speed": 0}`.
    pub fn from_json(json: &str) -> crate::error::ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.handle_position.is_none() && self.speed.is_none() && self.modulation_patterns.is_none()
    }

    /// Fold a newer update into this one.
    pub fn merge(&mut self, newer: ControlUpdate) {
        if newer.handle_position.is_some() {
            self.handle_position = newer.handle_position;
        }
        if newer.speed.is_some() {
            self.speed = newer.speed;
        }
        if newer.modulation_patterns.is_some() {
            self.modulation_patterns = newer.modulation_patterns;
        }
    }
}

/// Message from the realtime engine to the control context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EngineMessage {
    /// Sent exactly once when the engine is created.
    Ready,

    /// Throttled waveform snapshot for visualization.
    Waveform(WaveformSnapshot),

    /// Configuration fault, reported once per installed table.
    Fault(EngineFault),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_last_write_wins() {
        let mut pending = ControlUpdate::default()
            .with_handle(HandlePosition::Notch(1))
            .with_speed(10.0);
        pending.merge(ControlUpdate::default().with_speed(12.5));
        pending.merge(ControlUpdate::default().with_handle(HandlePosition::Neutral));

        assert_eq!(
            pending,
            ControlUpdate {
                handle_position: Some(HandlePosition::Neutral),
                speed: Some(12.5),
                modulation_patterns: None,
            }
        );
    }

    #[test]
    fn test_parse_control_message() {
        let update = ControlUpdate::from_json(
            r#"{"handlePosition": -3, "speed": 41.5,
                "modulationPatterns": [{"from": 0, "to": "max", "type": "sync", "pulse": 1}]}"#,
        )
        .unwrap();

        assert_eq!(update.handle_position, Some(HandlePosition::Notch(-3)));
        assert_eq!(update.speed, Some(41.5));
        assert_eq!(update.modulation_patterns.map(|t| t.len()), Some(1));

        let partial = ControlUpdate::from_json(r#"{"handlePosition": "N"}"#).unwrap();
        assert_eq!(partial.handle_position, Some(HandlePosition::Neutral));
        assert!(partial.speed.is_none());
        assert!(!partial.is_empty());
        assert!(ControlUpdate::from_json("{}").unwrap().is_empty());
    }

    #[test]
    fn test_engine_message_wire_format() {
        let ready = serde_json::to_value(EngineMessage::Ready).unwrap();
        assert_eq!(ready, serde_json::json!({"type": "ready"}));

        let waveform = serde_json::to_value(EngineMessage::Waveform(WaveformSnapshot::silent())).unwrap();
        assert_eq!(waveform["type"], "waveform");
        assert_eq!(waveform["data"]["activeSegment"], serde_json::Value::Null);
        assert_eq!(waveform["data"]["lineSignal"], 0.0);

        let fault = serde_json::to_value(EngineMessage::Fault(EngineFault::EmptyPatternTable)).unwrap();
        assert_eq!(fault, serde_json::json!({"type": "fault", "data": {"kind": "emptyPatternTable"}}));
    }
}
