// src/telemetry.rs
//
// Throttled waveform snapshots for visualization.
//
// Timing follows the audio clock (frames rendered / sample rate), not the
// wall clock, so the spacing does not depend on the host's buffer size.

use serde::Serialize;

use crate::state::ModulationSegment;

/// Values of one rendered sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformSnapshot {
    pub signal_u: f64,
    pub signal_v: f64,
    pub signal_w: f64,
    pub line_signal: f64,
    pub carrier_value: f64,
    /// `None` while silent.
    pub active_segment: Option<ModulationSegment>,
    pub drive_frequency: f64,
    pub carrier_frequency: f64,
    pub amplitude: f64,
}

impl WaveformSnapshot {
    /// The all-zero snapshot reported while silent.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn is_silent(&self) -> bool {
        self.active_segment.is_none()
    }
}

/// Decides when the next snapshot is due.
pub struct TelemetryPublisher {
    interval: f64,
    last_emit: f64,
}

impl TelemetryPublisher {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            last_emit: 0.0,
        }
    }

    /// Returns `true` (and restarts the interval) when more than one
    /// interval has elapsed at audio time `now`.
    #[inline]
    pub fn poll(&mut self, now: f64) -> bool {
        if now - self.last_emit > self.interval {
            self.last_emit = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_greater_than_interval() {
        let mut publisher = TelemetryPublisher::new(0.016);
        assert!(!publisher.poll(0.016));
        assert!(publisher.poll(0.017));
        assert!(!publisher.poll(0.030));
        assert!(publisher.poll(0.040));
    }

    #[test]
    fn test_silent_snapshot() {
        let snapshot = WaveformSnapshot::silent();
        assert!(snapshot.is_silent());
        assert_eq!(snapshot.line_signal, 0.0);
    }
}
