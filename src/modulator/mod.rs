// src/modulator/mod.rs
//
// Per-sample synthesis chain: resolve the segment, advance the signal,
// derive the carrier, shape the amplitude, compare.
//
// The modulator owns both phase accumulators. It never allocates and never
// fails a buffer: problems come back as `EngineFault` values the caller
// turns into silence and a one-off report.

mod amplitude;
mod carrier;
mod pwm;
mod resolver;
mod signal;

pub use amplitude::{AmplitudeLaw, AmplitudeShaper};
pub use carrier::{CarrierOscillator, SegmentKey, UnresolvedCarrier};
pub use pwm::{PwmEncoder, PwmSample};
pub use resolver::ResolvedSegment;
pub use signal::SignalOscillator;

use crate::config::EngineConfig;
use crate::error::EngineFault;
use crate::state::PatternTable;

/// Phase accumulators carried from one sample (and buffer) to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OscillatorState {
    pub signal_phase: f64,
    pub carrier_phase: f64,
}

/// Everything computed for one driving sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulatorFrame {
    pub segment: ResolvedSegment,
    /// Unshaped U, V, W.
    pub signals: [f64; 3],
    pub amplitude: f64,
    pub carrier: f64,
    pub carrier_frequency: f64,
    pub pwm: PwmSample,
    /// Raised when the sample was produced in a degraded way.
    pub fault: Option<EngineFault>,
}

pub struct Modulator {
    signal: SignalOscillator,
    carrier: CarrierOscillator,
    shaper: AmplitudeShaper,
    encoder: PwmEncoder,
}

impl Modulator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            signal: SignalOscillator::new(config.sample_rate),
            carrier: CarrierOscillator::new(config.sample_rate),
            shaper: AmplitudeShaper::new(config.amplitude_law),
            encoder: PwmEncoder::new(config.line_resistance, config.output_gain),
        }
    }

    /// Render one sample at drive frequency `drive`.
    ///
    /// `generation` identifies the installed table so that a replacement
    /// table restarts the carrier even when the segment index is unchanged.
    /// `drive_step` is the planned drive motion since the previous sample.
    /// An empty table leaves both phases untouched. An unresolvable carrier
    /// with nothing to fall back on still advances the signal.
    #[inline]
    pub fn tick(
        &mut self,
        table: &PatternTable,
        generation: u64,
        drive: f64,
        drive_step: f64,
    ) -> Result<ModulatorFrame, EngineFault> {
        let resolved = table
            .resolve(drive)
            .map_err(|_| EngineFault::EmptyPatternTable)?;
        let key = SegmentKey {
            generation,
            index: resolved.index,
        };

        let signal_phase = self.signal.advance(drive);
        let carrier = self
            .carrier
            .next(key, &resolved.segment, drive, drive_step, signal_phase)
            .map_err(|UnresolvedCarrier| EngineFault::UnresolvedCarrier {
                segment: resolved.index,
            })?;

        let signals = self.signal.three_phase();
        let amplitude = self.shaper.amplitude(
            resolved.segment.kind,
            drive,
            carrier.frequency,
            table.full_voltage_frequency(),
        );
        let pwm = self
            .encoder
            .encode(signals.map(|s| s * amplitude), carrier.value);

        Ok(ModulatorFrame {
            segment: resolved,
            signals,
            amplitude,
            carrier: carrier.value,
            carrier_frequency: carrier.frequency,
            pwm,
            fault: carrier.substituted.then_some(EngineFault::UnresolvedCarrier {
                segment: resolved.index,
            }),
        })
    }

    pub fn state(&self) -> OscillatorState {
        OscillatorState {
            signal_phase: self.signal.phase(),
            carrier_phase: self.carrier.phase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CarrierSpec, ModulationSegment, Pulse, SegmentKind, UpperBound};
    use std::f64::consts::TAU;

    fn scenario_b() -> PatternTable {
        PatternTable::from_json(
            r#"[{"lowerBound": 0, "upperBound": 20, "kind": "async", "carrierFrequency": 400},
                {"lowerBound": 20, "upperBound": "max", "kind": "sync", "pulse": 1}]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_async_carrier_cycle_at_48k() {
        let table = PatternTable::from_json(
            r#"[{"lowerBound": 0, "upperBound": "max", "kind": "async", "carrierFrequency": 1000}]"#,
        )
        .unwrap();
        let mut modulator = Modulator::new(&EngineConfig::default());

        for _ in 0..48 {
            modulator.tick(&table, 1, 250.0, 0.0).unwrap();
        }
        let phase = modulator.state().carrier_phase;
        assert!(phase.min(TAU - phase) < 1e-9, "carrier phase {phase}");

        let signal = modulator.state().signal_phase;
        assert!((signal - TAU / 4.0).abs() < 1e-9, "a quarter cycle of 250 Hz");
    }

    #[test]
    fn test_scenario_b_boundary() {
        let table = scenario_b();
        let mut modulator = Modulator::new(&EngineConfig::default());

        let below = modulator.tick(&table, 1, 19.99, 0.0).unwrap();
        assert_eq!(below.segment.index, 0);
        assert_eq!(below.carrier_frequency, 400.0);

        let above = modulator.tick(&table, 1, 20.01, 0.0).unwrap();
        assert_eq!(above.segment.segment.kind, SegmentKind::Sync(Pulse::Count(1)));
        assert_eq!(above.carrier_frequency, 20.01);
        assert_eq!(above.amplitude, 1.0);
    }

    #[test]
    fn test_line_signal_takes_discrete_levels() {
        let table = scenario_b();
        let mut modulator = Modulator::new(&EngineConfig::default());
        let levels = [-4.0 / 3.0, -2.0 / 3.0, 0.0, 2.0 / 3.0, 4.0 / 3.0];
        let (mut positive, mut negative) = (false, false);

        for _ in 0..4_800 {
            let line = modulator.tick(&table, 1, 50.0, 0.0).unwrap().pwm.line;
            assert!(levels.iter().any(|l| (l - line).abs() < 1e-12), "line {line}");
            positive |= line > 0.0;
            negative |= line < 0.0;
        }
        assert!(positive && negative);
    }

    #[test]
    fn test_mute_segment_is_silent_but_signal_advances() {
        let table = PatternTable::new(vec![ModulationSegment::mute(0.0, UpperBound::Max)]).unwrap();
        let mut modulator = Modulator::new(&EngineConfig::default());

        let frame = modulator.tick(&table, 1, 30.0, 0.0).unwrap();
        assert_eq!(frame.amplitude, 0.0);
        assert_eq!(frame.carrier, 0.0);
        assert_eq!(frame.pwm.line, 0.0);
        assert_eq!(frame.pwm.output, 0.0);
        assert!(modulator.state().signal_phase > 0.0);
        assert_eq!(modulator.state().carrier_phase, 0.0);
    }

    #[test]
    fn test_empty_table_leaves_phases() {
        let mut modulator = Modulator::new(&EngineConfig::default());
        let result = modulator.tick(&PatternTable::default(), 1, 30.0, 0.0);
        assert_eq!(result, Err(EngineFault::EmptyPatternTable));
        assert_eq!(modulator.state(), OscillatorState::default());
    }

    #[test]
    fn test_substituted_carrier_is_flagged() {
        let table = PatternTable::new(vec![
            ModulationSegment::asynchronous(0.0, UpperBound::Hz(10.0), CarrierSpec::Fixed(300.0)),
            ModulationSegment::asynchronous(10.0, UpperBound::Max, CarrierSpec::Ratio(f64::MAX)),
        ])
        .unwrap();
        let mut modulator = Modulator::new(&EngineConfig::default());

        assert!(modulator.tick(&table, 1, 5.0, 0.0).unwrap().fault.is_none());
        let frame = modulator.tick(&table, 1, 20.0, 0.0).unwrap();
        assert_eq!(frame.fault, Some(EngineFault::UnresolvedCarrier { segment: 1 }));
        assert_eq!(frame.carrier_frequency, 300.0);

        let mut fresh = Modulator::new(&EngineConfig::default());
        assert_eq!(
            fresh.tick(&table, 1, 20.0, 0.0),
            Err(EngineFault::UnresolvedCarrier { segment: 1 })
        );
    }
}
