// src/engine.rs

use crate::config::EngineConfig;
use crate::error::EngineFault;
use crate::modulator::{Modulator, ModulatorFrame, OscillatorState};
use crate::parameter::DriveParameter;
use crate::state::{ControlInputs, ControlUpdate, PatternTable, sanitize_speed};
use crate::telemetry::WaveformSnapshot;

/// Real-time synthesis engine.
///
/// This struct runs exclusively on the audio thread.
/// It must be deterministic, allocation-free, and lock-free.
/// Phase state persists across buffers and is frozen while silent.
pub struct Engine {
    /// Latest control inputs (applied at buffer boundaries)
    inputs: ControlInputs,

    modulator: Modulator,

    /// Drive frequency ramping towards the speed target
    drive: DriveParameter,

    /// Bumped whenever a table is installed
    table_generation: u64,

    sample_rate: f64,
    max_drive: f64,

    /// Audio clock
    frames_processed: u64,

    /// Last sample of the most recent buffer
    snapshot: WaveformSnapshot,

    driving: bool,
    faults: FaultLatch,
}

/// Where a buffer takes its per-sample drive frequency from.
#[derive(Clone, Copy)]
enum DriveSource<'a> {
    /// Linear ramp to the speed target.
    Ramp,
    /// Host-supplied frequencies. A single value holds for the whole buffer.
    Explicit(&'a [f32]),
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            inputs: ControlInputs::default(),
            modulator: Modulator::new(config),
            drive: DriveParameter::new(0.0),
            table_generation: 0,
            sample_rate: config.sample_rate,
            max_drive: config.nyquist(),
            frames_processed: 0,
            snapshot: WaveformSnapshot::silent(),
            driving: false,
            faults: FaultLatch::default(),
        }
    }

    /// Apply a control update.
    ///
    /// Must only be called between buffers. Returns the table that was
    /// replaced so the caller can hand it back for deallocation.
    pub fn apply(&mut self, update: ControlUpdate) -> Option<PatternTable> {
        let new_table = update.modulation_patterns.is_some();
        let retired = self.inputs.apply(update, self.max_drive);
        if new_table {
            self.table_generation += 1;
            self.faults.clear();
        }
        self.drive.set_target(self.inputs.speed);
        retired
    }

    /// Render one buffer, ramping the drive frequency to the speed target.
    ///
    /// Called once per audio block from the audio callback.
    /// It must not allocate or block.
    pub fn process(&mut self, output: &mut [f32]) {
        self.render(output, DriveSource::Ramp);
    }

    /// Render one buffer with explicit per-sample drive frequencies.
    ///
    /// `frequencies` is either one value for the whole buffer or one value
    /// per output frame. Out-of-range values are clamped.
    pub fn process_with_frequency(&mut self, output: &mut [f32], frequencies: &[f32]) {
        self.render(output, DriveSource::Explicit(frequencies));
    }

    fn render(&mut self, output: &mut [f32], source: DriveSource<'_>) {
        self.frames_processed += output.len() as u64;

        if self.inputs.is_silent() {
            self.silence(output);
            return;
        }
        let table = match self.inputs.patterns.as_ref() {
            Some(table) if !table.is_empty() => table,
            Some(_) => {
                self.faults.raise(EngineFault::EmptyPatternTable);
                self.silence(output);
                return;
            }
            None => {
                self.faults.raise(EngineFault::NoPatternTable);
                self.silence(output);
                return;
            }
        };

        if let DriveSource::Ramp = source {
            self.drive.begin_block(output.len());
        }

        let mut last: Option<(f64, ModulatorFrame)> = None;
        let mut last_drive = self.drive.value_control();
        for (frame, sample) in output.iter_mut().enumerate() {
            // drive, and the motion from the previous sample that counts as a glide
            let (drive, drive_step) = match source {
                DriveSource::Ramp => (self.drive.value_audio(frame), self.drive.step()),
                DriveSource::Explicit(frequencies) => {
                    let requested = match frequencies {
                        [single] => *single,
                        _ => frequencies
                            .get(frame)
                            .or(frequencies.last())
                            .copied()
                            .unwrap_or(0.0),
                    };
                    let drive = sanitize_speed(f64::from(requested), self.max_drive);
                    // a per-frame curve glides inside the buffer; its first frame is a step
                    let step = if frame > 0 && frequencies.len() > 1 {
                        drive - last_drive
                    } else {
                        0.0
                    };
                    (drive, step)
                }
            };
            last_drive = drive;

            match self.modulator.tick(table, self.table_generation, drive, drive_step) {
                Ok(result) => {
                    if let Some(fault) = result.fault {
                        self.faults.raise(fault);
                    }
                    *sample = result.pwm.output;
                    last = Some((drive, result));
                }
                Err(fault) => {
                    self.faults.raise(fault);
                    *sample = 0.0;
                    last = None;
                }
            }
        }

        if let DriveSource::Explicit(_) = source {
            self.drive.set_current(last_drive);
        }

        self.driving = true;
        self.snapshot = match last {
            Some((drive, frame)) => snapshot_of(drive, &frame),
            None => WaveformSnapshot {
                drive_frequency: last_drive,
                ..WaveformSnapshot::silent()
            },
        };
    }

    /// Silent buffer: zeros out, phases untouched.
    fn silence(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        self.drive.settle();
        self.driving = false;
        self.snapshot = WaveformSnapshot::silent();
    }

    /// Next fault not yet handed out.
    pub fn take_fault(&mut self) -> Option<EngineFault> {
        self.faults.take()
    }

    /// Values of the last rendered sample.
    pub fn snapshot(&self) -> &WaveformSnapshot {
        &self.snapshot
    }

    pub fn oscillator_state(&self) -> OscillatorState {
        self.modulator.state()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Audio-clock time in seconds.
    pub fn clock_seconds(&self) -> f64 {
        self.frames_processed as f64 / self.sample_rate
    }

    /// Whether the last buffer was rendered in the driving state.
    pub fn is_driving(&self) -> bool {
        self.driving
    }

    /// Drive frequency at the end of the last buffer.
    pub fn drive_frequency(&self) -> f64 {
        self.drive.value_control()
    }

    pub fn inputs(&self) -> &ControlInputs {
        &self.inputs
    }

    pub fn table_generation(&self) -> u64 {
        self.table_generation
    }
}

fn snapshot_of(drive: f64, frame: &ModulatorFrame) -> WaveformSnapshot {
    let [u, v, w] = frame.signals.map(|s| s * frame.amplitude);
    WaveformSnapshot {
        signal_u: u,
        signal_v: v,
        signal_w: w,
        line_signal: frame.pwm.line,
        carrier_value: frame.carrier,
        active_segment: Some(frame.segment.segment),
        drive_frequency: drive,
        carrier_frequency: frame.carrier_frequency,
        amplitude: frame.amplitude,
    }
}

// ═══════════════════════════════════════════════════════════════════
// Fault latch
// ═══════════════════════════════════════════════════════════════════

/// Remembers which fault kinds were raised for the current table.
///
/// Each kind is handed out at most once until the next table arrives.
#[derive(Default)]
struct FaultLatch {
    reported: u8,
    pending: u8,
    unresolved_segment: usize,
}

impl FaultLatch {
    #[inline]
    fn raise(&mut self, fault: EngineFault) {
        let mask = fault.mask();
        if self.reported & mask != 0 {
            return;
        }
        self.reported |= mask;
        self.pending |= mask;
        if let EngineFault::UnresolvedCarrier { segment } = fault {
            self.unresolved_segment = segment;
        }
    }

    fn take(&mut self) -> Option<EngineFault> {
        let faults = [
            EngineFault::NoPatternTable,
            EngineFault::EmptyPatternTable,
            EngineFault::UnresolvedCarrier {
                segment: self.unresolved_segment,
            },
        ];
        let fault = faults.into_iter().find(|f| self.pending & f.mask() != 0)?;
        self.pending &= !fault.mask();
        Some(fault)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Direction, HandlePosition, ModulationSegment, Pulse, UpperBound, VehicleProfile};
    use std::f64::consts::TAU;

    fn sync_table() -> PatternTable {
        PatternTable::from_json(
            r#"[{"lowerBound": 0, "upperBound": 20, "kind": "async", "carrierFrequency": 400},
                {"lowerBound": 20, "upperBound": 40, "kind": "sync", "pulse": 9},
                {"lowerBound": 40, "upperBound": "max", "kind": "sync", "pulse": 1}]"#,
        )
        .unwrap()
    }

    fn driving_engine(speed: f64) -> Engine {
        let mut engine = Engine::new(&EngineConfig::default());
        engine.apply(
            ControlUpdate::default()
                .with_handle(HandlePosition::Notch(2))
                .with_speed(speed)
                .with_patterns(sync_table()),
        );
        engine
    }

    #[test]
    fn test_neutral_is_silent_and_frozen() {
        let mut engine = driving_engine(30.0);
        let mut buffer = [0.0_f32; 128];
        engine.process(&mut buffer);
        assert!(buffer.iter().any(|s| *s != 0.0));
        let frozen = engine.oscillator_state();

        engine.apply(ControlUpdate::default().with_handle(HandlePosition::Neutral));
        for _ in 0..10 {
            buffer.fill(1.0);
            engine.process(&mut buffer);
            assert!(buffer.iter().all(|s| *s == 0.0));
        }
        assert_eq!(engine.oscillator_state(), frozen);
        assert!(!engine.is_driving());
        assert!(engine.snapshot().is_silent());
        assert_eq!(engine.frames_processed(), 11 * 128);
    }

    #[test]
    fn test_zero_speed_is_silent() {
        let mut engine = driving_engine(0.0);
        let mut buffer = [1.0_f32; 64];
        engine.process(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
        assert_eq!(engine.oscillator_state(), OscillatorState::default());
        assert_eq!(engine.take_fault(), None);
    }

    #[test]
    fn test_ramp_reaches_target() {
        let mut engine = driving_engine(30.0);
        let mut buffer = [0.0_f32; 128];
        engine.process(&mut buffer);
        assert_eq!(engine.drive_frequency(), 30.0);
        assert_eq!(engine.snapshot().drive_frequency, 30.0);

        engine.apply(ControlUpdate::default().with_speed(50.0));
        engine.process(&mut buffer[..10]);
        assert_eq!(engine.snapshot().drive_frequency, 50.0);
        assert_eq!(
            engine.snapshot().active_segment,
            Some(ModulationSegment::sync(40.0, UpperBound::Max, Pulse::Count(1)))
        );
    }

    #[test]
    fn test_speed_is_clamped_to_nyquist() {
        let mut engine = driving_engine(1.0e9);
        assert_eq!(engine.inputs().speed, 24_000.0);

        engine.apply(ControlUpdate::default().with_speed(f64::NAN));
        assert_eq!(engine.inputs().speed, 0.0);
    }

    #[test]
    fn test_new_table_restarts_carrier() {
        let mut engine = driving_engine(10.0);
        let mut buffer = [0.0_f32; 256];
        engine.process(&mut buffer);
        engine.process(&mut buffer);
        assert!(engine.oscillator_state().carrier_phase > 0.0);

        // a fresh table restarts the async carrier even though the segment index is unchanged
        engine.apply(ControlUpdate::default().with_patterns(sync_table()));
        let mut one = [0.0_f32; 1];
        engine.process(&mut one);
        let step = TAU * 400.0 / 48_000.0;
        assert!((engine.oscillator_state().carrier_phase - step).abs() < 1e-12);
    }

    #[test]
    fn test_carrier_resets_between_buffers_on_segment_switch() {
        let table = PatternTable::from_json(
            r#"[{"lowerBound": 0, "upperBound": 20, "kind": "async", "carrierFrequency": 400},
                {"lowerBound": 20, "upperBound": "max", "kind": "async", "carrierFrequency": 1000}]"#,
        )
        .unwrap();
        let mut engine = Engine::new(&EngineConfig::default());
        engine.apply(
            ControlUpdate::default()
                .with_handle(HandlePosition::Notch(1))
                .with_speed(10.0)
                .with_patterns(table),
        );
        let mut buffer = [0.0_f32; 256];
        engine.process(&mut buffer);
        engine.process(&mut buffer[..100]);
        assert!(engine.oscillator_state().carrier_phase > 0.0);

        engine.apply(ControlUpdate::default().with_speed(30.0));
        let mut one = [0.0_f32; 1];
        engine.process(&mut one);
        assert_eq!(engine.snapshot().carrier_frequency, 1_000.0);
        let step = TAU * 1_000.0 / 48_000.0;
        assert!((engine.oscillator_state().carrier_phase - step).abs() < 1e-12);
    }

    #[test]
    fn test_ramped_carrier_keeps_accumulating() {
        let profile = VehicleProfile::builtin("e231-500").unwrap();
        let mut engine = Engine::new(&EngineConfig::default());
        engine.apply(
            ControlUpdate::default()
                .with_handle(HandlePosition::Notch(3))
                .with_speed(10.0)
                .with_patterns(profile.table_for(Direction::Accelerating).clone()),
        );
        let mut buffer = [0.0_f32; 128];
        engine.process(&mut buffer);
        engine.process(&mut buffer);
        let mut phase = engine.oscillator_state().carrier_phase;

        // 10 -> 12 Hz inside the 3-36 Hz segment, carrier sweeping 198 -> 880 Hz
        engine.apply(ControlUpdate::default().with_speed(12.0));
        engine.process(&mut buffer);
        for frame in 0..128 {
            let drive = 10.0 + 2.0 / 128.0 * f64::from(frame + 1);
            let carrier = 198.0 + (880.0 - 198.0) * ((drive - 3.0) / 33.0);
            phase = (phase + TAU * carrier / 48_000.0).rem_euclid(TAU);
        }

        let state = engine.oscillator_state();
        assert!((state.carrier_phase - phase).abs() < 1e-9, "carrier phase {}", state.carrier_phase);
        assert!(buffer.iter().any(|s| *s != 0.0), "ramped buffer is audible");
    }

    #[test]
    fn test_resume_after_silence_continues_phase() {
        let mut engine = driving_engine(30.0);
        let mut buffer = [0.0_f32; 128];
        engine.process(&mut buffer);
        let before = engine.oscillator_state();

        engine.apply(ControlUpdate::default().with_handle(HandlePosition::Neutral));
        for _ in 0..5 {
            engine.process(&mut buffer);
        }
        engine.apply(ControlUpdate::default().with_handle(HandlePosition::Notch(2)));
        let mut one = [0.0_f32; 1];
        engine.process(&mut one);

        let advanced = (engine.oscillator_state().signal_phase - before.signal_phase).rem_euclid(TAU);
        assert!((advanced - TAU * 30.0 / 48_000.0).abs() < 1e-12, "advanced {advanced}");
    }

    #[test]
    fn test_missing_table_reports_once() {
        let mut engine = Engine::new(&EngineConfig::default());
        engine.apply(
            ControlUpdate::default()
                .with_handle(HandlePosition::Notch(1))
                .with_speed(20.0),
        );
        let mut buffer = [1.0_f32; 32];
        for _ in 0..3 {
            engine.process(&mut buffer);
            assert!(buffer.iter().all(|s| *s == 0.0));
        }
        assert_eq!(engine.take_fault(), Some(EngineFault::NoPatternTable));
        assert_eq!(engine.take_fault(), None);
    }

    #[test]
    fn test_empty_table_reports_once_per_table() {
        let mut engine = driving_engine(20.0);
        engine.apply(ControlUpdate::default().with_patterns(PatternTable::default()));

        let mut buffer = [1.0_f32; 32];
        engine.process(&mut buffer);
        engine.process(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
        assert_eq!(engine.take_fault(), Some(EngineFault::EmptyPatternTable));
        assert_eq!(engine.take_fault(), None);

        engine.apply(ControlUpdate::default().with_patterns(PatternTable::default()));
        engine.process(&mut buffer);
        assert_eq!(engine.take_fault(), Some(EngineFault::EmptyPatternTable));
    }

    #[test]
    fn test_explicit_frequencies() {
        let mut engine = driving_engine(10.0);
        let mut buffer = [0.0_f32; 16];

        engine.process_with_frequency(&mut buffer, &[45.0]);
        assert_eq!(engine.snapshot().drive_frequency, 45.0);
        assert_eq!(engine.drive_frequency(), 45.0);

        let ramp: Vec<f32> = (0..16).map(|i| 20.0 + i as f32).collect();
        engine.process_with_frequency(&mut buffer, &ramp);
        assert_eq!(engine.snapshot().drive_frequency, 35.0);

        engine.process_with_frequency(&mut buffer, &[-3.0]);
        assert_eq!(engine.snapshot().drive_frequency, 0.0);
    }

    #[test]
    fn test_replaced_table_is_returned() {
        let mut engine = driving_engine(10.0);
        let replacement = sync_table();
        let retired = engine.apply(ControlUpdate::default().with_patterns(replacement));
        assert!(retired.is_some());
        assert_eq!(engine.table_generation(), 2);
        assert!(engine.apply(ControlUpdate::default().with_speed(5.0)).is_none());
    }
}
