// Carrier reference generation.
//
// Async carriers run their own phase accumulator. Sync carriers derive
// their phase from the signal phase each sample, so they stay locked to
// the fundamental. Both share the triangle shape.

use std::f64::consts::{FRAC_2_PI, PI, TAU};

use crate::state::{CarrierSpec, ModulationSegment, Pulse, SegmentKind};

/// Identity of a segment across table replacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentKey {
    /// Bumped each time a new table is installed.
    pub generation: u64,
    pub index: usize,
}

/// Triangle wave in `[-1, 1]` at `phase`.
#[inline]
pub fn triangle(phase: f64) -> f64 {
    FRAC_2_PI * phase.sin().asin()
}

/// Half-cycle shift applied to the middle third of a wide-3 fundamental cycle.
#[inline]
pub fn wide3_shift(signal_phase: f64) -> f64 {
    let base = signal_phase.rem_euclid(TAU);
    if (TAU / 3.0..2.0 * TAU / 3.0).contains(&base) {
        PI
    } else {
        0.0
    }
}

/// Carrier phase of a synchronous segment.
#[inline]
pub fn sync_phase(signal_phase: f64, pulse: Pulse) -> f64 {
    match pulse {
        Pulse::Count(n) => (signal_phase * f64::from(n)).rem_euclid(TAU),
        Pulse::Wide3 => (signal_phase * 3.0 + wide3_shift(signal_phase)).rem_euclid(TAU),
    }
}

/// Carrier frequency of an asynchronous segment at `drive` Hz.
///
/// Ramps interpolate across the segment's own range. A segment with zero
/// or unbounded width has no range to sweep and holds the start value.
pub fn async_frequency(segment: &ModulationSegment, carrier: CarrierSpec, drive: f64) -> f64 {
    match carrier {
        CarrierSpec::Fixed(hz) => hz,
        CarrierSpec::Ratio(ratio) => drive * ratio,
        CarrierSpec::LinearRamp { from, to } => {
            let width = segment.width();
            if width <= 0.0 || !width.is_finite() {
                return from;
            }
            let t = ((drive - segment.lower_bound) / width).clamp(0.0, 1.0);
            from + (to - from) * t
        }
    }
}

impl Pulse {
    /// Carrier frequency this pulse mode produces at `drive` Hz.
    #[inline]
    pub fn carrier_frequency(self, drive: f64) -> f64 {
        drive * f64::from(self.multiplier())
    }
}

/// One carrier sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarrierSample {
    pub value: f64,
    pub frequency: f64,
    /// The computed async frequency was unusable and the last good one
    /// was used instead.
    pub substituted: bool,
}

impl CarrierSample {
    const SILENT: Self = Self {
        value: 0.0,
        frequency: 0.0,
        substituted: false,
    };
}

/// Relative slack when matching the drive motion against its planned step.
const DRIVE_STEP_TOLERANCE: f64 = 1e-9;

/// Unusable async carrier frequency and no earlier one to fall back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresolvedCarrier;

pub struct CarrierOscillator {
    phase: f64,
    sample_rate: f64,
    /// Segment and async frequency of the previous sample.
    previous: Option<(SegmentKey, Option<f64>)>,
    previous_drive: f64,
    last_good_frequency: Option<f64>,
}

impl CarrierOscillator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
            previous: None,
            previous_drive: 0.0,
            last_good_frequency: None,
        }
    }

    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Produce the carrier for one sample.
    ///
    /// `signal_phase` must already be advanced for this sample. `drive_step`
    /// is the drive motion planned since the previous sample (0 for a held
    /// or stepped drive).
    ///
    /// The phase resets to 0 when the segment changes, or when the async
    /// frequency moves while the drive did not follow its planned step. A
    /// ratio or ramp carrier gliding with a ramped drive keeps its phase.
    pub fn next(
        &mut self,
        key: SegmentKey,
        segment: &ModulationSegment,
        drive: f64,
        drive_step: f64,
        signal_phase: f64,
    ) -> Result<CarrierSample, UnresolvedCarrier> {
        let gliding = self.follows_plan(drive, drive_step);
        self.previous_drive = drive;

        match segment.kind {
            SegmentKind::Mute => {
                self.track(key, None, false);
                Ok(CarrierSample::SILENT)
            }
            SegmentKind::Sync(pulse) => {
                self.track(key, None, false);
                self.phase = sync_phase(signal_phase, pulse);
                Ok(CarrierSample {
                    value: triangle(self.phase),
                    frequency: pulse.carrier_frequency(drive),
                    substituted: false,
                })
            }
            SegmentKind::Async(carrier) => {
                let computed = async_frequency(segment, carrier, drive);
                let (frequency, substituted) = if computed.is_finite() && computed >= 0.0 {
                    self.last_good_frequency = Some(computed);
                    (computed, false)
                } else {
                    match self.last_good_frequency {
                        Some(good) => (good, true),
                        None => return Err(UnresolvedCarrier),
                    }
                };

                self.track(key, Some(frequency), gliding);
                self.phase = (self.phase + TAU * frequency / self.sample_rate).rem_euclid(TAU);
                Ok(CarrierSample {
                    value: triangle(self.phase),
                    frequency,
                    substituted,
                })
            }
        }
    }

    /// Whether the drive moved by the planned, non-zero step (up to rounding).
    #[inline]
    fn follows_plan(&self, drive: f64, drive_step: f64) -> bool {
        let slack = DRIVE_STEP_TOLERANCE * drive.abs().max(1.0);
        drive_step != 0.0 && (drive - self.previous_drive - drive_step).abs() <= slack
    }

    #[inline]
    fn track(&mut self, key: SegmentKey, frequency: Option<f64>, gliding: bool) {
        let restart = match self.previous {
            Some((previous_key, previous_frequency)) if previous_key == key => {
                previous_frequency != frequency && !gliding
            }
            _ => true,
        };
        if restart {
            self.phase = 0.0;
        }
        self.previous = Some((key, frequency));
    }
}
