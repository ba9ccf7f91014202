// Three-phase sinusoidal reference.

use std::f64::consts::TAU;

const PHASE_OFFSET_V: f64 = TAU / 3.0;
const PHASE_OFFSET_W: f64 = 2.0 * TAU / 3.0;

pub struct SignalOscillator {
    phase: f64,
    sample_rate: f64,
}

impl SignalOscillator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
        }
    }

    /// Advance by one sample at `frequency` Hz and return the new phase.
    #[inline]
    pub fn advance(&mut self, frequency: f64) -> f64 {
        self.phase = (self.phase + TAU * frequency / self.sample_rate).rem_euclid(TAU);
        self.phase
    }

    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// U, V and W at the current phase.
    #[inline]
    pub fn three_phase(&self) -> [f64; 3] {
        [
            self.phase.sin(),
            (self.phase - PHASE_OFFSET_V).sin(),
            (self.phase - PHASE_OFFSET_W).sin(),
        ]
    }
}
