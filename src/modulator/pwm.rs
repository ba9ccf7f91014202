// Pulse-width comparison and line-current proxy.

/// Switch states and derived line signal for one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PwmSample {
    /// `+1` or `-1` per phase (U, V, W).
    pub states: [i8; 3],
    pub line: f64,
    /// `line` scaled by the output gain.
    pub output: f32,
}

pub struct PwmEncoder {
    line_resistance: f64,
    output_gain: f32,
}

impl PwmEncoder {
    pub fn new(line_resistance: f64, output_gain: f32) -> Self {
        Self {
            line_resistance,
            output_gain,
        }
    }

    /// Compare each shaped phase against the carrier.
    #[inline]
    pub fn encode(&self, shaped: [f64; 3], carrier: f64) -> PwmSample {
        let states = shaped.map(|signal| if signal > carrier { 1_i8 } else { -1 });
        let [u, v, w] = states.map(f64::from);
        let line = (2.0 * u - v - w) / (3.0 * self.line_resistance);
        PwmSample {
            states,
            line,
            output: line as f32 * self.output_gain,
        }
    }
}
