/// Drive frequency with per-buffer linear smoothing.
///
/// The control side only sets a target. At the start of each buffer the
/// parameter plans a straight ramp from where it is now to the target,
/// reaching it on the buffer's last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveParameter {
    current: f64,
    target: f64,
    start: f64,
    step: f64,
}

impl DriveParameter {
    pub fn new(value: f64) -> Self {
        Self {
            current: value,
            target: value,
            start: value,
            step: 0.0,
        }
    }

    /// Set the value to ramp towards (e.g. a new speed command)
    #[inline]
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Plan the ramp for a buffer of `frames` samples.
    #[inline]
    pub fn begin_block(&mut self, frames: usize) {
        self.start = self.current;
        self.step = if frames == 0 {
            0.0
        } else {
            (self.target - self.current) / frames as f64
        };
        if frames > 0 {
            self.current = self.target;
        }
    }

    /// Evaluate at audio rate (per sample)
    #[inline]
    pub fn value_audio(&self, frame: usize) -> f64 {
        self.start + self.step * (frame + 1) as f64
    }

    /// Planned change between consecutive samples of the current buffer.
    #[inline]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Jump straight to the target (used while silent).
    #[inline]
    pub fn settle(&mut self) {
        self.current = self.target;
        self.start = self.target;
        self.step = 0.0;
    }

    /// Force the current value, e.g. when a host supplies explicit
    /// per-sample frequencies.
    #[inline]
    pub fn set_current(&mut self, value: f64) {
        self.current = value;
        self.start = value;
        self.step = 0.0;
    }

    /// Evaluate at control rate (value at the end of the planned buffer)
    #[inline]
    pub fn value_control(&self) -> f64 {
        self.current
    }
}
