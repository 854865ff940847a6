/// Flag that reads as an impulse for a fixed window of wall-clock time.
///
/// The window is measured on the unscaled clock so the cue lasts the same
/// real time at any playback speed.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityPulse {
    window_s: f64,
    value: f32,
    raised_at: Option<f64>,
}

impl VisibilityPulse {
    pub fn new(window_s: f64) -> Self {
        Self {
            window_s,
            value: 0.0,
            raised_at: None,
        }
    }

    pub fn raise(&mut self, value: f32, now: f64) {
        self.value = value;
        self.raised_at = Some(now);
    }

    pub fn clear(&mut self) {
        self.value = 0.0;
        self.raised_at = None;
    }

    /// The raised value while `now` is inside the window, 0 otherwise.
    pub fn value(&self, now: f64) -> f32 {
        match self.raised_at {
            Some(at) if now < at + self.window_s => self.value,
            _ => 0.0,
        }
    }

    pub fn is_active(&self, now: f64) -> bool {
        self.value(now) != 0.0
    }
}
