/// Scaled session clock owned by the active task.
///
/// Each tick adds `delta * time_scale` to the elapsed time. A frozen clock
/// ignores ticks until resumed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionClock {
    elapsed: f64,
    time_scale: f64,
    frozen: bool,
}

impl SessionClock {
    pub fn new(time_scale: f64) -> Self {
        Self {
            elapsed: 0.0,
            time_scale: if time_scale.is_finite() && time_scale > 0.0 {
                time_scale
            } else {
                1.0
            },
            frozen: false,
        }
    }

    /// Advance by one frame and return the scaled delta that was applied.
    pub fn advance(&mut self, delta: f64) -> f64 {
        if self.frozen || !delta.is_finite() || delta <= 0.0 {
            return 0.0;
        }
        let scaled = delta * self.time_scale;
        self.elapsed += scaled;
        scaled
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Returns false and keeps the old scale for non-finite or non-positive input.
    pub fn set_time_scale(&mut self, scale: f64) -> bool {
        if scale.is_finite() && scale > 0.0 {
            self.time_scale = scale;
            true
        } else {
            false
        }
    }

    pub fn speed_up(&mut self) -> f64 {
        self.set_time_scale(self.time_scale * 2.0);
        self.time_scale
    }

    pub fn slow_down(&mut self) -> f64 {
        self.set_time_scale(self.time_scale / 2.0);
        self.time_scale
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.frozen = false;
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn resume(&mut self) {
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Formats a session time as `HHh:MMm:SS.mmm`.
pub fn format_task_time(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).floor() as u64
    } else {
        0
    };
    let ms = total_ms % 1000;
    let secs = (total_ms / 1000) % 60;
    let mins = (total_ms / 60_000) % 60;
    let hours = (total_ms / 3_600_000) % 24;
    format!("{:02}h:{:02}m:{:02}.{:03}", hours, mins, secs, ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_applies_time_scale() {
        let mut clock = SessionClock::new(0.5);
        assert_eq!(clock.advance(0.2), 0.1);
        assert!((clock.elapsed() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn frozen_clock_does_not_move() {
        let mut clock = SessionClock::new(1.0);
        clock.advance(1.0);
        clock.freeze();
        assert_eq!(clock.advance(5.0), 0.0);
        assert_eq!(clock.elapsed(), 1.0);
        clock.resume();
        clock.advance(1.0);
        assert_eq!(clock.elapsed(), 2.0);
    }

    #[test]
    fn reset_clears_elapsed_and_unfreezes() {
        let mut clock = SessionClock::new(1.0);
        clock.advance(3.0);
        clock.freeze();
        clock.reset();
        assert_eq!(clock.elapsed(), 0.0);
        assert!(!clock.is_frozen());
    }

    #[test]
    fn speed_up_and_slow_down() {
        let mut clock = SessionClock::new(0.125);
        assert_eq!(clock.speed_up(), 0.25);
        assert_eq!(clock.slow_down(), 0.125);
        assert!(!clock.set_time_scale(0.0));
        assert!(!clock.set_time_scale(f64::INFINITY));
        assert_eq!(clock.time_scale(), 0.125);
    }

    #[test]
    fn negative_delta_is_ignored() {
        let mut clock = SessionClock::new(1.0);
        assert_eq!(clock.advance(-1.0), 0.0);
        assert_eq!(clock.elapsed(), 0.0);
    }

    #[test]
    fn formats_task_time() {
        assert_eq!(format_task_time(0.0), "00h:00m:00.000");
        assert_eq!(format_task_time(3723.25), "01h:02m:03.250");
        assert_eq!(format_task_time(-4.0), "00h:00m:00.000");
    }
}
