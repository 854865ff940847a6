//! Mapping from task time onto the normalized waveform index.

use ibl_core::{CanonicalPhaseIndices, Outcome, REPLAY_INDEX_MAX, TrialState};

/// Normalized time index consumed by the rendering layer.
pub type TimeIndex = u32;

/// `round(lerp(lo, hi, clamp(fraction, 0, 1)))`. A non-finite fraction is
/// treated as 1.0.
pub fn interpolate_index(lo: TimeIndex, hi: TimeIndex, fraction: f64) -> TimeIndex {
    let f = if fraction.is_nan() {
        1.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    let value = lo as f64 + (hi as f64 - lo as f64) * f;
    value.round().max(0.0) as TimeIndex
}

/// `num / den`, or 1.0 when the interval has no length.
pub fn safe_fraction(num: f64, den: f64) -> f64 {
    if den > 0.0 && den.is_finite() {
        num / den
    } else {
        1.0
    }
}

/// Index of a live trial given its outcome, current state and progress
/// through that state.
pub fn trial_time_index(outcome: Outcome, state: TrialState, fraction: f64) -> TimeIndex {
    let (lo, hi) = CanonicalPhaseIndices::for_outcome(outcome).bracket(state);
    interpolate_index(lo, hi, fraction)
}

/// Replay progress through a session on the 0-99 scale.
pub fn replay_progress_index(clock: f64, duration: f64) -> TimeIndex {
    if duration.is_nan() || duration <= 0.0 {
        return 0;
    }
    let f = (clock / duration).clamp(0.0, 1.0);
    ((f * (REPLAY_INDEX_MAX + 1) as f64).floor() as TimeIndex).min(REPLAY_INDEX_MAX)
}
