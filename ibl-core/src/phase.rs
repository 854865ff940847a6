use crate::trial::{Outcome, TrialState};

/// Largest normalized index of a live trial (250 samples per trial type).
pub const LIVE_INDEX_MAX: u32 = 249;
/// Largest normalized index of a replayed session's progress scale.
pub const REPLAY_INDEX_MAX: u32 = 99;

/// Waveform sample boundaries of one trial type: stimulus onset, first wheel
/// movement and feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalPhaseIndices {
    pub stimulus_on: u32,
    pub first_wheel_move: u32,
    pub feedback: u32,
}

/// Indexed by [`Outcome::index`].
pub const CANONICAL_PHASE_INDICES: [CanonicalPhaseIndices; 4] = [
    // left correct
    CanonicalPhaseIndices {
        stimulus_on: 92,
        first_wheel_move: 130,
        feedback: 157,
    },
    // left incorrect
    CanonicalPhaseIndices {
        stimulus_on: 83,
        first_wheel_move: 131,
        feedback: 166,
    },
    // right correct
    CanonicalPhaseIndices {
        stimulus_on: 91,
        first_wheel_move: 131,
        feedback: 158,
    },
    // right incorrect
    CanonicalPhaseIndices {
        stimulus_on: 84,
        first_wheel_move: 131,
        feedback: 165,
    },
];

impl CanonicalPhaseIndices {
    pub fn for_outcome(outcome: Outcome) -> Self {
        CANONICAL_PHASE_INDICES[outcome.index()]
    }

    /// The two boundaries that bracket `state` on the live trial scale.
    pub fn bracket(&self, state: TrialState) -> (u32, u32) {
        match state {
            TrialState::Quiescent => (0, self.stimulus_on),
            TrialState::StimulusOnset => (self.stimulus_on, self.first_wheel_move),
            TrialState::WheelMovement => (self.first_wheel_move, self.feedback),
            TrialState::FeedbackAndITI => (self.feedback, LIVE_INDEX_MAX),
        }
    }
}
