use serde::{Deserialize, Serialize};

/// Live trial state machine states, in the only order a trial may visit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialState {
    Quiescent,
    StimulusOnset,
    WheelMovement,
    FeedbackAndITI,
}

impl TrialState {
    pub const ALL: [TrialState; 4] = [
        TrialState::Quiescent,
        TrialState::StimulusOnset,
        TrialState::WheelMovement,
        TrialState::FeedbackAndITI,
    ];

    /// The state that follows this one, `None` once the trial is over.
    pub fn next(&self) -> Option<Self> {
        use TrialState::*;
        Some(match self {
            Quiescent => StimulusOnset,
            StimulusOnset => WheelMovement,
            WheelMovement => FeedbackAndITI,
            FeedbackAndITI => return None,
        })
    }
}

/// Stimulus or response side. The sign convention follows azimuth: left is
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn sign(&self) -> f32 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn from_sign(sign: f32) -> Option<Self> {
        if sign < 0.0 {
            Some(Side::Left)
        } else if sign > 0.0 {
            Some(Side::Right)
        } else {
            None
        }
    }
}

/// Trial type used to pick canonical phase indices and waveform blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    LeftCorrect,
    LeftIncorrect,
    RightCorrect,
    RightIncorrect,
}

/// How the per-neuron waveform arrays are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaveformLayout {
    /// Four blocks of 250 samples.
    #[default]
    Full,
    /// Four blocks of 100 samples.
    Psth,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::LeftCorrect,
        Outcome::LeftIncorrect,
        Outcome::RightCorrect,
        Outcome::RightIncorrect,
    ];

    pub fn from_trial(side: Side, correct: bool) -> Self {
        match (side, correct) {
            (Side::Left, true) => Outcome::LeftCorrect,
            (Side::Left, false) => Outcome::LeftIncorrect,
            (Side::Right, true) => Outcome::RightCorrect,
            (Side::Right, false) => Outcome::RightIncorrect,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Outcome::LeftCorrect => 0,
            Outcome::LeftIncorrect => 1,
            Outcome::RightCorrect => 2,
            Outcome::RightIncorrect => 3,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Outcome::LeftCorrect | Outcome::LeftIncorrect => Side::Left,
            Outcome::RightCorrect | Outcome::RightIncorrect => Side::Right,
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::LeftCorrect | Outcome::RightCorrect)
    }

    /// First sample of this outcome's block in a concatenated waveform array.
    pub fn waveform_offset(&self, layout: WaveformLayout) -> usize {
        let block = match layout {
            WaveformLayout::Full => 250,
            WaveformLayout::Psth => 100,
        };
        self.index() * block
    }
}

/// Recorded feedback type in a replayed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackType {
    Reward,
    Error,
}

impl FeedbackType {
    /// Recordings store 1 for reward and -1 for error; anything but 1 is an error.
    pub fn from_code(code: i64) -> Self {
        if code == 1 {
            FeedbackType::Reward
        } else {
            FeedbackType::Error
        }
    }
}

/// Recorded result per live trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: usize,
    pub side: Side,
    pub correct: bool,
    pub response_side: Side,
    pub quiescent_s: f64,
    pub reaction_time_s: f64,
    pub wheel_duration_s: f64,
    pub iti_s: f64,
    /// Session clock when the trial ended.
    pub ended_at_s: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_advance_strictly_forward() {
        let mut seen = vec![TrialState::Quiescent];
        let mut state = TrialState::Quiescent;
        while let Some(next) = state.next() {
            seen.push(next);
            state = next;
        }
        assert_eq!(seen, TrialState::ALL.to_vec());
    }

    #[test]
    fn outcome_round_trips_side_and_correctness() {
        for outcome in Outcome::ALL {
            assert_eq!(
                Outcome::from_trial(outcome.side(), outcome.is_correct()),
                outcome
            );
        }
    }

    #[test]
    fn waveform_offsets() {
        assert_eq!(Outcome::RightCorrect.waveform_offset(WaveformLayout::Full), 500);
        assert_eq!(Outcome::RightIncorrect.waveform_offset(WaveformLayout::Psth), 300);
        assert_eq!(Outcome::LeftCorrect.waveform_offset(WaveformLayout::Full), 0);
    }

    #[test]
    fn feedback_codes() {
        assert_eq!(FeedbackType::from_code(1), FeedbackType::Reward);
        assert_eq!(FeedbackType::from_code(-1), FeedbackType::Error);
        assert_eq!(FeedbackType::from_code(0), FeedbackType::Error);
    }

    #[test]
    fn side_signs() {
        assert_eq!(Side::Left.sign(), -1.0);
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(Side::from_sign(0.0), None);
        assert_eq!(Side::from_sign(3.0), Some(Side::Right));
    }
}
