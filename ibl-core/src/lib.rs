pub mod phase;
pub mod rig;
pub mod sink;
pub mod stimulus;
pub mod trial;

pub use phase::{CanonicalPhaseIndices, CANONICAL_PHASE_INDICES, LIVE_INDEX_MAX, REPLAY_INDEX_MAX};
pub use rig::{Effect, SimulatedRig};
pub use sink::{
    AudioSink, LiveRig, NeuronSink, PawSink, ProbeSink, ReplayRig, RewardSink, StimulusSink, Vec3,
    VideoSink, WheelActuator,
};
pub use stimulus::{EntityHandle, Rgba, StimulusHandle, StimulusKind, probe_color};
pub use trial::{FeedbackType, Outcome, Side, TrialRecord, TrialState, WaveformLayout};
