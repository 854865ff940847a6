pub mod config;
pub mod cursor;
pub mod error;
pub mod event_average;
pub mod index;
pub mod pulse;
pub mod replay;
pub mod state;
pub mod task;
pub mod trial;

pub use config::{LiveTaskConfig, ReplayConfig, TaskConfig};
pub use cursor::{Crossing, StreamCursor};
pub use error::{ConfigError, DataIntegrityError, IntegrityKind, TaskError};
pub use event_average::{EventAverageDriver, EventAverageTable, RateProfile};
pub use index::{
    TimeIndex, interpolate_index, replay_progress_index, safe_fraction, trial_time_index,
};
pub use pulse::VisibilityPulse;
pub use replay::{
    ProbeData, ProbePlacement, ProbeTrajectory, ReplayFrame, ReplaySession, ReplaySynchronizer,
    SessionData, SpikeQuantiles, Stream,
};
pub use state::{TrialStateMachine, stimulus_outside_range};
pub use task::Task;
pub use trial::{Trial, TrialParameters, TrialTimings};
