pub mod probe;
pub mod session;
pub mod synchronizer;

pub use probe::ProbePlacement;
pub use session::{ProbeData, ProbeTrajectory, ReplaySession, SessionData, SpikeQuantiles, Stream};
pub use synchronizer::{ReplayFrame, ReplaySynchronizer};
