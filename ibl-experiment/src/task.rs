use ibl_timing::Timer;
use rand::Rng;

use crate::error::TaskError;
use crate::index::TimeIndex;
use crate::replay::ReplaySynchronizer;
use crate::state::TrialStateMachine;

/// The two task variants behind one run/pause/stop/tick surface.
pub enum Task<R: Rng, T: Timer> {
    Live(TrialStateMachine<R, T>),
    Replay(ReplaySynchronizer<T>),
}

impl<R: Rng, T: Timer> Task<R, T> {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Live(_) => "IBL Task",
            Task::Replay(_) => "replay",
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            Task::Live(_) => true,
            Task::Replay(r) => r.is_loaded(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Task::Live(l) => l.is_running(),
            Task::Replay(r) => r.is_running(),
        }
    }

    pub fn run(&mut self) -> Result<(), TaskError> {
        match self {
            Task::Live(l) => {
                l.start();
                Ok(())
            }
            Task::Replay(r) => r.start(),
        }
    }

    pub fn pause(&mut self) -> Result<(), TaskError> {
        match self {
            Task::Live(l) => {
                l.pause();
                Ok(())
            }
            Task::Replay(r) => r.pause(),
        }
    }

    pub fn stop(&mut self) {
        match self {
            Task::Live(l) => l.stop(),
            Task::Replay(r) => r.stop(),
        }
    }

    /// Live trials report the 0-249 trial index, replay its 0-99 progress.
    pub fn tick(&mut self, delta: f64) -> Result<TimeIndex, TaskError> {
        match self {
            Task::Live(l) => l.tick(delta),
            Task::Replay(r) => r.tick(delta).map(|f| f.progress),
        }
    }

    pub fn task_time(&self) -> f64 {
        match self {
            Task::Live(l) => l.task_time(),
            Task::Replay(r) => r.task_time(),
        }
    }

    pub fn set_task_time(&mut self, seconds: f64) -> Result<(), TaskError> {
        match self {
            Task::Live(_) => Err(TaskError::NotSupported("set_task_time")),
            Task::Replay(r) => r.set_task_time(seconds),
        }
    }

    pub fn set_time_scale(&mut self, scale: f64) -> bool {
        match self {
            Task::Live(l) => l.set_time_scale(scale),
            Task::Replay(r) => r.set_time_scale(scale),
        }
    }

    pub fn time_scale(&self) -> f64 {
        match self {
            Task::Live(l) => l.time_scale(),
            Task::Replay(r) => r.time_scale(),
        }
    }

    pub fn as_live(&self) -> Option<&TrialStateMachine<R, T>> {
        match self {
            Task::Live(l) => Some(l),
            Task::Replay(_) => None,
        }
    }

    pub fn as_replay(&self) -> Option<&ReplaySynchronizer<T>> {
        match self {
            Task::Live(_) => None,
            Task::Replay(r) => Some(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LiveTaskConfig, ReplayConfig};
    use ibl_core::SimulatedRig;
    use ibl_timing::ManualTimer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn dispatches_to_each_variant() {
        let rig = SimulatedRig::new();
        let mut live: Task<StdRng, ManualTimer> = Task::Live(TrialStateMachine::new(
            LiveTaskConfig::default(),
            1.0,
            rig.live_rig(),
            ManualTimer::new(),
            StdRng::seed_from_u64(0),
        ));
        assert!(live.is_loaded());
        live.run().unwrap();
        assert!(live.is_running());
        live.tick(0.1).unwrap();
        assert!((live.task_time() - 0.1).abs() < 1e-12);
        assert!(live.set_task_time(1.0).is_err());

        let mut replay: Task<StdRng, ManualTimer> = Task::Replay(ReplaySynchronizer::new(
            ReplayConfig::default(),
            1.0,
            rig.replay_rig(),
            ManualTimer::new(),
        ));
        assert!(!replay.is_loaded());
        assert_eq!(replay.run(), Err(TaskError::NotLoaded));
        assert_eq!(replay.name(), "replay");
    }
}
