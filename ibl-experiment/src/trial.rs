use ibl_core::{Outcome, Side, StimulusHandle, TrialState};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::LiveTaskConfig;
use crate::error::ConfigError;

/// Random draws for one live trial. Immutable once drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialParameters {
    pub quiescent_s: f64,
    pub side: Side,
    pub correct: bool,
    pub reaction_time_s: f64,
}

impl TrialParameters {
    /// Draws a trial at difficulty `level`. A level that does not index the
    /// per-level tables is a configuration error.
    pub fn draw<R: Rng>(
        rng: &mut R,
        config: &LiveTaskConfig,
        level: usize,
    ) -> Result<Self, ConfigError> {
        config.check_level(level)?;
        let (qui_min, qui_max) = config.quiescent_range_s;
        let quiescent_s = rng.random::<f64>() * (qui_max - qui_min) + qui_min;
        let side = if rng.random::<f64>() < 0.5 {
            Side::Right
        } else {
            Side::Left
        };
        let correct = rng.random::<f64>() < config.percent_correct_levels[level];
        let reaction_time_s = rng.random::<f64>() * config.reaction_time_levels_s[level];
        Ok(Self {
            quiescent_s,
            side,
            correct,
            reaction_time_s,
        })
    }

    /// Equals the stimulus side on a correct trial, the opposite otherwise.
    pub fn response_side(&self) -> Side {
        if self.correct {
            self.side
        } else {
            self.side.opposite()
        }
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_trial(self.side, self.correct)
    }

    pub fn iti_s(&self, config: &LiveTaskConfig) -> f64 {
        if self.correct {
            config.iti_correct_s
        } else {
            config.iti_error_s
        }
    }
}

/// Mutable bookkeeping of the trial in flight.
#[derive(Debug, Clone)]
pub struct Trial {
    pub id: usize,
    pub params: TrialParameters,
    pub state: TrialState,
    /// Scaled time spent in the current state.
    pub state_elapsed: f64,
    pub stimulus: Option<StimulusHandle>,
    pub timings: TrialTimings,
}

/// Values captured at transitions.
#[derive(Debug, Clone, Default)]
pub struct TrialTimings {
    pub started_wall: f64,
    pub init_wheel_angle: f32,
    pub wheel_duration_s: f64,
    /// Wall-clock time the wheel started moving.
    pub first_wheel_move_wall: f64,
    pub iti_s: f64,
}

impl Trial {
    pub fn new(id: usize, params: TrialParameters, started_wall: f64) -> Self {
        Self {
            id,
            params,
            state: TrialState::Quiescent,
            state_elapsed: 0.0,
            stimulus: None,
            timings: TrialTimings {
                started_wall,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn draws_stay_within_configured_ranges() {
        let cfg = LiveTaskConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let p = TrialParameters::draw(&mut rng, &cfg, 1).unwrap();
            assert!((0.2..=0.5).contains(&p.quiescent_s));
            assert!((0.0..0.5).contains(&p.reaction_time_s));
        }
    }

    #[test]
    fn correct_rate_tracks_level() {
        let cfg = LiveTaskConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let n = 4000;
        let correct = (0..n)
            .filter(|_| TrialParameters::draw(&mut rng, &cfg, 2).unwrap().correct)
            .count();
        let rate = correct as f64 / n as f64;
        assert!((rate - 0.9).abs() < 0.03, "rate {rate}");
    }

    #[test]
    fn response_side_follows_correctness() {
        let mut p = TrialParameters {
            quiescent_s: 0.3,
            side: Side::Left,
            correct: true,
            reaction_time_s: 0.1,
        };
        assert_eq!(p.response_side(), Side::Left);
        assert_eq!(p.outcome(), Outcome::LeftCorrect);
        p.correct = false;
        assert_eq!(p.response_side(), Side::Right);
        assert_eq!(p.outcome(), Outcome::LeftIncorrect);
    }

    #[test]
    fn level_out_of_range_is_fatal() {
        let cfg = LiveTaskConfig::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            TrialParameters::draw(&mut rng, &cfg, 7),
            Err(ConfigError::LevelOutOfRange { level: 7, .. })
        ));
    }

    #[test]
    fn same_seed_same_trials() {
        let cfg = LiveTaskConfig::default();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            assert_eq!(
                TrialParameters::draw(&mut a, &cfg, 1).unwrap(),
                TrialParameters::draw(&mut b, &cfg, 1).unwrap()
            );
        }
    }
}
