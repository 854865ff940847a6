use std::collections::VecDeque;

use ibl_core::{
    LIVE_INDEX_MAX, LiveRig, Outcome, Side, StimulusKind, TrialRecord, TrialState,
};
use ibl_timing::{SessionClock, Timer};
use rand::Rng;
use tracing::{debug, info};

use crate::config::LiveTaskConfig;
use crate::error::{ConfigError, TaskError};
use crate::index::{TimeIndex, safe_fraction, trial_time_index};
use crate::pulse::VisibilityPulse;
use crate::trial::{Trial, TrialParameters};

/// Live stochastic trial generator.
///
/// Every [`tick`](Self::tick) either draws a new trial or steps the active
/// one through Quiescent, StimulusOnset, WheelMovement and FeedbackAndITI.
/// At most one transition happens per tick and each transition's side
/// effects fire exactly once.
pub struct TrialStateMachine<R, T>
where
    R: Rng,
    T: Timer,
{
    config: LiveTaskConfig,
    rng: R,
    timer: T,
    clock: SessionClock,
    rig: LiveRig,
    current: Option<Trial>,
    scripted: VecDeque<TrialParameters>,
    level: usize,
    trial_number: usize,
    time_index: TimeIndex,
    stim_on: VisibilityPulse,
    feedback: VisibilityPulse,
    prev_wheel_angle: f32,
    wheel_delta: f32,
    last_delta: f64,
    records: Vec<TrialRecord>,
    running: bool,
    paused: bool,
}

impl<R, T> TrialStateMachine<R, T>
where
    R: Rng,
    T: Timer,
{
    pub fn new(config: LiveTaskConfig, time_scale: f64, rig: LiveRig, timer: T, rng: R) -> Self {
        let level = config.level;
        let stim_on = VisibilityPulse::new(config.stim_on_window_s);
        let feedback = VisibilityPulse::new(config.feedback_window_s);
        Self {
            config,
            rng,
            timer,
            clock: SessionClock::new(time_scale),
            rig,
            current: None,
            scripted: VecDeque::new(),
            level,
            trial_number: 0,
            time_index: 0,
            stim_on,
            feedback,
            prev_wheel_angle: 0.0,
            wheel_delta: 0.0,
            last_delta: 0.0,
            records: Vec::new(),
            running: false,
            paused: false,
        }
    }

    /// Starts a session, or resumes a paused one where it left off.
    pub fn start(&mut self) {
        if self.paused {
            self.paused = false;
            self.running = true;
            self.clock.resume();
            info!("live task resumed at {:.3}s", self.clock.elapsed());
            return;
        }
        self.clock.reset();
        self.current = None;
        self.time_index = 0;
        self.running = true;
        info!("live task started at level {}", self.level);
    }

    pub fn pause(&mut self) {
        if !self.running {
            return;
        }
        self.paused = true;
        self.running = false;
        self.clock.freeze();
        info!("live task paused at {:.3}s", self.clock.elapsed());
    }

    /// Ends the session. The stimulus in flight is destroyed, both pulses
    /// are cleared and the wheel is put back to rest.
    pub fn stop(&mut self) {
        if let Some(handle) = self.current.take().and_then(|t| t.stimulus) {
            self.rig.stimuli.destroy(handle);
        }
        self.stim_on.clear();
        self.feedback.clear();
        self.wheel_delta = 0.0;
        self.rig.wheel.reset_pose();
        self.running = false;
        self.paused = false;
        self.clock.freeze();
        info!(
            "live task stopped after {} trials ({} recorded)",
            self.trial_number,
            self.records.len()
        );
    }

    /// Advances the task by one frame of `delta` unscaled seconds and returns
    /// the normalized time index.
    pub fn tick(&mut self, delta: f64) -> Result<TimeIndex, TaskError> {
        if !self.running {
            return Ok(self.time_index);
        }
        let scaled = self.clock.advance(delta);
        if scaled <= 0.0 {
            return Ok(self.time_index);
        }
        self.last_delta = scaled;

        if self.current.is_none() {
            self.new_trial()?;
            return Ok(self.time_index);
        }

        let now = self.timer.now_secs();
        let Some(trial) = self.current.as_mut() else {
            return Ok(self.time_index);
        };
        trial.state_elapsed += scaled;

        match trial.state {
            TrialState::Quiescent => {
                if trial.state_elapsed > trial.params.quiescent_s {
                    let side = trial.params.side;
                    let handle = self
                        .rig
                        .stimuli
                        .create(StimulusKind::gabor(self.config.stimulus_scale));
                    self.rig
                        .stimuli
                        .set_position(handle, side.sign() * self.config.stim_azimuth_deg);
                    self.rig.audio.play_go_tone();
                    self.stim_on.raise(side.sign(), now);
                    trial.stimulus = Some(handle);
                    enter(trial, TrialState::StimulusOnset);
                }
            }
            TrialState::StimulusOnset => {
                if trial.state_elapsed > trial.params.reaction_time_s {
                    trial.timings.init_wheel_angle = self.rig.wheel.current_angle();
                    self.prev_wheel_angle = trial.timings.init_wheel_angle;
                    let command = -trial.params.response_side().sign() * self.config.wheel_step_deg;
                    if let Some(handle) = trial.stimulus {
                        let duration = self.rig.wheel.rotate_steps(command, handle);
                        trial.timings.wheel_duration_s = duration as f64;
                    }
                    trial.timings.first_wheel_move_wall = now;
                    enter(trial, TrialState::WheelMovement);
                }
            }
            TrialState::WheelMovement => {
                let angle = self.rig.wheel.current_angle();
                self.wheel_delta = delta_angle(angle, self.prev_wheel_angle);
                self.prev_wheel_angle = angle;

                let position = trial
                    .stimulus
                    .map(|h| self.rig.stimuli.position(h))
                    .unwrap_or(0.0);
                if stimulus_outside_range(
                    trial.params.side,
                    position,
                    self.config.stim_position_triggers_deg,
                ) {
                    self.wheel_delta = 0.0;
                    self.stim_on.clear();
                    self.rig.wheel.reset_pose();
                    let value = if trial.params.correct {
                        self.rig.reward.trigger_lick();
                        1.0
                    } else {
                        self.rig.audio.play_error_noise();
                        -1.0
                    };
                    trial.timings.iti_s = trial.params.iti_s(&self.config);
                    self.feedback.raise(value, now);
                    enter(trial, TrialState::FeedbackAndITI);
                }
            }
            TrialState::FeedbackAndITI => {
                if trial.state_elapsed > trial.timings.iti_s {
                    self.feedback.clear();
                    if let Some(handle) = trial.stimulus.take() {
                        self.rig.stimuli.destroy(handle);
                    }
                    self.end_trial();
                    return Ok(self.time_index);
                }
            }
        }

        self.update_time_index(now);
        Ok(self.time_index)
    }

    fn new_trial(&mut self) -> Result<(), ConfigError> {
        let params = match self.scripted.pop_front() {
            Some(params) => params,
            None => TrialParameters::draw(&mut self.rng, &self.config, self.level)?,
        };
        let id = self.trial_number;
        self.trial_number += 1;
        self.time_index = 0;
        info!(
            "trial {} drawn: side {:?}, correct {}, quiescent {:.3}s, reaction {:.3}s",
            id, params.side, params.correct, params.quiescent_s, params.reaction_time_s
        );
        self.current = Some(Trial::new(id, params, self.timer.now_secs()));
        Ok(())
    }

    fn end_trial(&mut self) {
        let Some(trial) = self.current.take() else {
            return;
        };
        let record = TrialRecord {
            trial_id: trial.id,
            side: trial.params.side,
            correct: trial.params.correct,
            response_side: trial.params.response_side(),
            quiescent_s: trial.params.quiescent_s,
            reaction_time_s: trial.params.reaction_time_s,
            wheel_duration_s: trial.timings.wheel_duration_s,
            iti_s: trial.timings.iti_s,
            ended_at_s: self.clock.elapsed(),
        };
        info!(
            "trial {} complete: {:?} at {:.3}s",
            record.trial_id,
            trial.params.outcome(),
            record.ended_at_s
        );
        self.records.push(record);
    }

    /// Recomputes the index for the active state. Within a trial the index
    /// never decreases.
    fn update_time_index(&mut self, now: f64) {
        let Some(trial) = &self.current else {
            return;
        };
        let fraction = match trial.state {
            TrialState::Quiescent => safe_fraction(trial.state_elapsed, trial.params.quiescent_s),
            TrialState::StimulusOnset => {
                safe_fraction(trial.state_elapsed, trial.params.reaction_time_s)
            }
            TrialState::WheelMovement => safe_fraction(
                self.clock.time_scale() * (now - trial.timings.first_wheel_move_wall),
                trial.timings.wheel_duration_s,
            ),
            TrialState::FeedbackAndITI => safe_fraction(trial.state_elapsed, trial.timings.iti_s),
        };
        let index = trial_time_index(trial.params.outcome(), trial.state, fraction);
        self.time_index = index.max(self.time_index).min(LIVE_INDEX_MAX);
    }

    /// Forces the parameters of an upcoming trial. Scripted trials run in
    /// queue order before any random draw.
    pub fn queue_trial(&mut self, params: TrialParameters) {
        self.scripted.push_back(params);
    }

    pub fn set_level(&mut self, level: usize) -> Result<(), ConfigError> {
        self.config.check_level(level)?;
        self.level = level;
        Ok(())
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn set_time_scale(&mut self, scale: f64) -> bool {
        self.clock.set_time_scale(scale)
    }

    pub fn speed_up(&mut self) -> f64 {
        self.clock.speed_up()
    }

    pub fn slow_down(&mut self) -> f64 {
        self.clock.slow_down()
    }

    pub fn time_scale(&self) -> f64 {
        self.clock.time_scale()
    }

    /// Scaled seconds since the session started.
    pub fn task_time(&self) -> f64 {
        self.clock.elapsed()
    }

    pub fn time_index(&self) -> TimeIndex {
        self.time_index
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> Option<TrialState> {
        self.current.as_ref().map(|t| t.state)
    }

    pub fn side(&self) -> Option<Side> {
        self.current.as_ref().map(|t| t.params.side)
    }

    pub fn correct(&self) -> Option<bool> {
        self.current.as_ref().map(|t| t.params.correct)
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.current.as_ref().map(|t| t.params.outcome())
    }

    pub fn current_trial(&self) -> Option<&Trial> {
        self.current.as_ref()
    }

    /// Stimulus side sign while the onset cue is visible, 0 otherwise.
    pub fn stim_on_pulse(&self) -> f32 {
        self.stim_on.value(self.timer.now_secs())
    }

    /// 1 after a reward, -1 after an error, for the feedback window.
    pub fn feedback_pulse(&self) -> f32 {
        self.feedback.value(self.timer.now_secs())
    }

    /// Wheel speed in radians per second over the last tick.
    pub fn wheel_velocity(&self) -> f32 {
        if self.last_delta <= 0.0 {
            return 0.0;
        }
        (self.wheel_delta.to_radians() as f64 / self.last_delta) as f32
    }

    /// Trials started in this task, including the one in flight.
    pub fn trial_number(&self) -> usize {
        self.trial_number
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }
}

fn enter(trial: &mut Trial, state: TrialState) {
    debug!(
        "trial {}: {:?} -> {:?} after {:.3}s",
        trial.id, trial.state, state, trial.state_elapsed
    );
    trial.state = state;
    trial.state_elapsed = 0.0;
}

/// Shortest signed difference from `from` to `to`, in degrees.
fn delta_angle(from: f32, to: f32) -> f32 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Whether the stimulus has been carried to the centre or off its own side.
/// A right stimulus finishes at or below the first trigger or at or above the
/// second; a left stimulus mirrors the first check and negates the second.
pub fn stimulus_outside_range(side: Side, position: f32, triggers: [f32; 2]) -> bool {
    match side {
        Side::Right => position <= triggers[0] || position >= triggers[1],
        Side::Left => position >= triggers[0] || position <= -triggers[1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibl_core::{Effect, SimulatedRig};
    use ibl_timing::ManualTimer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const DT: f64 = 0.01;

    fn machine(seed: u64) -> (TrialStateMachine<StdRng, ManualTimer>, SimulatedRig, ManualTimer) {
        let rig = SimulatedRig::new();
        let timer = ManualTimer::new();
        let sm = TrialStateMachine::new(
            LiveTaskConfig::default(),
            1.0,
            rig.live_rig(),
            timer.clone(),
            StdRng::seed_from_u64(seed),
        );
        (sm, rig, timer)
    }

    fn step(
        sm: &mut TrialStateMachine<StdRng, ManualTimer>,
        rig: &SimulatedRig,
        timer: &ManualTimer,
    ) -> TimeIndex {
        timer.advance_secs(DT);
        rig.advance((DT * sm.time_scale()) as f32);
        sm.tick(DT).unwrap()
    }

    fn scripted(side: Side, correct: bool) -> TrialParameters {
        TrialParameters {
            quiescent_s: 0.3,
            side,
            correct,
            reaction_time_s: 0.2,
        }
    }

    #[test]
    fn ticks_before_start_do_nothing() {
        let (mut sm, rig, _timer) = machine(1);
        assert_eq!(sm.tick(0.5).unwrap(), 0);
        assert!(sm.state().is_none());
        assert!(rig.effects().is_empty());
    }

    #[test]
    fn first_tick_draws_a_quiescent_trial() {
        let (mut sm, rig, timer) = machine(1);
        sm.start();
        step(&mut sm, &rig, &timer);
        assert_eq!(sm.state(), Some(TrialState::Quiescent));
        assert_eq!(sm.trial_number(), 1);
        assert_eq!(sm.time_index(), 0);
    }

    #[test]
    fn runs_a_left_correct_trial_to_completion() {
        let (mut sm, rig, timer) = machine(1);
        sm.queue_trial(scripted(Side::Left, true));
        sm.start();

        let mut states = Vec::new();
        for _ in 0..1000 {
            step(&mut sm, &rig, &timer);
            match sm.state() {
                Some(s) if states.last() != Some(&s) => states.push(s),
                None if !states.is_empty() => break,
                _ => {}
            }
        }
        assert_eq!(
            states,
            vec![
                TrialState::Quiescent,
                TrialState::StimulusOnset,
                TrialState::WheelMovement,
                TrialState::FeedbackAndITI
            ]
        );
        assert_eq!(rig.count(|e| *e == Effect::GoTone), 1);
        assert_eq!(rig.count(|e| *e == Effect::Lick), 1);
        assert_eq!(rig.count(|e| *e == Effect::ErrorNoise), 0);
        assert!(rig.live_stimuli().is_empty());
        assert_eq!(sm.records().len(), 1);
        assert!(sm.records()[0].correct);
    }

    #[test]
    fn error_trial_plays_noise_and_raises_negative_feedback() {
        let (mut sm, rig, timer) = machine(1);
        sm.queue_trial(scripted(Side::Right, false));
        sm.start();
        while sm.state() != Some(TrialState::FeedbackAndITI) {
            step(&mut sm, &rig, &timer);
        }
        assert_eq!(rig.count(|e| *e == Effect::ErrorNoise), 1);
        assert_eq!(sm.feedback_pulse(), -1.0);
        assert_eq!(sm.stim_on_pulse(), 0.0);
        timer.advance_secs(1.01);
        assert_eq!(sm.feedback_pulse(), 0.0);
    }

    #[test]
    fn stimulus_onset_raises_side_pulse_for_one_second() {
        let (mut sm, rig, timer) = machine(1);
        sm.queue_trial(TrialParameters {
            reaction_time_s: 5.0,
            ..scripted(Side::Left, true)
        });
        sm.start();
        while sm.state() != Some(TrialState::StimulusOnset) {
            step(&mut sm, &rig, &timer);
        }
        assert_eq!(sm.stim_on_pulse(), -1.0);
        for _ in 0..101 {
            step(&mut sm, &rig, &timer);
        }
        assert_eq!(sm.state(), Some(TrialState::StimulusOnset));
        assert_eq!(sm.stim_on_pulse(), 0.0);
    }

    #[test]
    fn wheel_command_opposes_response_side() {
        for (side, correct) in [
            (Side::Left, true),
            (Side::Left, false),
            (Side::Right, true),
            (Side::Right, false),
        ] {
            let (mut sm, rig, timer) = machine(1);
            let params = scripted(side, correct);
            let expected = -params.response_side().sign() * 10.0;
            sm.queue_trial(params);
            sm.start();
            while sm.state() != Some(TrialState::WheelMovement) {
                step(&mut sm, &rig, &timer);
            }
            let commands: Vec<f32> = rig
                .effects()
                .iter()
                .filter_map(|e| match e {
                    Effect::WheelRotation { degrees, .. } => Some(*degrees),
                    _ => None,
                })
                .collect();
            assert_eq!(commands, vec![expected]);
        }
    }

    #[test]
    fn zero_delta_is_a_no_op() {
        let (mut sm, rig, timer) = machine(5);
        sm.start();
        for _ in 0..40 {
            step(&mut sm, &rig, &timer);
        }
        let state = sm.state();
        let index = sm.time_index();
        let effects = rig.effects().len();
        assert_eq!(sm.tick(0.0).unwrap(), index);
        assert_eq!(sm.state(), state);
        assert_eq!(rig.effects().len(), effects);
    }

    #[test]
    fn index_is_monotonic_within_a_trial() {
        let (mut sm, rig, timer) = machine(9);
        sm.start();
        let mut prev = 0;
        let mut trial = 0;
        for _ in 0..5000 {
            let idx = step(&mut sm, &rig, &timer);
            if sm.trial_number() != trial {
                trial = sm.trial_number();
                prev = idx;
                continue;
            }
            assert!(idx >= prev, "index went from {prev} to {idx}");
            assert!(idx <= LIVE_INDEX_MAX);
            prev = idx;
        }
        assert!(sm.records().len() > 1);
    }

    #[test]
    fn stop_leaves_nothing_behind() {
        let (mut sm, rig, timer) = machine(1);
        sm.queue_trial(scripted(Side::Left, true));
        sm.start();
        while sm.state() != Some(TrialState::WheelMovement) {
            step(&mut sm, &rig, &timer);
        }
        sm.stop();
        assert!(rig.live_stimuli().is_empty());
        assert!(!rig.is_rotating());
        assert_eq!(sm.stim_on_pulse(), 0.0);
        assert!(sm.state().is_none());
        let before = rig.effects().len();
        step(&mut sm, &rig, &timer);
        assert_eq!(rig.effects().len(), before);
    }

    #[test]
    fn pause_freezes_and_start_resumes() {
        let (mut sm, rig, timer) = machine(1);
        sm.start();
        for _ in 0..10 {
            step(&mut sm, &rig, &timer);
        }
        let t = sm.task_time();
        sm.pause();
        step(&mut sm, &rig, &timer);
        assert_eq!(sm.task_time(), t);
        sm.start();
        assert!(sm.state().is_some());
        step(&mut sm, &rig, &timer);
        assert!(sm.task_time() > t);
    }

    #[test]
    fn bad_level_surfaces_on_trial_generation() {
        let rig = SimulatedRig::new();
        let config = LiveTaskConfig {
            level: 4,
            ..Default::default()
        };
        let mut sm = TrialStateMachine::new(
            config,
            1.0,
            rig.live_rig(),
            ManualTimer::new(),
            StdRng::seed_from_u64(0),
        );
        sm.start();
        assert!(matches!(
            sm.tick(0.1),
            Err(TaskError::Config(ConfigError::LevelOutOfRange { level: 4, .. }))
        ));
        assert!(sm.set_level(9).is_err());
        assert!(sm.set_level(0).is_ok());
        assert!(sm.tick(0.1).is_ok());
    }

    #[test]
    fn outside_range_checks_mirror_by_side() {
        let triggers = [0.0, 45.0];
        assert!(!stimulus_outside_range(Side::Left, -25.0, triggers));
        assert!(stimulus_outside_range(Side::Left, 0.0, triggers));
        assert!(stimulus_outside_range(Side::Left, -45.0, triggers));
        assert!(!stimulus_outside_range(Side::Right, 25.0, triggers));
        assert!(stimulus_outside_range(Side::Right, 0.0, triggers));
        assert!(stimulus_outside_range(Side::Right, 45.0, triggers));
    }

    #[test]
    fn delta_angle_wraps() {
        assert_eq!(delta_angle(350.0, 10.0), 20.0);
        assert_eq!(delta_angle(10.0, 350.0), -20.0);
    }
}
