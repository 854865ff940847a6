use ibl_core::{Effect, Side, SimulatedRig, TrialState};
use ibl_experiment::{LiveTaskConfig, TrialStateMachine};
use ibl_timing::ManualTimer;
use rand::SeedableRng;
use rand::rngs::StdRng;

const DT: f64 = 1.0 / 60.0;

struct Harness {
    sm: TrialStateMachine<StdRng, ManualTimer>,
    rig: SimulatedRig,
    timer: ManualTimer,
}

impl Harness {
    fn new(seed: u64, config: LiveTaskConfig, time_scale: f64) -> Self {
        let rig = SimulatedRig::new();
        let timer = ManualTimer::new();
        let mut sm = TrialStateMachine::new(
            config,
            time_scale,
            rig.live_rig(),
            timer.clone(),
            StdRng::seed_from_u64(seed),
        );
        sm.start();
        Self { sm, rig, timer }
    }

    fn step(&mut self) -> u32 {
        self.timer.advance_secs(DT);
        self.rig.advance((DT * self.sm.time_scale()) as f32);
        self.sm.tick(DT).unwrap()
    }

    /// Steps until `n` trials have completed and returns the state sequence
    /// seen in each.
    fn run_trials(&mut self, n: usize) -> Vec<Vec<TrialState>> {
        let mut trials: Vec<Vec<TrialState>> = Vec::new();
        let mut last_trial = 0;
        while self.sm.records().len() < n {
            self.step();
            if let Some(state) = self.sm.state() {
                if self.sm.trial_number() != last_trial {
                    last_trial = self.sm.trial_number();
                    trials.push(Vec::new());
                }
                let seq = trials.last_mut().unwrap();
                if seq.last() != Some(&state) {
                    seq.push(state);
                }
            }
        }
        trials
    }
}

#[test]
fn every_trial_visits_each_state_once_in_order() {
    let mut h = Harness::new(17, LiveTaskConfig::default(), 1.0);
    let trials = h.run_trials(25);
    assert_eq!(trials.len(), 25);
    for seq in trials {
        assert_eq!(seq, TrialState::ALL.to_vec());
    }
}

#[test]
fn same_seed_same_effect_sequence() {
    let mut a = Harness::new(99, LiveTaskConfig::default(), 0.5);
    let mut b = Harness::new(99, LiveTaskConfig::default(), 0.5);
    a.run_trials(10);
    b.run_trials(10);
    assert_eq!(a.rig.effects(), b.rig.effects());
    assert_eq!(a.sm.records(), b.sm.records());
}

#[test]
fn left_stimulus_wheel_direction_follows_response_side() {
    let config = LiveTaskConfig {
        level: 1,
        percent_correct_levels: vec![0.5, 0.75, 0.9],
        quiescent_range_s: (0.2, 0.5),
        ..Default::default()
    };
    let step = config.wheel_step_deg;
    let mut h = Harness::new(4, config, 1.0);
    let mut checked = [0usize; 2];

    while checked.iter().any(|&c| c < 3) {
        while h.sm.state() != Some(TrialState::WheelMovement) {
            h.step();
        }
        let side = h.sm.side().unwrap();
        let correct = h.sm.correct().unwrap();
        let command = h
            .rig
            .effects()
            .iter()
            .rev()
            .find_map(|e| match e {
                Effect::WheelRotation { degrees, .. } => Some(*degrees),
                _ => None,
            })
            .unwrap();
        if side == Side::Left {
            let response_differs = !correct;
            assert_eq!(command == step, !response_differs);
            assert_eq!(command == -step, response_differs);
            checked[usize::from(correct)] += 1;
        }
        while h.sm.state() == Some(TrialState::WheelMovement) {
            h.step();
        }
    }
}

#[test]
fn go_tone_and_feedback_fire_once_per_trial() {
    let mut h = Harness::new(8, LiveTaskConfig::default(), 1.0);
    h.run_trials(12);
    let completed = h.sm.records().len();
    let rewards = h.rig.count(|e| *e == Effect::Lick);
    let errors = h.rig.count(|e| *e == Effect::ErrorNoise);
    let correct = h.sm.records().iter().filter(|r| r.correct).count();
    assert_eq!(rewards, correct);
    assert_eq!(errors, completed - correct);
    let tones = h.rig.count(|e| *e == Effect::GoTone);
    assert!(tones == completed || tones == completed + 1);
}

#[test]
fn each_trial_destroys_its_stimulus_before_the_next_one_appears() {
    let mut h = Harness::new(23, LiveTaskConfig::default(), 1.0);
    while h.sm.records().len() < 8 {
        h.step();
        assert!(h.rig.live_stimuli().len() <= 1);
    }
    let created = h.rig.count(|e| matches!(e, Effect::StimulusCreated { .. }));
    let destroyed = h.rig.count(|e| matches!(e, Effect::StimulusDestroyed { .. }));
    assert!(created == destroyed || created == destroyed + 1);

    h.sm.stop();
    assert!(h.rig.live_stimuli().is_empty());
}

#[test]
fn zero_delta_ticks_change_nothing() {
    let mut h = Harness::new(3, LiveTaskConfig::default(), 1.0);
    for i in 0..400 {
        h.step();
        if i % 7 == 0 {
            let index = h.sm.time_index();
            let state = h.sm.state();
            let effects = h.rig.effects().len();
            let time = h.sm.task_time();
            assert_eq!(h.sm.tick(0.0).unwrap(), index);
            assert_eq!(h.sm.state(), state);
            assert_eq!(h.rig.effects().len(), effects);
            assert_eq!(h.sm.task_time(), time);
        }
    }
}

#[test]
fn index_never_decreases_within_a_trial_when_slowed_down() {
    let mut h = Harness::new(21, LiveTaskConfig::default(), 1.0);
    let mut prev = 0;
    let mut trial = 0;
    let mut slowed = false;
    while h.sm.records().len() < 8 {
        if !slowed && h.sm.state() == Some(TrialState::WheelMovement) {
            h.sm.slow_down();
            slowed = true;
        }
        let index = h.step();
        if h.sm.trial_number() != trial {
            trial = h.sm.trial_number();
            prev = index;
            continue;
        }
        assert!(index >= prev, "index fell from {prev} to {index}");
        prev = index;
    }
    assert!(slowed);
}

#[test]
fn time_scale_stretches_task_time() {
    let mut h = Harness::new(1, LiveTaskConfig::default(), 0.125);
    for _ in 0..60 {
        h.step();
    }
    assert!((h.sm.task_time() - 0.125).abs() < 1e-9);
    assert_eq!(h.sm.speed_up(), 0.25);
}
