//! In-process rig that stands in for the 3D scene.
//!
//! [`SimulatedRig`] implements every sink trait, records discrete side
//! effects in order and animates wheel rotations so a live trial can run to
//! completion without an engine. Clones share state: hand boxed clones to a
//! task and keep one to inspect what happened.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::sink::{
    AudioSink, LiveRig, NeuronSink, PawSink, ProbeSink, ReplayRig, RewardSink, StimulusSink,
    Vec3, VideoSink, WheelActuator,
};
use crate::stimulus::{EntityHandle, Rgba, StimulusHandle, StimulusKind};
use crate::trial::Side;

/// Discrete side effect observed by the rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    StimulusCreated { handle: StimulusHandle, kind: StimulusKind },
    StimulusPositioned { handle: StimulusHandle, degrees: f32 },
    ContrastSet { handle: StimulusHandle, contrast: f32 },
    StimulusDestroyed { handle: StimulusHandle },
    GoTone,
    ErrorNoise,
    Lick,
    Drop,
    WheelRotation { degrees: f32, target: StimulusHandle, duration: f32 },
    WheelReset,
    NeuronsSpawned { probe: usize, count: usize },
    Spike { entity: EntityHandle },
    NeuronsCleared,
    ProbePlaced { probe: usize, tip: Vec3, rotation_deg: Vec3 },
    ProbesCleared,
}

/// How a wheel command moves the stimulus it drags.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RigKinematics {
    /// Stimulus azimuth change per wheel step, in degrees.
    gain_deg_per_step: f32,
    seconds_per_step: f32,
}

impl Default for RigKinematics {
    fn default() -> Self {
        Self {
            gain_deg_per_step: 2.5,
            seconds_per_step: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
struct Rotation {
    target: StimulusHandle,
    start_position: f32,
    displacement: f32,
    start_angle: f32,
    degrees: f32,
    duration: f32,
    elapsed: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct StimulusState {
    position: f32,
    contrast: f32,
}

#[derive(Debug, Clone, Copy)]
struct NeuronState {
    probe: usize,
    scale: f32,
    color: Rgba,
    spikes: u32,
}

#[derive(Debug, Default)]
struct RigInner {
    kinematics: RigKinematics,
    effects: Vec<Effect>,
    /// Spikes only bump per-neuron counters instead of growing `effects`.
    quiet_spikes: bool,
    next_stimulus: u32,
    stimuli: BTreeMap<StimulusHandle, StimulusState>,
    next_entity: u32,
    neurons: BTreeMap<EntityHandle, NeuronState>,
    wheel_angle: f32,
    rotation: Option<Rotation>,
    video_frame: Option<i64>,
    paws: [Vec3; 2],
    probes: BTreeMap<usize, (Vec3, Vec3)>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedRig {
    inner: Rc<RefCell<RigInner>>,
}

impl SimulatedRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A rig that counts spikes per neuron without logging each one.
    pub fn without_spike_log() -> Self {
        let rig = Self::default();
        rig.inner.borrow_mut().quiet_spikes = true;
        rig
    }

    pub fn live_rig(&self) -> LiveRig {
        LiveRig {
            stimuli: Box::new(self.clone()),
            audio: Box::new(self.clone()),
            reward: Box::new(self.clone()),
            wheel: Box::new(self.clone()),
        }
    }

    pub fn replay_rig(&self) -> ReplayRig {
        ReplayRig {
            stimuli: Box::new(self.clone()),
            audio: Box::new(self.clone()),
            reward: Box::new(self.clone()),
            wheel: Box::new(self.clone()),
            neurons: Box::new(self.clone()),
            probes: Box::new(self.clone()),
            video: Box::new(self.clone()),
            paws: Box::new(self.clone()),
        }
    }

    /// Advance any wheel rotation in flight by `dt` seconds of scaled time.
    pub fn advance(&self, dt: f32) {
        let mut inner = self.inner.borrow_mut();
        let Some(rot) = inner.rotation.as_mut() else {
            return;
        };
        rot.elapsed += dt.max(0.0);
        let f = if rot.duration > 0.0 {
            (rot.elapsed / rot.duration).min(1.0)
        } else {
            1.0
        };
        let position = rot.start_position + rot.displacement * f;
        let angle = rot.start_angle + rot.degrees * f;
        let target = rot.target;
        if f >= 1.0 {
            inner.rotation = None;
        }
        inner.wheel_angle = angle;
        if let Some(stim) = inner.stimuli.get_mut(&target) {
            stim.position = position;
        }
    }

    pub fn is_rotating(&self) -> bool {
        self.inner.borrow().rotation.is_some()
    }

    pub fn effects(&self) -> Vec<Effect> {
        self.inner.borrow().effects.clone()
    }

    pub fn take_effects(&self) -> Vec<Effect> {
        std::mem::take(&mut self.inner.borrow_mut().effects)
    }

    pub fn count(&self, pred: impl Fn(&Effect) -> bool) -> usize {
        self.inner.borrow().effects.iter().filter(|e| pred(e)).count()
    }

    /// Moves a stimulus without logging an effect, as an animation would.
    pub fn nudge_stimulus(&self, handle: StimulusHandle, degrees: f32) {
        if let Some(stim) = self.inner.borrow_mut().stimuli.get_mut(&handle) {
            stim.position = degrees;
        }
    }

    pub fn live_stimuli(&self) -> Vec<StimulusHandle> {
        self.inner.borrow().stimuli.keys().copied().collect()
    }

    pub fn stimulus_contrast(&self, handle: StimulusHandle) -> Option<f32> {
        self.inner.borrow().stimuli.get(&handle).map(|s| s.contrast)
    }

    pub fn wheel_angle(&self) -> f32 {
        self.inner.borrow().wheel_angle
    }

    pub fn video_frame(&self) -> Option<i64> {
        self.inner.borrow().video_frame
    }

    pub fn paw(&self, side: Side) -> Vec3 {
        self.inner.borrow().paws[paw_slot(side)]
    }

    pub fn neuron_count(&self) -> usize {
        self.inner.borrow().neurons.len()
    }

    pub fn neurons_on_probe(&self, probe: usize) -> usize {
        self.inner
            .borrow()
            .neurons
            .values()
            .filter(|n| n.probe == probe)
            .count()
    }

    pub fn neuron_scale(&self, entity: EntityHandle) -> Option<f32> {
        self.inner.borrow().neurons.get(&entity).map(|n| n.scale)
    }

    pub fn neuron_color(&self, entity: EntityHandle) -> Option<Rgba> {
        self.inner.borrow().neurons.get(&entity).map(|n| n.color)
    }

    pub fn spike_count(&self, entity: EntityHandle) -> u32 {
        self.inner
            .borrow()
            .neurons
            .get(&entity)
            .map_or(0, |n| n.spikes)
    }

    pub fn placed_probes(&self) -> Vec<usize> {
        self.inner.borrow().probes.keys().copied().collect()
    }

    fn log(&self, effect: Effect) {
        self.inner.borrow_mut().effects.push(effect);
    }
}

fn paw_slot(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

impl StimulusSink for SimulatedRig {
    fn create(&mut self, kind: StimulusKind) -> StimulusHandle {
        let handle = {
            let mut inner = self.inner.borrow_mut();
            let handle = StimulusHandle(inner.next_stimulus);
            inner.next_stimulus += 1;
            inner.stimuli.insert(handle, StimulusState::default());
            handle
        };
        self.log(Effect::StimulusCreated { handle, kind });
        handle
    }

    fn set_position(&mut self, handle: StimulusHandle, degrees: f32) {
        self.nudge_stimulus(handle, degrees);
        self.log(Effect::StimulusPositioned { handle, degrees });
    }

    fn position(&self, handle: StimulusHandle) -> f32 {
        self.inner
            .borrow()
            .stimuli
            .get(&handle)
            .map_or(0.0, |s| s.position)
    }

    fn set_contrast(&mut self, handle: StimulusHandle, contrast: f32) {
        if let Some(stim) = self.inner.borrow_mut().stimuli.get_mut(&handle) {
            stim.contrast = contrast;
        }
        self.log(Effect::ContrastSet { handle, contrast });
    }

    fn destroy(&mut self, handle: StimulusHandle) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.stimuli.remove(&handle);
            if inner.rotation.as_ref().is_some_and(|r| r.target == handle) {
                inner.rotation = None;
            }
        }
        self.log(Effect::StimulusDestroyed { handle });
    }
}

impl AudioSink for SimulatedRig {
    fn play_go_tone(&mut self) {
        self.log(Effect::GoTone);
    }

    fn play_error_noise(&mut self) {
        self.log(Effect::ErrorNoise);
    }
}

impl RewardSink for SimulatedRig {
    fn trigger_lick(&mut self) {
        self.log(Effect::Lick);
    }

    fn trigger_drop(&mut self) {
        self.log(Effect::Drop);
    }
}

impl WheelActuator for SimulatedRig {
    fn current_angle(&self) -> f32 {
        self.inner.borrow().wheel_angle
    }

    fn rotate_steps(&mut self, degrees: f32, target: StimulusHandle) -> f32 {
        let duration = {
            let mut inner = self.inner.borrow_mut();
            let k = inner.kinematics;
            let duration = degrees.abs() * k.seconds_per_step;
            let start_position = inner.stimuli.get(&target).map_or(0.0, |s| s.position);
            let start_angle = inner.wheel_angle;
            inner.rotation = Some(Rotation {
                target,
                start_position,
                displacement: degrees * k.gain_deg_per_step,
                start_angle,
                degrees,
                duration,
                elapsed: 0.0,
            });
            duration
        };
        self.log(Effect::WheelRotation {
            degrees,
            target,
            duration,
        });
        duration
    }

    fn set_angle(&mut self, degrees: f32) {
        self.inner.borrow_mut().wheel_angle = degrees;
    }

    fn reset_pose(&mut self) {
        self.inner.borrow_mut().rotation = None;
        self.log(Effect::WheelReset);
    }
}

impl NeuronSink for SimulatedRig {
    fn spawn_neurons(&mut self, probe: usize, positions: &[Vec3], color: Rgba) -> Vec<EntityHandle> {
        let handles = {
            let mut inner = self.inner.borrow_mut();
            let mut handles = Vec::with_capacity(positions.len());
            for _ in positions {
                let handle = EntityHandle(inner.next_entity);
                inner.next_entity += 1;
                inner.neurons.insert(
                    handle,
                    NeuronState {
                        probe,
                        scale: 0.0,
                        color,
                        spikes: 0,
                    },
                );
                handles.push(handle);
            }
            handles
        };
        self.log(Effect::NeuronsSpawned {
            probe,
            count: handles.len(),
        });
        handles
    }

    fn set_spiking(&mut self, entity: EntityHandle) {
        let quiet = {
            let mut inner = self.inner.borrow_mut();
            if let Some(n) = inner.neurons.get_mut(&entity) {
                n.spikes += 1;
            }
            inner.quiet_spikes
        };
        if !quiet {
            self.log(Effect::Spike { entity });
        }
    }

    fn set_scale(&mut self, entity: EntityHandle, scale: f32) {
        if let Some(n) = self.inner.borrow_mut().neurons.get_mut(&entity) {
            n.scale = scale;
        }
    }

    fn set_color(&mut self, entity: EntityHandle, color: Rgba) {
        if let Some(n) = self.inner.borrow_mut().neurons.get_mut(&entity) {
            n.color = color;
        }
    }

    fn remove_all(&mut self) {
        self.inner.borrow_mut().neurons.clear();
        self.log(Effect::NeuronsCleared);
    }
}

impl ProbeSink for SimulatedRig {
    fn place_probe(&mut self, probe: usize, tip: Vec3, rotation_deg: Vec3) {
        self.inner
            .borrow_mut()
            .probes
            .insert(probe, (tip, rotation_deg));
        self.log(Effect::ProbePlaced {
            probe,
            tip,
            rotation_deg,
        });
    }

    fn clear_probes(&mut self) {
        self.inner.borrow_mut().probes.clear();
        self.log(Effect::ProbesCleared);
    }
}

impl VideoSink for SimulatedRig {
    fn set_frame(&mut self, frame: i64) {
        self.inner.borrow_mut().video_frame = Some(frame);
    }
}

impl PawSink for SimulatedRig {
    fn set_paw(&mut self, side: Side, position: Vec3) {
        self.inner.borrow_mut().paws[paw_slot(side)] = position;
    }
}
