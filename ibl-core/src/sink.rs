//! Collaborator interfaces the task engine drives.
//!
//! Every call is a synchronous, fire-and-forget side effect. Implementations
//! own rendering, audio and animation; the engine only owns timing.

use crate::stimulus::{EntityHandle, Rgba, StimulusHandle, StimulusKind};
use crate::trial::Side;

pub type Vec3 = [f32; 3];

pub trait StimulusSink {
    fn create(&mut self, kind: StimulusKind) -> StimulusHandle;
    /// Azimuth in degrees, left negative.
    fn set_position(&mut self, handle: StimulusHandle, degrees: f32);
    /// Current azimuth in degrees. The wheel animation may move a stimulus
    /// between ticks, so this is read back rather than tracked.
    fn position(&self, handle: StimulusHandle) -> f32;
    fn set_contrast(&mut self, handle: StimulusHandle, contrast: f32);
    fn destroy(&mut self, handle: StimulusHandle);
}

pub trait AudioSink {
    fn play_go_tone(&mut self);
    fn play_error_noise(&mut self);
}

pub trait RewardSink {
    fn trigger_lick(&mut self);
    fn trigger_drop(&mut self);
}

pub trait WheelActuator {
    fn current_angle(&self) -> f32;
    /// Start rotating the wheel by `degrees` worth of steps, dragging
    /// `target` with it. Returns how long the rotation takes.
    fn rotate_steps(&mut self, degrees: f32, target: StimulusHandle) -> f32;
    fn set_angle(&mut self, degrees: f32);
    /// Stop any rotation in flight and put the paws back.
    fn reset_pose(&mut self);
}

pub trait NeuronSink {
    /// One entity per position, returned in the same order.
    fn spawn_neurons(&mut self, probe: usize, positions: &[Vec3], color: Rgba) -> Vec<EntityHandle>;
    fn set_spiking(&mut self, entity: EntityHandle);
    fn set_scale(&mut self, entity: EntityHandle, scale: f32);
    fn set_color(&mut self, entity: EntityHandle, color: Rgba);
    fn remove_all(&mut self);
}

pub trait ProbeSink {
    fn place_probe(&mut self, probe: usize, tip: Vec3, rotation_deg: Vec3);
    fn clear_probes(&mut self);
}

pub trait VideoSink {
    fn set_frame(&mut self, frame: i64);
}

pub trait PawSink {
    fn set_paw(&mut self, side: Side, position: Vec3);
}

/// Collaborators of the live trial task.
pub struct LiveRig {
    pub stimuli: Box<dyn StimulusSink>,
    pub audio: Box<dyn AudioSink>,
    pub reward: Box<dyn RewardSink>,
    pub wheel: Box<dyn WheelActuator>,
}

/// Collaborators of the replay task.
pub struct ReplayRig {
    pub stimuli: Box<dyn StimulusSink>,
    pub audio: Box<dyn AudioSink>,
    pub reward: Box<dyn RewardSink>,
    pub wheel: Box<dyn WheelActuator>,
    pub neurons: Box<dyn NeuronSink>,
    pub probes: Box<dyn ProbeSink>,
    pub video: Box<dyn VideoSink>,
    pub paws: Box<dyn PawSink>,
}
