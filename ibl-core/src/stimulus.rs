use serde::{Deserialize, Serialize};

/// Stimuli the task can put on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StimulusKind {
    Gabor { scale: f32 },
}

impl StimulusKind {
    pub fn gabor(scale: f32) -> Self {
        StimulusKind::Gabor { scale }
    }
}

/// Handle to a stimulus owned by the stimulus sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StimulusHandle(pub u32);

/// Handle to a visual entity (a neuron) owned by the neuron sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(pub u32);

/// RGBA color with components in [0, 1].
pub type Rgba = [f32; 4];

/// Probe colors, one per probe slot.
pub const PROBE_COLORS: [Rgba; 2] = [[0.42, 0.93, 1.0, 0.4], [1.0, 0.78, 0.32, 0.4]];

pub fn probe_color(probe: usize) -> Rgba {
    PROBE_COLORS[probe % PROBE_COLORS.len()]
}
