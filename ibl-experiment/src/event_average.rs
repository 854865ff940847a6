//! Drives neuron scale from precomputed event-averaged firing rates.

use ibl_core::{EntityHandle, NeuronSink, Outcome, WaveformLayout};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::TimeIndex;

/// Mean firing rate of one neuron around task events, four outcome blocks
/// concatenated in [`Outcome::ALL`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateProfile {
    pub rates: Vec<f32>,
    pub baseline: f32,
}

impl RateProfile {
    /// Rate above baseline as a fraction of baseline, clamped to [0, 10].
    pub fn relative_rate(&self, sample: usize) -> Option<f32> {
        let rate = *self.rates.get(sample)?;
        if self.baseline <= 0.0 {
            return Some(0.0);
        }
        Some(((rate - self.baseline) / self.baseline).clamp(0.0, 10.0))
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventAverageTable {
    layout: WaveformLayout,
    entries: Vec<(EntityHandle, RateProfile)>,
}

impl EventAverageTable {
    /// Pairs spawned entities with their profiles; extras on either side are
    /// dropped.
    pub fn bind(layout: WaveformLayout, entities: &[EntityHandle], profiles: Vec<RateProfile>) -> Self {
        Self {
            layout,
            entries: entities.iter().copied().zip(profiles).collect(),
        }
    }

    pub fn layout(&self) -> WaveformLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pushes per-neuron scales for the current time index, only when the
/// global waveform sample changes.
#[derive(Debug, Clone)]
pub struct EventAverageDriver {
    pub brain_scale: f32,
    pub spiking_scale: f32,
    prev_sample: Option<usize>,
}

impl Default for EventAverageDriver {
    fn default() -> Self {
        Self {
            brain_scale: 0.0625,
            spiking_scale: 10.0,
            prev_sample: None,
        }
    }
}

impl EventAverageDriver {
    pub fn new(brain_scale: f32, spiking_scale: f32) -> Self {
        Self {
            brain_scale,
            spiking_scale,
            prev_sample: None,
        }
    }

    /// Returns true when scales were pushed.
    pub fn apply(
        &mut self,
        index: TimeIndex,
        outcome: Outcome,
        table: &EventAverageTable,
        sink: &mut dyn NeuronSink,
    ) -> bool {
        let sample = outcome.waveform_offset(table.layout) + index as usize;
        if self.prev_sample == Some(sample) {
            return false;
        }
        self.prev_sample = Some(sample);
        let mut skipped = 0;
        for (entity, profile) in &table.entries {
            match profile.relative_rate(sample) {
                Some(rel) => sink.set_scale(*entity, rel * self.brain_scale / self.spiking_scale),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("{skipped} profiles shorter than sample {sample}");
        }
        true
    }

    /// Forces the next [`apply`](Self::apply) to push.
    pub fn invalidate(&mut self) {
        self.prev_sample = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibl_core::SimulatedRig;

    fn profile(value_at: usize, rate: f32) -> RateProfile {
        let mut rates = vec![2.0; 1000];
        rates[value_at] = rate;
        RateProfile {
            rates,
            baseline: 2.0,
        }
    }

    #[test]
    fn relative_rate_clamps() {
        let p = RateProfile {
            rates: vec![1.0, 4.0, 100.0],
            baseline: 2.0,
        };
        assert_eq!(p.relative_rate(0), Some(0.0));
        assert_eq!(p.relative_rate(1), Some(1.0));
        assert_eq!(p.relative_rate(2), Some(10.0));
        assert_eq!(p.relative_rate(3), None);
    }

    #[test]
    fn pushes_scale_from_outcome_block() {
        let rig = SimulatedRig::new();
        let mut sink = rig.clone();
        let entities = sink.spawn_neurons(0, &[[0.0; 3]], [1.0; 4]);
        // Right-incorrect block starts at 750.
        let table = EventAverageTable::bind(WaveformLayout::Full, &entities, vec![profile(760, 6.0)]);
        let mut driver = EventAverageDriver::new(1.0, 10.0);

        assert!(driver.apply(10, Outcome::RightIncorrect, &table, &mut sink));
        assert_eq!(rig.neuron_scale(entities[0]), Some(0.2));
    }

    #[test]
    fn unchanged_index_pushes_nothing() {
        let rig = SimulatedRig::new();
        let mut sink = rig.clone();
        let entities = sink.spawn_neurons(0, &[[0.0; 3]], [1.0; 4]);
        let table = EventAverageTable::bind(WaveformLayout::Full, &entities, vec![profile(5, 6.0)]);
        let mut driver = EventAverageDriver::default();
        assert!(driver.apply(5, Outcome::LeftCorrect, &table, &mut sink));
        assert!(!driver.apply(5, Outcome::LeftCorrect, &table, &mut sink));
        assert!(driver.apply(5, Outcome::LeftIncorrect, &table, &mut sink));
        driver.invalidate();
        assert!(driver.apply(5, Outcome::LeftIncorrect, &table, &mut sink));
    }
}
