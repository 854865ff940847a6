//! Generated sessions and firing-rate profiles for running without recorded data.

use std::collections::BTreeMap;

use ibl_core::{Outcome, Vec3, WaveformLayout};
use ibl_experiment::{ProbeData, ProbeTrajectory, RateProfile, ReplaySession};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TRIAL_PERIOD_S: f64 = 4.0;
const WHEEL_RATE_HZ: f64 = 100.0;
const CLUSTERS_PER_PROBE: usize = 64;
const SPIKE_RATE_HZ: f64 = 400.0;

/// A session of `seconds` length: one trial every few seconds with matching
/// wheel turns and licks, and two probes of Poisson-ish spiking.
pub fn session(eid: &str, seconds: f64, seed: u64) -> ReplaySession {
    let mut rng = StdRng::seed_from_u64(seed);
    let seconds = seconds.max(TRIAL_PERIOD_S);
    let trials = (seconds / TRIAL_PERIOD_S) as usize;

    let mut go_cue_times = Vec::with_capacity(trials);
    let mut contrast_left = Vec::with_capacity(trials);
    let mut contrast_right = Vec::with_capacity(trials);
    let mut feedback_times = Vec::with_capacity(trials);
    let mut feedback_types = Vec::with_capacity(trials);
    let mut lick_times = Vec::new();
    // (start, end, radians) of each wheel turn
    let mut turns = Vec::with_capacity(trials);

    for i in 0..trials {
        let go = i as f64 * TRIAL_PERIOD_S + rng.random_range(0.6..1.2);
        let contrast = [1.0, 0.25, 0.125, 0.0625][rng.random_range(0..4)];
        let left = rng.random::<bool>();
        let correct = rng.random::<f64>() < 0.8;
        let reaction = rng.random_range(0.2..0.8);
        let feedback = go + reaction + 0.4;

        go_cue_times.push(go);
        contrast_left.push(if left { contrast } else { 0.0 });
        contrast_right.push(if left { 0.0 } else { contrast });
        feedback_times.push(feedback);
        feedback_types.push(if correct { 1 } else { -1 });

        // Carrying a stimulus to the centre turns the wheel away from its side.
        let toward_centre = if left { -1.0 } else { 1.0 };
        let direction = if correct { toward_centre } else { -toward_centre };
        turns.push((go + reaction, feedback, direction * 0.35));

        if correct {
            let mut t = feedback + 0.05;
            for _ in 0..rng.random_range(3..8) {
                lick_times.push(t);
                t += rng.random_range(0.08..0.2);
            }
        }
    }

    let samples = (seconds * WHEEL_RATE_HZ) as usize;
    let wheel_timestamps: Vec<f64> = (0..samples).map(|i| i as f64 / WHEEL_RATE_HZ).collect();
    let mut position = 0.0_f64;
    let mut turn = turns.iter().peekable();
    let mut wheel_positions = Vec::with_capacity(samples);
    for &t in &wheel_timestamps {
        while turn.peek().is_some_and(|(_, end, _)| *end < t) {
            if let Some((_, _, radians)) = turn.next() {
                position += *radians;
            }
        }
        let partial = match turn.peek() {
            Some(&&(start, end, radians)) if t >= start => radians * (t - start) / (end - start),
            _ => 0.0,
        };
        wheel_positions.push(position + partial);
    }

    let probes = (0..2)
        .map(|p| probe(&mut rng, p, seconds))
        .collect();

    let mut video_start_offsets = BTreeMap::new();
    video_start_offsets.insert("left".to_string(), 0.02);

    let paw = |phase: f32| -> Vec<Vec3> {
        (0..(seconds * 60.12) as usize)
            .map(|i| {
                let t = i as f32 / 60.12 + phase;
                [t.sin() * 0.1, 0.0, t.cos() * 0.1]
            })
            .collect()
    };

    ReplaySession {
        eid: eid.to_string(),
        wheel_timestamps,
        wheel_positions,
        go_cue_times,
        contrast_left,
        contrast_right,
        feedback_times,
        feedback_types,
        lick_times,
        probes,
        video_start_offsets,
        paw_left: paw(0.0),
        paw_right: paw(std::f32::consts::PI),
    }
}

fn probe(rng: &mut StdRng, index: usize, seconds: f64) -> ProbeData {
    let mut spike_times = Vec::new();
    let mut spike_clusters = Vec::new();
    let mut t = 0.0;
    loop {
        // Exponential inter-spike interval
        t += -(1.0 - rng.random::<f64>()).ln() / SPIKE_RATE_HZ;
        if t >= seconds {
            break;
        }
        spike_times.push(t);
        spike_clusters.push(rng.random_range(0..CLUSTERS_PER_PROBE as u32));
    }
    ProbeData {
        pid: format!("probe{index:02}"),
        spike_times,
        spike_clusters,
        cluster_coords: neuron_positions(rng, CLUSTERS_PER_PROBE),
        trajectory: ProbeTrajectory {
            ml: -2000.0 + 4000.0 * index as f32,
            ap: -1500.0,
            dv: -500.0,
            depth: 3500.0,
            theta: 15.0,
            phi: 180.0 * index as f32,
        },
    }
}

/// Scattered along a 3.5 mm shank, in micrometres.
pub fn neuron_positions(rng: &mut StdRng, count: usize) -> Vec<Vec3> {
    (0..count)
        .map(|_| {
            [
                rng.random_range(-40.0..40.0),
                rng.random_range(0.0..3500.0),
                rng.random_range(-40.0..40.0),
            ]
        })
        .collect()
}

/// One profile per neuron, in the full four-block layout. Each neuron has a
/// response peak after stimulus onset or feedback whose height depends on the
/// trial outcome.
pub fn rate_profiles(rng: &mut StdRng, count: usize) -> Vec<RateProfile> {
    // The second block starts one block in.
    let block = Outcome::LeftIncorrect.waveform_offset(WaveformLayout::Full);
    (0..count)
        .map(|_| {
            let baseline = rng.random_range(2.0..12.0f32);
            let peak_at = if rng.random::<bool>() { 100.0 } else { 170.0 };
            let width = rng.random_range(6.0..20.0f32);
            let mut rates = Vec::with_capacity(block * Outcome::ALL.len());
            for _ in Outcome::ALL {
                let gain = rng.random_range(0.5..4.0f32);
                rates.extend((0..block).map(|i| {
                    let d = (i as f32 - peak_at) / width;
                    baseline * (1.0 + gain * (-0.5 * d * d).exp())
                }));
            }
            RateProfile { rates, baseline }
        })
        .collect()
}
