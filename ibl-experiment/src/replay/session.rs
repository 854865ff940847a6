//! Recorded session dataset.
//!
//! A [`ReplaySession`] is fully materialized before the synchronizer sees it
//! and is never mutated afterwards. The serde layout is this crate's own JSON
//! format; converting raw recordings into it is left to external tooling.

use std::collections::BTreeMap;
use std::fmt;

use ibl_core::{Side, Vec3};
use serde::{Deserialize, Serialize};

/// Named sequence in a session. Timestamp streams are in session seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    WheelTimestamps,
    WheelPosition,
    GoCueTimes,
    ContrastLeft,
    ContrastRight,
    FeedbackTimes,
    LickTimes,
    SpikeTimes(usize),
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::WheelTimestamps => write!(f, "wheel.timestamps"),
            Stream::WheelPosition => write!(f, "wheel.position"),
            Stream::GoCueTimes => write!(f, "goCue_times"),
            Stream::ContrastLeft => write!(f, "contrastLeft"),
            Stream::ContrastRight => write!(f, "contrastRight"),
            Stream::FeedbackTimes => write!(f, "feedback_times"),
            Stream::LickTimes => write!(f, "licks.times"),
            Stream::SpikeTimes(probe) => write!(f, "spikes.times{probe}"),
        }
    }
}

/// Insertion geometry of one probe, in micrometres and degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProbeTrajectory {
    pub ml: f32,
    pub ap: f32,
    pub dv: f32,
    pub depth: f32,
    pub theta: f32,
    pub phi: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeData {
    pub pid: String,
    pub spike_times: Vec<f64>,
    /// Cluster id of each spike, parallel to `spike_times`.
    pub spike_clusters: Vec<u32>,
    /// One coordinate per cluster; the cluster id indexes this list.
    pub cluster_coords: Vec<Vec3>,
    pub trajectory: ProbeTrajectory,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySession {
    pub eid: String,
    pub wheel_timestamps: Vec<f64>,
    /// Wheel position in radians, parallel to `wheel_timestamps`.
    pub wheel_positions: Vec<f64>,
    pub go_cue_times: Vec<f64>,
    pub contrast_left: Vec<f64>,
    pub contrast_right: Vec<f64>,
    pub feedback_times: Vec<f64>,
    /// 1 for reward, anything else for error.
    pub feedback_types: Vec<i64>,
    pub lick_times: Vec<f64>,
    pub probes: Vec<ProbeData>,
    /// Session time at which each video channel's frame 0 was captured.
    pub video_start_offsets: BTreeMap<String, f64>,
    pub paw_left: Vec<Vec3>,
    pub paw_right: Vec<Vec3>,
}

impl ReplaySession {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Read access the synchronizer needs from a loaded session.
pub trait SessionData {
    fn eid(&self) -> &str;
    /// Missing streams read as empty.
    fn stream(&self, stream: Stream) -> &[f64];
    fn feedback_types(&self) -> &[i64];
    fn probe_ids(&self) -> Vec<&str>;
    fn spike_clusters(&self, probe: usize) -> &[u32];
    fn cluster_coords(&self, probe: usize) -> &[Vec3];
    fn trajectory(&self, probe: usize) -> Option<ProbeTrajectory>;
    fn video_start_offset(&self, channel: &str) -> Option<f64>;
    /// Out-of-range and negative indices read as the origin.
    fn paw_sample(&self, index: i64, side: Side) -> Vec3;

    fn spike_quantiles(&self, probe: usize) -> Option<SpikeQuantiles> {
        SpikeQuantiles::compute(self.stream(Stream::SpikeTimes(probe)))
    }

    /// Latest timestamp over every event stream.
    fn duration(&self) -> f64 {
        let mut streams = vec![
            Stream::WheelTimestamps,
            Stream::GoCueTimes,
            Stream::FeedbackTimes,
            Stream::LickTimes,
        ];
        streams.extend((0..self.probe_ids().len()).map(Stream::SpikeTimes));
        streams
            .into_iter()
            .flat_map(|s| self.stream(s).iter().copied())
            .filter(|t| t.is_finite())
            .fold(0.0, f64::max)
    }
}

impl SessionData for ReplaySession {
    fn eid(&self) -> &str {
        &self.eid
    }

    fn stream(&self, stream: Stream) -> &[f64] {
        match stream {
            Stream::WheelTimestamps => &self.wheel_timestamps,
            Stream::WheelPosition => &self.wheel_positions,
            Stream::GoCueTimes => &self.go_cue_times,
            Stream::ContrastLeft => &self.contrast_left,
            Stream::ContrastRight => &self.contrast_right,
            Stream::FeedbackTimes => &self.feedback_times,
            Stream::LickTimes => &self.lick_times,
            Stream::SpikeTimes(probe) => self
                .probes
                .get(probe)
                .map_or(&[][..], |p| p.spike_times.as_slice()),
        }
    }

    fn feedback_types(&self) -> &[i64] {
        &self.feedback_types
    }

    fn probe_ids(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.pid.as_str()).collect()
    }

    fn spike_clusters(&self, probe: usize) -> &[u32] {
        self.probes
            .get(probe)
            .map_or(&[][..], |p| p.spike_clusters.as_slice())
    }

    fn cluster_coords(&self, probe: usize) -> &[Vec3] {
        self.probes
            .get(probe)
            .map_or(&[][..], |p| p.cluster_coords.as_slice())
    }

    fn trajectory(&self, probe: usize) -> Option<ProbeTrajectory> {
        self.probes.get(probe).map(|p| p.trajectory)
    }

    fn video_start_offset(&self, channel: &str) -> Option<f64> {
        self.video_start_offsets.get(channel).copied()
    }

    fn paw_sample(&self, index: i64, side: Side) -> Vec3 {
        let samples = match side {
            Side::Left => &self.paw_left,
            Side::Right => &self.paw_right,
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| samples.get(i))
            .copied()
            .unwrap_or([0.0; 3])
    }
}

/// Decile landmarks of one probe's spike train.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeQuantiles {
    pub max_time: f64,
    /// `max_time * q` for q in 0.0, 0.1, ..., 1.0.
    pub times: [f64; 11],
    /// First spike index at or after each landmark time.
    pub indices: [usize; 11],
}

impl SpikeQuantiles {
    pub fn compute(spike_times: &[f64]) -> Option<Self> {
        if spike_times.is_empty() {
            return None;
        }
        let max_time = spike_times.iter().copied().fold(f64::MIN, f64::max);
        let mut times = [0.0; 11];
        let mut indices = [0; 11];
        let mut idx = 0;
        for q in 0..11 {
            times[q] = max_time * q as f64 / 10.0;
            while idx < spike_times.len() && spike_times[idx] < times[q] {
                idx += 1;
            }
            indices[q] = idx;
        }
        Some(Self {
            max_time,
            times,
            indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ReplaySession {
        ReplaySession {
            eid: "test".into(),
            wheel_timestamps: vec![0.0, 1.0, 2.0],
            wheel_positions: vec![0.0, 0.1, 0.2],
            lick_times: vec![7.5],
            probes: vec![ProbeData {
                pid: "p0".into(),
                spike_times: vec![0.5, 3.0, 9.0],
                spike_clusters: vec![0, 1, 0],
                cluster_coords: vec![[0.0; 3], [1.0; 3]],
                ..Default::default()
            }],
            paw_left: vec![[1.0, 2.0, 3.0]],
            ..Default::default()
        }
    }

    #[test]
    fn duration_covers_every_stream() {
        assert_eq!(session().duration(), 9.0);
        assert_eq!(ReplaySession::default().duration(), 0.0);
    }

    #[test]
    fn missing_streams_read_empty() {
        let s = session();
        assert!(s.stream(Stream::SpikeTimes(3)).is_empty());
        assert!(s.spike_clusters(3).is_empty());
        assert!(s.trajectory(3).is_none());
        assert_eq!(s.probe_ids(), vec!["p0"]);
    }

    #[test]
    fn paw_out_of_range_is_origin() {
        let s = session();
        assert_eq!(s.paw_sample(0, Side::Left), [1.0, 2.0, 3.0]);
        assert_eq!(s.paw_sample(-4, Side::Left), [0.0; 3]);
        assert_eq!(s.paw_sample(1, Side::Left), [0.0; 3]);
        assert_eq!(s.paw_sample(0, Side::Right), [0.0; 3]);
    }

    #[test]
    fn quantiles_track_first_index_at_or_after() {
        let q = SpikeQuantiles::compute(&[1.0, 2.0, 5.0, 10.0]).unwrap();
        assert_eq!(q.max_time, 10.0);
        assert_eq!(q.times[5], 5.0);
        assert_eq!(q.indices[0], 0);
        assert_eq!(q.indices[2], 1);
        assert_eq!(q.indices[5], 2);
        assert_eq!(q.indices[10], 3);
        assert!(SpikeQuantiles::compute(&[]).is_none());
    }

    #[test]
    fn json_round_trip_with_defaults() {
        let s = ReplaySession::from_json(r#"{ "eid": "abc", "lick_times": [1.0] }"#).unwrap();
        assert_eq!(s.eid, "abc");
        assert!(s.probes.is_empty());
        let back = ReplaySession::from_json(&s.to_json().unwrap()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn stream_names_match_recording_keys() {
        assert_eq!(Stream::SpikeTimes(1).to_string(), "spikes.times1");
        assert_eq!(Stream::FeedbackTimes.to_string(), "feedback_times");
    }
}
