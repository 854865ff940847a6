use std::ops::Range;
use std::sync::Arc;

use ibl_core::{
    EntityHandle, FeedbackType, ReplayRig, Side, StimulusHandle, StimulusKind, probe_color,
};
use ibl_timing::{DeferredQueue, SessionClock, Timer};
use tracing::{debug, info, warn};

use super::probe::ProbePlacement;
use super::session::{SessionData, Stream};
use crate::config::ReplayConfig;
use crate::cursor::StreamCursor;
use crate::error::{DataIntegrityError, TaskError};
use crate::index::{TimeIndex, replay_progress_index, safe_fraction};

/// What one replay tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReplayFrame {
    pub clock: f64,
    pub video_frame: i64,
    pub paw_index: i64,
    /// Spikes dispatched during this tick across all probes.
    pub spikes: usize,
    pub wheel_angle: f32,
    pub progress: TimeIndex,
}

/// Everything tied to one installed session. Replaced as a unit.
struct ActiveSession {
    data: Arc<dyn SessionData>,
    duration: f64,
    video_offset: f64,
    neurons: Vec<Vec<EntityHandle>>,
    spikes: Vec<StreamCursor>,
    /// Counts crossed upper bounds, so its index is the lower sample of the
    /// current wheel interval.
    wheel: StreamCursor,
    go_cue: StreamCursor,
    feedback: StreamCursor,
    licks: StreamCursor,
    stimuli: [Option<StimulusHandle>; 2],
    stim_pos: [f32; 2],
    frozen: [bool; 2],
    pending_destroy: DeferredQueue<StimulusHandle>,
}

/// Replays a recorded session against the scaled session clock.
///
/// Each event stream has its own cursor. A tick crosses every event whose
/// timestamp is at or before the clock, so a large delta fires all of the
/// events it skipped over, in order. A corrupt stream halts on its own and
/// the others keep playing.
pub struct ReplaySynchronizer<T: Timer> {
    config: ReplayConfig,
    timer: T,
    clock: SessionClock,
    rig: ReplayRig,
    data: Option<Arc<dyn SessionData>>,
    active: Option<ActiveSession>,
    faults: Vec<DataIntegrityError>,
    last_frame: ReplayFrame,
    running: bool,
}

impl<T: Timer> ReplaySynchronizer<T> {
    pub fn new(config: ReplayConfig, time_scale: f64, rig: ReplayRig, timer: T) -> Self {
        Self {
            config,
            timer,
            clock: SessionClock::new(time_scale),
            rig,
            data: None,
            active: None,
            faults: Vec::new(),
            last_frame: ReplayFrame::default(),
            running: false,
        }
    }

    /// Swaps in a fully loaded session. The previous session's entities,
    /// stimuli and pending destroys are torn down before the new session's
    /// probes and neurons are created, and every cursor starts at zero.
    pub fn set_session(&mut self, data: Arc<dyn SessionData>) {
        self.data = Some(Arc::clone(&data));
        self.install(data);
    }

    pub fn start(&mut self) -> Result<(), TaskError> {
        let Some(data) = self.data.clone() else {
            return Err(TaskError::NotLoaded);
        };
        if self.active.is_none() {
            self.install(data);
        }
        self.running = true;
        self.clock.resume();
        info!("replay started at {:.3}s", self.clock.elapsed());
        Ok(())
    }

    /// Replay cannot hold its place; use [`stop`](Self::stop) instead.
    pub fn pause(&mut self) -> Result<(), TaskError> {
        warn!("pause requested but replay does not support it");
        Err(TaskError::NotSupported("pause"))
    }

    /// Ends the pass. Deferred stimulus destroys run now rather than later,
    /// probes and neurons are cleared, and the next start replays from zero.
    pub fn stop(&mut self) {
        self.teardown();
        self.running = false;
        self.clock.freeze();
        info!("replay stopped");
    }

    pub fn set_task_time(&mut self, _seconds: f64) -> Result<(), TaskError> {
        warn!("seeking is not supported by replay");
        Err(TaskError::NotSupported("set_task_time"))
    }

    pub fn tick(&mut self, delta: f64) -> Result<ReplayFrame, TaskError> {
        if self.data.is_none() {
            return Err(TaskError::NotLoaded);
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(self.last_frame);
        };
        if !self.running {
            return Ok(self.last_frame);
        }
        let scaled = self.clock.advance(delta);
        if scaled <= 0.0 {
            return Ok(self.last_frame);
        }
        let clock = self.clock.elapsed();
        let now = self.timer.now_secs();
        let rig = &mut self.rig;
        let config = &self.config;
        let faults = &mut self.faults;

        for handle in active.pending_destroy.drain_due(now) {
            rig.stimuli.destroy(handle);
        }

        let video_frame = frame_index(clock, active.video_offset, config.video_fps);
        rig.video.set_frame(video_frame);

        let spikes = active.play_spikes(clock, rig, faults);
        let wheel_angle = active.play_wheel(clock, config, rig, faults);
        active.play_go_cues(clock, config, rig, faults);
        active.play_feedback(clock, now, config, rig, faults);
        active.play_licks(clock, rig, faults);

        let paw_index = frame_index(clock, active.video_offset, config.paw_fps);
        for side in [Side::Left, Side::Right] {
            let [x, y, z] = active.data.paw_sample(paw_index, side);
            let s = config.paw_scale;
            rig.paws.set_paw(side, [x * s, y * s, z * s]);
        }

        self.last_frame = ReplayFrame {
            clock,
            video_frame,
            paw_index,
            spikes,
            wheel_angle,
            progress: replay_progress_index(clock, active.duration),
        };
        Ok(self.last_frame)
    }

    fn install(&mut self, data: Arc<dyn SessionData>) {
        self.teardown();
        self.faults.clear();

        let probes = data.probe_ids().len();
        let mut neurons = Vec::with_capacity(probes);
        for probe in 0..probes {
            if let Some(trajectory) = data.trajectory(probe) {
                let placement =
                    ProbePlacement::from_trajectory(&trajectory, self.config.coordinate_scale);
                self.rig
                    .probes
                    .place_probe(probe, placement.tip, placement.rotation_deg);
            }
            let spawned = self.rig.neurons.spawn_neurons(
                probe,
                data.cluster_coords(probe),
                probe_color(probe),
            );
            if let Some(q) = data.spike_quantiles(probe) {
                debug!(
                    "probe {probe}: {} neurons, {} spikes up to {:.1}s",
                    spawned.len(),
                    data.stream(Stream::SpikeTimes(probe)).len(),
                    q.max_time
                );
            }
            neurons.push(spawned);
        }

        let channel = &self.config.reference_video_channel;
        let video_offset = data.video_start_offset(channel).unwrap_or_else(|| {
            debug!("no start offset for video channel {channel}, using 0");
            0.0
        });
        let duration = data.duration();
        info!(
            "session {} installed: {probes} probes, {} neurons, {duration:.1}s",
            data.eid(),
            neurons.iter().map(Vec::len).sum::<usize>()
        );

        self.clock.reset();
        if !self.running {
            self.clock.freeze();
        }
        self.last_frame = ReplayFrame::default();
        self.active = Some(ActiveSession {
            data,
            duration,
            video_offset,
            spikes: vec![StreamCursor::new(); probes],
            neurons,
            wheel: StreamCursor::new(),
            go_cue: StreamCursor::new(),
            feedback: StreamCursor::new(),
            licks: StreamCursor::new(),
            stimuli: [None; 2],
            stim_pos: [0.0; 2],
            frozen: [false; 2],
            pending_destroy: DeferredQueue::new(),
        });
    }

    fn teardown(&mut self) {
        let Some(mut old) = self.active.take() else {
            return;
        };
        for handle in old.pending_destroy.drain_all() {
            self.rig.stimuli.destroy(handle);
        }
        for handle in old.stimuli.iter_mut().filter_map(Option::take) {
            self.rig.stimuli.destroy(handle);
        }
        self.rig.neurons.remove_all();
        self.rig.probes.clear_probes();
        debug!("session {} torn down", old.data.eid());
    }

    /// Stream faults seen since the current session was installed.
    pub fn faults(&self) -> &[DataIntegrityError] {
        &self.faults
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn task_time(&self) -> f64 {
        self.clock.elapsed()
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

    pub fn last_frame(&self) -> ReplayFrame {
        self.last_frame
    }

    pub fn duration(&self) -> f64 {
        self.active.as_ref().map_or(0.0, |a| a.duration)
    }

    pub fn pending_destroys(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.pending_destroy.len())
    }

    pub fn next_destroy_at(&self) -> Option<f64> {
        self.active
            .as_ref()
            .and_then(|a| a.pending_destroy.next_deadline())
    }

    /// Neuron entities of one probe, indexed by cluster id.
    pub fn neurons(&self, probe: usize) -> &[EntityHandle] {
        self.active
            .as_ref()
            .and_then(|a| a.neurons.get(probe))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Live stimulus on each side, left first.
    pub fn stimuli(&self) -> [Option<StimulusHandle>; 2] {
        self.active.as_ref().map_or([None; 2], |a| a.stimuli)
    }

    pub fn stimulus_positions(&self) -> [f32; 2] {
        self.active.as_ref().map_or([0.0; 2], |a| a.stim_pos)
    }

    pub fn frozen(&self) -> [bool; 2] {
        self.active.as_ref().map_or([false; 2], |a| a.frozen)
    }
}

impl ActiveSession {
    fn play_spikes(
        &mut self,
        clock: f64,
        rig: &mut ReplayRig,
        faults: &mut Vec<DataIntegrityError>,
    ) -> usize {
        let data = Arc::clone(&self.data);
        let mut count = 0;
        for (probe, cursor) in self.spikes.iter_mut().enumerate() {
            let stream = Stream::SpikeTimes(probe);
            let Some(range) = cross(cursor, data.stream(stream), clock, stream, faults) else {
                continue;
            };
            let clusters = data.spike_clusters(probe);
            for i in range {
                let entity = clusters
                    .get(i)
                    .and_then(|&c| self.neurons[probe].get(c as usize));
                match entity {
                    Some(&entity) => {
                        rig.neurons.set_spiking(entity);
                        count += 1;
                    }
                    None => {
                        let err = DataIntegrityError::overrun(format!("spikes.clusters{probe}"), i);
                        halt(cursor, err, faults);
                        break;
                    }
                }
            }
        }
        count
    }

    /// Moves stimuli by each crossed wheel interval and returns the
    /// interpolated wheel angle in degrees.
    fn play_wheel(
        &mut self,
        clock: f64,
        config: &ReplayConfig,
        rig: &mut ReplayRig,
        faults: &mut Vec<DataIntegrityError>,
    ) -> f32 {
        let data = Arc::clone(&self.data);
        let times = data.stream(Stream::WheelTimestamps);
        let positions = data.stream(Stream::WheelPosition);
        // The cursor walks interval upper bounds, one sample ahead.
        if let Some(range) =
            cross_from(&mut self.wheel, times, 1, clock, Stream::WheelTimestamps, faults)
        {
            for crossed in range {
                let lower = crossed + 1;
                if lower + 1 >= times.len() {
                    break;
                }
                let (Some(&p0), Some(&p1)) = (positions.get(lower), positions.get(lower + 1))
                else {
                    let err = DataIntegrityError::overrun(Stream::WheelPosition.to_string(), lower + 1);
                    halt(&mut self.wheel, err, faults);
                    break;
                };
                let dwheel = (p1 - p0) as f32 * -config.wheel_mm_to_deg;
                self.move_stimuli(dwheel, config, rig);
            }
        }

        let lower = self.wheel.index();
        let position = match (
            times.get(lower),
            times.get(lower + 1),
            positions.get(lower),
            positions.get(lower + 1),
        ) {
            (Some(&t0), Some(&t1), Some(&p0), Some(&p1)) => {
                let f = safe_fraction(clock - t0, t1 - t0).clamp(0.0, 1.0);
                p0 + (p1 - p0) * f
            }
            _ => positions
                .get(lower)
                .or(positions.last())
                .copied()
                .unwrap_or(0.0),
        };
        // Recorded rotation is counter-clockwise.
        let angle = -(position.to_degrees() as f32);
        rig.wheel.set_angle(angle);
        angle
    }

    fn move_stimuli(&mut self, dwheel: f32, config: &ReplayConfig, rig: &mut ReplayRig) {
        let (min, max) = config.stim_bounds_deg;
        for side in [Side::Left, Side::Right] {
            let s = slot(side);
            self.stim_pos[s] += dwheel;
            let Some(handle) = self.stimuli[s] else {
                continue;
            };
            if self.frozen[s] {
                continue;
            }
            let pos = self.stim_pos[s];
            rig.stimuli.set_position(handle, pos);
            let outside = match side {
                Side::Left => pos > min || pos < -max,
                Side::Right => pos < min || pos > max,
            };
            if outside {
                self.frozen[s] = true;
                debug!("{side:?} stimulus frozen at {pos:.1} deg");
            }
        }
    }

    fn play_go_cues(
        &mut self,
        clock: f64,
        config: &ReplayConfig,
        rig: &mut ReplayRig,
        faults: &mut Vec<DataIntegrityError>,
    ) {
        let data = Arc::clone(&self.data);
        let Some(range) = cross(
            &mut self.go_cue,
            data.stream(Stream::GoCueTimes),
            clock,
            Stream::GoCueTimes,
            faults,
        ) else {
            return;
        };
        let left = data.stream(Stream::ContrastLeft);
        let right = data.stream(Stream::ContrastRight);
        for i in range {
            let (Some(&contrast_l), Some(&contrast_r)) = (left.get(i), right.get(i)) else {
                let stream = if left.get(i).is_none() {
                    Stream::ContrastLeft
                } else {
                    Stream::ContrastRight
                };
                halt(&mut self.go_cue, DataIntegrityError::overrun(stream.to_string(), i), faults);
                break;
            };
            rig.audio.play_go_tone();
            self.stim_pos = [-config.stim_azimuth_deg, config.stim_azimuth_deg];
            self.frozen = [false; 2];
            for (side, contrast) in [(Side::Left, contrast_l), (Side::Right, contrast_r)] {
                let s = slot(side);
                if let Some(stale) = self.stimuli[s].take() {
                    rig.stimuli.destroy(stale);
                }
                if contrast > 0.0 {
                    let handle = rig.stimuli.create(StimulusKind::gabor(config.stimulus_scale));
                    rig.stimuli.set_position(handle, self.stim_pos[s]);
                    rig.stimuli.set_contrast(handle, contrast as f32);
                    self.stimuli[s] = Some(handle);
                }
            }
            debug!("go cue {i} at {clock:.3}s (contrast {contrast_l} / {contrast_r})");
        }
    }

    fn play_feedback(
        &mut self,
        clock: f64,
        now: f64,
        config: &ReplayConfig,
        rig: &mut ReplayRig,
        faults: &mut Vec<DataIntegrityError>,
    ) {
        let data = Arc::clone(&self.data);
        let Some(range) = cross(
            &mut self.feedback,
            data.stream(Stream::FeedbackTimes),
            clock,
            Stream::FeedbackTimes,
            faults,
        ) else {
            return;
        };
        let types = data.feedback_types();
        for i in range {
            let Some(&code) = types.get(i) else {
                halt(&mut self.feedback, DataIntegrityError::overrun("feedbackType", i), faults);
                break;
            };
            let kind = FeedbackType::from_code(code);
            match kind {
                FeedbackType::Reward => rig.reward.trigger_drop(),
                FeedbackType::Error => rig.audio.play_error_noise(),
            }
            self.frozen = [true; 2];
            let deadline = now + config.feedback_destroy_delay_s;
            for handle in self.stimuli.iter_mut().filter_map(Option::take) {
                self.pending_destroy.schedule(deadline, handle);
            }
            debug!("feedback {i} ({kind:?}) at {clock:.3}s, destroy at {deadline:.3}");
        }
    }

    fn play_licks(&mut self, clock: f64, rig: &mut ReplayRig, faults: &mut Vec<DataIntegrityError>) {
        let data = Arc::clone(&self.data);
        if let Some(range) = cross(
            &mut self.licks,
            data.stream(Stream::LickTimes),
            clock,
            Stream::LickTimes,
            faults,
        ) {
            for _ in range {
                rig.reward.trigger_lick();
            }
        }
    }
}

/// Crosses due events on a healthy stream. A fault is reported once, when
/// the cursor halts; the events ahead of it are still returned for dispatch
/// and a halted stream yields nothing afterwards.
fn cross(
    cursor: &mut StreamCursor,
    times: &[f64],
    clock: f64,
    stream: Stream,
    faults: &mut Vec<DataIntegrityError>,
) -> Option<Range<usize>> {
    cross_from(cursor, times, 0, clock, stream, faults)
}

/// [`cross`] over `times[first..]`. Indices stay relative to the slice, but
/// faults name the sample's position in the whole stream.
fn cross_from(
    cursor: &mut StreamCursor,
    times: &[f64],
    first: usize,
    clock: f64,
    stream: Stream,
    faults: &mut Vec<DataIntegrityError>,
) -> Option<Range<usize>> {
    if cursor.halted().is_some() {
        return None;
    }
    let upper = times.get(first..).unwrap_or(&[]);
    let crossing = cursor.advance_while(upper, clock);
    if let Some(err) = crossing.fault() {
        let mut err = err.clone().on_channel(stream.to_string());
        err.index += first;
        report(err, faults);
    }
    Some(crossing.indices())
}

fn halt(cursor: &mut StreamCursor, err: DataIntegrityError, faults: &mut Vec<DataIntegrityError>) {
    cursor.halt(err.clone());
    report(err, faults);
}

fn report(err: DataIntegrityError, faults: &mut Vec<DataIntegrityError>) {
    warn!("stream halted: {err}");
    faults.push(err);
}

fn slot(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

/// `floor((clock - offset) * fps)`; negative before the recording starts.
fn frame_index(clock: f64, offset: f64, fps: f64) -> i64 {
    ((clock - offset) * fps).floor() as i64
}
