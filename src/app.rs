use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ibl_cache::SessionCache;
use ibl_core::{probe_color, Effect, NeuronSink, Outcome, SimulatedRig, TrialRecord, WaveformLayout};
use ibl_experiment::{
    EventAverageDriver, EventAverageTable, ReplaySession, ReplaySynchronizer, SessionData, Task,
    TaskConfig, TrialStateMachine,
};
use ibl_timing::{format_task_time, CalibrationStats, HighPrecisionTimer, ManualTimer, Timer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{Args, Command};
use crate::synthetic;

/// Neurons driven by event-averaged rates during a live run.
const LIVE_NEURONS: usize = 48;

pub struct App {
    args: Args,
    config: TaskConfig,
    sessions: SessionCache<ReplaySession>,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => load_config(path)?,
            None => TaskConfig::default(),
        };
        if let Some(scale) = args.time_scale {
            config.time_scale = scale;
        }
        config.validate().context("invalid task configuration")?;
        if !(args.fps.is_finite() && args.fps > 0.0) {
            bail!("--fps must be positive, got {}", args.fps);
        }

        Ok(Self {
            args,
            config,
            sessions: SessionCache::new(),
        })
    }

    pub fn run(mut self) -> Result<()> {
        println!("=== IBL TASK ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Architecture: {}", std::env::consts::ARCH);
        println!(
            "Frame rate: {:.1} Hz, time scale {}, {}\n",
            self.args.fps,
            self.config.time_scale,
            if self.args.realtime { "realtime" } else { "simulated clock" }
        );

        let rig = self.rig();
        let stats = if self.args.realtime {
            self.run_task(&rig, HighPrecisionTimer::new())?
        } else {
            self.run_task(&rig, ManualTimer::new())?
        };
        print_frame_timing(&stats);

        if let Some(path) = &self.args.effects {
            write_json(path, &rig.effects())?;
            println!("Effect log saved to {}", path.display());
        }
        Ok(())
    }

    /// Spikes go into the effect log only when it is exported.
    fn rig(&self) -> SimulatedRig {
        if self.args.effects.is_some() {
            SimulatedRig::new()
        } else {
            SimulatedRig::without_spike_log()
        }
    }

    fn run_task<T: Timer>(&mut self, rig: &SimulatedRig, timer: T) -> Result<CalibrationStats> {
        let seed = self.args.seed.unwrap_or_else(rand::random);
        info!("seed {seed}");
        match self.args.command.clone() {
            Command::Live {
                trials,
                level,
                results,
            } => self.run_live(rig, timer, seed, trials, level, &results),
            Command::Replay {
                session,
                synthetic_seconds,
            } => self.run_replay(rig, timer, seed, session, synthetic_seconds),
        }
    }

    fn run_live<T: Timer>(
        &mut self,
        rig: &SimulatedRig,
        timer: T,
        seed: u64,
        trials: usize,
        level: Option<usize>,
        results: &Path,
    ) -> Result<CalibrationStats> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut machine = TrialStateMachine::new(
            self.config.live.clone(),
            self.config.time_scale,
            rig.live_rig(),
            timer.clone(),
            StdRng::seed_from_u64(seed),
        );
        if let Some(level) = level {
            machine.set_level(level)?;
        }

        let mut neurons = rig.clone();
        let positions = synthetic::neuron_positions(&mut rng, LIVE_NEURONS);
        let entities = neurons.spawn_neurons(0, &positions, probe_color(0));
        let table = EventAverageTable::bind(
            WaveformLayout::Full,
            &entities,
            synthetic::rate_profiles(&mut rng, entities.len()),
        );
        let mut driver = EventAverageDriver::default();

        let mut task = Task::Live(machine);
        task.run()?;
        println!("Running {} for {trials} trials", task.name());

        let mut frames = FrameLoop::new(timer, self.args.fps, self.args.max_seconds);
        while let Some(dt) = frames.next_frame() {
            rig.advance((dt * task.time_scale()) as f32);
            let index = task.tick(dt)?;
            let Some(machine) = task.as_live() else {
                break;
            };
            if let Some(outcome) = machine.outcome() {
                driver.apply(index, outcome, &table, &mut neurons);
            } else {
                driver.invalidate();
            }
            if machine.records().len() >= trials {
                break;
            }
        }

        let records = task
            .as_live()
            .map(|m| m.records().to_vec())
            .unwrap_or_default();
        if records.len() < trials {
            warn!(
                "stopped after {} of {trials} trials ({}s frame limit)",
                records.len(),
                self.args.max_seconds
            );
        }
        let task_time = task.task_time();
        task.stop();

        println!("Task time: {}", format_task_time(task_time));
        analyze_results(&records, results)?;
        Ok(frames.calibration_stats())
    }

    fn run_replay<T: Timer>(
        &mut self,
        rig: &SimulatedRig,
        timer: T,
        seed: u64,
        path: Option<PathBuf>,
        synthetic_seconds: f64,
    ) -> Result<CalibrationStats> {
        let session = match &path {
            Some(path) => {
                let key = path.display().to_string();
                self.sessions.get_or_load(&key, || load_session(path))?
            }
            None => {
                let eid = format!("synthetic-{seed}");
                self.sessions.get_or_load(&eid, || {
                    Ok::<_, anyhow::Error>(synthetic::session(&eid, synthetic_seconds, seed))
                })?
            }
        };
        let eid = session.eid().to_string();
        let data: Arc<dyn SessionData> = session;

        let mut sync = ReplaySynchronizer::new(
            self.config.replay.clone(),
            self.config.time_scale,
            rig.replay_rig(),
            timer.clone(),
        );
        sync.set_session(data);
        let duration = sync.duration();

        let mut task: Task<StdRng, T> = Task::Replay(sync);
        task.run()?;
        println!("Replaying session {eid} ({})", format_task_time(duration));

        let mut frames = FrameLoop::new(timer, self.args.fps, self.args.max_seconds);
        let mut spikes = 0;
        let mut last_decile = 0;
        while let Some(dt) = frames.next_frame() {
            let progress = task.tick(dt)?;
            if let Some(sync) = task.as_replay() {
                spikes += sync.last_frame().spikes;
            }
            if progress / 10 > last_decile {
                last_decile = progress / 10;
                info!(
                    "replay at {} ({progress}%)",
                    format_task_time(task.task_time())
                );
            }
            if task.task_time() >= duration {
                break;
            }
        }

        let faults = task
            .as_replay()
            .map(|s| s.faults().to_vec())
            .unwrap_or_default();
        let task_time = task.task_time();
        task.stop();

        println!("Replay Results:");
        println!(
            "Replayed {} of {}",
            format_task_time(task_time.min(duration)),
            format_task_time(duration)
        );
        println!(
            "Spikes: {spikes}, go cues: {}, rewards: {}, errors: {}, licks: {}",
            rig.count(|e| *e == Effect::GoTone),
            rig.count(|e| *e == Effect::Drop),
            rig.count(|e| *e == Effect::ErrorNoise),
            rig.count(|e| *e == Effect::Lick),
        );
        println!("Stream faults: {}", faults.len());
        for fault in &faults {
            println!("  {fault}");
        }
        Ok(frames.calibration_stats())
    }
}

/// Fixed-rate frame pacing. The timer decides whether a frame takes real
/// time (`HighPrecisionTimer`) or just moves a counter (`ManualTimer`).
struct FrameLoop<T: Timer> {
    timer: T,
    frame: Duration,
    last: u64,
    elapsed: Duration,
    budget: Duration,
}

impl<T: Timer> FrameLoop<T> {
    fn new(timer: T, fps: f64, max_seconds: f64) -> Self {
        let last = timer.now();
        Self {
            timer,
            frame: Duration::from_secs_f64(1.0 / fps),
            last,
            elapsed: Duration::ZERO,
            budget: Duration::try_from_secs_f64(max_seconds).unwrap_or(Duration::ZERO),
        }
    }

    /// Waits out one frame and returns its measured length in seconds, or
    /// `None` once the frame budget is spent.
    fn next_frame(&mut self) -> Option<f64> {
        if self.elapsed >= self.budget {
            return None;
        }
        self.timer.sleep(self.frame);
        let now = self.timer.now();
        let frame = Duration::from_nanos(now.saturating_sub(self.last));
        self.last = now;
        self.timer.record_frame(frame);
        self.elapsed += frame;
        Some(frame.as_secs_f64())
    }

    fn calibration_stats(&self) -> CalibrationStats {
        self.timer.calibration_stats()
    }
}

fn analyze_results(records: &[TrialRecord], path: &Path) -> Result<()> {
    if records.is_empty() {
        println!("No trials completed.");
        return Ok(());
    }
    let correct = records.iter().filter(|r| r.correct).count();
    let rate = correct as f64 / records.len() as f64 * 100.0;
    let times: Vec<f64> = records.iter().map(|r| r.reaction_time_s * 1000.0).collect();

    let mean = times.iter().sum::<f64>() / times.len() as f64;
    let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    println!("Experiment Results:");
    println!("Trials: {}, Correct: {:.1}%", records.len(), rate);
    println!(
        "Reaction times: mean {:.3} ms, min {:.3} ms, max {:.3} ms",
        mean, min, max
    );
    for outcome in Outcome::ALL {
        let n = records
            .iter()
            .filter(|r| Outcome::from_trial(r.side, r.correct) == outcome)
            .count();
        println!("  {:?}: {}", outcome, n);
    }

    write_json(path, records)?;
    println!("Results saved to {}", path.display());
    Ok(())
}

fn print_frame_timing(stats: &CalibrationStats) {
    println!("Frame timing:");
    println!(
        "  Average: {:.3} ms ({:.1} fps)",
        stats.average_frame_time_ns / 1e6,
        stats.effective_fps
    );
    println!(
        "  Jitter: {:.3} ms, min {:.3} ms, max {:.3} ms",
        stats.jitter_ns / 1e6,
        stats.min_frame_time_ns / 1e6,
        stats.max_frame_time_ns / 1e6
    );
}

fn load_config(path: &Path) -> Result<TaskConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    TaskConfig::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn load_session(path: &Path) -> Result<ReplaySession> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read session {}", path.display()))?;
    ReplaySession::from_json(&text).with_context(|| format!("invalid session {}", path.display()))
}

fn write_json<S: Serialize + ?Sized>(path: &Path, value: &S) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("failed to write {}", path.display()))
}
