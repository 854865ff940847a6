use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Task configuration JSON (defaults when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Frame rate of the tick loop
    #[arg(long, global = true, default_value_t = 60.0)]
    pub fps: f64,

    /// Override the configured time scale
    #[arg(long, global = true)]
    pub time_scale: Option<f64>,

    /// Pace frames against the wall clock instead of simulating time
    #[arg(long, global = true, default_value_t = false)]
    pub realtime: bool,

    /// Write the recorded rig effects to this JSON file
    #[arg(long, global = true)]
    pub effects: Option<PathBuf>,

    /// Stop after this many seconds of unscaled frame time
    #[arg(long, global = true, default_value_t = 600.0)]
    pub max_seconds: f64,

    /// RNG seed for trial draws and synthetic data
    #[arg(long, global = true)]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the simulated task headless
    Live {
        #[arg(long, default_value_t = 20)]
        trials: usize,

        /// Difficulty level (overrides config)
        #[arg(long)]
        level: Option<usize>,

        #[arg(long, default_value = "live_results.json")]
        results: PathBuf,
    },
    /// Replay a recorded session, or a synthetic one when no file is given
    Replay {
        #[arg(long)]
        session: Option<PathBuf>,

        /// Length of the synthetic session
        #[arg(long, default_value_t = 60.0)]
        synthetic_seconds: f64,
    },
}
