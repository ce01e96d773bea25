use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use super::scoring::{DEFAULT_MULTIPLIER_INCREMENT, DEFAULT_MULTIPLIER_MAX};

pub const DEFAULT_IDLE_THRESHOLD_S: u32 = 5 * 60;
pub const DEFAULT_POLL_INTERVAL_S: u64 = 60;

#[derive(Parser)]
pub struct DaemonArgs {
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Username the tracked sessions belong to.
    #[arg(long)]
    pub user: String,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[command(flatten)]
    pub tuning: TrackerTuning,
}

/// The numeric knobs of the tracker, overridable at process start.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct TrackerTuning {
    #[arg(
        long = "idle-threshold",
        default_value_t = DEFAULT_IDLE_THRESHOLD_S,
        help = "Seconds without input before the user counts as idle"
    )]
    pub idle_threshold_s: u32,
    #[arg(
        long = "poll-interval",
        default_value_t = DEFAULT_POLL_INTERVAL_S,
        help = "Seconds between idle samples"
    )]
    pub poll_interval_s: u64,
    #[arg(
        long = "multiplier-increment",
        default_value_t = DEFAULT_MULTIPLIER_INCREMENT,
        help = "Multiplier gained per full hour of session length"
    )]
    pub multiplier_increment: f64,
    #[arg(
        long = "multiplier-max",
        default_value_t = DEFAULT_MULTIPLIER_MAX,
        help = "Multiplier cap"
    )]
    pub multiplier_max: f64,
}

impl Default for TrackerTuning {
    fn default() -> Self {
        Self {
            idle_threshold_s: DEFAULT_IDLE_THRESHOLD_S,
            poll_interval_s: DEFAULT_POLL_INTERVAL_S,
            multiplier_increment: DEFAULT_MULTIPLIER_INCREMENT,
            multiplier_max: DEFAULT_MULTIPLIER_MAX,
        }
    }
}

impl TrackerTuning {
    /// Renders the tuning back into command-line flags, used when respawning
    /// the daemon as a detached process.
    pub fn to_flags(&self) -> Vec<String> {
        vec![
            "--idle-threshold".into(),
            self.idle_threshold_s.to_string(),
            "--poll-interval".into(),
            self.poll_interval_s.to_string(),
            "--multiplier-increment".into(),
            self.multiplier_increment.to_string(),
            "--multiplier-max".into(),
            self.multiplier_max.to_string(),
        ]
    }
}
