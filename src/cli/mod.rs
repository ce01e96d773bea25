pub mod output;
pub mod process;
pub mod stats;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use stats::{process_online_command, process_stats_command, process_today_command, StatsCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{args::TrackerTuning, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Uptally", version, long_about = None)]
#[command(about = "Presence tracker that scores your active time", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon that tracks the given user")]
    Init {
        #[arg(long, help = "Username the tracked sessions belong to")]
        user: String,
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
        #[command(flatten)]
        tuning: TrackerTuning,
    },
    #[command(about = "Show the today/week/month/year score and hour totals of a user")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "Print today's score of a user")]
    Today {
        #[arg(long, help = "Username to show the score for")]
        user: String,
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "List users whose daemon is currently running")]
    Online {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(long, help = "Username the tracked sessions belong to")]
        user: String,
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
        #[command(flatten)]
        tuning: TrackerTuning,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.log,
    )?;

    match args.commands {
        Commands::Init { user, dir, tuning } => {
            restart_server(&serve_args(user, dir, &tuning))?;
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe()?;
            kill_previous_servers(&process_name)?;
            Ok(())
        }
        Commands::Serve { user, dir, tuning } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            start_daemon(dir, &user, tuning.into()).await?;
            Ok(())
        }
        Commands::Stats { command } => process_stats_command(command).await,
        Commands::Today { user, dir } => process_today_command(user, dir).await,
        Commands::Online { dir } => process_online_command(dir).await,
    }
}

/// Flags forwarded to the respawned `serve` process so the daemon runs with
/// the same user and tuning the caller asked for.
fn serve_args(user: String, dir: Option<PathBuf>, tuning: &TrackerTuning) -> Vec<String> {
    let mut forwarded = vec!["--user".to_string(), user];
    if let Some(dir) = dir {
        forwarded.push("--dir".into());
        forwarded.push(dir.to_string_lossy().into_owned());
    }
    forwarded.extend(tuning.to_flags());
    forwarded
}
