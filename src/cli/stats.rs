use std::{fmt::Display, path::PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;
use tracing::error;

use crate::{
    daemon::scoring::ScoreParams,
    stats::{aggregated_stats, daily_score, AggregatedStats, OpenSessions},
    store::file_store::FileStore,
    store::gateway::UserStore,
    utils::dir::create_application_default_path,
};

use super::{output, Args};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct StatsCommand {
    #[arg(long, help = "Username to show stats for")]
    user: String,
    #[arg(
        long = "at",
        help = "Moment the windows are anchored at, defaults to now. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    at: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Price the still-open session at its live duration")]
    live: bool,
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

/// Command to process `stats`. Shows the today/week/month/year score and hour
/// buckets of one user, anchored at `--at` or now.
pub async fn process_stats_command(
    StatsCommand {
        user,
        at,
        date_style,
        live,
        dir,
    }: StatsCommand,
) -> Result<()> {
    let now = Local::now();
    let anchor = match at.map(|s| parse_date_string(&s, now, date_style.into())) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate anchor date {e}"),
                )
                .into());
        }
        None => now,
    };

    let store = open_store(dir)?;
    let open_policy = if live {
        OpenSessions::IncludeLive
    } else {
        OpenSessions::Exclude
    };

    let stats = aggregated_stats(
        &store,
        &store,
        &user,
        anchor,
        open_policy,
        &ScoreParams::default(),
    )
    .await;
    output::print_stats(&stats);
    Ok(())
}

/// Command to process `today`, a cheaper read than the full aggregate.
pub async fn process_today_command(user: String, dir: Option<PathBuf>) -> Result<()> {
    let store = open_store(dir)?;
    let day_start = Local::now().beginning_of_day().with_timezone(&Utc);

    let score = match resolve_daily_score(&store, &user, day_start).await {
        Ok(score) => score,
        Err(e) => {
            error!("Failed to read today's score for {user}: {e}");
            AggregatedStats::no_data(&user).daily_score
        }
    };
    output::print_today(&user, score);
    Ok(())
}

async fn resolve_daily_score(
    store: &FileStore,
    username: &str,
    day_start: DateTime<Utc>,
) -> Result<f64> {
    let Some(found) = store.find_by_username(username).await? else {
        return Ok(0.);
    };
    Ok(daily_score(store, found.id, day_start).await?)
}

/// Command to process `online`, listing every user whose daemon is running.
pub async fn process_online_command(dir: Option<PathBuf>) -> Result<()> {
    let store = open_store(dir)?;
    let users = store.online_users().await?;
    output::print_online(&users);
    Ok(())
}

fn open_store(dir: Option<PathBuf>) -> Result<FileStore> {
    let dir = dir.map_or_else(create_application_default_path, Ok)?;
    Ok(FileStore::open(dir.join("store"))?)
}
