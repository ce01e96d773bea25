//! Read-only aggregation of closed sessions into the today/week/month/year
//! buckets the stats display shows. Never touches the lifecycle; it only
//! consumes what the store already holds.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures::{Stream, StreamExt};
use tracing::{error, warn};

use crate::{
    daemon::scoring::ScoreParams,
    store::{
        entities::SessionEntity,
        error::StoreResult,
        gateway::{SessionStore, UserStore},
    },
    utils::time::{round2, whole_minutes_between, WindowStarts},
};

pub const PLACEHOLDER_USERNAME: &str = "unknown";

/// Policy for sessions still open at aggregation time. The default display
/// only counts what has been finalized; opting in prices the open session at
/// its live duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenSessions {
    Exclude,
    IncludeLive,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsBuckets {
    pub today: f64,
    pub week: f64,
    pub month: f64,
    pub year: f64,
}

impl StatsBuckets {
    fn add(&mut self, value: f64, start_time: DateTime<Utc>, windows: &WindowStarts<Utc>) {
        self.year += value;
        if start_time >= windows.month {
            self.month += value;
        }
        // The windows are bounded by independent calendar rules: a session
        // can fall in the month bucket yet miss the week bucket when the
        // week started in the previous month.
        if start_time >= windows.week {
            self.week += value;
        }
        if start_time >= windows.day {
            self.today += value;
        }
    }

    fn rounded(&self) -> Self {
        Self {
            today: round2(self.today),
            week: round2(self.week),
            month: round2(self.month),
            year: round2(self.year),
        }
    }

    fn minutes_to_hours(&self) -> Self {
        Self {
            today: round2(self.today / 60.),
            week: round2(self.week / 60.),
            month: round2(self.month / 60.),
            year: round2(self.year / 60.),
        }
    }
}

/// The payload the display layer renders. On any failure the caller gets the
/// documented "no data" shape instead of an error.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedStats {
    pub username: Arc<str>,
    pub is_online: bool,
    pub scores: StatsBuckets,
    pub hours: StatsBuckets,
    pub daily_score: f64,
}

impl AggregatedStats {
    pub fn no_data(username: &str) -> Self {
        Self {
            username: username.into(),
            is_online: false,
            scores: StatsBuckets::default(),
            hours: StatsBuckets::default(),
            daily_score: 0.,
        }
    }
}

/// Sums score and minutes per window over a stream of sessions. Only
/// sessions starting inside `[windows.year, now]` count; each narrower
/// bucket is gated by its own boundary.
pub async fn sum_windows(
    sessions: impl Stream<Item = SessionEntity>,
    windows: &WindowStarts<Utc>,
    now: DateTime<Utc>,
    open_policy: OpenSessions,
    score_params: &ScoreParams,
) -> (StatsBuckets, StatsBuckets) {
    let mut scores = StatsBuckets::default();
    let mut minutes = StatsBuckets::default();

    futures::pin_mut!(sessions);
    while let Some(session) = sessions.next().await {
        if session.start_time < windows.year || session.start_time > now {
            continue;
        }

        let (score, duration_minutes) = if session.is_open() {
            match open_policy {
                OpenSessions::Exclude => continue,
                OpenSessions::IncludeLive => {
                    let live_minutes = whole_minutes_between(session.start_time, now);
                    let multiplier = score_params.multiplier(live_minutes);
                    (
                        score_params.score(live_minutes, multiplier),
                        live_minutes as f64,
                    )
                }
            }
        } else {
            (
                session.score.unwrap_or(0.),
                session.duration_minutes.unwrap_or(0) as f64,
            )
        };

        scores.add(score, session.start_time, windows);
        minutes.add(duration_minutes, session.start_time, windows);
    }

    (scores, minutes)
}

/// Quick "today" read, queried more often than the full aggregate.
pub async fn daily_score<S: SessionStore>(
    sessions: &S,
    user_id: u64,
    day_start: DateTime<Utc>,
) -> StoreResult<f64> {
    let recent = sessions.sessions_since(user_id, day_start).await?;
    Ok(round2(recent.iter().filter_map(|s| s.score).sum()))
}

/// Computes the full stats payload for a username. All four window
/// boundaries derive from the one `now` passed in, so a slow pass near
/// midnight cannot observe inconsistent buckets. Failures degrade to
/// [AggregatedStats::no_data].
pub async fn aggregated_stats<S, U, Tz>(
    sessions: &S,
    users: &U,
    username: &str,
    now: DateTime<Tz>,
    open_policy: OpenSessions,
    score_params: &ScoreParams,
) -> AggregatedStats
where
    S: SessionStore,
    U: UserStore,
    Tz: TimeZone,
{
    let windows = WindowStarts::at(now.clone()).with_timezone(&Utc);
    let now = now.with_timezone(&Utc);

    match load_stats(sessions, users, username, windows, now, open_policy, score_params).await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to aggregate stats for {username}: {e}");
            AggregatedStats::no_data(username)
        }
    }
}

async fn load_stats<S: SessionStore, U: UserStore>(
    sessions: &S,
    users: &U,
    username: &str,
    windows: WindowStarts<Utc>,
    now: DateTime<Utc>,
    open_policy: OpenSessions,
    score_params: &ScoreParams,
) -> StoreResult<AggregatedStats> {
    let Some(user) = users.find_by_username(username).await? else {
        warn!("No such user {username}, showing empty stats");
        return Ok(AggregatedStats::no_data(PLACEHOLDER_USERNAME));
    };

    let year_sessions = sessions.sessions_since(user.id, windows.year).await?;
    let (scores, minutes) = sum_windows(
        futures::stream::iter(year_sessions),
        &windows,
        now,
        open_policy,
        score_params,
    )
    .await;

    let daily_score = daily_score(sessions, user.id, windows.day).await?;

    Ok(AggregatedStats {
        username: user.username,
        is_online: user.is_online,
        scores: scores.rounded(),
        hours: minutes.minutes_to_hours(),
        daily_score,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use mockall::predicate::eq;

    use crate::store::{
        entities::SessionKind,
        error::StoreError,
        gateway::{MockSessionStore, MockUserStore},
    };
    use crate::store::entities::UserEntity;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap(),
        )
    }

    fn closed(start: DateTime<Utc>, minutes: i64, score: f64) -> SessionEntity {
        SessionEntity {
            id: 1,
            user_id: 7,
            kind: SessionKind::AppSession,
            start_time: start,
            end_time: Some(start + chrono::Duration::minutes(minutes)),
            duration_minutes: Some(minutes),
            multiplier: Some(1.0),
            score: Some(score),
        }
    }

    fn open(start: DateTime<Utc>) -> SessionEntity {
        SessionEntity {
            id: 2,
            user_id: 7,
            kind: SessionKind::AppSession,
            start_time: start,
            end_time: None,
            duration_minutes: None,
            multiplier: None,
            score: None,
        }
    }

    // 2024-03-06 is a Wednesday; the week window opens on Sunday 03-03 and
    // the month window on Friday 03-01.
    fn fixtures() -> (DateTime<Utc>, WindowStarts<Utc>, Vec<SessionEntity>) {
        let now = at(2024, 3, 6, 15);
        let windows = WindowStarts::at(now);
        let sessions = vec![
            closed(at(2024, 3, 6, 10), 60, 10.),  // today
            closed(at(2024, 3, 4, 9), 30, 20.),   // this week
            closed(at(2024, 3, 1, 9), 120, 40.),  // this month, but not this week
            closed(at(2024, 2, 10, 9), 60, 5.),   // this year only
            closed(at(2023, 12, 31, 9), 60, 99.), // before the year window
            closed(at(2024, 3, 6, 16), 60, 99.),  // starts after "now"
            open(at(2024, 3, 6, 14)),
        ];
        (now, windows, sessions)
    }

    #[tokio::test]
    async fn buckets_match_hand_computed_sums() {
        let (now, windows, sessions) = fixtures();

        let (scores, minutes) = sum_windows(
            tokio_stream::iter(sessions),
            &windows,
            now,
            OpenSessions::Exclude,
            &ScoreParams::default(),
        )
        .await;

        assert_eq!(scores.today, 10.);
        assert_eq!(scores.week, 30.);
        assert_eq!(scores.month, 70.);
        assert_eq!(scores.year, 75.);

        assert_eq!(minutes.today, 60.);
        assert_eq!(minutes.week, 90.);
        assert_eq!(minutes.month, 210.);
        assert_eq!(minutes.year, 270.);
    }

    #[tokio::test]
    async fn live_policy_prices_the_open_session() {
        let (now, windows, sessions) = fixtures();

        let (scores, minutes) = sum_windows(
            tokio_stream::iter(sessions),
            &windows,
            now,
            OpenSessions::IncludeLive,
            &ScoreParams::default(),
        )
        .await;

        // The open session ran 60 live minutes by "now": multiplier 1.1.
        assert_eq!(round2(scores.today), 76.);
        assert_eq!(minutes.today, 120.);
    }

    #[tokio::test]
    async fn aggregated_stats_round_and_convert() {
        let now = at(2024, 3, 6, 15);
        let mut sessions = MockSessionStore::new();
        let mut users = MockUserStore::new();
        users
            .expect_find_by_username()
            .with(eq("ana"))
            .returning(|_| {
                Ok(Some(UserEntity {
                    id: 7,
                    username: "ana".into(),
                    is_online: true,
                }))
            });
        sessions
            .expect_sessions_since()
            .withf(move |user_id, from| *user_id == 7 && *from == at(2024, 1, 1, 0))
            .returning(move |_, _| Ok(vec![closed(at(2024, 3, 6, 10), 65, 71.50000000000001)]));
        sessions
            .expect_sessions_since()
            .withf(move |user_id, from| *user_id == 7 && *from == at(2024, 3, 6, 0))
            .returning(move |_, _| Ok(vec![closed(at(2024, 3, 6, 10), 65, 71.50000000000001)]));

        let stats = aggregated_stats(
            &sessions,
            &users,
            "ana",
            now,
            OpenSessions::Exclude,
            &ScoreParams::default(),
        )
        .await;

        assert_eq!(&*stats.username, "ana");
        assert!(stats.is_online);
        assert_eq!(stats.scores.today, 71.5);
        assert_eq!(stats.hours.today, 1.08);
        assert_eq!(stats.daily_score, 71.5);
    }

    #[tokio::test]
    async fn store_failure_degrades_to_no_data() {
        let now = at(2024, 3, 6, 15);
        let mut sessions = MockSessionStore::new();
        let mut users = MockUserStore::new();
        users
            .expect_find_by_username()
            .returning(|_| Err(StoreError::Io(std::io::Error::other("store is down"))));
        sessions.expect_sessions_since().never();

        let stats = aggregated_stats(
            &sessions,
            &users,
            "ana",
            now,
            OpenSessions::Exclude,
            &ScoreParams::default(),
        )
        .await;

        assert_eq!(stats, AggregatedStats::no_data("ana"));
    }

    #[tokio::test]
    async fn unknown_user_degrades_to_placeholder() {
        let now = at(2024, 3, 6, 15);
        let mut sessions = MockSessionStore::new();
        let mut users = MockUserStore::new();
        users.expect_find_by_username().returning(|_| Ok(None));
        sessions.expect_sessions_since().never();

        let stats = aggregated_stats(
            &sessions,
            &users,
            "ghost",
            now,
            OpenSessions::Exclude,
            &ScoreParams::default(),
        )
        .await;

        assert_eq!(&*stats.username, PLACEHOLDER_USERNAME);
        assert_eq!(stats.daily_score, 0.);
    }

    #[tokio::test]
    async fn daily_score_sums_only_scored_sessions() -> anyhow::Result<()> {
        let mut sessions = MockSessionStore::new();
        sessions.expect_sessions_since().returning(move |_, _| {
            Ok(vec![
                closed(at(2024, 3, 6, 9), 30, 30.004),
                closed(at(2024, 3, 6, 11), 30, 12.),
                open(at(2024, 3, 6, 14)),
            ])
        });

        let score = daily_score(&sessions, 7, at(2024, 3, 6, 0)).await?;
        assert_eq!(score, 42.0);
        Ok(())
    }
}
