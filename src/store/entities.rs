use std::fmt::Display;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// What caused the session to open. App sessions are opened on startup and on
/// return from idle, screen sessions on screen unlock.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    AppSession,
    ScreenSession,
}

impl Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::AppSession => write!(f, "app_session"),
            SessionKind::ScreenSession => write!(f, "screen_session"),
        }
    }
}

/// One contiguous span of active use. Open while `end_time` is absent, then
/// immutable once closed.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct SessionEntity {
    pub id: u64,
    pub user_id: u64,
    pub kind: SessionKind,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl SessionEntity {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Field updates applied to an open session. Heartbeats refresh the running
/// totals, closing additionally sets `end_time`.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SessionPatch {
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub multiplier: Option<f64>,
    pub score: Option<f64>,
}

impl SessionPatch {
    pub fn heartbeat(duration_minutes: i64, multiplier: f64, score: f64) -> Self {
        Self {
            end_time: None,
            duration_minutes: Some(duration_minutes),
            multiplier: Some(multiplier),
            score: Some(score),
        }
    }

    pub fn close(
        end_time: DateTime<Utc>,
        duration_minutes: i64,
        multiplier: f64,
        score: f64,
    ) -> Self {
        Self {
            end_time: Some(end_time),
            ..Self::heartbeat(duration_minutes, multiplier, score)
        }
    }

    pub fn apply_to(&self, session: &mut SessionEntity) {
        if let Some(end_time) = self.end_time {
            session.end_time = Some(end_time);
        }
        if let Some(duration) = self.duration_minutes {
            session.duration_minutes = Some(duration);
        }
        if let Some(multiplier) = self.multiplier {
            session.multiplier = Some(multiplier);
        }
        if let Some(score) = self.score {
            session.score = Some(score);
        }
    }
}

/// Identity plus the online flag that mirrors whether a session is currently
/// open for this user.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct UserEntity {
    pub id: u64,
    pub username: Arc<str>,
    #[serde(default)]
    pub is_online: bool,
}
