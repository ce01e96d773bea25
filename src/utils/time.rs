use chrono::{DateTime, Datelike, Duration, TimeZone};
use now::DateTimeNow;

/// Boundaries of the four reporting windows, all derived from one captured
/// "now" so that a long aggregation pass can't observe drifting boundaries
/// around midnight or month rollover.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStarts<Tz: TimeZone> {
    pub day: DateTime<Tz>,
    pub week: DateTime<Tz>,
    pub month: DateTime<Tz>,
    pub year: DateTime<Tz>,
}

impl<Tz: TimeZone> WindowStarts<Tz> {
    pub fn at(now: DateTime<Tz>) -> Self {
        let day = now.beginning_of_day();
        // Weeks start on Sunday, matching day-of-week 0.
        let week = day.clone() - Duration::days(now.weekday().num_days_from_sunday() as i64);
        Self {
            day,
            week,
            month: now.beginning_of_month(),
            year: now.beginning_of_year(),
        }
    }

    /// Converts the boundaries into another timezone without moving them.
    pub fn with_timezone<Tz2: TimeZone>(&self, tz: &Tz2) -> WindowStarts<Tz2> {
        WindowStarts {
            day: self.day.with_timezone(tz),
            week: self.week.with_timezone(tz),
            month: self.month.with_timezone(tz),
            year: self.year.with_timezone(tz),
        }
    }
}

/// Rounds to 2 decimal places. All user-facing scores and hours go through
/// this.
pub fn round2(value: f64) -> f64 {
    (value * 100.).round() / 100.
}

/// Whole minutes between two instants, clamped at zero. Scoring operates at
/// minute granularity, sub-minute leftovers are dropped.
pub fn whole_minutes_between<Tz: TimeZone>(start: DateTime<Tz>, end: DateTime<Tz>) -> i64 {
    (end - start).num_minutes().max(0)
}
