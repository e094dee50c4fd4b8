//! Calendar of lives, releases and events.

mod routes;
mod service;

pub use routes::ScheduleModule;
pub use service::ScheduleService;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::oshi::OshiLinked;
use crate::store::Record;
use crate::validation::validate_not_blank;

/// One week
pub const MAX_REMIND_BEFORE_MINUTES: u32 = 10_080;
pub const DEFAULT_UPCOMING_LIMIT: u32 = 10;
pub const MAX_UPCOMING_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub user_id: String,
    pub oshi_id: Option<String>,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub location: Option<String>,
    pub memo: Option<String>,
    pub remind_before_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// When to remind, if a reminder is set.
    pub fn reminder_at(&self) -> Option<DateTime<Utc>> {
        self.remind_before_minutes
            .map(|minutes| self.starts_at - Duration::minutes(i64::from(minutes)))
    }

    /// `ends_at`, or `starts_at` for events without an end.
    pub fn effective_end(&self) -> DateTime<Utc> {
        self.ends_at.unwrap_or(self.starts_at)
    }
}

impl Record for Schedule {
    const KIND: &'static str = "Schedule";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

impl OshiLinked for Schedule {
    fn oshi_id_mut(&mut self) -> &mut Option<String> {
        &mut self.oshi_id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub reminder_at: Option<DateTime<Utc>>,
}

impl From<Schedule> for ScheduleView {
    fn from(schedule: Schedule) -> Self {
        Self {
            reminder_at: schedule.reminder_at(),
            schedule,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateScheduleRequest {
    pub oshi_id: Option<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: bool,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 1000))]
    pub memo: Option<String>,
    #[validate(range(max = MAX_REMIND_BEFORE_MINUTES))]
    pub remind_before_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateScheduleRequest {
    pub oshi_id: Option<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub title: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 1000))]
    pub memo: Option<String>,
    #[validate(range(max = MAX_REMIND_BEFORE_MINUTES))]
    pub remind_before_minutes: Option<u32>,
}

/// Schedules overlapping `[from, to]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpcomingQuery {
    #[serde(default = "default_upcoming_limit")]
    #[validate(range(min = 1, max = MAX_UPCOMING_LIMIT))]
    pub limit: u32,
}

fn default_upcoming_limit() -> u32 {
    DEFAULT_UPCOMING_LIMIT
}
