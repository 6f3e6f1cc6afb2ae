use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A bookable window derived from a rule. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub date: NaiveDate,
    #[serde(with = "super::hhmm")]
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub service_type: Option<String>,
}

impl Slot {
    pub fn start_minute(&self) -> u32 {
        minute_of_day(self.start_time)
    }

    pub fn end_minute(&self) -> u32 {
        self.start_minute().saturating_add(self.duration_minutes)
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }
}

/// Unit of conflict checking and locking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope {
    pub date: NaiveDate,
    pub service_type: Option<String>,
}

impl Scope {
    pub fn new(date: NaiveDate, service_type: Option<&str>) -> Self {
        Self {
            date,
            service_type: service_type.map(str::to_string),
        }
    }

    pub fn covers(&self, date: NaiveDate, service_type: &str) -> bool {
        self.date == date
            && self
                .service_type
                .as_deref()
                .map(|s| s == service_type)
                .unwrap_or(true)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.service_type {
            Some(s) => write!(f, "{}/{s}", self.date),
            None => write!(f, "{}/*", self.date),
        }
    }
}

pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}
