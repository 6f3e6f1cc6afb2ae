use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

use super::slot::{minute_of_day, MINUTES_PER_DAY};

pub const DEFAULT_SLOT_MINUTES: u32 = 60;

const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Weekly opening window for one weekday, optionally narrowed to a single
/// service type. Day 0 is Sunday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityRule {
    pub id: String,
    pub day_of_week: u8,
    pub is_available: bool,
    #[serde(with = "super::hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "super::hhmm")]
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
    pub buffer_minutes: u32,
    pub max_bookings_per_day: Option<u32>,
    pub service_type: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Admin input for creating or editing the rule of a (day, service type) pair.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDraft {
    pub day_of_week: u8,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(with = "super::hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "super::hhmm")]
    pub end_time: NaiveTime,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub buffer_minutes: u32,
    #[serde(default)]
    pub max_bookings_per_day: Option<u32>,
    #[serde(default)]
    pub service_type: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_duration() -> u32 {
    DEFAULT_SLOT_MINUTES
}

impl RuleDraft {
    /// Blank service types collapse to the generic rule.
    pub fn normalized_service_type(&self) -> Option<String> {
        self.service_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn into_rule(self, id: String, created_at: NaiveDateTime, now: NaiveDateTime) -> AvailabilityRule {
        let service_type = self.normalized_service_type();
        AvailabilityRule {
            id,
            day_of_week: self.day_of_week,
            is_available: self.is_available,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_minutes: self.duration_minutes,
            buffer_minutes: self.buffer_minutes,
            max_bookings_per_day: self.max_bookings_per_day,
            service_type,
            created_at,
            updated_at: now,
        }
    }
}

impl AvailabilityRule {
    /// Write-time validation. Generation never re-checks these.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.day_of_week > 6 {
            return Err(AppError::Validation(format!(
                "day_of_week must be 0-6, got {}",
                self.day_of_week
            )));
        }
        if self.duration_minutes == 0 {
            return Err(AppError::Validation(
                "duration_minutes must be greater than zero".to_string(),
            ));
        }
        if self.step_minutes() > MINUTES_PER_DAY {
            return Err(AppError::Validation(format!(
                "duration_minutes plus buffer_minutes must fit in one day ({MINUTES_PER_DAY}), got {} + {}",
                self.duration_minutes, self.buffer_minutes
            )));
        }
        if self.is_available && self.start_time >= self.end_time {
            return Err(AppError::Validation(format!(
                "start_time {} must be before end_time {} on the same day",
                self.start_time.format(super::TIME_FORMAT),
                self.end_time.format(super::TIME_FORMAT)
            )));
        }
        if self.max_bookings_per_day == Some(0) {
            return Err(AppError::Validation(
                "max_bookings_per_day must be positive when set".to_string(),
            ));
        }
        if let Some(service_type) = &self.service_type {
            if service_type.trim().is_empty() {
                return Err(AppError::Validation(
                    "service_type must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_generic(&self) -> bool {
        self.service_type.is_none()
    }

    pub fn step_minutes(&self) -> u32 {
        self.duration_minutes.saturating_add(self.buffer_minutes)
    }

    pub fn open_minute(&self) -> u32 {
        minute_of_day(self.start_time)
    }

    pub fn close_minute(&self) -> u32 {
        minute_of_day(self.end_time)
    }

    pub fn cap_reached(&self, count: usize) -> bool {
        self.max_bookings_per_day
            .map(|max| count >= max as usize)
            .unwrap_or(false)
    }

    pub fn to_human_readable(&self) -> String {
        let day = capitalize(weekday_name(self.day_of_week));
        let scope = self.service_type.as_deref().unwrap_or("all services");
        if !self.is_available {
            return format!("{day}: closed ({scope})");
        }
        format!(
            "{day}: {}-{} ({scope})",
            self.start_time.format(super::TIME_FORMAT),
            self.end_time.format(super::TIME_FORMAT)
        )
    }
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn weekday_name(day: u8) -> &'static str {
    DAY_NAMES.get(day as usize).copied().unwrap_or("?")
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + c.as_str(),
    }
}
