use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub service_request_id: String,
    pub quote_id: String,
    pub technician_id: String,
    pub scheduled_date: Option<NaiveDate>,
    pub status: JobStatus,
    pub actual_hours: Option<f64>,
    pub customer_rating: Option<u8>,
    pub customer_feedback: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(JobStatus::Scheduled),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Same shape as the booking table: cancellation only before work starts.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress) | (Scheduled, Cancelled) | (InProgress, Completed)
        )
    }
}

impl Job {
    pub fn transition_to(&mut self, next: JobStatus, now: NaiveDateTime) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                entity: "job",
                current: self.status.as_str(),
                requested: next.as_str(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Records the customer's single rating for a completed job.
    pub fn rate(&mut self, stars: u8, feedback: Option<String>, now: NaiveDateTime) -> Result<(), AppError> {
        if !(1..=5).contains(&stars) {
            return Err(AppError::Validation(format!(
                "rating must be between 1 and 5, got {stars}"
            )));
        }
        if self.status != JobStatus::Completed {
            return Err(AppError::Validation(format!(
                "job is {} and cannot be rated until completed",
                self.status.as_str()
            )));
        }
        if self.customer_rating.is_some() {
            return Err(AppError::AlreadyRated {
                job_id: self.id.clone(),
            });
        }
        self.customer_rating = Some(stars);
        self.customer_feedback = feedback.filter(|f| !f.trim().is_empty());
        self.updated_at = now;
        Ok(())
    }
}
