use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

use super::slot::{minute_of_day, Scope};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub service_type: String,
    pub date: NaiveDate,
    #[serde(with = "super::hhmm")]
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub status: BookingStatus,
    pub cancel_reason: Option<CancellationReason>,
    pub cancel_note: Option<String>,
    pub rescheduled_from: Option<String>,
    pub rescheduled_to: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Rescheduled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// The legal transition table. Anything not listed here is rejected.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Pending, Rescheduled)
                | (Confirmed, InProgress)
                | (Confirmed, Cancelled)
                | (Confirmed, Rescheduled)
                | (InProgress, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Rescheduled
        )
    }

    /// Whether a booking in this state still occupies its slot.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::Rescheduled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    CustomerRequest,
    AdminRequest,
    BillingFailed,
    PaymentTimeout,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::CustomerRequest => "customer_request",
            CancellationReason::AdminRequest => "admin_request",
            CancellationReason::BillingFailed => "billing_failed",
            CancellationReason::PaymentTimeout => "payment_timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer_request" => Some(CancellationReason::CustomerRequest),
            "admin_request" => Some(CancellationReason::AdminRequest),
            "billing_failed" => Some(CancellationReason::BillingFailed),
            "payment_timeout" => Some(CancellationReason::PaymentTimeout),
            _ => None,
        }
    }
}

impl Booking {
    pub fn scope(&self) -> Scope {
        Scope::new(self.date, Some(&self.service_type))
    }

    pub fn start_minute(&self) -> u32 {
        minute_of_day(self.start_time)
    }

    pub fn end_minute(&self) -> u32 {
        self.start_minute().saturating_add(self.duration_minutes)
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(self.duration_minutes as i64)
    }

    /// Moves the booking to `next` or fails with the current and requested
    /// states. The record is left untouched on failure.
    pub fn transition_to(&mut self, next: BookingStatus, now: NaiveDateTime) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                entity: "booking",
                current: self.status.as_str(),
                requested: next.as_str(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(
        &mut self,
        reason: CancellationReason,
        note: Option<String>,
        now: NaiveDateTime,
    ) -> Result<(), AppError> {
        self.transition_to(BookingStatus::Cancelled, now)?;
        self.cancel_reason = Some(reason);
        self.cancel_note = note;
        Ok(())
    }
}
