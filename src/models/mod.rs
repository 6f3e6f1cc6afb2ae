pub mod availability;
pub mod booking;
pub mod event;
pub mod job;
pub mod quote;
pub mod service_request;
pub mod slot;

pub use availability::{weekday_index, AvailabilityRule, RuleDraft};
pub use booking::{Booking, BookingStatus, CancellationReason};
pub use event::DomainEvent;
pub use job::{Job, JobStatus};
pub use quote::{Quote, QuoteEstimate};
pub use service_request::{NewServiceRequest, ServiceRequest, ServiceRequestStatus, Urgency};
pub use slot::{minute_of_day, Scope, Slot, MINUTES_PER_DAY};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_time(s: &str) -> anyhow::Result<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| chrono::NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| anyhow::anyhow!("invalid time of day: {s}"))
}

pub fn parse_date(s: &str) -> anyhow::Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| anyhow::anyhow!("invalid date: {s}"))
}

/// Serde adapter for `HH:MM` times of day.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(super::TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}
