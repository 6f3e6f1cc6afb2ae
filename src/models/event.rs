use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// State-change notifications handed to the notifier. Delivery is someone
/// else's problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    BookingCreated {
        booking_id: String,
        customer_id: String,
        service_type: String,
        date: NaiveDate,
        start_time: String,
    },
    BookingConfirmed {
        booking_id: String,
    },
    BookingStarted {
        booking_id: String,
    },
    BookingCompleted {
        booking_id: String,
    },
    BookingCancelled {
        booking_id: String,
        reason: String,
    },
    BookingRescheduled {
        booking_id: String,
        replacement_id: String,
    },
    ServiceRequestCreated {
        service_request_id: String,
        category: String,
    },
    ServiceRequestCancelled {
        service_request_id: String,
    },
    QuoteReceived {
        quote_id: String,
        service_request_id: String,
        technician_id: String,
        total_cost_cents: i64,
    },
    QuoteWithdrawn {
        quote_id: String,
    },
    QuoteAccepted {
        quote_id: String,
        job_id: String,
    },
    JobStarted {
        job_id: String,
    },
    JobCompleted {
        job_id: String,
        actual_hours: f64,
    },
    JobCancelled {
        job_id: String,
    },
    JobRated {
        job_id: String,
        stars: u8,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated { .. } => "booking_created",
            DomainEvent::BookingConfirmed { .. } => "booking_confirmed",
            DomainEvent::BookingStarted { .. } => "booking_started",
            DomainEvent::BookingCompleted { .. } => "booking_completed",
            DomainEvent::BookingCancelled { .. } => "booking_cancelled",
            DomainEvent::BookingRescheduled { .. } => "booking_rescheduled",
            DomainEvent::ServiceRequestCreated { .. } => "service_request_created",
            DomainEvent::ServiceRequestCancelled { .. } => "service_request_cancelled",
            DomainEvent::QuoteReceived { .. } => "quote_received",
            DomainEvent::QuoteWithdrawn { .. } => "quote_withdrawn",
            DomainEvent::QuoteAccepted { .. } => "quote_accepted",
            DomainEvent::JobStarted { .. } => "job_started",
            DomainEvent::JobCompleted { .. } => "job_completed",
            DomainEvent::JobCancelled { .. } => "job_cancelled",
            DomainEvent::JobRated { .. } => "job_rated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_serde_tag() {
        let event = DomainEvent::QuoteAccepted {
            quote_id: "q1".to_string(),
            job_id: "j1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], event.kind());
        assert_eq!(json["job_id"], "j1");
    }
}
