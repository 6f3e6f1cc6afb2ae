use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRequest {
    pub id: String,
    pub customer_id: String,
    pub category: String,
    pub description: String,
    pub urgency: Urgency,
    pub preferred_date: Option<NaiveDate>,
    pub status: ServiceRequestStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewServiceRequest {
    pub customer_id: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub preferred_date: Option<NaiveDate>,
}

impl NewServiceRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("customer_id", &self.customer_id),
            ("category", &self.category),
            ("description", &self.description),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Emergency,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Urgency::Low),
            "normal" => Some(Urgency::Normal),
            "high" => Some(Urgency::High),
            "emergency" => Some(Urgency::Emergency),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRequestStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRequestStatus::Pending => "pending",
            ServiceRequestStatus::Assigned => "assigned",
            ServiceRequestStatus::InProgress => "in_progress",
            ServiceRequestStatus::Completed => "completed",
            ServiceRequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ServiceRequestStatus::Pending),
            "assigned" => Some(ServiceRequestStatus::Assigned),
            "in_progress" => Some(ServiceRequestStatus::InProgress),
            "completed" => Some(ServiceRequestStatus::Completed),
            "cancelled" => Some(ServiceRequestStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ServiceRequestStatus) -> bool {
        use ServiceRequestStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Pending, Cancelled)
                | (Assigned, InProgress)
                | (Assigned, Cancelled)
                | (InProgress, Completed)
        )
    }
}

impl ServiceRequest {
    pub fn transition_to(
        &mut self,
        next: ServiceRequestStatus,
        now: NaiveDateTime,
    ) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                entity: "service_request",
                current: self.status.as_str(),
                requested: next.as_str(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServiceRequestStatus::*;

    #[test]
    fn test_request_lifecycle_table() {
        assert!(Pending.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn test_urgency_parse() {
        assert_eq!(Urgency::parse("emergency"), Some(Urgency::Emergency));
        assert_eq!(Urgency::parse("whenever"), None);
        assert_eq!(Urgency::default(), Urgency::Normal);
    }
}
