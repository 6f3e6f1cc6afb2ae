use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// A technician's price for a service request. Costs are in cents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub id: String,
    pub service_request_id: String,
    pub technician_id: String,
    pub estimated_hours: f64,
    pub materials_cost_cents: i64,
    pub labor_cost_cents: i64,
    pub total_cost_cents: i64,
    pub customer_accepted: bool,
    pub withdrawn: bool,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteEstimate {
    pub estimated_hours: f64,
    pub materials_cost_cents: i64,
    pub labor_cost_cents: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl QuoteEstimate {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.estimated_hours.is_finite() || self.estimated_hours <= 0.0 {
            return Err(AppError::Validation(
                "estimated_hours must be a positive number".to_string(),
            ));
        }
        if self.materials_cost_cents < 0 || self.labor_cost_cents < 0 {
            return Err(AppError::Validation("costs must not be negative".to_string()));
        }
        Ok(())
    }

    pub fn total_cost_cents(&self) -> i64 {
        self.materials_cost_cents.saturating_add(self.labor_cost_cents)
    }
}

impl Quote {
    /// Open quotes can still be accepted or withdrawn.
    pub fn is_open(&self) -> bool {
        !self.withdrawn && !self.customer_accepted
    }
}
