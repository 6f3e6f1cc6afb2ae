use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BillingProvider, PaymentOutcome};

pub struct HttpBillingProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpBillingProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ConfirmRequest<'a> {
    booking_id: &'a str,
}

#[derive(Deserialize)]
struct ConfirmResponse {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

impl ConfirmResponse {
    fn into_outcome(self) -> PaymentOutcome {
        match self.status.as_str() {
            "succeeded" | "approved" | "paid" => PaymentOutcome::Approved,
            other => PaymentOutcome::Declined {
                reason: self.reason.unwrap_or_else(|| format!("payment {other}")),
            },
        }
    }
}

#[async_trait]
impl BillingProvider for HttpBillingProvider {
    async fn confirm_payment(&self, booking_id: &str) -> anyhow::Result<PaymentOutcome> {
        let url = format!("{}/payments/confirm", self.base_url);

        let response: ConfirmResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ConfirmRequest { booking_id })
            .send()
            .await
            .context("failed to reach billing provider")?
            .error_for_status()
            .context("billing provider returned error")?
            .json()
            .await
            .context("failed to parse billing provider response")?;

        let outcome = response.into_outcome();
        tracing::info!(booking_id, outcome = ?outcome, "billing confirmation received");
        Ok(outcome)
    }
}
