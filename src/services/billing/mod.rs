pub mod http;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Approved,
    Declined { reason: String },
}

/// Confirms that a pending booking has been paid for. Called once per
/// booking before it may be confirmed.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn confirm_payment(&self, booking_id: &str) -> anyhow::Result<PaymentOutcome>;
}

/// Approves everything. Used when no billing endpoint is configured.
pub struct DevBillingProvider;

#[async_trait]
impl BillingProvider for DevBillingProvider {
    async fn confirm_payment(&self, booking_id: &str) -> anyhow::Result<PaymentOutcome> {
        tracing::debug!(booking_id, "dev billing: auto-approving payment");
        Ok(PaymentOutcome::Approved)
    }
}
