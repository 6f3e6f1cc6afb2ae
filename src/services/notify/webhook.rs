use anyhow::Context;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::Notifier;
use crate::models::DomainEvent;

pub const SIGNATURE_HEADER: &str = "x-signature";

/// POSTs each event as JSON, signed with the shared secret.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, secret: String) -> Self {
        Self {
            url,
            secret,
            client: reqwest::Client::new(),
        }
    }

    pub async fn deliver(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;
        let signature = sign_payload(&self.secret, &body)?;

        self.client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header("x-event-kind", event.kind())
            .body(body)
            .send()
            .await
            .context("failed to deliver webhook")?
            .error_for_status()
            .context("webhook endpoint returned error")?;

        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: &DomainEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(kind = event.kind(), "no runtime available, webhook dropped");
            return;
        };

        let this = self.clone();
        let event = event.clone();
        handle.spawn(async move {
            if let Err(e) = this.deliver(&event).await {
                tracing::warn!(error = %e, kind = event.kind(), "webhook delivery failed");
            }
        });
    }
}

/// Base64 HMAC-SHA1 of the raw body.
pub fn sign_payload(secret: &str, body: &[u8]) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid webhook secret: {e}"))?;
    mac.update(body);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"kind":"job_started","job_id":"j1"}"#;

    #[test]
    fn test_event_body_shape() {
        let event = DomainEvent::JobStarted {
            job_id: "j1".to_string(),
        };
        assert_eq!(serde_json::to_string(&event).unwrap(), BODY);
    }

    #[test]
    fn test_known_signature() {
        assert_eq!(
            sign_payload("shh", BODY.as_bytes()).unwrap(),
            "NplAQhJsG6WjRV92xC32Xh0JZEc="
        );
    }

    #[test]
    fn test_verify_round_trip_and_tamper() {
        let sig = sign_payload("shh", BODY.as_bytes()).unwrap();
        assert!(verify_signature("shh", BODY.as_bytes(), &sig));
        assert!(!verify_signature("other", BODY.as_bytes(), &sig));
        assert!(!verify_signature("shh", b"{}", &sig));
        assert!(!verify_signature("shh", BODY.as_bytes(), "not base64!"));
    }

    #[test]
    fn test_notify_outside_runtime_does_not_panic() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook".to_string(), "s".to_string());
        notifier.notify(&DomainEvent::JobStarted {
            job_id: "j1".to_string(),
        });
    }
}
