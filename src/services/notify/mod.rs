pub mod webhook;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::models::DomainEvent;

/// Fire-and-forget sink for state-change events. Implementations must not
/// block the caller on delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &DomainEvent);
}

/// Feeds live subscribers such as the SSE stream.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<DomainEvent>) -> Self {
        Self { tx }
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: &DomainEvent) {
        // No receivers is fine
        let _ = self.tx.send(event.clone());
    }
}

pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, event: &DomainEvent) {
        tracing::debug!(kind = event.kind(), "dispatching event");
        for target in &self.targets {
            target.notify(event);
        }
    }
}
