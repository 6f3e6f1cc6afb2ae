use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::db::SqliteRepository;
use crate::models::DomainEvent;
use crate::services::coordinator::Coordinator;

pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub repo: Arc<SqliteRepository>,
    pub config: AppConfig,
    pub events_tx: broadcast::Sender<DomainEvent>,
}
