use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use servicebook::config::AppConfig;
use servicebook::db::SqliteRepository;
use servicebook::handlers;
use servicebook::services::billing::http::HttpBillingProvider;
use servicebook::services::billing::{BillingProvider, DevBillingProvider};
use servicebook::services::coordinator::Coordinator;
use servicebook::services::notify::webhook::WebhookNotifier;
use servicebook::services::notify::{BroadcastNotifier, FanoutNotifier, Notifier};
use servicebook::services::sweeper::spawn_payment_sweep;
use servicebook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let repo = Arc::new(SqliteRepository::open(&config.database_url)?);

    let billing: Arc<dyn BillingProvider> = if config.billing_url.is_empty() {
        tracing::warn!("BILLING_URL not set, every payment will be auto-approved");
        Arc::new(DevBillingProvider)
    } else {
        tracing::info!("using billing provider at {}", config.billing_url);
        Arc::new(HttpBillingProvider::new(
            config.billing_url.clone(),
            config.billing_api_key.clone(),
        ))
    };

    let (events_tx, _) = broadcast::channel(256);
    let mut notifiers: Vec<Arc<dyn Notifier>> =
        vec![Arc::new(BroadcastNotifier::new(events_tx.clone()))];
    if !config.notify_webhook_url.is_empty() {
        if config.notify_webhook_secret.is_empty() {
            tracing::warn!("NOTIFY_WEBHOOK_SECRET is empty, webhook signatures are forgeable");
        }
        tracing::info!("delivering events to {}", config.notify_webhook_url);
        notifiers.push(Arc::new(WebhookNotifier::new(
            config.notify_webhook_url.clone(),
            config.notify_webhook_secret.clone(),
        )));
    }

    let coordinator = Arc::new(Coordinator::new(
        repo.clone(),
        billing,
        Arc::new(FanoutNotifier::new(notifiers)),
        repo.clone(),
        chrono::Duration::minutes(config.payment_window_minutes),
    ));

    spawn_payment_sweep(
        coordinator.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );

    let state = Arc::new(AppState {
        coordinator,
        repo,
        config: config.clone(),
        events_tx,
    });

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
