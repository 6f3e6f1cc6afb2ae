use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub business_name: String,
    pub billing_url: String,
    pub billing_api_key: String,
    pub payment_window_minutes: i64,
    pub sweep_interval_secs: u64,
    pub notify_webhook_url: String,
    pub notify_webhook_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "servicebook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            business_name: env::var("BUSINESS_NAME").unwrap_or_else(|_| "Servicebook".to_string()),
            billing_url: env::var("BILLING_URL").unwrap_or_default(),
            billing_api_key: env::var("BILLING_API_KEY").unwrap_or_default(),
            payment_window_minutes: env::var("PAYMENT_WINDOW_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|m| *m > 0)
                .unwrap_or(30),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|s| *s > 0)
                .unwrap_or(60),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
            notify_webhook_secret: env::var("NOTIFY_WEBHOOK_SECRET").unwrap_or_default(),
        }
    }
}
