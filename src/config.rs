use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub http_timeout_secs: u64,
    pub sync_interval_secs: u64,
    pub fetch_interval_secs: u64,
    pub upload_batch_size: usize,
    pub retention_days: i64,
    pub proximity_radius_m: f64,
    pub min_confirmations: u32,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://road_hazards.db".to_string());
        let api_base_url =
            env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let api_token = env::var("API_TOKEN").ok().filter(|t| !t.trim().is_empty());

        let http_timeout_secs = parse_var("HTTP_TIMEOUT_SECS", 15);
        let sync_interval_secs = parse_var("SYNC_INTERVAL_SECS", 30);
        let fetch_interval_secs = parse_var("FETCH_INTERVAL_SECS", 30);
        let upload_batch_size = parse_var("UPLOAD_BATCH_SIZE", 50);
        let retention_days = parse_var("RETENTION_DAYS", 30);
        let proximity_radius_m = parse_var("PROXIMITY_RADIUS_M", 1000.0);
        let min_confirmations = parse_var("MIN_CONFIRMATIONS", 1);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            api_base_url,
            api_token,
            http_timeout_secs,
            sync_interval_secs: sync_interval_secs.max(1),
            fetch_interval_secs: fetch_interval_secs.max(1),
            upload_batch_size: upload_batch_size.max(1),
            retention_days,
            proximity_radius_m,
            min_confirmations: min_confirmations.max(1),
            log_level,
        })
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Reads a numeric variable, falling back to `default` when missing or unparseable.
fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
