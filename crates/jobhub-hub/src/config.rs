//! Hub configuration.

use std::time::Duration;

/// Hub server configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub metrics_enabled: bool,
    pub stats_broadcast_interval: Duration,
    pub stats_broadcast_idle_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            metrics_enabled: true,
            stats_broadcast_interval: Duration::from_millis(1000),
            stats_broadcast_idle_interval: Duration::from_millis(3000),
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("HUB_HOST").unwrap_or(default.host),
            port: std::env::var("HUB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.cors_origins),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(default.metrics_enabled),
            stats_broadcast_interval: Duration::from_millis(
                std::env::var("STATS_BROADCAST_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            stats_broadcast_idle_interval: Duration::from_millis(
                std::env::var("STATS_BROADCAST_IDLE_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3000),
            ),
        }
    }
}
