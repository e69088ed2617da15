//! Store configuration, loaded from the environment.

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Redis connection and reclamation-sweeper tuning, all overridable via env vars.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub redis_url: String,

    /// `claim_job`'s own default when the caller omits `claim_timeout`.
    pub default_claim_timeout_secs: i64,
    /// `cleanup_stale_claims`'s fallback max-claim-age, used only if a claimed
    /// job is missing its stored `claim_timeout`.
    pub stale_claim_max_age_secs: i64,

    pub stale_claim_sweep_interval_secs: u64,
    pub stale_worker_sweep_interval_secs: u64,
    pub deep_sweep_interval_secs: u64,

    /// `mark_stale_workers_out_of_service`'s heartbeat-age threshold.
    pub worker_out_of_service_age_secs: i64,
    /// `cleanup_stale_jobs`'s heartbeat-age threshold (longer: gives a
    /// disconnected worker more room before its in-flight jobs are reclaimed).
    pub max_worker_heartbeat_age_secs: i64,
    /// Freshness window used when deciding whether an idle worker is worth notifying.
    pub worker_freshness_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_claim_timeout_secs: 30,
            stale_claim_max_age_secs: 60,
            stale_claim_sweep_interval_secs: 15,
            stale_worker_sweep_interval_secs: 30,
            deep_sweep_interval_secs: 300,
            worker_out_of_service_age_secs: 120,
            max_worker_heartbeat_age_secs: 600,
            worker_freshness_secs: 30,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(default.redis_url),
            default_claim_timeout_secs: env_parsed(
                "DEFAULT_CLAIM_TIMEOUT_SECS",
                default.default_claim_timeout_secs,
            ),
            stale_claim_max_age_secs: env_parsed(
                "STALE_CLAIM_MAX_AGE_SECS",
                default.stale_claim_max_age_secs,
            ),
            stale_claim_sweep_interval_secs: env_parsed(
                "STALE_CLAIM_SWEEP_INTERVAL_SECS",
                default.stale_claim_sweep_interval_secs,
            ),
            stale_worker_sweep_interval_secs: env_parsed(
                "STALE_WORKER_SWEEP_INTERVAL_SECS",
                default.stale_worker_sweep_interval_secs,
            ),
            deep_sweep_interval_secs: env_parsed(
                "DEEP_SWEEP_INTERVAL_SECS",
                default.deep_sweep_interval_secs,
            ),
            worker_out_of_service_age_secs: env_parsed(
                "WORKER_OUT_OF_SERVICE_AGE_SECS",
                default.worker_out_of_service_age_secs,
            ),
            max_worker_heartbeat_age_secs: env_parsed(
                "MAX_WORKER_HEARTBEAT_AGE_SECS",
                default.max_worker_heartbeat_age_secs,
            ),
            worker_freshness_secs: env_parsed(
                "WORKER_FRESHNESS_SECS",
                default.worker_freshness_secs,
            ),
        }
    }
}
