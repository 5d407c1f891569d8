//! Realtime layer configuration

use std::env;
use std::time::Duration;

/// Timeouts, TTLs, and retention windows loaded from environment variables
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    // Store
    pub redis_url: String,

    // Presence
    pub heartbeat_timeout: Duration,
    pub away_timeout: Duration,
    pub presence_ttl: Duration,
    pub offline_grace: Duration,
    pub presence_retention: Duration,

    // Typing
    pub typing_timeout: Duration,

    // Offline queue
    pub queue_retention: Duration,
    pub max_delivery_attempts: u32,

    // Routing
    pub routing_counter_ttl: Duration,

    // Background sweeps
    pub sweep_interval: Duration,
    pub cleanup_interval: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            heartbeat_timeout: Duration::from_secs(30),
            away_timeout: Duration::from_secs(300),
            presence_ttl: Duration::from_secs(90),
            offline_grace: Duration::from_secs(86_400),
            presence_retention: Duration::from_secs(604_800),
            typing_timeout: Duration::from_secs(5),
            queue_retention: Duration::from_secs(259_200),
            max_delivery_attempts: 3,
            routing_counter_ttl: Duration::from_secs(86_400),
            sweep_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(3_600),
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            heartbeat_timeout: Duration::from_secs(
                env::var("PRESENCE_HEARTBEAT_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),
            away_timeout: Duration::from_secs(
                env::var("PRESENCE_AWAY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            ),
            presence_ttl: Duration::from_secs(
                env::var("PRESENCE_TTL_SECS")
                    .unwrap_or_else(|_| "90".to_string())
                    .parse()
                    .unwrap_or(90),
            ),
            offline_grace: Duration::from_secs(
                env::var("PRESENCE_OFFLINE_GRACE_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86_400),
            ),
            presence_retention: Duration::from_secs(
                env::var("PRESENCE_RETENTION_SECS")
                    .unwrap_or_else(|_| "604800".to_string()) // 7 days
                    .parse()
                    .unwrap_or(604_800),
            ),

            typing_timeout: Duration::from_secs(
                env::var("TYPING_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            ),

            queue_retention: Duration::from_secs(
                env::var("QUEUE_RETENTION_SECS")
                    .unwrap_or_else(|_| "259200".to_string()) // 72 hours
                    .parse()
                    .unwrap_or(259_200),
            ),
            max_delivery_attempts: env::var("QUEUE_MAX_DELIVERY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),

            routing_counter_ttl: Duration::from_secs(
                env::var("ROUTING_COUNTER_TTL_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86_400),
            ),

            sweep_interval: Duration::from_secs(
                env::var("SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),
            cleanup_interval: Duration::from_secs(
                env::var("CLEANUP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3_600),
            ),
        };

        // Records must outlive the gap between heartbeats or every sweep
        // sees an empty keyspace
        if config.presence_ttl <= config.heartbeat_timeout {
            return Err(ConfigError::Invalid(
                "PRESENCE_TTL_SECS must exceed PRESENCE_HEARTBEAT_TIMEOUT_SECS",
            ));
        }
        if config.max_delivery_attempts == 0 {
            return Err(ConfigError::Invalid(
                "QUEUE_MAX_DELIVERY_ATTEMPTS must be at least 1",
            ));
        }

        Ok(config)
    }

    /// Load `.env` if present, then read configuration from the environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
