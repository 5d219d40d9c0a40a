use serde::Deserialize;
use std::time::Duration;

use crate::services::cache::CacheSettings;
use crate::services::recommendations::LimitPolicy;
use crate::services::scoring::ScoringPolicy;

/// Longest accepted scoring window (ten years)
const MAX_WINDOW_HOURS: i64 = 24 * 365 * 10;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL database connection URL; the in-memory backend is used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Result count used when a request does not name one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Upper bound on the requested result count
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// TTL for cached `popular` results
    #[serde(default = "default_popular_ttl_secs")]
    pub popular_ttl_secs: u64,

    /// TTL for cached `forYou` and `similar` results
    #[serde(default = "default_personal_ttl_secs")]
    pub personal_ttl_secs: u64,

    /// Maximum number of cached results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// How long a caller waits on a recommendation before giving up
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_popular_window_hours")]
    pub popular_window_hours: i64,

    #[serde(default = "default_similar_lookback_hours")]
    pub similar_lookback_hours: i64,

    #[serde(default = "default_history_window_hours")]
    pub history_window_hours: i64,

    #[serde(default = "default_decay_half_life_hours")]
    pub decay_half_life_hours: f64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_limit() -> usize {
    6
}

fn default_max_limit() -> usize {
    50
}

fn default_popular_ttl_secs() -> u64 {
    3600
}

fn default_personal_ttl_secs() -> u64 {
    600
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_popular_window_hours() -> i64 {
    24 * 7
}

fn default_similar_lookback_hours() -> i64 {
    24 * 30
}

fn default_history_window_hours() -> i64 {
    24 * 90
}

fn default_decay_half_life_hours() -> f64 {
    72.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            host: default_host(),
            port: default_port(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            popular_ttl_secs: default_popular_ttl_secs(),
            personal_ttl_secs: default_personal_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            request_timeout_ms: default_request_timeout_ms(),
            popular_window_hours: default_popular_window_hours(),
            similar_lookback_hours: default_similar_lookback_hours(),
            history_window_hours: default_history_window_hours(),
            decay_half_life_hours: default_decay_half_life_hours(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the services cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_limit == 0 {
            anyhow::bail!("MAX_LIMIT must be positive");
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            anyhow::bail!(
                "DEFAULT_LIMIT must be between 1 and MAX_LIMIT ({})",
                self.max_limit
            );
        }
        if self.cache_capacity == 0 {
            anyhow::bail!("CACHE_CAPACITY must be positive");
        }
        if !self.decay_half_life_hours.is_finite() || self.decay_half_life_hours <= 0.0 {
            anyhow::bail!("DECAY_HALF_LIFE_HOURS must be a positive number");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_MS must be positive");
        }
        for (name, hours) in [
            ("POPULAR_WINDOW_HOURS", self.popular_window_hours),
            ("SIMILAR_LOOKBACK_HOURS", self.similar_lookback_hours),
            ("HISTORY_WINDOW_HOURS", self.history_window_hours),
        ] {
            if !(1..=MAX_WINDOW_HOURS).contains(&hours) {
                anyhow::bail!("{} must be between 1 and {}, got {}", name, MAX_WINDOW_HOURS, hours);
            }
        }
        Ok(())
    }

    /// Socket address the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            capacity: self.cache_capacity,
            popular_ttl: Duration::from_secs(self.popular_ttl_secs),
            personal_ttl: Duration::from_secs(self.personal_ttl_secs),
        }
    }

    pub fn limit_policy(&self) -> LimitPolicy {
        LimitPolicy {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            popular_window: chrono::Duration::hours(self.popular_window_hours),
            similar_lookback: chrono::Duration::hours(self.similar_lookback_hours),
            history_window: chrono::Duration::hours(self.history_window_hours),
            decay_half_life_hours: self.decay_half_life_hours,
            ..ScoringPolicy::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
