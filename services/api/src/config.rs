//! Environment configuration for the API server.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    /// Bearer token for the admin routes. Absent or empty closes them.
    pub auth_secret: Option<String>,
    pub cache_ttl: Duration,
    pub refresh_interval: Duration,
    /// Requests per minute per client IP. `None` when set to 0.
    pub rate_limit_per_minute: Option<NonZeroU32>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} '{raw}' is not a number")),
                None => Ok(default),
            }
        };

        let refresh_hours = number("REFRESH_INTERVAL_HOURS", 24)?;
        if refresh_hours == 0 {
            anyhow::bail!("REFRESH_INTERVAL_HOURS must be at least 1");
        }

        let per_minute = number("RATE_LIMIT_PER_MINUTE", 100)?;
        let per_minute = u32::try_from(per_minute)
            .with_context(|| format!("RATE_LIMIT_PER_MINUTE {per_minute} is too large"))?;

        Ok(Self {
            bind: lookup("API_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            auth_secret: lookup("AUTH_SECRET").filter(|s| !s.is_empty()),
            cache_ttl: Duration::from_secs(number("CACHE_TTL_SECS", 24 * 60 * 60)?),
            refresh_interval: Duration::from_secs(refresh_hours * 60 * 60),
            rate_limit_per_minute: NonZeroU32::new(per_minute),
        })
    }
}
