//! Cache configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::keys::DigestAlgorithm;

/// Default time-to-live for cached results (12 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Environment variable holding the default TTL in seconds
pub const ENV_TTL_SECS: &str = "FORGETMENOT_TTL_SECS";

/// Environment variable selecting the digest (`sha1` or `sha256`)
pub const ENV_DIGEST: &str = "FORGETMENOT_DIGEST";

/// Environment variable enabling activity logging (`1` or `true`)
pub const ENV_LOG_ACTIVITY: &str = "FORGETMENOT_LOG_ACTIVITY";

/// Policy shared by every cached member of a [`crate::ResultCache`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL used when a member does not set its own
    pub ttl: Duration,
    /// Digest for keys and discriminators
    pub digest: DigestAlgorithm,
    /// Report hits and misses to the activity sink
    pub log_activity: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            digest: DigestAlgorithm::default(),
            log_activity: false,
        }
    }
}

impl CacheConfig {
    /// Set the default TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the digest algorithm
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Enable or disable activity logging
    pub fn with_log_activity(mut self, enabled: bool) -> Self {
        self.log_activity = enabled;
        self
    }

    /// Defaults overridden by `FORGETMENOT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TTL_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::Configuration(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_TTL_SECS, raw
                ))
            })?;
            config.ttl = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(ENV_DIGEST) {
            config.digest = raw.trim().parse()?;
        }

        if let Some(raw) = lookup(ENV_LOG_ACTIVITY) {
            config.log_activity = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(Error::Configuration(format!(
                        "{} must be a boolean, got '{}'",
                        ENV_LOG_ACTIVITY, other
                    )))
                }
            };
        }

        Ok(config)
    }
}
