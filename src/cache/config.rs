//! Cache configuration.
//!
//! Controls the taxonomy lookup caches and the rendered-feed store via `scholia.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TAXONOMY_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_FEED_LIMIT: usize = 200;
const DEFAULT_FEED_TTL_SECONDS: u64 = 60 * 60;

/// Cache configuration from `scholia.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the taxonomy lookup caches.
    pub enabled: bool,
    /// Lifetime of category trees and counts.
    pub taxonomy_ttl_seconds: u64,
    /// Enable the rendered-feed store.
    pub feed_enabled: bool,
    /// Maximum feed documents kept in memory.
    pub feed_limit: usize,
    /// Lifetime of a rendered feed document.
    pub feed_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            taxonomy_ttl_seconds: DEFAULT_TAXONOMY_TTL_SECONDS,
            feed_enabled: true,
            feed_limit: DEFAULT_FEED_LIMIT,
            feed_ttl_seconds: DEFAULT_FEED_TTL_SECONDS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            taxonomy_ttl_seconds: settings.taxonomy_ttl_seconds,
            feed_enabled: settings.feed_enabled,
            feed_limit: settings.feed_limit,
            feed_ttl_seconds: settings.feed_ttl_seconds,
        }
    }
}

impl CacheConfig {
    pub fn taxonomy_ttl(&self) -> Duration {
        Duration::from_secs(self.taxonomy_ttl_seconds)
    }

    pub fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_ttl_seconds)
    }

    /// Returns the feed limit as NonZeroUsize, clamping to 1 if zero.
    pub fn feed_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.feed_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
