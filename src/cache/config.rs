//! Cache configuration.
//!
//! Controls the query cache via the `[cache]` table of `leadcast.toml`.

use std::num::NonZeroUsize;

use clap::ValueEnum;
use serde::Deserialize;

const DEFAULT_MAX_ENTRIES: usize = 64;

/// When invalidated keys are fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RefetchPolicy {
    /// Refetch the next time the key is resolved.
    #[default]
    OnDemand,
    /// The live view re-resolves its current key as soon as an invalidation lands.
    Eager,
}

/// Cache configuration from `leadcast.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of query keys kept before the least recently used one is evicted.
    pub max_entries: usize,
    /// Refetch behavior after invalidation.
    pub refetch: RefetchPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            refetch: RefetchPolicy::OnDemand,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries.get(),
            refetch: settings.refetch,
        }
    }
}

impl CacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
