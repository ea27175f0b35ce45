//! Leadcast query cache.
//!
//! Keeps list query results keyed by their canonical `QueryKey`:
//!
//! - **keys**: canonical key derivation from `QueryParams`
//! - **store**: versioned entries with their fetch lifecycle, bounded by LRU
//! - **coordinator**: cache hits, stale-while-revalidating and coalesced fetches
//!
//! ## Configuration
//!
//! Cache behavior is controlled via the `[cache]` table:
//!
//! ```toml
//! [cache]
//! max_entries = 64
//! refetch = "on_demand" # or "eager"
//! ```

mod config;
mod coordinator;
mod keys;
mod lock;
mod store;

pub use config::{CacheConfig, RefetchPolicy};
pub use coordinator::{FetchCoordinator, Freshness, Resolved};
pub use keys::{LEADS_NAMESPACE, QueryKey, build_key, hash_value};
pub use store::{CacheEntry, CacheStore, EntryStatus, FetchTicket, RequestVersion};

pub(crate) use lock::mutex_lock;
