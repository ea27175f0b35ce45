//! Cache key derivation.
//!
//! `build_key` turns `QueryParams` into the canonical `QueryKey` used as the only lookup
//! identity of the cache.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use url::form_urlencoded;

use crate::domain::QueryParams;

/// Query family every list key belongs to.
pub const LEADS_NAMESPACE: &str = "leads";

const FILTER_PREFIX: &str = "filter.";

/// Canonical identity of one pagination/search/sort/filter combination.
///
/// The textual form is a percent-encoded, fixed-order serialization, so two keys are
/// equal exactly when the parameters they came from mean the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short hash of the key, for log fields.
    pub fn fingerprint(&self) -> u64 {
        hash_value(&self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for `params`.
///
/// Filters are read in sorted name order and empty filters never reach the key, so
/// insertion order and cleared-vs-absent filters do not affect equality.
pub fn build_key(params: &QueryParams) -> QueryKey {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer
        .append_pair("offset", &params.offset().to_string())
        .append_pair("limit", &params.limit().to_string())
        .append_pair("search", params.search_text())
        .append_pair("sort", params.sort_field())
        .append_pair("order", params.sort_order().as_str());

    for (name, value) in params.filters().iter() {
        serializer.append_pair(&format!("{FILTER_PREFIX}{name}"), value);
    }

    QueryKey(format!("{LEADS_NAMESPACE}?{}", serializer.finish()))
}

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
