//! Query cache storage.
//!
//! Holds one `CacheEntry` per `QueryKey` with its fetch lifecycle. The store is the only
//! shared mutable state of a session: every operation runs under a single lock and
//! never suspends while holding it.

use std::sync::{Arc, Mutex};

use lru::LruCache;
use metrics::counter;
use tokio::sync::watch;
use tracing::debug;

use crate::application::error::FetchError;
use crate::domain::ResultPage;

use super::config::CacheConfig;
use super::keys::QueryKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";
const METRIC_CACHE_EVICT: &str = "leadcast_cache_evict_total";
const METRIC_CACHE_DISCARDED: &str = "leadcast_cache_discarded_total";
const METRIC_CACHE_INVALIDATED: &str = "leadcast_cache_invalidated_total";

/// Tags the fetch attempt that produced an entry's state.
///
/// Issued from one store-wide counter, so versions keep increasing for a key even after
/// it was evicted and cached again.
pub type RequestVersion = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Pending,
    Fresh,
    Stale,
    Error,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Fresh => "fresh",
            EntryStatus::Stale => "stale",
            EntryStatus::Error => "error",
        }
    }
}

/// Last known state of one query key.
///
/// `data` is present iff the status is `Fresh` or `Stale`. While a refetch is pending or
/// after it failed, the last good page is kept in `previous` instead.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: QueryKey,
    status: EntryStatus,
    data: Option<Arc<ResultPage>>,
    error: Option<FetchError>,
    request_version: RequestVersion,
    previous: Option<Arc<ResultPage>>,
}

impl CacheEntry {
    fn pending(key: QueryKey, version: RequestVersion) -> Self {
        Self {
            key,
            status: EntryStatus::Pending,
            data: None,
            error: None,
            request_version: version,
            previous: None,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn data(&self) -> Option<&Arc<ResultPage>> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn request_version(&self) -> RequestVersion {
        self.request_version
    }

    /// Current data, or the last good page while a refetch is pending or failed.
    pub fn last_good(&self) -> Option<&Arc<ResultPage>> {
        self.data.as_ref().or(self.previous.as_ref())
    }

    fn start_pending(&mut self, version: RequestVersion) {
        if let Some(data) = self.data.take() {
            self.previous = Some(data);
        }
        self.status = EntryStatus::Pending;
        self.error = None;
        self.request_version = version;
    }

    /// Apply invalidation; returns whether the entry changed.
    fn mark_stale(&mut self) -> bool {
        match self.status {
            EntryStatus::Fresh => {
                self.status = EntryStatus::Stale;
                true
            }
            EntryStatus::Error => match self.previous.take() {
                Some(previous) => {
                    self.data = Some(previous);
                    self.error = None;
                    self.status = EntryStatus::Stale;
                    true
                }
                // Nothing to serve stale; the entry is already not fresh.
                None => false,
            },
            EntryStatus::Pending | EntryStatus::Stale => false,
        }
    }
}

/// Result of starting a fetch for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub version: RequestVersion,
    /// True when the key was already pending and the caller joined that fetch.
    pub joined: bool,
}

struct Entries {
    lru: LruCache<QueryKey, CacheEntry>,
    last_version: RequestVersion,
}

impl Entries {
    fn issue_version(&mut self) -> RequestVersion {
        self.last_version += 1;
        self.last_version
    }

    fn start_pending(&mut self, key: &QueryKey) -> RequestVersion {
        let version = self.issue_version();
        if let Some(entry) = self.lru.get_mut(key) {
            entry.start_pending(version);
            return version;
        }

        if let Some((evicted, _)) = self
            .lru
            .push(key.clone(), CacheEntry::pending(key.clone(), version))
        {
            debug!(evicted = %evicted, "Evicted least recently used cache entry");
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
        version
    }
}

/// Bounded, versioned store of list query results.
pub struct CacheStore {
    entries: Mutex<Entries>,
    generation: watch::Sender<u64>,
}

impl CacheStore {
    /// Create a new store with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(config.max_entries_non_zero()),
                last_version: 0,
            }),
            generation,
        }
    }

    /// Snapshot of the entry for `key`. Counts as a use for LRU ordering.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        mutex_lock(&self.entries, SOURCE, "get")
            .lru
            .get(key)
            .cloned()
    }

    /// Move `key` to pending and issue a new version, unless a fetch is already in flight,
    /// in which case its version is returned with `joined` set.
    pub fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
        let mut entries = mutex_lock(&self.entries, SOURCE, "begin_fetch");
        if let Some(entry) = entries.lru.get(key)
            && entry.status == EntryStatus::Pending
        {
            return FetchTicket {
                version: entry.request_version,
                joined: true,
            };
        }

        FetchTicket {
            version: entries.start_pending(key),
            joined: false,
        }
    }

    /// Issue a new version for `key` even if a fetch is in flight. The older fetch's
    /// response is then discarded when it lands.
    pub fn supersede_fetch(&self, key: &QueryKey) -> FetchTicket {
        let mut entries = mutex_lock(&self.entries, SOURCE, "supersede_fetch");
        FetchTicket {
            version: entries.start_pending(key),
            joined: false,
        }
    }

    /// Record a successful fetch. Returns false, leaving the entry untouched, when
    /// `version` is no longer the entry's current pending version.
    pub fn complete_fetch(
        &self,
        key: &QueryKey,
        version: RequestVersion,
        page: Arc<ResultPage>,
    ) -> bool {
        let mut entries = mutex_lock(&self.entries, SOURCE, "complete_fetch");
        match entries.lru.peek_mut(key) {
            Some(entry)
                if entry.request_version == version && entry.status == EntryStatus::Pending =>
            {
                entry.status = EntryStatus::Fresh;
                entry.data = Some(page);
                entry.previous = None;
                entry.error = None;
                true
            }
            current => {
                discard(key, version, current.map(|entry| entry.request_version));
                false
            }
        }
    }

    /// Record a failed fetch. Same version rule as `complete_fetch`.
    pub fn fail_fetch(&self, key: &QueryKey, version: RequestVersion, error: FetchError) -> bool {
        let mut entries = mutex_lock(&self.entries, SOURCE, "fail_fetch");
        match entries.lru.peek_mut(key) {
            Some(entry)
                if entry.request_version == version && entry.status == EntryStatus::Pending =>
            {
                entry.status = EntryStatus::Error;
                entry.data = None;
                entry.error = Some(error);
                true
            }
            current => {
                discard(key, version, current.map(|entry| entry.request_version));
                false
            }
        }
    }

    /// Mark `key` stale. Pending and unknown keys are left alone.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let changed = mutex_lock(&self.entries, SOURCE, "invalidate")
            .lru
            .peek_mut(key)
            .is_some_and(CacheEntry::mark_stale);
        if changed {
            self.after_invalidation(1);
        }
        changed
    }

    /// Apply `invalidate` to every known key. Returns how many entries changed.
    pub fn invalidate_all(&self) -> usize {
        let changed = mutex_lock(&self.entries, SOURCE, "invalidate_all")
            .lru
            .iter_mut()
            .map(|(_, entry)| entry.mark_stale())
            .filter(|changed| *changed)
            .count();
        if changed > 0 {
            self.after_invalidation(changed);
        }
        changed
    }

    /// Number of invalidation rounds that changed at least one entry.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Receiver notified after every invalidation round that changed an entry.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Versions keep increasing afterwards.
    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").lru.clear();
    }

    fn after_invalidation(&self, changed: usize) {
        counter!(METRIC_CACHE_INVALIDATED).increment(changed as u64);
        self.generation.send_modify(|generation| *generation += 1);
    }
}

fn discard(key: &QueryKey, version: RequestVersion, current: Option<RequestVersion>) {
    debug!(
        key = %key,
        version,
        current_version = ?current,
        "Discarding superseded fetch result"
    );
    counter!(METRIC_CACHE_DISCARDED).increment(1);
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::cache::keys::build_key;
    use crate::domain::QueryParams;

    fn key(offset: u64) -> QueryKey {
        build_key(&QueryParams::default().with_offset(offset))
    }

    fn page(total: u64) -> Arc<ResultPage> {
        Arc::new(ResultPage::new(Vec::new(), total))
    }

    fn store() -> CacheStore {
        CacheStore::new(&CacheConfig::default())
    }

    fn fresh_store(total: u64) -> (CacheStore, QueryKey) {
        let store = store();
        let key = key(0);
        let ticket = store.begin_fetch(&key);
        assert!(store.complete_fetch(&key, ticket.version, page(total)));
        (store, key)
    }

    #[test]
    fn begin_fetch_creates_pending_entry() {
        let store = store();
        let key = key(0);
        let ticket = store.begin_fetch(&key);
        assert!(!ticket.joined);

        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.status(), EntryStatus::Pending);
        assert_eq!(entry.request_version(), ticket.version);
        assert!(entry.data().is_none());
    }

    #[test]
    fn concurrent_begin_fetch_joins_in_flight_version() {
        let store = store();
        let key = key(0);
        let first = store.begin_fetch(&key);
        let second = store.begin_fetch(&key);
        assert_eq!(first.version, second.version);
        assert!(second.joined);
    }

    #[test]
    fn complete_fetch_marks_fresh() {
        let (store, key) = fresh_store(42);
        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.status(), EntryStatus::Fresh);
        assert_eq!(entry.data().map(|p| p.total_count), Some(42));
    }

    #[test]
    fn superseded_completion_is_ignored() {
        let store = store();
        let key = key(0);
        let old = store.begin_fetch(&key);
        let new = store.supersede_fetch(&key);
        assert!(new.version > old.version);

        assert!(store.complete_fetch(&key, new.version, page(7)));
        assert!(!store.complete_fetch(&key, old.version, page(99)));

        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.data().map(|p| p.total_count), Some(7));
        assert_eq!(entry.request_version(), new.version);
    }

    #[test]
    fn superseded_failure_is_ignored() {
        let store = store();
        let key = key(0);
        let old = store.begin_fetch(&key);
        let new = store.supersede_fetch(&key);
        assert!(!store.fail_fetch(&key, old.version, FetchError::network("reset")));
        assert_eq!(store.get(&key).expect("entry").status(), EntryStatus::Pending);
        assert!(store.complete_fetch(&key, new.version, page(1)));
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let (store, key) = fresh_store(3);
        let version = store.get(&key).expect("entry").request_version();
        assert!(!store.complete_fetch(&key, version, page(4)));
        assert_eq!(
            store.get(&key).expect("entry").data().map(|p| p.total_count),
            Some(3)
        );
    }

    #[test]
    fn completion_for_unknown_key_is_noop() {
        let store = store();
        assert!(!store.complete_fetch(&key(0), 1, page(1)));
        assert!(store.is_empty());
    }

    #[test]
    fn fail_fetch_stores_error_without_data() {
        let store = store();
        let key = key(0);
        let ticket = store.begin_fetch(&key);
        assert!(store.fail_fetch(&key, ticket.version, FetchError::server(500, "boom")));

        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.status(), EntryStatus::Error);
        assert!(entry.data().is_none());
        assert!(matches!(entry.error(), Some(FetchError::Server { status: 500, .. })));
    }

    #[test]
    fn invalidate_fresh_keeps_data() {
        let (store, key) = fresh_store(42);
        assert!(store.invalidate(&key));

        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.status(), EntryStatus::Stale);
        assert_eq!(entry.data().map(|p| p.total_count), Some(42));
    }

    #[test]
    fn invalidate_is_idempotent() {
        let (store, key) = fresh_store(1);
        assert!(store.invalidate(&key));
        assert!(!store.invalidate(&key));
        assert!(!store.invalidate(&build_key(
            &QueryParams::default().with_search("nobody")
        )));
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn invalidate_leaves_pending_untouched() {
        let store = store();
        let key = key(0);
        let ticket = store.begin_fetch(&key);
        assert!(!store.invalidate(&key));
        assert_eq!(store.get(&key).expect("entry").status(), EntryStatus::Pending);

        // The in-flight fetch heals the entry.
        assert!(store.complete_fetch(&key, ticket.version, page(5)));
        assert_eq!(store.get(&key).expect("entry").status(), EntryStatus::Fresh);
    }

    #[test]
    fn refetch_keeps_previous_page_while_pending() {
        let (store, key) = fresh_store(42);
        store.invalidate(&key);
        let ticket = store.begin_fetch(&key);
        assert!(!ticket.joined);

        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.status(), EntryStatus::Pending);
        assert!(entry.data().is_none());
        assert_eq!(entry.last_good().map(|p| p.total_count), Some(42));
    }

    #[test]
    fn failed_refetch_becomes_stale_again_on_invalidation() {
        let (store, key) = fresh_store(42);
        let ticket = store.begin_fetch(&key);
        store.fail_fetch(&key, ticket.version, FetchError::network("offline"));

        assert!(store.invalidate(&key));
        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.status(), EntryStatus::Stale);
        assert_eq!(entry.data().map(|p| p.total_count), Some(42));
        assert!(entry.error().is_none());
    }

    #[test]
    fn error_without_previous_page_stays_error() {
        let store = store();
        let key = key(0);
        let ticket = store.begin_fetch(&key);
        store.fail_fetch(&key, ticket.version, FetchError::network("offline"));

        assert!(!store.invalidate(&key));
        assert_eq!(store.get(&key).expect("entry").status(), EntryStatus::Error);
    }

    #[test]
    fn invalidate_all_counts_changed_entries() {
        let store = store();
        for offset in [0, 10, 20] {
            let key = key(offset);
            let ticket = store.begin_fetch(&key);
            store.complete_fetch(&key, ticket.version, page(30));
        }
        store.begin_fetch(&key(30));

        let mut generations = store.subscribe();
        assert_eq!(store.invalidate_all(), 3);
        assert!(generations.has_changed().expect("sender alive"));
        assert_eq!(*generations.borrow_and_update(), 1);

        assert_eq!(store.invalidate_all(), 0);
        assert!(!generations.has_changed().expect("sender alive"));
    }

    #[test]
    fn lru_bounds_entries() {
        let store = CacheStore::new(&CacheConfig {
            max_entries: 2,
            ..Default::default()
        });
        let (a, b, c) = (key(0), key(10), key(20));
        store.begin_fetch(&a);
        store.begin_fetch(&b);
        // Touch `a` so `b` becomes least recently used.
        store.get(&a);
        store.begin_fetch(&c);

        assert_eq!(store.len(), 2);
        assert!(store.get(&a).is_some());
        assert!(store.get(&b).is_none());
        assert!(store.get(&c).is_some());
    }

    #[test]
    fn versions_keep_increasing_after_eviction() {
        let store = CacheStore::new(&CacheConfig {
            max_entries: 1,
            ..Default::default()
        });
        let (a, b) = (key(0), key(10));
        let first = store.begin_fetch(&a);
        store.begin_fetch(&b);
        let again = store.begin_fetch(&a);
        assert!(again.version > first.version);
        assert!(!store.complete_fetch(&a, first.version, page(1)));
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = store();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .lock()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        let ticket = store.begin_fetch(&key(0));
        assert!(store.complete_fetch(&key(0), ticket.version, page(2)));
    }
}
