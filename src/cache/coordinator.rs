//! Fetch coordination on top of the cache store.
//!
//! `FetchCoordinator::resolve` decides between a cache hit, stale-while-revalidating and a
//! network fetch, and shares one in-flight fetch among every caller of the same key.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::application::error::FetchError;
use crate::application::repos::LeadSource;
use crate::domain::{QueryParams, ResultPage};

use super::keys::{QueryKey, build_key};
use super::lock::mutex_lock;
use super::store::{CacheStore, EntryStatus, RequestVersion};

const SOURCE: &str = "cache::coordinator";
const METRIC_CACHE_HIT: &str = "leadcast_cache_hit_total";
const METRIC_CACHE_MISS: &str = "leadcast_cache_miss_total";
const METRIC_CACHE_STALE_SERVED: &str = "leadcast_cache_stale_served_total";
const METRIC_FETCH_MS: &str = "leadcast_fetch_ms";

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<ResultPage>, FetchError>>>;

struct InFlight {
    version: RequestVersion,
    fetch: SharedFetch,
}

type InFlightMap = Mutex<HashMap<QueryKey, InFlight>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The page reflects the latest completed fetch.
    Fresh,
    /// The page is stale; a background refetch was started.
    Revalidating,
}

/// Outcome of a `resolve` call.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub key: QueryKey,
    pub page: Arc<ResultPage>,
    pub freshness: Freshness,
}

impl Resolved {
    pub fn is_revalidating(&self) -> bool {
        self.freshness == Freshness::Revalidating
    }
}

/// Resolves query parameters to result pages through the shared `CacheStore`.
///
/// Fetches run as tokio tasks, so a response is recorded in the store even when every
/// caller waiting on it went away.
#[derive(Clone)]
pub struct FetchCoordinator {
    store: Arc<CacheStore>,
    source: Arc<dyn LeadSource>,
    in_flight: Arc<InFlightMap>,
}

impl FetchCoordinator {
    pub fn new(store: Arc<CacheStore>, source: Arc<dyn LeadSource>) -> Self {
        Self {
            store,
            source,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Return the page for `params`, from the cache when possible.
    ///
    /// A fresh entry answers without a network call. A stale entry answers immediately
    /// with its old page and starts a refetch in the background; a pending entry with a
    /// last good page answers with that page and joins the running fetch. Everything
    /// else, and every `force_refresh` call, waits for a fetch.
    pub async fn resolve(
        &self,
        params: QueryParams,
        force_refresh: bool,
    ) -> Result<Resolved, FetchError> {
        let key = build_key(&params);

        if !force_refresh && let Some(entry) = self.store.get(&key) {
            match (entry.status(), entry.data()) {
                (EntryStatus::Fresh, Some(page)) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    debug!(key = %key, "Serving fresh cache entry");
                    return Ok(Resolved {
                        page: Arc::clone(page),
                        key,
                        freshness: Freshness::Fresh,
                    });
                }
                (EntryStatus::Stale, Some(page)) => {
                    return Ok(self.serve_stale(key, params, Arc::clone(page)));
                }
                // A refetch is already running; never block on it while a page exists.
                (EntryStatus::Pending, None) => {
                    if let Some(page) = entry.last_good() {
                        return Ok(self.serve_stale(key, params, Arc::clone(page)));
                    }
                }
                _ => {}
            }
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        let page = self.start(key.clone(), params, false).await?;
        Ok(Resolved {
            key,
            page,
            freshness: Freshness::Fresh,
        })
    }

    /// Fetch `params` under a new version, so a fetch already in flight for the same key
    /// is discarded when it lands.
    pub async fn supersede(&self, params: QueryParams) -> Result<Resolved, FetchError> {
        let key = build_key(&params);
        let page = self.start(key.clone(), params, true).await?;
        Ok(Resolved {
            key,
            page,
            freshness: Freshness::Fresh,
        })
    }

    fn serve_stale(&self, key: QueryKey, params: QueryParams, page: Arc<ResultPage>) -> Resolved {
        counter!(METRIC_CACHE_STALE_SERVED).increment(1);
        debug!(key = %key, "Serving stale cache entry while revalidating");
        // The spawned fetch records its own result; a pending key joins its fetch.
        drop(self.start(key.clone(), params, false));
        Resolved {
            key,
            page,
            freshness: Freshness::Revalidating,
        }
    }

    /// Wait for the fetch in flight for `params` and report the page it produced.
    ///
    /// Without a fetch in flight this is a plain `resolve`.
    pub async fn settle(&self, params: QueryParams) -> Result<Resolved, FetchError> {
        let key = build_key(&params);
        let fetch = mutex_lock(&self.in_flight, SOURCE, "settle")
            .get(&key)
            .map(|in_flight| in_flight.fetch.clone());

        match fetch {
            Some(fetch) => {
                let page = fetch.await?;
                Ok(Resolved {
                    key,
                    page,
                    freshness: Freshness::Fresh,
                })
            }
            None => self.resolve(params, false).await,
        }
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        mutex_lock(&self.in_flight, SOURCE, "in_flight").len()
    }

    fn start(&self, key: QueryKey, params: QueryParams, supersede: bool) -> SharedFetch {
        // Held across the store transition so a joiner always finds the registered fetch.
        let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "start");
        let ticket = if supersede {
            self.store.supersede_fetch(&key)
        } else {
            self.store.begin_fetch(&key)
        };

        if ticket.joined
            && let Some(existing) = in_flight.get(&key)
            && existing.version == ticket.version
        {
            debug!(
                fingerprint = key.fingerprint(),
                version = ticket.version,
                "Joining in-flight fetch"
            );
            return existing.fetch.clone();
        }

        debug!(
            key = %key,
            fingerprint = key.fingerprint(),
            version = ticket.version,
            supersede,
            "Starting fetch"
        );
        let fetch = self.spawn_fetch(key.clone(), params, ticket.version);
        in_flight.insert(
            key,
            InFlight {
                version: ticket.version,
                fetch: fetch.clone(),
            },
        );
        fetch
    }

    fn spawn_fetch(
        &self,
        key: QueryKey,
        params: QueryParams,
        version: RequestVersion,
    ) -> SharedFetch {
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        let in_flight = Arc::clone(&self.in_flight);
        let task_key = key.clone();

        let task = tokio::spawn({
            let store = Arc::clone(&store);
            let in_flight = Arc::clone(&in_flight);
            async move {
                let key = task_key;
                let started = Instant::now();
                let outcome = AssertUnwindSafe(source.list_leads(&params))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(FetchError::network("lead source panicked")));
                histogram!(METRIC_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

                let result = match outcome {
                    Ok(page) => {
                        let page = Arc::new(page);
                        if store.complete_fetch(&key, version, Arc::clone(&page)) {
                            debug!(
                                key = %key,
                                version,
                                total = page.total_count,
                                "Fetch completed"
                            );
                        }
                        Ok(page)
                    }
                    Err(error) => {
                        warn!(key = %key, version, error = %error, "Fetch failed");
                        store.fail_fetch(&key, version, error.clone());
                        Err(error)
                    }
                };
                release(&in_flight, &key, version);
                result
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    // The task never recorded an outcome; settle the entry for it.
                    let error = FetchError::network(format!("fetch task failed: {err}"));
                    warn!(key = %key, version, error = %error, "Fetch task ended abnormally");
                    store.fail_fetch(&key, version, error.clone());
                    release(&in_flight, &key, version);
                    Err(error)
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Drop the in-flight registration of `key` if it still belongs to `version`.
fn release(in_flight: &InFlightMap, key: &QueryKey, version: RequestVersion) {
    let mut in_flight = mutex_lock(in_flight, SOURCE, "release");
    if in_flight
        .get(key)
        .is_some_and(|current| current.version == version)
    {
        in_flight.remove(key);
    }
}
