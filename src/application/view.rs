//! Owner of the current query of a live session.

use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

use crate::application::error::FetchError;
use crate::cache::{
    EntryStatus, FetchCoordinator, QueryKey, RefetchPolicy, Resolved, build_key, mutex_lock,
};
use crate::domain::{DomainError, QueryParams};

const SOURCE: &str = "application::view";

/// Holds the `QueryParams` a session currently looks at and resolves them on request.
///
/// Every change of the view produces a new `QueryParams` value; the cache is consulted
/// only through explicit `resolve`, `refresh` and `next_update` calls.
pub struct LiveView {
    coordinator: FetchCoordinator,
    params: Mutex<QueryParams>,
    refetch: RefetchPolicy,
    /// Key whose stale page was handed out while its refetch still runs.
    revalidating: Mutex<Option<QueryKey>>,
}

impl LiveView {
    pub fn new(coordinator: FetchCoordinator, params: QueryParams, refetch: RefetchPolicy) -> Self {
        Self {
            coordinator,
            params: Mutex::new(params),
            refetch,
            revalidating: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn refetch_policy(&self) -> RefetchPolicy {
        self.refetch
    }

    pub fn params(&self) -> QueryParams {
        mutex_lock(&self.params, SOURCE, "params").clone()
    }

    /// Replace the current query. Returns whether it changed.
    pub fn set_params(&self, params: QueryParams) -> bool {
        let mut current = mutex_lock(&self.params, SOURCE, "set_params");
        if *current == params {
            return false;
        }
        debug!(key = %build_key(&params), "View query changed");
        *current = params;
        true
    }

    /// Derive the next query from the current one.
    pub fn update<F>(&self, change: F) -> Result<bool, DomainError>
    where
        F: FnOnce(QueryParams) -> Result<QueryParams, DomainError>,
    {
        let next = change(self.params())?;
        Ok(self.set_params(next))
    }

    /// Resolve the current query, serving cached data when possible.
    pub async fn resolve(&self) -> Result<Resolved, FetchError> {
        let result = self.coordinator.resolve(self.params(), false).await;
        self.track(&result);
        result
    }

    /// Refetch the current query under a new version, ignoring older in-flight fetches.
    pub async fn refresh(&self) -> Result<Resolved, FetchError> {
        let result = self.coordinator.supersede(self.params()).await;
        self.track(&result);
        result
    }

    /// Receiver of the store's invalidation generation.
    pub fn invalidations(&self) -> watch::Receiver<u64> {
        self.coordinator.store().subscribe()
    }

    /// Wait for the next change of the current page.
    ///
    /// When the last page handed out was stale, this first waits for its refetch and
    /// returns the refreshed page. Otherwise it waits for the next invalidation: with
    /// `Eager` a stale current key is fetched before returning; with `OnDemand` the stale
    /// page is returned at once and the following call reports its refetch. Returns
    /// `None` once the store is gone.
    pub async fn next_update(
        &self,
        invalidations: &mut watch::Receiver<u64>,
    ) -> Option<Result<Resolved, FetchError>> {
        let params = self.params();
        let key = build_key(&params);
        let revalidating = mutex_lock(&self.revalidating, SOURCE, "next_update").clone();
        if revalidating.as_ref() == Some(&key) {
            debug!(key = %key, "Waiting for revalidation of the current page");
            let result = self.coordinator.settle(params).await;
            self.track(&result);
            return Some(result);
        }

        invalidations.changed().await.ok()?;
        let generation = *invalidations.borrow_and_update();
        let params = self.params();

        let force = match self.refetch {
            RefetchPolicy::Eager => self
                .coordinator
                .store()
                .get(&build_key(&params))
                .is_some_and(|entry| entry.status() == EntryStatus::Stale),
            RefetchPolicy::OnDemand => false,
        };
        debug!(generation, force, "Reacting to cache invalidation");
        let result = self.coordinator.resolve(params, force).await;
        self.track(&result);
        Some(result)
    }

    fn track(&self, result: &Result<Resolved, FetchError>) {
        let next = match result {
            Ok(resolved) if resolved.is_revalidating() => Some(resolved.key.clone()),
            _ => None,
        };
        *mutex_lock(&self.revalidating, SOURCE, "track") = next;
    }
}
