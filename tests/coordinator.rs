use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leadcast::application::error::FetchError;
use leadcast::application::repos::LeadSource;
use leadcast::cache::{CacheConfig, CacheStore, EntryStatus, FetchCoordinator, Freshness, build_key};
use leadcast::domain::{QueryParams, ResultPage};
use tokio::sync::oneshot;

type Reply = Result<ResultPage, FetchError>;

/// Source whose calls wait for replies queued by the test, in call order.
#[derive(Default)]
struct ScriptedSource {
    calls: AtomicUsize,
    replies: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
}

impl ScriptedSource {
    fn reply(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().expect("replies lock").push_back(rx);
        tx
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadSource for ScriptedSource {
    async fn list_leads(&self, _params: &QueryParams) -> Result<ResultPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().expect("replies lock").pop_front();
        match reply {
            Some(reply) => reply
                .await
                .unwrap_or_else(|_| Err(FetchError::network("reply dropped"))),
            None => Ok(page(0)),
        }
    }
}

fn page(total: u64) -> ResultPage {
    ResultPage::new(Vec::new(), total)
}

fn setup() -> (FetchCoordinator, Arc<CacheStore>, Arc<ScriptedSource>) {
    let store = Arc::new(CacheStore::new(&CacheConfig::default()));
    let source = Arc::new(ScriptedSource::default());
    let coordinator = FetchCoordinator::new(Arc::clone(&store), source.clone());
    (coordinator, store, source)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold in time");
}

#[tokio::test]
async fn concurrent_resolves_share_one_fetch() {
    let (coordinator, _store, source) = setup();
    let reply = source.reply();

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.resolve(QueryParams::default(), false).await }
    });
    wait_until(|| source.calls() == 1).await;

    let second = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.resolve(QueryParams::default(), false).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(source.calls(), 1);

    reply.send(Ok(page(42))).expect("fetch waiting");
    let first = first.await.expect("join").expect("first resolve");
    let second = second.await.expect("join").expect("second resolve");

    assert_eq!(source.calls(), 1);
    assert_eq!(first.page.total_count, 42);
    assert!(Arc::ptr_eq(&first.page, &second.page));
    assert_eq!(coordinator.in_flight(), 0);
}

#[tokio::test]
async fn superseded_response_does_not_overwrite_newer_data() {
    let (coordinator, store, source) = setup();
    let old_reply = source.reply();
    let new_reply = source.reply();
    let key = build_key(&QueryParams::default());

    let old = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.resolve(QueryParams::default(), false).await }
    });
    wait_until(|| source.calls() == 1).await;

    let new = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.supersede(QueryParams::default()).await }
    });
    wait_until(|| source.calls() == 2).await;

    new_reply.send(Ok(page(42))).expect("new fetch waiting");
    let new = new.await.expect("join").expect("superseding fetch");
    assert_eq!(new.page.total_count, 42);

    old_reply.send(Ok(page(7))).expect("old fetch waiting");
    old.await.expect("join").expect("old fetch still answers its caller");

    let entry = store.get(&key).expect("entry");
    assert_eq!(entry.status(), EntryStatus::Fresh);
    assert_eq!(entry.data().map(|page| page.total_count), Some(42));
}

#[tokio::test]
async fn stale_entry_is_served_while_revalidating() {
    let (coordinator, store, source) = setup();
    let key = build_key(&QueryParams::default());
    source.reply().send(Ok(page(42))).expect("queue reply");
    coordinator
        .resolve(QueryParams::default(), false)
        .await
        .expect("initial resolve");

    assert_eq!(store.invalidate_all(), 1);
    let refetch = source.reply();
    let resolved = coordinator
        .resolve(QueryParams::default(), false)
        .await
        .expect("stale resolve");

    assert_eq!(resolved.freshness, Freshness::Revalidating);
    assert_eq!(resolved.page.total_count, 42);
    wait_until(|| source.calls() == 2).await;

    refetch.send(Ok(page(43))).expect("refetch waiting");
    wait_until(|| {
        store
            .get(&key)
            .is_some_and(|entry| entry.status() == EntryStatus::Fresh)
    })
    .await;

    let resolved = coordinator
        .resolve(QueryParams::default(), false)
        .await
        .expect("fresh resolve");
    assert_eq!(resolved.freshness, Freshness::Fresh);
    assert_eq!(resolved.page.total_count, 43);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn invalidation_during_fetch_heals_to_fresh() {
    let (coordinator, store, source) = setup();
    let key = build_key(&QueryParams::default());
    let reply = source.reply();

    let pending = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.resolve(QueryParams::default(), false).await }
    });
    wait_until(|| source.calls() == 1).await;

    assert_eq!(store.invalidate_all(), 0);
    reply.send(Ok(page(5))).expect("fetch waiting");
    pending.await.expect("join").expect("resolve");

    assert_eq!(store.get(&key).expect("entry").status(), EntryStatus::Fresh);
}

#[tokio::test]
async fn failures_are_stored_and_not_retried() {
    let (coordinator, store, source) = setup();
    let key = build_key(&QueryParams::default());
    source
        .reply()
        .send(Err(FetchError::server(503, "maintenance")))
        .expect("queue reply");

    let err = coordinator
        .resolve(QueryParams::default(), false)
        .await
        .expect_err("fetch fails");
    assert_eq!(err, FetchError::server(503, "maintenance"));
    assert_eq!(source.calls(), 1);

    let entry = store.get(&key).expect("entry");
    assert_eq!(entry.status(), EntryStatus::Error);
    assert!(entry.data().is_none());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(source.calls(), 1);

    // An explicit resolve tries again.
    coordinator
        .resolve(QueryParams::default(), false)
        .await
        .expect("second attempt");
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn different_pages_are_cached_separately() {
    let (coordinator, store, source) = setup();
    let first = QueryParams::default();
    let second = QueryParams::default().with_page(2);

    coordinator.resolve(first.clone(), false).await.expect("page 1");
    coordinator.resolve(second.clone(), false).await.expect("page 2");
    coordinator.resolve(first, false).await.expect("page 1 again");

    assert_eq!(source.calls(), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn abandoned_resolve_still_records_result() {
    let (coordinator, store, source) = setup();
    let key = build_key(&QueryParams::default());
    let reply = source.reply();

    let abandoned = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.resolve(QueryParams::default(), false).await }
    });
    wait_until(|| source.calls() == 1).await;
    abandoned.abort();

    reply.send(Ok(page(9))).expect("fetch waiting");
    wait_until(|| {
        store
            .get(&key)
            .is_some_and(|entry| entry.status() == EntryStatus::Fresh)
    })
    .await;
}

#[tokio::test]
async fn pending_refetch_serves_last_good_page() {
    let (coordinator, _store, source) = setup();
    source.reply().send(Ok(page(42))).expect("queue reply");
    coordinator
        .resolve(QueryParams::default(), false)
        .await
        .expect("initial resolve");

    coordinator.store().invalidate_all();
    let refetch = source.reply();
    let first = coordinator
        .resolve(QueryParams::default(), false)
        .await
        .expect("stale resolve");
    assert_eq!(first.freshness, Freshness::Revalidating);
    wait_until(|| source.calls() == 2).await;

    let second = tokio::time::timeout(
        Duration::from_millis(500),
        coordinator.resolve(QueryParams::default(), false),
    )
    .await
    .expect("resolve must not wait for the running refetch")
    .expect("pending resolve");
    assert_eq!(second.freshness, Freshness::Revalidating);
    assert_eq!(second.page.total_count, 42);
    assert_eq!(source.calls(), 2);

    refetch.send(Ok(page(43))).expect("refetch waiting");
    let settled = coordinator
        .settle(QueryParams::default())
        .await
        .expect("settled page");
    assert_eq!(settled.freshness, Freshness::Fresh);
    assert_eq!(settled.page.total_count, 43);
    assert_eq!(source.calls(), 2);
}
