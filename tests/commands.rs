use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use leadcast::application::commands::LeadCommands;
use leadcast::application::error::FetchError;
use leadcast::application::repos::{LeadSource, LeadWriter};
use leadcast::application::view::LiveView;
use leadcast::cache::{CacheConfig, CacheStore, FetchCoordinator, Freshness, RefetchPolicy};
use leadcast::domain::{QueryParams, ResultPage};
use leadcast_api_types::{LeadInput, LeadRecord, WireId};

/// In-memory leads collection serving both reads and writes.
#[derive(Default)]
struct MemoryApi {
    leads: Mutex<Vec<LeadRecord>>,
    next_id: AtomicUsize,
    lists: AtomicUsize,
}

impl MemoryApi {
    fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    fn record(id: &WireId, input: &LeadInput) -> LeadRecord {
        LeadRecord {
            id: id.clone(),
            name: input.name.clone(),
            email: Some(input.email.clone()),
            company: input.company.clone(),
            phone: input.phone.clone(),
            stage: Some(input.stage.clone()),
            engaged: input.engaged,
            last_contacted: None,
            created_at: None,
            updated_at: None,
        }
    }
}

#[async_trait]
impl LeadSource for MemoryApi {
    async fn list_leads(&self, params: &QueryParams) -> Result<ResultPage, FetchError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let leads = self.leads.lock().expect("leads lock");
        let items: Vec<LeadRecord> = leads
            .iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .cloned()
            .collect();
        Ok(ResultPage::new(items, leads.len() as u64))
    }
}

#[async_trait]
impl LeadWriter for MemoryApi {
    async fn create_lead(&self, input: &LeadInput) -> Result<LeadRecord, FetchError> {
        let id = WireId::from(self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1);
        let record = Self::record(&id, input);
        self.leads.lock().expect("leads lock").push(record.clone());
        Ok(record)
    }

    async fn update_lead(&self, id: &WireId, input: &LeadInput) -> Result<LeadRecord, FetchError> {
        let mut leads = self.leads.lock().expect("leads lock");
        let slot = leads
            .iter_mut()
            .find(|lead| &lead.id == id)
            .ok_or_else(|| FetchError::server(404, "Lead not found"))?;
        *slot = Self::record(id, input);
        Ok(slot.clone())
    }

    async fn delete_lead(&self, id: &WireId) -> Result<(), FetchError> {
        let mut leads = self.leads.lock().expect("leads lock");
        let before = leads.len();
        leads.retain(|lead| &lead.id != id);
        if leads.len() == before {
            return Err(FetchError::server(404, "Lead not found"));
        }
        Ok(())
    }
}

fn input(name: &str) -> LeadInput {
    LeadInput {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        company: None,
        phone: None,
        stage: "New".to_string(),
        engaged: false,
        last_contacted: None,
    }
}

fn setup() -> (LeadCommands, Arc<LiveView>, Arc<MemoryApi>) {
    let api = Arc::new(MemoryApi::default());
    let store = Arc::new(CacheStore::new(&CacheConfig::default()));
    let coordinator = FetchCoordinator::new(store, api.clone());
    let view = Arc::new(LiveView::new(
        coordinator,
        QueryParams::default(),
        RefetchPolicy::OnDemand,
    ));
    let commands = LeadCommands::new(api.clone(), Arc::clone(&view));
    (commands, view, api)
}

#[tokio::test]
async fn create_refreshes_the_current_page() {
    let (commands, view, api) = setup();
    let before = view.resolve().await.expect("initial page");
    assert_eq!(before.page.total_count, 0);

    let record = commands.create(&input("Ada")).await.expect("create");
    assert_eq!(record.name, "Ada");
    assert_eq!(api.lists(), 2);

    let after = view.resolve().await.expect("cached page");
    assert_eq!(after.freshness, Freshness::Fresh);
    assert_eq!(after.page.total_count, 1);
    assert_eq!(after.page.items[0].name, "Ada");
    assert_eq!(api.lists(), 2);
}

#[tokio::test]
async fn update_and_delete_refresh_as_well() {
    let (commands, view, api) = setup();
    let created = commands.create(&input("Ada")).await.expect("create");

    commands
        .update(&created.id, &input("Grace"))
        .await
        .expect("update");
    let page = view.resolve().await.expect("after update");
    assert_eq!(page.page.items[0].name, "Grace");

    commands.delete(&created.id).await.expect("delete");
    let page = view.resolve().await.expect("after delete");
    assert_eq!(page.page.total_count, 0);
    assert_eq!(api.lists(), 3);
}

#[tokio::test]
async fn failed_writes_leave_the_cache_alone() {
    let (commands, view, api) = setup();
    view.resolve().await.expect("initial page");

    let err = commands
        .delete(&WireId::new("missing"))
        .await
        .expect_err("delete of missing lead");
    assert_eq!(err, FetchError::server(404, "Lead not found"));

    let page = view.resolve().await.expect("cached page");
    assert_eq!(page.freshness, Freshness::Fresh);
    assert_eq!(api.lists(), 1);
}
