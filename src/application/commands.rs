//! Local mutations of the leads collection.

use std::sync::Arc;

use leadcast_api_types::{LeadInput, LeadRecord, WireId};
use tracing::{info, warn};

use crate::application::error::FetchError;
use crate::application::repos::LeadWriter;
use crate::application::view::LiveView;

/// Writes through a `LeadWriter` and refreshes the view afterwards.
///
/// The push channel also reports these writes, but only as a hint that may arrive late
/// or never; the refresh here does not wait for it.
pub struct LeadCommands {
    writer: Arc<dyn LeadWriter>,
    view: Arc<LiveView>,
}

impl LeadCommands {
    pub fn new(writer: Arc<dyn LeadWriter>, view: Arc<LiveView>) -> Self {
        Self { writer, view }
    }

    pub async fn create(&self, input: &LeadInput) -> Result<LeadRecord, FetchError> {
        let record = self.writer.create_lead(input).await?;
        info!(lead = %record.id, "Lead created");
        self.after_write("create").await;
        Ok(record)
    }

    pub async fn update(&self, id: &WireId, input: &LeadInput) -> Result<LeadRecord, FetchError> {
        let record = self.writer.update_lead(id, input).await?;
        info!(lead = %id, "Lead updated");
        self.after_write("update").await;
        Ok(record)
    }

    pub async fn delete(&self, id: &WireId) -> Result<(), FetchError> {
        self.writer.delete_lead(id).await?;
        info!(lead = %id, "Lead deleted");
        self.after_write("delete").await;
        Ok(())
    }

    /// Mark every cached page stale and refetch the current one under a new version.
    async fn after_write(&self, command: &'static str) {
        self.view.coordinator().store().invalidate_all();
        if let Err(error) = self.view.refresh().await {
            warn!(command, error = %error, "Refresh after write failed");
        }
    }
}
