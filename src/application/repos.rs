//! Traits describing the remote leads adapters.

use async_trait::async_trait;
use leadcast_api_types::{LeadInput, LeadRecord, WireId};

use crate::application::error::FetchError;
use crate::domain::{QueryParams, ResultPage};

/// Read side of the remote collection.
#[async_trait]
pub trait LeadSource: Send + Sync {
    /// Fetch the page described by `params` in full.
    async fn list_leads(&self, params: &QueryParams) -> Result<ResultPage, FetchError>;
}

/// Write side of the remote collection.
#[async_trait]
pub trait LeadWriter: Send + Sync {
    async fn create_lead(&self, input: &LeadInput) -> Result<LeadRecord, FetchError>;

    async fn update_lead(&self, id: &WireId, input: &LeadInput)
    -> Result<LeadRecord, FetchError>;

    async fn delete_lead(&self, id: &WireId) -> Result<(), FetchError>;
}
