//! HTTP client for the leads REST API.

use async_trait::async_trait;
use leadcast_api_types::{
    CREATE_LEAD_PATH, LIST_LEADS_PATH, LeadInput, LeadListResponse, LeadRecord, ListLeadsQuery,
    WireId, lead_path,
};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::application::error::FetchError;
use crate::application::repos::{LeadSource, LeadWriter};
use crate::config::ApiSettings;
use crate::domain::{QueryParams, ResultPage};

use super::error::InfraError;

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Typed client of the leads API, implementing both `LeadSource` and `LeadWriter`.
#[derive(Clone)]
pub struct LeadsApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl LeadsApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self::with_client(
            http,
            settings.base_url.clone(),
            settings.token.clone(),
        ))
    }

    pub fn with_client(http: reqwest::Client, mut base_url: Url, token: Option<String>) -> Self {
        if !base_url.path().ends_with('/') {
            let mut path = base_url.path().trim_end_matches('/').to_string();
            path.push('/');
            base_url.set_path(&path);
        }

        Self {
            http,
            base_url,
            token,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|err| FetchError::network(format!("invalid endpoint `{path}`: {err}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, FetchError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| FetchError::network(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(FetchError::server(
            status.as_u16(),
            error_message(&body, status.canonical_reason()),
        ))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| FetchError::decode(err.to_string()))
    }
}

/// Query string of the list endpoint for `params`.
pub fn list_query(params: &QueryParams) -> ListLeadsQuery {
    let filters = (!params.filters().is_empty()).then(|| {
        let object: Map<String, Value> = params
            .filters()
            .iter()
            .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
            .collect();
        Value::Object(object).to_string()
    });
    let search = (!params.search_text().is_empty()).then(|| params.search_text().to_string());

    ListLeadsQuery {
        skip: params.offset(),
        limit: u64::from(params.limit()),
        sort_by: params.sort_field().to_string(),
        sort_order: params.sort_order().as_str().to_string(),
        search,
        filters,
    }
}

/// Prefer the server's `detail` field, then the trimmed body, then the status reason.
fn error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body)
        && let Some(detail) = object.get("detail")
    {
        return match detail {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return reason.unwrap_or("request failed").to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[async_trait]
impl LeadSource for LeadsApiClient {
    async fn list_leads(&self, params: &QueryParams) -> Result<ResultPage, FetchError> {
        let mut url = self.endpoint(LIST_LEADS_PATH)?;
        {
            let query = list_query(params);
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query.pairs() {
                pairs.append_pair(name, &value);
            }
        }

        debug!(url = %url, "Fetching leads page");
        let response: LeadListResponse = self.send_json(self.http.get(url)).await?;
        let (items, total) = response.into_parts();
        Ok(ResultPage::new(items, total))
    }
}

#[async_trait]
impl LeadWriter for LeadsApiClient {
    async fn create_lead(&self, input: &LeadInput) -> Result<LeadRecord, FetchError> {
        let url = self.endpoint(CREATE_LEAD_PATH)?;
        self.send_json(self.http.post(url).json(input)).await
    }

    async fn update_lead(
        &self,
        id: &WireId,
        input: &LeadInput,
    ) -> Result<LeadRecord, FetchError> {
        let url = self.endpoint(&lead_path(id))?;
        self.send_json(self.http.put(url).json(input)).await
    }

    async fn delete_lead(&self, id: &WireId) -> Result<(), FetchError> {
        let url = self.endpoint(&lead_path(id))?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}
