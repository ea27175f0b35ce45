//! Shared request and response types for the leads REST API and its push channel.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::Date;

time::serde::format_description!(calendar_date, Date, "[year]-[month]-[day]");

/// Path of the paginated list endpoint, relative to the API base URL.
pub const LIST_LEADS_PATH: &str = "leads/leads";
/// Path of the create endpoint, relative to the API base URL.
pub const CREATE_LEAD_PATH: &str = "leads/";

/// Path of the update/delete endpoint for a single lead.
pub fn lead_path(id: &WireId) -> String {
    format!("leads/id/{id}")
}

/// Identifier as sent by the server: either a JSON string or a JSON number.
///
/// Both forms normalize to the same textual representation, so `42` and `"42"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireId(String);

impl WireId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WireId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WireId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for WireId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for WireId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WireId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Unsigned(value) => Self(value.to_string()),
            Raw::Signed(value) => Self(value.to_string()),
        })
    }
}

/// A lead as returned by the list endpoint. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: WireId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub engaged: bool,
    #[serde(default)]
    pub last_contacted: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Body of create and update requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub stage: String,
    #[serde(default)]
    pub engaged: bool,
    #[serde(default, with = "calendar_date::option")]
    pub last_contacted: Option<Date>,
}

/// Response of the list endpoint.
///
/// Older deployments return a bare array without a total.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LeadListResponse {
    Paged {
        items: Vec<LeadRecord>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<LeadRecord>),
}

impl LeadListResponse {
    /// Split into items and the total count. A missing or zero total falls back to the
    /// number of returned items.
    pub fn into_parts(self) -> (Vec<LeadRecord>, u64) {
        match self {
            LeadListResponse::Paged { items, total } => {
                let fallback = items.len() as u64;
                let total = total.filter(|value| *value > 0).unwrap_or(fallback);
                (items, total)
            }
            LeadListResponse::Bare(items) => {
                let total = items.len() as u64;
                (items, total)
            }
        }
    }
}

/// Query string of the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListLeadsQuery {
    pub skip: u64,
    pub limit: u64,
    pub sort_by: String,
    pub sort_order: String,
    pub search: Option<String>,
    /// JSON-encoded filter object.
    pub filters: Option<String>,
}

impl ListLeadsQuery {
    /// Query pairs in the order the server documents them.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("skip", self.skip.to_string()),
            ("limit", self.limit.to_string()),
            ("sort_by", self.sort_by.clone()),
            ("sort_order", self.sort_order.clone()),
        ];
        if let Some(filters) = &self.filters {
            pairs.push(("filters", filters.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        pairs
    }
}

/// Kind of mutation announced on the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadEventKind {
    #[serde(rename = "lead_created")]
    Created,
    #[serde(rename = "lead_updated")]
    Updated,
    #[serde(rename = "lead_deleted")]
    Deleted,
}

/// A push-channel message announcing that some actor mutated the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadEventMessage {
    pub event: LeadEventKind,
    pub source: WireId,
    #[serde(rename = "sourceName", alias = "source_name", default)]
    pub source_name: String,
    #[serde(
        rename = "leadId",
        alias = "lead_id",
        alias = "id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lead_id: Option<WireId>,
}
