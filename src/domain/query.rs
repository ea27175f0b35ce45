//! Query parameters describing one view of the leads collection.
//!
//! `QueryParams` is an immutable value: every interactive change produces a new
//! instance through the consuming `with_*` methods.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;
use time::macros::format_description;

use super::error::DomainError;

/// Sort field used when no explicit sort is selected.
pub const DEFAULT_SORT_FIELD: &str = "created_at";
/// Page size of a freshly loaded view.
pub const DEFAULT_PAGE_SIZE: NonZeroU32 = NonZeroU32::MIN.saturating_add(9);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(DomainError::InvalidSortOrder {
                value: value.to_string(),
            }),
        }
    }
}

/// Filter name to value, kept in sorted order.
///
/// An empty value means "no filter" and is never stored, so a cleared filter and an
/// absent one are the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, or clear it when `value` is empty.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if value.is_empty() {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Entries in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Filters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Filters::new(), |filters, (name, value)| filters.with(name, value))
    }
}

/// Typed view of the filters the leads collection understands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilters {
    pub stage: Option<String>,
    pub engaged: Option<bool>,
    pub created_at_start: Option<Date>,
    pub created_at_end: Option<Date>,
}

impl LeadFilters {
    pub const STAGE: &'static str = "stage";
    pub const ENGAGED: &'static str = "engaged";
    pub const CREATED_AT_START: &'static str = "createdAtStart";
    pub const CREATED_AT_END: &'static str = "createdAtEnd";

    /// Parse a `YYYY-MM-DD` calendar date.
    pub fn parse_date(value: &str) -> Result<Date, DomainError> {
        Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
            .map_err(|err| DomainError::validation(format!("invalid date `{value}`: {err}")))
    }

    pub fn into_filters(self) -> Result<Filters, DomainError> {
        if let (Some(start), Some(end)) = (self.created_at_start, self.created_at_end)
            && start > end
        {
            return Err(DomainError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let filters = Filters::new()
            .with(Self::STAGE, self.stage.unwrap_or_default())
            .with(
                Self::ENGAGED,
                self.engaged.map(|flag| flag.to_string()).unwrap_or_default(),
            )
            .with(
                Self::CREATED_AT_START,
                self.created_at_start
                    .map(|date| date.to_string())
                    .unwrap_or_default(),
            )
            .with(
                Self::CREATED_AT_END,
                self.created_at_end
                    .map(|date| date.to_string())
                    .unwrap_or_default(),
            );
        Ok(filters)
    }
}

/// Pagination, search, sort and filter state of one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    offset: u64,
    limit: NonZeroU32,
    search_text: String,
    sort_field: String,
    sort_order: SortOrder,
    filters: Filters,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
            search_text: String::new(),
            sort_field: DEFAULT_SORT_FIELD.to_string(),
            sort_order: SortOrder::Desc,
            filters: Filters::new(),
        }
    }
}

impl QueryParams {
    /// Initial view with the given page size.
    pub fn new(limit: u32) -> Result<Self, DomainError> {
        Self::default().with_limit(limit)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u32 {
        self.limit.get()
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn sort_field(&self) -> &str {
        &self.sort_field
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// One-based page number the offset falls on.
    pub fn page(&self) -> u64 {
        self.offset / u64::from(self.limit.get()) + 1
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Jump to a one-based page; page 0 is treated as page 1.
    pub fn with_page(self, page: u64) -> Self {
        let limit = u64::from(self.limit.get());
        let offset = page.saturating_sub(1).saturating_mul(limit);
        self.with_offset(offset)
    }

    /// Change the page size and return to the first page.
    pub fn with_limit(mut self, limit: u32) -> Result<Self, DomainError> {
        self.limit = NonZeroU32::new(limit).ok_or(DomainError::InvalidLimit)?;
        self.offset = 0;
        Ok(self)
    }

    pub fn with_search(mut self, search_text: impl Into<String>) -> Self {
        self.search_text = search_text.into();
        self
    }

    /// Sort by `field`; an empty field restores the default sort (newest first).
    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        let field = field.into();
        if field.is_empty() {
            self.sort_field = DEFAULT_SORT_FIELD.to_string();
            self.sort_order = SortOrder::Desc;
        } else {
            self.sort_field = field;
            self.sort_order = order;
        }
        self
    }

    /// Apply a new filter set and return to the first page.
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self.offset = 0;
        self
    }

    /// Clear filters and restore the default sort. Pagination and search are kept.
    pub fn reset_filters(self) -> Self {
        self.with_filters(Filters::new())
            .with_sort(DEFAULT_SORT_FIELD, SortOrder::Desc)
    }
}
