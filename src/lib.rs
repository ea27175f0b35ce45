//! Live, query-keyed cache for a paginated, filtered and sorted view of remote leads.
//!
//! [`cache::FetchCoordinator`] resolves [`domain::QueryParams`] through a shared
//! [`cache::CacheStore`], and [`infra::live::LiveChannel`] invalidates that store whenever
//! the push channel announces a mutation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
