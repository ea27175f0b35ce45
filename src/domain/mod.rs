//! Domain layer types and invariants.

pub mod error;
pub mod events;
pub mod page;
pub mod query;

pub use error::DomainError;
pub use events::{ActorId, EventType, MutationEvent};
pub use page::ResultPage;
pub use query::{DEFAULT_SORT_FIELD, Filters, LeadFilters, QueryParams, SortOrder};
