use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("page size must be greater than zero")]
    InvalidLimit,
    #[error("unknown sort order `{value}` (expected `asc` or `desc`)")]
    InvalidSortOrder { value: String },
    #[error("date range starts at {start} after it ends at {end}")]
    InvalidDateRange { start: String, end: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
