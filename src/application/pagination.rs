//! Offset pagination helpers.

use std::fmt;

use crate::domain::{QueryParams, ResultPage};

/// Number of pages needed to show `total` records `limit` at a time.
pub fn page_count(total: u64, limit: u32) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(u64::from(limit))
}

/// Whether a page after the current one exists.
pub fn has_next_page(params: &QueryParams, page: &ResultPage) -> bool {
    params.page() < page_count(page.total_count, params.limit())
}

/// One-based, inclusive record range shown by a page, with the collection total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub first: u64,
    pub last: u64,
    pub total: u64,
}

impl PageWindow {
    pub fn new(params: &QueryParams, page: &ResultPage) -> Self {
        let total = page.total_count;
        if page.is_empty() {
            return Self {
                first: 0,
                last: 0,
                total,
            };
        }

        let first = params.offset() + 1;
        let last = (params.offset() + page.len() as u64).min(total.max(first));
        Self { first, last, total }
    }

    pub fn is_empty(&self) -> bool {
        self.first == 0
    }
}

impl fmt::Display for PageWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Showing {}–{} of {} leads",
            self.first, self.last, self.total
        )
    }
}
