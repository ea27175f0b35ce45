use leadcast_api_types::LeadRecord;

/// One page of a list query as returned by the server.
///
/// `total_count` is authoritative for page arithmetic; `items` may be shorter than the
/// requested limit only on the last page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultPage {
    pub items: Vec<LeadRecord>,
    pub total_count: u64,
}

impl ResultPage {
    pub fn new(items: Vec<LeadRecord>, total_count: u64) -> Self {
        Self { items, total_count }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
