// In-memory interaction store
//
// Keeps all records in memory, making it the backend for unit tests,
// router tests, and quick prototyping. Implements the same scan-order
// semantics as the Postgres store: primary on (field, direction), id
// ascending as tie-break.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use promptlens_core::{CursorValue, InteractionRecord, SortDirection, SortField};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{InteractionStore, StoreError};

/// Total order of records for a given sort: field first (reversed when
/// descending), id ascending always.
pub fn scan_order(
    field: SortField,
    direction: SortDirection,
    a: &InteractionRecord,
    b: &InteractionRecord,
) -> Ordering {
    let primary = field.value_of(a).cmp(&field.value_of(b));
    let primary = match direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary.then(a.id.cmp(&b.id))
}

/// Whether a record comes strictly after the keyset position `(value, id)`
/// in scan order.
fn after_position(
    field: SortField,
    direction: SortDirection,
    record: &InteractionRecord,
    value: &CursorValue,
    id: Uuid,
) -> bool {
    let primary = field.value_of(record).cmp(value);
    let primary = match direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    match primary {
        Ordering::Greater => true,
        Ordering::Equal => record.id > id,
        Ordering::Less => false,
    }
}

/// In-memory store, cheap to clone and share
#[derive(Debug, Default, Clone)]
pub struct InMemoryInteractionStore {
    records: Arc<RwLock<Vec<InteractionRecord>>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record
    pub async fn insert(&self, record: InteractionRecord) {
        self.records.write().await.push(record);
    }

    /// Pre-populate with records (useful for testing)
    pub async fn seed(&self, records: Vec<InteractionRecord>) {
        *self.records.write().await = records;
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Clear all records
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn fetch_page(
        &self,
        field: SortField,
        direction: SortDirection,
        after: Option<(CursorValue, Uuid)>,
        limit: i64,
    ) -> Result<Vec<InteractionRecord>, StoreError> {
        let records = self.records.read().await;
        let mut page: Vec<InteractionRecord> = match &after {
            None => records.iter().cloned().collect(),
            Some((value, id)) => records
                .iter()
                .filter(|r| after_position(field, direction, r, value, *id))
                .cloned()
                .collect(),
        };
        page.sort_by(|a, b| scan_order(field, direction, a, b));
        page.truncate(limit.max(0) as usize);
        Ok(page)
    }
}
