// The fetch_page contract
//
// This trait is the only dependency the pagination engine has on the
// persistent store. Implementations return rows already ordered by
// (field, direction) with id ascending as tie-break, starting strictly
// after the given keyset position.

use async_trait::async_trait;
use promptlens_core::{CursorValue, InteractionRecord, SortDirection, SortField};
use thiserror::Error;
use uuid::Uuid;

/// Errors crossing the store boundary
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn other(msg: impl Into<String>) -> Self {
        StoreError::Other(msg.into())
    }
}

/// Ordered range reads over the interaction log.
///
/// Implementations can be backed by Postgres for production or memory
/// for tests; callers cannot tell the difference.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Fetch up to `limit` rows in scan order - primary on
    /// `(field, direction)`, tie-break on `id` ascending - starting
    /// strictly after `after` when present, from the extreme end
    /// otherwise.
    async fn fetch_page(
        &self,
        field: SortField,
        direction: SortDirection,
        after: Option<(CursorValue, Uuid)>,
        limit: i64,
    ) -> Result<Vec<InteractionRecord>, StoreError>;
}
