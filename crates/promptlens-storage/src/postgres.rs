// Postgres-backed interaction store
//
// Runtime sqlx queries with bound parameters. The ORDER BY column and the
// keyset comparison operator come from closed enums; only values are ever
// bound, so no request-supplied text reaches the SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use promptlens_core::{CursorValue, InteractionRecord, SortDirection, SortField};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::store::{InteractionStore, StoreError};

/// Interaction row as stored (status is TEXT in the schema)
#[derive(Debug, Clone, FromRow)]
struct InteractionRow {
    id: Uuid,
    model: String,
    provider: Option<String>,
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
    response_time_ms: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<InteractionRow> for InteractionRecord {
    type Error = StoreError;

    fn try_from(row: InteractionRow) -> Result<Self, StoreError> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::other(format!("row {}: {e}", row.id)))?;
        Ok(InteractionRecord {
            id: row.id,
            model: row.model,
            provider: row.provider,
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            total_tokens: row.total_tokens,
            response_time_ms: row.response_time_ms,
            status,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, model, provider, prompt_tokens, completion_tokens, \
     total_tokens, response_time_ms, status, created_at";

/// Production store over the interactions table
#[derive(Clone)]
pub struct PgInteractionStore {
    pool: PgPool,
}

impl PgInteractionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a store from a database URL
    pub async fn from_url(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn column_name(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "created_at",
        SortField::Model => "model",
        SortField::TotalTokens => "total_tokens",
        SortField::ResponseTime => "response_time_ms",
    }
}

fn order_keyword(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

/// Comparison that selects rows strictly after the keyset position in scan
/// order. The tie-break on id is ascending for both directions, so rows
/// with equal sort values never repeat or vanish across pages.
fn keyset_operator(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => ">",
        SortDirection::Desc => "<",
    }
}

fn first_page_sql(field: SortField, direction: SortDirection) -> String {
    format!(
        "SELECT {SELECT_COLUMNS} FROM interactions \
         ORDER BY {column} {order}, id ASC LIMIT $1",
        column = column_name(field),
        order = order_keyword(direction),
    )
}

fn after_cursor_sql(field: SortField, direction: SortDirection) -> String {
    format!(
        "SELECT {SELECT_COLUMNS} FROM interactions \
         WHERE {column} {op} $1 OR ({column} = $1 AND id > $2) \
         ORDER BY {column} {order}, id ASC LIMIT $3",
        column = column_name(field),
        op = keyset_operator(direction),
        order = order_keyword(direction),
    )
}

#[async_trait]
impl InteractionStore for PgInteractionStore {
    async fn fetch_page(
        &self,
        field: SortField,
        direction: SortDirection,
        after: Option<(CursorValue, Uuid)>,
        limit: i64,
    ) -> Result<Vec<InteractionRecord>, StoreError> {
        let rows = match after {
            None => {
                let sql = first_page_sql(field, direction);
                sqlx::query_as::<_, InteractionRow>(&sql)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            Some((value, id)) => {
                let sql = after_cursor_sql(field, direction);
                let query = sqlx::query_as::<_, InteractionRow>(&sql);
                let query = match value {
                    CursorValue::Text(v) => query.bind(v),
                    CursorValue::Int(v) => query.bind(v),
                    CursorValue::Timestamp(v) => query.bind(v),
                };
                query.bind(id).bind(limit).fetch_all(&self.pool).await?
            }
        };

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
