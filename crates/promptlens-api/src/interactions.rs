// Interaction listing HTTP routes (keyset pagination)
//
// Browsing is cursor-based: the response carries an opaque `meta.nextCursor`
// that resumes the scan exactly where this page ended, which stays correct
// while new records are being inserted concurrently.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use promptlens_core::{pagination, InteractionRecord, PageQuery};
use promptlens_storage::{paginate, InteractionStore};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::ApiError;

/// App state for interaction routes
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InteractionStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn InteractionStore>) -> Self {
        Self { store }
    }
}

/// Create interaction routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/interactions", get(list_interactions))
        .with_state(state)
}

/// Pagination metadata for a page of interactions
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Number of records in `data`
    pub count: usize,
    /// Opaque cursor for the next page; absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// One page of the interaction log
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageResponse {
    pub data: Vec<InteractionRecord>,
    pub meta: PageMeta,
}

/// GET /v1/interactions - Page through the interaction log
///
/// Keyset pagination: pass `meta.nextCursor` back as `?cursor=` to fetch
/// the next page. The cursor is only valid for the exact `sortBy` and
/// `sortDirection` it was minted under.
#[utoipa::path(
    get,
    path = "/v1/interactions",
    params(PageQuery),
    responses(
        (status = 200, description = "Page of interaction records", body = PageResponse),
        (status = 400, description = "Invalid pagination parameters", body = crate::error::ErrorBody),
        (status = 500, description = "Internal server error", body = crate::error::ErrorBody)
    ),
    tag = "interactions"
)]
pub async fn list_interactions(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse>, ApiError> {
    let request = pagination::validate(&query)?;

    let page = paginate(state.store.as_ref(), &request)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch interaction page: {}", e);
            ApiError::database()
        })?;

    Ok(Json(PageResponse {
        meta: PageMeta {
            count: page.data.len(),
            next_cursor: page.next_cursor,
        },
        data: page.data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use promptlens_core::InteractionStatus;
    use promptlens_storage::InMemoryInteractionStore;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn record(model: &str, total_tokens: i64, minutes_ago: i64) -> InteractionRecord {
        InteractionRecord {
            id: Uuid::now_v7(),
            model: model.to_string(),
            provider: Some("anthropic".to_string()),
            prompt_tokens: 10,
            completion_tokens: total_tokens - 10,
            total_tokens,
            response_time_ms: 1200,
            status: InteractionStatus::Completed,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    async fn app_with(records: Vec<InteractionRecord>) -> Router {
        let store = InMemoryInteractionStore::new();
        store.seed(records).await;
        routes(AppState::new(Arc::new(store)))
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_list_defaults_to_created_at_desc() {
        let app = app_with(vec![
            record("old", 10, 30),
            record("new", 20, 1),
            record("mid", 30, 10),
        ])
        .await;

        let (status, body) = get_json(&app, "/v1/interactions").await;
        assert_eq!(status, StatusCode::OK);
        let models: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["model"].as_str().unwrap())
            .collect();
        assert_eq!(models, vec!["new", "mid", "old"]);
        assert_eq!(body["meta"]["count"], 3);
        assert!(body["meta"].get("nextCursor").is_none());
    }

    #[tokio::test]
    async fn test_next_cursor_chains_pages() {
        let app = app_with((1..=5).map(|i| record("m", i, i)).collect()).await;

        let (status, first) =
            get_json(&app, "/v1/interactions?limit=2&sortBy=totalTokens&sortDirection=asc").await;
        assert_eq!(status, StatusCode::OK);
        let tokens: Vec<i64> = first["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["totalTokens"].as_i64().unwrap())
            .collect();
        assert_eq!(tokens, vec![1, 2]);

        let cursor = first["meta"]["nextCursor"].as_str().unwrap();
        let uri = format!(
            "/v1/interactions?limit=2&sortBy=totalTokens&sortDirection=asc&cursor={cursor}"
        );
        let (status, second) = get_json(&app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        let tokens: Vec<i64> = second["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["totalTokens"].as_i64().unwrap())
            .collect();
        assert_eq!(tokens, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_unparseable_limit_is_invalid_limit() {
        let app = app_with(vec![]).await;
        let (status, body) = get_json(&app, "/v1/interactions?limit=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_LIMIT");
    }

    #[tokio::test]
    async fn test_out_of_range_limit_is_clamped_not_rejected() {
        let app = app_with((1..=3).map(|i| record("m", i, i)).collect()).await;
        let (status, body) = get_json(&app, "/v1/interactions?limit=9999").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["count"], 3);
    }

    #[tokio::test]
    async fn test_tampered_cursor_is_validation_error() {
        let app = app_with(vec![record("m", 1, 1)]).await;
        let (status, body) = get_json(&app, "/v1/interactions?cursor=dGFtcGVyZWQ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_cursor_sort_mismatch_is_rejected() {
        let app = app_with((1..=5).map(|i| record("m", i, i)).collect()).await;
        let (_, first) =
            get_json(&app, "/v1/interactions?limit=2&sortBy=totalTokens&sortDirection=asc").await;
        let cursor = first["meta"]["nextCursor"].as_str().unwrap();

        // Same cursor, different direction
        let uri =
            format!("/v1/interactions?limit=2&sortBy=totalTokens&sortDirection=desc&cursor={cursor}");
        let (status, body) = get_json(&app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("cursor does not match request sort"));
    }

    #[tokio::test]
    async fn test_unknown_sort_field_rejected() {
        let app = app_with(vec![]).await;
        let (status, body) = get_json(&app, "/v1/interactions?sortBy=score").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}
