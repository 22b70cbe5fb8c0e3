// Keyset query planner
//
// Turns a validated page request into one fetch_page call: limit + 1 rows
// to detect a further page without a count query, then a continuation
// cursor minted from the last returned row's (field value, id).

use promptlens_core::{cursor, CursorToken, InteractionRecord, PageRequest};

use crate::store::{InteractionStore, StoreError};

/// One page of the interaction log
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub data: Vec<InteractionRecord>,
    pub has_more: bool,
    /// Opaque cursor resuming the scan after the last row of `data`;
    /// present exactly when `has_more`
    pub next_cursor: Option<String>,
}

/// Execute a validated pagination request against a store
pub async fn paginate(
    store: &dyn InteractionStore,
    request: &PageRequest,
) -> Result<Page, StoreError> {
    let after = request
        .cursor
        .as_ref()
        .map(|c| (c.value.clone(), c.id));

    let mut rows = store
        .fetch_page(
            request.sort_by,
            request.sort_direction,
            after,
            request.limit + 1,
        )
        .await?;

    let has_more = rows.len() as i64 > request.limit;
    rows.truncate(request.limit as usize);

    let next_cursor = if has_more {
        rows.last().map(|last| {
            cursor::encode(&CursorToken::from_record(
                last,
                request.sort_by,
                request.sort_direction,
            ))
        })
    } else {
        None
    };

    Ok(Page {
        data: rows,
        has_more,
        next_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryInteractionStore;
    use chrono::{Duration, Utc};
    use promptlens_core::{
        pagination, CursorValue, InteractionStatus, PageQuery, SortDirection, SortField,
    };
    use uuid::Uuid;

    fn record(model: &str, total_tokens: i64, minutes_ago: i64) -> InteractionRecord {
        InteractionRecord {
            id: Uuid::now_v7(),
            model: model.to_string(),
            provider: Some("openai".to_string()),
            prompt_tokens: total_tokens / 2,
            completion_tokens: total_tokens - total_tokens / 2,
            total_tokens,
            response_time_ms: 100 * total_tokens,
            status: InteractionStatus::Completed,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    fn request(
        limit: i64,
        sort_by: SortField,
        sort_direction: SortDirection,
        cursor: Option<String>,
    ) -> PageRequest {
        pagination::validate(&PageQuery {
            limit: Some(limit.to_string()),
            cursor,
            sort_by: Some(sort_by.as_str().to_string()),
            sort_direction: Some(sort_direction.as_str().to_string()),
        })
        .unwrap()
    }

    async fn seeded(rows: Vec<InteractionRecord>) -> InMemoryInteractionStore {
        let store = InMemoryInteractionStore::new();
        store.seed(rows).await;
        store
    }

    #[tokio::test]
    async fn test_created_at_desc_two_pages() {
        // Five rows t1 < t2 < ... < t5; minutes_ago decreasing means row5 newest
        let rows: Vec<_> = (1..=5).map(|i| record("m", i, 10 - i)).collect();
        let store = seeded(rows.clone()).await;

        let first = paginate(
            &store,
            &request(2, SortField::CreatedAt, SortDirection::Desc, None),
        )
        .await
        .unwrap();
        assert!(first.has_more);
        assert_eq!(first.data[0].created_at, rows[4].created_at);
        assert_eq!(first.data[1].created_at, rows[3].created_at);

        // The cursor resumes after (t4, row4.id)
        let token = cursor::decode(first.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(token.value, CursorValue::Timestamp(rows[3].created_at));
        assert_eq!(token.id, rows[3].id);

        let second = paginate(
            &store,
            &request(
                2,
                SortField::CreatedAt,
                SortDirection::Desc,
                first.next_cursor.clone(),
            ),
        )
        .await
        .unwrap();
        assert_eq!(second.data[0].created_at, rows[2].created_at);
        assert_eq!(second.data[1].created_at, rows[1].created_at);
        assert!(second.has_more);
    }

    #[tokio::test]
    async fn test_last_page_has_no_cursor() {
        let store = seeded((1..=3).map(|i| record("m", i, i)).collect()).await;
        let page = paginate(
            &store,
            &request(5, SortField::CreatedAt, SortDirection::Asc, None),
        )
        .await
        .unwrap();
        assert_eq!(page.data.len(), 3);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_exact_boundary_detects_no_further_page() {
        let store = seeded((1..=4).map(|i| record("m", i, i)).collect()).await;
        let first = paginate(
            &store,
            &request(2, SortField::TotalTokens, SortDirection::Asc, None),
        )
        .await
        .unwrap();
        assert!(first.has_more);

        let second = paginate(
            &store,
            &request(
                2,
                SortField::TotalTokens,
                SortDirection::Asc,
                first.next_cursor,
            ),
        )
        .await
        .unwrap();
        assert_eq!(second.data.len(), 2);
        assert!(!second.has_more);
        assert!(second.next_cursor.is_none());
    }

    /// Keyset continuity: concatenating pages equals the one-pass scan,
    /// including when sort values collide and only ids break ties.
    #[tokio::test]
    async fn test_page_concatenation_equals_full_scan() {
        let mut rows = Vec::new();
        for i in 0..23 {
            // Lots of duplicate sort values across models
            rows.push(record(["alpha", "beta", "gamma"][i % 3], (i as i64) % 4, i as i64));
        }
        let store = seeded(rows).await;

        for (field, direction) in [
            (SortField::TotalTokens, SortDirection::Asc),
            (SortField::TotalTokens, SortDirection::Desc),
            (SortField::Model, SortDirection::Asc),
            (SortField::Model, SortDirection::Desc),
            (SortField::CreatedAt, SortDirection::Desc),
            (SortField::ResponseTime, SortDirection::Asc),
        ] {
            let full = paginate(&store, &request(100, field, direction, None))
                .await
                .unwrap();
            assert!(!full.has_more);

            let mut collected = Vec::new();
            let mut next = None;
            loop {
                let page = paginate(&store, &request(4, field, direction, next))
                    .await
                    .unwrap();
                collected.extend(page.data);
                match page.next_cursor {
                    Some(cursor) => next = Some(cursor),
                    None => break,
                }
            }

            assert_eq!(collected, full.data, "{field:?} {direction:?}");
        }
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_page() {
        let store = InMemoryInteractionStore::new();
        let page = paginate(
            &store,
            &request(10, SortField::CreatedAt, SortDirection::Desc, None),
        )
        .await
        .unwrap();
        assert!(page.data.is_empty());
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }
}
