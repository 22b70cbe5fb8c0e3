// Pagination request validation
//
// Raw query parameters come in as strings so that a limit like "abc" can be
// answered with INVALID_LIMIT instead of a framework-level deserialization
// rejection. Validation runs before any store access and produces an
// immutable PageRequest.

use serde::Deserialize;

#[cfg(feature = "openapi")]
use utoipa::IntoParams;

use crate::cursor::{self, CursorToken, SortDirection, SortField};
use crate::error::{Error, Result};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 100;

/// Raw pagination query parameters, exactly as received on the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    /// Page size, 1-100. Defaults to 50. Out-of-range values are clamped.
    pub limit: Option<String>,
    /// Opaque continuation cursor from a previous page's `meta.nextCursor`.
    pub cursor: Option<String>,
    /// Sort field: createdAt | model | totalTokens | responseTime. Defaults to createdAt.
    pub sort_by: Option<String>,
    /// Sort direction: asc | desc. Defaults to desc.
    pub sort_direction: Option<String>,
}

/// A validated, normalized pagination request. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub limit: i64,
    pub sort_by: SortField,
    pub sort_direction: SortDirection,
    pub cursor: Option<CursorToken>,
}

/// Validate and normalize a raw pagination query.
///
/// Rules: unparseable limit is rejected with the invalid-limit code; a
/// numeric limit outside [1,100] is clamped; missing sort falls back to
/// createdAt desc; a cursor minted under a different (field, direction)
/// pair is rejected so a resumed scan can never skip or duplicate rows.
pub fn validate(raw: &PageQuery) -> Result<PageRequest> {
    let limit = match raw.limit.as_deref() {
        None => DEFAULT_LIMIT,
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::invalid_limit(format!("limit must be an integer, got {s:?}")))?
            .clamp(MIN_LIMIT, MAX_LIMIT),
    };

    let sort_by = match raw.sort_by.as_deref() {
        None => SortField::CreatedAt,
        Some(s) => s.parse()?,
    };
    let sort_direction = match raw.sort_direction.as_deref() {
        None => SortDirection::Desc,
        Some(s) => s.parse()?,
    };

    let cursor = match raw.cursor.as_deref() {
        None => None,
        Some(token) => {
            let decoded = cursor::decode(token)?;
            if decoded.field != sort_by || decoded.direction != sort_direction {
                return Err(Error::validation("cursor does not match request sort"));
            }
            if !decoded.field.accepts(&decoded.value) {
                return Err(Error::invalid_cursor(
                    "cursor value does not match its sort field",
                ));
            }
            Some(decoded)
        }
    };

    Ok(PageRequest {
        limit,
        sort_by,
        sort_direction,
        cursor,
    })
}
