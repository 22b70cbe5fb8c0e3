// Cursor tokens for keyset pagination
//
// A cursor captures where a sorted scan stopped: the last row's sort-key
// value plus its id as tie-break, stamped with the (field, direction) pair
// it was minted under. Tokens are URL-safe base64 over JSON and opaque to
// clients; the tagged value representation makes decode(encode(t)) == t
// hold exactly (an untagged encoding cannot tell text from a timestamp).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::record::InteractionRecord;

/// Fields the interaction log can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    CreatedAt,
    Model,
    TotalTokens,
    ResponseTime,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::Model => "model",
            SortField::TotalTokens => "totalTokens",
            SortField::ResponseTime => "responseTime",
        }
    }

    /// Extract this field's sort-key value from a record
    pub fn value_of(&self, record: &InteractionRecord) -> CursorValue {
        match self {
            SortField::CreatedAt => CursorValue::Timestamp(record.created_at),
            SortField::Model => CursorValue::Text(record.model.clone()),
            SortField::TotalTokens => CursorValue::Int(record.total_tokens),
            SortField::ResponseTime => CursorValue::Int(record.response_time_ms),
        }
    }

    /// Whether a cursor value has the kind this field sorts on. A token
    /// can be well-formed JSON and still pair a text value with a numeric
    /// field; that must fail validation, not reach the store.
    pub fn accepts(&self, value: &CursorValue) -> bool {
        matches!(
            (self, value),
            (SortField::CreatedAt, CursorValue::Timestamp(_))
                | (SortField::Model, CursorValue::Text(_))
                | (SortField::TotalTokens, CursorValue::Int(_))
                | (SortField::ResponseTime, CursorValue::Int(_))
        )
    }
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "createdAt" => Ok(SortField::CreatedAt),
            "model" => Ok(SortField::Model),
            "totalTokens" => Ok(SortField::TotalTokens),
            "responseTime" => Ok(SortField::ResponseTime),
            other => Err(Error::validation(format!("unknown sort field: {other:?}"))),
        }
    }
}

/// Scan direction for a sorted listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(Error::validation(format!(
                "unknown sort direction: {other:?}"
            ))),
        }
    }
}

/// A sort-key value lifted out of a record.
///
/// Tagged so the JSON form is unambiguous: `{"type":"timestamp","v":"..."}`
/// never collides with a text value that happens to look like a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "v", rename_all = "snake_case")]
pub enum CursorValue {
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl Ord for CursorValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CursorValue::Text(a), CursorValue::Text(b)) => a.cmp(b),
            (CursorValue::Int(a), CursorValue::Int(b)) => a.cmp(b),
            (CursorValue::Timestamp(a), CursorValue::Timestamp(b)) => a.cmp(b),
            // Mixed kinds cannot arise from a single sort field; rank by tag
            // so the ordering is still total.
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for CursorValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl CursorValue {
    fn rank(&self) -> u8 {
        match self {
            CursorValue::Text(_) => 0,
            CursorValue::Int(_) => 1,
            CursorValue::Timestamp(_) => 2,
        }
    }
}

/// Decoded pagination cursor.
///
/// Only valid for the exact (field, direction) pair it was created with;
/// the validator enforces that before any store access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorToken {
    pub value: CursorValue,
    /// Tie-break id of the last row on the previous page
    pub id: Uuid,
    pub field: SortField,
    pub direction: SortDirection,
}

impl CursorToken {
    /// Mint a cursor from the last returned row of a page
    pub fn from_record(record: &InteractionRecord, field: SortField, direction: SortDirection) -> Self {
        Self {
            value: field.value_of(record),
            id: record.id,
            field,
            direction,
        }
    }
}

/// Encode a cursor token into its opaque wire form.
///
/// Pure and deterministic; `decode` reverses it without information loss.
pub fn encode(token: &CursorToken) -> String {
    let json = serde_json::to_vec(token).expect("cursor token is always JSON-serializable");
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode an opaque cursor token, rejecting anything malformed
pub fn decode(token: &str) -> Result<CursorToken> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|e| Error::invalid_cursor(format!("not valid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::invalid_cursor(format!("not a valid cursor: {e}")))
}
