// Interaction record entity type
//
// One row per AI interaction observed by the dashboard: which model was
// called, how many tokens it consumed, how long it took, and how it ended.
// Records are produced and stored elsewhere; this crate only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A single logged AI interaction.
///
/// Field names are camelCase on the wire, matching the `sortBy` values the
/// pagination API accepts (`createdAt` sorts the `createdAt` field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    /// UUID v7 - time-ordered, doubles as the pagination tie-break key
    pub id: Uuid,
    /// Model identifier (e.g. "gpt-5.2", "claude-sonnet-4-5")
    pub model: String,
    /// Provider slug, when known (e.g. "openai", "anthropic")
    pub provider: Option<String>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    /// Wall-clock latency of the provider call
    pub response_time_ms: i64,
    pub status: InteractionStatus,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of an interaction.
///
/// Terminal states are explicit variants. Completion is never inferred from
/// payload contents - provider response shapes vary too much for substring
/// checks to be trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl InteractionStatus {
    /// Whether this state ends the interaction's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InteractionStatus::Completed
                | InteractionStatus::Failed
                | InteractionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionStatus::InProgress => "in_progress",
            InteractionStatus::Completed => "completed",
            InteractionStatus::Failed => "failed",
            InteractionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InteractionStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "in_progress" => Ok(InteractionStatus::InProgress),
            "completed" => Ok(InteractionStatus::Completed),
            "failed" => Ok(InteractionStatus::Failed),
            "cancelled" => Ok(InteractionStatus::Cancelled),
            other => Err(crate::error::Error::validation(format!(
                "unknown interaction status: {other:?}"
            ))),
        }
    }
}
