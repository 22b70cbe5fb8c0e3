// Stream event model
//
// A StreamEvent is the unit pushed to live SSE subscribers and retained in
// the broker's replay buffer. It pairs a durable uuid with a broker-assigned
// u64 sequence; the sequence is what clients echo back as Last-Event-ID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Event pushed to live subscribers and retained for replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StreamEvent {
    pub id: Uuid,
    /// Strictly increasing in publish order within one broker instance.
    /// Carried in the SSE `id:` field for resumption.
    pub sequence: u64,
    pub event_type: StreamEventType,
    /// Event payload as JSON. Structure depends on event_type.
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Event types on the dashboard stream.
///
/// `Heartbeat` and `ResyncRequired` are protocol-level: the session layer
/// emits them directly and they never enter the replay buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    InteractionCreated,
    InteractionCompleted,
    Heartbeat,
    ResyncRequired,
}

impl StreamEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventType::InteractionCreated => "interaction_created",
            StreamEventType::InteractionCompleted => "interaction_completed",
            StreamEventType::Heartbeat => "heartbeat",
            StreamEventType::ResyncRequired => "resync_required",
        }
    }
}

impl std::fmt::Display for StreamEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription filter: one event type, or everything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Type(StreamEventType),
}

impl EventFilter {
    pub fn matches(&self, event_type: StreamEventType) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Type(t) => *t == event_type,
        }
    }
}

/// Lifecycle states of a streaming connection.
///
/// Server-side sessions move `Connecting -> Connected -> Disconnected`
/// (with `Error` on delivery failure); the reconnecting client additionally
/// walks `Error -> Connecting` on its fixed retry interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Error,
    Disconnected,
}

impl ConnectionStatus {
    /// Disconnection is terminal; every other state can still make progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Disconnected)
    }
}
