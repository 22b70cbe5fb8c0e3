// Promptlens core domain types
//
// This crate holds everything the other crates agree on and nothing else:
// the interaction record entity, the stream event model used for SSE fan-out,
// the cursor codec and pagination validation for keyset browsing, the error
// taxonomy, and the environment-backed stream configuration.
//
// Key design decisions:
// - No HTTP or database dependencies here; those live in promptlens-api and
//   promptlens-storage behind traits
// - Cursor tokens round-trip exactly (tagged value representation), so a
//   decoded cursor is always equal to the one that was encoded
// - Stream events carry a broker-assigned u64 sequence next to their uuid,
//   mirroring how the interaction log pairs a durable id with a sort key

pub mod config;
pub mod cursor;
pub mod error;
pub mod event;
pub mod pagination;
pub mod record;

// Re-exports for convenience
pub use config::StreamConfig;
pub use cursor::{CursorToken, CursorValue, SortDirection, SortField};
pub use error::{ApiErrorCode, Error, Result};
pub use event::{ConnectionStatus, EventFilter, StreamEvent, StreamEventType};
pub use pagination::{PageQuery, PageRequest, DEFAULT_LIMIT, MAX_LIMIT};
pub use record::{InteractionRecord, InteractionStatus};
