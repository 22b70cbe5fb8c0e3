// Store boundary for the interaction log
//
// The rest of the workspace never issues raw queries: everything goes
// through the InteractionStore trait's single `fetch_page` operation.
// This crate provides the Postgres implementation used in production,
// an in-memory implementation for tests and examples, and the keyset
// planner that turns a validated page request into a fetch plus the
// continuation cursor.

pub mod memory;
pub mod paginate;
pub mod postgres;
pub mod store;

pub use memory::InMemoryInteractionStore;
pub use paginate::{paginate, Page};
pub use postgres::PgInteractionStore;
pub use store::{InteractionStore, StoreError};
