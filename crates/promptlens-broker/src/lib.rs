// Resumable fan-out event broker
//
// One broker instance per process: producers publish interaction events,
// live SSE sessions subscribe with a type filter, and reconnecting clients
// replay what they missed from a bounded in-memory ring buffer. History
// that has been evicted is reported as an explicit gap so a client can
// trigger a full resync instead of silently losing events.

pub mod broker;
pub mod ring;

pub use broker::{EventBroker, Subscription};
pub use ring::{Replay, RingBuffer};
