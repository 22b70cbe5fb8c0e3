// Fan-out pub/sub over the event stream
//
// The broker owns the subscriber list and the replay buffer; callers only
// ever hold a Subscription guard, whose drop releases the slot. Publishing
// appends under the same lock that guards the subscriber map, so every
// subscriber observes events in publish order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use promptlens_core::{EventFilter, StreamEvent, StreamEventType};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::ring::{Replay, RingBuffer};

struct Subscriber {
    filter: EventFilter,
    sender: UnboundedSender<StreamEvent>,
}

struct BrokerInner {
    buffer: RingBuffer,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber_id: u64,
}

/// Process-wide event broker: ring-buffered replay plus live fan-out.
///
/// Live delivery is at-most-once; `events_since` recovers anything missed
/// within the retention window, so the overall contract is at-least-once
/// within the window and best-effort beyond it.
pub struct EventBroker {
    inner: Mutex<BrokerInner>,
}

impl EventBroker {
    /// Create a broker retaining up to `max_replay_events` for resumption
    pub fn new(max_replay_events: usize) -> Self {
        Self {
            inner: Mutex::new(BrokerInner {
                buffer: RingBuffer::new(max_replay_events),
                subscribers: HashMap::new(),
                next_subscriber_id: 1,
            }),
        }
    }

    /// Register a subscriber for events matching `filter`.
    ///
    /// Returns the receiving channel and an RAII guard; dropping the guard
    /// (or the receiver) removes the subscriber.
    pub fn subscribe(
        self: &Arc<Self>,
        filter: EventFilter,
    ) -> (Subscription, UnboundedReceiver<StreamEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.insert(id, Subscriber { filter, sender });
        debug!(subscriber_id = id, "subscriber registered");
        (
            Subscription {
                id,
                broker: Arc::clone(self),
            },
            receiver,
        )
    }

    /// Publish an event: append to the replay buffer, then deliver to every
    /// matching live subscriber. A subscriber whose channel has closed is
    /// logged and pruned without affecting the others or the buffer.
    pub fn publish(&self, event_type: StreamEventType, data: serde_json::Value) -> StreamEvent {
        let mut inner = self.lock();
        let event = inner.buffer.append(event_type, data);

        inner.subscribers.retain(|id, subscriber| {
            if !subscriber.filter.matches(event.event_type) {
                return true;
            }
            match subscriber.sender.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    warn!(
                        subscriber_id = id,
                        sequence = event.sequence,
                        "dropping subscriber: receiver closed"
                    );
                    false
                }
            }
        });

        event
    }

    /// Replay retained events newer than `sequence`, or signal a gap
    pub fn events_since(&self, sequence: u64) -> Replay {
        self.lock().buffer.since(sequence)
    }

    /// Sequence of the most recently published event
    pub fn last_sequence(&self) -> u64 {
        self.lock().buffer.last_sequence()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn remove_subscriber(&self, id: u64) {
        if self.lock().subscribers.remove(&id).is_some() {
            debug!(subscriber_id = id, "subscriber removed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrokerInner> {
        // Subscriber senders never panic while the lock is held, so the
        // mutex cannot be poisoned in practice; recover rather than unwind.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Capability to cancel one subscription.
///
/// The broker keeps exclusive ownership of the subscriber list; this guard
/// is the only way a caller can touch its own entry. Dropping it removes
/// the subscriber, which makes session teardown deterministic.
pub struct Subscription {
    id: u64,
    broker: Arc<EventBroker>,
}

impl Subscription {
    /// Explicitly cancel; equivalent to dropping the guard
    pub fn unsubscribe(self) {}

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.remove_subscriber(self.id);
    }
}
