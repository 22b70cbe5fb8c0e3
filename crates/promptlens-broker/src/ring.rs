// Fixed-capacity replay buffer
//
// Retains the most recent events in publish order and assigns the
// strictly increasing sequence numbers that clients use as Last-Event-ID.
// Oldest entries are evicted first; entries are never reordered or mutated
// after insertion.

use std::collections::VecDeque;

use chrono::Utc;
use promptlens_core::{StreamEvent, StreamEventType};
use uuid::Uuid;

/// Result of a replay request.
///
/// `Gap` means the requested position is older than the retained window
/// (or unknown to this broker instance): the caller missed events and must
/// resync from the store rather than trust a partial replay.
#[derive(Debug, Clone, PartialEq)]
pub enum Replay {
    Events(Vec<StreamEvent>),
    Gap,
}

/// Append-only FIFO-evicting window over the event stream
#[derive(Debug)]
pub struct RingBuffer {
    events: VecDeque<StreamEvent>,
    capacity: usize,
    next_sequence: u64,
}

impl RingBuffer {
    /// Create a buffer retaining up to `capacity` events. Zero is legal:
    /// sequences are still assigned but every resume behind the head gaps.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_sequence: 1,
        }
    }

    /// Build and retain the next event in the stream. O(1); evicts the
    /// oldest entry when at capacity.
    pub fn append(&mut self, event_type: StreamEventType, data: serde_json::Value) -> StreamEvent {
        let event = StreamEvent {
            id: Uuid::now_v7(),
            sequence: self.next_sequence,
            event_type,
            data,
            created_at: Utc::now(),
        };
        self.next_sequence += 1;

        if self.capacity > 0 {
            if self.events.len() == self.capacity {
                self.events.pop_front();
            }
            self.events.push_back(event.clone());
        }
        event
    }

    /// Everything retained after `sequence`, in publish order.
    ///
    /// An id older than the oldest retained event (or ahead of anything
    /// this instance ever assigned) yields `Gap`; being caught up yields
    /// an empty replay.
    pub fn since(&self, sequence: u64) -> Replay {
        let newest = self.next_sequence - 1;
        if sequence > newest {
            // Unknown id - most likely minted by a previous process
            return Replay::Gap;
        }
        if sequence == newest {
            return Replay::Events(Vec::new());
        }
        match self.events.front() {
            // Events were published but none retained
            None => Replay::Gap,
            Some(oldest) if sequence < oldest.sequence => Replay::Gap,
            _ => Replay::Events(
                self.events
                    .iter()
                    .filter(|e| e.sequence > sequence)
                    .cloned()
                    .collect(),
            ),
        }
    }

    /// The full retained window, oldest first
    pub fn all(&self) -> Vec<StreamEvent> {
        self.events.iter().cloned().collect()
    }

    /// Sequence of the most recently published event (0 before the first)
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
