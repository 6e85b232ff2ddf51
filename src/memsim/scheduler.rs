/// Deterministic event scheduler for the in-memory engine.
///
/// A `BinaryHeap` with reversed `Ord` on `Event` acts as a min-heap keyed
/// by `(at, phase, id)`. Event IDs are strictly increasing, so two runs
/// that schedule the same work dispatch it in the same order.

use std::collections::BinaryHeap;

use crate::callback::CallbackHandle;
use crate::time::SimTime;

use super::event::{Event, EventId, EventIdGen, Phase};

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    /// Min-heap (via reversed Ord on Event).
    queue: BinaryHeap<Event>,
    id_gen: EventIdGen,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Queue `callback` for delivery at `(at, phase)`.
    pub fn schedule(&mut self, at: SimTime, phase: Phase, callback: CallbackHandle) -> EventId {
        let id = self.id_gen.next_id();
        self.queue.push(Event::new(id, at, phase, callback));
        id
    }

    /// Pop the next event (earliest time, earliest phase, lowest ID).
    pub fn pop_next(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    /// Queue a value-change delivery for delta cycle `delta` of slot `at`.
    pub fn schedule_delta(&mut self, at: SimTime, delta: u32, callback: CallbackHandle) -> EventId {
        let id = self.id_gen.next_id();
        self.queue
            .push(Event::new(id, at, Phase::ValueChange, callback).with_delta(delta));
        id
    }

    pub fn peek_next(&self) -> Option<&Event> {
        self.queue.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
