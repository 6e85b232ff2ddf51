/// Scheduled deliveries for the in-memory engine.
///
/// Every pending notification is an `Event`: a callback to run at a
/// time slot and phase. The scheduler orders them by
/// `(at, phase, id)` so dispatch is deterministic.

use std::cmp::Ordering;

use crate::callback::CallbackHandle;
use crate::time::SimTime;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly-increasing event identifier.
///
/// Breaks ties between events scheduled for the same slot and phase:
/// they run in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Deterministic event-ID generator, one per engine.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }
}

// ── Phase ─────────────────────────────────────────────────────────────

/// Position of an event within its time slot.
///
/// Declaration order is dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Start of a new slot, before anything else runs.
    NextTime,
    /// Timers expiring in this slot.
    Timer,
    /// Values are stable; writes are rejected.
    ReadOnly,
    /// Writes are allowed.
    ReadWrite,
    /// Reactions to writes made earlier in the slot.
    ValueChange,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::NextTime => "next-time",
            Phase::Timer => "timer",
            Phase::ReadOnly => "read-only",
            Phase::ReadWrite => "read-write",
            Phase::ValueChange => "value-change",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// One pending delivery.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub at: SimTime,
    pub phase: Phase,
    /// Delta cycle within the slot. Only value-change events carry one;
    /// it is not part of the ordering key.
    pub delta: u32,
    pub callback: CallbackHandle,
}

impl Event {
    pub fn new(id: EventId, at: SimTime, phase: Phase, callback: CallbackHandle) -> Self {
        Event {
            id,
            at,
            phase,
            delta: 0,
            callback,
        }
    }

    pub fn with_delta(mut self, delta: u32) -> Self {
        self.delta = delta;
        self
    }

    fn key(&self) -> (SimTime, Phase, EventId) {
        (self.at, self.phase, self.id)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

/// Ordering: smallest `(at, phase, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural order is reversed.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
