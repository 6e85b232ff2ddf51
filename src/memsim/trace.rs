//! TraceEntry: records every callback delivery the engine performs.

use crate::handle::CallbackId;
use crate::time::SimTime;

use super::event::{EventId, Phase};

/// A record of a single dispatched event.
///
/// Appended by the engine after each delivery; useful for test
/// assertions and for checking that two runs behaved identically.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceEntry {
    pub time: SimTime,
    pub phase: Phase,
    pub event_id: EventId,
    pub callback: CallbackId,
    /// Kind label of the callback (`"timed"`, `"rising-edge"`, ...).
    pub kind: String,
    /// `false` if the callback was deregistered before it could run.
    pub delivered: bool,
}

impl std::fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[T={} {} {}] {} {}{}",
            self.time,
            self.phase,
            self.event_id,
            self.callback,
            self.kind,
            if self.delivered { "" } else { " (skipped)" },
        )
    }
}

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// Hash a byte slice deterministically (FNV-1a).
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// Fingerprint of a trace.
///
/// Callback ids are process-global, so they are left out: two runs of
/// the same scenario in one process must hash equal.
pub fn trace_hash(entries: &[TraceEntry]) -> u64 {
    let mut h: u64 = 0;
    for e in entries {
        h = hash_combine(h, e.time.as_ps());
        h = hash_combine(h, e.phase as u64);
        h = hash_combine(h, e.event_id.raw());
        h = hash_combine(h, hash_bytes(e.kind.as_bytes()));
        h = hash_combine(h, e.delivered as u64);
    }
    h
}
