//! Opaque identifiers shared between the core and backends.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one native simulation entity.
///
/// The value is backend-defined. Backends are expected to encode a
/// generation in it so that an id outliving its entity no longer
/// resolves (see `MemorySim`, which packs a `slotmap` key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct HandleId(u64);

impl HandleId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        HandleId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "H{:#x}", self.0)
    }
}

/// Identity of one callback handle, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CallbackId(u64);

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(0);

impl CallbackId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        CallbackId(raw)
    }

    /// Mint a fresh process-unique id.
    pub fn next() -> Self {
        CallbackId(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CB#{}", self.0)
    }
}

/// Identity of one implementation-interface instance.
///
/// Used to reject handles that were issued by a different backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BackendId(u64);

static NEXT_BACKEND_ID: AtomicU64 = AtomicU64::new(1);

impl BackendId {
    /// Mint a fresh process-unique id. Call once per backend instance.
    pub fn next() -> Self {
        BackendId(NEXT_BACKEND_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.0)
    }
}
