//! The implementation interface every backend provides.
//!
//! A backend adapts one simulation engine's native API to [`GpiImpl`].
//! Hierarchy queries speak plain data ([`HandleId`], [`HandleDesc`],
//! binary strings); the core wraps the results into handles. Callback
//! registration is provided on top of two native hooks,
//! [`prime_callback`](GpiImpl::prime_callback) and
//! [`release_callback`](GpiImpl::release_callback), so every backend
//! shares the same lifecycle logic.
//!
//! # Contract
//!
//! Implementations **must**:
//! - Be `Send + Sync` and serialise their own bookkeeping.
//! - Never hold an internal lock while calling
//!   [`run_callback`](crate::callback::Armable::run_callback).
//! - Not read or write a callback's state from inside `prime_callback`
//!   or `release_callback` (the core holds that state's lock).
//! - Only deliver callbacks whose condition has actually been reached.

use std::sync::Weak;

use crate::callback::{Armable, CallbackHandle, CallbackKind};
use crate::error::{GpiError, GpiResult};
use crate::handle::{Alphabet, BackendId, CallbackId, HandleDesc, HandleId, Identifiable, KindMask, ObjectHandle};
use crate::time::SimTime;

/// Factory and capability surface of one simulation backend.
pub trait GpiImpl: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Identity of this instance.
    fn id(&self) -> BackendId;

    /// Non-owning reference to this backend, stored in every handle it issues.
    fn handle_ref(&self) -> Weak<dyn GpiImpl>;

    /// Symbols used in binary strings.
    fn value_alphabet(&self) -> Alphabet {
        Alphabet::FourState
    }

    // ── Simulation ────────────────────────────────────────

    /// Request orderly termination. Later registrations may fail.
    fn sim_end(&self);

    /// Current time as `(high, low)` 32-bit halves.
    fn get_sim_time(&self) -> (u32, u32);

    // ── Hierarchy ─────────────────────────────────────────

    /// Resolve a top-level entity.
    fn get_root_handle(&self, name: &str) -> GpiResult<ObjectHandle>;

    /// Immediate child of `parent` called `name`.
    fn child_by_name(&self, parent: HandleId, name: &str) -> Option<HandleDesc>;

    /// Immediate child of `parent` at position `index`.
    fn child_by_index(&self, parent: HandleId, index: u32) -> Option<HandleDesc>;

    /// First child of `parent` at or after `cursor` selected by `selector`,
    /// together with the cursor to resume from.
    fn next_child(
        &self,
        parent: HandleId,
        selector: KindMask,
        cursor: usize,
    ) -> Option<(usize, HandleDesc)>;

    /// Current value of a signal, one symbol per bit, MSB first.
    fn read_binstr(&self, signal: HandleId) -> GpiResult<String>;

    /// Deposit an already validated value.
    fn write_binstr(&self, signal: HandleId, value: &str) -> GpiResult<()>;

    // ── Native callback hooks ─────────────────────────────

    /// Register `callback` with the native engine.
    fn prime_callback(&self, callback: &CallbackHandle) -> GpiResult<()>;

    /// Drop whatever the native engine holds for `callback`.
    /// Unknown ids are ignored.
    fn release_callback(&self, callback: CallbackId);

    // ── Callback registration ─────────────────────────────

    /// A PRIMED callback that fires `time_ps` after now.
    fn register_timed_callback(&self, time_ps: u64) -> GpiResult<CallbackHandle> {
        self.register(CallbackKind::Timer {
            delay: SimTime::from_ps(time_ps),
        })
    }

    /// A PRIMED callback for the read-only phase of the current slot.
    fn register_readonly_callback(&self) -> GpiResult<CallbackHandle> {
        self.register(CallbackKind::ReadOnly)
    }

    /// A PRIMED callback for the start of the next time slot.
    fn register_nexttime_callback(&self) -> GpiResult<CallbackHandle> {
        self.register(CallbackKind::NextTime)
    }

    /// A PRIMED callback for the read-write phase of the current slot.
    fn register_readwrite_callback(&self) -> GpiResult<CallbackHandle> {
        self.register(CallbackKind::ReadWrite)
    }

    /// Build and arm a callback of `kind`.
    fn register(&self, kind: CallbackKind) -> GpiResult<CallbackHandle> {
        let callback = CallbackHandle::new(self.handle_ref(), self.id(), kind);
        callback.arm_callback()?;
        Ok(callback)
    }

    /// Move `callback` to DELETE and release its native resources.
    ///
    /// Fails if the callback was issued by another backend instance.
    fn deregister_callback(&self, callback: &CallbackHandle) -> GpiResult<()> {
        if callback.backend_id() != self.id() {
            return Err(GpiError::UnknownCallback {
                callback: callback.id(),
                backend: self.name().to_string(),
            });
        }
        callback.cleanup_callback().map(|_| ())
    }
}
