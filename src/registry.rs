//! The process-wide slot holding the active implementation interface.
//!
//! Exactly one backend may be registered at a time. Registration happens
//! once, before any hierarchy walk; [`unregister_impl`] empties the slot
//! at teardown. The free functions below route to whatever is active, so
//! host code does not need to carry the backend around.
//!
//! The slot is only locked long enough to clone the `Arc`; callbacks may
//! call back in here while they run.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::backend::GpiImpl;
use crate::callback::CallbackHandle;
use crate::embed;
use crate::error::{GpiError, GpiResult};
use crate::handle::{HierarchyNavigable, ObjectHandle};
use crate::time::SimTime;

static ACTIVE: RwLock<Option<Arc<dyn GpiImpl>>> = parking_lot::const_rwlock(None);

/// Install `interface` as the active backend.
///
/// Registering the instance that is already active is a no-op; any other
/// instance is refused until the slot is emptied.
pub fn register_impl(interface: Arc<dyn GpiImpl>) -> GpiResult<()> {
    let mut slot = ACTIVE.write();
    if let Some(current) = slot.as_ref() {
        if current.id() == interface.id() {
            debug!(backend = current.name(), "already registered");
            return Ok(());
        }
        return Err(GpiError::AlreadyRegistered(current.name().to_string()));
    }
    info!(backend = interface.name(), id = %interface.id(), "implementation registered");
    *slot = Some(interface);
    Ok(())
}

/// Empty the slot, returning what was there.
pub fn unregister_impl() -> Option<Arc<dyn GpiImpl>> {
    let previous = ACTIVE.write().take();
    if let Some(p) = &previous {
        info!(backend = p.name(), "implementation unregistered");
    }
    previous
}

/// The active backend.
pub fn active_impl() -> GpiResult<Arc<dyn GpiImpl>> {
    ACTIVE.read().clone().ok_or(GpiError::NoBackend)
}

/// Whether a backend currently occupies the slot.
pub fn is_registered() -> bool {
    ACTIVE.read().is_some()
}

// ── Routed operations ─────────────────────────────────────────────────

/// Resolve a top-level entity. The empty name selects the first one.
pub fn get_root_handle(name: &str) -> GpiResult<ObjectHandle> {
    let root = active_impl()?.get_root_handle(name)?;
    embed::note_root_resolved();
    Ok(root)
}

/// Resolve a dotted path such as `top.core.clk`, starting from a root.
///
/// Unlike [`get_root_handle`], an empty path names nothing.
pub fn get_handle_by_path(path: &str) -> GpiResult<ObjectHandle> {
    if path.is_empty() {
        return Err(GpiError::PathNotFound(String::new()));
    }
    let mut parts = path.split('.');
    let first = parts.next().unwrap_or_default();
    let mut handle = get_root_handle(first).map_err(|_| GpiError::PathNotFound(path.to_string()))?;
    for part in parts {
        handle = handle
            .get_handle_by_name(part)
            .ok_or_else(|| GpiError::PathNotFound(path.to_string()))?;
    }
    Ok(handle)
}

/// Current simulation time, rebuilt from the backend's 32-bit halves.
pub fn get_sim_time() -> GpiResult<SimTime> {
    let (high, low) = active_impl()?.get_sim_time();
    Ok(SimTime::from_parts(high, low))
}

/// Ask the active backend to end the simulation. Later registrations fail.
pub fn sim_end() -> GpiResult<()> {
    active_impl()?.sim_end();
    Ok(())
}

/// A PRIMED callback firing `time_ps` after the current time.
pub fn register_timed_callback(time_ps: u64) -> GpiResult<CallbackHandle> {
    active_impl()?.register_timed_callback(time_ps)
}

/// A PRIMED callback for the read-only phase of the current slot.
pub fn register_readonly_callback() -> GpiResult<CallbackHandle> {
    active_impl()?.register_readonly_callback()
}

/// A PRIMED callback for the start of the next time slot.
pub fn register_nexttime_callback() -> GpiResult<CallbackHandle> {
    active_impl()?.register_nexttime_callback()
}

/// A PRIMED callback for the read-write phase of the current slot.
pub fn register_readwrite_callback() -> GpiResult<CallbackHandle> {
    active_impl()?.register_readwrite_callback()
}

/// Move `callback` to DELETE. Refused for callbacks of another backend.
pub fn deregister_callback(callback: &CallbackHandle) -> GpiResult<()> {
    active_impl()?.deregister_callback(callback)
}
