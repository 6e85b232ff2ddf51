//! Capability traits composed by the concrete handle types.
//!
//! Instead of a Handle → Object → Signal class chain, each handle type
//! implements the capabilities it actually has:
//!
//! | Trait | Implemented by |
//! |---|---|
//! | [`Identifiable`] | object, signal and callback handles |
//! | [`HierarchyNavigable`] | object and signal handles |
//! | [`ValueAccessible`] | signal handles |
//! | [`Armable`](crate::callback::Armable) | callback handles |

use std::sync::Arc;

use crate::backend::GpiImpl;
use crate::error::GpiResult;

use super::id::{BackendId, HandleId};
use super::iter::HandleIterator;
use super::kind::{KindMask, ObjectKind};
use super::object::ObjectHandle;
use super::value::SignalValue;

/// Identity plus the route back to the issuing backend.
pub trait Identifiable {
    /// The backend instance that issued this handle.
    fn backend_id(&self) -> BackendId;

    /// Upgrade the non-owning backend association.
    ///
    /// Fails with `BackendGone` once the backend has been dropped.
    fn backend(&self) -> GpiResult<Arc<dyn GpiImpl>>;
}

/// A node in the simulation hierarchy.
pub trait HierarchyNavigable: Identifiable {
    /// Backend-defined identity of the entity.
    fn handle_id(&self) -> HandleId;

    /// Entity kind, fixed at construction.
    fn kind(&self) -> ObjectKind;

    /// Name, fixed at construction.
    fn get_name_str(&self) -> &str;

    /// Backend type string, fixed at construction.
    fn get_type_str(&self) -> &str;

    /// Resolve an immediate child by name. `None` when there is no such
    /// child, the backend is gone or this handle has gone stale.
    fn get_handle_by_name(&self, name: &str) -> Option<ObjectHandle>;

    /// Resolve an immediate child by position.
    fn get_handle_by_index(&self, index: u32) -> Option<ObjectHandle>;

    /// Begin iterating the children selected by `selector`.
    ///
    /// Always returns an iterator; it is simply empty when nothing matches.
    fn iterate_handle(&self, selector: KindMask) -> HandleIterator;

    /// Advance `iterator`. Keeps returning `None` once exhausted.
    fn next_handle(&self, iterator: &mut HandleIterator) -> Option<ObjectHandle> {
        iterator.next_handle()
    }
}

/// A value-carrying node.
pub trait ValueAccessible: HierarchyNavigable {
    /// Bit-width, fixed for the handle's lifetime.
    fn width(&self) -> u32;

    /// Current value as exactly `width()` symbols, MSB first.
    fn get_signal_value_binstr(&self) -> GpiResult<String>;

    /// Write a new value. Validation happens before anything reaches the
    /// backend, so a rejected write leaves the old value in place.
    fn set_signal_value(&self, value: SignalValue) -> GpiResult<()>;
}
