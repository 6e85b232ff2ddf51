//! `SignalHandle`: an object handle that carries a value.

use std::sync::Arc;

use tracing::trace;

use crate::backend::GpiImpl;
use crate::callback::{CallbackHandle, CallbackKind, Edge};
use crate::error::{GpiError, GpiResult};

use super::id::{BackendId, HandleId};
use super::iter::HandleIterator;
use super::kind::{KindMask, ObjectKind};
use super::object::ObjectHandle;
use super::traits::{HierarchyNavigable, Identifiable, ValueAccessible};
use super::value::SignalValue;

/// A value-carrying hierarchy node with a fixed bit-width.
#[derive(Debug, Clone)]
pub struct SignalHandle {
    object: ObjectHandle,
    width: u32,
}

impl SignalHandle {
    pub(crate) fn new(object: ObjectHandle, width: u32) -> Self {
        SignalHandle { object, width }
    }

    /// The underlying object handle.
    pub fn as_object(&self) -> &ObjectHandle {
        &self.object
    }

    pub fn into_object(self) -> ObjectHandle {
        self.object
    }

    /// A FREE callback that fires when the least significant bit goes to `1`.
    ///
    /// Every call returns a new handle; arm it with `arm_callback`.
    pub fn rising_edge_cb(&self) -> CallbackHandle {
        self.edge_cb(Edge::Rising)
    }

    /// A FREE callback that fires when the least significant bit goes to `0`.
    pub fn falling_edge_cb(&self) -> CallbackHandle {
        self.edge_cb(Edge::Falling)
    }

    /// A FREE callback that fires on any change of value.
    pub fn value_change_cb(&self) -> CallbackHandle {
        self.edge_cb(Edge::Any)
    }

    fn edge_cb(&self, edge: Edge) -> CallbackHandle {
        CallbackHandle::new(
            self.object.weak_backend(),
            self.object.backend_id(),
            CallbackKind::ValueChange {
                signal: self.object.handle_id(),
                edge,
            },
        )
    }
}

impl Identifiable for SignalHandle {
    fn backend_id(&self) -> BackendId {
        self.object.backend_id()
    }

    fn backend(&self) -> GpiResult<Arc<dyn GpiImpl>> {
        self.object.backend()
    }
}

impl HierarchyNavigable for SignalHandle {
    fn handle_id(&self) -> HandleId {
        self.object.handle_id()
    }

    fn kind(&self) -> ObjectKind {
        self.object.kind()
    }

    fn get_name_str(&self) -> &str {
        self.object.get_name_str()
    }

    fn get_type_str(&self) -> &str {
        self.object.get_type_str()
    }

    fn get_handle_by_name(&self, name: &str) -> Option<ObjectHandle> {
        self.object.get_handle_by_name(name)
    }

    fn get_handle_by_index(&self, index: u32) -> Option<ObjectHandle> {
        self.object.get_handle_by_index(index)
    }

    fn iterate_handle(&self, selector: KindMask) -> HandleIterator {
        self.object.iterate_handle(selector)
    }
}

impl ValueAccessible for SignalHandle {
    fn width(&self) -> u32 {
        self.width
    }

    fn get_signal_value_binstr(&self) -> GpiResult<String> {
        let value = self.backend()?.read_binstr(self.handle_id())?;
        let actual = value.chars().count();
        if actual != self.width as usize {
            return Err(GpiError::WidthMismatch {
                name: self.get_name_str().to_string(),
                expected: self.width,
                actual,
            });
        }
        Ok(value)
    }

    fn set_signal_value(&self, value: SignalValue) -> GpiResult<()> {
        let backend = self.backend()?;
        if !self.kind().is_writable() {
            return Err(GpiError::ReadOnly(self.get_name_str().to_string()));
        }
        let binstr = value.to_binstr(self.get_name_str(), self.width, backend.value_alphabet())?;
        trace!(signal = %self.get_name_str(), value = %binstr, "write");
        backend.write_binstr(self.handle_id(), &binstr)
    }
}
