//! `ObjectHandle`: a caller-owned reference to one hierarchy node.

use std::sync::{Arc, Weak};

use tracing::debug;

use crate::backend::GpiImpl;
use crate::error::{GpiError, GpiResult};

use super::id::{BackendId, HandleId};
use super::iter::HandleIterator;
use super::kind::{KindMask, ObjectKind};
use super::signal::SignalHandle;
use super::traits::{HierarchyNavigable, Identifiable};

/// Plain-data description of an entity, as reported by a backend.
///
/// This is what crosses the backend boundary; the core wraps it into an
/// [`ObjectHandle`] bound to the issuing backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct HandleDesc {
    pub id: HandleId,
    pub name: String,
    pub type_name: String,
    pub kind: ObjectKind,
    /// Bit-width for value-carrying kinds, `None` otherwise.
    pub width: Option<u32>,
}

impl HandleDesc {
    /// Describe an entity using the kind's default type string.
    pub fn new(id: HandleId, name: impl Into<String>, kind: ObjectKind, width: Option<u32>) -> Self {
        HandleDesc {
            id,
            name: name.into(),
            type_name: kind.as_str().to_string(),
            kind,
            width,
        }
    }
}

/// A node in the simulation hierarchy.
///
/// Name and type are captured when the handle is built and never change.
/// The handle does not keep its backend alive.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    desc: HandleDesc,
    backend_id: BackendId,
    backend: Weak<dyn GpiImpl>,
}

impl ObjectHandle {
    /// Bind a description to the backend that produced it.
    ///
    /// Intended for backend factory paths (`get_root_handle`, child
    /// resolution); hosts receive handles, they do not build them.
    pub fn from_desc(backend: Weak<dyn GpiImpl>, backend_id: BackendId, desc: HandleDesc) -> Self {
        ObjectHandle {
            desc,
            backend_id,
            backend,
        }
    }

    /// The plain-data description this handle wraps.
    pub fn desc(&self) -> &HandleDesc {
        &self.desc
    }

    /// Specialise into a [`SignalHandle`] if this node carries a value.
    pub fn into_signal(self) -> Option<SignalHandle> {
        if !self.desc.kind.is_signal() {
            return None;
        }
        let width = self.desc.width?;
        Some(SignalHandle::new(self, width))
    }

    /// Like [`into_signal`](Self::into_signal), reporting why it failed.
    pub fn try_into_signal(self) -> GpiResult<SignalHandle> {
        let id = self.desc.id;
        self.into_signal().ok_or(GpiError::NotASignal(id))
    }

    pub(crate) fn weak_backend(&self) -> Weak<dyn GpiImpl> {
        self.backend.clone()
    }

    fn wrap(&self, desc: HandleDesc) -> ObjectHandle {
        ObjectHandle::from_desc(self.backend.clone(), self.backend_id, desc)
    }
}

impl Identifiable for ObjectHandle {
    fn backend_id(&self) -> BackendId {
        self.backend_id
    }

    fn backend(&self) -> GpiResult<Arc<dyn GpiImpl>> {
        self.backend.upgrade().ok_or(GpiError::BackendGone)
    }
}

impl HierarchyNavigable for ObjectHandle {
    fn handle_id(&self) -> HandleId {
        self.desc.id
    }

    fn kind(&self) -> ObjectKind {
        self.desc.kind
    }

    fn get_name_str(&self) -> &str {
        &self.desc.name
    }

    fn get_type_str(&self) -> &str {
        &self.desc.type_name
    }

    fn get_handle_by_name(&self, name: &str) -> Option<ObjectHandle> {
        let backend = self.backend.upgrade()?;
        match backend.child_by_name(self.desc.id, name) {
            Some(desc) => Some(self.wrap(desc)),
            None => {
                debug!(parent = %self.desc.name, child = name, "no child by name");
                None
            }
        }
    }

    fn get_handle_by_index(&self, index: u32) -> Option<ObjectHandle> {
        let backend = self.backend.upgrade()?;
        match backend.child_by_index(self.desc.id, index) {
            Some(desc) => Some(self.wrap(desc)),
            None => {
                debug!(parent = %self.desc.name, index, "no child at index");
                None
            }
        }
    }

    fn iterate_handle(&self, selector: KindMask) -> HandleIterator {
        HandleIterator::new(self.backend.clone(), self.backend_id, self.desc.id, selector)
    }
}
