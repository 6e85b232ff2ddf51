//! `HandleIterator`: lazy, forward-only cursor over one hierarchy level.

use std::iter::FusedIterator;
use std::sync::Weak;

use crate::backend::GpiImpl;

use super::id::{BackendId, HandleId};
use super::kind::KindMask;
use super::object::ObjectHandle;

/// Cursor over the children of one node.
///
/// Holds the parent's id, not the parent handle. Each step asks the
/// backend for the next match, so children are never materialised up
/// front. Once exhausted the iterator stays exhausted; build a new one to
/// walk the level again.
#[derive(Debug)]
pub struct HandleIterator {
    backend: Weak<dyn GpiImpl>,
    backend_id: BackendId,
    parent: HandleId,
    selector: KindMask,
    cursor: usize,
    exhausted: bool,
}

impl HandleIterator {
    pub(crate) fn new(
        backend: Weak<dyn GpiImpl>,
        backend_id: BackendId,
        parent: HandleId,
        selector: KindMask,
    ) -> Self {
        HandleIterator {
            backend,
            backend_id,
            parent,
            selector,
            cursor: 0,
            exhausted: selector.is_empty(),
        }
    }

    /// The node this iterator walks.
    pub fn parent(&self) -> HandleId {
        self.parent
    }

    pub fn selector(&self) -> KindMask {
        self.selector
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next matching child, or `None` forever after the last one.
    pub fn next_handle(&mut self) -> Option<ObjectHandle> {
        if self.exhausted {
            return None;
        }
        let step = self
            .backend
            .upgrade()
            .and_then(|b| b.next_child(self.parent, self.selector, self.cursor));
        match step {
            Some((cursor, desc)) => {
                self.cursor = cursor;
                Some(ObjectHandle::from_desc(self.backend.clone(), self.backend_id, desc))
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

impl Iterator for HandleIterator {
    type Item = ObjectHandle;

    fn next(&mut self) -> Option<ObjectHandle> {
        self.next_handle()
    }
}

impl FusedIterator for HandleIterator {}
