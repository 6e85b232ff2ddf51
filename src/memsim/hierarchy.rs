//! The design hierarchy held by the in-memory engine.
//!
//! Nodes live in a `slotmap` arena. A [`HandleId`] is the arena key's
//! ffi encoding (index plus generation), so an id whose node has been
//! removed never resolves again, even after its slot is reused.

use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::error::{GpiError, GpiResult};
use crate::handle::{HandleDesc, HandleId, KindMask, ObjectKind};

new_key_type! {
    pub(crate) struct NodeKey;
}

impl NodeKey {
    pub(crate) fn handle_id(self) -> HandleId {
        HandleId::new(self.data().as_ffi())
    }

    pub(crate) fn from_handle_id(id: HandleId) -> Self {
        NodeKey::from(KeyData::from_ffi(id.raw()))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub name: String,
    pub type_name: String,
    pub kind: ObjectKind,
    pub width: Option<u32>,
    /// Current value for signals, `None` for scopes.
    pub value: Option<String>,
    /// Dotted path from the root, for diagnostics.
    pub path: String,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: ObjectKind, width: Option<u32>) -> Self {
        Node {
            name: name.into(),
            type_name: kind.as_str().to_string(),
            kind,
            width,
            value: None,
            path: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Hierarchy {
    nodes: SlotMap<NodeKey, Node>,
    roots: Vec<NodeKey>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Attach `node` under `parent`, or as a root when `parent` is `None`.
    /// Sibling names must be unique.
    pub fn insert(&mut self, parent: Option<NodeKey>, mut node: Node) -> GpiResult<NodeKey> {
        let siblings = match parent {
            Some(p) => {
                let pn = self
                    .nodes
                    .get(p)
                    .ok_or(GpiError::StaleHandle(p.handle_id()))?;
                node.path = format!("{}.{}", pn.path, node.name);
                &pn.children
            }
            None => {
                node.path = node.name.clone();
                &self.roots
            }
        };
        if siblings.iter().any(|k| self.nodes[*k].name == node.name) {
            return Err(GpiError::InvalidConfig(format!("duplicate entity {:?}", node.path)));
        }
        node.parent = parent;
        let key = self.nodes.insert(node);
        match parent {
            Some(p) => self.nodes[p].children.push(key),
            None => self.roots.push(key),
        }
        Ok(key)
    }

    pub fn get(&self, id: HandleId) -> Option<&Node> {
        self.nodes.get(NodeKey::from_handle_id(id))
    }

    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut Node> {
        self.nodes.get_mut(NodeKey::from_handle_id(id))
    }

    pub fn desc(&self, key: NodeKey) -> Option<HandleDesc> {
        self.nodes.get(key).map(|n| HandleDesc {
            id: key.handle_id(),
            name: n.name.clone(),
            type_name: n.type_name.clone(),
            kind: n.kind,
            width: n.width,
        })
    }

    /// A top-level entity by name. The empty name selects the first root.
    pub fn root(&self, name: &str) -> Option<NodeKey> {
        if name.is_empty() {
            return self.roots.first().copied();
        }
        self.roots.iter().copied().find(|k| self.nodes[*k].name == name)
    }

    pub fn child_by_name(&self, parent: HandleId, name: &str) -> Option<NodeKey> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|k| self.nodes[*k].name == name)
    }

    pub fn child_by_index(&self, parent: HandleId, index: u32) -> Option<NodeKey> {
        self.get(parent)?.children.get(index as usize).copied()
    }

    /// First child at or after `cursor` whose kind `selector` selects,
    /// with the cursor just past it.
    pub fn next_child(
        &self,
        parent: HandleId,
        selector: KindMask,
        cursor: usize,
    ) -> Option<(usize, NodeKey)> {
        let children = &self.get(parent)?.children;
        children
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, k)| selector.selects(self.nodes[**k].kind))
            .map(|(i, k)| (i + 1, *k))
    }

    /// Resolve a dotted path such as `top.core.clk`.
    pub fn resolve_path(&self, path: &str) -> Option<NodeKey> {
        let mut parts = path.split('.');
        let mut key = self.root(parts.next()?)?;
        for part in parts {
            key = self.child_by_name(key.handle_id(), part)?;
        }
        Some(key)
    }

    /// Remove a node and its whole subtree. Returns the removed ids.
    pub fn remove(&mut self, id: HandleId) -> GpiResult<Vec<HandleId>> {
        let key = NodeKey::from_handle_id(id);
        let parent = match self.nodes.get(key) {
            Some(n) => n.parent,
            None => return Err(GpiError::StaleHandle(id)),
        };
        match parent {
            Some(p) => {
                if let Some(pn) = self.nodes.get_mut(p) {
                    pn.children.retain(|k| *k != key);
                }
            }
            None => self.roots.retain(|k| *k != key),
        }

        let mut removed = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(node) = self.nodes.remove(k) {
                removed.push(k.handle_id());
                stack.extend(node.children);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Hierarchy, NodeKey) {
        let mut h = Hierarchy::new();
        let top = h.insert(None, Node::new("top", ObjectKind::Module, None)).unwrap();
        h.insert(Some(top), Node::new("clk", ObjectKind::Register, Some(1))).unwrap();
        let core = h.insert(Some(top), Node::new("core", ObjectKind::Module, None)).unwrap();
        h.insert(Some(core), Node::new("data", ObjectKind::Net, Some(8))).unwrap();
        (h, top)
    }

    #[test]
    fn test_paths_and_lookup() {
        let (h, top) = sample();
        let data = h.resolve_path("top.core.data").unwrap();
        assert_eq!(h.get(data.handle_id()).unwrap().path, "top.core.data");
        assert_eq!(h.root(""), Some(top));
        assert!(h.resolve_path("top.nope").is_none());
        assert!(h.resolve_path("other").is_none());
    }

    #[test]
    fn test_duplicate_sibling_rejected() {
        let (mut h, top) = sample();
        let err = h
            .insert(Some(top), Node::new("clk", ObjectKind::Net, Some(1)))
            .unwrap_err();
        assert!(matches!(err, GpiError::InvalidConfig(_)));
    }

    #[test]
    fn test_next_child_filters_by_kind() {
        let (h, top) = sample();
        let (cursor, k) = h.next_child(top.handle_id(), KindMask::SCOPES, 0).unwrap();
        assert_eq!(h.get(k.handle_id()).unwrap().name, "core");
        assert!(h.next_child(top.handle_id(), KindMask::SCOPES, cursor).is_none());
    }

    #[test]
    fn test_remove_invalidates_subtree() {
        let (mut h, top) = sample();
        let core = h.resolve_path("top.core").unwrap();
        let data = h.resolve_path("top.core.data").unwrap();
        let removed = h.remove(core.handle_id()).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(h.get(data.handle_id()).is_none());
        assert!(h.child_by_name(top.handle_id(), "core").is_none());

        // A reused slot does not resurrect the old id.
        let again = h.insert(Some(top), Node::new("core", ObjectKind::Module, None)).unwrap();
        assert_ne!(again.handle_id(), core.handle_id());
        assert!(h.get(core.handle_id()).is_none());
    }
}
