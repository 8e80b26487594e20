//! Resolved configuration trees.
//!
//! A [`ResultTree`] structurally mirrors the spec tree it was built from:
//! literal constants copy through, scalar bindings become [`ValueCell`]s,
//! service bindings become an [`EndpointCell`] plus the result tree of
//! their extensions. Cells are shared with the watch tasks that keep them
//! current, so reads always observe the latest registry state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::endpoint::EndpointCell;
use crate::value::Value;

/// Shared mutable slot for a scalar leaf.
///
/// Cloning shares the slot; watch callbacks write through it.
#[derive(Debug, Clone, Default)]
pub struct ValueCell {
    inner: Arc<RwLock<Option<Value>>>,
}

impl ValueCell {
    /// Replace the value, returning the previous one.
    pub(crate) fn set(&self, value: Option<Value>) -> Option<Value> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, value)
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Resolved slot for a service binding: the live endpoint plus the
/// resolved extension sub-tree.
#[derive(Debug, Default)]
pub struct ServiceNode {
    pub(crate) cell: EndpointCell,
    pub(crate) extensions: ResultTree,
}

impl ServiceNode {
    pub fn endpoint(&self) -> &EndpointCell {
        &self.cell
    }

    pub fn extensions(&self) -> &ResultTree {
        &self.extensions
    }
}

/// One resolved entry.
#[derive(Debug)]
pub enum ResultNode {
    Literal(Value),
    Leaf(ValueCell),
    Service(ServiceNode),
    Tree(ResultTree),
}

/// The resolved mirror of a spec tree.
#[derive(Debug, Default)]
pub struct ResultTree {
    entries: HashMap<String, ResultNode>,
}

impl ResultTree {
    pub(crate) fn insert(&mut self, key: impl Into<String>, node: ResultNode) {
        self.entries.insert(key.into(), node);
    }

    /// Look up a node by dotted path. Paths descend through nested trees
    /// and through a service's extension tree, so `db.username` reaches
    /// the `username` extension of the `db` service.
    pub fn node(&self, path: &str) -> Option<&ResultNode> {
        let mut segments = path.split('.');
        let mut current = self.entries.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                ResultNode::Tree(tree) => tree.entries.get(segment)?,
                ResultNode::Service(service) => service.extensions.entries.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Snapshot of the value at a dotted path.
    ///
    /// Literals clone through; unresolved leaves yield `None`; a service
    /// path yields its endpoint as a [`Value::Endpoint`].
    pub fn get(&self, path: &str) -> Option<Value> {
        match self.node(path)? {
            ResultNode::Literal(value) => Some(value.clone()),
            ResultNode::Leaf(cell) => cell.get(),
            ResultNode::Service(service) => service.cell.get().map(Value::Endpoint),
            ResultNode::Tree(_) => None,
        }
    }

    /// The live endpoint cell at a dotted path, if it names a service.
    pub fn endpoint(&self, path: &str) -> Option<EndpointCell> {
        match self.node(path)? {
            ResultNode::Service(service) => Some(service.cell.clone()),
            _ => None,
        }
    }

    /// The live scalar cell at a dotted path, if it names a scalar leaf.
    pub fn cell(&self, path: &str) -> Option<ValueCell> {
        match self.node(path)? {
            ResultNode::Leaf(cell) => Some(cell.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
