//! Node change records and the visitor that consumes them.
//!
//! Every mutation of a node appends one [`NodeChange`] to the node's
//! transaction log. At commit the log is handed to [`NodeChangeVisitor`]s;
//! at rollback it is replayed in reverse.

use serde::Serialize;
use stategraph_types::{Key, NodeId};

use crate::{NodeRef, StateGraph, Value};

/// A single logged mutation of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeChange {
    /// The node got a new id.
    Id { old: NodeId, new: NodeId },
    /// The node got a new parent.
    Parent {
        old: Option<NodeRef>,
        new: Option<NodeRef>,
    },
    /// A value was stored under a key that held no value.
    Put { key: Key, value: Value },
    /// The value under a key was removed.
    Remove { key: Key, value: Value },
    ListInsert {
        key: Key,
        index: usize,
        value: Value,
    },
    ListInsertMany {
        key: Key,
        index: usize,
        values: Vec<Value>,
    },
    /// An element was removed. Lazy lists trimming the client range do not
    /// carry the removed value.
    ListRemove {
        key: Key,
        index: usize,
        value: Option<Value>,
    },
    ListReplace {
        key: Key,
        index: usize,
        old: Value,
        new: Value,
    },
    /// The active range start of a lazy list moved.
    RangeStart { key: Key, old: usize, new: usize },
    /// The active range end of a lazy list moved.
    RangeEnd { key: Key, old: usize, new: usize },
}

impl NodeChange {
    /// Returns the key this change applies to, if any.
    pub fn key(&self) -> Option<&Key> {
        match self {
            NodeChange::Id { .. } | NodeChange::Parent { .. } => None,
            NodeChange::Put { key, .. }
            | NodeChange::Remove { key, .. }
            | NodeChange::ListInsert { key, .. }
            | NodeChange::ListInsertMany { key, .. }
            | NodeChange::ListRemove { key, .. }
            | NodeChange::ListReplace { key, .. }
            | NodeChange::RangeStart { key, .. }
            | NodeChange::RangeEnd { key, .. } => Some(key),
        }
    }

    /// Dispatches this change to the matching visitor method.
    pub fn accept(
        &self,
        visitor: &mut dyn NodeChangeVisitor,
        graph: &StateGraph,
        node: NodeRef,
    ) {
        match self {
            NodeChange::Id { old, new } => visitor.visit_id_change(graph, node, *old, *new),
            NodeChange::Parent { old, new } => {
                visitor.visit_parent_change(graph, node, *old, *new);
            }
            NodeChange::Put { key, value } => visitor.visit_put_change(graph, node, key, value),
            NodeChange::Remove { key, value } => {
                visitor.visit_remove_change(graph, node, key, value);
            }
            NodeChange::ListInsert { key, index, value } => {
                visitor.visit_list_insert_change(graph, node, key, *index, value);
            }
            NodeChange::ListInsertMany { key, index, values } => {
                visitor.visit_list_insert_many_change(graph, node, key, *index, values);
            }
            NodeChange::ListRemove { key, index, value } => {
                visitor.visit_list_remove_change(graph, node, key, *index, value.as_ref());
            }
            NodeChange::ListReplace {
                key,
                index,
                old,
                new,
            } => visitor.visit_list_replace_change(graph, node, key, *index, old, new),
            NodeChange::RangeStart { key, old, new } => {
                visitor.visit_range_start_change(graph, node, key, *old, *new);
            }
            NodeChange::RangeEnd { key, old, new } => {
                visitor.visit_range_end_change(graph, node, key, *old, *new);
            }
        }
    }
}

/// Consumer of committed changes, one method per change kind.
///
/// Every method defaults to a no-op so visitors only implement the kinds
/// they care about. The graph is passed read-only so visitors can resolve
/// ids and values of the nodes they are told about.
#[allow(unused_variables)]
pub trait NodeChangeVisitor {
    fn visit_id_change(&mut self, graph: &StateGraph, node: NodeRef, old: NodeId, new: NodeId) {}

    fn visit_parent_change(
        &mut self,
        graph: &StateGraph,
        node: NodeRef,
        old: Option<NodeRef>,
        new: Option<NodeRef>,
    ) {
    }

    fn visit_put_change(&mut self, graph: &StateGraph, node: NodeRef, key: &Key, value: &Value) {}

    fn visit_remove_change(&mut self, graph: &StateGraph, node: NodeRef, key: &Key, value: &Value) {
    }

    fn visit_list_insert_change(
        &mut self,
        graph: &StateGraph,
        node: NodeRef,
        key: &Key,
        index: usize,
        value: &Value,
    ) {
    }

    fn visit_list_insert_many_change(
        &mut self,
        graph: &StateGraph,
        node: NodeRef,
        key: &Key,
        index: usize,
        values: &[Value],
    ) {
    }

    fn visit_list_remove_change(
        &mut self,
        graph: &StateGraph,
        node: NodeRef,
        key: &Key,
        index: usize,
        value: Option<&Value>,
    ) {
    }

    fn visit_list_replace_change(
        &mut self,
        graph: &StateGraph,
        node: NodeRef,
        key: &Key,
        index: usize,
        old: &Value,
        new: &Value,
    ) {
    }

    fn visit_range_start_change(
        &mut self,
        graph: &StateGraph,
        node: NodeRef,
        key: &Key,
        old: usize,
        new: usize,
    ) {
    }

    fn visit_range_end_change(
        &mut self,
        graph: &StateGraph,
        node: NodeRef,
        key: &Key,
        old: usize,
        new: usize,
    ) {
    }
}

/// Visitor that records every change it is shown, in order.
#[derive(Debug, Default, Clone)]
pub struct ChangeRecorder {
    pub changes: Vec<(NodeRef, NodeChange)>,
}

impl ChangeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes recorded for one node.
    pub fn changes_of(&self, node: NodeRef) -> Vec<&NodeChange> {
        self.changes
            .iter()
            .filter(|(n, _)| *n == node)
            .map(|(_, change)| change)
            .collect()
    }
}

impl NodeChangeVisitor for ChangeRecorder {
    fn visit_id_change(&mut self, _: &StateGraph, node: NodeRef, old: NodeId, new: NodeId) {
        self.changes.push((node, NodeChange::Id { old, new }));
    }

    fn visit_parent_change(
        &mut self,
        _: &StateGraph,
        node: NodeRef,
        old: Option<NodeRef>,
        new: Option<NodeRef>,
    ) {
        self.changes.push((node, NodeChange::Parent { old, new }));
    }

    fn visit_put_change(&mut self, _: &StateGraph, node: NodeRef, key: &Key, value: &Value) {
        self.changes.push((
            node,
            NodeChange::Put {
                key: key.clone(),
                value: value.clone(),
            },
        ));
    }

    fn visit_remove_change(&mut self, _: &StateGraph, node: NodeRef, key: &Key, value: &Value) {
        self.changes.push((
            node,
            NodeChange::Remove {
                key: key.clone(),
                value: value.clone(),
            },
        ));
    }

    fn visit_list_insert_change(
        &mut self,
        _: &StateGraph,
        node: NodeRef,
        key: &Key,
        index: usize,
        value: &Value,
    ) {
        self.changes.push((
            node,
            NodeChange::ListInsert {
                key: key.clone(),
                index,
                value: value.clone(),
            },
        ));
    }

    fn visit_list_insert_many_change(
        &mut self,
        _: &StateGraph,
        node: NodeRef,
        key: &Key,
        index: usize,
        values: &[Value],
    ) {
        self.changes.push((
            node,
            NodeChange::ListInsertMany {
                key: key.clone(),
                index,
                values: values.to_vec(),
            },
        ));
    }

    fn visit_list_remove_change(
        &mut self,
        _: &StateGraph,
        node: NodeRef,
        key: &Key,
        index: usize,
        value: Option<&Value>,
    ) {
        self.changes.push((
            node,
            NodeChange::ListRemove {
                key: key.clone(),
                index,
                value: value.cloned(),
            },
        ));
    }

    fn visit_list_replace_change(
        &mut self,
        _: &StateGraph,
        node: NodeRef,
        key: &Key,
        index: usize,
        old: &Value,
        new: &Value,
    ) {
        self.changes.push((
            node,
            NodeChange::ListReplace {
                key: key.clone(),
                index,
                old: old.clone(),
                new: new.clone(),
            },
        ));
    }

    fn visit_range_start_change(
        &mut self,
        _: &StateGraph,
        node: NodeRef,
        key: &Key,
        old: usize,
        new: usize,
    ) {
        self.changes.push((
            node,
            NodeChange::RangeStart {
                key: key.clone(),
                old,
                new,
            },
        ));
    }

    fn visit_range_end_change(
        &mut self,
        _: &StateGraph,
        node: NodeRef,
        key: &Key,
        old: usize,
        new: usize,
    ) {
        self.changes.push((
            node,
            NodeChange::RangeEnd {
                key: key.clone(),
                old,
                new,
            },
        ));
    }
}
