//! Dependency tracking for computed properties.
//!
//! The graph owns one [`Reactive`] context. While a computed property is
//! being derived its frame sits on the stack, and every key read during the
//! derivation records all active frames as dependents of that key. Writing
//! the key later invalidates those dependents.

use std::panic::{self, AssertUnwindSafe};

use smallvec::SmallVec;
use stategraph_types::Key;

use crate::{
    NodeChange, NodeRef, StateGraph, Value,
    computed::ComputedProperties,
    error::{KernelFault, fault},
};

/// A computed property of a specific node that read some key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dependent {
    pub node: NodeRef,
    pub property: String,
}

pub(crate) type Dependents = SmallVec<[Dependent; 4]>;

/// Stack of computations in progress.
#[derive(Debug, Default)]
pub(crate) struct Reactive {
    frames: Vec<Dependent>,
}

impl Reactive {
    pub(crate) fn in_computation(&self) -> bool {
        !self.frames.is_empty()
    }

    pub(crate) fn frames(&self) -> &[Dependent] {
        &self.frames
    }

    /// Pushes `frame`, returning the depth to restore on exit.
    pub(crate) fn enter(&mut self, frame: Dependent) -> usize {
        if self.frames.contains(&frame) {
            fault(KernelFault::ComputedCycle(frame.property));
        }
        let depth = self.frames.len();
        self.frames.push(frame);
        depth
    }

    /// Truncates the stack back to `depth`, dropping abandoned frames too.
    pub(crate) fn exit(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }
}

/// Adds every frame to `dependents`, skipping the ones already present.
pub(crate) fn merge_frames(dependents: &mut Dependents, frames: &[Dependent]) {
    for frame in frames {
        if !dependents.contains(frame) {
            dependents.push(frame.clone());
        }
    }
}

// ============================================================================
// Graph Integration
// ============================================================================

impl StateGraph {
    /// Records the computations in progress as dependents of `key`.
    pub(crate) fn register_read(&mut self, node: NodeRef, key: &Key) {
        if !self.reactive.in_computation() {
            return;
        }
        let Some(data) = self.nodes.get_mut(node) else {
            return;
        };
        let dependents = data.dependents.entry(key.clone()).or_default();
        merge_frames(dependents, self.reactive.frames());
    }

    /// Invalidates every computation that read `key`.
    pub(crate) fn register_write(&mut self, node: NodeRef, key: &Key) {
        let Some(dependents) = self.node_mut(node).dependents.remove(key) else {
            return;
        };
        if dependents.is_empty() {
            return;
        }
        self.tx_log(node)
            .fired_dependents
            .push((key.clone(), dependents.clone()));
        for dependent in dependents {
            self.invalidate(dependent);
        }
    }

    fn invalidate(&mut self, dependent: Dependent) {
        let Dependent { node, property } = dependent;
        let Some(data) = self.nodes.get_mut(node) else {
            return;
        };
        if let Some(old) = data.computed_cache.remove(&property) {
            data.computed_pending
                .entry(property.clone())
                .or_insert(Some(old));
            self.mark_dirty(node);
        }
        self.register_write(node, &Key::Name(property));
    }

    /// Binds computed properties to `node`.
    ///
    /// Every property starts out pending, so the next commit derives it.
    pub fn set_computed_properties(&mut self, node: NodeRef, properties: ComputedProperties) {
        let data = self.node_mut(node);
        if data.computed.is_some() {
            fault(KernelFault::ComputedAlreadySet(node));
        }
        data.computed_pending = properties
            .names()
            .map(|name| (name.to_string(), None))
            .collect();
        data.computed = Some(properties);
        self.mark_dirty(node);
    }

    pub fn computed_properties(&self, node: NodeRef) -> Option<&ComputedProperties> {
        self.node(node).computed.as_ref()
    }

    pub(crate) fn computed_get(&mut self, node: NodeRef, name: &str) -> Value {
        let key = Key::name(name);
        self.register_read(node, &key);

        let data = self.node(node);
        if let Some(value) = data.computed_cache.get(name) {
            return value.clone();
        }
        let Some(property) = data.computed.as_ref().and_then(|c| c.get(name)).cloned() else {
            return Value::Null;
        };

        let depth = self.reactive.enter(Dependent {
            node,
            property: name.to_string(),
        });
        // The frame is popped even when the derivation panics.
        let derived = panic::catch_unwind(AssertUnwindSafe(|| property.compute(self, node)));
        self.reactive.exit(depth);
        let value = match derived {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        };

        let data = self.node_mut(node);
        data.computed_cache.insert(name.to_string(), value.clone());
        let previous = data.computed_pending.remove(name).flatten();
        let tx = self.tx_log(node);
        if let Some(old) = previous {
            tx.changes.push(NodeChange::Remove {
                key: key.clone(),
                value: old,
            });
        }
        tx.changes.push(NodeChange::Put {
            key,
            value: value.clone(),
        });
        value
    }

    /// Derives every pending computed property of `node`.
    pub fn flush_computed_properties(&mut self, node: NodeRef) {
        let Some(data) = self.nodes.get(node) else {
            return;
        };
        let pending: Vec<String> = data.computed_pending.keys().cloned().collect();
        for name in &pending {
            self.computed_get(node, name);
        }
    }
}
