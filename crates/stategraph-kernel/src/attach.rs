//! Attaching and detaching nodes.
//!
//! Attaching a child gives it the owner's root and, when the owner is
//! registered, registers the whole reachable subtree. Detaching reverses
//! both over the same reachable set.

use stategraph_types::NodeId;

use crate::{
    NodeChange, NodeRef, StateGraph, Value,
    error::{KernelFault, fault},
};

impl StateGraph {
    pub(crate) fn attach_value(&mut self, owner: NodeRef, value: &Value) {
        if let Value::Node(child) = value {
            self.attach_child(owner, *child);
        }
    }

    pub(crate) fn detach_value(&mut self, owner: NodeRef, value: &Value) {
        match value {
            Value::Node(child) => self.detach_child(owner, *child),
            Value::List(list) => self.detach_list(owner, *list),
            Value::Lazy(lazy) => self.detach_lazy(owner, *lazy),
            _ => {}
        }
    }

    pub(crate) fn attach_child(&mut self, owner: NodeRef, child: NodeRef) {
        let data = self.node(child);
        if let Some(parent) = data.parent {
            fault(KernelFault::AlreadyAttached { child, parent });
        }
        if data.root_state.is_some() {
            fault(KernelFault::ForeignRoot(child));
        }
        if child == owner || self.has_ancestor(owner, child) {
            fault(KernelFault::AttachCycle {
                child,
                parent: owner,
            });
        }

        let owner_data = self.node(owner);
        if let Some(root) = owner_data.root {
            let owner_attached = owner_data.id.is_attached();
            match self.node(child).root {
                None => self.set_root(child, root),
                Some(existing) if existing == root => {}
                Some(_) => fault(KernelFault::ForeignRoot(child)),
            }
            if owner_attached {
                self.register(child);
            }
        }
        self.set_parent(child, Some(owner));
    }

    pub(crate) fn detach_child(&mut self, owner: NodeRef, child: NodeRef) {
        if self.node(child).parent != Some(owner) {
            fault(KernelFault::NotAChild {
                child,
                parent: owner,
            });
        }
        self.set_parent(child, None);
        if self.node(child).id.is_attached() {
            self.unregister(child);
        }
    }

    fn set_parent(&mut self, node: NodeRef, parent: Option<NodeRef>) {
        let data = self.node_mut(node);
        let old = std::mem::replace(&mut data.parent, parent);
        self.log_change(node, NodeChange::Parent { old, new: parent });
    }

    fn set_id(&mut self, node: NodeRef, id: NodeId) {
        let data = self.node_mut(node);
        let old = std::mem::replace(&mut data.id, id);
        self.log_change(node, NodeChange::Id { old, new: id });
    }

    /// Gives `node` and every reachable rootless descendant the root.
    ///
    /// Nodes that already have a transaction log join the root's dirty set.
    pub(crate) fn set_root(&mut self, node: NodeRef, root: NodeRef) {
        let data = self.node_mut(node);
        debug_assert!(data.root.is_none(), "node already has a root");
        data.root = Some(root);
        if data.tx.is_some() {
            self.root_state_mut(root).enlist(node);
        }
        for child in self.children(node) {
            if self.node(child).root.is_none() {
                self.set_root(child, root);
            }
        }
    }

    /// Registers `node` and its unregistered descendants with their root.
    pub(crate) fn register(&mut self, node: NodeRef) {
        let data = self.node(node);
        if data.id.is_attached() {
            return;
        }
        let Some(root) = data.root else {
            return;
        };
        let current = data.id;
        let id = self.root_state_mut(root).register(node, current);
        self.set_id(node, id);

        let callbacks = std::mem::take(&mut self.node_mut(node).run_on_attach);
        for callback in callbacks {
            callback(self, node);
        }

        for child in self.children(node) {
            self.register(child);
        }
    }

    /// Releases `node` and its registered descendants.
    pub(crate) fn unregister(&mut self, node: NodeRef) {
        let data = self.node(node);
        if !data.id.is_attached() {
            return;
        }
        let Some(root) = data.root else {
            return;
        };
        let current = data.id;
        for child in self.children(node) {
            self.unregister(child);
        }
        let released = self.root_state_mut(root).unregister(node, current);
        self.set_id(node, released);
    }
}
