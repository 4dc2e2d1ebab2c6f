//! Root nodes: id registry, dirty set and RPC queue.

use std::collections::{HashMap, HashSet};

use stategraph_types::NodeId;

use crate::{
    NodeChangeVisitor, NodeRef, StateGraph, Value,
    error::{KernelFault, fault},
};

/// A queued remote invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcInvocation {
    pub node: NodeRef,
    pub function: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
enum Registration {
    Registered(NodeId),
    Released(NodeId, NodeRef),
}

/// Per-root bookkeeping, stored on the root node.
pub(crate) struct RootState {
    next_id: i32,
    registry: HashMap<NodeId, NodeRef>,
    /// Nodes released during the transaction in flight, by their former id.
    released: HashMap<NodeId, NodeRef>,
    journal: Vec<Registration>,
    dirty: Vec<NodeRef>,
    dirty_set: HashSet<NodeRef>,
    rpc_queue: Vec<RpcInvocation>,
    pub(crate) visitors: Vec<Box<dyn NodeChangeVisitor + Send>>,
}

impl RootState {
    fn new(first_id: i32) -> Self {
        Self {
            next_id: first_id,
            registry: HashMap::new(),
            released: HashMap::new(),
            journal: Vec::new(),
            dirty: Vec::new(),
            dirty_set: HashSet::new(),
            rpc_queue: Vec::new(),
            visitors: Vec::new(),
        }
    }

    /// Registers `node`, handing a released node its former id back.
    pub(crate) fn register(&mut self, node: NodeRef, current: NodeId) -> NodeId {
        let restored = current.restored();
        let id = if current.is_released() && self.released.get(&restored) == Some(&node) {
            self.released.remove(&restored);
            restored
        } else {
            let id = NodeId::new(self.next_id);
            self.next_id += 1;
            id
        };
        let previous = self.registry.insert(id, node);
        assert!(previous.is_none(), "id {id} registered twice");
        self.journal.push(Registration::Registered(id));
        id
    }

    /// Releases `node`, returning the id it keeps until commit.
    pub(crate) fn unregister(&mut self, node: NodeRef, id: NodeId) -> NodeId {
        let removed = self.registry.remove(&id);
        debug_assert_eq!(removed, Some(node));
        self.released.insert(id, node);
        self.journal.push(Registration::Released(id, node));
        id.released()
    }

    pub(crate) fn enlist(&mut self, node: NodeRef) {
        if self.dirty_set.insert(node) {
            self.dirty.push(node);
        }
    }

    pub(crate) fn dirty(&self) -> &[NodeRef] {
        &self.dirty
    }

    pub(crate) fn take_dirty(&mut self) -> Vec<NodeRef> {
        self.dirty_set.clear();
        std::mem::take(&mut self.dirty)
    }

    /// Forgets the journal, returning the nodes released for good.
    pub(crate) fn finish_registrations(&mut self) -> Vec<NodeRef> {
        self.journal.clear();
        self.released.drain().map(|(_, node)| node).collect()
    }

    /// Restores the registry to its state before the transaction.
    pub(crate) fn undo_registrations(&mut self) -> usize {
        let undone = self.journal.len();
        for entry in self.journal.drain(..).rev() {
            match entry {
                Registration::Registered(id) => {
                    self.registry.remove(&id);
                }
                Registration::Released(id, node) => {
                    self.registry.insert(id, node);
                }
            }
        }
        self.released.clear();
        undone
    }
}

impl StateGraph {
    /// Creates a root node, registered with the first id of its own registry.
    pub fn create_root(&mut self) -> NodeRef {
        let root = self.create_node();
        let first_id = self.settings.first_node_id;
        let data = self.node_mut(root);
        data.root_state = Some(Box::new(RootState::new(first_id)));
        data.root = Some(root);
        self.register(root);
        root
    }

    pub fn is_root(&self, node: NodeRef) -> bool {
        self.node(node).root_state.is_some()
    }

    pub(crate) fn root_state(&self, root: NodeRef) -> &RootState {
        match self.node(root).root_state.as_deref() {
            Some(state) => state,
            None => fault(KernelFault::NotARoot(root)),
        }
    }

    pub(crate) fn root_state_mut(&mut self, root: NodeRef) -> &mut RootState {
        match self.node_mut(root).root_state.as_deref_mut() {
            Some(state) => state,
            None => fault(KernelFault::NotARoot(root)),
        }
    }

    /// Looks a node up by its id in a root's registry.
    pub fn node_by_id(&self, root: NodeRef, id: NodeId) -> Option<NodeRef> {
        self.root_state(root).registry.get(&id).copied()
    }

    /// Number of nodes registered with a root, the root included.
    pub fn registered_count(&self, root: NodeRef) -> usize {
        self.root_state(root).registry.len()
    }

    /// Nodes with pending changes, in the order they became dirty.
    pub fn dirty_nodes(&self, root: NodeRef) -> Vec<NodeRef> {
        self.root_state(root).dirty().to_vec()
    }

    /// Registers a visitor that sees the changes of every commit.
    pub fn add_commit_visitor(&mut self, root: NodeRef, visitor: Box<dyn NodeChangeVisitor + Send>) {
        self.root_state_mut(root).visitors.push(visitor);
    }

    /// Queues a remote invocation on `node`, once it is attached.
    pub fn enqueue_rpc(
        &mut self,
        node: NodeRef,
        function: impl Into<String>,
        params: Vec<Value>,
    ) {
        let function = function.into();
        self.run_attached(node, move |graph, node| {
            let Some(root) = graph.node(node).root else {
                return;
            };
            graph.root_state_mut(root).rpc_queue.push(RpcInvocation {
                node,
                function,
                params,
            });
        });
    }

    /// Drains the RPC queue, dropping invocations whose target has detached.
    pub fn flush_rpc_queue(&mut self, root: NodeRef) -> Vec<RpcInvocation> {
        let queue = std::mem::take(&mut self.root_state_mut(root).rpc_queue);
        queue
            .into_iter()
            .filter(|invocation| {
                self.nodes.get(invocation.node).is_some_and(|data| {
                    data.root == Some(root) && data.id.is_attached()
                })
            })
            .collect()
    }
}
