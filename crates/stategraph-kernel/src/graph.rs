//! The node arena.
//!
//! One [`StateGraph`] owns every node, list and lazy list of a session.
//! Relations between them are handles, so the parent relation is a plain
//! back-reference and ownership follows reachability from a root.

use std::{collections::BTreeMap, fmt, sync::Arc};

use slotmap::SlotMap;
use stategraph_types::{Key, NodeId, NodeLayout, TypeRegistry, ValueType};

use crate::{
    LazyRef, ListRef, NodeChange, NodeRef, Value,
    backing::{MapBacking, NodeBacking, SlotBacking},
    computed::ComputedProperties,
    error::{KernelFault, fault},
    lazy::LazyListData,
    list::ListData,
    reactive::{Dependents, Reactive},
    root::RootState,
    transaction::{PendingTask, TransactionLog},
};

/// Callback run once a node is attached.
pub type AttachCallback = Box<dyn FnOnce(&mut StateGraph, NodeRef) + Send>;

/// Listener notified with the changes of a node during commit.
pub type ChangeListener = Box<dyn FnMut(&mut StateGraph, NodeRef, &[NodeChange]) + Send>;

/// Handle returned by [`StateGraph::add_change_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

// ============================================================================
// Settings
// ============================================================================

/// Tunables of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSettings {
    /// Upper bound of settle rounds in one commit.
    pub max_settle_rounds: usize,
    /// Id given to the first node registered with a root.
    pub first_node_id: i32,
    /// Log a warning when a data provider returns fewer items than asked.
    pub warn_on_provider_shortfall: bool,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            max_settle_rounds: 64,
            first_node_id: 1,
            warn_on_provider_shortfall: true,
        }
    }
}

// ============================================================================
// Node Data
// ============================================================================

pub(crate) struct NodeData {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeRef>,
    pub(crate) root: Option<NodeRef>,
    pub(crate) backing: Box<dyn NodeBacking>,
    pub(crate) value_type: Option<ValueType>,
    pub(crate) tx: Option<TransactionLog>,
    pub(crate) computed: Option<ComputedProperties>,
    pub(crate) computed_cache: BTreeMap<String, Value>,
    /// Invalidated properties with the value they had before, if any.
    pub(crate) computed_pending: BTreeMap<String, Option<Value>>,
    pub(crate) dependents: BTreeMap<Key, Dependents>,
    pub(crate) run_on_attach: Vec<AttachCallback>,
    pub(crate) listeners: Vec<(ListenerId, Option<ChangeListener>)>,
    pub(crate) before_response: Vec<PendingTask>,
    pub(crate) root_state: Option<Box<RootState>>,
}

impl NodeData {
    fn new(backing: Box<dyn NodeBacking>) -> Self {
        Self {
            id: NodeId::UNATTACHED,
            parent: None,
            root: None,
            backing,
            value_type: None,
            tx: None,
            computed: None,
            computed_cache: BTreeMap::new(),
            computed_pending: BTreeMap::new(),
            dependents: BTreeMap::new(),
            run_on_attach: Vec::new(),
            listeners: Vec::new(),
            before_response: Vec::new(),
            root_state: None,
        }
    }

    pub(crate) fn computed_name<'k>(&self, key: &'k Key) -> Option<&'k str> {
        let name = key.as_name()?;
        self.computed
            .as_ref()
            .is_some_and(|computed| computed.contains(name))
            .then_some(name)
    }
}

// ============================================================================
// State Graph
// ============================================================================

/// Arena of state nodes.
///
/// All mutation goes through `&mut StateGraph`, which makes the borrow
/// checker the session lock within a thread. The graph is `Send`, so a
/// session can move between threads behind a mutex.
pub struct StateGraph {
    pub(crate) nodes: SlotMap<NodeRef, NodeData>,
    pub(crate) lists: SlotMap<ListRef, ListData>,
    pub(crate) lazies: SlotMap<LazyRef, LazyListData>,
    pub(crate) reactive: Reactive,
    registry: Arc<TypeRegistry>,
    pub(crate) settings: KernelSettings,
    next_listener_id: u64,
}

impl StateGraph {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_settings(registry, KernelSettings::default())
    }

    pub fn with_settings(registry: Arc<TypeRegistry>, settings: KernelSettings) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            lists: SlotMap::with_key(),
            lazies: SlotMap::with_key(),
            reactive: Reactive::default(),
            registry,
            settings,
            next_listener_id: 0,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    /// Creates an unattached map-backed node.
    pub fn create_node(&mut self) -> NodeRef {
        self.create_node_with_backing(Box::new(MapBacking::new()))
    }

    /// Creates an unattached slot-backed node with the given known fields.
    pub fn create_node_with_layout(&mut self, layout: Arc<NodeLayout>) -> NodeRef {
        self.create_node_with_backing(Box::new(SlotBacking::new(layout)))
    }

    /// Creates an unattached map-backed node described by an object type.
    pub fn create_typed_node(&mut self, value_type: ValueType) -> NodeRef {
        let node = self.create_node();
        self.node_mut(node).value_type = Some(value_type);
        node
    }

    pub fn create_node_with_backing(&mut self, backing: Box<dyn NodeBacking>) -> NodeRef {
        self.nodes.insert(NodeData::new(backing))
    }

    /// Returns true if `node` still refers to a live node.
    pub fn contains_node(&self, node: NodeRef) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, node: NodeRef) -> &NodeData {
        match self.nodes.get(node) {
            Some(data) => data,
            None => fault(KernelFault::StaleHandle("node")),
        }
    }

    pub(crate) fn node_mut(&mut self, node: NodeRef) -> &mut NodeData {
        match self.nodes.get_mut(node) {
            Some(data) => data,
            None => fault(KernelFault::StaleHandle("node")),
        }
    }

    pub(crate) fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener_id += 1;
        ListenerId(self.next_listener_id)
    }

    /// Direct children of a node: child values, list elements and cached
    /// lazy list items.
    pub(crate) fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut children = Vec::new();
        for value in self.node(node).backing.values() {
            match value {
                Value::Node(child) => children.push(*child),
                Value::List(list) => {
                    if let Some(list) = self.lists.get(*list) {
                        if list.attached {
                            children.extend(list.items.iter().filter_map(Value::as_node));
                        }
                    }
                }
                Value::Lazy(lazy) => {
                    if let Some(lazy) = self.lazies.get(*lazy) {
                        children.extend(lazy.cache.values().copied());
                    }
                }
                _ => {}
            }
        }
        children
    }

    /// Frees every node that nothing can reach anymore.
    ///
    /// A node is collected with its whole subtree when it is unattached,
    /// parentless, not a root, not listed in `retained`, and nothing in the
    /// subtree has a pending transaction log. Lists and lazy lists owned by
    /// collected nodes go with them. Returns the number of freed nodes.
    pub fn collect_garbage(&mut self, retained: &[NodeRef]) -> usize {
        let candidates: Vec<NodeRef> = self
            .nodes
            .iter()
            .filter(|(node, data)| {
                data.parent.is_none()
                    && data.root_state.is_none()
                    && !data.id.is_attached()
                    && !data.id.is_released()
                    && !retained.contains(node)
            })
            .map(|(node, _)| node)
            .collect();

        let mut freed = 0;
        for candidate in candidates {
            let subtree = self.subtree(candidate);
            if subtree.iter().any(|node| {
                self.nodes.get(*node).is_some_and(|data| data.tx.is_some())
                    || (*node != candidate && retained.contains(node))
            }) {
                continue;
            }
            for node in subtree {
                self.free_node(node);
                freed += 1;
            }
        }
        if freed > 0 {
            tracing::debug!(freed, remaining = self.nodes.len(), "collected garbage");
        }
        freed
    }

    fn subtree(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut pending = vec![node];
        let mut subtree = Vec::new();
        while let Some(next) = pending.pop() {
            if !self.nodes.contains_key(next) {
                continue;
            }
            subtree.push(next);
            pending.extend(self.children(next));
        }
        subtree
    }

    fn free_node(&mut self, node: NodeRef) {
        let Some(data) = self.nodes.remove(node) else {
            return;
        };
        for value in data.backing.values() {
            match value {
                Value::List(list) => {
                    self.lists.remove(*list);
                }
                Value::Lazy(lazy) => {
                    self.lazies.remove(*lazy);
                }
                _ => {}
            }
        }
    }
}

impl fmt::Debug for StateGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGraph")
            .field("nodes", &self.nodes.len())
            .field("lists", &self.lists.len())
            .field("lazy_lists", &self.lazies.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
