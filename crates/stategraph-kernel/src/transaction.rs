//! Transactions: change logs, commit and rollback.
//!
//! The first mutation of a node creates its transaction log and enlists the
//! node with its root. A commit settles the dirty set (computed properties,
//! before-response tasks, change listeners) and drains every log to the
//! commit visitors. A rollback replays every log in reverse.

use std::collections::HashSet;

use stategraph_types::{Key, NodeId};

use crate::{
    LazyRef, NodeChange, NodeChangeVisitor, NodeRef, StateGraph, Value,
    error::{KernelFault, fault},
    reactive::{Dependents, merge_frames},
};

// ============================================================================
// Transaction Log
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct TransactionLog {
    pub(crate) changes: Vec<NodeChange>,
    next_unpreviewed: usize,
    /// Dependents taken by writes, given back on rollback.
    pub(crate) fired_dependents: Vec<(Key, Dependents)>,
}

impl TransactionLog {
    fn take_unpreviewed(&mut self) -> Vec<NodeChange> {
        let changes = self.changes[self.next_unpreviewed..].to_vec();
        self.next_unpreviewed = self.changes.len();
        changes
    }

    fn has_unpreviewed(&self) -> bool {
        self.next_unpreviewed < self.changes.len()
    }
}

// ============================================================================
// Before-Response Tasks
// ============================================================================

/// Identity of a task queued with
/// [`StateGraph::run_before_next_client_response`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskId {
    Named(String),
    /// Sending the pending data of a lazy list.
    LazyData(LazyRef),
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId::Named(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        TaskId::Named(value)
    }
}

pub(crate) enum TaskAction {
    Callback(Box<dyn FnOnce(&mut StateGraph, NodeRef) + Send>),
    SendPendingData(LazyRef),
}

pub(crate) struct PendingTask {
    id: TaskId,
    action: TaskAction,
}

impl StateGraph {
    pub(crate) fn tx_log(&mut self, node: NodeRef) -> &mut TransactionLog {
        let data = self.node_mut(node);
        if data.tx.is_none() {
            data.tx = Some(TransactionLog::default());
            if let Some(root) = data.root {
                self.root_state_mut(root).enlist(node);
            }
        }
        self.node_mut(node)
            .tx
            .get_or_insert_with(TransactionLog::default)
    }

    pub(crate) fn log_change(&mut self, node: NodeRef, change: NodeChange) {
        self.tx_log(node).changes.push(change);
    }

    /// Makes sure `node` takes part in the next commit of its root.
    pub fn mark_dirty(&mut self, node: NodeRef) {
        self.tx_log(node);
    }

    /// Returns true if `node` has a pending transaction log.
    pub fn is_dirty(&self, node: NodeRef) -> bool {
        self.node(node).tx.is_some()
    }

    /// Changes logged for `node` in the transaction in flight.
    pub fn pending_changes(&self, node: NodeRef) -> &[NodeChange] {
        self.node(node)
            .tx
            .as_ref()
            .map_or(&[], |tx| tx.changes.as_slice())
    }

    /// Queues `f` to run once before the next client response.
    ///
    /// Tasks are deduplicated by id: queueing an id that is already pending
    /// does nothing and returns false. Queueing marks the node dirty, and
    /// rolling back drops every queued task.
    pub fn run_before_next_client_response<F>(
        &mut self,
        node: NodeRef,
        id: impl Into<TaskId>,
        f: F,
    ) -> bool
    where
        F: FnOnce(&mut StateGraph, NodeRef) + Send + 'static,
    {
        self.queue_task(node, id.into(), TaskAction::Callback(Box::new(f)))
    }

    pub(crate) fn queue_task(&mut self, node: NodeRef, id: TaskId, action: TaskAction) -> bool {
        let data = self.node_mut(node);
        if data.before_response.iter().any(|task| task.id == id) {
            return false;
        }
        data.before_response.push(PendingTask { id, action });
        self.mark_dirty(node);
        true
    }

    fn run_before_response_tasks(&mut self, node: NodeRef) {
        let Some(data) = self.nodes.get_mut(node) else {
            return;
        };
        let tasks = std::mem::take(&mut data.before_response);
        for task in tasks {
            match task.action {
                TaskAction::Callback(callback) => callback(self, node),
                TaskAction::SendPendingData(lazy) => self.send_pending_data(lazy),
            }
        }
    }

    // ========================================================================
    // Change Listeners
    // ========================================================================

    /// Registers a listener notified during commit with the node's changes
    /// logged since it was last notified.
    pub fn add_change_listener<F>(&mut self, node: NodeRef, listener: F) -> crate::ListenerId
    where
        F: FnMut(&mut StateGraph, NodeRef, &[NodeChange]) + Send + 'static,
    {
        let id = self.next_listener_id();
        self.node_mut(node)
            .listeners
            .push((id, Some(Box::new(listener))));
        id
    }

    pub fn remove_change_listener(&mut self, node: NodeRef, id: crate::ListenerId) -> bool {
        let listeners = &mut self.node_mut(node).listeners;
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn fire_listeners(&mut self, node: NodeRef, changes: &[NodeChange]) {
        let ids: Vec<crate::ListenerId> = self
            .node(node)
            .listeners
            .iter()
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            let Some(mut listener) = self
                .node_mut(node)
                .listeners
                .iter_mut()
                .find(|(listener_id, _)| *listener_id == id)
                .and_then(|(_, listener)| listener.take())
            else {
                continue;
            };
            listener(self, node, changes);
            if let Some(slot) = self
                .node_mut(node)
                .listeners
                .iter_mut()
                .find(|(listener_id, _)| *listener_id == id)
            {
                slot.1 = Some(listener);
            }
        }
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Commits the transaction of `root`, showing the changes to the
    /// registered commit visitors.
    pub fn commit(&mut self, root: NodeRef) {
        self.commit_inner(root, None);
    }

    /// Commits the transaction of `root`, showing the changes to `visitor`
    /// after the registered commit visitors.
    pub fn commit_with(&mut self, root: NodeRef, visitor: &mut dyn NodeChangeVisitor) {
        self.commit_inner(root, Some(visitor));
    }

    fn commit_inner(&mut self, root: NodeRef, mut visitor: Option<&mut dyn NodeChangeVisitor>) {
        self.settle(root);

        let state = self.root_state_mut(root);
        let dirty = state.take_dirty();
        let released = state.finish_registrations();
        for node in released {
            if let Some(data) = self.nodes.get_mut(node) {
                if data.id.is_released() {
                    data.id = NodeId::UNATTACHED;
                }
            }
        }

        let mut logs = Vec::with_capacity(dirty.len());
        for node in dirty {
            if let Some(tx) = self.nodes.get_mut(node).and_then(|data| data.tx.take()) {
                logs.push((node, tx.changes));
            }
        }
        self.drop_detached_backings(&logs);
        self.finish_lazy_transactions(root);

        let mut visitors = std::mem::take(&mut self.root_state_mut(root).visitors);
        let mut change_count = 0;
        for (node, changes) in &logs {
            for change in changes {
                for registered in &mut visitors {
                    change.accept(registered.as_mut(), self, *node);
                }
                if let Some(visitor) = visitor.as_deref_mut() {
                    change.accept(visitor, self, *node);
                }
                change_count += 1;
            }
        }
        let state = self.root_state_mut(root);
        visitors.append(&mut state.visitors);
        state.visitors = visitors;

        tracing::debug!(
            nodes = logs.len(),
            changes = change_count,
            "transaction committed"
        );
    }

    /// Runs settle rounds until no round produces new changes.
    fn settle(&mut self, root: NodeRef) {
        let limit = self.settings.max_settle_rounds;
        let mut rounds = 0;
        loop {
            if rounds == limit {
                fault(KernelFault::SettleLimit(limit));
            }
            rounds += 1;

            let dirty = self.root_state(root).dirty().to_vec();
            for &node in &dirty {
                self.flush_computed_properties(node);
            }
            for &node in &dirty {
                self.run_before_response_tasks(node);
            }
            for &node in &dirty {
                let Some(tx) = self.nodes.get_mut(node).and_then(|data| data.tx.as_mut()) else {
                    continue;
                };
                let changes = tx.take_unpreviewed();
                if !changes.is_empty() {
                    self.fire_listeners(node, &changes);
                }
            }

            if !self.is_unsettled(root) {
                break;
            }
        }
    }

    fn is_unsettled(&self, root: NodeRef) -> bool {
        self.root_state(root).dirty().iter().any(|node| {
            self.nodes.get(*node).is_some_and(|data| {
                !data.computed_pending.is_empty()
                    || !data.before_response.is_empty()
                    || data.tx.as_ref().is_some_and(TransactionLog::has_unpreviewed)
            })
        })
    }

    /// Frees lists and lazy lists whose owning key was overwritten.
    fn drop_detached_backings(&mut self, logs: &[(NodeRef, Vec<NodeChange>)]) {
        for (_, changes) in logs {
            for change in changes {
                let NodeChange::Remove { value, .. } = change else {
                    continue;
                };
                match value {
                    Value::List(list) => {
                        if self.lists.get(*list).is_some_and(|list| !list.attached) {
                            self.lists.remove(*list);
                        }
                    }
                    Value::Lazy(lazy) => {
                        if self.lazies.get(*lazy).is_some_and(|lazy| !lazy.attached) {
                            self.lazies.remove(*lazy);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    /// Undoes every change logged under `root` since the last commit.
    pub fn rollback(&mut self, root: NodeRef) {
        let dirty = self.root_state_mut(root).take_dirty();
        for &node in dirty.iter().rev() {
            self.rollback_node(node);
        }
        let registrations = self.root_state_mut(root).undo_registrations();
        self.restore_lazy_caches(root);

        for &node in &dirty {
            if self
                .nodes
                .get(node)
                .is_some_and(|data| !data.computed_pending.is_empty())
            {
                self.mark_dirty(node);
            }
        }

        tracing::debug!(
            nodes = dirty.len(),
            registrations,
            "transaction rolled back"
        );
    }

    fn rollback_node(&mut self, node: NodeRef) {
        let Some(tx) = self.nodes.get_mut(node).and_then(|data| data.tx.take()) else {
            return;
        };
        for change in tx.changes.into_iter().rev() {
            self.revert(node, change);
        }

        let data = self.node_mut(node);
        for (key, fired) in tx.fired_dependents {
            merge_frames(data.dependents.entry(key).or_default(), &fired);
        }
        data.before_response.clear();
        if let Some(computed) = &data.computed {
            data.computed_pending = computed
                .names()
                .filter(|name| !data.computed_cache.contains_key(*name))
                .map(|name| (name.to_string(), None))
                .collect();
        }
    }

    fn revert(&mut self, node: NodeRef, change: NodeChange) {
        match change {
            NodeChange::Id { old, .. } => self.node_mut(node).id = old,
            NodeChange::Parent { old, .. } => self.node_mut(node).parent = old,
            NodeChange::Put { key, value } => {
                let data = self.node_mut(node);
                if let Some(name) = data.computed_name(&key) {
                    data.computed_cache.remove(name);
                    return;
                }
                data.backing.remove(&key);
                match value {
                    Value::List(list) => {
                        self.lists.remove(list);
                    }
                    Value::Lazy(lazy) => {
                        if let Some(lazy) = self.lazies.get_mut(lazy) {
                            lazy.unbind();
                        }
                    }
                    _ => {}
                }
            }
            NodeChange::Remove { key, value } => {
                let data = self.node_mut(node);
                if let Some(name) = data.computed_name(&key) {
                    data.computed_cache.insert(name.to_string(), value);
                    return;
                }
                match &value {
                    Value::List(list) => {
                        if let Some(list) = self.lists.get_mut(*list) {
                            list.attached = true;
                        }
                    }
                    Value::Lazy(lazy) => {
                        if let Some(lazy) = self.lazies.get_mut(*lazy) {
                            lazy.attached = true;
                        }
                    }
                    _ => {}
                }
                self.node_mut(node).backing.set(key, value);
            }
            NodeChange::ListInsert { key, index, .. } => {
                if let Some(list) = self.raw_list_mut(node, &key) {
                    list.items.remove(index);
                }
            }
            NodeChange::ListInsertMany { key, index, values } => {
                if let Some(list) = self.raw_list_mut(node, &key) {
                    list.items.drain(index..index + values.len());
                }
            }
            NodeChange::ListRemove { key, index, value } => {
                if let Some(list) = self.raw_list_mut(node, &key) {
                    list.items.insert(index, value.unwrap_or_default());
                }
            }
            NodeChange::ListReplace { key, index, old, .. } => {
                if let Some(list) = self.raw_list_mut(node, &key) {
                    list.items[index] = old;
                }
            }
            NodeChange::RangeStart { key, old, .. } => {
                if let Some(lazy) = self.raw_lazy_mut(node, &key) {
                    lazy.cache.set_range_start(old);
                }
            }
            NodeChange::RangeEnd { key, old, .. } => {
                if let Some(lazy) = self.raw_lazy_mut(node, &key) {
                    lazy.cache.set_range_end(old);
                }
            }
        }
    }

    /// Lazy lists touched in the transaction take back their client range
    /// and drop cached items that are no longer their owner's children.
    fn restore_lazy_caches(&mut self, root: NodeRef) {
        let nodes = &self.nodes;
        let owned_by = |node: NodeRef, owner: NodeRef| {
            nodes
                .get(node)
                .is_some_and(|data| data.parent == Some(owner))
        };
        for lazy in self.lazies.values_mut() {
            let Some((owner, _)) = lazy.binding.clone() else {
                continue;
            };
            if nodes.get(owner).and_then(|data| data.root) != Some(root) {
                continue;
            }
            let Some(checkpoint) = lazy.checkpoint.take() else {
                continue;
            };
            lazy.client_range = checkpoint.client_range;
            for (index, item) in checkpoint.evicted {
                if owned_by(item, owner) {
                    lazy.cache.restore(index, item);
                }
            }
            lazy.cache.remove_where(|item| !owned_by(*item, owner));
        }
    }

    fn finish_lazy_transactions(&mut self, root: NodeRef) {
        let committed: HashSet<NodeRef> = self
            .lazies
            .values()
            .filter_map(|lazy| lazy.binding.as_ref().map(|(owner, _)| *owner))
            .filter(|owner| self.nodes.get(*owner).and_then(|data| data.root) == Some(root))
            .collect();
        for lazy in self.lazies.values_mut() {
            if lazy
                .binding
                .as_ref()
                .is_some_and(|(owner, _)| committed.contains(owner))
            {
                lazy.checkpoint = None;
            }
        }
    }
}
