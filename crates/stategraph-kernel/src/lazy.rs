//! Lazily fetched lists.
//!
//! A lazy list exposes a window (the active range) over data owned by an
//! external [`DataProvider`]. Items are fetched on demand, mapped to nodes
//! owned by the list's node and cached while they stay in the window. The
//! client keeps its own window (the client range), reconciled with the
//! active range once per settled transaction.

use std::collections::BTreeMap;

use stategraph_types::{IndexRange, Key, ValueType};

use crate::{
    LazyRef, NodeChange, NodeRef, StateGraph, Value,
    error::{KernelFault, fault},
    range_cache::SingleRangeCache,
    transaction::{TaskAction, TaskId},
};

/// Source of the items behind a lazy list.
pub trait DataProvider: Send {
    type Item;

    /// Returns up to `count` items starting at `index`.
    fn values(&mut self, index: usize, count: usize) -> Vec<Self::Item>;
}

/// [`DataProvider`] backed by a closure.
pub struct ProviderFn<F>(pub F);

impl<T, F> DataProvider for ProviderFn<F>
where
    F: FnMut(usize, usize) -> Vec<T> + Send,
{
    type Item = T;

    fn values(&mut self, index: usize, count: usize) -> Vec<T> {
        (self.0)(index, count)
    }
}

/// Turns a provider item into a node.
pub trait NodeMapper<T>: Send {
    fn to_node(&mut self, graph: &mut StateGraph, item: T) -> NodeRef;
}

impl<T, F> NodeMapper<T> for F
where
    F: FnMut(&mut StateGraph, T) -> NodeRef + Send,
{
    fn to_node(&mut self, graph: &mut StateGraph, item: T) -> NodeRef {
        self(graph, item)
    }
}

/// Maps property records onto fresh map-backed nodes.
#[derive(Debug, Clone, Default)]
pub struct PropertyMapper {
    value_type: Option<ValueType>,
}

impl PropertyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates nodes described by an object type.
    pub fn typed(value_type: ValueType) -> Self {
        Self {
            value_type: Some(value_type),
        }
    }
}

impl NodeMapper<BTreeMap<String, Value>> for PropertyMapper {
    fn to_node(&mut self, graph: &mut StateGraph, record: BTreeMap<String, Value>) -> NodeRef {
        let node = match &self.value_type {
            Some(ty) => graph.create_typed_node(ty.clone()),
            None => graph.create_node(),
        };
        for (key, value) in record {
            graph.put(node, key, value);
        }
        node
    }
}

trait FetchSource: Send {
    fn fetch(&mut self, graph: &mut StateGraph, index: usize, count: usize) -> Vec<NodeRef>;
}

struct MappedProvider<P, M> {
    provider: P,
    mapper: M,
}

impl<P, M> FetchSource for MappedProvider<P, M>
where
    P: DataProvider,
    M: NodeMapper<P::Item>,
{
    fn fetch(&mut self, graph: &mut StateGraph, index: usize, count: usize) -> Vec<NodeRef> {
        let mut items = self.provider.values(index, count);
        items.truncate(count);
        items
            .into_iter()
            .map(|item| self.mapper.to_node(graph, item))
            .collect()
    }
}

// ============================================================================
// Lazy List Data
// ============================================================================

/// State to restore when the transaction touching a lazy list rolls back.
#[derive(Debug)]
pub(crate) struct LazyCheckpoint {
    pub(crate) client_range: IndexRange,
    pub(crate) evicted: Vec<(usize, NodeRef)>,
}

pub(crate) struct LazyListData {
    pub(crate) binding: Option<(NodeRef, Key)>,
    source: Option<Box<dyn FetchSource>>,
    pub(crate) cache: SingleRangeCache<NodeRef>,
    /// The range the client has data for.
    pub(crate) client_range: IndexRange,
    pub(crate) attached: bool,
    pub(crate) checkpoint: Option<LazyCheckpoint>,
}

impl LazyListData {
    pub(crate) fn bind(&mut self, node: NodeRef, key: Key) {
        if let Some((owner, bound)) = &self.binding {
            fault(KernelFault::LazyAlreadyBound {
                node: *owner,
                key: bound.clone(),
            });
        }
        self.binding = Some((node, key));
    }

    /// Forgets a binding made in a rolled back transaction.
    pub(crate) fn unbind(&mut self) {
        self.binding = None;
        self.cache = SingleRangeCache::new();
        self.client_range = IndexRange::default();
        self.attached = true;
        self.checkpoint = None;
    }
}

impl StateGraph {
    /// Creates an unbound lazy list. Put it under a node key to bind it.
    pub fn create_lazy_list<P, M>(&mut self, provider: P, mapper: M) -> LazyRef
    where
        P: DataProvider + 'static,
        M: NodeMapper<P::Item> + 'static,
    {
        self.lazies.insert(LazyListData {
            binding: None,
            source: Some(Box::new(MappedProvider { provider, mapper })),
            cache: SingleRangeCache::new(),
            client_range: IndexRange::default(),
            attached: true,
            checkpoint: None,
        })
    }

    /// Opens a lazy list by handle.
    pub fn lazy_list(&mut self, lazy: LazyRef) -> LazyList<'_> {
        self.lazy_data(lazy);
        LazyList { graph: self, lazy }
    }

    pub(crate) fn lazy_data(&self, lazy: LazyRef) -> &LazyListData {
        match self.lazies.get(lazy) {
            Some(data) => data,
            None => fault(KernelFault::StaleHandle("lazy list")),
        }
    }

    pub(crate) fn lazy_data_mut(&mut self, lazy: LazyRef) -> &mut LazyListData {
        match self.lazies.get_mut(lazy) {
            Some(data) => data,
            None => fault(KernelFault::StaleHandle("lazy list")),
        }
    }

    /// The lazy list stored under `key`, regardless of attachment.
    pub(crate) fn raw_lazy_mut(&mut self, node: NodeRef, key: &Key) -> Option<&mut LazyListData> {
        let lazy = self.node(node).backing.get(key).and_then(Value::as_lazy)?;
        self.lazies.get_mut(lazy)
    }

    fn lazy_binding(&self, lazy: LazyRef) -> (NodeRef, Key) {
        let data = self.lazy_data(lazy);
        let Some((owner, key)) = &data.binding else {
            fault(KernelFault::LazyUnbound);
        };
        if !data.attached {
            fault(KernelFault::LazyDetached(key.clone()));
        }
        (*owner, key.clone())
    }

    fn lazy_checkpoint(&mut self, lazy: LazyRef) {
        let data = self.lazy_data_mut(lazy);
        if data.checkpoint.is_none() {
            data.checkpoint = Some(LazyCheckpoint {
                client_range: data.client_range,
                evicted: Vec::new(),
            });
        }
    }

    fn release_evicted(&mut self, lazy: LazyRef, owner: NodeRef, evicted: Vec<(usize, NodeRef)>) {
        for &(_, node) in &evicted {
            self.detach_child(owner, node);
        }
        if let Some(checkpoint) = self.lazy_data_mut(lazy).checkpoint.as_mut() {
            checkpoint.evicted.extend(evicted);
        }
    }

    pub(crate) fn detach_lazy(&mut self, owner: NodeRef, lazy: LazyRef) {
        self.lazy_checkpoint(lazy);
        let evicted = self.lazy_data_mut(lazy).cache.clear();
        self.release_evicted(lazy, owner, evicted);
        self.lazy_data_mut(lazy).attached = false;
    }

    // ========================================================================
    // Range Adjustment
    // ========================================================================

    fn set_active_range_start(&mut self, lazy: LazyRef, start: usize) {
        let (owner, key) = self.lazy_binding(lazy);
        self.lazy_checkpoint(lazy);
        let range = self.lazy_data(lazy).cache.range();
        tracing::trace!(%key, from = range.start(), to = start, "set active range start");

        if start > range.end() {
            self.lazy_data_mut(lazy).cache.set_range_end(start);
            self.log_change(
                owner,
                NodeChange::RangeEnd {
                    key: key.clone(),
                    old: range.end(),
                    new: start,
                },
            );
        }
        let evicted = self.lazy_data_mut(lazy).cache.set_range_start(start);
        self.release_evicted(lazy, owner, evicted);
        self.log_change(
            owner,
            NodeChange::RangeStart {
                key: key.clone(),
                old: range.start(),
                new: start,
            },
        );
        self.after_range_change(lazy, owner, &key);
    }

    fn set_active_range_end(&mut self, lazy: LazyRef, end: usize) {
        let (owner, key) = self.lazy_binding(lazy);
        self.lazy_checkpoint(lazy);
        let range = self.lazy_data(lazy).cache.range();
        tracing::trace!(%key, from = range.end(), to = end, "set active range end");

        if end < range.start() {
            self.lazy_data_mut(lazy).cache.set_range_start(end);
            self.log_change(
                owner,
                NodeChange::RangeStart {
                    key: key.clone(),
                    old: range.start(),
                    new: end,
                },
            );
        }
        let evicted = self.lazy_data_mut(lazy).cache.set_range_end(end);
        self.release_evicted(lazy, owner, evicted);
        self.log_change(
            owner,
            NodeChange::RangeEnd {
                key: key.clone(),
                old: range.end(),
                new: end,
            },
        );
        self.after_range_change(lazy, owner, &key);
    }

    /// Trims the client range to the active range and schedules sending
    /// what the client is missing.
    fn after_range_change(&mut self, lazy: LazyRef, owner: NodeRef, key: &Key) {
        let data = self.lazy_data_mut(lazy);
        let active = data.cache.range();
        let client = data.client_range;
        if !client.is_empty() {
            let (front, back, kept) = match client.intersection(&active) {
                Some(kept) => (
                    kept.start() - client.start(),
                    client.end() - kept.end(),
                    kept,
                ),
                None => (client.len(), 0, IndexRange::empty_at(active.start())),
            };
            data.client_range = kept;
            for _ in 0..front {
                self.log_change(
                    owner,
                    NodeChange::ListRemove {
                        key: key.clone(),
                        index: 0,
                        value: None,
                    },
                );
            }
            for _ in 0..back {
                self.log_change(
                    owner,
                    NodeChange::ListRemove {
                        key: key.clone(),
                        index: kept.len(),
                        value: None,
                    },
                );
            }
        }
        self.queue_task(
            owner,
            TaskId::LazyData(lazy),
            TaskAction::SendPendingData(lazy),
        );
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    /// Returns the nodes for `[index, index + count)`, fetching what the
    /// cache lacks.
    pub(crate) fn lazy_get(&mut self, lazy: LazyRef, index: usize, count: usize) -> Vec<NodeRef> {
        if count == 0 {
            return Vec::new();
        }
        let (owner, key) = self.lazy_binding(lazy);
        self.register_read(owner, &key);

        let requested = IndexRange::with_length(index, count);
        let Some(available) = self.lazy_data(lazy).cache.available_data_range(requested) else {
            return self.fetch(lazy, index, count);
        };

        let mut result = Vec::with_capacity(count);
        if requested.starts_before(&available) {
            result.extend(self.lazy_get(
                lazy,
                requested.start(),
                available.start() - requested.start(),
            ));
        }
        result.extend(self.lazy_data(lazy).cache.get(available));
        if requested.ends_after(&available) {
            result.extend(self.lazy_get(
                lazy,
                available.end(),
                requested.end() - available.end(),
            ));
        }
        result
    }

    fn fetch(&mut self, lazy: LazyRef, index: usize, count: usize) -> Vec<NodeRef> {
        let (owner, key) = self.lazy_binding(lazy);
        let active = self.lazy_data(lazy).cache.range();
        let requested = IndexRange::with_length(index, count);
        if !active.covers(&requested) {
            fault(KernelFault::FetchOutsideActiveRange { requested, active });
        }
        tracing::debug!(%key, index, count, "fetching lazy list data");

        let Some(mut source) = self.lazy_data_mut(lazy).source.take() else {
            fault(KernelFault::ProviderReentered);
        };
        let nodes = source.fetch(self, index, count);
        self.lazy_data_mut(lazy).source = Some(source);

        if nodes.len() != count && self.settings.warn_on_provider_shortfall {
            tracing::warn!(
                %key,
                index,
                count,
                received = nodes.len(),
                "data provider returned fewer values than requested"
            );
        }

        self.lazy_checkpoint(lazy);
        for &node in &nodes {
            self.attach_child(owner, node);
        }
        self.lazy_data_mut(lazy).cache.set(index, nodes.iter().copied());
        nodes
    }

    /// Brings the client range up to the active range.
    ///
    /// The missing prefix and suffix are each sent as one insert-many
    /// change, indexed relative to the active range start.
    pub(crate) fn send_pending_data(&mut self, lazy: LazyRef) {
        let Some(data) = self.lazies.get(lazy) else {
            return;
        };
        if data.binding.is_none() || !data.attached {
            return;
        }
        let (owner, key) = self.lazy_binding(lazy);
        self.lazy_checkpoint(lazy);

        let data = self.lazy_data(lazy);
        let active = data.cache.range();
        let client = data.client_range;
        if active.starts_before(&client) {
            let end = if active.ends_before(&client) {
                active.end()
            } else {
                client.start()
            };
            self.send_data(lazy, owner, &key, active, IndexRange::between(active.start(), end));
        }
        if active.ends_after(&client) {
            let start = if active.starts_after(&client) {
                active.start()
            } else {
                client.end()
            };
            self.send_data(lazy, owner, &key, active, IndexRange::between(start, active.end()));
        }
        self.lazy_data_mut(lazy).client_range = active;
    }

    fn send_data(
        &mut self,
        lazy: LazyRef,
        owner: NodeRef,
        key: &Key,
        active: IndexRange,
        range: IndexRange,
    ) {
        if range.is_empty() {
            return;
        }
        let nodes = self.lazy_get(lazy, range.start(), range.len());
        tracing::debug!(%key, %range, sent = nodes.len(), "sending lazy list data");
        self.log_change(
            owner,
            NodeChange::ListInsertMany {
                key: key.clone(),
                index: range.start() - active.start(),
                values: nodes.into_iter().map(Value::Node).collect(),
            },
        );
    }
}

// ============================================================================
// Lazy List View
// ============================================================================

/// Handle for windowing a lazy list.
///
/// Every range setter adjusts the cache, detaches evicted items, logs the
/// range change and schedules sending pending data to the client.
#[derive(Debug)]
pub struct LazyList<'g> {
    graph: &'g mut StateGraph,
    lazy: LazyRef,
}

impl LazyList<'_> {
    pub fn handle(&self) -> LazyRef {
        self.lazy
    }

    pub fn is_bound(&self) -> bool {
        self.graph.lazy_data(self.lazy).binding.is_some()
    }

    /// Owning node and key.
    pub fn binding(&self) -> Option<(NodeRef, Key)> {
        self.graph.lazy_data(self.lazy).binding.clone()
    }

    pub fn active_range(&self) -> IndexRange {
        self.graph.lazy_data(self.lazy).cache.range()
    }

    pub fn active_range_start(&self) -> usize {
        self.active_range().start()
    }

    pub fn active_range_end(&self) -> usize {
        self.active_range().end()
    }

    pub fn client_range(&self) -> IndexRange {
        self.graph.lazy_data(self.lazy).client_range
    }

    /// Number of cached items.
    pub fn cached_len(&self) -> usize {
        self.graph.lazy_data(self.lazy).cache.len()
    }

    /// The cached node at an absolute index, without fetching.
    pub fn cached(&self, index: usize) -> Option<NodeRef> {
        self.graph.lazy_data(self.lazy).cache.item(index).copied()
    }

    /// Moves the start of the active range. A start past the end collapses
    /// the range.
    pub fn set_active_range_start(&mut self, start: usize) -> &mut Self {
        self.graph.set_active_range_start(self.lazy, start);
        self
    }

    /// Moves the end of the active range. An end before the start collapses
    /// the range.
    pub fn set_active_range_end(&mut self, end: usize) -> &mut Self {
        self.graph.set_active_range_end(self.lazy, end);
        self
    }

    /// Stops at `usize::MAX`.
    pub fn increase_active_range_start(&mut self, by: usize) -> &mut Self {
        let start = self.active_range_start().saturating_add(by);
        self.set_active_range_start(start)
    }

    /// Stops at index 0.
    pub fn decrease_active_range_start(&mut self, by: usize) -> &mut Self {
        let start = self.active_range_start().saturating_sub(by);
        self.set_active_range_start(start)
    }

    /// Stops at `usize::MAX`.
    pub fn increase_active_range_end(&mut self, by: usize) -> &mut Self {
        let end = self.active_range_end().saturating_add(by);
        self.set_active_range_end(end)
    }

    /// Stops at index 0.
    pub fn decrease_active_range_end(&mut self, by: usize) -> &mut Self {
        let end = self.active_range_end().saturating_sub(by);
        self.set_active_range_end(end)
    }

    /// Returns the nodes for `count` absolute indexes starting at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the span leaves the active range and is not cached.
    pub fn get(&mut self, index: usize, count: usize) -> Vec<NodeRef> {
        self.graph.lazy_get(self.lazy, index, count)
    }
}
