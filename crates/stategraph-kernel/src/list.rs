//! Materialized lists.
//!
//! A list belongs to exactly one node key and owns the child nodes it
//! contains. Replacing or removing the owning key detaches the list; a
//! detached list rejects every access until the detach is rolled back.

use stategraph_types::{IndexRange, Key, ValueType};

use crate::{
    LazyRef, ListRef, NodeChange, NodeRef, StateGraph, Value,
    error::{KernelFault, fault},
    node::accepts,
};

#[derive(Debug)]
pub(crate) struct ListData {
    pub(crate) owner: NodeRef,
    pub(crate) key: Key,
    pub(crate) member_type: ValueType,
    pub(crate) items: Vec<Value>,
    pub(crate) attached: bool,
}

/// A multi-valued property.
#[derive(Debug)]
pub enum MultiValued<'g> {
    List(ListView<'g>),
    /// A lazy list, seen through its active range.
    Lazy(LazyRangeView<'g>),
}

impl<'g> MultiValued<'g> {
    pub fn len(&mut self) -> usize {
        match self {
            MultiValued::List(list) => list.len(),
            MultiValued::Lazy(lazy) => lazy.len(),
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Returns the list view, faulting if the property is a lazy list.
    pub fn into_list(self) -> ListView<'g> {
        match self {
            MultiValued::List(list) => list,
            MultiValued::Lazy(lazy) => {
                let key = lazy.key();
                fault(KernelFault::LazyListView(key))
            }
        }
    }
}

impl StateGraph {
    /// Returns the multi-valued view of `key`, materializing a list if the
    /// key holds none yet.
    ///
    /// A plain value already stored under the key becomes the first list
    /// element. The member type comes from the declared type of the key,
    /// which must be an array type when present.
    pub fn multi_valued(&mut self, node: NodeRef, key: impl Into<Key>) -> MultiValued<'_> {
        let key = key.into();
        self.register_read(node, &key);
        let current = self.node(node).backing.get(&key).cloned();
        match current {
            Some(Value::List(list)) => MultiValued::List(ListView { graph: self, list }),
            Some(Value::Lazy(lazy)) => MultiValued::Lazy(LazyRangeView { graph: self, lazy }),
            _ => {
                let list = self.materialize_list(node, key);
                MultiValued::List(ListView { graph: self, list })
            }
        }
    }

    /// Shorthand for [`StateGraph::multi_valued`] on keys that hold a
    /// materialized list.
    pub fn list(&mut self, node: NodeRef, key: impl Into<Key>) -> ListView<'_> {
        self.multi_valued(node, key).into_list()
    }

    /// Opens an existing list by handle.
    pub fn list_view(&mut self, list: ListRef) -> ListView<'_> {
        self.list_data(list);
        ListView { graph: self, list }
    }

    /// Elements of a list without tracking, for visitors.
    pub fn list_items(&self, list: ListRef) -> &[Value] {
        &self.list_data(list).items
    }

    fn materialize_list(&mut self, node: NodeRef, key: Key) -> ListRef {
        let member_type = match self.declared_type(node, &key) {
            None => self.registry().undefined(),
            Some(ty) if ty.is_undefined() => ty,
            Some(ty) => match ty.member_type() {
                Some(member) => member.clone(),
                None => fault(KernelFault::NotMultiValued {
                    key,
                    declared: ty.to_string(),
                }),
            },
        };

        let data = self.node(node);
        let existing = if data.backing.contains(&key) {
            data.backing.get(&key).cloned()
        } else {
            None
        };
        let mut items = Vec::new();
        if let Some(value) = &existing {
            if !value.is_null() {
                if !accepts(&member_type, value) {
                    fault(KernelFault::TypeMismatch {
                        key,
                        expected: member_type.to_string(),
                        found: value.kind(),
                    });
                }
                items.push(value.clone());
            }
        }

        let list = self.lists.insert(ListData {
            owner: node,
            key: key.clone(),
            member_type,
            items,
            attached: true,
        });
        self.node_mut(node)
            .backing
            .set(key.clone(), Value::List(list));
        if let Some(value) = existing {
            self.log_change(
                node,
                NodeChange::Remove {
                    key: key.clone(),
                    value,
                },
            );
        }
        self.log_change(
            node,
            NodeChange::Put {
                key: key.clone(),
                value: Value::List(list),
            },
        );
        self.register_write(node, &key);
        list
    }

    pub(crate) fn list_data(&self, list: ListRef) -> &ListData {
        match self.lists.get(list) {
            Some(data) => data,
            None => fault(KernelFault::StaleHandle("list")),
        }
    }

    fn attached_list(&self, list: ListRef) -> &ListData {
        let data = self.list_data(list);
        if !data.attached {
            fault(KernelFault::ListDetached(data.key.clone()));
        }
        data
    }

    fn attached_list_mut(&mut self, list: ListRef) -> &mut ListData {
        let data = match self.lists.get_mut(list) {
            Some(data) => data,
            None => fault(KernelFault::StaleHandle("list")),
        };
        if !data.attached {
            fault(KernelFault::ListDetached(data.key.clone()));
        }
        data
    }

    /// The list stored under `key`, regardless of attachment.
    pub(crate) fn raw_list_mut(&mut self, node: NodeRef, key: &Key) -> Option<&mut ListData> {
        let list = self.node(node).backing.get(key).and_then(Value::as_list)?;
        self.lists.get_mut(list)
    }

    pub(crate) fn detach_list(&mut self, owner: NodeRef, list: ListRef) {
        let items = self.list_data(list).items.clone();
        for item in &items {
            self.detach_value(owner, item);
        }
        if let Some(data) = self.lists.get_mut(list) {
            data.attached = false;
        }
    }

    fn check_member(&self, list: ListRef, value: &Value) {
        if matches!(value, Value::List(_) | Value::Lazy(_)) {
            fault(KernelFault::NestedList);
        }
        let data = self.list_data(list);
        if !accepts(&data.member_type, value) {
            fault(KernelFault::TypeMismatch {
                key: data.key.clone(),
                expected: data.member_type.to_string(),
                found: value.kind(),
            });
        }
    }

    fn list_insert(&mut self, list: ListRef, index: usize, value: Value) {
        self.check_member(list, &value);
        let data = self.attached_list_mut(list);
        if index > data.items.len() {
            fault(KernelFault::IndexOutOfBounds {
                index,
                len: data.items.len(),
            });
        }
        data.items.insert(index, value.clone());
        let (owner, key) = (data.owner, data.key.clone());
        self.log_change(
            owner,
            NodeChange::ListInsert {
                key: key.clone(),
                index,
                value: value.clone(),
            },
        );
        self.attach_value(owner, &value);
        self.register_write(owner, &key);
    }

    fn list_remove(&mut self, list: ListRef, index: usize) -> Value {
        let data = self.attached_list_mut(list);
        if index >= data.items.len() {
            fault(KernelFault::IndexOutOfBounds {
                index,
                len: data.items.len(),
            });
        }
        let removed = data.items.remove(index);
        let (owner, key) = (data.owner, data.key.clone());
        self.log_change(
            owner,
            NodeChange::ListRemove {
                key: key.clone(),
                index,
                value: Some(removed.clone()),
            },
        );
        self.detach_value(owner, &removed);
        self.register_write(owner, &key);
        removed
    }

    fn list_set(&mut self, list: ListRef, index: usize, value: Value) -> Value {
        self.check_member(list, &value);
        let data = self.attached_list_mut(list);
        if index >= data.items.len() {
            fault(KernelFault::IndexOutOfBounds {
                index,
                len: data.items.len(),
            });
        }
        let old = std::mem::replace(&mut data.items[index], value.clone());
        let (owner, key) = (data.owner, data.key.clone());
        self.log_change(
            owner,
            NodeChange::ListReplace {
                key: key.clone(),
                index,
                old: old.clone(),
                new: value.clone(),
            },
        );
        self.detach_value(owner, &old);
        self.attach_value(owner, &value);
        self.register_write(owner, &key);
        old
    }

    fn list_read(&mut self, list: ListRef) -> &ListData {
        let (owner, key) = {
            let data = self.attached_list(list);
            (data.owner, data.key.clone())
        };
        self.register_read(owner, &key);
        self.list_data(list)
    }
}

// ============================================================================
// List View
// ============================================================================

/// Mutable view of a materialized list.
#[derive(Debug)]
pub struct ListView<'g> {
    graph: &'g mut StateGraph,
    list: ListRef,
}

impl ListView<'_> {
    pub fn handle(&self) -> ListRef {
        self.list
    }

    pub fn owner(&self) -> NodeRef {
        self.graph.list_data(self.list).owner
    }

    pub fn member_type(&self) -> ValueType {
        self.graph.list_data(self.list).member_type.clone()
    }

    pub fn len(&mut self) -> usize {
        self.graph.list_read(self.list).items.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    pub fn get(&mut self, index: usize) -> Value {
        let items = &self.graph.list_read(self.list).items;
        match items.get(index) {
            Some(value) => value.clone(),
            None => fault(KernelFault::IndexOutOfBounds {
                index,
                len: items.len(),
            }),
        }
    }

    pub fn to_vec(&mut self) -> Vec<Value> {
        self.graph.list_read(self.list).items.clone()
    }

    /// Inserts `value` at `index`, attaching it to the owner.
    pub fn add(&mut self, index: usize, value: impl Into<Value>) {
        self.graph.list_insert(self.list, index, value.into());
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        let len = self.graph.attached_list(self.list).items.len();
        self.graph.list_insert(self.list, len, value.into());
    }

    /// Removes the element at `index`, detaching it.
    pub fn remove(&mut self, index: usize) -> Value {
        self.graph.list_remove(self.list, index)
    }

    /// Removes the first element equal to `value`.
    pub fn remove_value(&mut self, value: &Value) -> bool {
        let position = self
            .graph
            .attached_list(self.list)
            .items
            .iter()
            .position(|item| item == value);
        match position {
            Some(index) => {
                self.graph.list_remove(self.list, index);
                true
            }
            None => false,
        }
    }

    /// Replaces the element at `index`, returning the old one.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Value {
        self.graph.list_set(self.list, index, value.into())
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        while !self.graph.attached_list(self.list).items.is_empty() {
            let last = self.graph.list_data(self.list).items.len() - 1;
            self.graph.list_remove(self.list, last);
        }
    }
}

// ============================================================================
// Lazy Range View
// ============================================================================

/// Read-only list view of a lazy list's active range.
///
/// Index `0` is the first index of the active range.
#[derive(Debug)]
pub struct LazyRangeView<'g> {
    pub(crate) graph: &'g mut StateGraph,
    pub(crate) lazy: LazyRef,
}

impl LazyRangeView<'_> {
    pub fn handle(&self) -> LazyRef {
        self.lazy
    }

    pub fn active_range(&self) -> IndexRange {
        self.graph.lazy_data(self.lazy).cache.range()
    }

    pub fn len(&self) -> usize {
        self.active_range().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the node at `index` of the active range, fetching it if
    /// needed. A provider shortfall leaves the index empty.
    pub fn get(&mut self, index: usize) -> Option<NodeRef> {
        let range = self.active_range();
        if index >= range.len() {
            fault(KernelFault::IndexOutOfBounds {
                index,
                len: range.len(),
            });
        }
        self.graph
            .lazy_get(self.lazy, range.start() + index, 1)
            .into_iter()
            .next()
    }

    pub fn to_vec(&mut self) -> Vec<NodeRef> {
        let range = self.active_range();
        self.graph.lazy_get(self.lazy, range.start(), range.len())
    }

    fn key(&self) -> Key {
        self.graph
            .lazy_data(self.lazy)
            .binding
            .as_ref()
            .map_or_else(|| Key::name(""), |(_, key)| key.clone())
    }
}
