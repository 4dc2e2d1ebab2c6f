//! The state node contract: reading and writing node properties.

use stategraph_types::{Key, NodeId, Primitive, TypeShape, ValueType};

use crate::{
    LazyRef, NodeChange, NodeRef, StateGraph, Value,
    error::{KernelFault, fault},
    graph::AttachCallback,
};

/// Marker key that keeps a node and its subtree on the server.
pub const SERVER_ONLY: Key = Key::marker("server-only");

/// Returns true if `value` may be stored under a key of type `ty`.
pub(crate) fn accepts(ty: &ValueType, value: &Value) -> bool {
    match (ty.shape(), value) {
        (_, Value::Null)
        | (TypeShape::Primitive(Primitive::Undefined), _)
        | (TypeShape::Primitive(Primitive::Boolean), Value::Bool(_))
        | (TypeShape::Primitive(Primitive::Integer), Value::Int(_))
        | (TypeShape::Primitive(Primitive::Number), Value::Int(_) | Value::Double(_))
        | (TypeShape::Primitive(Primitive::String), Value::Str(_))
        | (TypeShape::Object(_), Value::Node(_))
        | (TypeShape::Array(_), Value::List(_) | Value::Lazy(_)) => true,
        _ => false,
    }
}

impl StateGraph {
    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the value under `key`.
    ///
    /// Computed keys yield their memoized value, deriving it on first
    /// access. Inside a derivation every read is recorded as a dependency.
    pub fn get(&mut self, node: NodeRef, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        if let Some(name) = self.node(node).computed_name(&key) {
            let name = name.to_string();
            return Some(self.computed_get(node, &name));
        }
        self.register_read(node, &key);
        self.node(node).backing.get(&key).cloned()
    }

    /// Returns the raw stored value without tracking or deriving anything.
    pub fn peek(&self, node: NodeRef, key: impl Into<Key>) -> Option<&Value> {
        let key = key.into();
        let data = self.node(node);
        if let Some(name) = data.computed_name(&key) {
            return data.computed_cache.get(name);
        }
        data.backing.get(&key)
    }

    pub fn contains_key(&mut self, node: NodeRef, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.node(node).computed_name(&key).is_some() {
            return true;
        }
        self.register_read(node, &key);
        self.node(node).backing.contains(&key)
    }

    /// Stored keys followed by the names of computed properties.
    pub fn keys(&self, node: NodeRef) -> Vec<Key> {
        let data = self.node(node);
        let mut keys = data.backing.keys();
        if let Some(computed) = &data.computed {
            keys.extend(computed.names().map(Key::name));
        }
        keys
    }

    /// The keys meant to be mirrored to a remote representation.
    pub fn string_keys(&self, node: NodeRef) -> Vec<String> {
        self.keys(node)
            .into_iter()
            .filter_map(|key| match key {
                Key::Name(name) => Some(name),
                Key::Marker(_) | Key::Type(_) => None,
            })
            .collect()
    }

    /// Type declared for `key` by the node's layout or object type.
    pub fn declared_type(&self, node: NodeRef, key: impl Into<Key>) -> Option<ValueType> {
        let key = key.into();
        let data = self.node(node);
        if let Some(ty) = data.backing.declared_type(&key) {
            return Some(ty.clone());
        }
        let name = key.as_name()?;
        data.value_type.as_ref()?.property_type(name).cloned()
    }

    /// Type of `key`, undefined when none is declared.
    pub fn get_type(&self, node: NodeRef, key: impl Into<Key>) -> ValueType {
        self.declared_type(node, key)
            .unwrap_or_else(|| self.registry().undefined())
    }

    pub fn value_type(&self, node: NodeRef) -> Option<&ValueType> {
        self.node(node).value_type.as_ref()
    }

    pub fn get_bool_or(&mut self, node: NodeRef, key: impl Into<Key>, default: bool) -> bool {
        self.get(node, key)
            .and_then(|value| value.as_bool())
            .unwrap_or(default)
    }

    pub fn get_int_or(&mut self, node: NodeRef, key: impl Into<Key>, default: i64) -> i64 {
        self.get(node, key)
            .and_then(|value| value.as_int())
            .unwrap_or(default)
    }

    pub fn get_double_or(&mut self, node: NodeRef, key: impl Into<Key>, default: f64) -> f64 {
        self.get(node, key)
            .and_then(|value| value.as_double())
            .unwrap_or(default)
    }

    pub fn get_str_or(&mut self, node: NodeRef, key: impl Into<Key>, default: &str) -> String {
        match self.get(node, key) {
            Some(Value::Str(s)) => s,
            _ => default.to_string(),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Stores `value` under `key`, returning the previous value.
    ///
    /// A previous child node, list or lazy list is detached and a new child
    /// node is attached. Putting a lazy list binds it to this node and key.
    pub fn put(
        &mut self,
        node: NodeRef,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(name) = self.node(node).computed_name(&key) {
            fault(KernelFault::ComputedKeyWrite(name.to_string()));
        }
        self.check_type(node, &key, &value);
        match value {
            Value::List(_) => fault(KernelFault::ListNotAssignable(key)),
            Value::Lazy(lazy) => {
                self.bind_lazy(node, key, lazy);
                return None;
            }
            _ => {}
        }

        let data = self.node_mut(node);
        let contained = data.backing.contains(&key);
        let previous = data.backing.set(key.clone(), value.clone());
        if contained {
            let old = previous.clone().unwrap_or_default();
            self.log_change(
                node,
                NodeChange::Remove {
                    key: key.clone(),
                    value: old.clone(),
                },
            );
            self.detach_value(node, &old);
        }
        self.log_change(
            node,
            NodeChange::Put {
                key: key.clone(),
                value: value.clone(),
            },
        );
        self.attach_value(node, &value);

        if !contained || previous.as_ref() != Some(&value) {
            self.register_write(node, &key);
        }
        previous
    }

    /// Removes the value under `key`, detaching it.
    pub fn remove(&mut self, node: NodeRef, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let data = self.node(node);
        if let Some(name) = data.computed_name(&key) {
            fault(KernelFault::ComputedKeyRemove(name.to_string()));
        }
        if data.backing.is_known(&key) {
            fault(KernelFault::KnownKeyRemoval(key));
        }
        if !data.backing.contains(&key) {
            return None;
        }

        self.register_write(node, &key);
        let removed = self.node_mut(node).backing.remove(&key)?;
        self.log_change(
            node,
            NodeChange::Remove {
                key,
                value: removed.clone(),
            },
        );
        self.detach_value(node, &removed);
        Some(removed)
    }

    fn check_type(&self, node: NodeRef, key: &Key, value: &Value) {
        if let Some(ty) = self.declared_type(node, key) {
            if !accepts(&ty, value) {
                fault(KernelFault::TypeMismatch {
                    key: key.clone(),
                    expected: ty.to_string(),
                    found: value.kind(),
                });
            }
        }
    }

    fn bind_lazy(&mut self, node: NodeRef, key: Key, lazy: LazyRef) {
        if self.node(node).backing.contains(&key) {
            fault(KernelFault::KeyExists(key));
        }
        self.lazy_data_mut(lazy).bind(node, key.clone());
        self.node_mut(node)
            .backing
            .set(key.clone(), Value::Lazy(lazy));
        self.log_change(
            node,
            NodeChange::Put {
                key: key.clone(),
                value: Value::Lazy(lazy),
            },
        );
        self.register_write(node, &key);
    }

    // ========================================================================
    // Structure
    // ========================================================================

    pub fn id(&self, node: NodeRef) -> NodeId {
        self.node(node).id
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.node(node).parent
    }

    pub fn root(&self, node: NodeRef) -> Option<NodeRef> {
        self.node(node).root
    }

    /// Returns true if `node` is registered with a root.
    pub fn is_attached(&self, node: NodeRef) -> bool {
        self.node(node).id.is_attached()
    }

    /// Returns true if `ancestor` is a strict ancestor of `node`.
    pub fn has_ancestor(&self, node: NodeRef, ancestor: NodeRef) -> bool {
        let mut current = self.node(node).parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.node(parent).parent;
        }
        false
    }

    /// Returns true if `node` or one of its ancestors carries
    /// [`SERVER_ONLY`].
    pub fn is_server_only(&self, node: NodeRef) -> bool {
        let mut current = Some(node);
        while let Some(next) = current {
            let data = self.node(next);
            if data.backing.contains(&SERVER_ONLY) {
                return true;
            }
            current = data.parent;
        }
        false
    }

    /// Runs `f` right away if `node` is attached, otherwise once it is.
    pub fn run_attached<F>(&mut self, node: NodeRef, f: F)
    where
        F: FnOnce(&mut StateGraph, NodeRef) + Send + 'static,
    {
        if self.is_attached(node) {
            f(self, node);
        } else {
            let callback: AttachCallback = Box::new(f);
            self.node_mut(node).run_on_attach.push(callback);
        }
    }
}
