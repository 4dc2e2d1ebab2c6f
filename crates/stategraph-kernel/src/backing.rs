//! Raw property storage behind a node.
//!
//! A backing only stores values. Logging, attachment and dependency
//! tracking happen in the graph, so every backing gets them for free.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use stategraph_types::{Key, NodeLayout, ValueType};

use crate::Value;

/// Storage strategy of a node.
pub trait NodeBacking: Send + Debug {
    fn get(&self, key: &Key) -> Option<&Value>;

    fn contains(&self, key: &Key) -> bool;

    /// Stores `value`, returning the previous value.
    fn set(&mut self, key: Key, value: Value) -> Option<Value>;

    /// Removes the value under `key`.
    ///
    /// Known keys of a fixed layout are reset instead of dropped.
    fn remove(&mut self, key: &Key) -> Option<Value>;

    fn keys(&self) -> Vec<Key>;

    fn values(&self) -> Vec<&Value>;

    /// Type declared for `key` by the storage layout, if any.
    fn declared_type(&self, _key: &Key) -> Option<&ValueType> {
        None
    }

    /// Returns true if `key` is part of a fixed layout and cannot be removed.
    fn is_known(&self, _key: &Key) -> bool {
        false
    }
}

/// Ordered map backing for free-form nodes.
#[derive(Debug, Default)]
pub struct MapBacking {
    values: BTreeMap<Key, Value>,
}

impl MapBacking {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeBacking for MapBacking {
    fn get(&self, key: &Key) -> Option<&Value> {
        self.values.get(key)
    }

    fn contains(&self, key: &Key) -> bool {
        self.values.contains_key(key)
    }

    fn set(&mut self, key: Key, value: Value) -> Option<Value> {
        self.values.insert(key, value)
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        self.values.remove(key)
    }

    fn keys(&self) -> Vec<Key> {
        self.values.keys().cloned().collect()
    }

    fn values(&self) -> Vec<&Value> {
        self.values.values().collect()
    }
}

/// Fixed-slot backing for nodes with a known field layout.
///
/// Known keys always exist (starting as [`Value::Null`]) and only accept
/// values of their declared type. Keys outside the layout go to an
/// extension map.
#[derive(Debug)]
pub struct SlotBacking {
    layout: Arc<NodeLayout>,
    slots: Vec<Value>,
    extension: BTreeMap<Key, Value>,
}

impl SlotBacking {
    pub fn new(layout: Arc<NodeLayout>) -> Self {
        let slots = vec![Value::Null; layout.len()];
        Self {
            layout,
            slots,
            extension: BTreeMap::new(),
        }
    }

    pub fn layout(&self) -> &Arc<NodeLayout> {
        &self.layout
    }
}

impl NodeBacking for SlotBacking {
    fn get(&self, key: &Key) -> Option<&Value> {
        match self.layout.slot(key) {
            Some(slot) => self.slots.get(slot),
            None => self.extension.get(key),
        }
    }

    fn contains(&self, key: &Key) -> bool {
        self.layout.slot(key).is_some() || self.extension.contains_key(key)
    }

    fn set(&mut self, key: Key, value: Value) -> Option<Value> {
        match self.layout.slot(&key) {
            Some(slot) => Some(std::mem::replace(&mut self.slots[slot], value)),
            None => self.extension.insert(key, value),
        }
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        match self.layout.slot(key) {
            Some(slot) => Some(std::mem::take(&mut self.slots[slot])),
            None => self.extension.remove(key),
        }
    }

    fn keys(&self) -> Vec<Key> {
        self.layout
            .keys()
            .chain(self.extension.keys())
            .cloned()
            .collect()
    }

    fn values(&self) -> Vec<&Value> {
        self.slots.iter().chain(self.extension.values()).collect()
    }

    fn declared_type(&self, key: &Key) -> Option<&ValueType> {
        self.layout.slot(key).map(|slot| self.layout.field_type(slot))
    }

    fn is_known(&self, key: &Key) -> bool {
        self.layout.slot(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use stategraph_types::{Primitive, TypeRegistry};

    use super::*;

    #[test]
    fn slot_backing_always_contains_known_keys() {
        let registry = TypeRegistry::new();
        let layout = registry.layout([("string", registry.primitive(Primitive::String))]);
        let mut backing = SlotBacking::new(layout);

        assert!(backing.contains(&Key::from("string")));
        assert_eq!(backing.get(&Key::from("string")), Some(&Value::Null));
        assert!(!backing.contains(&Key::from("extra")));

        backing.set(Key::from("extra"), Value::from(1));
        assert_eq!(
            backing.keys(),
            vec![Key::from("string"), Key::from("extra")]
        );

        backing.set(Key::from("string"), Value::from("foo"));
        assert_eq!(backing.remove(&Key::from("string")), Some(Value::from("foo")));
        assert!(backing.contains(&Key::from("string")));
    }

    #[test]
    fn map_backing_orders_keys() {
        let mut backing = MapBacking::new();
        backing.set(Key::from("b"), Value::from(2));
        backing.set(Key::from("a"), Value::from(1));
        assert_eq!(backing.keys(), vec![Key::from("a"), Key::from("b")]);
        assert_eq!(backing.remove(&Key::from("a")), Some(Value::from(1)));
        assert!(!backing.contains(&Key::from("a")));
    }
}
