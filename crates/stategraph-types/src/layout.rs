//! Known-field layouts for slot-backed nodes.

use std::collections::BTreeMap;

use crate::{Key, ValueType};

/// The fixed set of known keys of a slot-backed node.
///
/// Each known key is mapped to a dedicated storage slot and a declared value
/// type. Layouts are interned by [`crate::TypeRegistry::layout`], so nodes
/// created from the same field set share one layout.
#[derive(Debug)]
pub struct NodeLayout {
    fields: Vec<(Key, ValueType)>,
    slots: BTreeMap<Key, usize>,
}

impl NodeLayout {
    pub(crate) fn new(fields: Vec<(Key, ValueType)>) -> Self {
        let slots = fields
            .iter()
            .enumerate()
            .map(|(slot, (key, _))| (key.clone(), slot))
            .collect();
        Self { fields, slots }
    }

    /// Returns the slot of a known key.
    pub fn slot(&self, key: &Key) -> Option<usize> {
        self.slots.get(key).copied()
    }

    pub fn key(&self, slot: usize) -> &Key {
        &self.fields[slot].0
    }

    pub fn field_type(&self, slot: usize) -> &ValueType {
        &self.fields[slot].1
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.fields.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{Key, Primitive, TypeRegistry};

    #[test]
    fn same_definition_same_layout() {
        let registry = TypeRegistry::new();
        let string = registry.primitive(Primitive::String);

        let a = registry.layout([("string", string.clone())]);
        let b = registry.layout([("string", string)]);

        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_keys_get_distinct_slots() {
        let registry = TypeRegistry::new();
        let string = registry.primitive(Primitive::String);

        let layout = registry.layout([
            (Key::name("string"), string.clone()),
            (Key::marker("string"), string),
        ]);

        assert_eq!(layout.len(), 2);
        let named = layout.slot(&Key::name("string")).unwrap();
        let marker = layout.slot(&Key::marker("string")).unwrap();
        assert_ne!(named, marker);
        assert_eq!(layout.key(named), &Key::name("string"));
        assert_eq!(layout.slot(&Key::name("other")), None);
    }
}
