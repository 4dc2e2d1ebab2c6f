//! Slot-backed node tests.

use stategraph_types::Primitive;

use super::*;

struct CustomKey;

fn string_layout(graph: &StateGraph) -> Arc<NodeLayout> {
    let registry = graph.registry();
    registry.layout([("string", registry.primitive(Primitive::String))])
}

#[test]
fn slot_backed_node_declares_field_types() {
    let mut graph = graph();
    let registry = Arc::clone(graph.registry());
    let layout = registry.layout([
        (Key::name("string"), registry.primitive(Primitive::String)),
        (Key::of::<CustomKey>(), registry.primitive(Primitive::Integer)),
    ]);
    let node = graph.create_node_with_layout(layout);

    assert_eq!(graph.get_type(node, "string"), registry.primitive(Primitive::String));
    assert_eq!(
        graph.get_type(node, Key::of::<CustomKey>()),
        registry.primitive(Primitive::Integer)
    );
    assert!(graph.get_type(node, "genericKey").is_undefined());

    graph.put(node, "string", "My string");
    graph.put(node, Key::of::<CustomKey>(), 5);

    assert_eq!(graph.get(node, "string"), Some(Value::from("My string")));
    assert_eq!(graph.get(node, Key::of::<CustomKey>()), Some(Value::Int(5)));
}

#[test]
fn same_fields_share_one_layout() {
    let graph = graph();
    let registry = graph.registry();

    let first = registry.layout([("string", registry.primitive(Primitive::String))]);
    let second = string_layout(&graph);

    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
#[should_panic(expected = "does not match type")]
fn slot_backed_node_rejects_wrong_type() {
    let mut graph = graph();
    let layout = string_layout(&graph);
    let node = graph.create_node_with_layout(layout);

    graph.put(node, "string", 5);
}

#[test]
fn slot_backed_node_always_contains_known_keys() {
    let mut graph = graph();
    let layout = string_layout(&graph);
    let node = graph.create_node_with_layout(layout);

    assert!(graph.contains_key(node, "string"));
    assert!(!graph.contains_key(node, "someOtherKey"));
    assert_eq!(graph.get(node, "string"), Some(Value::Null));
    assert_eq!(graph.string_keys(node), vec!["string"]);
}

#[test]
#[should_panic(expected = "cannot be removed")]
fn slot_backed_node_refuses_known_key_removal() {
    let mut graph = graph();
    let layout = string_layout(&graph);
    let node = graph.create_node_with_layout(layout);

    graph.remove(node, "string");
}

#[test]
fn slot_backed_node_stores_unknown_keys_too() {
    let mut graph = graph();
    let layout = string_layout(&graph);
    let node = graph.create_node_with_layout(layout);

    graph.put(node, "extra", 3.5);
    assert_eq!(graph.get(node, "extra"), Some(Value::Double(3.5)));
    assert_eq!(graph.remove(node, "extra"), Some(Value::Double(3.5)));
    assert_eq!(graph.string_keys(node), vec!["string"]);
}

#[test]
fn challenging_keys_stay_distinct() {
    let mut graph = graph();
    let registry = Arc::clone(graph.registry());
    let string = registry.primitive(Primitive::String);
    let keys = vec![
        Key::name("id"),
        Key::name("parent"),
        Key::name("values"),
        Key::name("class"),
        Key::name("string"),
        Key::marker("string"),
        Key::of::<CustomKey>(),
    ];
    let layout = registry.layout(keys.iter().map(|key| (key.clone(), string.clone())));
    let node = graph.create_node_with_layout(layout);

    for (i, key) in keys.iter().enumerate() {
        graph.put(node, key, i.to_string());
    }
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(graph.get(node, key), Some(Value::Str(i.to_string())));
    }
}

#[test]
fn rollback_resets_known_keys() {
    let (mut graph, root) = graph_with_root();
    let layout = string_layout(&graph);
    let node = graph.create_node_with_layout(layout);
    graph.put(root, "node", node);
    graph.commit(root);

    graph.put(node, "string", "changed");
    graph.rollback(root);

    assert_eq!(graph.peek(node, "string"), Some(&Value::Null));
    assert!(graph.contains_key(node, "string"));
}
