//! Materialized list tests.

use stategraph_types::Primitive;

use super::*;

fn string_list_node(graph: &mut StateGraph) -> NodeRef {
    let registry = Arc::clone(graph.registry());
    let names = registry.array_type(registry.primitive(Primitive::String));
    let ty = registry.object_type([("names", names), ("title", registry.primitive(Primitive::String))]);
    graph.create_typed_node(ty)
}

#[test]
fn add_multiple_items() {
    let mut graph = graph();
    let node = graph.create_node();

    let mut list = graph.list(node, "key");
    assert!(list.is_empty());
    list.push("first");
    list.push("second");
    list.add(0, "zeroth");

    assert_eq!(list.len(), 3);
    assert_eq!(list.get(0), Value::from("zeroth"));
    assert_eq!(list.get(2), Value::from("second"));
}

#[test]
fn same_key_gives_the_same_list() {
    let mut graph = graph();
    let node = graph.create_node();

    let first = graph.list(node, "key").handle();
    graph.list(node, "key").push("foo");
    let second = graph.list(node, "key").handle();

    assert_eq!(first, second);
    assert_eq!(graph.list_items(first), &[Value::from("foo")]);
}

#[test]
fn single_value_becomes_the_first_element() {
    let mut graph = graph();
    let node = graph.create_node();
    graph.put(node, "key", "existing");

    let mut list = graph.list(node, "key");
    list.push("added");

    assert_eq!(list.to_vec(), vec![Value::from("existing"), Value::from("added")]);
}

#[test]
fn replace_list_detaches_its_children() {
    let mut graph = graph();
    let node = graph.create_node();
    let child = graph.create_node();

    graph.list(node, "key").push(child);
    assert_eq!(graph.parent(child), Some(node));

    graph.put(node, "key", "foo");

    assert_eq!(graph.get(node, "key"), Some(Value::from("foo")));
    assert_eq!(graph.parent(child), None);
}

#[test]
#[should_panic(expected = "has been detached")]
fn detached_list_rejects_reads() {
    let mut graph = graph();
    let node = graph.create_node();
    let list = graph.list(node, "key").handle();
    graph.put(node, "key", "foo");

    graph.list_view(list).len();
}

#[test]
#[should_panic(expected = "has been detached")]
fn detached_list_rejects_writes() {
    let mut graph = graph();
    let node = graph.create_node();
    let list = graph.list(node, "key").handle();
    graph.remove(node, "key");

    graph.list_view(list).push("bar");
}

#[test]
fn remove_value_and_clear() {
    let mut graph = graph();
    let node = graph.create_node();
    let child = graph.create_node();

    let mut list = graph.list(node, "key");
    list.push("a");
    list.push(child);
    list.push("b");

    assert!(list.remove_value(&Value::Node(child)));
    assert!(!list.remove_value(&Value::from("missing")));
    assert_eq!(list.len(), 2);

    list.clear();
    assert!(list.is_empty());
    assert_eq!(graph.parent(child), None);
}

#[test]
fn set_swaps_children() {
    let mut graph = graph();
    let node = graph.create_node();
    let first = graph.create_node();
    let second = graph.create_node();

    let mut list = graph.list(node, "key");
    list.push(first);
    let old = list.set(0, second);

    assert_eq!(old, Value::Node(first));
    assert_eq!(graph.parent(first), None);
    assert_eq!(graph.parent(second), Some(node));
}

#[test]
#[should_panic(expected = "out of bounds")]
fn get_past_the_end_faults() {
    let mut graph = graph();
    let node = graph.create_node();

    let mut list = graph.list(node, "key");
    list.push("only");
    list.get(1);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn add_past_the_end_faults() {
    let mut graph = graph();
    let node = graph.create_node();

    graph.list(node, "key").add(1, "gap");
}

#[test]
#[should_panic(expected = "cannot be list values")]
fn lists_do_not_nest() {
    let mut graph = graph();
    let node = graph.create_node();
    let inner = graph.list(node, "inner").handle();

    graph.list(node, "outer").push(Value::List(inner));
}

#[test]
#[should_panic(expected = "created through multi_valued")]
fn lists_cannot_be_put() {
    let mut graph = graph();
    let node = graph.create_node();
    let list = graph.list(node, "first").handle();

    graph.put(node, "second", Value::List(list));
}

// ============================================================================
// Typed Lists
// ============================================================================

#[test]
fn typed_list_takes_the_member_type() {
    let mut graph = graph();
    let node = string_list_node(&mut graph);

    let mut list = graph.list(node, "names");
    list.push("Ada");

    assert_eq!(list.member_type().primitive(), Some(Primitive::String));
}

#[test]
#[should_panic(expected = "does not match type")]
fn typed_list_rejects_other_members() {
    let mut graph = graph();
    let node = string_list_node(&mut graph);

    graph.list(node, "names").push(42);
}

#[test]
#[should_panic(expected = "can't get multi-valued")]
fn scalar_typed_key_is_not_multi_valued() {
    let mut graph = graph();
    let node = string_list_node(&mut graph);

    graph.multi_valued(node, "title");
}

#[test]
fn list_reads_are_tracked_by_computed_properties() {
    let (mut graph, root) = graph_with_root();
    let node = graph.create_node();
    graph.put(root, "node", node);
    graph.set_computed_properties(
        node,
        [ComputedProperty::from_fn("size", |graph, node| {
            Value::from(graph.list(node, "items").len() as i64)
        })]
        .into_iter()
        .collect(),
    );
    graph.commit(root);
    assert_eq!(graph.peek(node, "size"), Some(&Value::Int(0)));

    graph.list(node, "items").push("one");
    graph.commit(root);

    assert_eq!(graph.peek(node, "size"), Some(&Value::Int(1)));
}
