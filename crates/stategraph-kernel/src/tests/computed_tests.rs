//! Computed property tests: memoization, invalidation and rollback.

use super::*;

/// Attaches a fresh node under `root` with first and last names set.
fn person(graph: &mut StateGraph, root: NodeRef) -> NodeRef {
    let node = graph.create_node();
    graph.put(root, "person", node);
    graph.put(node, "first", "Ada");
    graph.put(node, "last", "Lovelace");
    node
}

/// A `full` property joining first and last name, counting derivations.
fn full_name(count: &Arc<AtomicUsize>) -> ComputedProperty {
    let count = Arc::clone(count);
    ComputedProperty::from_fn("full", move |graph, node| {
        count.fetch_add(1, Ordering::SeqCst);
        let first = graph.get_str_or(node, "first", "");
        let last = graph.get_str_or(node, "last", "");
        Value::Str(format!("{first} {last}"))
    })
}

fn computed(properties: impl IntoIterator<Item = ComputedProperty>) -> ComputedProperties {
    properties.into_iter().collect()
}

#[test]
fn computed_value_is_memoized_until_a_dependency_changes() {
    let (mut graph, root) = graph_with_root();
    let node = person(&mut graph, root);
    let (count, read) = counter();
    graph.set_computed_properties(node, computed([full_name(&count)]));

    graph.commit(root);
    assert_eq!(graph.peek(node, "full"), Some(&Value::from("Ada Lovelace")));
    assert_eq!(read(), 1);

    assert_eq!(graph.get(node, "full"), Some(Value::from("Ada Lovelace")));
    graph.put(node, "unrelated", true);
    graph.commit(root);
    assert_eq!(read(), 1);

    graph.put(node, "last", "Byron");
    let recorder = commit_recorded(&mut graph, root);

    assert_eq!(graph.get(node, "full"), Some(Value::from("Ada Byron")));
    assert_eq!(read(), 2);
    let full: Vec<&NodeChange> = recorder
        .changes_of(node)
        .into_iter()
        .filter(|change| change.key() == Some(&Key::name("full")))
        .collect();
    assert_eq!(
        full,
        vec![
            &NodeChange::Remove {
                key: Key::name("full"),
                value: Value::from("Ada Lovelace"),
            },
            &NodeChange::Put {
                key: Key::name("full"),
                value: Value::from("Ada Byron"),
            },
        ]
    );
}

#[test]
fn putting_the_same_value_keeps_the_memo() {
    let (mut graph, root) = graph_with_root();
    let node = person(&mut graph, root);
    let (count, read) = counter();
    graph.set_computed_properties(node, computed([full_name(&count)]));
    graph.commit(root);

    graph.put(node, "first", "Ada");
    graph.commit(root);

    assert_eq!(read(), 1);
}

#[test]
fn invalidation_propagates_through_computed_reads() {
    let (mut graph, root) = graph_with_root();
    let node = person(&mut graph, root);
    let (count, _) = counter();
    graph.set_computed_properties(
        node,
        computed([
            full_name(&count),
            ComputedProperty::from_fn("greeting", |graph, node| {
                let full = graph.get_str_or(node, "full", "");
                Value::Str(format!("Hello {full}"))
            }),
        ]),
    );
    graph.commit(root);
    assert_eq!(graph.peek(node, "greeting"), Some(&Value::from("Hello Ada Lovelace")));

    graph.put(node, "first", "Augusta");
    graph.commit(root);

    assert_eq!(
        graph.peek(node, "greeting"),
        Some(&Value::from("Hello Augusta Lovelace"))
    );
}

#[test]
fn built_in_derivations() {
    let (mut graph, root) = graph_with_root();
    let node = person(&mut graph, root);
    graph.set_computed_properties(
        node,
        computed([
            ComputedProperty::alias("name", "first"),
            ComputedProperty::concat("label", ["first", "last"]),
            ComputedProperty::path("city", ["address", "city"]),
        ]),
    );
    graph.commit(root);

    assert_eq!(graph.peek(node, "name"), Some(&Value::from("Ada")));
    assert_eq!(graph.peek(node, "label"), Some(&Value::from("AdaLovelace")));
    assert_eq!(graph.peek(node, "city"), Some(&Value::Null));

    let address = graph.create_node();
    graph.put(address, "city", "London");
    graph.put(node, "address", address);
    graph.commit(root);

    assert_eq!(graph.peek(node, "city"), Some(&Value::from("London")));
}

#[test]
fn computed_names_are_keys() {
    let mut graph = graph();
    let node = graph.create_node();
    graph.set_computed_properties(
        node,
        computed([ComputedProperty::alias("title", "name").with_client_expression("this.name")]),
    );

    assert!(graph.contains_key(node, "title"));
    assert!(graph.keys(node).contains(&Key::name("title")));
    let properties = graph.computed_properties(node).unwrap();
    assert_eq!(properties.len(), 1);
    assert_eq!(
        properties.get("title").and_then(ComputedProperty::client_expression),
        Some("this.name")
    );
}

#[test]
#[should_panic(expected = "cannot be written")]
fn computed_key_cannot_be_written() {
    let mut graph = graph();
    let node = graph.create_node();
    graph.set_computed_properties(node, computed([ComputedProperty::alias("title", "name")]));

    graph.put(node, "title", "manual");
}

#[test]
#[should_panic(expected = "cannot be removed")]
fn computed_key_cannot_be_removed() {
    let mut graph = graph();
    let node = graph.create_node();
    graph.set_computed_properties(node, computed([ComputedProperty::alias("title", "name")]));

    graph.remove(node, "title");
}

#[test]
#[should_panic(expected = "have already been set")]
fn computed_properties_are_set_once() {
    let mut graph = graph();
    let node = graph.create_node();
    graph.set_computed_properties(node, computed([ComputedProperty::alias("a", "x")]));
    graph.set_computed_properties(node, computed([ComputedProperty::alias("b", "y")]));
}

#[test]
#[should_panic(expected = "depends on itself")]
fn computed_cycle_faults() {
    let (mut graph, root) = graph_with_root();
    let node = graph.create_node();
    graph.put(root, "node", node);
    graph.set_computed_properties(
        node,
        computed([
            ComputedProperty::alias("a", "b"),
            ComputedProperty::alias("b", "a"),
        ]),
    );
    graph.commit(root);
}

#[test]
fn rollback_rederives_invalidated_properties() {
    let (mut graph, root) = graph_with_root();
    let node = person(&mut graph, root);
    let (count, read) = counter();
    graph.set_computed_properties(node, computed([full_name(&count)]));
    graph.commit(root);

    graph.put(node, "last", "Byron");
    graph.rollback(root);
    assert!(graph.is_dirty(node));

    graph.commit(root);
    assert_eq!(graph.peek(node, "full"), Some(&Value::from("Ada Lovelace")));
    assert_eq!(read(), 2);

    // The restored dependency still invalidates.
    graph.put(node, "last", "King");
    graph.commit(root);
    assert_eq!(graph.peek(node, "full"), Some(&Value::from("Ada King")));
}

#[test]
fn panicking_derivation_leaves_no_frame_behind() {
    let (mut graph, root) = graph_with_root();
    let node = person(&mut graph, root);
    let (count, read) = counter();
    graph.set_computed_properties(
        node,
        computed([ComputedProperty::from_fn("flaky", move |graph, node| {
            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first derivation fails");
            }
            graph.get(node, "first").unwrap_or_default()
        })]),
    );

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        graph.get(node, "flaky")
    }));
    assert!(caught.is_err());
    assert!(!graph.reactive.in_computation());

    assert_eq!(graph.get(node, "flaky"), Some(Value::from("Ada")));
    assert_eq!(read(), 2);
}

#[test]
fn property_invalidated_during_a_flush_stays_pending() {
    let (mut graph, root) = graph_with_root();
    let node = graph.create_node();
    graph.put(root, "node", node);
    // Flushed in name order: `a_rows` is derived before `b_count`
    // materializes the list it read.
    graph.set_computed_properties(
        node,
        computed([
            ComputedProperty::alias("a_rows", "rows"),
            ComputedProperty::from_fn("b_count", |graph, node| {
                Value::Int(graph.multi_valued(node, "rows").len() as i64)
            }),
        ]),
    );

    let recorder = commit_recorded(&mut graph, root);

    let list = graph.peek(node, "rows").and_then(Value::as_list).unwrap();
    assert_eq!(graph.peek(node, "a_rows"), Some(&Value::List(list)));
    assert_eq!(graph.peek(node, "b_count"), Some(&Value::Int(0)));
    assert!(recorder.changes_of(node).contains(&&NodeChange::Remove {
        key: Key::name("a_rows"),
        value: Value::Null,
    }));
    assert!(!graph.is_dirty(node));
}
