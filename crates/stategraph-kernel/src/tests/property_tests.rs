//! Property-based tests for the transaction and reactivity laws.

use proptest::prelude::*;

use super::*;
use crate::range_cache::SingleRangeCache;

const KEYS: [&str; 3] = ["a", "b", "items"];

#[derive(Debug, Clone)]
enum Op {
    Put(usize, i64),
    Remove(usize),
    AttachChild(usize),
    Push(i64),
    Insert(usize, i64),
    RemoveAt(usize),
    Set(usize, i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KEYS.len(), -5i64..5).prop_map(|(k, v)| Op::Put(k, v)),
        (0..KEYS.len()).prop_map(Op::Remove),
        (0..KEYS.len()).prop_map(Op::AttachChild),
        (-5i64..5).prop_map(Op::Push),
        (0usize..8, -5i64..5).prop_map(|(i, v)| Op::Insert(i, v)),
        (0usize..8).prop_map(Op::RemoveAt),
        (0usize..8, -5i64..5).prop_map(|(i, v)| Op::Set(i, v)),
    ]
}

fn apply(graph: &mut StateGraph, node: NodeRef, op: &Op) {
    match *op {
        Op::Put(k, v) => {
            graph.put(node, KEYS[k], v);
        }
        Op::Remove(k) => {
            graph.remove(node, KEYS[k]);
        }
        Op::AttachChild(k) => {
            let child = graph.create_node();
            graph.put(child, "value", k as i64);
            graph.put(node, KEYS[k], child);
        }
        Op::Push(v) => graph.list(node, "items").push(v),
        Op::Insert(i, v) => {
            let mut list = graph.list(node, "items");
            let len = list.len();
            list.add(i % (len + 1), v);
        }
        Op::RemoveAt(i) => {
            let mut list = graph.list(node, "items");
            let len = list.len();
            if len > 0 {
                list.remove(i % len);
            }
        }
        Op::Set(i, v) => {
            let mut list = graph.list(node, "items");
            let len = list.len();
            if len > 0 {
                list.set(i % len, v);
            }
        }
    }
}

/// One entry of a node: key, value, list contents and child placement.
type Entry = (Key, Value, Vec<Value>, Option<(Option<NodeRef>, NodeId)>);

/// Observable state of a node, with list contents expanded.
fn snapshot(graph: &StateGraph, node: NodeRef) -> Vec<Entry> {
    graph
        .keys(node)
        .into_iter()
        .map(|key| {
            let value = graph.peek(node, &key).cloned().unwrap_or_default();
            let items = match &value {
                Value::List(list) => graph.list_items(*list).to_vec(),
                _ => Vec::new(),
            };
            let child = value
                .as_node()
                .map(|child| (graph.parent(child), graph.id(child)));
            (key, value, items, child)
        })
        .collect()
}

proptest! {
    #[test]
    fn rollback_restores_the_committed_state(
        setup in prop::collection::vec(op(), 0..8),
        ops in prop::collection::vec(op(), 1..16),
    ) {
        let (mut graph, root) = graph_with_root();
        let node = graph.create_node();
        graph.put(root, "node", node);
        for op in &setup {
            apply(&mut graph, node, op);
        }
        graph.commit(root);
        let before = snapshot(&graph, node);
        let registered = graph.registered_count(root);

        for op in &ops {
            apply(&mut graph, node, op);
        }
        graph.rollback(root);

        prop_assert_eq!(snapshot(&graph, node), before);
        prop_assert_eq!(graph.registered_count(root), registered);
        prop_assert!(graph.dirty_nodes(root).is_empty());
        prop_assert!(graph.pending_changes(node).is_empty());
    }

    #[test]
    fn attach_then_detach_releases_every_id(parents in prop::collection::vec(0usize..16, 0..12)) {
        let (mut graph, root) = graph_with_root();
        let mut nodes = vec![graph.create_node()];
        for (i, parent) in parents.iter().enumerate() {
            let child = graph.create_node();
            let parent = nodes[parent % (i + 1)];
            graph.put(parent, format!("child{i}"), child);
            nodes.push(child);
        }

        graph.put(root, "tree", nodes[0]);
        prop_assert_eq!(graph.registered_count(root), nodes.len() + 1);
        prop_assert!(nodes.iter().all(|node| graph.is_attached(*node)));
        graph.commit(root);

        graph.remove(root, "tree");
        graph.commit(root);

        prop_assert_eq!(graph.registered_count(root), 1);
        prop_assert!(nodes.iter().all(|node| graph.id(*node) == NodeId::UNATTACHED));
    }

    #[test]
    fn computed_values_rederive_only_when_inputs_change(
        writes in prop::collection::vec((any::<bool>(), 0i64..3), 0..24),
    ) {
        let (mut graph, root) = graph_with_root();
        let node = graph.create_node();
        graph.put(root, "node", node);
        graph.put(node, "a", 0);
        let (count, read) = counter();
        let derivations = Arc::clone(&count);
        graph.set_computed_properties(
            node,
            [ComputedProperty::from_fn("double", move |graph, node| {
                derivations.fetch_add(1, Ordering::SeqCst);
                Value::from(graph.get_int_or(node, "a", 0) * 2)
            })]
            .into_iter()
            .collect(),
        );
        graph.commit(root);

        let mut expected = 1;
        let mut a = 0;
        for (to_a, value) in writes {
            if to_a {
                if value != a {
                    expected += 1;
                    a = value;
                }
                graph.put(node, "a", value);
            } else {
                graph.put(node, "b", value);
            }
            graph.commit(root);
            prop_assert_eq!(graph.peek(node, "double"), Some(&Value::Int(a * 2)));
        }
        prop_assert_eq!(read(), expected);
    }

    #[test]
    fn shrinking_a_cache_evicts_exactly_the_tail(len in 0usize..32, end in 0usize..32) {
        let end = end.min(len);
        let mut cache = SingleRangeCache::new();
        cache.set_range_end(len);
        cache.set(0, 0..len);

        let evicted: Vec<usize> = cache.set_range_end(end).into_iter().map(|(i, _)| i).collect();

        prop_assert_eq!(evicted, (end..len).collect::<Vec<_>>());
        prop_assert_eq!(cache.len(), end);
    }
}
