//! Session tests: commit on success, rollback on error, and the lock faults.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    thread,
};

use stategraph::{
    KernelConfig, Key, NodeChangeVisitor, NodeId, NodeRef, Session, StateGraph, TypeRegistry,
    Value,
};

#[derive(Default, Clone)]
struct PutLog(Arc<Mutex<Vec<(Key, Value)>>>);

impl NodeChangeVisitor for PutLog {
    fn visit_put_change(&mut self, _: &StateGraph, _: NodeRef, key: &Key, value: &Value) {
        if let Ok(mut puts) = self.0.lock() {
            puts.push((key.clone(), value.clone()));
        }
    }
}

#[test]
fn successful_transaction_commits() {
    let session = Session::new();
    let log = PutLog::default();
    session.add_commit_visitor(log.clone());

    let child = session
        .transact(|graph, root| {
            let child = graph.create_node();
            graph.put(root, "child", child);
            graph.put(child, "title", "hello");
            Ok::<_, anyhow::Error>(child)
        })
        .unwrap();

    let root = session.root();
    let graph = session.lock();
    assert!(graph.dirty_nodes(root).is_empty());
    assert_eq!(graph.id(child), NodeId::new(2));
    assert_eq!(graph.peek(child, "title"), Some(&Value::from("hello")));
    assert!(
        log.0
            .lock()
            .unwrap()
            .contains(&(Key::name("title"), Value::from("hello")))
    );
}

#[test]
fn failed_transaction_rolls_back() {
    let session = Session::new();
    session
        .transact(|graph, root| {
            graph.put(root, "count", 1);
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();

    let result = session.transact(|graph, root| -> anyhow::Result<()> {
        graph.put(root, "count", 2);
        graph.put(root, "extra", true);
        anyhow::bail!("validation failed")
    });

    assert_eq!(result.unwrap_err().to_string(), "validation failed");
    let root = session.root();
    let mut graph = session.lock();
    assert_eq!(graph.peek(root, "count"), Some(&Value::Int(1)));
    assert!(!graph.contains_key(root, "extra"));
    assert!(graph.dirty_nodes(root).is_empty());
}

#[test]
fn config_sets_the_first_id() {
    let config = KernelConfig {
        first_node_id: 100,
        ..Default::default()
    };
    let session = Session::from_config(&config, Arc::new(TypeRegistry::new()));

    let root = session.root();
    assert_eq!(session.lock().id(root), NodeId::new(100));
}

#[test]
fn transactions_from_many_threads_serialize() {
    let session = Session::new();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..25 {
                    session
                        .transact(|graph, root| {
                            let count = graph.get_int_or(root, "count", 0);
                            graph.put(root, "count", count + 1);
                            Ok::<_, anyhow::Error>(())
                        })
                        .unwrap();
                }
            });
        }
    });

    let root = session.root();
    assert_eq!(session.lock().peek(root, "count"), Some(&Value::Int(100)));
}

#[test]
#[should_panic(expected = "already held by this thread")]
fn locking_twice_on_one_thread_faults() {
    let session = Session::new();
    let _guard = session.lock();
    let _again = session.lock();
}

#[test]
fn panicking_transaction_poisons_the_session() {
    let session = Session::new();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        session.transact(|graph, root| -> anyhow::Result<()> {
            graph.put(root, "half", "done");
            panic!("application bug");
        })
    }));
    assert!(outcome.is_err());
    assert!(session.is_poisoned());

    let relock = panic::catch_unwind(AssertUnwindSafe(|| {
        drop(session.lock());
    }));
    let message = relock.unwrap_err();
    let message = message
        .downcast_ref::<String>()
        .map(String::as_str)
        .unwrap_or_default();
    assert!(message.contains("session lock is poisoned"), "{message}");
}
