//! The session lock around a state graph.
//!
//! A [`StateGraph`] is single-writer: every mutation takes `&mut`. A
//! [`Session`] owns one graph with one root behind a mutex so that threads
//! take turns. Holding the lock is holding the transaction; [`Session::transact`]
//! closes it with a commit or a rollback.

use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

use stategraph_config::KernelConfig;
use stategraph_kernel::{
    KernelFault, KernelSettings, NodeChangeVisitor, NodeRef, StateGraph, TypeRegistry, fault,
};

const POISONED_HINT: &str = ". The graph may hold a half-applied transaction; \
     start a new session instead of reusing this one";

const REENTERED_HINT: &str = ". Use the graph handed to the running transaction \
     instead of locking the session again";

/// One state graph with a single root, shared between threads.
pub struct Session {
    graph: Mutex<StateGraph>,
    root: NodeRef,
    holder: Mutex<Option<ThreadId>>,
}

impl Session {
    /// Creates a session with default settings and a private type registry.
    pub fn new() -> Self {
        Self::with_settings(Arc::new(TypeRegistry::new()), KernelSettings::default())
    }

    /// Creates a session whose graph interns types in `registry`.
    pub fn with_settings(registry: Arc<TypeRegistry>, settings: KernelSettings) -> Self {
        let mut graph = StateGraph::with_settings(registry, settings);
        let root = graph.create_root();
        graph.commit(root);
        Self {
            graph: Mutex::new(graph),
            root,
            holder: Mutex::new(None),
        }
    }

    pub fn from_config(config: &KernelConfig, registry: Arc<TypeRegistry>) -> Self {
        Self::with_settings(registry, kernel_settings(config))
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// Acquires the session lock, blocking while another thread holds it.
    ///
    /// # Panics
    ///
    /// Faults if the lock was poisoned by a panicking transaction, or if the
    /// calling thread already holds it.
    pub fn lock(&self) -> SessionGuard<'_> {
        let current = thread::current().id();
        if *self.holder() == Some(current) {
            fault(KernelFault::SessionReentered {
                hint: REENTERED_HINT.to_string(),
            });
        }

        let graph = match self.graph.lock() {
            Ok(graph) => graph,
            Err(_) => fault(KernelFault::SessionPoisoned {
                hint: POISONED_HINT.to_string(),
            }),
        };
        *self.holder() = Some(current);

        SessionGuard {
            graph,
            holder: &self.holder,
        }
    }

    /// Runs `f` inside a transaction on the session root.
    ///
    /// The transaction is committed when `f` returns `Ok` and rolled back
    /// when it returns `Err`. A panic inside `f` poisons the session.
    pub fn transact<T, E>(
        &self,
        f: impl FnOnce(&mut StateGraph, NodeRef) -> Result<T, E>,
    ) -> Result<T, E> {
        let root = self.root;
        let mut graph = self.lock();
        match f(&mut graph, root) {
            Ok(value) => {
                graph.commit(root);
                Ok(value)
            }
            Err(error) => {
                graph.rollback(root);
                tracing::debug!("session transaction failed, rolled back");
                Err(error)
            }
        }
    }

    /// Registers a visitor that sees the changes of every commit.
    pub fn add_commit_visitor(&self, visitor: impl NodeChangeVisitor + Send + 'static) {
        let root = self.root;
        self.lock().add_commit_visitor(root, Box::new(visitor));
    }

    /// Returns true if a transaction panicked while holding the lock.
    pub fn is_poisoned(&self) -> bool {
        self.graph.is_poisoned()
    }

    fn holder(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the graph of a [`Session`].
pub struct SessionGuard<'s> {
    graph: MutexGuard<'s, StateGraph>,
    holder: &'s Mutex<Option<ThreadId>>,
}

impl Deref for SessionGuard<'_> {
    type Target = StateGraph;

    fn deref(&self) -> &StateGraph {
        &self.graph
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut StateGraph {
        &mut self.graph
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn kernel_settings(config: &KernelConfig) -> KernelSettings {
    KernelSettings {
        max_settle_rounds: config.max_settle_rounds,
        first_node_id: config.first_node_id,
        warn_on_provider_shortfall: config.warn_on_provider_shortfall,
    }
}
