//! # stategraph: Transactional reactive state nodes
//!
//! `stategraph` keeps the server-side state of a UI as a tree of property
//! nodes. Application code mutates the tree inside transactions; every
//! commit produces a per-node change log for the diff layer and every
//! rollback restores the last committed state.
//!
//! ## Quick Start
//!
//! ```
//! use stategraph::Session;
//!
//! let session = Session::new();
//! session
//!     .transact(|graph, root| {
//!         let todo = graph.create_node();
//!         graph.put(todo, "title", "Write docs");
//!         graph.list(root, "todos").push(todo);
//!         Ok::<_, anyhow::Error>(())
//!     })
//!     .unwrap();
//!
//! let root = session.root();
//! let mut graph = session.lock();
//! assert_eq!(graph.list(root, "todos").len(), 1);
//! ```
//!
//! ## Crates
//!
//! - [`stategraph_types`]: node ids, keys, index ranges and value types
//! - [`stategraph_kernel`]: the state graph itself
//! - [`stategraph_config`]: configuration loading and tracing setup
//!
//! This crate adds [`Session`], the lock that serializes transactions
//! across threads.

mod session;

pub use session::{Session, SessionGuard};

pub use stategraph_config::{
    ConfigError, ConfigLoader, KernelConfig, LoggingConfig, StategraphConfig, init_tracing,
};
pub use stategraph_kernel::{
    ChangeListener, ChangeRecorder, ComputedProperties, ComputedProperty, DataProvider, Dependent,
    Derivation, IndexRange, KernelFault, KernelSettings, Key, LazyList, LazyRangeView, LazyRef,
    ListRef, ListView, ListenerId, MultiValued, NodeChange, NodeChangeVisitor, NodeId, NodeLayout,
    NodeMapper, NodeRef, PropertyMapper, ProviderFn, RpcInvocation, SERVER_ONLY, StateGraph,
    TaskId, TypeRegistry, Value, ValueType,
};
pub use stategraph_types::{Primitive, TypeShape};
