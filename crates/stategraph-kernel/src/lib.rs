//! # stategraph-kernel: Transactional state-node kernel of `stategraph`
//!
//! The kernel keeps a tree of property nodes that application code mutates
//! inside transactions. Every mutation is logged per node; committing hands
//! the logs to visitors (the diff layer), rolling back replays them in
//! reverse.
//!
//! ## Key Principles
//!
//! - **Arena with handles**: nodes, lists and lazy lists live in one
//!   [`StateGraph`] and refer to each other through [`NodeRef`],
//!   [`ListRef`] and [`LazyRef`]
//! - **Single parent**: a node is owned by at most one parent; attaching it
//!   twice is a contract fault
//! - **Reversible**: every [`NodeChange`] has an inverse applied at rollback
//! - **Reactive**: computed properties memoize their value and are
//!   invalidated when a key they read is written
//!
//! ## Architecture
//!
//! - [`graph`]: The arena, node creation and garbage collection
//! - [`node`]: Reading and writing properties
//! - [`list`]: Materialized lists and list views
//! - [`lazy`]: Lazily fetched, windowed lists
//! - [`computed`]: Computed property declarations
//! - [`root`]: Id registry, dirty set and RPC queue
//! - [`transaction`]: Commit and rollback
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use stategraph_kernel::{ChangeRecorder, StateGraph, Value};
//! use stategraph_types::TypeRegistry;
//!
//! let mut graph = StateGraph::new(Arc::new(TypeRegistry::new()));
//! let root = graph.create_root();
//! let child = graph.create_node();
//! graph.put(root, "child", child);
//! graph.put(child, "a", "x");
//!
//! let mut recorder = ChangeRecorder::new();
//! graph.commit_with(root, &mut recorder);
//! assert_eq!(graph.peek(child, "a"), Some(&Value::from("x")));
//! ```

mod attach;
pub mod backing;
pub mod change;
pub mod computed;
pub mod error;
pub mod graph;
pub mod lazy;
pub mod list;
pub mod node;
pub mod range_cache;
pub mod reactive;
pub mod root;
pub mod transaction;
mod value;


pub use backing::{MapBacking, NodeBacking, SlotBacking};
pub use change::{ChangeRecorder, NodeChange, NodeChangeVisitor};
pub use computed::{ComputedProperties, ComputedProperty, Derivation};
pub use error::{KernelFault, fault};
pub use graph::{ChangeListener, KernelSettings, ListenerId, StateGraph};
pub use lazy::{DataProvider, LazyList, NodeMapper, PropertyMapper, ProviderFn};
pub use list::{LazyRangeView, ListView, MultiValued};
pub use node::SERVER_ONLY;
pub use reactive::Dependent;
pub use root::RpcInvocation;
pub use transaction::TaskId;
pub use value::{LazyRef, ListRef, NodeRef, Value};

// Re-export the leaf types callers need alongside the kernel.
pub use stategraph_types::{IndexRange, Key, NodeId, NodeLayout, TypeRegistry, ValueType};
