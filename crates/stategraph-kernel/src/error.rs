//! Contract faults raised by the kernel.
//!
//! The kernel has no recoverable error path: every [`KernelFault`] is a
//! programmer-contract violation. Faults are logged and then raised as a
//! panic carrying the fault's message; the caller is expected to abandon the
//! transaction and roll back.

use stategraph_types::{IndexRange, Key};

use crate::NodeRef;

/// Contract violations detected by the kernel.
#[derive(thiserror::Error, Debug)]
pub enum KernelFault {
    #[error("node {child:?} already has parent {parent:?}")]
    AlreadyAttached { child: NodeRef, parent: NodeRef },

    #[error("attaching node {child:?} under {parent:?} would create a cycle")]
    AttachCycle { child: NodeRef, parent: NodeRef },

    #[error("node {0:?} already belongs to another root")]
    ForeignRoot(NodeRef),

    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { child: NodeRef, parent: NodeRef },

    #[error("computed properties have already been set for node {0:?}")]
    ComputedAlreadySet(NodeRef),

    #[error("computed property '{0}' cannot be written")]
    ComputedKeyWrite(String),

    #[error("computed property '{0}' cannot be removed")]
    ComputedKeyRemove(String),

    #[error("computed property '{0}' depends on itself")]
    ComputedCycle(String),

    #[error("known key {0} of a slot-backed node cannot be removed")]
    KnownKeyRemoval(Key),

    #[error("value of kind {found} does not match type {expected} declared for key {key}")]
    TypeMismatch {
        key: Key,
        expected: String,
        found: &'static str,
    },

    #[error("can't get multi-valued for {key} which is typed as {declared}")]
    NotMultiValued { key: Key, declared: String },

    #[error("key {0} holds a lazy list, which has no mutable list view")]
    LazyListView(Key),

    #[error("list for key {0} has been detached")]
    ListDetached(Key),

    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("list values for key {0} are created through multi_valued, not put")]
    ListNotAssignable(Key),

    #[error("list elements cannot be list values")]
    NestedList,

    #[error("key {0} already has a value")]
    KeyExists(Key),

    #[error("lazy list is already bound to node {node:?} key {key}")]
    LazyAlreadyBound { node: NodeRef, key: Key },

    #[error("lazy list is not bound to a node")]
    LazyUnbound,

    #[error("lazy list for key {0} has been detached")]
    LazyDetached(Key),

    #[error("tried to fetch {requested} when active range is {active}")]
    FetchOutsideActiveRange {
        requested: IndexRange,
        active: IndexRange,
    },

    #[error("lazy list data source re-entered while fetching")]
    ProviderReentered,

    #[error("node {0:?} is not a root")]
    NotARoot(NodeRef),

    #[error("commit did not settle after {0} rounds, change listeners keep producing changes")]
    SettleLimit(usize),

    #[error("stale {0} handle")]
    StaleHandle(&'static str),

    #[error(
        "session lock is poisoned: a previous transaction panicked while holding it{hint}"
    )]
    SessionPoisoned { hint: String },

    #[error("session lock is already held by this thread{hint}")]
    SessionReentered { hint: String },
}

/// Logs `fault` and raises it as a panic.
#[track_caller]
#[cold]
pub fn fault(fault: KernelFault) -> ! {
    tracing::error!(%fault, "kernel contract violation");
    panic!("{fault}");
}
