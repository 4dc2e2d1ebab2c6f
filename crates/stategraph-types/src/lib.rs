//! # stategraph-types: Core types for `stategraph`
//!
//! This crate contains the leaf types shared across the state-node kernel:
//! - Node identity ([`NodeId`])
//! - Property keys ([`Key`], [`TypeKey`])
//! - Index windows ([`IndexRange`])
//! - Structural value types ([`ValueType`], [`Primitive`], [`TypeShape`])
//! - The process-wide interning registry ([`TypeRegistry`])
//! - Slot-backed node definitions ([`NodeLayout`])

use std::{
    any::TypeId,
    fmt::{self, Debug, Display},
};

use serde::{Serialize, Serializer};

mod layout;
mod value_type;

pub use layout::NodeLayout;
pub use value_type::{Primitive, TypeRegistry, TypeShape, ValueType};

// ============================================================================
// Node Identity
// ============================================================================

/// Identifier of a node inside the registry of its root.
///
/// - `0`: the node is not attached to any root.
/// - positive: the node is registered with its root under this id.
/// - negative: the node was registered as `-id` and has been released during
///   the transaction in flight. It gets the same id back if it is attached
///   again before commit, and is reconciled to `0` at commit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default,
)]
pub struct NodeId(i32);

impl NodeId {
    /// Id of a node that is not attached.
    pub const UNATTACHED: NodeId = NodeId(0);

    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns true if the node is currently registered with a root.
    pub fn is_attached(self) -> bool {
        self.0 > 0
    }

    /// Returns true if the node was released during the current transaction.
    pub fn is_released(self) -> bool {
        self.0 < 0
    }

    /// Returns the id a released node keeps while the transaction is open.
    ///
    /// # Panics
    ///
    /// Panics if the id is not attached.
    pub fn released(self) -> Self {
        assert!(self.is_attached(), "cannot release unattached id {self}");
        Self(-self.0)
    }

    /// Returns the id a released node gets back when registered again.
    pub fn restored(self) -> Self {
        Self(self.0.abs())
    }

    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for NodeId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<NodeId> for i32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

// ============================================================================
// Property Keys
// ============================================================================

/// A Rust type used as a namespacing key.
///
/// Created through [`Key::of`]. Two keys are equal when they were created
/// from the same type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

/// Key of a node property.
///
/// Only [`Key::Name`] keys are meant to be mirrored to a remote
/// representation. Markers and type keys are server-only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Plain string key.
    Name(String),
    /// Explicit server-only marker.
    Marker(&'static str),
    /// A type used as key.
    Type(TypeKey),
}

impl Key {
    pub fn name(name: impl Into<String>) -> Self {
        Key::Name(name.into())
    }

    pub const fn marker(marker: &'static str) -> Self {
        Key::Marker(marker)
    }

    /// Returns the key namespaced by the type `T`.
    pub fn of<T: 'static>() -> Self {
        Key::Type(TypeKey {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        })
    }

    /// Returns true if values under this key never cross the kernel boundary.
    pub fn is_server_only(&self) -> bool {
        !matches!(self, Key::Name(_))
    }

    /// Returns the string form of a [`Key::Name`] key.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Marker(_) | Key::Type(_) => None,
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name}"),
            Key::Marker(marker) => write!(f, "<{marker}>"),
            Key::Type(type_key) => write!(f, "<{}>", type_key.name),
        }
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Name(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Name(value)
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Key::Name(value.clone())
    }
}

impl From<&Key> for Key {
    fn from(value: &Key) -> Self {
        value.clone()
    }
}

// ============================================================================
// Index Ranges
// ============================================================================

/// Half-open index window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct IndexRange {
    start: usize,
    end: usize,
}

impl IndexRange {
    /// Creates the range `[start, end)`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn between(start: usize, end: usize) -> Self {
        assert!(start <= end, "range start {start} is past end {end}");
        Self { start, end }
    }

    /// Creates the range starting at `start` covering `len` indexes.
    pub fn with_length(start: usize, len: usize) -> Self {
        Self::between(start, start + len)
    }

    /// Creates an empty range positioned at `at`.
    pub fn empty_at(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    /// Returns true if `other` lies entirely within this range.
    pub fn covers(&self, other: &IndexRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns true if this range starts before `other` starts.
    pub fn starts_before(&self, other: &IndexRange) -> bool {
        self.start < other.start
    }

    /// Returns true if this range ends after `other` ends.
    pub fn ends_after(&self, other: &IndexRange) -> bool {
        self.end > other.end
    }

    /// Returns true if this range ends before `other` starts.
    pub fn ends_before(&self, other: &IndexRange) -> bool {
        self.end <= other.start
    }

    /// Returns true if this range starts after `other` ends.
    pub fn starts_after(&self, other: &IndexRange) -> bool {
        self.start >= other.end
    }

    /// Returns the overlap of both ranges, if any.
    pub fn intersection(&self, other: &IndexRange) -> Option<IndexRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(IndexRange { start, end })
    }
}

impl Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl From<IndexRange> for std::ops::Range<usize> {
    fn from(range: IndexRange) -> Self {
        range.start..range.end
    }
}
