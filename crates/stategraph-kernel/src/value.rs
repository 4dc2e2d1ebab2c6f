//! Arena handles and property values.

use serde::Serialize;
use slotmap::new_key_type;

new_key_type! {
    /// Handle to a node in a [`crate::StateGraph`].
    pub struct NodeRef;

    /// Handle to a materialized list owned by one node key.
    pub struct ListRef;

    /// Handle to a lazily fetched list.
    pub struct LazyRef;
}

/// Value stored under a node key.
///
/// `Node` values are owned children: storing one attaches the child to the
/// node. `List` and `Lazy` values are multi-valued backings and are only
/// created through [`crate::StateGraph::multi_valued`] and
/// [`crate::StateGraph::create_lazy_list`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Node(NodeRef),
    List(ListRef),
    Lazy(LazyRef),
}

impl Value {
    /// Short name of the value kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Double(_) => "number",
            Value::Str(_) => "string",
            Value::Node(_) => "node",
            Value::List(_) => "list",
            Value::Lazy(_) => "lazy list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a double; integers widen.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeRef> {
        match self {
            Value::Node(node) => Some(*node),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<ListRef> {
        match self {
            Value::List(list) => Some(*list),
            _ => None,
        }
    }

    pub fn as_lazy(&self) -> Option<LazyRef> {
        match self {
            Value::Lazy(lazy) => Some(*lazy),
            _ => None,
        }
    }

    /// Renders scalar values as text; node-like values render as empty.
    pub(crate) fn to_text(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Str(s) => s.clone(),
            Value::Null | Value::Node(_) | Value::List(_) | Value::Lazy(_) => String::new(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<NodeRef> for Value {
    fn from(value: NodeRef) -> Self {
        Value::Node(value)
    }
}

impl From<LazyRef> for Value {
    fn from(value: LazyRef) -> Self {
        Value::Lazy(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
