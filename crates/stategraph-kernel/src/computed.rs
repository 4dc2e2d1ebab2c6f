//! Computed property declarations.
//!
//! A [`ComputedProperty`] is a named, stateless derivation of a value from
//! a node. Declarations are shared by every node they are bound to; the
//! memoized values live in each node.

use std::{collections::BTreeMap, fmt, sync::Arc};

use stategraph_types::Key;

use crate::{NodeRef, StateGraph, Value};

/// Derives a value from a node.
///
/// Implementations read the graph through [`StateGraph::get`] and friends so
/// that every key they read is tracked as a dependency.
pub trait Derivation: Send + Sync {
    fn derive(&self, graph: &mut StateGraph, node: NodeRef) -> Value;
}

/// Derivation backed by a closure.
pub struct FnDerivation<F>(F);

impl<F> Derivation for FnDerivation<F>
where
    F: Fn(&mut StateGraph, NodeRef) -> Value + Send + Sync,
{
    fn derive(&self, graph: &mut StateGraph, node: NodeRef) -> Value {
        (self.0)(graph, node)
    }
}

/// The value of another key of the same node.
#[derive(Debug, Clone)]
pub struct Alias(pub Key);

impl Derivation for Alias {
    fn derive(&self, graph: &mut StateGraph, node: NodeRef) -> Value {
        graph.get(node, &self.0).unwrap_or_default()
    }
}

/// A value reached by walking child nodes.
///
/// Every key but the last must hold a child node; a missing link yields
/// [`Value::Null`].
#[derive(Debug, Clone)]
pub struct PropertyPath(pub Vec<Key>);

impl Derivation for PropertyPath {
    fn derive(&self, graph: &mut StateGraph, node: NodeRef) -> Value {
        let Some((last, links)) = self.0.split_last() else {
            return Value::Null;
        };
        let mut current = node;
        for key in links {
            match graph.get(current, key) {
                Some(Value::Node(child)) => current = child,
                _ => return Value::Null,
            }
        }
        graph.get(current, last).unwrap_or_default()
    }
}

/// String concatenation of the scalar values of several keys.
#[derive(Debug, Clone)]
pub struct Concat(pub Vec<Key>);

impl Derivation for Concat {
    fn derive(&self, graph: &mut StateGraph, node: NodeRef) -> Value {
        let text: String = self
            .0
            .iter()
            .map(|key| graph.get(node, key).map(|v| v.to_text()).unwrap_or_default())
            .collect();
        Value::Str(text)
    }
}

/// A named derivation with an optional client-side expression.
#[derive(Clone)]
pub struct ComputedProperty {
    name: String,
    client_expression: Option<String>,
    derivation: Arc<dyn Derivation>,
}

impl ComputedProperty {
    pub fn new(name: impl Into<String>, derivation: impl Derivation + 'static) -> Self {
        Self {
            name: name.into(),
            client_expression: None,
            derivation: Arc::new(derivation),
        }
    }

    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut StateGraph, NodeRef) -> Value + Send + Sync + 'static,
    {
        Self::new(name, FnDerivation(f))
    }

    pub fn alias(name: impl Into<String>, key: impl Into<Key>) -> Self {
        Self::new(name, Alias(key.into()))
    }

    pub fn path<I, K>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self::new(name, PropertyPath(keys.into_iter().map(Into::into).collect()))
    }

    pub fn concat<I, K>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self::new(name, Concat(keys.into_iter().map(Into::into).collect()))
    }

    /// Attaches an expression the client can evaluate on its own.
    #[must_use]
    pub fn with_client_expression(mut self, expression: impl Into<String>) -> Self {
        self.client_expression = Some(expression.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_expression(&self) -> Option<&str> {
        self.client_expression.as_deref()
    }

    pub(crate) fn compute(&self, graph: &mut StateGraph, node: NodeRef) -> Value {
        self.derivation.derive(graph, node)
    }
}

impl fmt::Debug for ComputedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedProperty")
            .field("name", &self.name)
            .field("client_expression", &self.client_expression)
            .finish_non_exhaustive()
    }
}

/// The set of computed properties bound to a node, by name.
#[derive(Debug, Clone, Default)]
pub struct ComputedProperties(Arc<BTreeMap<String, ComputedProperty>>);

impl ComputedProperties {
    pub fn get(&self, name: &str) -> Option<&ComputedProperty> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns the declaration behind `key`, if it names one.
    pub fn for_key(&self, key: &Key) -> Option<&ComputedProperty> {
        key.as_name().and_then(|name| self.get(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComputedProperty> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ComputedProperty> for ComputedProperties {
    fn from_iter<I: IntoIterator<Item = ComputedProperty>>(iter: I) -> Self {
        Self(Arc::new(
            iter.into_iter()
                .map(|property| (property.name.clone(), property))
                .collect(),
        ))
    }
}
