//! Interned structural value types.
//!
//! Value types describe node properties and list members. Primitive types
//! are singletons created with the registry; object and array types are
//! deduplicated structurally, so two requests for the same structure return
//! the same handle. Handles compare by identity.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug, Display},
    hash::{Hash, Hasher},
    sync::{Arc, PoisonError, RwLock},
};

use crate::{Key, NodeLayout};

/// Primitive value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
    /// Anything goes.
    Undefined,
    Boolean,
    Integer,
    Number,
    String,
}

impl Primitive {
    const ALL: [Primitive; 5] = [
        Primitive::Undefined,
        Primitive::Boolean,
        Primitive::Integer,
        Primitive::Number,
        Primitive::String,
    ];

    fn name(self) -> &'static str {
        match self {
            Primitive::Undefined => "undefined",
            Primitive::Boolean => "boolean",
            Primitive::Integer => "integer",
            Primitive::Number => "number",
            Primitive::String => "string",
        }
    }
}

/// Structure of a value type.
#[derive(Debug, Clone)]
pub enum TypeShape {
    Primitive(Primitive),
    /// Object with typed properties.
    Object(BTreeMap<String, ValueType>),
    /// Array of a member type.
    Array(ValueType),
}

struct TypeDescriptor {
    id: u32,
    shape: TypeShape,
}

/// Handle to an interned value type.
#[derive(Clone)]
pub struct ValueType(Arc<TypeDescriptor>);

impl ValueType {
    /// Registry-unique id of this type.
    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn shape(&self) -> &TypeShape {
        &self.0.shape
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self.shape() {
            TypeShape::Primitive(primitive) => Some(*primitive),
            TypeShape::Object(_) | TypeShape::Array(_) => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.primitive() == Some(Primitive::Undefined)
    }

    /// Member type of an array type.
    pub fn member_type(&self) -> Option<&ValueType> {
        match self.shape() {
            TypeShape::Array(member) => Some(member),
            TypeShape::Primitive(_) | TypeShape::Object(_) => None,
        }
    }

    /// Property types of an object type.
    pub fn property_types(&self) -> Option<&BTreeMap<String, ValueType>> {
        match self.shape() {
            TypeShape::Object(properties) => Some(properties),
            TypeShape::Primitive(_) | TypeShape::Array(_) => None,
        }
    }

    pub fn property_type(&self, name: &str) -> Option<&ValueType> {
        self.property_types()?.get(name)
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ValueType {}

impl Hash for ValueType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape() {
            TypeShape::Primitive(primitive) => write!(f, "{}", primitive.name()),
            TypeShape::Object(properties) => {
                write!(f, "object{{")?;
                for (i, (name, ty)) in properties.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            TypeShape::Array(member) => write!(f, "array<{member}>"),
        }
    }
}

impl Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType#{}({self})", self.0.id)
    }
}

/// Structural identity of a composite type, expressed through the ids of
/// already interned members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ShapeKey {
    Object(Vec<(String, u32)>),
    Array(u32),
}

#[derive(Default)]
struct Interned {
    types: HashMap<ShapeKey, ValueType>,
    layouts: HashMap<Vec<(Key, u32)>, Arc<NodeLayout>>,
    next_id: u32,
}

/// Thread-safe interning registry for value types and node layouts.
///
/// Created once per process and shared through an `Arc` by every session
/// that needs type descriptors.
///
/// # Example
///
/// ```
/// use stategraph_types::{Primitive, TypeRegistry};
///
/// let registry = TypeRegistry::new();
/// let a = registry.array_type(registry.primitive(Primitive::String));
/// let b = registry.array_type(registry.primitive(Primitive::String));
/// assert_eq!(a, b);
/// ```
pub struct TypeRegistry {
    primitives: [ValueType; 5],
    interned: RwLock<Interned>,
}

impl TypeRegistry {
    /// Creates a registry with the primitive singletons pre-interned.
    pub fn new() -> Self {
        let primitives = Primitive::ALL.map(|primitive| {
            ValueType(Arc::new(TypeDescriptor {
                id: primitive as u32,
                shape: TypeShape::Primitive(primitive),
            }))
        });
        Self {
            primitives,
            interned: RwLock::new(Interned {
                next_id: Primitive::ALL.len() as u32,
                ..Interned::default()
            }),
        }
    }

    pub fn primitive(&self, primitive: Primitive) -> ValueType {
        self.primitives[primitive as usize].clone()
    }

    pub fn undefined(&self) -> ValueType {
        self.primitive(Primitive::Undefined)
    }

    /// Returns the interned object type with the given property types.
    pub fn object_type<I, S>(&self, properties: I) -> ValueType
    where
        I: IntoIterator<Item = (S, ValueType)>,
        S: Into<String>,
    {
        let properties: BTreeMap<String, ValueType> = properties
            .into_iter()
            .map(|(name, ty)| (name.into(), ty))
            .collect();
        let key = ShapeKey::Object(
            properties
                .iter()
                .map(|(name, ty)| (name.clone(), ty.id()))
                .collect(),
        );
        self.intern(key, || TypeShape::Object(properties))
    }

    /// Returns the interned array type with the given member type.
    pub fn array_type(&self, member: ValueType) -> ValueType {
        let key = ShapeKey::Array(member.id());
        self.intern(key, || TypeShape::Array(member))
    }

    /// Returns the interned layout for the given known fields.
    ///
    /// Field order does not matter; if a key appears twice the last type
    /// wins.
    pub fn layout<I, K>(&self, fields: I) -> Arc<NodeLayout>
    where
        I: IntoIterator<Item = (K, ValueType)>,
        K: Into<Key>,
    {
        let fields: BTreeMap<Key, ValueType> = fields
            .into_iter()
            .map(|(key, ty)| (key.into(), ty))
            .collect();
        let identity: Vec<(Key, u32)> = fields
            .iter()
            .map(|(key, ty)| (key.clone(), ty.id()))
            .collect();

        if let Some(layout) = self.read().layouts.get(&identity) {
            return Arc::clone(layout);
        }

        let mut interned = self.write();
        Arc::clone(
            interned
                .layouts
                .entry(identity)
                .or_insert_with(|| Arc::new(NodeLayout::new(fields.into_iter().collect()))),
        )
    }

    /// Number of interned composite types.
    pub fn composite_count(&self) -> usize {
        self.read().types.len()
    }

    fn intern(&self, key: ShapeKey, shape: impl FnOnce() -> TypeShape) -> ValueType {
        if let Some(ty) = self.read().types.get(&key) {
            return ty.clone();
        }

        let mut interned = self.write();
        if let Some(ty) = interned.types.get(&key) {
            return ty.clone();
        }
        let id = interned.next_id;
        interned.next_id += 1;
        let ty = ValueType(Arc::new(TypeDescriptor { id, shape: shape() }));
        interned.types.insert(key, ty.clone());
        ty
    }

    // Interning only ever inserts complete entries, so a poisoned lock still
    // guards consistent data.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Interned> {
        self.interned.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Interned> {
        self.interned.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("composites", &self.composite_count())
            .finish_non_exhaustive()
    }
}
