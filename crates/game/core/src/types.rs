//! Canonical type descriptors.
//!
//! Content packs declare field and parameter types as type blocks; the
//! registry resolves those blocks into the closed descriptor tree below.
//! Descriptors drive both the static validator and the runtime re-checks at
//! mutation boundaries.

use core::fmt;

use indexmap::IndexMap;

use crate::block::Expr;
use crate::state::GameState;
use crate::value::Value;

/// A fully-resolved type in the block language.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    String,
    Number,
    Boolean,
    /// Ordered sequence with a single element type.
    Array(Box<TypeDescriptor>),
    /// String-keyed mapping. The key type of a declaration must reduce to
    /// `string`; the registry enforces that before constructing this.
    Dictionary(Box<TypeDescriptor>),
    /// Structural object with named, typed properties.
    Object(IndexMap<String, TypeDescriptor>),
    /// Reference to an entity of a particular kind.
    Id(EntityKind),
    /// An item stack (`{item, quantity}`).
    ItemStack,
    /// A named node action (used for action-typed data fields).
    Action,
}

/// The entity kinds an `id` type may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Item,
    /// An instance of a declared custom type, by name.
    Custom(String),
}

/// A declared data field: its type plus declaration-site options.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub ty: TypeDescriptor,
    /// Default expression evaluated when the field is omitted at creation.
    pub default: Option<Expr>,
    /// Engine-set only; scripts may read but never write internal fields.
    pub internal: bool,
}

impl TypeDescriptor {
    /// Checks whether a runtime value's tag conforms to this descriptor.
    ///
    /// Structural and recursive; reference targets are checked for liveness
    /// against the provided state so a dangling node id never slips into a
    /// typed slot.
    pub fn admits(&self, value: &Value, state: &GameState) -> bool {
        match (self, value) {
            (TypeDescriptor::String, Value::String(_)) => true,
            (TypeDescriptor::Number, Value::Number(n)) => n.is_finite(),
            (TypeDescriptor::Boolean, Value::Bool(_)) => true,
            (TypeDescriptor::Array(element), Value::Array(items)) => {
                items.iter().all(|item| element.admits(item, state))
            }
            (TypeDescriptor::Dictionary(value_ty), Value::Dict(entries)) => {
                entries.values().all(|entry| value_ty.admits(entry, state))
            }
            (TypeDescriptor::Object(properties), Value::Dict(entries)) => {
                properties.len() == entries.len()
                    && properties.iter().all(|(name, ty)| {
                        entries.get(name).is_some_and(|entry| ty.admits(entry, state))
                    })
            }
            (TypeDescriptor::Id(EntityKind::Node), Value::Ref(handle)) => match handle {
                crate::value::ObjectHandle::Node(id) => state.node(*id).is_some(),
                crate::value::ObjectHandle::Binding(_) => true,
            },
            (TypeDescriptor::Id(_), Value::Ref(_)) => true,
            (TypeDescriptor::ItemStack, Value::Dict(entries)) => {
                entries.len() == 2
                    && entries.get("item").is_some_and(|v| v.as_str().is_some())
                    && entries
                        .get("quantity")
                        .is_some_and(|v| v.as_count().is_some())
            }
            (TypeDescriptor::Action, Value::String(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::String => write!(f, "string"),
            TypeDescriptor::Number => write!(f, "number"),
            TypeDescriptor::Boolean => write!(f, "boolean"),
            TypeDescriptor::Array(element) => write!(f, "array<{element}>"),
            TypeDescriptor::Dictionary(value_ty) => write!(f, "dictionary<string, {value_ty}>"),
            TypeDescriptor::Object(properties) => {
                write!(f, "object{{")?;
                for (index, (name, ty)) in properties.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            TypeDescriptor::Id(kind) => write!(f, "id<{kind}>"),
            TypeDescriptor::ItemStack => write!(f, "itemStack"),
            TypeDescriptor::Action => write!(f, "action"),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => write!(f, "node"),
            EntityKind::Item => write!(f, "item"),
            EntityKind::Custom(name) => write!(f, "{name}"),
        }
    }
}
