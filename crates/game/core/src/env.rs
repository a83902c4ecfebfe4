//! Canonical content definitions consumed by the interpreter.
//!
//! The content crate parses and validates author-supplied packs, then builds
//! a [`GameEnv`]: the merged, canonical view of every node type, item type,
//! custom type, and event listener. The interpreter only ever sees this
//! form; raw pack JSON never reaches execution.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::block::{Action, Expr};
use crate::types::{FieldDef, TypeDescriptor};

/// Merged definitions from every loaded content pack.
#[derive(Debug, Clone, Default)]
pub struct GameEnv {
    pub nodes: IndexMap<String, NodeTypeDef>,
    pub items: IndexMap<String, ItemTypeDef>,
    pub types: IndexMap<String, CustomTypeDef>,
    /// Event name → listener bodies across all packs, in load order.
    pub listeners: IndexMap<String, Vec<EventListenerDef>>,
}

impl GameEnv {
    pub fn node_type(&self, name: &str) -> Option<&NodeTypeDef> {
        self.nodes.get(name)
    }

    pub fn item_type(&self, name: &str) -> Option<&ItemTypeDef> {
        self.items.get(name)
    }

    pub fn custom_type(&self, name: &str) -> Option<&CustomTypeDef> {
        self.types.get(name)
    }

    pub fn listeners_for(&self, event: &str) -> &[EventListenerDef] {
        self.listeners.get(event).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A placeable node type.
#[derive(Debug, Clone)]
pub struct NodeTypeDef {
    pub display: Expr,
    /// Number, `{width, height}` object, or a reference block.
    pub size: Expr,
    pub draggable: Option<Expr>,
    pub data: IndexMap<String, FieldDef>,
    pub inventory: Option<InventoryDef>,
    pub actions: IndexMap<String, NodeActionDef>,
    /// Run when a node of this type is placed.
    pub place: Arc<[Action]>,
}

/// Slot count and player-interaction permissions for a node's inventory.
#[derive(Debug, Clone)]
pub struct InventoryDef {
    pub slots: Expr,
    pub can_player_extract: Option<Expr>,
    pub can_player_insert: Option<Expr>,
}

/// A named action a node offers.
#[derive(Debug, Clone)]
pub struct NodeActionDef {
    pub display: Expr,
    /// Busy time: the node cannot be re-triggered until it elapses.
    pub duration: Expr,
    pub tooltip: Option<Expr>,
    /// Item stacks charged from the node's inventory before the body runs.
    pub cost: Option<Expr>,
    pub body: Arc<[Action]>,
}

/// An item type.
#[derive(Debug, Clone)]
pub struct ItemTypeDef {
    pub display: Expr,
    /// Node type this item places, if any.
    pub node: Option<Expr>,
    /// Per-slot stack cap; unbounded when absent.
    pub max_stack_size: Option<Expr>,
}

/// An author-defined custom type: typed data plus callable methods and
/// computed properties.
#[derive(Debug, Clone, Default)]
pub struct CustomTypeDef {
    pub data: IndexMap<String, FieldDef>,
    pub methods: IndexMap<String, MethodDef>,
    pub properties: IndexMap<String, PropertyDef>,
}

/// A callable method with typed parameters and an action body.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub params: IndexMap<String, TypeDescriptor>,
    /// Absent means the method returns void.
    pub returns: Option<TypeDescriptor>,
    pub body: Arc<[Action]>,
}

/// A computed property, re-evaluated on every access.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub ty: TypeDescriptor,
    pub value: Expr,
}

/// One event listener, tagged with its pack for diagnostics.
#[derive(Debug, Clone)]
pub struct EventListenerDef {
    pub pack: String,
    pub body: Arc<[Action]>,
}
