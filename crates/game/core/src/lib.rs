//! Deterministic block interpreter and world state shared across runtimes.
//!
//! `nodeforge-core` defines the canonical value model, the parsed block
//! trees, the authoritative world state, and the expression/action
//! interpreter that is the only writer of that state. Everything here is
//! pure and deterministic: the same state, definitions, seed, and script
//! always produce the same result, which is what lets clients replay a
//! shared session instead of trusting each other.
pub mod block;
pub mod context;
pub mod env;
pub mod error;
pub mod eval;
pub mod exec;
pub mod rng;
pub mod state;
pub mod types;
pub mod value;

pub use block::{
    Action, BlockError, BlockErrorKind, BoolFold, CompareOp, Expr, Literal, OverflowPolicy,
    ParsedType, parse_action_list,
};
pub use context::{Binding, Context};
pub use env::{
    CustomTypeDef, EventListenerDef, GameEnv, InventoryDef, ItemTypeDef, MethodDef, NodeActionDef,
    NodeTypeDef, PropertyDef,
};
pub use error::Fault;
pub use eval::evaluate;
pub use exec::{
    Budget, EmittedEvent, Execution, Outbox, Pause, Progress, ScriptEnv, spawn_node,
};
pub use rng::SessionRng;
pub use state::{
    GameState, Inventory, ItemStack, Layers, NodeId, NodeState, Overflow, Position, WorldLayer,
};
pub use types::{EntityKind, FieldDef, TypeDescriptor};
pub use value::{Dict, ObjectHandle, Value};
