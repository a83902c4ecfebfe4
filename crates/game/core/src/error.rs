//! Runtime faults.
//!
//! Faults are strictly the *execution-phase* error class; static mistakes in
//! a content pack are caught earlier by the validator and never reach the
//! interpreter. A fault aborts the remaining actions of the script that
//! raised it, leaves already-committed mutations in place, and is surfaced
//! to the embedder as a diagnostic rather than a crash.

use crate::state::NodeId;
use crate::value::Value;

/// A runtime error produced while evaluating or executing blocks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    /// A named object, node, method, or property does not exist (any more).
    #[error("unknown reference `{0}`")]
    UnknownReference(String),

    /// An inventory insert overflowed without a `destroy` overflow policy,
    /// or an action cost could not be paid.
    #[error("inventory capacity error on {node}: {detail}")]
    Capacity { node: NodeId, detail: String },

    /// An explicit `error` block.
    #[error("{0}")]
    User(String),

    /// The iteration/recursion budget ran out; the script is most likely
    /// looping forever.
    #[error("execution budget exceeded")]
    BudgetExceeded,

    /// A runtime tag disagreed with the declared type of the slot being
    /// read or written. Validation makes this unreachable for well-typed
    /// packs; the check remains because `setData` values can depend on
    /// runtime branching that is invisible statically.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Attempted write to an engine-internal data field.
    #[error("field `{0}` is engine-internal and cannot be written by scripts")]
    InternalField(String),

    /// An interpreter invariant the validator should have upheld was
    /// violated. Indicates a bug, not an authoring mistake.
    #[error("internal interpreter error: {0}")]
    Internal(&'static str),
}

impl Fault {
    /// Builds a `TypeMismatch` fault from an expected type name and the
    /// value actually found.
    pub fn mismatch(expected: impl Into<String>, found: &Value) -> Fault {
        Fault::TypeMismatch {
            expected: expected.into(),
            found: found.type_name().to_string(),
        }
    }
}
