//! Parsed block trees.
//!
//! Content packs author behavior as JSON-shaped trees of typed blocks. A
//! JSON value is either a *tagged* block (an object carrying a recognized
//! string `_type` discriminator) or a *literal* standing for itself. That
//! disambiguation is the scheme's central ambiguity; it is resolved in
//! exactly one place, at parse time, and both the validator and the
//! interpreter consume the already-disambiguated tree.

mod action;
mod expr;
mod typeexpr;

pub use action::{Action, OverflowPolicy, parse_action_list};
pub use expr::{BoolFold, CompareOp, Expr, Literal};
pub use typeexpr::ParsedType;

use core::fmt;

/// Why a JSON value failed to parse as a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockErrorKind {
    /// `_type` named no known block.
    UnknownTag(String),
    /// A tagged block was missing a required field.
    MissingField {
        tag: &'static str,
        field: &'static str,
    },
    /// A value could not stand for itself (e.g. JSON `null`, or a non-string
    /// `_type` field).
    InvalidLiteral(String),
    /// An action block appeared where an expression was expected.
    ActionInExpression(String),
    /// An expression block appeared where an action was expected.
    ExpressionInAction(String),
}

/// A parse failure, with the path from the parse root to the failing block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct BlockError {
    /// Path segments (field names and array indices) from the root.
    pub path: Vec<String>,
    pub kind: BlockErrorKind,
}

impl BlockError {
    pub(crate) fn new(kind: BlockErrorKind) -> Self {
        Self {
            path: Vec::new(),
            kind,
        }
    }

    /// Prepends a path segment while unwinding out of a nested parse.
    pub(crate) fn at(mut self, segment: impl fmt::Display) -> Self {
        self.path.insert(0, segment.to_string());
        self
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_empty() {
            write!(f, "at `{}`: ", self.path.join("/"))?;
        }
        match &self.kind {
            BlockErrorKind::UnknownTag(tag) => write!(f, "unknown block type `{tag}`"),
            BlockErrorKind::MissingField { tag, field } => {
                write!(f, "`{tag}` block is missing required field `{field}`")
            }
            BlockErrorKind::InvalidLiteral(detail) => write!(f, "{detail}"),
            BlockErrorKind::ActionInExpression(tag) => {
                write!(f, "action block `{tag}` is not valid in expression position")
            }
            BlockErrorKind::ExpressionInAction(tag) => {
                write!(f, "expression block `{tag}` is not valid in action position")
            }
        }
    }
}

/// Extracts a recognized-or-not `_type` discriminator from a JSON object.
///
/// Returns `Ok(Some(tag))` for a string `_type`, `Ok(None)` when the field
/// is absent (the object is a literal), and an error when `_type` exists but
/// is not a string.
pub(crate) fn discriminator(
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<Option<&str>, BlockError> {
    match object.get("_type") {
        None => Ok(None),
        Some(serde_json::Value::String(tag)) => Ok(Some(tag)),
        Some(other) => Err(BlockError::new(BlockErrorKind::InvalidLiteral(format!(
            "`_type` must be a string, found {other}"
        )))),
    }
}

pub(crate) fn require<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    tag: &'static str,
    field: &'static str,
) -> Result<&'a serde_json::Value, BlockError> {
    object
        .get(field)
        .ok_or_else(|| BlockError::new(BlockErrorKind::MissingField { tag, field }))
}
