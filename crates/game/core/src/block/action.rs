//! Action blocks.

use std::sync::Arc;

use super::expr::Expr;
use super::{BlockError, BlockErrorKind, discriminator, require};

/// A parsed action block.
///
/// Action bodies (`branch` arms, loop bodies) must be literal JSON arrays so
/// that control flow is statically walkable; a computed action list would be
/// invisible to the validator.
#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Action {
    /// Executes exactly one arm; an absent arm is a no-op.
    Branch {
        condition: Expr,
        when_true: Arc<[Action]>,
        when_false: Arc<[Action]>,
    },
    /// Evaluates `array` once, then runs the body per element in order with
    /// the element bound as `element`.
    ForEach { array: Expr, body: Arc<[Action]> },
    /// Evaluates `iterations` once; negative counts run zero times.
    Repeat { iterations: Expr, body: Arc<[Action]> },
    /// Suspends the enclosing execution for `duration` game-time units.
    Wait { node: Option<Expr>, duration: Expr },
    /// Atomically inserts items into a node's inventory.
    AddItemsToInventory {
        node: Expr,
        items: Expr,
        overflow: OverflowPolicy,
    },
    /// Writes a typed data field on an object.
    SetData {
        object: Expr,
        key: Expr,
        value: Expr,
    },
    /// Appends a new node to the world.
    AddNode {
        node_type: Expr,
        pos: Expr,
        data: Option<Expr>,
    },
    /// Removes a node; outstanding handles become dangling.
    RemoveNode { node: Expr },
    /// Emits a named event for other packs' listeners. Always enqueued,
    /// never re-entered.
    Event { event: Expr, data: Option<Expr> },
    /// Raises a user fault.
    Error { message: Expr },
    /// Ends the enclosing method/handler with an optional value.
    #[strum(serialize = "@return")]
    Return { value: Option<Expr> },
    /// Terminates the enclosing loop.
    #[strum(serialize = "@break")]
    Break,
}

/// What to do when an inventory insert does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Fault with a capacity error before mutating anything (the default
    /// when `overflow` is absent).
    #[default]
    Reject,
    /// Discard the excess, committing what fits.
    Destroy,
}

impl Action {
    /// The block-kind name for diagnostics (`"branch"`, `"@return"`, ...).
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Parses a JSON value as a single action block.
    pub fn parse(json: &serde_json::Value) -> Result<Action, BlockError> {
        let object = json.as_object().ok_or_else(|| {
            BlockError::new(BlockErrorKind::InvalidLiteral(
                "an action must be a tagged object".into(),
            ))
        })?;
        let tag = discriminator(object)?.ok_or_else(|| {
            BlockError::new(BlockErrorKind::InvalidLiteral(
                "an action must carry a `_type` discriminator".into(),
            ))
        })?;

        let expr = |tag: &'static str, field: &'static str| -> Result<Expr, BlockError> {
            Expr::parse(require(object, tag, field)?).map_err(|e| e.at(field))
        };
        let optional = |field: &'static str| -> Result<Option<Expr>, BlockError> {
            object
                .get(field)
                .map(|json| Expr::parse(json).map_err(|e| e.at(field)))
                .transpose()
        };
        let body = |field: &'static str| -> Result<Arc<[Action]>, BlockError> {
            match object.get(field) {
                None => Ok(Arc::from(Vec::new())),
                Some(json) => parse_action_list(json).map_err(|e| e.at(field)),
            }
        };

        match tag {
            "branch" => Ok(Action::Branch {
                condition: expr("branch", "condition")?,
                when_true: body("true")?,
                when_false: body("false")?,
            }),
            "forEach" => Ok(Action::ForEach {
                array: expr("forEach", "array")?,
                body: parse_action_list(require(object, "forEach", "forEach")?)
                    .map_err(|e| e.at("forEach"))?,
            }),
            "repeat" => Ok(Action::Repeat {
                iterations: expr("repeat", "iterations")?,
                body: parse_action_list(require(object, "repeat", "run")?)
                    .map_err(|e| e.at("run"))?,
            }),
            "wait" => Ok(Action::Wait {
                node: optional("node")?,
                duration: expr("wait", "duration")?,
            }),
            "addItemsToInventory" => {
                let overflow = match object.get("overflow") {
                    None => OverflowPolicy::Reject,
                    Some(serde_json::Value::String(policy)) if policy == "destroy" => {
                        OverflowPolicy::Destroy
                    }
                    Some(other) => {
                        return Err(BlockError::new(BlockErrorKind::InvalidLiteral(format!(
                            "`overflow` must be \"destroy\" when present, found {other}"
                        )))
                        .at("overflow"));
                    }
                };
                Ok(Action::AddItemsToInventory {
                    node: expr("addItemsToInventory", "node")?,
                    items: expr("addItemsToInventory", "items")?,
                    overflow,
                })
            }
            "setData" => Ok(Action::SetData {
                object: expr("setData", "object")?,
                key: expr("setData", "key")?,
                value: expr("setData", "value")?,
            }),
            "addNode" => Ok(Action::AddNode {
                node_type: expr("addNode", "nodeType")?,
                pos: expr("addNode", "pos")?,
                data: optional("data")?,
            }),
            "removeNode" => Ok(Action::RemoveNode {
                node: expr("removeNode", "node")?,
            }),
            "event" => Ok(Action::Event {
                event: expr("event", "event")?,
                data: optional("data")?,
            }),
            "error" => Ok(Action::Error {
                message: expr("error", "message")?,
            }),
            "@return" => Ok(Action::Return {
                value: optional("value")?,
            }),
            "@break" => Ok(Action::Break),
            other => {
                // Distinguish a misplaced expression from a genuinely
                // unknown tag; both are errors but authors read them
                // differently.
                match Expr::parse(json) {
                    Ok(_) => Err(BlockError::new(BlockErrorKind::ExpressionInAction(
                        other.to_string(),
                    ))),
                    Err(_) => Err(BlockError::new(BlockErrorKind::UnknownTag(
                        other.to_string(),
                    ))),
                }
            }
        }
    }
}

/// Parses a literal JSON array of action blocks.
pub fn parse_action_list(json: &serde_json::Value) -> Result<Arc<[Action]>, BlockError> {
    let items = json.as_array().ok_or_else(|| {
        BlockError::new(BlockErrorKind::InvalidLiteral(
            "an action list must be a literal array".into(),
        ))
    })?;
    let actions = items
        .iter()
        .enumerate()
        .map(|(index, item)| Action::parse(item).map_err(|e| e.at(index)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::from(actions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn branch_arms_default_to_empty() {
        let action = Action::parse(&json!({"_type": "branch", "condition": true})).unwrap();
        let Action::Branch {
            when_true,
            when_false,
            ..
        } = action
        else {
            panic!("expected branch");
        };
        assert!(when_true.is_empty());
        assert!(when_false.is_empty());
    }

    #[test]
    fn overflow_accepts_only_destroy() {
        let ok = Action::parse(&json!({
            "_type": "addItemsToInventory",
            "node": "node-0",
            "items": [],
            "overflow": "destroy"
        }))
        .unwrap();
        assert!(matches!(
            ok,
            Action::AddItemsToInventory {
                overflow: OverflowPolicy::Destroy,
                ..
            }
        ));

        let err = Action::parse(&json!({
            "_type": "addItemsToInventory",
            "node": "node-0",
            "items": [],
            "overflow": "keep"
        }))
        .unwrap_err();
        assert_eq!(err.path, vec!["overflow".to_string()]);
    }

    #[test]
    fn computed_action_list_is_rejected() {
        let err = Action::parse(&json!({
            "_type": "forEach",
            "array": [1, 2],
            "forEach": {"_type": "getContext", "id": "body"}
        }))
        .unwrap_err();
        assert!(matches!(err.kind, BlockErrorKind::InvalidLiteral(_)));
    }

    #[test]
    fn expression_in_action_position_gets_dedicated_error() {
        let err = Action::parse(&json!({"_type": "concat", "operands": []})).unwrap_err();
        assert_eq!(
            err.kind,
            BlockErrorKind::ExpressionInAction("concat".into())
        );
    }

    #[test]
    fn return_and_break_parse() {
        let ret = Action::parse(&json!({"_type": "@return", "value": 5})).unwrap();
        assert_eq!(ret.kind(), "@return");
        let brk = Action::parse(&json!({"_type": "@break"})).unwrap();
        assert_eq!(brk, Action::Break);
    }
}
