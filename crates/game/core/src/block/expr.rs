//! Expression blocks.

use indexmap::IndexMap;

use super::{BlockError, BlockErrorKind, discriminator, require};

/// A parsed expression block.
///
/// Reference forms (`method`, `property`, `getContext`, `ternary`) are plain
/// expression variants; they are legal anywhere an expression is.
#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Expr {
    /// A bare JSON scalar/array/object standing for itself. Nested array
    /// elements and object field values are full expressions: literals are
    /// not required to be fully literal at every depth.
    Literal(Literal),

    /// String concatenation in operand order.
    Concat(Vec<Expr>),
    /// Left-to-right sum.
    Addition(Vec<Expr>),
    /// Left-fold subtraction: first operand minus the rest, in order.
    Subtraction(Vec<Expr>),
    /// Uniform draw from `[min, max)`.
    Random { min: Box<Expr>, max: Box<Expr> },
    /// Uniform integer draw from `[min, max]` inclusive.
    RandomInt { min: Box<Expr>, max: Box<Expr> },

    /// Pairwise comparison over adjacent operands.
    Compare { op: CompareOp, operands: Vec<Expr> },
    /// Short-circuiting boolean fold (`all`/`any`/`none`).
    Fold { op: BoolFold, operands: Vec<Expr> },

    /// True when the named object exists in context. Never faults.
    ContextExists { object: Box<Expr> },
    /// True when the object exists and has the named property/field/key.
    PropertyExists {
        object: Box<Expr>,
        property: Box<Expr>,
    },

    /// New array: `value` evaluated once per element of `array`, with the
    /// element bound as `element` in a child context.
    Map { array: Box<Expr>, value: Box<Expr> },
    /// Elements of `array` for which `condition` holds, order preserved.
    Filter {
        array: Box<Expr>,
        condition: Box<Expr>,
    },
    /// A dictionary's keys, in insertion order.
    Keys { dictionary: Box<Expr> },
    /// A dictionary's values, in insertion order.
    Values { dictionary: Box<Expr> },
    /// Dictionary built from `{key, value}` entries, last write wins on
    /// duplicate keys.
    CreateDictionary { entries: Box<Expr> },

    /// Evaluates exactly one branch; the untaken branch is never evaluated.
    Ternary {
        condition: Box<Expr>,
        when_true: Box<Expr>,
        when_false: Box<Expr>,
    },
    /// Invokes a typed method on a context object; the method body's
    /// `@return` supplies the result.
    Method {
        object: Box<Expr>,
        method: Box<Expr>,
        params: Option<Box<Expr>>,
    },
    /// Reads a computed property or data field of an object.
    Property {
        object: Box<Expr>,
        property: Box<Expr>,
    },
    /// Returns the live handle for a named context object.
    GetContext { id: Box<Expr> },
}

/// A literal expression: raw JSON standing for itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    Array(Vec<Expr>),
    Dict(IndexMap<String, Expr>),
}

/// Comparison operators. Operands are compared pairwise in sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum CompareOp {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

impl CompareOp {
    /// Ordered comparisons require number operands; (in)equality takes any.
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Equals | CompareOp::NotEquals)
    }
}

/// Boolean folds with short-circuit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum BoolFold {
    /// Stops at the first false operand.
    All,
    /// Stops at the first true operand.
    Any,
    /// Stops at the first true operand (result false).
    None,
}

/// Tags that belong to the action grammar; seeing one in expression
/// position is an authoring mistake worth a dedicated message.
const ACTION_TAGS: &[&str] = &[
    "branch",
    "forEach",
    "repeat",
    "wait",
    "addItemsToInventory",
    "setData",
    "addNode",
    "removeNode",
    "event",
    "error",
    "@return",
    "@break",
];

impl Expr {
    /// The block-kind name for diagnostics (`"concat"`, `"getContext"`, ...).
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Parses a JSON value as an expression block.
    ///
    /// The literal-vs-tagged branch lives here: an object with a recognized
    /// string `_type` is a tagged block, everything else stands for itself.
    pub fn parse(json: &serde_json::Value) -> Result<Expr, BlockError> {
        match json {
            serde_json::Value::Null => Err(BlockError::new(BlockErrorKind::InvalidLiteral(
                "null is not a value in the block language".into(),
            ))),
            serde_json::Value::Bool(b) => Ok(Expr::Literal(Literal::Bool(*b))),
            serde_json::Value::Number(n) => {
                let value = n.as_f64().filter(|v| v.is_finite()).ok_or_else(|| {
                    BlockError::new(BlockErrorKind::InvalidLiteral(format!(
                        "number literal `{n}` is not representable"
                    )))
                })?;
                Ok(Expr::Literal(Literal::Number(value)))
            }
            serde_json::Value::String(s) => Ok(Expr::Literal(Literal::String(s.clone()))),
            serde_json::Value::Array(items) => {
                let elements = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| Expr::parse(item).map_err(|e| e.at(index)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Literal(Literal::Array(elements)))
            }
            serde_json::Value::Object(object) => match discriminator(object)? {
                None => {
                    let entries = object
                        .iter()
                        .map(|(key, value)| {
                            Expr::parse(value)
                                .map(|expr| (key.clone(), expr))
                                .map_err(|e| e.at(key))
                        })
                        .collect::<Result<IndexMap<_, _>, _>>()?;
                    Ok(Expr::Literal(Literal::Dict(entries)))
                }
                Some(tag) => Expr::parse_tagged(tag, object),
            },
        }
    }

    fn parse_tagged(
        tag: &str,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Expr, BlockError> {
        let operands = |tag: &'static str| -> Result<Vec<Expr>, BlockError> {
            let json = require(object, tag, "operands")?;
            let items = json.as_array().ok_or_else(|| {
                BlockError::new(BlockErrorKind::InvalidLiteral(format!(
                    "`{tag}.operands` must be an array"
                )))
                .at("operands")
            })?;
            items
                .iter()
                .enumerate()
                .map(|(index, item)| Expr::parse(item).map_err(|e| e.at(index).at("operands")))
                .collect()
        };
        let field = |tag: &'static str, field: &'static str| -> Result<Box<Expr>, BlockError> {
            Expr::parse(require(object, tag, field)?)
                .map(Box::new)
                .map_err(|e| e.at(field))
        };
        let optional = |field: &'static str| -> Result<Option<Box<Expr>>, BlockError> {
            object
                .get(field)
                .map(|json| Expr::parse(json).map(Box::new).map_err(|e| e.at(field)))
                .transpose()
        };
        let compare = |op: CompareOp, tag: &'static str| {
            Ok(Expr::Compare {
                op,
                operands: operands(tag)?,
            })
        };
        let fold = |op: BoolFold, tag: &'static str| {
            Ok(Expr::Fold {
                op,
                operands: operands(tag)?,
            })
        };

        match tag {
            "concat" => Ok(Expr::Concat(operands("concat")?)),
            "addition" => Ok(Expr::Addition(operands("addition")?)),
            "subtraction" => Ok(Expr::Subtraction(operands("subtraction")?)),
            "random" => Ok(Expr::Random {
                min: field("random", "min")?,
                max: field("random", "max")?,
            }),
            "randomInt" => Ok(Expr::RandomInt {
                min: field("randomInt", "min")?,
                max: field("randomInt", "max")?,
            }),
            "equals" => compare(CompareOp::Equals, "equals"),
            "notEquals" => compare(CompareOp::NotEquals, "notEquals"),
            "lessThan" => compare(CompareOp::LessThan, "lessThan"),
            "greaterThan" => compare(CompareOp::GreaterThan, "greaterThan"),
            "lessThanOrEqual" => compare(CompareOp::LessThanOrEqual, "lessThanOrEqual"),
            "greaterThanOrEqual" => compare(CompareOp::GreaterThanOrEqual, "greaterThanOrEqual"),
            "all" => fold(BoolFold::All, "all"),
            "any" => fold(BoolFold::Any, "any"),
            "none" => fold(BoolFold::None, "none"),
            // `objectExists` is accepted as a drift alias of `contextExists`.
            "contextExists" | "objectExists" => Ok(Expr::ContextExists {
                object: field("contextExists", "object")?,
            }),
            "propertyExists" => Ok(Expr::PropertyExists {
                object: field("propertyExists", "object")?,
                property: field("propertyExists", "property")?,
            }),
            "map" => Ok(Expr::Map {
                array: field("map", "array")?,
                value: field("map", "value")?,
            }),
            "filter" => Ok(Expr::Filter {
                array: field("filter", "array")?,
                condition: field("filter", "condition")?,
            }),
            "keys" => Ok(Expr::Keys {
                dictionary: field("keys", "dictionary")?,
            }),
            "values" => Ok(Expr::Values {
                dictionary: field("values", "dictionary")?,
            }),
            "createDictionary" => Ok(Expr::CreateDictionary {
                entries: field("createDictionary", "entries")?,
            }),
            "ternary" => Ok(Expr::Ternary {
                condition: field("ternary", "condition")?,
                when_true: field("ternary", "true")?,
                when_false: field("ternary", "false")?,
            }),
            "method" => Ok(Expr::Method {
                object: field("method", "object")?,
                method: field("method", "method")?,
                params: optional("params")?,
            }),
            "property" => Ok(Expr::Property {
                object: field("property", "object")?,
                property: field("property", "property")?,
            }),
            // `getObject` is the contemporaneous drift alias.
            "getContext" | "getObject" => Ok(Expr::GetContext {
                id: field("getContext", "id")?,
            }),
            other if ACTION_TAGS.contains(&other) => Err(BlockError::new(
                BlockErrorKind::ActionInExpression(other.to_string()),
            )),
            other => Err(BlockError::new(BlockErrorKind::UnknownTag(
                other.to_string(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn scalars_parse_as_literals() {
        assert_eq!(
            Expr::parse(&json!("ore")).unwrap(),
            Expr::Literal(Literal::String("ore".into()))
        );
        assert_eq!(
            Expr::parse(&json!(3)).unwrap(),
            Expr::Literal(Literal::Number(3.0))
        );
    }

    #[test]
    fn object_without_discriminator_is_a_literal_dict() {
        let expr = Expr::parse(&json!({"item": "ore", "quantity": 2})).unwrap();
        let Expr::Literal(Literal::Dict(entries)) = expr else {
            panic!("expected literal dict");
        };
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn object_with_discriminator_is_a_tagged_block() {
        let expr = Expr::parse(&json!({"_type": "addition", "operands": [1, 2]})).unwrap();
        assert_eq!(expr.kind(), "addition");
    }

    #[test]
    fn literal_dicts_may_nest_blocks() {
        let expr = Expr::parse(&json!({
            "quantity": {"_type": "addition", "operands": [1, 2]}
        }))
        .unwrap();
        let Expr::Literal(Literal::Dict(entries)) = expr else {
            panic!("expected literal dict");
        };
        assert_eq!(entries["quantity"].kind(), "addition");
    }

    #[test]
    fn drift_aliases_parse_to_canonical_forms() {
        let a = Expr::parse(&json!({"_type": "getObject", "id": "node"})).unwrap();
        let b = Expr::parse(&json!({"_type": "getContext", "id": "node"})).unwrap();
        assert_eq!(a, b);
        let c = Expr::parse(&json!({"_type": "objectExists", "object": "node"})).unwrap();
        assert_eq!(c.kind(), "contextExists");
    }

    #[test]
    fn unknown_tag_is_rejected_not_treated_as_literal() {
        let err = Expr::parse(&json!({"_type": "frobnicate"})).unwrap_err();
        assert_eq!(err.kind, BlockErrorKind::UnknownTag("frobnicate".into()));
    }

    #[test]
    fn action_tag_in_expression_position_gets_dedicated_error() {
        let err = Expr::parse(&json!({"_type": "setData"})).unwrap_err();
        assert_eq!(
            err.kind,
            BlockErrorKind::ActionInExpression("setData".into())
        );
    }

    #[test]
    fn parse_errors_carry_paths() {
        let err = Expr::parse(&json!({
            "_type": "concat",
            "operands": ["a", {"_type": "nope"}]
        }))
        .unwrap_err();
        assert_eq!(err.path, vec!["operands".to_string(), "1".to_string()]);
    }
}
