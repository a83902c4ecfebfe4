//! Type blocks.
//!
//! Declarations use either a bare string shorthand (`"number"`) or a tagged
//! object (`{"_type": "array", "elementType": ...}`). Parsing produces the
//! canonical [`TypeDescriptor`] plus the declaration-site options (`default`,
//! `internal`) that only apply where a field is declared.

use indexmap::IndexMap;

use super::expr::Expr;
use super::{BlockError, BlockErrorKind, discriminator, require};
use crate::types::{EntityKind, TypeDescriptor};

/// A parsed type declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedType {
    pub descriptor: TypeDescriptor,
    /// Only meaningful at a field declaration site; nested occurrences are
    /// ignored by canonicalization.
    pub default: Option<Expr>,
    pub internal: bool,
}

impl ParsedType {
    /// Parses a JSON value as a type block.
    pub fn parse(json: &serde_json::Value) -> Result<ParsedType, BlockError> {
        match json {
            serde_json::Value::String(name) => Ok(ParsedType {
                descriptor: scalar(name)?,
                default: None,
                internal: false,
            }),
            serde_json::Value::Object(object) => {
                let tag = discriminator(object)?.ok_or_else(|| {
                    BlockError::new(BlockErrorKind::InvalidLiteral(
                        "a type block must be a name or carry a `_type` discriminator".into(),
                    ))
                })?;

                let descriptor = match tag {
                    "string" => TypeDescriptor::String,
                    "number" => TypeDescriptor::Number,
                    "boolean" => TypeDescriptor::Boolean,
                    "itemStack" => TypeDescriptor::ItemStack,
                    "action" => TypeDescriptor::Action,
                    "array" => {
                        let element = ParsedType::parse(require(object, "array", "elementType")?)
                            .map_err(|e| e.at("elementType"))?;
                        TypeDescriptor::Array(Box::new(element.descriptor))
                    }
                    "dictionary" => {
                        let key = ParsedType::parse(require(object, "dictionary", "keyType")?)
                            .map_err(|e| e.at("keyType"))?;
                        if key.descriptor != TypeDescriptor::String {
                            return Err(BlockError::new(BlockErrorKind::InvalidLiteral(format!(
                                "dictionary keys must be strings, found {}",
                                key.descriptor
                            )))
                            .at("keyType"));
                        }
                        let value = ParsedType::parse(require(object, "dictionary", "valueType")?)
                            .map_err(|e| e.at("valueType"))?;
                        TypeDescriptor::Dictionary(Box::new(value.descriptor))
                    }
                    "object" => {
                        let json = require(object, "object", "properties")?;
                        let entries = json.as_object().ok_or_else(|| {
                            BlockError::new(BlockErrorKind::InvalidLiteral(
                                "`object.properties` must be an object".into(),
                            ))
                            .at("properties")
                        })?;
                        let properties = entries
                            .iter()
                            .map(|(name, value)| {
                                ParsedType::parse(value)
                                    .map(|parsed| (name.clone(), parsed.descriptor))
                                    .map_err(|e| e.at(name).at("properties"))
                            })
                            .collect::<Result<IndexMap<_, _>, _>>()?;
                        TypeDescriptor::Object(properties)
                    }
                    "id" => {
                        let of = require(object, "id", "of")?.as_str().ok_or_else(|| {
                            BlockError::new(BlockErrorKind::InvalidLiteral(
                                "`id.of` must be a string".into(),
                            ))
                            .at("of")
                        })?;
                        let kind = match of {
                            "node" => EntityKind::Node,
                            "item" => EntityKind::Item,
                            custom => EntityKind::Custom(custom.to_string()),
                        };
                        TypeDescriptor::Id(kind)
                    }
                    other => {
                        return Err(BlockError::new(BlockErrorKind::UnknownTag(
                            other.to_string(),
                        )));
                    }
                };

                let default = object
                    .get("default")
                    .map(|json| Expr::parse(json).map_err(|e| e.at("default")))
                    .transpose()?;
                let internal = match object.get("internal") {
                    None => false,
                    Some(serde_json::Value::Bool(flag)) => *flag,
                    Some(other) => {
                        return Err(BlockError::new(BlockErrorKind::InvalidLiteral(format!(
                            "`internal` must be a boolean literal, found {other}"
                        )))
                        .at("internal"));
                    }
                };

                Ok(ParsedType {
                    descriptor,
                    default,
                    internal,
                })
            }
            other => Err(BlockError::new(BlockErrorKind::InvalidLiteral(format!(
                "expected a type block, found {other}"
            )))),
        }
    }
}

fn scalar(name: &str) -> Result<TypeDescriptor, BlockError> {
    match name {
        "string" => Ok(TypeDescriptor::String),
        "number" => Ok(TypeDescriptor::Number),
        "boolean" => Ok(TypeDescriptor::Boolean),
        "itemStack" => Ok(TypeDescriptor::ItemStack),
        "action" => Ok(TypeDescriptor::Action),
        other => Err(BlockError::new(BlockErrorKind::UnknownTag(
            other.to_string(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn shorthand_and_tagged_forms_agree() {
        let short = ParsedType::parse(&json!("number")).unwrap();
        let long = ParsedType::parse(&json!({"_type": "number"})).unwrap();
        assert_eq!(short.descriptor, long.descriptor);
    }

    #[test]
    fn dictionary_key_type_must_be_string() {
        let err = ParsedType::parse(&json!({
            "_type": "dictionary",
            "keyType": "number",
            "valueType": "string"
        }))
        .unwrap_err();
        assert_eq!(err.path, vec!["keyType".to_string()]);
    }

    #[test]
    fn defaults_and_internal_are_captured() {
        let parsed = ParsedType::parse(&json!({
            "_type": "number",
            "default": {"_type": "addition", "operands": [1, 2]},
            "internal": true
        }))
        .unwrap();
        assert!(parsed.internal);
        assert!(parsed.default.is_some());
    }

    #[test]
    fn nested_type_trees_resolve() {
        let parsed = ParsedType::parse(&json!({
            "_type": "array",
            "elementType": {
                "_type": "dictionary",
                "keyType": "string",
                "valueType": {"_type": "id", "of": "node"}
            }
        }))
        .unwrap();
        assert_eq!(
            parsed.descriptor,
            TypeDescriptor::Array(Box::new(TypeDescriptor::Dictionary(Box::new(
                TypeDescriptor::Id(EntityKind::Node)
            ))))
        );
    }
}
