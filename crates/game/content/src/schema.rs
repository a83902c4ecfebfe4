//! Content pack parsing.
//!
//! A pack is a single JSON document declaring node types, item types, custom
//! types, and event listeners. Parsing turns the raw JSON into the canonical
//! definition structs of `nodeforge-core`, resolving every embedded block
//! through the core block parsers. Parsing is purely structural; semantic
//! checks (unknown references, type agreement) belong to the validator.

use indexmap::IndexMap;
use serde::Deserialize;

use nodeforge_core::block::{Expr, ParsedType, parse_action_list};
use nodeforge_core::env::{
    CustomTypeDef, InventoryDef, ItemTypeDef, MethodDef, NodeActionDef, NodeTypeDef, PropertyDef,
};
use nodeforge_core::types::FieldDef;
use nodeforge_core::BlockError;

/// Why a pack document failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// The document is not valid JSON or not pack-shaped.
    #[error("malformed pack document: {0}")]
    Document(#[from] serde_json::Error),

    /// A block inside the pack failed to parse.
    #[error("in `{path}`: {source}")]
    Block {
        /// Dotted path from the pack root to the failing declaration.
        path: String,
        source: BlockError,
    },
}

fn block_err(path: impl Into<String>) -> impl FnOnce(BlockError) -> PackError {
    let path = path.into();
    move |source| PackError::Block { path, source }
}

/// A parsed content pack, ready for registration.
#[derive(Debug, Clone)]
pub struct ContentPack {
    /// The pack's `display` name, which also identifies it to the registry.
    pub display: String,
    pub description: Option<String>,
    pub nodes: IndexMap<String, NodeTypeDef>,
    pub items: IndexMap<String, ItemTypeDef>,
    pub types: IndexMap<String, CustomTypeDef>,
    /// Event name → listener body declared by this pack.
    pub event_listeners: IndexMap<String, std::sync::Arc<[nodeforge_core::Action]>>,
}

impl ContentPack {
    /// Parses a pack from its JSON source text.
    pub fn from_str(source: &str) -> Result<ContentPack, PackError> {
        let raw: RawPack = serde_json::from_str(source)?;
        Self::from_raw(raw)
    }

    /// Parses a pack from an already-decoded JSON document.
    pub fn from_json(json: serde_json::Value) -> Result<ContentPack, PackError> {
        let raw: RawPack = serde_json::from_value(json)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPack) -> Result<ContentPack, PackError> {
        let mut nodes = IndexMap::with_capacity(raw.nodes.len());
        for (name, node) in raw.nodes {
            let parsed = parse_node(&name, node)?;
            nodes.insert(name, parsed);
        }

        let mut items = IndexMap::with_capacity(raw.items.len());
        for (name, item) in raw.items {
            let path = format!("items.{name}");
            items.insert(
                name,
                ItemTypeDef {
                    display: Expr::parse(&item.display).map_err(block_err(format!("{path}.display")))?,
                    node: item
                        .node
                        .as_ref()
                        .map(Expr::parse)
                        .transpose()
                        .map_err(block_err(format!("{path}.node")))?,
                    max_stack_size: item
                        .max_stack_size
                        .as_ref()
                        .map(Expr::parse)
                        .transpose()
                        .map_err(block_err(format!("{path}.maxStackSize")))?,
                },
            );
        }

        let mut types = IndexMap::with_capacity(raw.types.len());
        for (name, custom) in raw.types {
            let parsed = parse_custom(&name, custom)?;
            types.insert(name, parsed);
        }

        let mut event_listeners = IndexMap::with_capacity(raw.event_listeners.len());
        for (name, body) in raw.event_listeners {
            let body = parse_action_list(&body)
                .map_err(block_err(format!("eventListeners.{name}")))?;
            event_listeners.insert(name, body);
        }

        Ok(ContentPack {
            display: raw.display,
            description: raw.description,
            nodes,
            items,
            types,
            event_listeners,
        })
    }
}

fn parse_fields(
    path: &str,
    raw: IndexMap<String, serde_json::Value>,
) -> Result<IndexMap<String, FieldDef>, PackError> {
    let mut fields = IndexMap::with_capacity(raw.len());
    for (name, json) in raw {
        let parsed =
            ParsedType::parse(&json).map_err(block_err(format!("{path}.{name}")))?;
        fields.insert(
            name,
            FieldDef {
                ty: parsed.descriptor,
                default: parsed.default,
                internal: parsed.internal,
            },
        );
    }
    Ok(fields)
}

fn parse_node(name: &str, raw: RawNode) -> Result<NodeTypeDef, PackError> {
    let path = format!("nodes.{name}");

    let inventory = raw
        .inventory
        .map(|inv| -> Result<InventoryDef, PackError> {
            Ok(InventoryDef {
                slots: Expr::parse(&inv.slots)
                    .map_err(block_err(format!("{path}.inventory.slots")))?,
                can_player_extract: inv
                    .can_player_extract
                    .as_ref()
                    .map(Expr::parse)
                    .transpose()
                    .map_err(block_err(format!("{path}.inventory.canPlayerExtract")))?,
                can_player_insert: inv
                    .can_player_insert
                    .as_ref()
                    .map(Expr::parse)
                    .transpose()
                    .map_err(block_err(format!("{path}.inventory.canPlayerInsert")))?,
            })
        })
        .transpose()?;

    let mut actions = IndexMap::with_capacity(raw.actions.len());
    for (action_name, action) in raw.actions {
        let action_path = format!("{path}.actions.{action_name}");
        actions.insert(
            action_name,
            NodeActionDef {
                display: Expr::parse(&action.display)
                    .map_err(block_err(format!("{action_path}.display")))?,
                duration: Expr::parse(&action.duration)
                    .map_err(block_err(format!("{action_path}.duration")))?,
                tooltip: action
                    .tooltip
                    .as_ref()
                    .map(Expr::parse)
                    .transpose()
                    .map_err(block_err(format!("{action_path}.tooltip")))?,
                cost: action
                    .cost
                    .as_ref()
                    .map(Expr::parse)
                    .transpose()
                    .map_err(block_err(format!("{action_path}.cost")))?,
                body: parse_action_list(&action.run)
                    .map_err(block_err(format!("{action_path}.run")))?,
            },
        );
    }

    Ok(NodeTypeDef {
        display: Expr::parse(&raw.display).map_err(block_err(format!("{path}.display")))?,
        size: Expr::parse(&raw.size).map_err(block_err(format!("{path}.size")))?,
        draggable: raw
            .draggable
            .as_ref()
            .map(Expr::parse)
            .transpose()
            .map_err(block_err(format!("{path}.draggable")))?,
        data: parse_fields(&format!("{path}.data"), raw.data)?,
        inventory,
        actions,
        place: match raw.place {
            Some(place) => {
                parse_action_list(&place).map_err(block_err(format!("{path}.place")))?
            }
            None => Vec::new().into(),
        },
    })
}

fn parse_custom(name: &str, raw: RawCustomType) -> Result<CustomTypeDef, PackError> {
    let path = format!("types.{name}");

    let mut methods = IndexMap::with_capacity(raw.methods.len());
    for (method_name, method) in raw.methods {
        let method_path = format!("{path}.methods.{method_name}");
        let mut params = IndexMap::with_capacity(method.params.len());
        for (param_name, json) in method.params {
            let parsed = ParsedType::parse(&json)
                .map_err(block_err(format!("{method_path}.params.{param_name}")))?;
            params.insert(param_name, parsed.descriptor);
        }
        methods.insert(
            method_name,
            MethodDef {
                params,
                returns: method
                    .returns
                    .as_ref()
                    .map(ParsedType::parse)
                    .transpose()
                    .map_err(block_err(format!("{method_path}.returns")))?
                    .map(|parsed| parsed.descriptor),
                body: parse_action_list(&method.run)
                    .map_err(block_err(format!("{method_path}.run")))?,
            },
        );
    }

    let mut properties = IndexMap::with_capacity(raw.properties.len());
    for (property_name, property) in raw.properties {
        let property_path = format!("{path}.properties.{property_name}");
        properties.insert(
            property_name,
            PropertyDef {
                ty: ParsedType::parse(&property.ty)
                    .map_err(block_err(format!("{property_path}.type")))?
                    .descriptor,
                value: Expr::parse(&property.value)
                    .map_err(block_err(format!("{property_path}.value")))?,
            },
        );
    }

    Ok(CustomTypeDef {
        data: parse_fields(&format!("{path}.data"), raw.data)?,
        methods,
        properties,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPack {
    display: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    nodes: IndexMap<String, RawNode>,
    #[serde(default)]
    items: IndexMap<String, RawItem>,
    #[serde(default)]
    types: IndexMap<String, RawCustomType>,
    #[serde(default)]
    event_listeners: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    display: serde_json::Value,
    size: serde_json::Value,
    #[serde(default)]
    draggable: Option<serde_json::Value>,
    #[serde(default)]
    data: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    inventory: Option<RawInventory>,
    #[serde(default)]
    actions: IndexMap<String, RawNodeAction>,
    #[serde(default)]
    place: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInventory {
    slots: serde_json::Value,
    #[serde(default)]
    can_player_extract: Option<serde_json::Value>,
    #[serde(default)]
    can_player_insert: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawNodeAction {
    display: serde_json::Value,
    duration: serde_json::Value,
    #[serde(default)]
    tooltip: Option<serde_json::Value>,
    #[serde(default)]
    cost: Option<serde_json::Value>,
    run: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    display: serde_json::Value,
    #[serde(default)]
    node: Option<serde_json::Value>,
    #[serde(default)]
    max_stack_size: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawCustomType {
    #[serde(default)]
    data: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    methods: IndexMap<String, RawMethod>,
    #[serde(default)]
    properties: IndexMap<String, RawProperty>,
}

#[derive(Debug, Deserialize)]
struct RawMethod {
    #[serde(default)]
    params: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    returns: Option<serde_json::Value>,
    run: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawProperty {
    #[serde(rename = "type")]
    ty: serde_json::Value,
    value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn minimal_pack_parses() {
        let pack = ContentPack::from_json(json!({
            "display": "Minimal",
            "nodes": {
                "sign": {
                    "display": "Sign",
                    "size": 1,
                    "data": {"text": {"_type": "string", "default": "hello"}}
                }
            }
        }))
        .unwrap();
        assert_eq!(pack.display, "Minimal");
        let sign = &pack.nodes["sign"];
        assert!(sign.data["text"].default.is_some());
        assert!(sign.place.is_empty());
    }

    #[test]
    fn block_errors_carry_the_declaration_path() {
        let err = ContentPack::from_json(json!({
            "display": "Broken",
            "nodes": {
                "sign": {
                    "display": "Sign",
                    "size": 1,
                    "actions": {
                        "poke": {
                            "display": "Poke",
                            "duration": 0,
                            "run": [{"_type": "nonsense"}]
                        }
                    }
                }
            }
        }))
        .unwrap_err();
        let PackError::Block { path, .. } = err else {
            panic!("expected a block error");
        };
        assert_eq!(path, "nodes.sign.actions.poke.run");
    }

    #[test]
    fn listener_bodies_parse_per_event() {
        let pack = ContentPack::from_json(json!({
            "display": "Listeners",
            "eventListeners": {
                "oreMined": [{"_type": "event", "event": "scoreChanged"}]
            }
        }))
        .unwrap();
        assert_eq!(pack.event_listeners["oreMined"].len(), 1);
    }

    #[test]
    fn envelope_requires_a_display_name() {
        let err = ContentPack::from_json(json!({"nodes": {}})).unwrap_err();
        assert!(matches!(err, PackError::Document(_)));
    }
}
