//! Pack registration and merging.
//!
//! Packs register one at a time, in load order, into a single merged
//! [`GameEnv`]. Definition names are global across packs, so a name already
//! taken by an earlier pack is a registration error; event listeners are the
//! exception, where every pack may attach its own listener to the same
//! event name.

use nodeforge_core::env::{EventListenerDef, GameEnv};

use crate::schema::ContentPack;
use crate::validate::{self, ValidationError};

/// Why a pack could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("pack `{pack}` redefines node type `{name}` from pack `{taken_by}`")]
    DuplicateNode {
        pack: String,
        name: String,
        taken_by: String,
    },
    #[error("pack `{pack}` redefines item type `{name}` from pack `{taken_by}`")]
    DuplicateItem {
        pack: String,
        name: String,
        taken_by: String,
    },
    #[error("pack `{pack}` redefines custom type `{name}` from pack `{taken_by}`")]
    DuplicateType {
        pack: String,
        name: String,
        taken_by: String,
    },
    #[error("a pack named `{0}` is already registered")]
    DuplicatePack(String),
}

/// Accumulates packs into a merged, not-yet-validated environment.
#[derive(Debug, Default)]
pub struct Registry {
    env: GameEnv,
    /// Definition name → owning pack, for duplicate diagnostics.
    owners: Owners,
    packs: Vec<String>,
}

#[derive(Debug, Default)]
struct Owners {
    nodes: indexmap::IndexMap<String, String>,
    items: indexmap::IndexMap<String, String>,
    types: indexmap::IndexMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the packs registered so far, in load order.
    pub fn packs(&self) -> &[String] {
        &self.packs
    }

    /// Merges one pack into the environment.
    pub fn register(&mut self, pack: ContentPack) -> Result<(), RegistryError> {
        if self.packs.iter().any(|name| *name == pack.display) {
            return Err(RegistryError::DuplicatePack(pack.display));
        }

        // Check every name before committing anything, so a rejected pack
        // leaves the registry untouched.
        for name in pack.nodes.keys() {
            if let Some(taken_by) = self.owners.nodes.get(name) {
                return Err(RegistryError::DuplicateNode {
                    pack: pack.display,
                    name: name.clone(),
                    taken_by: taken_by.clone(),
                });
            }
        }
        for name in pack.items.keys() {
            if let Some(taken_by) = self.owners.items.get(name) {
                return Err(RegistryError::DuplicateItem {
                    pack: pack.display,
                    name: name.clone(),
                    taken_by: taken_by.clone(),
                });
            }
        }
        for name in pack.types.keys() {
            if let Some(taken_by) = self.owners.types.get(name) {
                return Err(RegistryError::DuplicateType {
                    pack: pack.display,
                    name: name.clone(),
                    taken_by: taken_by.clone(),
                });
            }
        }

        for (name, def) in pack.nodes {
            self.owners.nodes.insert(name.clone(), pack.display.clone());
            self.env.nodes.insert(name, def);
        }
        for (name, def) in pack.items {
            self.owners.items.insert(name.clone(), pack.display.clone());
            self.env.items.insert(name, def);
        }
        for (name, def) in pack.types {
            self.owners.types.insert(name.clone(), pack.display.clone());
            self.env.types.insert(name, def);
        }
        for (event, body) in pack.event_listeners {
            self.env
                .listeners
                .entry(event)
                .or_default()
                .push(EventListenerDef {
                    pack: pack.display.clone(),
                    body,
                });
        }

        self.packs.push(pack.display);
        Ok(())
    }

    /// Validates the merged environment and hands it over.
    ///
    /// Validation runs across all packs at once because definitions refer to
    /// each other freely across pack boundaries. All errors are collected,
    /// not just the first.
    pub fn finish(self) -> Result<GameEnv, Vec<ValidationError>> {
        let errors = validate::validate(&self.env);
        if errors.is_empty() {
            Ok(self.env)
        } else {
            Err(errors)
        }
    }

    /// The merged environment without validation, for tooling that wants to
    /// inspect a broken pack set.
    pub fn into_unchecked(self) -> GameEnv {
        self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pack(name: &str, body: serde_json::Value) -> ContentPack {
        let mut json = body;
        json["display"] = json!(name);
        ContentPack::from_json(json).unwrap()
    }

    #[test]
    fn listeners_from_multiple_packs_stack_in_load_order() {
        let mut registry = Registry::new();
        registry
            .register(pack(
                "base",
                json!({"eventListeners": {"tick": [{"_type": "event", "event": "a"}]}}),
            ))
            .unwrap();
        registry
            .register(pack(
                "addon",
                json!({"eventListeners": {"tick": [{"_type": "event", "event": "b"}]}}),
            ))
            .unwrap();

        let env = registry.finish().unwrap();
        let packs: Vec<&str> = env
            .listeners_for("tick")
            .iter()
            .map(|l| l.pack.as_str())
            .collect();
        assert_eq!(packs, vec!["base", "addon"]);
    }

    #[test]
    fn duplicate_definitions_are_rejected_whole() {
        let mut registry = Registry::new();
        registry
            .register(pack(
                "base",
                json!({"nodes": {"miner": {"display": "Miner", "size": 1}}}),
            ))
            .unwrap();
        let err = registry
            .register(pack(
                "addon",
                json!({
                    "items": {"gear": {"display": "Gear"}},
                    "nodes": {"miner": {"display": "Miner 2", "size": 1}}
                }),
            ))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateNode { .. }));

        // The rejected pack contributed nothing, not even its item.
        let env = registry.finish().unwrap();
        assert!(env.item_type("gear").is_none());
    }
}
