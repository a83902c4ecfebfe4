//! Content pack loading for the block interpreter.
//!
//! `nodeforge-content` owns everything between a pack's JSON source and the
//! canonical [`GameEnv`](nodeforge_core::GameEnv) the interpreter consumes:
//! parsing ([`ContentPack`]), merging across packs ([`Registry`]), and
//! static validation ([`validate`]). A pack that makes it through
//! [`Registry::finish`] is guaranteed free of the whole static error class;
//! only runtime faults remain possible afterwards.
pub mod registry;
pub mod schema;
pub mod validate;

pub use registry::{Registry, RegistryError};
pub use schema::{ContentPack, PackError};
pub use validate::{ValidationError, ValidationKind, validate};

/// Loads and validates a set of pack sources in one go, in the given order.
pub fn load_packs<'a>(
    sources: impl IntoIterator<Item = &'a str>,
) -> Result<nodeforge_core::GameEnv, LoadError> {
    let mut registry = Registry::new();
    for source in sources {
        let pack = ContentPack::from_str(source)?;
        registry.register(pack)?;
    }
    registry.finish().map_err(LoadError::Validation)
}

/// Any failure while loading a pack set.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("{} validation error(s), first: {}", .0.len(), .0[0])]
    Validation(Vec<ValidationError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_PACK: &str = include_str!("../data/base.json");

    #[test]
    fn bundled_base_pack_loads_clean() {
        let env = load_packs([BASE_PACK]).unwrap();
        assert!(env.node_type("miner").is_some());
        assert!(env.node_type("smelter").is_some());
        assert!(env.item_type("ironOre").is_some());
        assert!(env.custom_type("tally").is_some());
        assert_eq!(env.listeners_for("oreMined").len(), 1);
    }

    #[test]
    fn bundled_pack_survives_a_reserialize_cycle() {
        // Packs travel between peers as JSON; a decode/encode cycle must not
        // change what they mean.
        let decoded: serde_json::Value = serde_json::from_str(BASE_PACK).unwrap();
        let reencoded = serde_json::to_string(&decoded).unwrap();
        let env = load_packs([reencoded.as_str()]).unwrap();
        assert!(env.node_type("miner").is_some());
    }
}
