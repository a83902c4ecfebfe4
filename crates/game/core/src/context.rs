//! Per-invocation evaluation context.
//!
//! A context maps object ids to live bindings for exactly one script
//! invocation. It is owned by the execution that created it (it travels
//! inside a suspended execution record) and is never shared across
//! concurrent evaluations.

use indexmap::IndexMap;

use crate::state::NodeId;
use crate::value::{Dict, Value};

/// What an id in the context resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A live node in the world, by stable handle.
    Node(NodeId),
    /// A typed object with context-local data (custom-type instances the
    /// embedder registered, method receivers).
    Object {
        /// Custom type declaring the object's methods and properties.
        type_name: String,
        data: Dict,
    },
    /// A plain value (loop elements, method parameters, event payloads).
    Plain(Value),
}

/// The runtime environment for one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    bindings: IndexMap<String, Binding>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Binding> {
        self.bindings.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Binding> {
        self.bindings.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bindings.contains_key(id)
    }

    /// Binds an id, returning the previous binding so scoped constructs
    /// (loops, map/filter) can restore it when their scope ends.
    pub fn bind(&mut self, id: impl Into<String>, binding: Binding) -> Option<Binding> {
        self.bindings.insert(id.into(), binding)
    }

    /// Restores (or removes) a binding saved by [`Context::bind`].
    pub fn unbind(&mut self, id: &str, previous: Option<Binding>) {
        match previous {
            Some(binding) => {
                self.bindings.insert(id.to_string(), binding);
            }
            None => {
                self.bindings.shift_remove(id);
            }
        }
    }

    /// Convenience: binds the acting node under the conventional `"node"` id.
    pub fn with_node(mut self, id: NodeId) -> Self {
        self.bind("node", Binding::Node(id));
        self
    }

    /// Convenience: binds a plain value.
    pub fn with_value(mut self, id: impl Into<String>, value: Value) -> Self {
        self.bind(id, Binding::Plain(value));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_unbind_restore_shadowed_bindings() {
        let mut ctx = Context::new().with_value("element", Value::Number(1.0));
        let previous = ctx.bind("element", Binding::Plain(Value::Number(2.0)));
        assert_eq!(
            ctx.get("element"),
            Some(&Binding::Plain(Value::Number(2.0)))
        );
        ctx.unbind("element", previous);
        assert_eq!(
            ctx.get("element"),
            Some(&Binding::Plain(Value::Number(1.0)))
        );
        ctx.unbind("element", None);
        assert!(!ctx.contains("element"));
    }
}
