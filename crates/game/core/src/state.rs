//! Authoritative game state representation.
//!
//! The world is a flat list of placed nodes under `layers.world`, matching
//! the wire schema the synchronization layer ships between clients. Runtime
//! layers read this state freely but mutate it exclusively through the
//! action interpreter's state actions.

use core::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable handle to a placed node.
///
/// Ids are allocated monotonically and never reused, so a handle held by a
/// suspended script stays unambiguous: after removal it simply fails to
/// resolve instead of aliasing a newer node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Parses the canonical `node-N` string form.
    pub fn parse(text: &str) -> Option<NodeId> {
        text.strip_prefix("node-")
            .and_then(|digits| digits.parse().ok())
            .map(NodeId)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// A position in the world plane. Always finite.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Option<Position> {
        (x.is_finite() && y.is_finite()).then_some(Position { x, y })
    }
}

/// A stack of items of a single type. Quantity is always positive: empty
/// stacks are removed, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: String,
    pub quantity: u64,
}

impl ItemStack {
    pub fn new(item: impl Into<String>, quantity: u64) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }
}

/// Slot-based inventory attached to a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
}

/// Items that could not be placed by an inventory insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overflow(pub Vec<ItemStack>);

impl Inventory {
    pub fn with_slots(count: usize) -> Self {
        Self {
            slots: vec![None; count],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn stacks(&self) -> impl Iterator<Item = &ItemStack> {
        self.slots.iter().flatten()
    }

    /// Total quantity of one item across all slots.
    pub fn quantity_of(&self, item: &str) -> u64 {
        self.stacks()
            .filter(|stack| stack.item == item)
            .map(|stack| stack.quantity)
            .sum()
    }

    /// Inserts items, topping up existing stacks first and then filling
    /// empty slots, honoring `max_stack` per item type (None = unbounded).
    ///
    /// The insert is atomic: either everything fits and the inventory is
    /// updated, or nothing is mutated and the overflow is returned. Callers
    /// with a `destroy` overflow policy commit the partial placement via
    /// [`Inventory::insert_lossy`] instead.
    pub fn insert(
        &mut self,
        items: &[ItemStack],
        max_stack: impl Fn(&str) -> Option<u64>,
    ) -> Result<(), Overflow> {
        let (slots, overflow) = self.placed(items, &max_stack);
        if overflow.is_empty() {
            self.slots = slots;
            Ok(())
        } else {
            Err(Overflow(overflow))
        }
    }

    /// Inserts as much as fits and silently discards the rest.
    pub fn insert_lossy(&mut self, items: &[ItemStack], max_stack: impl Fn(&str) -> Option<u64>) {
        let (slots, _) = self.placed(items, &max_stack);
        self.slots = slots;
    }

    fn placed(
        &self,
        items: &[ItemStack],
        max_stack: &impl Fn(&str) -> Option<u64>,
    ) -> (Vec<Option<ItemStack>>, Vec<ItemStack>) {
        let mut slots = self.slots.clone();
        let mut overflow = Vec::new();

        for item in items {
            let cap = max_stack(&item.item).unwrap_or(u64::MAX);
            let mut remaining = item.quantity;

            // Top up existing stacks of the same item.
            for slot in slots.iter_mut().flatten() {
                if remaining == 0 {
                    break;
                }
                if slot.item == item.item && slot.quantity < cap {
                    let moved = remaining.min(cap - slot.quantity);
                    slot.quantity += moved;
                    remaining -= moved;
                }
            }

            // Then open new stacks in empty slots.
            for slot in slots.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if slot.is_none() {
                    let moved = remaining.min(cap);
                    *slot = Some(ItemStack::new(item.item.clone(), moved));
                    remaining -= moved;
                }
            }

            if remaining > 0 {
                overflow.push(ItemStack::new(item.item.clone(), remaining));
            }
        }

        (slots, overflow)
    }

    /// Withdraws the given stacks, atomically. On failure the inventory is
    /// untouched and the first missing item is reported.
    pub fn withdraw(&mut self, items: &[ItemStack]) -> Result<(), ItemStack> {
        for item in items {
            let available = self.quantity_of(&item.item);
            if available < item.quantity {
                return Err(ItemStack::new(
                    item.item.clone(),
                    item.quantity - available,
                ));
            }
        }

        for item in items {
            let mut remaining = item.quantity;
            for slot in self.slots.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if let Some(stack) = slot {
                    if stack.item == item.item {
                        let taken = remaining.min(stack.quantity);
                        stack.quantity -= taken;
                        remaining -= taken;
                        if stack.quantity == 0 {
                            *slot = None;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// One placed node in the world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: NodeId,
    pub pos: Position,
    /// Name of the node type in the active content packs.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Typed data fields, keyed by declared field name.
    #[serde(default)]
    pub data: IndexMap<String, Value>,
    #[serde(default)]
    pub inventory: Inventory,
}

/// The world layer: every placed node, in placement order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldLayer {
    pub nodes: Vec<NodeState>,
}

/// Named layers of the game state (only `world` today, matching the wire
/// schema's `layers.world.nodes` shape).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Layers {
    pub world: WorldLayer,
}

/// Canonical snapshot of the authoritative game state.
///
/// Serializable and structurally diffable; the synchronization layer ships
/// it whole or as deltas. Only the action interpreter mutates it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub layers: Layers,
    /// Sequential node id allocator (monotonically increasing, never reused).
    next_node_id: u64,
}

impl GameState {
    pub fn nodes(&self) -> &[NodeState] {
        &self.layers.world.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.layers.world.nodes.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeState> {
        self.layers
            .world
            .nodes
            .iter_mut()
            .find(|node| node.id == id)
    }

    /// Appends a node with a freshly allocated id and returns the id.
    pub fn add_node(
        &mut self,
        type_name: impl Into<String>,
        pos: Position,
        data: IndexMap<String, Value>,
        inventory: Inventory,
    ) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.layers.world.nodes.push(NodeState {
            id,
            pos,
            type_name: type_name.into(),
            data,
            inventory,
        });
        id
    }

    /// Removes a node. References held elsewhere become dangling handles
    /// that fail to resolve on next access.
    pub fn remove_node(&mut self, id: NodeId) -> Option<NodeState> {
        let index = self
            .layers
            .world
            .nodes
            .iter()
            .position(|node| node.id == id)?;
        Some(self.layers.world.nodes.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbounded(_: &str) -> Option<u64> {
        None
    }

    #[test]
    fn node_ids_are_never_reused() {
        let mut state = GameState::default();
        let a = state.add_node("miner", Position { x: 0.0, y: 0.0 }, IndexMap::new(), Inventory::default());
        state.remove_node(a);
        let b = state.add_node("miner", Position { x: 1.0, y: 1.0 }, IndexMap::new(), Inventory::default());
        assert_ne!(a, b);
        assert!(state.node(a).is_none());
        assert!(state.node(b).is_some());
    }

    #[test]
    fn insert_is_atomic_on_overflow() {
        let mut inventory = Inventory::with_slots(1);
        let items = vec![ItemStack::new("ore", 5), ItemStack::new("coal", 1)];
        let err = inventory.insert(&items, |_| Some(10)).unwrap_err();
        assert_eq!(err.0, vec![ItemStack::new("coal", 1)]);
        // Nothing committed, not even the ore that would have fit.
        assert_eq!(inventory.quantity_of("ore"), 0);
    }

    #[test]
    fn insert_respects_max_stack_size() {
        let mut inventory = Inventory::with_slots(3);
        inventory
            .insert(&[ItemStack::new("ore", 7)], |_| Some(3))
            .unwrap();
        let sizes: Vec<u64> = inventory.stacks().map(|s| s.quantity).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn insert_lossy_discards_excess() {
        let mut inventory = Inventory::with_slots(1);
        inventory.insert_lossy(&[ItemStack::new("ore", 5)], |_| Some(2));
        assert_eq!(inventory.quantity_of("ore"), 2);
    }

    #[test]
    fn withdraw_is_atomic_and_prunes_empty_stacks() {
        let mut inventory = Inventory::with_slots(2);
        inventory
            .insert(&[ItemStack::new("ore", 4)], unbounded)
            .unwrap();

        let missing = inventory
            .withdraw(&[ItemStack::new("ore", 2), ItemStack::new("coal", 1)])
            .unwrap_err();
        assert_eq!(missing, ItemStack::new("coal", 1));
        assert_eq!(inventory.quantity_of("ore"), 4);

        inventory.withdraw(&[ItemStack::new("ore", 4)]).unwrap();
        assert_eq!(inventory.stacks().count(), 0);
    }

    #[test]
    fn wire_shape_matches_protocol() {
        let mut state = GameState::default();
        state.add_node("miner", Position { x: 1.0, y: 2.0 }, IndexMap::new(), Inventory::default());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["layers"]["world"]["nodes"][0]["type"], "miner");
        assert_eq!(json["layers"]["world"]["nodes"][0]["pos"]["x"], 1.0);
    }
}
