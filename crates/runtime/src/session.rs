//! A running game session.
//!
//! [`Session`] owns the authoritative state, the merged content environment,
//! the deterministic RNG, and the scheduler, and exposes the handful of
//! entry points through which anything ever happens: placing nodes,
//! triggering node actions, emitting events, player inventory transfers,
//! and advancing game time. Every script a session runs flows through the
//! same drive/settle pair, so deferred effects (queued events, `place`
//! hooks, suspended continuations) behave identically no matter what kicked
//! the script off.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info_span, warn};

use nodeforge_core::{
    Action, Binding, Budget, Context, Dict, EmittedEvent, Execution, Fault, GameEnv, GameState,
    ItemStack, NodeId, Outbox, Position, Progress, ScriptEnv, SessionRng, Value, evaluate,
    spawn_node,
};

use crate::scheduler::Scheduler;

/// Queued events are bounded so a listener that re-emits its own event
/// cannot wedge the session; overflow drops the event with a diagnostic.
const MAX_PENDING_EVENTS: usize = 1024;

/// Why a session entry point refused or failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("no node `{0}` in the world")]
    UnknownNode(NodeId),
    #[error("no node type named `{0}`")]
    UnknownNodeType(String),
    #[error("node {node} has no action `{action}`")]
    UnknownAction { node: NodeId, action: String },
    #[error("node {node} is busy until t={until}")]
    NodeBusy { node: NodeId, until: f64 },
    #[error("cost cannot be paid: {missing:?} missing from {node}")]
    CostUnpayable { node: NodeId, missing: ItemStack },
    #[error("items do not fit in the inventory of {0}")]
    DoesNotFit(NodeId),
    #[error("node {0} has no inventory")]
    NoInventory(NodeId),
    #[error("{missing:?} missing from {node}")]
    MissingItems { node: NodeId, missing: ItemStack },
    #[error("player extraction is disabled on {0}")]
    ExtractForbidden(NodeId),
    #[error("player insertion is disabled on {0}")]
    InsertForbidden(NodeId),
    #[error(transparent)]
    Fault(#[from] Fault),
}

/// Out-of-band occurrences the embedder may want to surface or log. Faults
/// inside listeners and resumed continuations land here instead of
/// propagating, since no caller is on the stack to receive them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ScriptFaulted { node: Option<NodeId>, fault: Fault },
    ExecutionCancelled { node: NodeId },
    EventDropped { name: String },
}

pub struct Session {
    env: GameEnv,
    state: GameState,
    rng: SessionRng,
    scheduler: Scheduler,
    /// Node → game time until which its actions cannot be re-triggered.
    busy_until: IndexMap<NodeId, f64>,
    pending_events: VecDeque<EmittedEvent>,
    pending_places: VecDeque<NodeId>,
    diagnostics: Vec<SessionEvent>,
    budget_steps: u64,
}

impl Session {
    pub fn new(env: GameEnv, seed: u64) -> Self {
        Self::from_state(env, GameState::default(), seed)
    }

    /// Resumes a session over previously synchronized state.
    pub fn from_state(env: GameEnv, state: GameState, seed: u64) -> Self {
        Self {
            env,
            state,
            rng: SessionRng::new(seed),
            scheduler: Scheduler::new(),
            busy_until: IndexMap::new(),
            pending_events: VecDeque::new(),
            pending_places: VecDeque::new(),
            diagnostics: Vec::new(),
            budget_steps: Budget::DEFAULT_STEPS,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn env(&self) -> &GameEnv {
        &self.env
    }

    /// Current game time in seconds.
    pub fn now(&self) -> f64 {
        self.scheduler.now()
    }

    /// Drains accumulated diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.diagnostics)
    }

    // ---- entry points ----

    /// Places a node of the given type, runs its `place` hook, and settles.
    pub fn place_node(
        &mut self,
        type_name: &str,
        pos: Position,
        data: Dict,
    ) -> Result<NodeId, SessionError> {
        let _span = info_span!("place_node", node_type = type_name).entered();
        if self.env.node_type(type_name).is_none() {
            return Err(SessionError::UnknownNodeType(type_name.to_string()));
        }

        let mut outbox = Outbox::default();
        let mut budget = Budget::new(self.budget_steps);
        let id = {
            let mut env = ScriptEnv {
                state: &mut self.state,
                env: &self.env,
                rng: &mut self.rng,
                outbox: &mut outbox,
                budget: &mut budget,
            };
            spawn_node(type_name, pos, data, &mut env)?
        };
        self.absorb(outbox);
        self.pending_places.push_back(id);
        self.settle();
        Ok(id)
    }

    /// Removes a node and cancels every execution waiting on it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SessionError> {
        self.state
            .remove_node(id)
            .ok_or(SessionError::UnknownNode(id))?;
        let cancelled = self.scheduler.cancel_watching(id);
        if cancelled > 0 {
            debug!(node = %id, cancelled, "cancelled pending executions");
            self.diagnostics
                .push(SessionEvent::ExecutionCancelled { node: id });
        }
        self.busy_until.shift_remove(&id);
        Ok(())
    }

    /// Triggers a named action on a node: checks busy state, charges the
    /// cost atomically, then runs the body (possibly suspending on `wait`).
    ///
    /// The action's `duration` is busy time: the node refuses re-triggers
    /// until it elapses, independent of any `wait` inside the body.
    pub fn trigger_node_action(&mut self, node: NodeId, action: &str) -> Result<(), SessionError> {
        let _span = info_span!("trigger_action", node = %node, action).entered();

        let type_name = self
            .state
            .node(node)
            .ok_or(SessionError::UnknownNode(node))?
            .type_name
            .clone();
        let def = self
            .env
            .node_type(&type_name)
            .ok_or_else(|| SessionError::UnknownNodeType(type_name.clone()))?
            .actions
            .get(action)
            .cloned()
            .ok_or_else(|| SessionError::UnknownAction {
                node,
                action: action.to_string(),
            })?;

        let now = self.scheduler.now();
        if let Some(&until) = self.busy_until.get(&node) {
            if until > now {
                return Err(SessionError::NodeBusy { node, until });
            }
        }

        let mut ctx = Context::new().with_node(node);

        let duration = self.eval_in(&def.duration, &mut ctx)?;
        let duration = duration
            .as_number()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| Fault::mismatch("duration", &duration))?;

        if let Some(cost) = &def.cost {
            let cost = self.eval_in(cost, &mut ctx)?;
            let stacks = self.stacks_from(&cost)?;
            let inventory = &mut self
                .state
                .node_mut(node)
                .ok_or(SessionError::UnknownNode(node))?
                .inventory;
            if let Err(missing) = inventory.withdraw(&stacks) {
                return Err(SessionError::CostUnpayable { node, missing });
            }
        }

        self.busy_until.insert(node, now + duration);

        let result = self.drive(Execution::new(def.body, ctx, Some(node)));
        self.settle();
        result.map_err(SessionError::from)
    }

    /// Emits an event as if a script had raised it.
    pub fn emit(&mut self, name: impl Into<String>, data: Value) {
        self.enqueue_event(EmittedEvent {
            name: name.into(),
            data,
        });
        self.settle();
    }

    /// Advances game time, resuming every execution that comes due within
    /// the window, in time order.
    pub fn advance(&mut self, dt: f64) {
        let _span = info_span!("advance", dt).entered();
        self.scheduler.advance(dt);

        while let Some(entry) = self.scheduler.next_due() {
            let acting = entry.execution.acting_node;
            // Both the acting node and the node the wait named must still
            // exist for the continuation to resume.
            let gone = entry
                .watch
                .into_iter()
                .chain(acting)
                .find(|node| self.state.node(*node).is_none());
            if let Some(node) = gone {
                debug!(node = %node, "continuation cancelled, node is gone");
                self.diagnostics
                    .push(SessionEvent::ExecutionCancelled { node });
                continue;
            }
            if let Err(fault) = self.drive(entry.execution) {
                warn!(%fault, "resumed execution faulted");
                self.diagnostics.push(SessionEvent::ScriptFaulted {
                    node: acting,
                    fault,
                });
            }
            self.settle();
        }
    }

    /// Player-initiated insert, honoring the type's `canPlayerInsert` gate.
    pub fn player_insert(&mut self, node: NodeId, items: &[ItemStack]) -> Result<(), SessionError> {
        let def = self.inventory_def(node)?;
        if let Some(gate) = def.can_player_insert.clone() {
            if !self.eval_gate(&gate, node)? {
                return Err(SessionError::InsertForbidden(node));
            }
        }

        let mut caps = Vec::with_capacity(items.len());
        for stack in items {
            caps.push((stack.item.clone(), self.stack_cap(&stack.item)?));
        }
        let inventory = &mut self
            .state
            .node_mut(node)
            .ok_or(SessionError::UnknownNode(node))?
            .inventory;
        inventory
            .insert(items, |item| {
                caps.iter()
                    .find(|(name, _)| name == item)
                    .and_then(|(_, cap)| *cap)
            })
            .map_err(|_| SessionError::DoesNotFit(node))?;
        self.settle();
        Ok(())
    }

    /// Player-initiated extraction, honoring `canPlayerExtract`.
    pub fn player_extract(
        &mut self,
        node: NodeId,
        items: &[ItemStack],
    ) -> Result<(), SessionError> {
        let def = self.inventory_def(node)?;
        if let Some(gate) = def.can_player_extract.clone() {
            if !self.eval_gate(&gate, node)? {
                return Err(SessionError::ExtractForbidden(node));
            }
        }
        let inventory = &mut self
            .state
            .node_mut(node)
            .ok_or(SessionError::UnknownNode(node))?
            .inventory;
        inventory
            .withdraw(items)
            .map_err(|missing| SessionError::MissingItems { node, missing })?;
        self.settle();
        Ok(())
    }

    // ---- script plumbing ----

    /// Runs an execution to completion or suspension, absorbing its deferred
    /// effects either way. Mutations committed before a fault stay.
    fn drive(&mut self, mut execution: Execution) -> Result<(), Fault> {
        let mut outbox = Outbox::default();
        let mut budget = Budget::new(self.budget_steps);
        let result = {
            let mut env = ScriptEnv {
                state: &mut self.state,
                env: &self.env,
                rng: &mut self.rng,
                outbox: &mut outbox,
                budget: &mut budget,
            };
            execution.run(&mut env)
        };
        self.absorb(outbox);

        match result? {
            Progress::Done(_) => Ok(()),
            Progress::Suspended(pause) => {
                // The acting node is tracked on the execution itself; only
                // the node the wait explicitly named goes in `watch`.
                debug!(delay = pause.duration, "execution suspended");
                self.scheduler.park(pause.duration, pause.node, execution);
                Ok(())
            }
        }
    }

    /// Works off queued `place` hooks and events until both queues drain.
    /// Listener and hook faults become diagnostics; there is no script on
    /// the stack to receive them.
    fn settle(&mut self) {
        loop {
            if let Some(id) = self.pending_places.pop_front() {
                self.run_place_hook(id);
                continue;
            }
            let Some(event) = self.pending_events.pop_front() else {
                break;
            };
            self.dispatch(event);
        }
    }

    fn run_place_hook(&mut self, id: NodeId) {
        let Some(node) = self.state.node(id) else {
            return;
        };
        let Some(def) = self.env.node_type(&node.type_name) else {
            return;
        };
        let body = def.place.clone();
        if body.is_empty() {
            return;
        }
        let ctx = Context::new().with_node(id);
        if let Err(fault) = self.drive(Execution::new(body, ctx, Some(id))) {
            warn!(node = %id, %fault, "place hook faulted");
            self.diagnostics.push(SessionEvent::ScriptFaulted {
                node: Some(id),
                fault,
            });
        }
    }

    fn dispatch(&mut self, event: EmittedEvent) {
        let listeners: Vec<Arc<[Action]>> = self
            .env
            .listeners_for(&event.name)
            .iter()
            .map(|listener| listener.body.clone())
            .collect();
        debug!(event = %event.name, listeners = listeners.len(), "dispatching");
        for body in listeners {
            let ctx = Context::new().with_value("data", event.data.clone());
            if let Err(fault) = self.drive(Execution::new(body, ctx, None)) {
                warn!(event = %event.name, %fault, "event listener faulted");
                self.diagnostics
                    .push(SessionEvent::ScriptFaulted { node: None, fault });
            }
        }
    }

    fn absorb(&mut self, outbox: Outbox) {
        for event in outbox.events {
            self.enqueue_event(event);
        }
        self.pending_places.extend(outbox.placed);
    }

    fn enqueue_event(&mut self, event: EmittedEvent) {
        if self.pending_events.len() >= MAX_PENDING_EVENTS {
            warn!(event = %event.name, "event queue full, dropping");
            self.diagnostics
                .push(SessionEvent::EventDropped { name: event.name });
            return;
        }
        self.pending_events.push_back(event);
    }

    // ---- small helpers ----

    /// Evaluates an expression in the given context, absorbing any deferred
    /// effects it produces (method bodies may emit events).
    fn eval_in(
        &mut self,
        expr: &nodeforge_core::Expr,
        ctx: &mut Context,
    ) -> Result<Value, Fault> {
        let mut outbox = Outbox::default();
        let mut budget = Budget::new(self.budget_steps);
        let result = {
            let mut env = ScriptEnv {
                state: &mut self.state,
                env: &self.env,
                rng: &mut self.rng,
                outbox: &mut outbox,
                budget: &mut budget,
            };
            evaluate(expr, ctx, &mut env)
        };
        self.absorb(outbox);
        result
    }

    fn eval_gate(&mut self, gate: &nodeforge_core::Expr, node: NodeId) -> Result<bool, Fault> {
        let mut ctx = Context::new().with_node(node);
        let value = self.eval_in(gate, &mut ctx)?;
        value
            .as_bool()
            .ok_or_else(|| Fault::mismatch("boolean", &value))
    }

    fn inventory_def(
        &self,
        node: NodeId,
    ) -> Result<nodeforge_core::InventoryDef, SessionError> {
        let type_name = &self
            .state
            .node(node)
            .ok_or(SessionError::UnknownNode(node))?
            .type_name;
        self.env
            .node_type(type_name)
            .ok_or_else(|| SessionError::UnknownNodeType(type_name.clone()))?
            .inventory
            .clone()
            .ok_or(SessionError::NoInventory(node))
    }

    fn stack_cap(&mut self, item: &str) -> Result<Option<u64>, Fault> {
        let Some(def) = self.env.item_type(item) else {
            return Err(Fault::UnknownReference(item.to_string()));
        };
        let Some(expr) = def.max_stack_size.clone() else {
            return Ok(None);
        };
        let mut ctx = Context::new();
        let value = self.eval_in(&expr, &mut ctx)?;
        value
            .as_count()
            .map(Some)
            .ok_or_else(|| Fault::mismatch("number", &value))
    }

    /// Converts an evaluated cost value to concrete item stacks. Costs are
    /// authored as a dictionary of stacks (the keys are author labels); an
    /// array is accepted too.
    fn stacks_from(&self, value: &Value) -> Result<Vec<ItemStack>, Fault> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Dict(entries) => entries.values().collect(),
            other => return Err(Fault::mismatch("item stacks", other)),
        };
        let mut stacks = Vec::with_capacity(items.len());
        for item in items {
            let entry = item
                .as_dict()
                .ok_or_else(|| Fault::mismatch("itemStack", item))?;
            let name = entry
                .get("item")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Fault::mismatch("itemStack", item))?;
            if self.env.item_type(name).is_none() {
                return Err(Fault::UnknownReference(name.to_string()));
            }
            let quantity = entry
                .get("quantity")
                .and_then(|v| v.as_count())
                .ok_or_else(|| Fault::mismatch("itemStack", item))?;
            if quantity > 0 {
                stacks.push(ItemStack::new(name, quantity));
            }
        }
        Ok(stacks)
    }
}

/// Registers a typed custom object in a context, for embedders that hand
/// scripts pre-built objects (quests, UI state) beyond the conventional
/// bindings.
pub fn bind_object(ctx: &mut Context, id: impl Into<String>, type_name: impl Into<String>, data: Dict) {
    ctx.bind(
        id,
        Binding::Object {
            type_name: type_name.into(),
            data,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeforge_content::load_packs;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn test_pack() -> String {
        json!({
            "display": "Test",
            "items": {
                "ore": {"display": "Ore", "maxStackSize": 10},
                "ingot": {"display": "Ingot"}
            },
            "nodes": {
                "miner": {
                    "display": "Miner",
                    "size": 1,
                    "data": {"mined": {"_type": "number", "default": 0}},
                    "inventory": {"slots": 2, "canPlayerInsert": false},
                    "actions": {
                        "mine": {
                            "display": "Mine",
                            "duration": 2,
                            "run": [
                                {
                                    "_type": "addItemsToInventory",
                                    "node": {"_type": "getContext", "id": "node"},
                                    "items": [{"item": "ore", "quantity": 3}]
                                },
                                {
                                    "_type": "setData",
                                    "object": {"_type": "getContext", "id": "node"},
                                    "key": "mined",
                                    "value": {
                                        "_type": "addition",
                                        "operands": [
                                            {
                                                "_type": "property",
                                                "object": {"_type": "getContext", "id": "node"},
                                                "property": "mined"
                                            },
                                            3
                                        ]
                                    }
                                },
                                {"_type": "event", "event": "oreMined", "data": 3}
                            ]
                        }
                    }
                },
                "smelter": {
                    "display": "Smelter",
                    "size": 1,
                    "data": {"done": {"_type": "boolean", "default": false}},
                    "inventory": {"slots": 2},
                    "actions": {
                        "smelt": {
                            "display": "Smelt",
                            "duration": 6,
                            "cost": {"ore": {"item": "ore", "quantity": 2}},
                            "run": [
                                {"_type": "wait", "duration": 5},
                                {
                                    "_type": "addItemsToInventory",
                                    "node": {"_type": "getContext", "id": "node"},
                                    "items": [{"item": "ingot", "quantity": 1}]
                                },
                                {
                                    "_type": "setData",
                                    "object": {"_type": "getContext", "id": "node"},
                                    "key": "done",
                                    "value": true
                                }
                            ]
                        }
                    }
                },
                "tank": {
                    "display": "Tank",
                    "size": 1,
                    "data": {"level": {"_type": "number", "default": 0}}
                },
                "pump": {
                    "display": "Pump",
                    "size": 1,
                    "data": {"peer": {"_type": "id", "of": "node"}},
                    "actions": {
                        "sync": {
                            "display": "Sync",
                            "duration": 0,
                            "run": [
                                {
                                    "_type": "wait",
                                    "duration": 1,
                                    "node": {
                                        "_type": "property",
                                        "object": {"_type": "getContext", "id": "node"},
                                        "property": "peer"
                                    }
                                },
                                {
                                    "_type": "setData",
                                    "object": {
                                        "_type": "property",
                                        "object": {"_type": "getContext", "id": "node"},
                                        "property": "peer"
                                    },
                                    "key": "level",
                                    "value": 9
                                }
                            ]
                        }
                    }
                },
                "counter": {
                    "display": "Counter",
                    "size": 1,
                    "data": {"seen": {"_type": "number", "default": 0}},
                    "place": [
                        {
                            "_type": "setData",
                            "object": {"_type": "getContext", "id": "node"},
                            "key": "seen",
                            "value": 1
                        }
                    ]
                }
            }
        })
        .to_string()
    }

    fn session() -> Session {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let env = load_packs([test_pack().as_str()]).unwrap();
        Session::new(env, 42)
    }

    fn number_field(session: &Session, node: NodeId, key: &str) -> f64 {
        session
            .state()
            .node(node)
            .unwrap()
            .data
            .get(key)
            .and_then(Value::as_number)
            .unwrap()
    }

    #[test]
    fn triggering_an_action_mutates_state_and_applies_busy_time() {
        let mut session = session();
        let miner = session
            .place_node("miner", Position { x: 0.0, y: 0.0 }, Dict::new())
            .unwrap();

        session.trigger_node_action(miner, "mine").unwrap();
        assert_eq!(number_field(&session, miner, "mined"), 3.0);
        assert_eq!(
            session.state().node(miner).unwrap().inventory.quantity_of("ore"),
            3
        );

        // Busy for the action's duration.
        let err = session.trigger_node_action(miner, "mine").unwrap_err();
        assert_eq!(
            err,
            SessionError::NodeBusy {
                node: miner,
                until: 2.0
            }
        );
        session.advance(2.0);
        session.trigger_node_action(miner, "mine").unwrap();
        assert_eq!(number_field(&session, miner, "mined"), 6.0);
    }

    #[test]
    fn wait_defers_the_rest_of_the_body_until_time_passes() {
        let mut session = session();
        let miner = session
            .place_node("miner", Position { x: 0.0, y: 0.0 }, Dict::new())
            .unwrap();
        let smelter = session
            .place_node("smelter", Position { x: 1.0, y: 0.0 }, Dict::new())
            .unwrap();

        session.trigger_node_action(miner, "mine").unwrap();
        session
            .player_extract(miner, &[ItemStack::new("ore", 2)])
            .unwrap();
        session
            .player_insert(smelter, &[ItemStack::new("ore", 2)])
            .unwrap();

        session.trigger_node_action(smelter, "smelt").unwrap();
        // Cost charged up front, body suspended at the wait.
        assert_eq!(
            session.state().node(smelter).unwrap().inventory.quantity_of("ore"),
            0
        );
        assert_eq!(
            session.state().node(smelter).unwrap().data["done"],
            Value::Bool(false)
        );

        session.advance(4.0);
        assert_eq!(
            session.state().node(smelter).unwrap().data["done"],
            Value::Bool(false)
        );

        session.advance(1.0);
        assert_eq!(
            session.state().node(smelter).unwrap().data["done"],
            Value::Bool(true)
        );
        assert_eq!(
            session.state().node(smelter).unwrap().inventory.quantity_of("ingot"),
            1
        );
    }

    #[test]
    fn cost_failure_charges_nothing_and_runs_nothing() {
        let mut session = session();
        let smelter = session
            .place_node("smelter", Position { x: 0.0, y: 0.0 }, Dict::new())
            .unwrap();
        session
            .player_insert(smelter, &[ItemStack::new("ore", 1)])
            .unwrap();

        let err = session.trigger_node_action(smelter, "smelt").unwrap_err();
        assert_eq!(
            err,
            SessionError::CostUnpayable {
                node: smelter,
                missing: ItemStack::new("ore", 1)
            }
        );
        assert_eq!(
            session.state().node(smelter).unwrap().inventory.quantity_of("ore"),
            1
        );
        // Not marked busy either.
        session.trigger_node_action(smelter, "smelt").unwrap_err();
    }

    #[test]
    fn removing_a_node_cancels_its_suspended_continuation() {
        let mut session = session();
        let smelter = session
            .place_node("smelter", Position { x: 0.0, y: 0.0 }, Dict::new())
            .unwrap();
        session
            .player_insert(smelter, &[ItemStack::new("ore", 2)])
            .unwrap();
        session.trigger_node_action(smelter, "smelt").unwrap();

        session.remove_node(smelter).unwrap();
        session.advance(10.0);

        let diagnostics = session.take_diagnostics();
        assert!(diagnostics.contains(&SessionEvent::ExecutionCancelled { node: smelter }));
        assert!(session.state().node(smelter).is_none());
    }

    #[test]
    fn removing_the_acting_node_cancels_a_wait_on_another_node() {
        let mut session = session();
        let tank = session
            .place_node("tank", Position { x: 0.0, y: 0.0 }, Dict::new())
            .unwrap();
        let mut data = Dict::new();
        data.insert(
            "peer".to_string(),
            Value::Ref(nodeforge_core::ObjectHandle::Node(tank)),
        );
        let pump = session
            .place_node("pump", Position { x: 1.0, y: 0.0 }, data)
            .unwrap();

        session.trigger_node_action(pump, "sync").unwrap();
        session.remove_node(pump).unwrap();
        session.advance(2.0);

        // The parked continuation must not run: the tank stays untouched
        // and no fault is recorded.
        assert_eq!(number_field(&session, tank, "level"), 0.0);
        let diagnostics = session.take_diagnostics();
        assert!(diagnostics.contains(&SessionEvent::ExecutionCancelled { node: pump }));
        assert!(!diagnostics
            .iter()
            .any(|d| matches!(d, SessionEvent::ScriptFaulted { .. })));
    }

    #[test]
    fn place_hooks_run_after_placement() {
        let mut session = session();
        let counter = session
            .place_node("counter", Position { x: 0.0, y: 0.0 }, Dict::new())
            .unwrap();
        assert_eq!(number_field(&session, counter, "seen"), 1.0);
    }

    #[test]
    fn player_insert_gate_is_enforced() {
        let mut session = session();
        let miner = session
            .place_node("miner", Position { x: 0.0, y: 0.0 }, Dict::new())
            .unwrap();
        let err = session
            .player_insert(miner, &[ItemStack::new("ore", 1)])
            .unwrap_err();
        assert_eq!(err, SessionError::InsertForbidden(miner));
    }

    #[test]
    fn identical_seeds_replay_identically() {
        let env_a = load_packs([test_pack().as_str()]).unwrap();
        let env_b = load_packs([test_pack().as_str()]).unwrap();
        let mut a = Session::new(env_a, 7);
        let mut b = Session::new(env_b, 7);
        for session in [&mut a, &mut b] {
            let miner = session
                .place_node("miner", Position { x: 0.0, y: 0.0 }, Dict::new())
                .unwrap();
            session.trigger_node_action(miner, "mine").unwrap();
            session.advance(3.0);
            session.trigger_node_action(miner, "mine").unwrap();
        }
        assert_eq!(a.state(), b.state());
    }
}
