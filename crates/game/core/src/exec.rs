//! Action execution.
//!
//! An [`Execution`] drives a script (a node action body, a `place` hook, an
//! event listener, a method body) over an explicit frame stack. The explicit
//! stack serves two purposes: action nesting can be arbitrarily deep in
//! untrusted content without growing the native call stack, and hitting a
//! `wait` turns the whole in-flight execution into a plain data structure
//! the scheduler can park and resume later.

use std::sync::Arc;

use crate::block::{Action, OverflowPolicy};
use crate::context::{Binding, Context};
use crate::env::{GameEnv, MethodDef};
use crate::error::Fault;
use crate::eval::{self, evaluate};
use crate::rng::SessionRng;
use crate::state::{GameState, Inventory, ItemStack, NodeId, Position};
use crate::value::{Dict, ObjectHandle, Value};

/// Everything an execution needs besides its own context: the mutable world,
/// the content definitions, the session RNG, the outbox for deferred
/// effects, and the work budget. One of these exists per run segment; the
/// embedder decides budget and drains the outbox between segments.
pub struct ScriptEnv<'a> {
    pub state: &'a mut GameState,
    pub env: &'a GameEnv,
    pub rng: &'a mut SessionRng,
    pub outbox: &'a mut Outbox,
    pub budget: &'a mut Budget,
}

/// Work budget guarding against runaway content (infinite `repeat`, deeply
/// nested expressions). Exhaustion is a fault, not a hang.
#[derive(Debug, Clone)]
pub struct Budget {
    steps: u64,
    depth: u32,
    max_depth: u32,
}

impl Budget {
    pub const DEFAULT_STEPS: u64 = 100_000;
    pub const DEFAULT_MAX_DEPTH: u32 = 128;

    pub fn new(steps: u64) -> Self {
        Self {
            steps,
            depth: 0,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    pub(crate) fn charge(&mut self) -> Result<(), Fault> {
        if self.steps == 0 {
            return Err(Fault::BudgetExceeded);
        }
        self.steps -= 1;
        Ok(())
    }

    pub(crate) fn descend(&mut self) -> Result<(), Fault> {
        if self.depth >= self.max_depth {
            return Err(Fault::BudgetExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STEPS)
    }
}

/// Effects that must not take hold mid-script: emitted events and freshly
/// placed nodes whose `place` hooks are still owed. The embedder drains
/// these after the emitting script completes or suspends, which is what
/// makes `event` enqueue instead of re-enter.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    pub events: Vec<EmittedEvent>,
    pub placed: Vec<NodeId>,
}

/// A named event raised by an `event` block.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub name: String,
    pub data: Value,
}

/// Result of driving an execution: it either finished (with the `@return`
/// value, `Void` otherwise) or parked itself on a `wait`.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Done(Value),
    Suspended(Pause),
}

/// The pending `wait`: how long, and on whose behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct Pause {
    pub duration: f64,
    /// Node the wait is associated with; defaults to the acting entity.
    pub node: Option<NodeId>,
}

/// One frame of suspended control flow.
#[derive(Debug, Clone)]
enum Frame {
    /// A plain action sequence with a cursor.
    Seq { body: Arc<[Action]>, index: usize },
    /// A `forEach` loop: remaining elements plus the shadowed `element`
    /// binding to restore when the loop ends.
    ForEach {
        body: Arc<[Action]>,
        items: Vec<Value>,
        next: usize,
        saved: Option<Binding>,
        started: bool,
    },
    /// A `repeat` loop with its remaining iteration count.
    Repeat { body: Arc<[Action]>, remaining: u64 },
}

/// What a single action asked the driver to do.
enum Step {
    Continue,
    Push(Frame),
    Break,
    Return(Value),
    Suspend(Pause),
}

/// A resumable script execution: saved control frames plus the context they
/// close over. Everything needed to resume after a `wait` lives here.
#[derive(Debug, Clone)]
pub struct Execution {
    frames: Vec<Frame>,
    pub ctx: Context,
    /// Entity this script acts for; removal of this node cancels the
    /// execution instead of resuming it.
    pub acting_node: Option<NodeId>,
}

impl Execution {
    pub fn new(body: Arc<[Action]>, ctx: Context, acting_node: Option<NodeId>) -> Self {
        Self {
            frames: vec![Frame::Seq { body, index: 0 }],
            ctx,
            acting_node,
        }
    }

    /// Runs until the script finishes, faults, or suspends on a `wait`.
    ///
    /// On `Progress::Suspended` the execution retains its full frame stack
    /// and context; calling `run` again resumes exactly after the wait.
    pub fn run(&mut self, env: &mut ScriptEnv<'_>) -> Result<Progress, Fault> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Progress::Done(Value::Void));
            };

            let action = match frame {
                Frame::Seq { body, index } => {
                    if *index >= body.len() {
                        self.frames.pop();
                        continue;
                    }
                    let action = body[*index].clone();
                    *index += 1;
                    action
                }
                Frame::ForEach {
                    body,
                    items,
                    next,
                    saved,
                    started,
                } => {
                    if *next >= items.len() {
                        let saved = saved.take();
                        let started = *started;
                        self.frames.pop();
                        if started {
                            self.ctx.unbind("element", saved);
                        }
                        continue;
                    }
                    let element = items[*next].clone();
                    *next += 1;
                    let body = body.clone();
                    let previous = self.ctx.bind("element", Binding::Plain(element));
                    if !*started {
                        *started = true;
                        *saved = previous;
                    }
                    self.frames.push(Frame::Seq { body, index: 0 });
                    continue;
                }
                Frame::Repeat { body, remaining } => {
                    if *remaining == 0 {
                        self.frames.pop();
                        continue;
                    }
                    *remaining -= 1;
                    let body = body.clone();
                    self.frames.push(Frame::Seq { body, index: 0 });
                    continue;
                }
            };

            env.budget.charge()?;
            match step(&action, &mut self.ctx, env)? {
                Step::Continue => {}
                Step::Push(frame) => self.frames.push(frame),
                Step::Break => self.unwind_to_loop()?,
                Step::Return(value) => {
                    self.frames.clear();
                    return Ok(Progress::Done(value));
                }
                Step::Suspend(pause) => return Ok(Progress::Suspended(pause)),
            }
        }
    }

    /// Pops frames until the nearest enclosing loop is discarded, consuming
    /// a `@break`. The loop's element binding is restored on the way out.
    fn unwind_to_loop(&mut self) -> Result<(), Fault> {
        while let Some(frame) = self.frames.pop() {
            match frame {
                Frame::Seq { .. } => {}
                Frame::ForEach { saved, started, .. } => {
                    if started {
                        self.ctx.unbind("element", saved);
                    }
                    return Ok(());
                }
                Frame::Repeat { .. } => return Ok(()),
            }
        }
        // Validation rejects a stray `@break`; reaching this is a bug.
        Err(Fault::Internal("`@break` with no enclosing loop"))
    }
}

/// Executes a single action, translating it into a driver instruction.
fn step(action: &Action, ctx: &mut Context, env: &mut ScriptEnv<'_>) -> Result<Step, Fault> {
    match action {
        Action::Branch {
            condition,
            when_true,
            when_false,
        } => {
            let arm = if eval::eval_bool(condition, ctx, env)? {
                when_true
            } else {
                when_false
            };
            if arm.is_empty() {
                Ok(Step::Continue)
            } else {
                Ok(Step::Push(Frame::Seq {
                    body: arm.clone(),
                    index: 0,
                }))
            }
        }

        Action::ForEach { array, body } => {
            // The array is evaluated exactly once, before the first
            // iteration.
            let items = eval::eval_array(array, ctx, env)?;
            Ok(Step::Push(Frame::ForEach {
                body: body.clone(),
                items,
                next: 0,
                saved: None,
                started: false,
            }))
        }

        Action::Repeat { iterations, body } => {
            let count = eval::eval_number(iterations, ctx, env)?;
            // Negative counts run zero times.
            let remaining = if count.is_finite() && count > 0.0 {
                count.floor() as u64
            } else {
                0
            };
            Ok(Step::Push(Frame::Repeat {
                body: body.clone(),
                remaining,
            }))
        }

        Action::Wait { node, duration } => {
            let duration = eval::eval_number(duration, ctx, env)?.max(0.0);
            let node = match node {
                Some(node) => Some(node_id_from(node, ctx, env)?),
                None => None,
            };
            Ok(Step::Suspend(Pause { duration, node }))
        }

        Action::AddItemsToInventory {
            node,
            items,
            overflow,
        } => {
            let node_id = node_id_from(node, ctx, env)?;
            let stacks = eval_item_stacks(items, ctx, env)?;

            // Resolve stack caps up front; the insert itself must not
            // evaluate blocks.
            let mut caps = Vec::with_capacity(stacks.len());
            for stack in &stacks {
                caps.push((stack.item.clone(), max_stack_size(&stack.item, env)?));
            }
            let cap_for = |item: &str| -> Option<u64> {
                caps.iter()
                    .find(|(name, _)| name == item)
                    .and_then(|(_, cap)| *cap)
            };

            let node_state = env
                .state
                .node_mut(node_id)
                .ok_or_else(|| Fault::UnknownReference(node_id.to_string()))?;
            match overflow {
                OverflowPolicy::Destroy => {
                    node_state.inventory.insert_lossy(&stacks, cap_for);
                    Ok(Step::Continue)
                }
                OverflowPolicy::Reject => match node_state.inventory.insert(&stacks, cap_for) {
                    Ok(()) => Ok(Step::Continue),
                    Err(overflow) => Err(Fault::Capacity {
                        node: node_id,
                        detail: format!(
                            "{} items did not fit",
                            overflow.0.iter().map(|s| s.quantity).sum::<u64>()
                        ),
                    }),
                },
            }
        }

        Action::SetData { object, key, value } => {
            let object = evaluate(object, ctx, env)?;
            let key = eval::eval_string(key, ctx, env)?;
            let value = evaluate(value, ctx, env)?;
            set_data(&object, &key, value, ctx, env)?;
            Ok(Step::Continue)
        }

        Action::AddNode {
            node_type,
            pos,
            data,
        } => {
            let type_name = eval::eval_string(node_type, ctx, env)?;
            let pos = eval_position(pos, ctx, env)?;
            let provided = match data {
                Some(data) => eval::eval_dict(data, ctx, env)?,
                None => Dict::new(),
            };
            let id = spawn_node(&type_name, pos, provided, env)?;
            env.outbox.placed.push(id);
            Ok(Step::Continue)
        }

        Action::RemoveNode { node } => {
            let node_id = node_id_from(node, ctx, env)?;
            env.state
                .remove_node(node_id)
                .ok_or_else(|| Fault::UnknownReference(node_id.to_string()))?;
            Ok(Step::Continue)
        }

        Action::Event { event, data } => {
            let name = eval::eval_string(event, ctx, env)?;
            let data = match data {
                Some(data) => evaluate(data, ctx, env)?,
                None => Value::Void,
            };
            env.outbox.events.push(EmittedEvent { name, data });
            Ok(Step::Continue)
        }

        Action::Error { message } => {
            let message = eval::eval_string(message, ctx, env)?;
            Err(Fault::User(message))
        }

        Action::Return { value } => {
            let value = match value {
                Some(value) => evaluate(value, ctx, env)?,
                None => Value::Void,
            };
            Ok(Step::Return(value))
        }

        Action::Break => Ok(Step::Break),
    }
}

/// Runs a method body as a nested execution. The receiver is bound as
/// `this`; its possibly-mutated binding is handed back so the caller can
/// write it through. Methods are expression-invoked and therefore must not
/// suspend; validation rejects `wait` in method bodies.
pub(crate) fn run_method(
    def: &MethodDef,
    this: Binding,
    params: Vec<(String, Value)>,
    env: &mut ScriptEnv<'_>,
) -> Result<(Value, Binding), Fault> {
    let mut ctx = Context::new();
    ctx.bind("this", this);
    for (name, value) in params {
        ctx.bind(name, Binding::Plain(value));
    }

    let mut execution = Execution::new(def.body.clone(), ctx, None);
    match execution.run(env)? {
        Progress::Done(value) => {
            let this_after = execution
                .ctx
                .get("this")
                .cloned()
                .ok_or(Fault::Internal("method receiver vanished"))?;
            Ok((value, this_after))
        }
        Progress::Suspended(_) => Err(Fault::Internal("`wait` suspended inside a method body")),
    }
}

/// Resolves a node-reference expression to a live-or-not node id. Accepts a
/// reference handle, a context binding holding a node, or the canonical
/// `node-N` string form.
fn node_id_from(expr: &crate::block::Expr, ctx: &mut Context, env: &mut ScriptEnv<'_>) -> Result<NodeId, Fault> {
    let value = evaluate(expr, ctx, env)?;
    match &value {
        Value::Ref(ObjectHandle::Node(id)) => Ok(*id),
        Value::Ref(ObjectHandle::Binding(name)) => match ctx.get(name) {
            Some(Binding::Node(id)) => Ok(*id),
            _ => Err(Fault::UnknownReference(name.clone())),
        },
        Value::String(text) => {
            NodeId::parse(text).ok_or_else(|| Fault::UnknownReference(text.clone()))
        }
        other => Err(Fault::mismatch("node reference", other)),
    }
}

fn eval_item_stacks(
    expr: &crate::block::Expr,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<Vec<ItemStack>, Fault> {
    let items = eval::eval_array(expr, ctx, env)?;
    let mut stacks = Vec::with_capacity(items.len());
    for item in items {
        let entry = item
            .as_dict()
            .ok_or_else(|| Fault::mismatch("itemStack", &item))?;
        let name = entry
            .get("item")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Fault::mismatch("itemStack", &item))?;
        if env.env.item_type(name).is_none() {
            return Err(Fault::UnknownReference(name.to_string()));
        }
        let quantity = entry
            .get("quantity")
            .and_then(|v| v.as_count())
            .ok_or_else(|| Fault::mismatch("itemStack", &item))?;
        // Zero-quantity stacks are never materialized.
        if quantity > 0 {
            stacks.push(ItemStack::new(name, quantity));
        }
    }
    Ok(stacks)
}

fn max_stack_size(item: &str, env: &mut ScriptEnv<'_>) -> Result<Option<u64>, Fault> {
    let Some(def) = env.env.item_type(item) else {
        return Err(Fault::UnknownReference(item.to_string()));
    };
    let Some(expr) = def.max_stack_size.clone() else {
        return Ok(None);
    };
    let mut scope = Context::new();
    let value = evaluate(&expr, &mut scope, env)?;
    value
        .as_count()
        .map(Some)
        .ok_or_else(|| Fault::mismatch("number", &value))
}

fn eval_position(
    expr: &crate::block::Expr,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<Position, Fault> {
    let value = evaluate(expr, ctx, env)?;
    let entries = value
        .as_dict()
        .ok_or_else(|| Fault::mismatch("position", &value))?;
    let x = entries
        .get("x")
        .and_then(|v| v.as_number())
        .ok_or_else(|| Fault::mismatch("position", &value))?;
    let y = entries
        .get("y")
        .and_then(|v| v.as_number())
        .ok_or_else(|| Fault::mismatch("position", &value))?;
    Position::new(x, y).ok_or_else(|| Fault::mismatch("finite position", &value))
}

/// Writes a typed data field, re-checking the declared type at the mutation
/// boundary even though validation already passed.
fn set_data(
    object: &Value,
    key: &str,
    value: Value,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<(), Fault> {
    match object {
        Value::Ref(ObjectHandle::Node(id)) => {
            let type_name = env
                .state
                .node(*id)
                .map(|node| node.type_name.clone())
                .ok_or_else(|| Fault::UnknownReference(id.to_string()))?;
            let def = env
                .env
                .node_type(&type_name)
                .ok_or_else(|| Fault::UnknownReference(type_name.clone()))?;
            let field = def
                .data
                .get(key)
                .ok_or_else(|| Fault::UnknownReference(format!("{id}.{key}")))?;
            if field.internal {
                return Err(Fault::InternalField(key.to_string()));
            }
            if !field.ty.admits(&value, env.state) {
                return Err(Fault::mismatch(field.ty.to_string(), &value));
            }
            let node = env
                .state
                .node_mut(*id)
                .ok_or_else(|| Fault::UnknownReference(id.to_string()))?;
            node.data.insert(key.to_string(), value);
            Ok(())
        }
        Value::Ref(ObjectHandle::Binding(name)) => {
            let binding = ctx
                .get(name)
                .ok_or_else(|| Fault::UnknownReference(name.clone()))?
                .clone();
            match binding {
                Binding::Node(id) => {
                    set_data(&Value::Ref(ObjectHandle::Node(id)), key, value, ctx, env)
                }
                Binding::Object { type_name, .. } => {
                    let def = env
                        .env
                        .custom_type(&type_name)
                        .ok_or_else(|| Fault::UnknownReference(type_name.clone()))?;
                    let field = def
                        .data
                        .get(key)
                        .ok_or_else(|| Fault::UnknownReference(format!("{name}.{key}")))?;
                    if field.internal {
                        return Err(Fault::InternalField(key.to_string()));
                    }
                    if !field.ty.admits(&value, env.state) {
                        return Err(Fault::mismatch(field.ty.to_string(), &value));
                    }
                    let Some(Binding::Object { data, .. }) = ctx.get_mut(name) else {
                        return Err(Fault::Internal("object binding vanished"));
                    };
                    data.insert(key.to_string(), value);
                    Ok(())
                }
                Binding::Plain(Value::Dict(_)) => {
                    // Untyped scratch dictionary: plain key write.
                    let Some(Binding::Plain(Value::Dict(entries))) = ctx.get_mut(name) else {
                        return Err(Fault::Internal("dictionary binding vanished"));
                    };
                    entries.insert(key.to_string(), value);
                    Ok(())
                }
                Binding::Plain(other) => Err(Fault::mismatch("object", &other)),
            }
        }
        other => Err(Fault::mismatch("object", other)),
    }
}

/// Creates a node of a declared type, filling omitted data fields from
/// their declared defaults and sizing the inventory.
pub fn spawn_node(
    type_name: &str,
    pos: Position,
    provided: Dict,
    env: &mut ScriptEnv<'_>,
) -> Result<NodeId, Fault> {
    let def = env
        .env
        .node_type(type_name)
        .ok_or_else(|| Fault::UnknownReference(type_name.to_string()))?
        .clone();

    let mut data = Dict::new();
    for (name, field) in &def.data {
        if let Some(value) = provided.get(name) {
            if field.internal {
                return Err(Fault::InternalField(name.clone()));
            }
            if !field.ty.admits(value, env.state) {
                return Err(Fault::mismatch(field.ty.to_string(), value));
            }
            data.insert(name.clone(), value.clone());
        } else if let Some(default) = &field.default {
            // Defaults are closed expressions; they see no script context.
            let mut scope = Context::new();
            data.insert(name.clone(), evaluate(default, &mut scope, env)?);
        }
    }
    for name in provided.keys() {
        if !def.data.contains_key(name) {
            return Err(Fault::UnknownReference(format!("{type_name}.{name}")));
        }
    }

    let inventory = match &def.inventory {
        Some(inventory) => {
            let mut scope = Context::new();
            let slots = evaluate(&inventory.slots, &mut scope, env)?;
            let slots = slots
                .as_count()
                .ok_or_else(|| Fault::mismatch("number", &slots))?;
            Inventory::with_slots(slots as usize)
        }
        None => Inventory::default(),
    };

    Ok(env.state.add_node(type_name, pos, data, inventory))
}
