//! Expression evaluation and reference resolution.
//!
//! `evaluate` reduces a parsed expression to a concrete [`Value`] against a
//! context and the live game state. It is total over trees that passed
//! validation; anything else surfaces as a [`Fault`]. There is no implicit
//! coercion anywhere: a wrong runtime tag is a fault, never a conversion.

use crate::block::{BoolFold, CompareOp, Expr, Literal};
use crate::context::{Binding, Context};
use crate::env::MethodDef;
use crate::error::Fault;
use crate::exec::{self, ScriptEnv};
use crate::state::NodeId;
use crate::value::{Dict, ObjectHandle, Value};

/// Evaluates an expression to a value.
pub fn evaluate(expr: &Expr, ctx: &mut Context, env: &mut ScriptEnv<'_>) -> Result<Value, Fault> {
    env.budget.charge()?;
    env.budget.descend()?;
    let result = eval_inner(expr, ctx, env);
    env.budget.ascend();
    result
}

fn eval_inner(expr: &Expr, ctx: &mut Context, env: &mut ScriptEnv<'_>) -> Result<Value, Fault> {
    match expr {
        Expr::Literal(literal) => eval_literal(literal, ctx, env),

        Expr::Concat(operands) => {
            let mut out = String::new();
            for operand in operands {
                let value = evaluate(operand, ctx, env)?;
                match value {
                    Value::String(s) => out.push_str(&s),
                    other => return Err(Fault::mismatch("string", &other)),
                }
            }
            Ok(Value::String(out))
        }

        Expr::Addition(operands) => {
            let mut sum = 0.0;
            for operand in operands {
                sum += eval_number(operand, ctx, env)?;
            }
            Ok(Value::Number(sum))
        }

        Expr::Subtraction(operands) => {
            let mut operands = operands.iter();
            let first = match operands.next() {
                Some(operand) => eval_number(operand, ctx, env)?,
                None => return Err(Fault::Internal("subtraction with no operands")),
            };
            let mut result = first;
            for operand in operands {
                result -= eval_number(operand, ctx, env)?;
            }
            Ok(Value::Number(result))
        }

        Expr::Random { min, max } => {
            let min = eval_number(min, ctx, env)?;
            let max = eval_number(max, ctx, env)?;
            Ok(Value::Number(env.rng.range_f64(min, max)))
        }

        Expr::RandomInt { min, max } => {
            let min = eval_number(min, ctx, env)?.floor() as i64;
            let max = eval_number(max, ctx, env)?.floor() as i64;
            Ok(Value::Number(env.rng.range_i64(min, max) as f64))
        }

        Expr::Compare { op, operands } => {
            // Pairwise over adjacent operands: a < b < c means a<b && b<c.
            let mut previous: Option<Value> = None;
            for operand in operands {
                let current = evaluate(operand, ctx, env)?;
                if let Some(previous) = &previous {
                    if !compare(*op, previous, &current)? {
                        return Ok(Value::Bool(false));
                    }
                }
                previous = Some(current);
            }
            Ok(Value::Bool(true))
        }

        Expr::Fold { op, operands } => {
            // Short-circuit: stop as soon as the result is determined.
            for operand in operands {
                let value = evaluate(operand, ctx, env)?;
                let truth = value
                    .as_bool()
                    .ok_or_else(|| Fault::mismatch("boolean", &value))?;
                match op {
                    BoolFold::All if !truth => return Ok(Value::Bool(false)),
                    BoolFold::Any if truth => return Ok(Value::Bool(true)),
                    BoolFold::None if truth => return Ok(Value::Bool(false)),
                    _ => {}
                }
            }
            Ok(Value::Bool(matches!(op, BoolFold::All | BoolFold::None)))
        }

        Expr::ContextExists { object } => {
            let id = eval_string(object, ctx, env)?;
            let exists = ctx.contains(&id)
                || NodeId::parse(&id).is_some_and(|node| env.state.node(node).is_some());
            Ok(Value::Bool(exists))
        }

        Expr::PropertyExists { object, property } => {
            // Existence probes are the sanctioned way to test optionality;
            // they answer false rather than faulting.
            let property = eval_string(property, ctx, env)?;
            let exists = match evaluate(object, ctx, env) {
                Err(_) => false,
                Ok(value) => property_exists(&value, &property, ctx, env),
            };
            Ok(Value::Bool(exists))
        }

        Expr::Map { array, value } => {
            let items = eval_array(array, ctx, env)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let saved = ctx.bind("element", Binding::Plain(item));
                let mapped = evaluate(value, ctx, env);
                ctx.unbind("element", saved);
                out.push(mapped?);
            }
            Ok(Value::Array(out))
        }

        Expr::Filter { array, condition } => {
            let items = eval_array(array, ctx, env)?;
            let mut out = Vec::new();
            for item in items {
                let saved = ctx.bind("element", Binding::Plain(item.clone()));
                let keep = evaluate(condition, ctx, env);
                ctx.unbind("element", saved);
                let keep = keep?;
                match keep.as_bool() {
                    Some(true) => out.push(item),
                    Some(false) => {}
                    None => return Err(Fault::mismatch("boolean", &keep)),
                }
            }
            Ok(Value::Array(out))
        }

        Expr::Keys { dictionary } => {
            let entries = eval_dict(dictionary, ctx, env)?;
            Ok(Value::Array(
                entries
                    .keys()
                    .map(|key| Value::String(key.clone()))
                    .collect(),
            ))
        }

        Expr::Values { dictionary } => {
            let entries = eval_dict(dictionary, ctx, env)?;
            Ok(Value::Array(entries.into_values().collect()))
        }

        Expr::CreateDictionary { entries } => {
            let items = eval_array(entries, ctx, env)?;
            let mut out = Dict::new();
            for item in items {
                let entry = item
                    .as_dict()
                    .ok_or_else(|| Fault::mismatch("entry object", &item))?;
                let key = entry
                    .get("key")
                    .and_then(|k| k.as_str())
                    .ok_or_else(|| Fault::mismatch("string entry key", &item))?;
                let value = entry
                    .get("value")
                    .ok_or_else(|| Fault::mismatch("entry value", &item))?;
                // Last write wins on duplicate keys.
                out.insert(key.to_string(), value.clone());
            }
            Ok(Value::Dict(out))
        }

        Expr::Ternary {
            condition,
            when_true,
            when_false,
        } => {
            // Exactly one branch is evaluated; the untaken branch may
            // contain method calls with side effects.
            let truth = eval_bool(condition, ctx, env)?;
            if truth {
                evaluate(when_true, ctx, env)
            } else {
                evaluate(when_false, ctx, env)
            }
        }

        Expr::GetContext { id } => {
            let id = eval_string(id, ctx, env)?;
            match ctx.get(&id) {
                Some(Binding::Node(node)) => Ok(Value::Ref(ObjectHandle::Node(*node))),
                Some(Binding::Object { .. }) => Ok(Value::Ref(ObjectHandle::Binding(id))),
                Some(Binding::Plain(value)) => Ok(value.clone()),
                None => match NodeId::parse(&id) {
                    Some(node) if env.state.node(node).is_some() => {
                        Ok(Value::Ref(ObjectHandle::Node(node)))
                    }
                    _ => Err(Fault::UnknownReference(id)),
                },
            }
        }

        Expr::Property { object, property } => {
            let object = evaluate(object, ctx, env)?;
            let property = eval_string(property, ctx, env)?;
            read_property(&object, &property, ctx, env)
        }

        Expr::Method {
            object,
            method,
            params,
        } => {
            let object = evaluate(object, ctx, env)?;
            let method = eval_string(method, ctx, env)?;
            let params = match params {
                Some(params) => eval_dict(params, ctx, env)?,
                None => Dict::new(),
            };
            call_method(&object, &method, params, ctx, env)
        }
    }
}

fn eval_literal(literal: &Literal, ctx: &mut Context, env: &mut ScriptEnv<'_>) -> Result<Value, Fault> {
    match literal {
        Literal::String(s) => Ok(Value::String(s.clone())),
        Literal::Number(n) => Ok(Value::Number(*n)),
        Literal::Bool(b) => Ok(Value::Bool(*b)),
        Literal::Array(elements) => {
            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                out.push(evaluate(element, ctx, env)?);
            }
            Ok(Value::Array(out))
        }
        Literal::Dict(entries) => {
            let mut out = Dict::with_capacity(entries.len());
            for (key, value) in entries {
                out.insert(key.clone(), evaluate(value, ctx, env)?);
            }
            Ok(Value::Dict(out))
        }
    }
}

pub(crate) fn eval_number(
    expr: &Expr,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<f64, Fault> {
    let value = evaluate(expr, ctx, env)?;
    value
        .as_number()
        .ok_or_else(|| Fault::mismatch("number", &value))
}

pub(crate) fn eval_string(
    expr: &Expr,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<String, Fault> {
    let value = evaluate(expr, ctx, env)?;
    match value {
        Value::String(s) => Ok(s),
        other => Err(Fault::mismatch("string", &other)),
    }
}

pub(crate) fn eval_bool(
    expr: &Expr,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<bool, Fault> {
    let value = evaluate(expr, ctx, env)?;
    value
        .as_bool()
        .ok_or_else(|| Fault::mismatch("boolean", &value))
}

pub(crate) fn eval_array(
    expr: &Expr,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<Vec<Value>, Fault> {
    let value = evaluate(expr, ctx, env)?;
    match value {
        Value::Array(items) => Ok(items),
        other => Err(Fault::mismatch("array", &other)),
    }
}

pub(crate) fn eval_dict(
    expr: &Expr,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<Dict, Fault> {
    let value = evaluate(expr, ctx, env)?;
    match value {
        Value::Dict(entries) => Ok(entries),
        other => Err(Fault::mismatch("dictionary", &other)),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, Fault> {
    match op {
        CompareOp::Equals => Ok(left == right),
        CompareOp::NotEquals => Ok(left != right),
        _ => {
            let a = left
                .as_number()
                .ok_or_else(|| Fault::mismatch("number", left))?;
            let b = right
                .as_number()
                .ok_or_else(|| Fault::mismatch("number", right))?;
            Ok(match op {
                CompareOp::LessThan => a < b,
                CompareOp::GreaterThan => a > b,
                CompareOp::LessThanOrEqual => a <= b,
                CompareOp::GreaterThanOrEqual => a >= b,
                CompareOp::Equals | CompareOp::NotEquals => unreachable!(),
            })
        }
    }
}

/// Reads a property of a resolved object value.
///
/// Nodes expose their declared data fields plus the builtin `id`, `pos`, and
/// `type` properties. Typed context objects expose computed properties
/// (re-evaluated on every access, never cached) and data fields. Plain
/// dictionaries fall back to key lookup.
fn read_property(
    object: &Value,
    property: &str,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<Value, Fault> {
    match object {
        Value::Ref(ObjectHandle::Node(id)) => {
            let node = env
                .state
                .node(*id)
                .ok_or_else(|| Fault::UnknownReference(id.to_string()))?;
            match property {
                "id" => Ok(Value::Ref(ObjectHandle::Node(*id))),
                "type" => Ok(Value::String(node.type_name.clone())),
                "pos" => {
                    let mut pos = Dict::new();
                    pos.insert("x".into(), Value::Number(node.pos.x));
                    pos.insert("y".into(), Value::Number(node.pos.y));
                    Ok(Value::Dict(pos))
                }
                field => node
                    .data
                    .get(field)
                    .cloned()
                    .ok_or_else(|| Fault::UnknownReference(format!("{id}.{field}"))),
            }
        }
        Value::Ref(ObjectHandle::Binding(name)) => {
            let binding = ctx
                .get(name)
                .ok_or_else(|| Fault::UnknownReference(name.clone()))?
                .clone();
            match binding {
                Binding::Node(id) => {
                    read_property(&Value::Ref(ObjectHandle::Node(id)), property, ctx, env)
                }
                Binding::Plain(value) => read_property(&value, property, ctx, env),
                Binding::Object { type_name, data } => {
                    let def = env
                        .env
                        .custom_type(&type_name)
                        .ok_or_else(|| Fault::UnknownReference(type_name.clone()))?;
                    if let Some(property_def) = def.properties.get(property) {
                        // Computed on every access, scoped to the object.
                        let value = property_def.value.clone();
                        let mut scope = Context::new();
                        scope.bind("this", Binding::Object { type_name, data });
                        return evaluate(&value, &mut scope, env);
                    }
                    data.get(property)
                        .cloned()
                        .ok_or_else(|| Fault::UnknownReference(format!("{name}.{property}")))
                }
            }
        }
        Value::Dict(entries) => entries
            .get(property)
            .cloned()
            .ok_or_else(|| Fault::UnknownReference(property.to_string())),
        other => Err(Fault::mismatch("object", other)),
    }
}

fn property_exists(object: &Value, property: &str, ctx: &Context, env: &ScriptEnv<'_>) -> bool {
    match object {
        Value::Ref(ObjectHandle::Node(id)) => env.state.node(*id).is_some_and(|node| {
            matches!(property, "id" | "pos" | "type") || node.data.contains_key(property)
        }),
        Value::Ref(ObjectHandle::Binding(name)) => match ctx.get(name) {
            Some(Binding::Node(id)) => {
                property_exists(&Value::Ref(ObjectHandle::Node(*id)), property, ctx, env)
            }
            Some(Binding::Plain(value)) => property_exists(&value.clone(), property, ctx, env),
            Some(Binding::Object { type_name, data }) => {
                data.contains_key(property)
                    || env.env.custom_type(type_name).is_some_and(|def| {
                        def.properties.contains_key(property)
                    })
            }
            None => false,
        },
        Value::Dict(entries) => entries.contains_key(property),
        _ => false,
    }
}

fn call_method(
    object: &Value,
    method: &str,
    params: Dict,
    ctx: &mut Context,
    env: &mut ScriptEnv<'_>,
) -> Result<Value, Fault> {
    let Value::Ref(ObjectHandle::Binding(receiver)) = object else {
        return Err(Fault::UnknownReference(format!(
            "method `{method}` on {}",
            object.type_name()
        )));
    };
    let binding = ctx
        .get(receiver)
        .ok_or_else(|| Fault::UnknownReference(receiver.clone()))?
        .clone();
    let Binding::Object { type_name, .. } = &binding else {
        return Err(Fault::UnknownReference(format!("{receiver}.{method}")));
    };

    let def: MethodDef = env
        .env
        .custom_type(type_name)
        .and_then(|custom| custom.methods.get(method))
        .cloned()
        .ok_or_else(|| Fault::UnknownReference(format!("{type_name}.{method}")))?;

    // Bind parameters by declared name; extra keys are ignored, missing or
    // ill-typed ones fault.
    let mut args = Vec::with_capacity(def.params.len());
    for (name, ty) in &def.params {
        let value = params
            .get(name)
            .cloned()
            .ok_or_else(|| Fault::TypeMismatch {
                expected: format!("parameter `{name}`"),
                found: "nothing".to_string(),
            })?;
        if !ty.admits(&value, env.state) {
            return Err(Fault::mismatch(ty.to_string(), &value));
        }
        args.push((name.clone(), value));
    }

    let (result, this_after) = exec::run_method(&def, binding, args, env)?;

    // Write the receiver back so method bodies can mutate their object's
    // data in a way the caller observes.
    if let Some(slot) = ctx.get_mut(receiver) {
        *slot = this_after;
    }

    if let Some(returns) = &def.returns {
        if !returns.admits(&result, env.state) {
            return Err(Fault::mismatch(returns.to_string(), &result));
        }
    }
    Ok(result)
}
