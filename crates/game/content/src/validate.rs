//! Static pack validation.
//!
//! Runs over the merged environment before any script executes and collects
//! every error it can find rather than stopping at the first. The checker is
//! deliberately conservative: where a value's type depends on runtime data
//! (dictionary contents, method receivers resolved through dynamic ids) it
//! degrades to "unknown" and stays quiet, leaving the interpreter's runtime
//! checks as the backstop. What it *can* see statically — unknown names,
//! operand types, misplaced control flow, writes to internal fields — it
//! rejects up front so a broken pack never loads.

use core::fmt;

use indexmap::IndexMap;

use nodeforge_core::block::{Action, Expr, Literal};
use nodeforge_core::env::{GameEnv, MethodDef, NodeActionDef, NodeTypeDef};
use nodeforge_core::types::{EntityKind, FieldDef, TypeDescriptor};

/// Classification of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// A block's operand cannot have the type the block requires.
    TypeMismatch,
    /// A literal id/name refers to nothing in scope or in the environment.
    UnknownReference,
    /// A declared type names something that does not exist.
    UnknownType,
    /// A block has the wrong number of operands.
    ArityMismatch,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationKind::TypeMismatch => "type mismatch",
            ValidationKind::UnknownReference => "unknown reference",
            ValidationKind::UnknownType => "unknown type",
            ValidationKind::ArityMismatch => "arity mismatch",
        })
    }
}

/// One validation failure, located by its declaration path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at `{path}`: {detail}")]
pub struct ValidationError {
    pub path: String,
    pub kind: ValidationKind,
    pub detail: String,
}

/// Statically known type of an expression. `Unknown` is compatible with
/// everything; it is where the checker gives up and defers to runtime.
#[derive(Debug, Clone, PartialEq)]
enum Ty {
    Known(TypeDescriptor),
    Unknown,
}

impl Ty {
    fn accepts(&self, want: &TypeDescriptor) -> bool {
        match self {
            Ty::Unknown => true,
            Ty::Known(have) => compatible(have, want),
        }
    }
}

/// Structural compatibility, with `Object`/`Dictionary` overlap tolerated:
/// a literal dict flows into both declared shapes.
fn compatible(have: &TypeDescriptor, want: &TypeDescriptor) -> bool {
    match (have, want) {
        (TypeDescriptor::Array(a), TypeDescriptor::Array(b)) => compatible(a, b),
        (TypeDescriptor::Dictionary(a), TypeDescriptor::Dictionary(b)) => compatible(a, b),
        (TypeDescriptor::Object(_), TypeDescriptor::Dictionary(_))
        | (TypeDescriptor::Dictionary(_), TypeDescriptor::Object(_))
        | (TypeDescriptor::Object(_), TypeDescriptor::ItemStack)
        | (TypeDescriptor::ItemStack, TypeDescriptor::Object(_)) => true,
        (TypeDescriptor::Object(a), TypeDescriptor::Object(b)) => {
            b.iter().all(|(name, want)| {
                a.get(name).map(|have| compatible(have, want)).unwrap_or(false)
            })
        }
        // A node id is written as its `node-N` string form in literals.
        (TypeDescriptor::String, TypeDescriptor::Id(_)) => true,
        (a, b) => a == b,
    }
}

/// What kind of body is being checked; controls which control-flow blocks
/// are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    /// Node action bodies, `place` hooks, event listeners: may `wait`.
    Script,
    /// Method bodies: expression-invoked, must complete synchronously.
    Method,
}

/// Lexical scope of statically known bindings.
#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: IndexMap<String, Ty>,
}

impl Scope {
    fn with(mut self, id: &str, ty: Ty) -> Self {
        self.bindings.insert(id.to_string(), ty);
        self
    }
}

struct Checker<'a> {
    env: &'a GameEnv,
    errors: Vec<ValidationError>,
    path: Vec<String>,
}

/// Validates the merged environment, returning every error found.
pub fn validate(env: &GameEnv) -> Vec<ValidationError> {
    let mut checker = Checker {
        env,
        errors: Vec::new(),
        path: Vec::new(),
    };

    for (name, def) in &env.nodes {
        checker.scoped(format!("nodes.{name}"), |c| c.check_node(def));
    }
    for (name, def) in &env.items {
        checker.scoped(format!("items.{name}"), |c| c.check_item(def));
    }
    for (name, def) in &env.types {
        checker.scoped(format!("types.{name}"), |c| c.check_custom(def));
    }
    for (event, listeners) in &env.listeners {
        for listener in listeners {
            checker.scoped(format!("events.{event}[{}]", listener.pack), |c| {
                // Listeners receive the emitted payload as `data`; its shape
                // is whatever the emitter produced.
                let scope = Scope::default().with("data", Ty::Unknown);
                c.check_body(&listener.body, &scope, BodyKind::Script, false);
            });
        }
    }

    checker.errors
}

impl<'a> Checker<'a> {
    fn scoped(&mut self, segment: String, f: impl FnOnce(&mut Self)) {
        self.path.push(segment);
        f(self);
        self.path.pop();
    }

    fn report(&mut self, kind: ValidationKind, detail: impl Into<String>) {
        self.errors.push(ValidationError {
            path: self.path.join("."),
            kind,
            detail: detail.into(),
        });
    }

    fn node_scope(&self) -> Scope {
        Scope::default().with("node", Ty::Known(TypeDescriptor::Id(EntityKind::Node)))
    }

    fn check_node(&mut self, def: &NodeTypeDef) {
        // Display/size/draggable are evaluated outside any script, with no
        // context bindings.
        let empty = Scope::default();
        self.scoped("display".into(), |c| {
            c.expect(&def.display, &empty, TypeDescriptor::String)
        });
        self.scoped("size".into(), |c| {
            c.infer(&def.size, &empty);
        });
        if let Some(draggable) = &def.draggable {
            self.scoped("draggable".into(), |c| {
                c.expect(draggable, &empty, TypeDescriptor::Boolean)
            });
        }

        self.scoped("data".into(), |c| c.check_fields(&def.data));

        if let Some(inventory) = &def.inventory {
            self.scoped("inventory.slots".into(), |c| {
                c.expect(&inventory.slots, &empty, TypeDescriptor::Number)
            });
            let node = self.node_scope();
            if let Some(gate) = &inventory.can_player_extract {
                self.scoped("inventory.canPlayerExtract".into(), |c| {
                    c.expect(gate, &node, TypeDescriptor::Boolean)
                });
            }
            if let Some(gate) = &inventory.can_player_insert {
                self.scoped("inventory.canPlayerInsert".into(), |c| {
                    c.expect(gate, &node, TypeDescriptor::Boolean)
                });
            }
        }

        for (name, action) in &def.actions {
            self.scoped(format!("actions.{name}"), |c| c.check_node_action(action));
        }

        let scope = self.node_scope();
        self.scoped("place".into(), |c| {
            c.check_body(&def.place, &scope, BodyKind::Script, false)
        });
    }

    fn check_node_action(&mut self, def: &NodeActionDef) {
        let scope = self.node_scope();
        self.scoped("display".into(), |c| {
            c.expect(&def.display, &scope, TypeDescriptor::String)
        });
        self.scoped("duration".into(), |c| {
            c.expect(&def.duration, &scope, TypeDescriptor::Number)
        });
        if let Some(tooltip) = &def.tooltip {
            self.scoped("tooltip".into(), |c| {
                c.expect(tooltip, &scope, TypeDescriptor::String)
            });
        }
        if let Some(cost) = &def.cost {
            self.scoped("cost".into(), |c| {
                c.expect(
                    cost,
                    &scope,
                    TypeDescriptor::Dictionary(Box::new(TypeDescriptor::ItemStack)),
                )
            });
        }
        self.scoped("run".into(), |c| {
            c.check_body(&def.body, &scope, BodyKind::Script, false)
        });
    }

    fn check_item(&mut self, def: &nodeforge_core::env::ItemTypeDef) {
        let empty = Scope::default();
        self.scoped("display".into(), |c| {
            c.expect(&def.display, &empty, TypeDescriptor::String)
        });
        if let Some(node) = &def.node {
            self.scoped("node".into(), |c| {
                c.expect(node, &empty, TypeDescriptor::String);
                if let Expr::Literal(Literal::String(name)) = node {
                    if c.env.node_type(name).is_none() {
                        c.report(
                            ValidationKind::UnknownReference,
                            format!("no node type named `{name}`"),
                        );
                    }
                }
            });
        }
        if let Some(size) = &def.max_stack_size {
            self.scoped("maxStackSize".into(), |c| {
                c.expect(size, &empty, TypeDescriptor::Number)
            });
        }
    }

    fn check_custom(&mut self, def: &nodeforge_core::env::CustomTypeDef) {
        self.scoped("data".into(), |c| c.check_fields(&def.data));

        for (name, method) in &def.methods {
            self.scoped(format!("methods.{name}"), |c| c.check_method(method));
        }

        for (name, property) in &def.properties {
            self.scoped(format!("properties.{name}"), |c| {
                c.check_descriptor(&property.ty);
                // Properties are pure reads: a method call hiding inside one
                // would run side effects on every access.
                c.forbid_method_calls(&property.value);
                let scope = Scope::default().with("this", Ty::Unknown);
                c.expect(&property.value, &scope, property.ty.clone());
            });
        }
    }

    fn check_method(&mut self, def: &MethodDef) {
        let mut scope = Scope::default().with("this", Ty::Unknown);
        for (name, ty) in &def.params {
            self.scoped(format!("params.{name}"), |c| c.check_descriptor(ty));
            scope = scope.with(name, Ty::Known(ty.clone()));
        }
        if let Some(returns) = &def.returns {
            self.scoped("returns".into(), |c| c.check_descriptor(returns));
        }
        self.scoped("run".into(), |c| {
            c.check_body(&def.body, &scope, BodyKind::Method, false)
        });
    }

    fn check_fields(&mut self, fields: &IndexMap<String, FieldDef>) {
        for (name, field) in fields {
            self.scoped(name.clone(), |c| {
                c.check_descriptor(&field.ty);
                if field.internal && field.default.is_some() {
                    // Internal fields are initialized by the engine, not by
                    // pack-authored defaults.
                    c.report(
                        ValidationKind::TypeMismatch,
                        "internal fields cannot declare a default",
                    );
                }
                if let Some(default) = &field.default {
                    c.scoped("default".into(), |c| {
                        // Defaults are closed expressions.
                        c.expect(default, &Scope::default(), field.ty.clone());
                    });
                }
            });
        }
    }

    /// Checks that a declared type refers only to types that exist.
    fn check_descriptor(&mut self, ty: &TypeDescriptor) {
        match ty {
            TypeDescriptor::Array(element) => self.check_descriptor(element),
            TypeDescriptor::Dictionary(value) => self.check_descriptor(value),
            TypeDescriptor::Object(properties) => {
                for nested in properties.values() {
                    self.check_descriptor(nested);
                }
            }
            TypeDescriptor::Id(EntityKind::Custom(name)) => {
                if self.env.custom_type(name).is_none() {
                    self.report(
                        ValidationKind::UnknownType,
                        format!("no custom type named `{name}`"),
                    );
                }
            }
            _ => {}
        }
    }

    // ---- action bodies ----

    fn check_body(&mut self, body: &[Action], scope: &Scope, kind: BodyKind, in_loop: bool) {
        let mut scope = scope.clone();
        for (index, action) in body.iter().enumerate() {
            self.scoped(format!("[{index}]"), |c| {
                c.check_action(action, &mut scope, kind, in_loop)
            });
        }
    }

    fn check_action(&mut self, action: &Action, scope: &mut Scope, kind: BodyKind, in_loop: bool) {
        match action {
            Action::Branch {
                condition,
                when_true,
                when_false,
            } => {
                self.expect(condition, scope, TypeDescriptor::Boolean);
                self.scoped("true".into(), |c| {
                    c.check_body(when_true, scope, kind, in_loop)
                });
                self.scoped("false".into(), |c| {
                    c.check_body(when_false, scope, kind, in_loop)
                });
            }

            Action::ForEach { array, body } => {
                let element = match self.infer(array, scope) {
                    Ty::Known(TypeDescriptor::Array(element)) => Ty::Known(*element),
                    Ty::Known(other) => {
                        self.report(
                            ValidationKind::TypeMismatch,
                            format!("`forEach` needs an array, found {other}"),
                        );
                        Ty::Unknown
                    }
                    Ty::Unknown => Ty::Unknown,
                };
                let inner = scope.clone().with("element", element);
                self.scoped("forEach".into(), |c| {
                    c.check_body(body, &inner, kind, true)
                });
            }

            Action::Repeat { iterations, body } => {
                self.expect(iterations, scope, TypeDescriptor::Number);
                self.scoped("run".into(), |c| c.check_body(body, scope, kind, true));
            }

            Action::Wait { node, duration } => {
                if kind == BodyKind::Method {
                    self.report(
                        ValidationKind::TypeMismatch,
                        "`wait` cannot appear in a method body; methods are \
                         expression-invoked and must complete synchronously",
                    );
                }
                if let Some(node) = node {
                    self.infer(node, scope);
                }
                self.expect(duration, scope, TypeDescriptor::Number);
            }

            Action::AddItemsToInventory { node, items, .. } => {
                self.infer(node, scope);
                self.expect(
                    items,
                    scope,
                    TypeDescriptor::Array(Box::new(TypeDescriptor::ItemStack)),
                );
                // Literal item names can be resolved right now.
                if let Expr::Literal(Literal::Array(stacks)) = items {
                    for stack in stacks {
                        if let Expr::Literal(Literal::Dict(entries)) = stack {
                            if let Some(Expr::Literal(Literal::String(name))) = entries.get("item")
                            {
                                if self.env.item_type(name).is_none() {
                                    self.report(
                                        ValidationKind::UnknownReference,
                                        format!("no item type named `{name}`"),
                                    );
                                }
                            }
                        }
                    }
                }
            }

            Action::SetData { object, key, value } => {
                self.infer(object, scope);
                self.expect(key, scope, TypeDescriptor::String);
                self.infer(value, scope);
                // When both the receiver binding and the key are literal and
                // the binding's node type is unknowable, the write is checked
                // at runtime; internal fields are still catchable when the
                // key is literal and the object is the acting node.
                if let (Expr::GetContext { id }, Expr::Literal(Literal::String(key))) =
                    (object, key)
                {
                    if matches!(&**id, Expr::Literal(Literal::String(name)) if name == "node") {
                        self.check_internal_write(key);
                    }
                }
            }

            Action::AddNode {
                node_type,
                pos,
                data,
            } => {
                self.expect(node_type, scope, TypeDescriptor::String);
                if let Expr::Literal(Literal::String(name)) = node_type {
                    if self.env.node_type(name).is_none() {
                        self.report(
                            ValidationKind::UnknownReference,
                            format!("no node type named `{name}`"),
                        );
                    }
                }
                self.infer(pos, scope);
                if let Some(data) = data {
                    self.infer(data, scope);
                }
            }

            Action::RemoveNode { node } => {
                self.infer(node, scope);
            }

            Action::Event { event, data } => {
                self.expect(event, scope, TypeDescriptor::String);
                if let Some(data) = data {
                    self.infer(data, scope);
                }
            }

            Action::Error { message } => {
                self.expect(message, scope, TypeDescriptor::String);
            }

            Action::Return { value } => {
                if let Some(value) = value {
                    self.infer(value, scope);
                }
            }

            Action::Break => {
                if !in_loop {
                    self.report(
                        ValidationKind::TypeMismatch,
                        "`@break` outside of a `forEach` or `repeat` body",
                    );
                }
            }
        }
    }

    /// Reports a write to a field any node type declares as internal under
    /// the given name. Conservative: only fires when every declaring type
    /// marks the field internal, since the acting node's type is dynamic.
    fn check_internal_write(&mut self, key: &str) {
        let declaring: Vec<_> = self
            .env
            .nodes
            .values()
            .filter_map(|def| def.data.get(key))
            .collect();
        if !declaring.is_empty() && declaring.iter().all(|field| field.internal) {
            self.report(
                ValidationKind::TypeMismatch,
                format!("field `{key}` is engine-internal everywhere it is declared"),
            );
        }
    }

    // ---- expressions ----

    fn expect(&mut self, expr: &Expr, scope: &Scope, want: TypeDescriptor) {
        let ty = self.infer(expr, scope);
        if !ty.accepts(&want) {
            let Ty::Known(found) = ty else { unreachable!() };
            self.report(
                ValidationKind::TypeMismatch,
                format!("expected {want}, found {found}"),
            );
        }
    }

    fn expect_all(&mut self, operands: &[Expr], scope: &Scope, want: TypeDescriptor) {
        for operand in operands {
            self.expect(operand, scope, want.clone());
        }
    }

    fn infer(&mut self, expr: &Expr, scope: &Scope) -> Ty {
        match expr {
            Expr::Literal(literal) => self.infer_literal(literal, scope),

            Expr::Concat(operands) => {
                self.expect_all(operands, scope, TypeDescriptor::String);
                Ty::Known(TypeDescriptor::String)
            }

            Expr::Addition(operands) => {
                self.expect_all(operands, scope, TypeDescriptor::Number);
                Ty::Known(TypeDescriptor::Number)
            }

            Expr::Subtraction(operands) => {
                if operands.is_empty() {
                    self.report(
                        ValidationKind::ArityMismatch,
                        "`subtraction` needs at least one operand",
                    );
                }
                self.expect_all(operands, scope, TypeDescriptor::Number);
                Ty::Known(TypeDescriptor::Number)
            }

            Expr::Random { min, max } | Expr::RandomInt { min, max } => {
                self.expect(min, scope, TypeDescriptor::Number);
                self.expect(max, scope, TypeDescriptor::Number);
                Ty::Known(TypeDescriptor::Number)
            }

            Expr::Compare { op, operands } => {
                if operands.len() < 2 {
                    self.report(
                        ValidationKind::ArityMismatch,
                        format!("`{op}` needs at least two operands"),
                    );
                }
                if op.is_ordering() {
                    self.expect_all(operands, scope, TypeDescriptor::Number);
                } else {
                    for operand in operands {
                        self.infer(operand, scope);
                    }
                }
                Ty::Known(TypeDescriptor::Boolean)
            }

            Expr::Fold { operands, .. } => {
                self.expect_all(operands, scope, TypeDescriptor::Boolean);
                Ty::Known(TypeDescriptor::Boolean)
            }

            Expr::ContextExists { object } => {
                self.expect(object, scope, TypeDescriptor::String);
                Ty::Known(TypeDescriptor::Boolean)
            }

            Expr::PropertyExists { object, property } => {
                // Existence probes may name anything, including things that
                // do not exist; that is their purpose.
                self.infer(object, scope);
                self.expect(property, scope, TypeDescriptor::String);
                Ty::Known(TypeDescriptor::Boolean)
            }

            Expr::Map { array, value } => {
                let element = self.element_type(array, scope, "map");
                let inner = scope.clone().with("element", element);
                let mapped = self.infer(value, &inner);
                match mapped {
                    Ty::Known(ty) => Ty::Known(TypeDescriptor::Array(Box::new(ty))),
                    Ty::Unknown => Ty::Unknown,
                }
            }

            Expr::Filter { array, condition } => {
                let element = self.element_type(array, scope, "filter");
                let inner = scope.clone().with("element", element.clone());
                self.expect(condition, &inner, TypeDescriptor::Boolean);
                match element {
                    Ty::Known(ty) => Ty::Known(TypeDescriptor::Array(Box::new(ty))),
                    Ty::Unknown => Ty::Unknown,
                }
            }

            Expr::Keys { dictionary } => {
                self.expect_dictionary(dictionary, scope, "keys");
                Ty::Known(TypeDescriptor::Array(Box::new(TypeDescriptor::String)))
            }

            Expr::Values { dictionary } => match self.expect_dictionary(dictionary, scope, "values")
            {
                Some(value) => Ty::Known(TypeDescriptor::Array(Box::new(value))),
                None => Ty::Unknown,
            },

            Expr::CreateDictionary { entries } => {
                self.infer(entries, scope);
                Ty::Unknown
            }

            Expr::Ternary {
                condition,
                when_true,
                when_false,
            } => {
                self.expect(condition, scope, TypeDescriptor::Boolean);
                let a = self.infer(when_true, scope);
                let b = self.infer(when_false, scope);
                if a == b { a } else { Ty::Unknown }
            }

            Expr::GetContext { id } => {
                self.expect(id, scope, TypeDescriptor::String);
                if let Expr::Literal(Literal::String(name)) = &**id {
                    if let Some(ty) = scope.bindings.get(name) {
                        return ty.clone();
                    }
                    // `node-N` handles are runtime data; anything else must
                    // be a binding the body actually has.
                    if !name.starts_with("node-") {
                        self.report(
                            ValidationKind::UnknownReference,
                            format!("no context object named `{name}` in this scope"),
                        );
                    }
                }
                Ty::Unknown
            }

            Expr::Property { object, property } => {
                self.infer(object, scope);
                self.expect(property, scope, TypeDescriptor::String);
                Ty::Unknown
            }

            Expr::Method {
                object,
                method,
                params,
            } => {
                self.infer(object, scope);
                self.expect(method, scope, TypeDescriptor::String);
                if let Some(params) = params {
                    self.infer(params, scope);
                }
                Ty::Unknown
            }
        }
    }

    fn infer_literal(&mut self, literal: &Literal, scope: &Scope) -> Ty {
        match literal {
            Literal::String(_) => Ty::Known(TypeDescriptor::String),
            Literal::Number(_) => Ty::Known(TypeDescriptor::Number),
            Literal::Bool(_) => Ty::Known(TypeDescriptor::Boolean),
            Literal::Array(elements) => {
                let mut element: Option<Ty> = None;
                for item in elements {
                    let ty = self.infer(item, scope);
                    element = Some(match element {
                        None => ty,
                        Some(previous) if previous == ty => previous,
                        Some(_) => Ty::Unknown,
                    });
                }
                match element {
                    Some(Ty::Known(ty)) => Ty::Known(TypeDescriptor::Array(Box::new(ty))),
                    _ => Ty::Unknown,
                }
            }
            Literal::Dict(entries) => {
                let mut properties = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    match self.infer(value, scope) {
                        Ty::Known(ty) => {
                            properties.insert(key.clone(), ty);
                        }
                        Ty::Unknown => return Ty::Unknown,
                    }
                }
                Ty::Known(TypeDescriptor::Object(properties))
            }
        }
    }

    fn element_type(&mut self, array: &Expr, scope: &Scope, block: &str) -> Ty {
        match self.infer(array, scope) {
            Ty::Known(TypeDescriptor::Array(element)) => Ty::Known(*element),
            Ty::Known(other) => {
                self.report(
                    ValidationKind::TypeMismatch,
                    format!("`{block}` needs an array, found {other}"),
                );
                Ty::Unknown
            }
            Ty::Unknown => Ty::Unknown,
        }
    }

    fn expect_dictionary(
        &mut self,
        dictionary: &Expr,
        scope: &Scope,
        block: &str,
    ) -> Option<TypeDescriptor> {
        match self.infer(dictionary, scope) {
            Ty::Known(TypeDescriptor::Dictionary(value)) => Some(*value),
            Ty::Known(TypeDescriptor::Object(_)) => None,
            Ty::Known(other) => {
                self.report(
                    ValidationKind::TypeMismatch,
                    format!("`{block}` needs a dictionary, found {other}"),
                );
                None
            }
            Ty::Unknown => None,
        }
    }

    /// Recursively rejects `method` blocks; used for property values.
    fn forbid_method_calls(&mut self, expr: &Expr) {
        if let Expr::Method { .. } = expr {
            self.report(
                ValidationKind::TypeMismatch,
                "property values must be pure; method calls are not allowed here",
            );
            return;
        }
        expr_children(expr, &mut |child| self.forbid_method_calls(child));
    }
}

/// Visits every direct child expression of a block.
fn expr_children(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
    match expr {
        Expr::Literal(Literal::Array(items)) => items.iter().for_each(&mut *visit),
        Expr::Literal(Literal::Dict(entries)) => entries.values().for_each(&mut *visit),
        Expr::Literal(_) => {}
        Expr::Concat(operands)
        | Expr::Addition(operands)
        | Expr::Subtraction(operands)
        | Expr::Compare { operands, .. }
        | Expr::Fold { operands, .. } => operands.iter().for_each(&mut *visit),
        Expr::Random { min, max } | Expr::RandomInt { min, max } => {
            visit(min);
            visit(max);
        }
        Expr::ContextExists { object } => visit(object),
        Expr::PropertyExists { object, property } | Expr::Property { object, property } => {
            visit(object);
            visit(property);
        }
        Expr::Map { array, value } => {
            visit(array);
            visit(value);
        }
        Expr::Filter { array, condition } => {
            visit(array);
            visit(condition);
        }
        Expr::Keys { dictionary } | Expr::Values { dictionary } => visit(dictionary),
        Expr::CreateDictionary { entries } => visit(entries),
        Expr::Ternary {
            condition,
            when_true,
            when_false,
        } => {
            visit(condition);
            visit(when_true);
            visit(when_false);
        }
        Expr::Method {
            object,
            method,
            params,
        } => {
            visit(object);
            visit(method);
            if let Some(params) = params {
                visit(params);
            }
        }
        Expr::GetContext { id } => visit(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::schema::ContentPack;
    use serde_json::json;

    fn errors_of(pack: serde_json::Value) -> Vec<ValidationError> {
        let pack = ContentPack::from_json(pack).unwrap();
        let mut registry = Registry::new();
        registry.register(pack).unwrap();
        match registry.finish() {
            Ok(_) => Vec::new(),
            Err(errors) => errors,
        }
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn well_formed_pack_validates_clean() {
        let errors = errors_of(json!({
            "display": "ok",
            "items": {"ore": {"display": "Ore", "maxStackSize": 50}},
            "nodes": {
                "miner": {
                    "display": "Miner",
                    "size": 1,
                    "data": {"mined": {"_type": "number", "default": 0}},
                    "inventory": {"slots": 4},
                    "actions": {
                        "mine": {
                            "display": "Mine",
                            "duration": 2,
                            "run": [{
                                "_type": "addItemsToInventory",
                                "node": {"_type": "getContext", "id": "node"},
                                "items": [{"item": "ore", "quantity": 1}]
                            }]
                        }
                    }
                }
            }
        }));
        assert_eq!(errors, Vec::new());
    }

    #[test]
    fn operand_type_errors_are_all_collected() {
        let errors = errors_of(json!({
            "display": "bad",
            "nodes": {
                "sign": {
                    "display": "Sign",
                    "size": 1,
                    "place": [
                        {"_type": "error", "message": 3},
                        {"_type": "repeat", "iterations": "lots", "run": []}
                    ]
                }
            }
        }));
        assert_eq!(
            kinds(&errors),
            vec![ValidationKind::TypeMismatch, ValidationKind::TypeMismatch]
        );
    }

    #[test]
    fn break_outside_a_loop_is_rejected() {
        let errors = errors_of(json!({
            "display": "bad",
            "nodes": {
                "sign": {
                    "display": "Sign",
                    "size": 1,
                    "place": [{"_type": "@break"}]
                }
            }
        }));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].detail.contains("@break"));
    }

    #[test]
    fn wait_in_a_method_body_is_rejected() {
        let errors = errors_of(json!({
            "display": "bad",
            "types": {
                "counter": {
                    "methods": {
                        "tick": {"run": [{"_type": "wait", "duration": 1}]}
                    }
                }
            }
        }));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].path.contains("types.counter.methods.tick"));
    }

    #[test]
    fn property_values_must_not_call_methods() {
        let errors = errors_of(json!({
            "display": "bad",
            "types": {
                "counter": {
                    "properties": {
                        "doubled": {
                            "type": "number",
                            "value": {
                                "_type": "method",
                                "object": {"_type": "getContext", "id": "this"},
                                "method": "tick"
                            }
                        }
                    }
                }
            }
        }));
        assert!(errors.iter().any(|e| e.detail.contains("pure")));
    }

    #[test]
    fn unknown_names_are_reported_with_paths() {
        let errors = errors_of(json!({
            "display": "bad",
            "nodes": {
                "spawner": {
                    "display": "Spawner",
                    "size": 1,
                    "data": {"owner": {"_type": "id", "of": "ghost"}},
                    "place": [
                        {"_type": "addNode", "nodeType": "missing", "pos": {"x": 0, "y": 0}},
                        {
                            "_type": "setData",
                            "object": {"_type": "getContext", "id": "stranger"},
                            "key": "x",
                            "value": 1
                        }
                    ]
                }
            }
        }));
        assert_eq!(
            kinds(&errors),
            vec![
                ValidationKind::UnknownType,
                ValidationKind::UnknownReference,
                ValidationKind::UnknownReference,
            ]
        );
        assert_eq!(errors[0].path, "nodes.spawner.data.owner");
    }

    #[test]
    fn element_binding_is_scoped_to_its_loop() {
        let errors = errors_of(json!({
            "display": "bad",
            "nodes": {
                "sorter": {
                    "display": "Sorter",
                    "size": 1,
                    "place": [
                        {"_type": "forEach", "array": [1, 2], "forEach": []},
                        {
                            "_type": "event",
                            "event": "done",
                            "data": {"_type": "getContext", "id": "element"}
                        }
                    ]
                }
            }
        }));
        assert_eq!(kinds(&errors), vec![ValidationKind::UnknownReference]);
    }

    #[test]
    fn fold_operands_must_be_boolean() {
        let errors = errors_of(json!({
            "display": "bad",
            "nodes": {
                "gate": {
                    "display": "Gate",
                    "size": 1,
                    "place": [{
                        "_type": "branch",
                        "condition": {"_type": "all", "operands": [true, 7]},
                        "true": []
                    }]
                }
            }
        }));
        assert_eq!(kinds(&errors), vec![ValidationKind::TypeMismatch]);
    }
}
