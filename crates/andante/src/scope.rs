//! Scope objects, name resolution and hoisting.
//!
//! A scope is an ordinary heap object whose property store holds the
//! bindings, plus a parent link and a strict flag. `with` scopes carry a
//! target object and proxy every binding through it; `catch` scopes are
//! plain scopes that bind the single exception name and never re-hoist.

use std::rc::Rc;

use crate::{
    ast::{ForInTarget, ForInit, FunctionNode, Stmt, StmtKind},
    error::{RunError, RunResult},
    heap::{Heap, JsObject, ObjId, ObjKind, PropLookup, Property, ScopeData, SetOutcome},
    interp::Realm,
    value::Value,
};

/// Result of resolving a name against a scope chain.
#[derive(Debug)]
pub(crate) enum NameLookup {
    NotFound,
    Data(Value),
    /// The name resolved to an accessor (on a `with` target or on a scope
    /// object itself); the caller dispatches the getter with `this_value`.
    Accessor { getter: Option<ObjId>, this_value: Value },
}

/// Result of assigning to a name.
#[derive(Debug)]
pub(crate) enum AssignOutcome {
    Done,
    /// A setter must be invoked with the assigned value.
    Setter { setter: ObjId, this_value: Value },
}

pub(crate) fn new_scope(heap: &mut Heap, parent: Option<ObjId>, strict: bool) -> RunResult<ObjId> {
    heap.alloc(JsObject::new(
        ObjKind::Scope(Box::new(ScopeData {
            parent,
            strict,
            with_object: None,
        })),
        None,
    ))
}

pub(crate) fn new_with_scope(heap: &mut Heap, parent: ObjId, target: ObjId) -> RunResult<ObjId> {
    let strict = scope_strict(heap, parent);
    heap.alloc(JsObject::new(
        ObjKind::Scope(Box::new(ScopeData {
            parent: Some(parent),
            strict,
            with_object: Some(target),
        })),
        None,
    ))
}

pub(crate) fn scope_strict(heap: &Heap, scope: ObjId) -> bool {
    heap.get(scope).scope_data().is_some_and(|data| data.strict)
}

fn scope_parts(heap: &Heap, scope: ObjId) -> (Option<ObjId>, Option<ObjId>) {
    let data = heap.get(scope).scope_data().expect("scope object expected");
    (data.parent, data.with_object)
}

/// Resolves `name` along the scope chain, innermost first.
pub(crate) fn lookup_name(heap: &Heap, realm: &Realm, scope: ObjId, name: &str) -> RunResult<NameLookup> {
    let mut current = Some(scope);
    while let Some(scope_id) = current {
        let (parent, with_object) = scope_parts(heap, scope_id);
        if let Some(target) = with_object {
            let target_value = Value::Object(target);
            if heap.has_property(realm, &target_value, name) {
                return Ok(match heap.lookup(realm, &target_value, name)? {
                    PropLookup::Data(value) => NameLookup::Data(value),
                    PropLookup::Accessor { getter } => NameLookup::Accessor {
                        getter,
                        this_value: target_value,
                    },
                    PropLookup::NotFound => NameLookup::NotFound,
                });
            }
        } else if let Some(prop) = heap.get(scope_id).props.get(name) {
            if prop.is_accessor() {
                return Ok(NameLookup::Accessor {
                    getter: prop.getter,
                    this_value: Value::Object(scope_id),
                });
            }
            return Ok(NameLookup::Data(prop.value.clone()));
        }
        current = parent;
    }
    Ok(NameLookup::NotFound)
}

/// Whether `name` resolves at all (the no-throw path used by `typeof`).
pub(crate) fn name_is_bound(heap: &Heap, realm: &Realm, scope: ObjId, name: &str) -> bool {
    let mut current = Some(scope);
    while let Some(scope_id) = current {
        let (parent, with_object) = scope_parts(heap, scope_id);
        if let Some(target) = with_object {
            if heap.has_property(realm, &Value::Object(target), name) {
                return true;
            }
        } else if heap.get(scope_id).props.contains_key(name) {
            return true;
        }
        current = parent;
    }
    false
}

/// Assigns to `name`. Unbound names throw `ReferenceError` in strict mode
/// and install a global binding in sloppy mode.
pub(crate) fn assign_name(
    heap: &mut Heap,
    realm: &Realm,
    scope: ObjId,
    name: &str,
    value: Value,
    strict: bool,
) -> RunResult<AssignOutcome> {
    let mut current = Some(scope);
    while let Some(scope_id) = current {
        let (parent, with_object) = scope_parts(heap, scope_id);
        if let Some(target) = with_object {
            let target_value = Value::Object(target);
            if heap.has_property(realm, &target_value, name) {
                return Ok(match heap.set_prop(&target_value, name, value, strict)? {
                    SetOutcome::Done => AssignOutcome::Done,
                    SetOutcome::Setter(setter) => AssignOutcome::Setter {
                        setter,
                        this_value: target_value,
                    },
                });
            }
        } else if heap.get(scope_id).props.contains_key(name) {
            return Ok(match heap.set_prop(&Value::Object(scope_id), name, value, strict)? {
                SetOutcome::Done => AssignOutcome::Done,
                SetOutcome::Setter(setter) => AssignOutcome::Setter {
                    setter,
                    this_value: Value::Object(scope_id),
                },
            });
        }
        current = parent;
    }
    if strict {
        return Err(RunError::reference_error(format!("{name} is not defined")));
    }
    heap.get_mut(realm.global)
        .props
        .insert(Rc::from(name), Property::data(value));
    Ok(AssignOutcome::Done)
}

/// Installs a hoisted binding in `scope`. A plain `var` keeps any existing
/// binding; a function declaration always overwrites.
pub(crate) fn declare(heap: &mut Heap, scope: ObjId, name: &str, value: Option<Value>) {
    let obj = heap.get_mut(scope);
    match value {
        Some(value) => {
            obj.props.insert(Rc::from(name), Property::data(value));
        }
        None => {
            if !obj.props.contains_key(name) {
                obj.props.insert(Rc::from(name), Property::data(Value::Undefined));
            }
        }
    }
}

/// Hoisting scan results: `var` names and function declarations, in source
/// order, without descending into nested function bodies.
#[derive(Debug, Default)]
pub(crate) struct Hoisted {
    pub vars: Vec<Rc<str>>,
    pub funcs: Vec<Rc<FunctionNode>>,
}

pub(crate) fn hoist_collect(body: &[Stmt]) -> Hoisted {
    let mut hoisted = Hoisted::default();
    for stmt in body {
        collect_stmt(stmt, &mut hoisted);
    }
    hoisted
}

fn collect_stmt(stmt: &Stmt, out: &mut Hoisted) {
    match &stmt.kind {
        StmtKind::VarDecl(decls) => {
            for decl in decls.iter() {
                out.vars.push(Rc::clone(&decl.name));
            }
        }
        StmtKind::FunctionDecl(node) => out.funcs.push(Rc::clone(node)),
        StmtKind::Block(body) => {
            for stmt in body.iter() {
                collect_stmt(stmt, out);
            }
        }
        StmtKind::If {
            consequent, alternate, ..
        } => {
            collect_stmt(consequent, out);
            if let Some(alternate) = alternate {
                collect_stmt(alternate, out);
            }
        }
        StmtKind::For { init, body, .. } => {
            if let Some(ForInit::Decl(decls)) = init {
                for decl in decls.iter() {
                    out.vars.push(Rc::clone(&decl.name));
                }
            }
            collect_stmt(body, out);
        }
        StmtKind::ForIn { left, body, .. } => {
            if let ForInTarget::Decl(name) = left {
                out.vars.push(Rc::clone(name));
            }
            collect_stmt(body, out);
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => collect_stmt(body, out),
        StmtKind::Switch { cases, .. } => {
            for case in cases.iter() {
                for stmt in case.body.iter() {
                    collect_stmt(stmt, out);
                }
            }
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            for stmt in block.iter() {
                collect_stmt(stmt, out);
            }
            if let Some(handler) = handler {
                for stmt in handler.body.iter() {
                    collect_stmt(stmt, out);
                }
            }
            if let Some(finalizer) = finalizer {
                for stmt in finalizer.iter() {
                    collect_stmt(stmt, out);
                }
            }
        }
        StmtKind::Labeled { body, .. } | StmtKind::With { body, .. } => collect_stmt(body, out),
        StmtKind::Expression(_)
        | StmtKind::Empty
        | StmtKind::Throw(_)
        | StmtKind::Return(_)
        | StmtKind::Break(_)
        | StmtKind::Continue(_)
        | StmtKind::Debugger => {}
    }
}
