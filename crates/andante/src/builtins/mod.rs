//! Construction and population of the standard built-ins.
//!
//! Installation order is fixed: Function, Object (after which the global
//! scope's constructor is set), Array, Number, String, Boolean, Date, Math,
//! RegExp, JSON, Error and its six subclasses, then the global functions.
//! A small set of Array methods and `Object.defineProperties` are source
//! polyfills executed before user code (see [`polyfill`]).

mod array;
mod boolean;
pub(crate) mod date;
mod error;
mod function;
mod global;
mod json;
mod math;
mod number;
mod object;
pub(crate) mod polyfill;
pub(crate) mod regexp;
mod string;

use std::rc::Rc;

use crate::{
    error::{Exception, RunResult},
    heap::{FnBody, FnData, JsObject, ObjId, ObjKind, Property},
    interp::Interpreter,
    scope,
    value::Value,
};

pub(crate) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let global = scope::new_scope(&mut interp.heap, None, false)?;
    interp.realm.global = global;
    function::install(interp)?;
    object::install(interp)?;
    array::install(interp)?;
    number::install(interp)?;
    string::install(interp)?;
    boolean::install(interp)?;
    date::install(interp)?;
    math::install(interp)?;
    regexp::install(interp)?;
    json::install(interp)?;
    error::install(interp)?;
    global::install(interp)?;
    Ok(())
}

/// The first argument at `index`, or `undefined`.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// Allocates a bare native function object. Built-in methods carry no
/// `prototype` property, unlike user functions and host-injected natives.
pub(crate) fn method_fn(
    interp: &mut Interpreter,
    f: impl Fn(&mut Interpreter, Value, &[Value]) -> Result<Value, Exception> + 'static,
) -> RunResult<ObjId> {
    interp.heap.alloc(JsObject::new(
        ObjKind::Function(Box::new(FnData {
            body: FnBody::Native(Rc::new(f)),
        })),
        Some(interp.realm.function),
    ))
}

/// Defines a non-enumerable (but writable and configurable) property, the
/// attribute set of built-in methods.
pub(crate) fn define_builtin(interp: &mut Interpreter, target: ObjId, name: &str, value: Value) {
    interp
        .heap
        .get_mut(target)
        .props
        .insert(Rc::from(name), Property::builtin(value));
}

/// Defines a fully locked property (constructor `prototype` slots and
/// numeric constants).
pub(crate) fn define_frozen(interp: &mut Interpreter, target: ObjId, name: &str, value: Value) {
    interp
        .heap
        .get_mut(target)
        .props
        .insert(Rc::from(name), Property::frozen(value));
}

/// Installs a native method on `target`.
pub(crate) fn define_method(
    interp: &mut Interpreter,
    target: ObjId,
    name: &str,
    f: impl Fn(&mut Interpreter, Value, &[Value]) -> Result<Value, Exception> + 'static,
) -> RunResult<()> {
    let func = method_fn(interp, f)?;
    define_builtin(interp, target, name, Value::Object(func));
    Ok(())
}

/// Binds a name on the global scope, non-enumerably.
pub(crate) fn bind_global(interp: &mut Interpreter, name: &str, value: Value) {
    let global = interp.realm.global;
    interp
        .heap
        .get_mut(global)
        .props
        .insert(Rc::from(name), Property::builtin(value));
}

/// Creates a constructor/prototype pair and binds the constructor globally.
pub(crate) fn new_ctor(
    interp: &mut Interpreter,
    name: &str,
    f: impl Fn(&mut Interpreter, Value, &[Value]) -> Result<Value, Exception> + 'static,
) -> RunResult<(ObjId, ObjId)> {
    let ctor = method_fn(interp, f)?;
    let proto = interp
        .heap
        .alloc(JsObject::new(ObjKind::Plain, Some(interp.realm.object)))?;
    define_frozen(interp, ctor, "prototype", Value::Object(proto));
    define_builtin(interp, proto, "constructor", Value::Object(ctor));
    bind_global(interp, name, Value::Object(ctor));
    Ok((ctor, proto))
}

/// Whether a constructor native was invoked by `new`: the implicit receiver
/// is a fresh object whose constructor is the callee itself.
pub(crate) fn called_as_new(interp: &Interpreter, this: &Value, ctor: ObjId) -> bool {
    this.as_object()
        .is_some_and(|id| interp.heap.get(id).parent == Some(ctor))
}

/// The `this` value as a function object, for `Function.prototype` methods.
pub(crate) fn this_function(interp: &Interpreter, this: &Value) -> Result<ObjId, Exception> {
    this.as_object()
        .filter(|id| interp.heap.get(*id).is_function())
        .ok_or_else(|| Exception::type_error("receiver is not a function"))
}
