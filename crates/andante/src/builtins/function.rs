//! The `Function` constructor and `Function.prototype`.
//!
//! `Function` is bootstrapped by hand because every later function object
//! (including all other constructors) points at it.

use std::rc::Rc;

use crate::{
    builtins::{arg, define_builtin, define_frozen, define_method, this_function},
    error::{Exception, RunResult},
    heap::{FnBody, FnData, JsObject, ObjKind, Property},
    interp::Interpreter,
    parse,
    value::Value,
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    // The constructor's own parent is itself: Function instanceof Function.
    let function = interp.heap.alloc(JsObject::new(
        ObjKind::Function(Box::new(FnData {
            body: FnBody::Native(Rc::new(function_ctor)),
        })),
        None,
    ))?;
    interp.heap.get_mut(function).parent = Some(function);
    interp.realm.function = function;

    // Function.prototype is itself callable and returns undefined.
    let proto = interp.heap.alloc(JsObject::new(
        ObjKind::Function(Box::new(FnData {
            body: FnBody::Native(Rc::new(native_noop)),
        })),
        Some(function),
    ))?;
    define_frozen(interp, function, "prototype", Value::Object(proto));
    define_builtin(interp, proto, "constructor", Value::Object(function));
    interp.heap.get_mut(function).props.insert(
        Rc::from("length"),
        Property::frozen(Value::Number(1.0)),
    );

    define_method(interp, proto, "apply", fn_apply)?;
    define_method(interp, proto, "call", fn_call)?;
    define_method(interp, proto, "bind", fn_bind)?;
    define_method(interp, proto, "toString", fn_to_string)?;

    crate::builtins::bind_global(interp, "Function", Value::Object(function));
    Ok(())
}

fn native_noop(_interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Undefined)
}

/// `Function(arg1, ..., argN, body)`: assembles a function literal, parses
/// it, and closes over the global scope.
fn function_ctor(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let mut params = Vec::new();
    let mut body = String::new();
    if let Some((last, rest)) = args.split_last() {
        for param in rest {
            params.push(param.to_js_string(&interp.heap).to_string());
        }
        body = last.to_js_string(&interp.heap).to_string();
    }
    let source = format!("(function({}) {{\n{}\n}})", params.join(", "), body);
    let node = parse::parse_function_literal(&source)?;
    let global = interp.realm.global;
    interp
        .create_closure(&node, global)
        .map_err(|err| interp.run_error_to_exception(err, None))
}

/// Collects the elements of an array-like argument for `apply`.
fn array_like_args(interp: &Interpreter, value: &Value) -> Result<Vec<Value>, Exception> {
    match value {
        Value::Undefined | Value::Null => Ok(Vec::new()),
        Value::Object(id) => match interp.heap.get(*id).array_length() {
            Some(length) => Ok((0..length).map(|index| interp.heap.array_get(*id, index)).collect()),
            None => Err(Exception::type_error("second argument to apply must be an array")),
        },
        _ => Err(Exception::type_error("second argument to apply must be an array")),
    }
}

fn fn_apply(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    this_function(interp, &this)?;
    let this_arg = arg(args, 0);
    let call_args = array_like_args(interp, &arg(args, 1))?;
    interp.push_pending_call(this, this_arg, call_args);
    Ok(Value::Undefined)
}

fn fn_call(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    this_function(interp, &this)?;
    let this_arg = arg(args, 0);
    let call_args = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
    interp.push_pending_call(this, this_arg, call_args);
    Ok(Value::Undefined)
}

fn fn_bind(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let target = this_function(interp, &this)?;
    let bound_this = arg(args, 0);
    let bound_args = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
    let bound = interp
        .new_function_object(
            FnBody::Bound {
                target,
                this_value: bound_this,
                bound_args,
            },
            0,
        )
        .map_err(|err| interp.run_error_to_exception(err, None))?;
    Ok(Value::Object(bound))
}

fn fn_to_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let func = this_function(interp, &this)?;
    let data = interp.heap.get(func).fn_data().expect("checked function");
    let rendered = match &data.body {
        FnBody::Ast { node, .. } => match &node.source {
            Some(source) => source.to_string(),
            None => "function () { [unavailable code] }".to_owned(),
        },
        _ => "function () { [native code] }".to_owned(),
    };
    Ok(Value::string(&rendered))
}
