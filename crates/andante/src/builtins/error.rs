//! The `Error` constructor and its six subclasses. The subclasses share one
//! constructor template and differ only by the `name` on their prototypes.

use crate::{
    builtins::{arg, define_builtin, define_frozen, define_method, method_fn},
    error::{ErrorKind, Exception, RunResult},
    heap::{JsObject, ObjId, ObjKind, PropLookup},
    interp::Interpreter,
    value::Value,
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let error = install_one(interp, ErrorKind::Error, None)?;
    interp.realm.error = error;
    for kind in ErrorKind::SUBCLASSES {
        let ctor = install_one(interp, kind, Some(error))?;
        match kind {
            ErrorKind::EvalError => interp.realm.eval_error = ctor,
            ErrorKind::RangeError => interp.realm.range_error = ctor,
            ErrorKind::ReferenceError => interp.realm.reference_error = ctor,
            ErrorKind::SyntaxError => interp.realm.syntax_error = ctor,
            ErrorKind::TypeError => interp.realm.type_error = ctor,
            ErrorKind::URIError => interp.realm.uri_error = ctor,
            ErrorKind::Error => unreachable!(),
        }
    }
    Ok(())
}

/// Builds one error constructor. Subclass prototypes chain to
/// `Error.prototype` by pointing their `parent` at the base constructor.
fn install_one(interp: &mut Interpreter, kind: ErrorKind, base: Option<ObjId>) -> RunResult<ObjId> {
    let name: &'static str = kind.into();
    let ctor_cell = std::rc::Rc::new(std::cell::Cell::new(ObjId::PLACEHOLDER));
    let ctor_for_native = std::rc::Rc::clone(&ctor_cell);
    let ctor = method_fn(interp, move |i, this, args| {
        error_ctor(i, this, args, ctor_for_native.get())
    })?;
    ctor_cell.set(ctor);

    let proto = interp.heap.alloc(JsObject::new(ObjKind::Plain, base.or(Some(interp.realm.object))))?;
    define_frozen(interp, ctor, "prototype", Value::Object(proto));
    define_builtin(interp, proto, "constructor", Value::Object(ctor));
    define_builtin(interp, proto, "name", Value::string(name));
    define_builtin(interp, proto, "message", Value::string(""));
    if base.is_none() {
        define_method(interp, proto, "toString", proto_to_string)?;
    }
    crate::builtins::bind_global(interp, name, Value::Object(ctor));
    Ok(ctor)
}

/// The shared constructor body: works both as `new Kind(msg)` and as a
/// plain call `Kind(msg)`.
fn error_ctor(interp: &mut Interpreter, this: Value, args: &[Value], ctor: ObjId) -> Result<Value, Exception> {
    let receiver = match this.as_object() {
        Some(id) if interp.heap.get(id).parent == Some(ctor) => id,
        _ => {
            let fresh = interp
                .heap
                .alloc(JsObject::new(ObjKind::Plain, Some(ctor)))
                .map_err(|err| interp.run_error_to_exception(err, None))?;
            fresh
        }
    };
    match arg(args, 0) {
        Value::Undefined => {}
        message => {
            let message = message.to_js_string(&interp.heap);
            interp.heap.insert_data_prop(receiver, "message", Value::String(message));
        }
    }
    Ok(Value::Object(receiver))
}

fn proto_to_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let read = |name: &str| -> String {
        match interp.heap.lookup(&interp.realm, &this, name) {
            Ok(PropLookup::Data(value)) if !matches!(value, Value::Undefined) => {
                value.to_js_string(&interp.heap).to_string()
            }
            _ => String::new(),
        }
    };
    let name = read("name");
    let message = read("message");
    let rendered = match (name.is_empty(), message.is_empty()) {
        (true, _) => message,
        (false, true) => name,
        (false, false) => format!("{name}: {message}"),
    };
    Ok(Value::string(&rendered))
}
