//! The `Boolean` constructor and prototype.

use crate::{
    builtins::{arg, called_as_new, define_method, new_ctor},
    error::{Exception, RunResult},
    heap::ObjKind,
    interp::Interpreter,
    value::Value,
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let (ctor, proto) = new_ctor(interp, "Boolean", boolean_ctor)?;
    interp.realm.boolean = ctor;
    define_method(interp, proto, "toString", proto_to_string)?;
    define_method(interp, proto, "valueOf", proto_value_of)?;
    Ok(())
}

fn boolean_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let value = arg(args, 0).to_boolean();
    if called_as_new(interp, &this, interp.realm.boolean) {
        let id = this.as_object().expect("constructor receiver");
        interp.heap.get_mut(id).kind = ObjKind::BoxedBoolean(value);
        Ok(this)
    } else {
        Ok(Value::Boolean(value))
    }
}

fn this_boolean(interp: &Interpreter, this: &Value) -> Result<bool, Exception> {
    match this {
        Value::Boolean(b) => Ok(*b),
        Value::Object(id) => match interp.heap.get(*id).kind {
            ObjKind::BoxedBoolean(b) => Ok(b),
            _ => Err(Exception::type_error("receiver is not a boolean")),
        },
        _ => Err(Exception::type_error("receiver is not a boolean")),
    }
}

fn proto_to_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::string(if this_boolean(interp, &this)? { "true" } else { "false" }))
}

fn proto_value_of(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Boolean(this_boolean(interp, &this)?))
}
