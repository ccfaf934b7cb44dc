//! The `Object` constructor, its reflection statics, and
//! `Object.prototype`. Installing it also gives the global scope and
//! `Function.prototype` their place in the prototype graph.

use std::rc::Rc;

use crate::{
    builtins::{arg, called_as_new, define_builtin, define_frozen, define_method, method_fn},
    error::{Exception, RunResult},
    heap::{Descriptor, JsObject, ObjId, ObjKind},
    interp::Interpreter,
    value::Value,
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let ctor = method_fn(interp, object_ctor)?;
    // Object.prototype ends every prototype chain: no parent.
    let proto = interp.heap.alloc(JsObject::new(ObjKind::Plain, None))?;
    define_frozen(interp, ctor, "prototype", Value::Object(proto));
    define_builtin(interp, proto, "constructor", Value::Object(ctor));
    crate::builtins::bind_global(interp, "Object", Value::Object(ctor));
    interp.realm.object = ctor;

    // Retrofit the objects built before Object existed.
    let global = interp.realm.global;
    interp.heap.get_mut(global).parent = Some(ctor);
    let function_proto = interp
        .heap
        .constructor_prototype(interp.realm.function)
        .expect("Function.prototype exists");
    interp.heap.get_mut(function_proto).parent = Some(ctor);

    define_method(interp, ctor, "getPrototypeOf", object_get_prototype_of)?;
    define_method(interp, ctor, "create", object_create)?;
    define_method(interp, ctor, "defineProperty", object_define_property)?;
    define_method(interp, ctor, "getOwnPropertyDescriptor", object_get_own_property_descriptor)?;
    define_method(interp, ctor, "getOwnPropertyNames", object_get_own_property_names)?;
    define_method(interp, ctor, "keys", object_keys)?;
    define_method(interp, ctor, "preventExtensions", object_prevent_extensions)?;
    define_method(interp, ctor, "isExtensible", object_is_extensible)?;

    define_method(interp, proto, "toString", proto_to_string)?;
    define_method(interp, proto, "toLocaleString", proto_to_string)?;
    define_method(interp, proto, "valueOf", proto_value_of)?;
    define_method(interp, proto, "hasOwnProperty", proto_has_own_property)?;
    define_method(interp, proto, "propertyIsEnumerable", proto_property_is_enumerable)?;
    define_method(interp, proto, "isPrototypeOf", proto_is_prototype_of)?;
    Ok(())
}

fn object_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let argument = arg(args, 0);
    match argument {
        Value::Undefined | Value::Null => {
            if called_as_new(interp, &this, interp.realm.object) {
                Ok(this)
            } else {
                interp.create_object()
            }
        }
        Value::Object(_) => Ok(argument),
        primitive => {
            let id = interp
                .to_object(&primitive)
                .map_err(|err| interp.run_error_to_exception(err, None))?;
            Ok(Value::Object(id))
        }
    }
}

fn expect_object(value: &Value, who: &str) -> Result<ObjId, Exception> {
    value
        .as_object()
        .ok_or_else(|| Exception::type_error(format!("{who} called on non-object")))
}

fn object_get_prototype_of(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = expect_object(&arg(args, 0), "Object.getPrototypeOf")?;
    Ok(interp.heap.proto_of(id).map_or(Value::Null, Value::Object))
}

/// `Object.create(proto)`: the prototype link goes through a constructor,
/// so a hidden constructor is synthesized whose `prototype` is `proto`.
fn object_create(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let proto = arg(args, 0);
    let parent = match &proto {
        Value::Null => None,
        Value::Object(proto_id) => {
            let dummy = method_fn(interp, |_, _, _| Ok(Value::Undefined))
                .map_err(|err| interp.run_error_to_exception(err, None))?;
            define_frozen(interp, dummy, "prototype", Value::Object(*proto_id));
            Some(dummy)
        }
        _ => return Err(Exception::type_error("Object prototype may only be an Object or null")),
    };
    let id = interp
        .heap
        .alloc(JsObject::new(ObjKind::Plain, parent))
        .map_err(|err| interp.run_error_to_exception(err, None))?;
    if let Value::Object(props) = arg(args, 1) {
        let keys = interp.heap.own_enumerable_keys(props);
        for key in keys {
            let descriptor = interp
                .heap
                .get(props)
                .props
                .get(key.as_ref())
                .map_or(Value::Undefined, |prop| prop.value.clone());
            define_from_descriptor(interp, id, &key, &descriptor)?;
        }
    }
    Ok(Value::Object(id))
}

/// Reads a descriptor object into the internal [`Descriptor`] form.
fn read_descriptor(interp: &Interpreter, descriptor: &Value) -> Result<Descriptor, Exception> {
    let Some(id) = descriptor.as_object() else {
        return Err(Exception::type_error("property descriptor must be an object"));
    };
    let read = |name: &str| -> Option<Value> {
        interp
            .heap
            .get(id)
            .props
            .get(name)
            .filter(|prop| !prop.is_accessor())
            .map(|prop| prop.value.clone())
    };
    let accessor_fn = |value: &Value, what: &str| -> Result<Option<ObjId>, Exception> {
        match value {
            Value::Undefined => Ok(None),
            Value::Object(f) if interp.heap.get(*f).is_function() => Ok(Some(*f)),
            _ => Err(Exception::type_error(format!("{what} must be a function"))),
        }
    };
    let mut out = Descriptor {
        value: read("value"),
        writable: read("writable").map(|v| v.to_boolean()),
        enumerable: read("enumerable").map(|v| v.to_boolean()),
        configurable: read("configurable").map(|v| v.to_boolean()),
        ..Descriptor::default()
    };
    if let Some(getter) = read("get") {
        out.getter = accessor_fn(&getter, "getter")?;
    }
    if let Some(setter) = read("set") {
        out.setter = accessor_fn(&setter, "setter")?;
    }
    if (out.getter.is_some() || out.setter.is_some()) && (out.value.is_some() || out.writable.is_some()) {
        return Err(Exception::type_error(
            "property descriptors must not specify a value or be writable when a getter or setter has been specified",
        ));
    }
    Ok(out)
}

fn define_from_descriptor(
    interp: &mut Interpreter,
    target: ObjId,
    name: &str,
    descriptor: &Value,
) -> Result<(), Exception> {
    let desc = read_descriptor(interp, descriptor)?;
    interp
        .heap
        .define_prop(target, name, &desc)
        .map_err(|err| interp.run_error_to_exception(err, None))
}

fn object_define_property(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let target = arg(args, 0);
    let id = expect_object(&target, "Object.defineProperty")?;
    let name = arg(args, 1).to_js_string(&interp.heap);
    define_from_descriptor(interp, id, &name, &arg(args, 2))?;
    Ok(target)
}

fn object_get_own_property_descriptor(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Exception> {
    let id = expect_object(&arg(args, 0), "Object.getOwnPropertyDescriptor")?;
    let name = arg(args, 1).to_js_string(&interp.heap);
    if name.as_ref() == "length"
        && let Some(length) = interp.heap.get(id).array_length()
    {
        let result = interp.create_object()?;
        let out = result.as_object().expect("fresh object");
        interp.heap.insert_data_prop(out, "value", Value::Number(f64::from(length)));
        interp.heap.insert_data_prop(out, "writable", Value::Boolean(true));
        interp.heap.insert_data_prop(out, "enumerable", Value::Boolean(false));
        interp.heap.insert_data_prop(out, "configurable", Value::Boolean(false));
        return Ok(result);
    }
    let Some(prop) = interp.heap.get(id).props.get(name.as_ref()).cloned() else {
        return Ok(Value::Undefined);
    };
    let result = interp.create_object()?;
    let out = result.as_object().expect("fresh object");
    if prop.is_accessor() {
        let getter = prop.getter.map_or(Value::Undefined, Value::Object);
        let setter = prop.setter.map_or(Value::Undefined, Value::Object);
        interp.heap.insert_data_prop(out, "get", getter);
        interp.heap.insert_data_prop(out, "set", setter);
    } else {
        interp.heap.insert_data_prop(out, "value", prop.value.clone());
        interp.heap.insert_data_prop(out, "writable", Value::Boolean(prop.writable));
    }
    interp.heap.insert_data_prop(out, "enumerable", Value::Boolean(prop.enumerable));
    interp
        .heap
        .insert_data_prop(out, "configurable", Value::Boolean(prop.configurable));
    Ok(result)
}

fn keys_to_array(interp: &mut Interpreter, keys: Vec<Rc<str>>) -> Result<Value, Exception> {
    let array = interp.create_array()?;
    let id = array.as_object().expect("fresh array");
    for key in keys {
        interp.heap.array_push(id, Value::String(key));
    }
    Ok(array)
}

fn object_get_own_property_names(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = expect_object(&arg(args, 0), "Object.getOwnPropertyNames")?;
    let keys = interp.heap.own_keys(id);
    keys_to_array(interp, keys)
}

fn object_keys(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = expect_object(&arg(args, 0), "Object.keys")?;
    let keys = interp.heap.own_enumerable_keys(id);
    keys_to_array(interp, keys)
}

fn object_prevent_extensions(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let target = arg(args, 0);
    if let Some(id) = target.as_object() {
        interp.heap.get_mut(id).extensible = false;
    }
    Ok(target)
}

fn object_is_extensible(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Boolean(
        arg(args, 0).as_object().is_some_and(|id| interp.heap.get(id).extensible),
    ))
}

fn proto_to_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let rendered = match &this {
        Value::Object(id) if interp.heap.get(*id).is_function() => "[function]",
        Value::Object(_) => "[object]",
        primitive => return Ok(Value::String(primitive.to_js_string(&interp.heap))),
    };
    Ok(Value::string(rendered))
}

fn proto_value_of(_interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    Ok(this)
}

fn proto_has_own_property(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let name = arg(args, 0).to_js_string(&interp.heap);
    let found = match &this {
        Value::Object(id) => {
            interp.heap.get(*id).props.contains_key(name.as_ref())
                || (name.as_ref() == "length" && interp.heap.get(*id).array_length().is_some())
        }
        Value::String(s) => crate::heap::Heap::string_own_exists(s, &name),
        _ => false,
    };
    Ok(Value::Boolean(found))
}

fn proto_property_is_enumerable(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let name = arg(args, 0).to_js_string(&interp.heap);
    let enumerable = this
        .as_object()
        .and_then(|id| interp.heap.get(id).props.get(name.as_ref()).map(|prop| prop.enumerable))
        .unwrap_or(false);
    Ok(Value::Boolean(enumerable))
}

fn proto_is_prototype_of(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let Some(target) = this.as_object() else {
        return Ok(Value::Boolean(false));
    };
    let Some(mut current) = arg(args, 0).as_object() else {
        return Ok(Value::Boolean(false));
    };
    let mut visited = Vec::new();
    while let Some(proto) = interp.heap.proto_of(current) {
        if proto == target {
            return Ok(Value::Boolean(true));
        }
        if visited.contains(&proto) {
            break;
        }
        visited.push(proto);
        current = proto;
    }
    Ok(Value::Boolean(false))
}
