//! The `Array` constructor and the natively implemented prototype methods.
//! The iteration methods (`map`, `forEach`, `sort`, ...) are source
//! polyfills, not natives, because they call back into user code.

use crate::{
    builtins::{arg, called_as_new, define_method, new_ctor},
    error::{Exception, RunResult},
    heap::{ObjId, ObjKind},
    interp::Interpreter,
    value::{Value, to_uint32},
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let (ctor, proto) = new_ctor(interp, "Array", array_ctor)?;
    interp.realm.array = ctor;
    define_method(interp, ctor, "isArray", array_is_array)?;

    define_method(interp, proto, "toString", proto_to_string)?;
    define_method(interp, proto, "push", proto_push)?;
    define_method(interp, proto, "pop", proto_pop)?;
    define_method(interp, proto, "shift", proto_shift)?;
    define_method(interp, proto, "unshift", proto_unshift)?;
    define_method(interp, proto, "reverse", proto_reverse)?;
    define_method(interp, proto, "splice", proto_splice)?;
    define_method(interp, proto, "slice", proto_slice)?;
    define_method(interp, proto, "concat", proto_concat)?;
    define_method(interp, proto, "join", proto_join)?;
    define_method(interp, proto, "indexOf", proto_index_of)?;
    define_method(interp, proto, "lastIndexOf", proto_last_index_of)?;
    Ok(())
}

fn this_array(interp: &Interpreter, this: &Value) -> Result<ObjId, Exception> {
    this.as_object()
        .filter(|id| interp.heap.get(*id).array_length().is_some())
        .ok_or_else(|| Exception::type_error("receiver is not an array"))
}

fn array_length(interp: &Interpreter, id: ObjId) -> u32 {
    interp.heap.get(id).array_length().unwrap_or(0)
}

fn set_length(interp: &mut Interpreter, id: ObjId, length: u32) {
    if let ObjKind::Array { length: slot } = &mut interp.heap.get_mut(id).kind {
        *slot = length;
    }
}

/// Reads the elements into a vector; holes come back as `None`.
fn read_elements(interp: &Interpreter, id: ObjId) -> Vec<Option<Value>> {
    let length = array_length(interp, id);
    (0..length)
        .map(|index| {
            interp
                .heap
                .get(id)
                .props
                .get(index.to_string().as_str())
                .map(|prop| prop.value.clone())
        })
        .collect()
}

/// Replaces the elements wholesale, preserving holes.
fn write_elements(interp: &mut Interpreter, id: ObjId, elements: &[Option<Value>]) {
    let old_length = array_length(interp, id);
    for index in 0..old_length.max(elements.len() as u32) {
        interp.heap.get_mut(id).props.shift_remove(index.to_string().as_str());
    }
    set_length(interp, id, 0);
    for (index, element) in elements.iter().enumerate() {
        if let Some(element) = element {
            interp.heap.insert_data_prop(id, &index.to_string(), element.clone());
        }
    }
    set_length(interp, id, elements.len() as u32);
}

/// Clamps a possibly negative relative index against `length`.
fn relative_index(value: &Value, length: u32, default: i64, heap: &crate::heap::Heap) -> u32 {
    let raw = match value {
        Value::Undefined => default,
        other => {
            let n = other.to_number(heap);
            if n.is_nan() { 0 } else { n.trunc() as i64 }
        }
    };
    let length = i64::from(length);
    let resolved = if raw < 0 { (length + raw).max(0) } else { raw.min(length) };
    resolved as u32
}

fn array_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let construct = called_as_new(interp, &this, interp.realm.array);
    let id = if construct {
        let id = this.as_object().expect("constructor receiver");
        interp.heap.get_mut(id).kind = ObjKind::Array { length: 0 };
        id
    } else {
        interp.create_array()?.as_object().expect("fresh array")
    };
    if args.len() == 1
        && let Value::Number(n) = &args[0]
    {
        let length = to_uint32(*n);
        if f64::from(length) != *n {
            return Err(Exception::range_error("Invalid array length"));
        }
        set_length(interp, id, length);
        return Ok(Value::Object(id));
    }
    for element in args {
        interp.heap.array_push(id, element.clone());
    }
    Ok(Value::Object(id))
}

fn array_is_array(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Boolean(
        arg(args, 0)
            .as_object()
            .is_some_and(|id| interp.heap.get(id).array_length().is_some()),
    ))
}

fn join_with(interp: &Interpreter, id: ObjId, separator: &str) -> String {
    let mut out = String::new();
    for (index, element) in read_elements(interp, id).iter().enumerate() {
        if index > 0 {
            out.push_str(separator);
        }
        match element {
            None | Some(Value::Undefined | Value::Null) => {}
            Some(element) => out.push_str(&element.to_js_string(&interp.heap)),
        }
    }
    out
}

fn proto_to_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    Ok(Value::string(&join_with(interp, id, ",")))
}

fn proto_join(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let separator = match arg(args, 0) {
        Value::Undefined => ",".into(),
        other => other.to_js_string(&interp.heap),
    };
    Ok(Value::string(&join_with(interp, id, &separator)))
}

fn proto_push(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    for element in args {
        interp.heap.array_push(id, element.clone());
    }
    Ok(Value::Number(f64::from(array_length(interp, id))))
}

fn proto_pop(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let length = array_length(interp, id);
    if length == 0 {
        return Ok(Value::Undefined);
    }
    let key = (length - 1).to_string();
    let popped = interp
        .heap
        .get_mut(id)
        .props
        .shift_remove(key.as_str())
        .map_or(Value::Undefined, |prop| prop.value);
    set_length(interp, id, length - 1);
    Ok(popped)
}

fn proto_shift(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let mut elements = read_elements(interp, id);
    if elements.is_empty() {
        return Ok(Value::Undefined);
    }
    let first = elements.remove(0).unwrap_or(Value::Undefined);
    write_elements(interp, id, &elements);
    Ok(first)
}

fn proto_unshift(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let mut elements: Vec<Option<Value>> = args.iter().cloned().map(Some).collect();
    elements.extend(read_elements(interp, id));
    write_elements(interp, id, &elements);
    Ok(Value::Number(elements.len() as f64))
}

fn proto_reverse(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let mut elements = read_elements(interp, id);
    elements.reverse();
    write_elements(interp, id, &elements);
    Ok(this)
}

fn proto_splice(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let length = array_length(interp, id);
    let start = relative_index(&arg(args, 0), length, 0, &interp.heap);
    let delete_count = match arg(args, 1) {
        Value::Undefined if args.len() <= 1 => length - start,
        count => {
            let n = count.to_number(&interp.heap);
            let n = if n.is_nan() { 0 } else { n.trunc().max(0.0) as u32 };
            n.min(length - start)
        }
    };
    let mut elements = read_elements(interp, id);
    let inserted: Vec<Option<Value>> = args.get(2..).unwrap_or_default().iter().cloned().map(Some).collect();
    let removed: Vec<Option<Value>> = elements
        .splice(start as usize..(start + delete_count) as usize, inserted)
        .collect();
    write_elements(interp, id, &elements);

    let result = interp.create_array()?;
    let result_id = result.as_object().expect("fresh array");
    write_elements(interp, result_id, &removed);
    Ok(result)
}

fn proto_slice(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let length = array_length(interp, id);
    let start = relative_index(&arg(args, 0), length, 0, &interp.heap);
    let end = relative_index(&arg(args, 1), length, i64::from(length), &interp.heap);
    let elements = read_elements(interp, id);
    let window: Vec<Option<Value>> = if start < end {
        elements[start as usize..end as usize].to_vec()
    } else {
        Vec::new()
    };
    let result = interp.create_array()?;
    let result_id = result.as_object().expect("fresh array");
    write_elements(interp, result_id, &window);
    Ok(result)
}

fn proto_concat(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let mut elements = read_elements(interp, id);
    for argument in args {
        match argument.as_object().filter(|a| interp.heap.get(*a).array_length().is_some()) {
            Some(other) => elements.extend(read_elements(interp, other)),
            None => elements.push(Some(argument.clone())),
        }
    }
    let result = interp.create_array()?;
    let result_id = result.as_object().expect("fresh array");
    write_elements(interp, result_id, &elements);
    Ok(result)
}

fn proto_index_of(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let length = array_length(interp, id);
    let needle = arg(args, 0);
    let start = relative_index(&arg(args, 1), length, 0, &interp.heap);
    for index in start..length {
        if interp.heap.array_get(id, index).strict_eq(&needle) {
            return Ok(Value::Number(f64::from(index)));
        }
    }
    Ok(Value::Number(-1.0))
}

fn proto_last_index_of(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let id = this_array(interp, &this)?;
    let length = array_length(interp, id);
    let needle = arg(args, 0);
    let end = match arg(args, 1) {
        Value::Undefined if args.len() <= 1 => length,
        from => relative_index(&from, length, i64::from(length), &interp.heap).min(length),
    };
    for index in (0..end).rev() {
        if interp.heap.array_get(id, index).strict_eq(&needle) {
            return Ok(Value::Number(f64::from(index)));
        }
    }
    Ok(Value::Number(-1.0))
}
