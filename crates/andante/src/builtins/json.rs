//! The `JSON` namespace, backed by serde_json with key order preserved.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::{
    builtins::{arg, bind_global, define_method},
    error::{Exception, RunResult},
    heap::{JsObject, ObjId, ObjKind},
    interp::Interpreter,
    value::Value,
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let object = interp.realm.object;
    let json = interp.heap.alloc(JsObject::new(ObjKind::Plain, Some(object)))?;
    bind_global(interp, "JSON", Value::Object(json));
    define_method(interp, json, "parse", json_parse)?;
    define_method(interp, json, "stringify", json_stringify)?;
    Ok(())
}

fn json_parse(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let text = arg(args, 0).to_js_string(&interp.heap);
    let parsed: serde_json::Value =
        serde_json::from_str(&text).map_err(|err| Exception::syntax_error(format!("JSON.parse: {err}")))?;
    build_value(interp, &parsed)
}

fn build_value(interp: &mut Interpreter, json: &serde_json::Value) -> Result<Value, Exception> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(elements) => {
            let array = interp.create_array()?;
            let id = array.as_object().expect("fresh array");
            for element in elements {
                let element = build_value(interp, element)?;
                interp.heap.array_push(id, element);
            }
            array
        }
        serde_json::Value::Object(entries) => {
            let object = interp.create_object()?;
            let id = object.as_object().expect("fresh object");
            for (key, entry) in entries {
                let entry = build_value(interp, entry)?;
                interp.heap.insert_data_prop(id, key, entry);
            }
            object
        }
    })
}

/// Converts an interpreter value into a serde tree. `None` marks values
/// JSON leaves out (undefined and functions).
fn to_json(interp: &Interpreter, value: &Value, visiting: &mut Vec<ObjId>) -> Result<Option<serde_json::Value>, Exception> {
    Ok(match value {
        Value::Undefined => None,
        Value::Null => Some(serde_json::Value::Null),
        Value::Boolean(b) => Some(serde_json::Value::Bool(*b)),
        Value::Number(n) => Some(match serde_json::Number::from_f64(*n) {
            Some(number) => serde_json::Value::Number(number),
            // NaN and infinities serialize as null.
            None => serde_json::Value::Null,
        }),
        Value::String(s) => Some(serde_json::Value::String(s.to_string())),
        Value::Object(id) => {
            if visiting.contains(id) {
                return Err(Exception::type_error("Converting circular structure to JSON"));
            }
            visiting.push(*id);
            let out = match &interp.heap.get(*id).kind {
                ObjKind::Function(_) => None,
                ObjKind::BoxedNumber(n) => to_json(interp, &Value::Number(*n), visiting)?,
                ObjKind::BoxedBoolean(b) => Some(serde_json::Value::Bool(*b)),
                ObjKind::BoxedString(s) => Some(serde_json::Value::String(s.to_string())),
                ObjKind::Date(ms) => {
                    let rendered = crate::builtins::date::to_date_string(*ms);
                    let iso = chrono::DateTime::from_timestamp_millis(*ms as i64)
                        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string());
                    Some(serde_json::Value::String(iso.unwrap_or(rendered)))
                }
                ObjKind::Array { length } => {
                    let mut elements = Vec::with_capacity(*length as usize);
                    for index in 0..*length {
                        let element = interp.heap.array_get(*id, index);
                        // Holes, undefined and functions become null inside
                        // arrays.
                        elements.push(to_json(interp, &element, visiting)?.unwrap_or(serde_json::Value::Null));
                    }
                    Some(serde_json::Value::Array(elements))
                }
                _ => {
                    let keys = interp.heap.own_enumerable_keys(*id);
                    let mut entries = serde_json::Map::new();
                    for key in keys {
                        let prop = &interp.heap.get(*id).props[key.as_ref()];
                        if prop.is_accessor() {
                            continue;
                        }
                        if let Some(converted) = to_json(interp, &prop.value.clone(), visiting)? {
                            entries.insert(key.to_string(), converted);
                        }
                    }
                    Some(serde_json::Value::Object(entries))
                }
            };
            visiting.pop();
            out
        }
    })
}

/// Resolves the `space` argument into an indent string (at most ten
/// characters, per the dialect).
fn indent_of(space: &Value) -> String {
    match space {
        Value::Number(n) => {
            let count = (n.trunc().max(0.0) as usize).min(10);
            " ".repeat(count)
        }
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    }
}

fn json_stringify(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let mut visiting = Vec::new();
    let Some(tree) = to_json(interp, &arg(args, 0), &mut visiting)? else {
        return Ok(Value::Undefined);
    };
    let indent = indent_of(&arg(args, 2));
    let rendered = if indent.is_empty() {
        serde_json::to_string(&tree)
    } else {
        let mut out = Vec::new();
        let formatter = PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = Serializer::with_formatter(&mut out, formatter);
        tree.serialize(&mut serializer)
            .map(|()| String::from_utf8(out).expect("serde_json emits UTF-8"))
    }
    .map_err(|err| Exception::type_error(format!("JSON.stringify: {err}")))?;
    Ok(Value::string(&rendered))
}
