//! Host-facing value bridge and the asynchronous completion handle.
//!
//! [`HostValue`] is the JSON-style type that crosses the host boundary in
//! both directions; `native_to_pseudo`/`pseudo_to_native` are a deep
//! bijection over it. [`AsyncHandle`] is the write end of the single-slot
//! completion mailbox used by asynchronous native functions.

use std::{cell::RefCell, rc::Rc};

use crate::{
    error::{Exception, RunResult},
    heap::{Heap, JsObject, ObjId, ObjKind},
    interp::Realm,
    value::Value,
};

/// A host-side value: the JSON-style subset that round-trips through the
/// interpreter without loss.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum HostValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<HostValue>),
    /// A plain object as ordered key/value pairs.
    Map(Vec<(String, HostValue)>),
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(v: Vec<HostValue>) -> Self {
        Self::Array(v)
    }
}

/// Outcome written into the completion mailbox by an [`AsyncHandle`].
#[derive(Debug, Clone)]
pub(crate) enum AsyncOutcome {
    Resolved(Value),
    Rejected(Exception),
}

/// Write end of the completion mailbox for one asynchronous native call.
///
/// The host stores the handle, performs its work, and calls [`resolve`] or
/// [`reject`]; the interpreter picks the outcome up at the top of the next
/// `step()` and resumes. Resolving twice keeps the first outcome.
///
/// [`resolve`]: AsyncHandle::resolve
/// [`reject`]: AsyncHandle::reject
#[derive(Debug, Clone)]
pub struct AsyncHandle {
    slot: Rc<RefCell<Option<AsyncOutcome>>>,
}

impl AsyncHandle {
    pub(crate) fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
        }
    }

    pub(crate) fn slot(&self) -> Rc<RefCell<Option<AsyncOutcome>>> {
        Rc::clone(&self.slot)
    }

    /// Completes the pending call with a value.
    pub fn resolve(&self, value: Value) {
        let mut slot = self.slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(AsyncOutcome::Resolved(value));
        }
    }

    /// Fails the pending call; the exception is thrown at the call site and
    /// is catchable by sandboxed code.
    pub fn reject(&self, exception: Exception) {
        let mut slot = self.slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(AsyncOutcome::Rejected(exception));
        }
    }
}

/// Promotes a host value into the interpreter's object graph.
pub(crate) fn native_to_pseudo(heap: &mut Heap, realm: &Realm, value: &HostValue) -> RunResult<Value> {
    Ok(match value {
        HostValue::Undefined => Value::Undefined,
        HostValue::Null => Value::Null,
        HostValue::Boolean(b) => Value::Boolean(*b),
        HostValue::Number(n) => Value::Number(*n),
        HostValue::String(s) => Value::string(s),
        HostValue::Array(elements) => {
            let id = heap.alloc(JsObject::new(ObjKind::Array { length: 0 }, Some(realm.array)))?;
            for element in elements {
                let element = native_to_pseudo(heap, realm, element)?;
                heap.array_push(id, element);
            }
            Value::Object(id)
        }
        HostValue::Map(entries) => {
            let id = heap.alloc(JsObject::new(ObjKind::Plain, Some(realm.object)))?;
            for (key, entry) in entries {
                let entry = native_to_pseudo(heap, realm, entry)?;
                heap.insert_data_prop(id, key, entry);
            }
            Value::Object(id)
        }
    })
}

/// Extracts a host value from the interpreter's object graph.
///
/// Functions are not convertible, and circular structures are rejected
/// rather than recursed into.
pub(crate) fn pseudo_to_native(heap: &Heap, value: &Value) -> Result<HostValue, Exception> {
    let mut visiting = Vec::new();
    convert_out(heap, value, &mut visiting)
}

fn convert_out(heap: &Heap, value: &Value, visiting: &mut Vec<ObjId>) -> Result<HostValue, Exception> {
    Ok(match value {
        Value::Undefined => HostValue::Undefined,
        Value::Null => HostValue::Null,
        Value::Boolean(b) => HostValue::Boolean(*b),
        Value::Number(n) => HostValue::Number(*n),
        Value::String(s) => HostValue::String(s.to_string()),
        Value::Object(id) => {
            if visiting.contains(id) {
                return Err(Exception::type_error("Converting circular structure to native value"));
            }
            visiting.push(*id);
            let out = match &heap.get(*id).kind {
                ObjKind::Function(_) => {
                    return Err(Exception::type_error("Cannot convert a function to a native value"));
                }
                ObjKind::BoxedNumber(n) => HostValue::Number(*n),
                ObjKind::BoxedBoolean(b) => HostValue::Boolean(*b),
                ObjKind::BoxedString(s) => HostValue::String(s.to_string()),
                ObjKind::Date(ms) => HostValue::Number(*ms),
                ObjKind::Regexp(data) => HostValue::String(format!("/{}/{}", data.source, data.flags)),
                ObjKind::Array { length } => {
                    let mut elements = Vec::with_capacity(*length as usize);
                    for index in 0..*length {
                        let element = heap.array_get(*id, index);
                        elements.push(convert_out(heap, &element, visiting)?);
                    }
                    HostValue::Array(elements)
                }
                ObjKind::Plain | ObjKind::Scope(_) => {
                    let keys = heap.own_enumerable_keys(*id);
                    let mut entries = Vec::with_capacity(keys.len());
                    for key in keys {
                        let prop = &heap.get(*id).props[key.as_ref()];
                        if prop.is_accessor() {
                            continue;
                        }
                        let converted = convert_out(heap, &prop.value.clone(), visiting)?;
                        entries.push((key.to_string(), converted));
                    }
                    HostValue::Map(entries)
                }
            };
            visiting.pop();
            out
        }
    })
}
