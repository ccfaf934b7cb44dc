//! The `RegExp` constructor and prototype. Pattern semantics are delegated
//! to the host engine (regress); this module owns flag validation, the
//! `lastIndex` protocol and result-array construction.

use std::{ops::Range, rc::Rc};

use regress::Regex;

use crate::{
    builtins::{arg, called_as_new, define_method, new_ctor},
    error::{Exception, RunError, RunResult},
    heap::{ObjId, ObjKind, Property, RegexpData},
    interp::Interpreter,
    value::{Value, utf16_len},
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let (ctor, proto) = new_ctor(interp, "RegExp", regexp_ctor)?;
    interp.realm.regexp = ctor;

    define_method(interp, proto, "test", proto_test)?;
    define_method(interp, proto, "exec", proto_exec)?;
    define_method(interp, proto, "toString", proto_to_string)?;
    Ok(())
}

/// A compiled pattern detached from the heap, usable by string methods.
#[derive(Clone)]
pub(crate) struct CompiledRegexp {
    pub matcher: Rc<Regex>,
    pub source: Rc<str>,
    pub flags: Rc<str>,
    pub global: bool,
}

/// One match as byte offsets into the subject.
pub(crate) struct FoundMatch {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Option<Range<usize>>>,
}

/// Compiles a pattern, validating the flag string.
pub(crate) fn compile(source: &str, flags: &str) -> RunResult<CompiledRegexp> {
    let mut seen = Vec::new();
    for flag in flags.chars() {
        if !matches!(flag, 'g' | 'i' | 'm') || seen.contains(&flag) {
            return Err(RunError::syntax_error(format!(
                "Invalid flags supplied to RegExp constructor '{flags}'"
            )));
        }
        seen.push(flag);
    }
    let matcher = Regex::with_flags(source, flags)
        .map_err(|err| RunError::syntax_error(format!("Invalid regular expression: {err}")))?;
    Ok(CompiledRegexp {
        matcher: Rc::new(matcher),
        source: Rc::from(source),
        flags: Rc::from(flags),
        global: flags.contains('g'),
    })
}

/// Allocates a regexp object for a compiled pattern.
fn alloc_regexp(interp: &mut Interpreter, compiled: CompiledRegexp) -> RunResult<ObjId> {
    let id = interp.heap.alloc(crate::heap::JsObject::new(
        ObjKind::Regexp(Box::new(RegexpData {
            source: Rc::clone(&compiled.source),
            flags: Rc::clone(&compiled.flags),
            matcher: Rc::clone(&compiled.matcher),
        })),
        Some(interp.realm.regexp),
    ))?;
    install_instance_props(interp, id, &compiled);
    Ok(id)
}

fn install_instance_props(interp: &mut Interpreter, id: ObjId, compiled: &CompiledRegexp) {
    let props = [
        ("source", Value::String(Rc::clone(&compiled.source))),
        ("global", Value::Boolean(compiled.global)),
        ("ignoreCase", Value::Boolean(compiled.flags.contains('i'))),
        ("multiline", Value::Boolean(compiled.flags.contains('m'))),
    ];
    for (name, value) in props {
        interp.heap.get_mut(id).props.insert(Rc::from(name), Property::frozen(value));
    }
    interp.heap.get_mut(id).props.insert(
        Rc::from("lastIndex"),
        Property {
            value: Value::Number(0.0),
            getter: None,
            setter: None,
            writable: true,
            enumerable: false,
            configurable: false,
        },
    );
}

/// Used by regex literals in the evaluator.
pub(crate) fn create_regexp(interp: &mut Interpreter, pattern: &str, flags: &str) -> RunResult<Value> {
    let compiled = compile(pattern, flags)?;
    Ok(Value::Object(alloc_regexp(interp, compiled)?))
}

/// Views a value as a regexp object, if it is one.
pub(crate) fn as_regexp(interp: &Interpreter, value: &Value) -> Option<CompiledRegexp> {
    let id = value.as_object()?;
    match &interp.heap.get(id).kind {
        ObjKind::Regexp(data) => Some(CompiledRegexp {
            matcher: Rc::clone(&data.matcher),
            source: Rc::clone(&data.source),
            flags: Rc::clone(&data.flags),
            global: data.is_global(),
        }),
        _ => None,
    }
}

/// First match at or after byte offset `from`.
pub(crate) fn find_at(compiled: &CompiledRegexp, subject: &str, from: usize) -> Option<FoundMatch> {
    if from > subject.len() {
        return None;
    }
    let found = compiled.matcher.find_from(subject, from).next()?;
    Some(FoundMatch {
        start: found.range.start,
        end: found.range.end,
        captures: found.captures.clone(),
    })
}

/// Builds the `exec`-style result array for a single match, or `null`.
pub(crate) fn exec_once(
    interp: &mut Interpreter,
    compiled: &CompiledRegexp,
    subject: &str,
    from: usize,
) -> Result<Value, Exception> {
    let Some(found) = find_at(compiled, subject, from) else {
        return Ok(Value::Null);
    };
    let result = interp.create_array()?;
    let id = result.as_object().expect("fresh array");
    interp
        .heap
        .array_push(id, Value::string(&subject[found.start..found.end]));
    for capture in &found.captures {
        let value = capture
            .clone()
            .map_or(Value::Undefined, |range| Value::string(&subject[range]));
        interp.heap.array_push(id, value);
    }
    let index = utf16_len(&subject[..found.start]);
    interp.heap.insert_data_prop(id, "index", Value::Number(index as f64));
    interp.heap.insert_data_prop(id, "input", Value::string(subject));
    Ok(result)
}

/// Byte offset of a UTF-16 index into `subject` (clamped to the end).
fn byte_offset_of_utf16(subject: &str, utf16_index: usize) -> usize {
    let mut units = 0usize;
    for (byte_index, c) in subject.char_indices() {
        if units >= utf16_index {
            return byte_index;
        }
        units += c.len_utf16();
    }
    subject.len()
}

fn regexp_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let pattern_arg = arg(args, 0);
    let (source, inherited_flags) = match as_regexp(interp, &pattern_arg) {
        Some(existing) => (existing.source, Some(existing.flags)),
        None => match &pattern_arg {
            Value::Undefined => (Rc::from(""), None),
            other => (other.to_js_string(&interp.heap), None),
        },
    };
    let flags = match arg(args, 1) {
        Value::Undefined => inherited_flags.unwrap_or_else(|| Rc::from("")),
        other => other.to_js_string(&interp.heap),
    };
    let compiled = compile(&source, &flags).map_err(|err| interp.run_error_to_exception(err, None))?;
    if called_as_new(interp, &this, interp.realm.regexp) {
        let id = this.as_object().expect("constructor receiver");
        interp.heap.get_mut(id).kind = ObjKind::Regexp(Box::new(RegexpData {
            source: Rc::clone(&compiled.source),
            flags: Rc::clone(&compiled.flags),
            matcher: Rc::clone(&compiled.matcher),
        }));
        install_instance_props(interp, id, &compiled);
        Ok(this)
    } else {
        let id = alloc_regexp(interp, compiled).map_err(|err| interp.run_error_to_exception(err, None))?;
        Ok(Value::Object(id))
    }
}

fn this_regexp(interp: &Interpreter, this: &Value) -> Result<(ObjId, CompiledRegexp), Exception> {
    let compiled = as_regexp(interp, this).ok_or_else(|| Exception::type_error("receiver is not a regular expression"))?;
    Ok((this.as_object().expect("checked object"), compiled))
}

fn last_index(interp: &Interpreter, id: ObjId) -> usize {
    interp
        .heap
        .get(id)
        .props
        .get("lastIndex")
        .map_or(0.0, |prop| prop.value.to_number(&interp.heap))
        .max(0.0) as usize
}

fn set_last_index(interp: &mut Interpreter, id: ObjId, value: usize) {
    if let Some(prop) = interp.heap.get_mut(id).props.get_mut("lastIndex") {
        prop.value = Value::Number(value as f64);
    }
}

/// Runs one match honoring the `lastIndex` protocol of global patterns.
fn run_match(interp: &mut Interpreter, this: &Value, subject: &str) -> Result<Option<FoundMatch>, Exception> {
    let (id, compiled) = this_regexp(interp, this)?;
    let from = if compiled.global {
        byte_offset_of_utf16(subject, last_index(interp, id))
    } else {
        0
    };
    let found = find_at(&compiled, subject, from);
    if compiled.global {
        match &found {
            Some(found) => {
                let end = utf16_len(&subject[..found.end]);
                set_last_index(interp, id, end);
            }
            None => set_last_index(interp, id, 0),
        }
    }
    Ok(found)
}

fn proto_test(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let subject = arg(args, 0).to_js_string(&interp.heap);
    Ok(Value::Boolean(run_match(interp, &this, &subject)?.is_some()))
}

fn proto_exec(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let subject = arg(args, 0).to_js_string(&interp.heap);
    let (_, compiled) = this_regexp(interp, &this)?;
    match run_match(interp, &this, &subject)? {
        None => Ok(Value::Null),
        Some(found) => exec_once(interp, &compiled, &subject, found.start),
    }
}

fn proto_to_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let (_, compiled) = this_regexp(interp, &this)?;
    Ok(Value::string(&format!("/{}/{}", compiled.source, compiled.flags)))
}
