//! The `String` constructor and `String.prototype`.
//!
//! Methods operate on UTF-16 code units, matching the source dialect's view
//! of strings; case conversion and ordering delegate to the host.

use std::rc::Rc;

use crate::{
    builtins::{arg, called_as_new, define_method, new_ctor, regexp},
    error::{Exception, RunResult},
    heap::ObjKind,
    interp::Interpreter,
    value::{Value, utf16_len, utf16_unit_at},
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let (ctor, proto) = new_ctor(interp, "String", string_ctor)?;
    interp.realm.string = ctor;
    define_method(interp, ctor, "fromCharCode", string_from_char_code)?;

    define_method(interp, proto, "toString", proto_value_of)?;
    define_method(interp, proto, "valueOf", proto_value_of)?;
    define_method(interp, proto, "toLocaleString", proto_value_of)?;
    define_method(interp, proto, "charAt", proto_char_at)?;
    define_method(interp, proto, "charCodeAt", proto_char_code_at)?;
    define_method(interp, proto, "concat", proto_concat)?;
    define_method(interp, proto, "indexOf", proto_index_of)?;
    define_method(interp, proto, "lastIndexOf", proto_last_index_of)?;
    define_method(interp, proto, "localeCompare", proto_locale_compare)?;
    define_method(interp, proto, "slice", proto_slice)?;
    define_method(interp, proto, "substring", proto_substring)?;
    define_method(interp, proto, "substr", proto_substr)?;
    define_method(interp, proto, "split", proto_split)?;
    define_method(interp, proto, "trim", proto_trim)?;
    define_method(interp, proto, "toLowerCase", proto_to_lower_case)?;
    define_method(interp, proto, "toUpperCase", proto_to_upper_case)?;
    define_method(interp, proto, "toLocaleLowerCase", proto_to_lower_case)?;
    define_method(interp, proto, "toLocaleUpperCase", proto_to_upper_case)?;
    define_method(interp, proto, "replace", proto_replace)?;
    define_method(interp, proto, "match", proto_match)?;
    define_method(interp, proto, "search", proto_search)?;
    Ok(())
}

fn string_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let value = if args.is_empty() {
        Rc::from("")
    } else {
        arg(args, 0).to_js_string(&interp.heap)
    };
    if called_as_new(interp, &this, interp.realm.string) {
        let id = this.as_object().expect("constructor receiver");
        interp.heap.get_mut(id).kind = ObjKind::BoxedString(value);
        Ok(this)
    } else {
        Ok(Value::String(value))
    }
}

fn string_from_char_code(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let units: Vec<u16> = args
        .iter()
        .map(|code| crate::value::to_uint32(code.to_number(&interp.heap)) as u16)
        .collect();
    Ok(Value::string(&String::from_utf16_lossy(&units)))
}

/// ToString on the receiver; generic like the real prototype methods.
fn this_string(interp: &Interpreter, this: &Value) -> Rc<str> {
    this.to_js_string(&interp.heap)
}

fn units_of(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

/// Clamps a possibly negative relative index against `length`.
fn relative_index(value: &Value, length: usize, default: i64, heap: &crate::heap::Heap) -> usize {
    let raw = match value {
        Value::Undefined => default,
        other => {
            let n = other.to_number(heap);
            if n.is_nan() { 0 } else { n.trunc() as i64 }
        }
    };
    let length = length as i64;
    let resolved = if raw < 0 { (length + raw).max(0) } else { raw.min(length) };
    resolved as usize
}

fn proto_value_of(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    match &this {
        Value::String(s) => Ok(Value::String(Rc::clone(s))),
        Value::Object(id) => match &interp.heap.get(*id).kind {
            ObjKind::BoxedString(s) => Ok(Value::String(Rc::clone(s))),
            _ => Err(Exception::type_error("receiver is not a string")),
        },
        _ => Err(Exception::type_error("receiver is not a string")),
    }
}

/// ToInteger for index arguments: NaN becomes zero, fractions truncate.
fn to_integer_index(value: &Value, heap: &crate::heap::Heap) -> i64 {
    let n = value.to_number(heap);
    if n.is_nan() { 0 } else { n.trunc() as i64 }
}

fn proto_char_at(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    let index = to_integer_index(&arg(args, 0), &interp.heap);
    if index < 0 {
        return Ok(Value::string(""));
    }
    match crate::value::utf16_char_at(&s, index as usize) {
        Some(unit) => Ok(Value::String(unit)),
        None => Ok(Value::string("")),
    }
}

fn proto_char_code_at(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    let index = to_integer_index(&arg(args, 0), &interp.heap);
    if index < 0 {
        return Ok(Value::Number(f64::NAN));
    }
    match utf16_unit_at(&s, index as usize) {
        Some(unit) => Ok(Value::Number(f64::from(unit))),
        None => Ok(Value::Number(f64::NAN)),
    }
}

fn proto_concat(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let mut out = this_string(interp, &this).to_string();
    for part in args {
        out.push_str(&part.to_js_string(&interp.heap));
    }
    Ok(Value::string(&out))
}

fn proto_index_of(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let haystack = units_of(&this_string(interp, &this));
    let needle = units_of(&arg(args, 0).to_js_string(&interp.heap));
    let start = relative_index(&arg(args, 1), haystack.len(), 0, &interp.heap);
    if needle.is_empty() {
        return Ok(Value::Number(start.min(haystack.len()) as f64));
    }
    let found = haystack
        .windows(needle.len())
        .enumerate()
        .skip(start)
        .find(|(_, window)| *window == needle.as_slice())
        .map(|(index, _)| index);
    Ok(Value::Number(found.map_or(-1.0, |index| index as f64)))
}

fn proto_last_index_of(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let haystack = units_of(&this_string(interp, &this));
    let needle = units_of(&arg(args, 0).to_js_string(&interp.heap));
    if needle.is_empty() {
        return Ok(Value::Number(haystack.len() as f64));
    }
    if needle.len() > haystack.len() {
        return Ok(Value::Number(-1.0));
    }
    let found = haystack
        .windows(needle.len())
        .enumerate()
        .rev()
        .find(|(_, window)| *window == needle.as_slice())
        .map(|(index, _)| index);
    Ok(Value::Number(found.map_or(-1.0, |index| index as f64)))
}

fn proto_locale_compare(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let left = this_string(interp, &this);
    let right = arg(args, 0).to_js_string(&interp.heap);
    let ordering = left.cmp(&right);
    Ok(Value::Number(match ordering {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }))
}

fn proto_slice(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let units = units_of(&this_string(interp, &this));
    let start = relative_index(&arg(args, 0), units.len(), 0, &interp.heap);
    let end = relative_index(&arg(args, 1), units.len(), units.len() as i64, &interp.heap);
    let window = if start < end { &units[start..end] } else { &[] };
    Ok(Value::string(&from_units(window)))
}

fn proto_substring(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let units = units_of(&this_string(interp, &this));
    // substring clamps negatives to zero and swaps reversed bounds.
    let to_index = |value: &Value| -> usize {
        let n = value.to_number(&interp.heap);
        if n.is_nan() || n < 0.0 {
            0
        } else {
            (n.trunc() as usize).min(units.len())
        }
    };
    let a = to_index(&arg(args, 0));
    let b = match arg(args, 1) {
        Value::Undefined => units.len(),
        other => to_index(&other),
    };
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    Ok(Value::string(&from_units(&units[start..end])))
}

fn proto_substr(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let units = units_of(&this_string(interp, &this));
    let start = relative_index(&arg(args, 0), units.len(), 0, &interp.heap);
    let count = match arg(args, 1) {
        Value::Undefined => units.len() - start,
        other => {
            let n = other.to_number(&interp.heap);
            if n.is_nan() || n < 0.0 { 0 } else { (n.trunc() as usize).min(units.len() - start) }
        }
    };
    Ok(Value::string(&from_units(&units[start..start + count])))
}

fn proto_trim(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    Ok(Value::string(s.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')))
}

fn proto_to_lower_case(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    Ok(Value::string(&s.to_lowercase()))
}

fn proto_to_upper_case(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    Ok(Value::string(&s.to_uppercase()))
}

fn proto_split(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    let limit = match arg(args, 1) {
        Value::Undefined => usize::MAX,
        other => crate::value::to_uint32(other.to_number(&interp.heap)) as usize,
    };
    let mut parts: Vec<String> = Vec::new();
    match arg(args, 0) {
        Value::Undefined => parts.push(s.to_string()),
        separator => {
            if let Some(matcher) = regexp::as_regexp(interp, &separator) {
                let mut last = 0usize;
                let mut from = 0usize;
                while from <= s.len() {
                    match regexp::find_at(&matcher, &s, from) {
                        Some(found) if found.end > found.start => {
                            parts.push(s[last..found.start].to_string());
                            last = found.end;
                            from = found.end;
                        }
                        Some(found) => {
                            // Zero-width match: advance one unit to make
                            // progress.
                            from = found.end + 1;
                        }
                        None => break,
                    }
                }
                parts.push(s[last..].to_string());
            } else {
                let separator = separator.to_js_string(&interp.heap);
                if separator.is_empty() {
                    let units = units_of(&s);
                    parts.extend(units.iter().map(|unit| from_units(std::slice::from_ref(unit))));
                } else {
                    parts.extend(s.split(separator.as_ref()).map(str::to_owned));
                }
            }
        }
    }
    parts.truncate(limit);
    let result = interp.create_array()?;
    let id = result.as_object().expect("fresh array");
    for part in parts {
        interp.heap.array_push(id, Value::string(&part));
    }
    Ok(result)
}

/// Expands `$$`, `$&` and `$1`-`$9` in a replacement template.
fn expand_replacement(template: &str, whole: &str, captures: &[Option<String>]) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                out.push_str(whole);
            }
            Some(d) if d.is_ascii_digit() && *d != '0' => {
                let digit = d.to_digit(10).unwrap() as usize;
                chars.next();
                if let Some(Some(capture)) = captures.get(digit - 1) {
                    out.push_str(capture);
                }
            }
            _ => out.push('$'),
        }
    }
    out
}

fn proto_replace(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    let replacement = arg(args, 1).to_js_string(&interp.heap);
    let pattern = arg(args, 0);

    if let Some(matcher) = regexp::as_regexp(interp, &pattern) {
        let global = matcher.global;
        let mut out = String::new();
        let mut last = 0usize;
        let mut from = 0usize;
        while from <= s.len() {
            let Some(found) = regexp::find_at(&matcher, &s, from) else {
                break;
            };
            let whole = &s[found.start..found.end];
            let captures: Vec<Option<String>> = found
                .captures
                .iter()
                .map(|range| range.clone().map(|r| s[r].to_string()))
                .collect();
            out.push_str(&s[last..found.start]);
            out.push_str(&expand_replacement(&replacement, whole, &captures));
            last = found.end;
            from = if found.end > found.start { found.end } else { found.end + 1 };
            if !global {
                break;
            }
        }
        out.push_str(&s[last..]);
        return Ok(Value::string(&out));
    }

    let pattern = pattern.to_js_string(&interp.heap);
    let replaced = match s.find(pattern.as_ref()) {
        Some(start) => {
            let mut out = String::new();
            out.push_str(&s[..start]);
            out.push_str(&expand_replacement(&replacement, &pattern, &[]));
            out.push_str(&s[start + pattern.len()..]);
            out
        }
        None => s.to_string(),
    };
    Ok(Value::string(&replaced))
}

fn proto_match(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    let pattern = arg(args, 0);
    let matcher = match regexp::as_regexp(interp, &pattern) {
        Some(matcher) => matcher,
        None => {
            let source = pattern.to_js_string(&interp.heap);
            regexp::compile(&source, "").map_err(|err| interp.run_error_to_exception(err, None))?
        }
    };
    if !matcher.global {
        return regexp::exec_once(interp, &matcher, &s, 0);
    }
    // Global match: an array of all matched substrings, or null.
    let mut from = 0usize;
    let mut found_any = false;
    let result = interp.create_array()?;
    let id = result.as_object().expect("fresh array");
    while from <= s.len() {
        let Some(found) = regexp::find_at(&matcher, &s, from) else {
            break;
        };
        found_any = true;
        interp.heap.array_push(id, Value::string(&s[found.start..found.end]));
        from = if found.end > found.start { found.end } else { found.end + 1 };
    }
    if found_any { Ok(result) } else { Ok(Value::Null) }
}

fn proto_search(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let s = this_string(interp, &this);
    let pattern = arg(args, 0);
    let matcher = match regexp::as_regexp(interp, &pattern) {
        Some(matcher) => matcher,
        None => {
            let source = pattern.to_js_string(&interp.heap);
            regexp::compile(&source, "").map_err(|err| interp.run_error_to_exception(err, None))?
        }
    };
    match regexp::find_at(&matcher, &s, 0) {
        Some(found) => {
            let index = utf16_len(&s[..found.start]);
            Ok(Value::Number(index as f64))
        }
        None => Ok(Value::Number(-1.0)),
    }
}
