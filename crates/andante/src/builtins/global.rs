//! Global functions and constants: `NaN`, `Infinity`, `undefined`, the
//! numeric parsers, URI coding and the `eval` marker.

use std::rc::Rc;

use crate::{
    builtins::{arg, bind_global, define_method},
    error::{Exception, RunResult},
    heap::{FnBody, FnData, JsObject, ObjKind, Property},
    interp::Interpreter,
    value::{Value, parse_float_prefix},
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let global = interp.realm.global;
    for (name, value) in [
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
        ("undefined", Value::Undefined),
    ] {
        interp.heap.get_mut(global).props.insert(Rc::from(name), Property::frozen(value));
    }

    define_method(interp, global, "isNaN", global_is_nan)?;
    define_method(interp, global, "isFinite", global_is_finite)?;
    define_method(interp, global, "parseFloat", global_parse_float)?;
    define_method(interp, global, "parseInt", global_parse_int)?;
    define_method(interp, global, "encodeURI", |i, t, a| uri_encode(i, t, a, false))?;
    define_method(interp, global, "encodeURIComponent", |i, t, a| uri_encode(i, t, a, true))?;
    define_method(interp, global, "decodeURI", uri_decode)?;
    define_method(interp, global, "decodeURIComponent", uri_decode)?;

    // The eval marker: recognized and dispatched by the call machinery.
    let eval = interp.heap.alloc(JsObject::new(
        ObjKind::Function(Box::new(FnData { body: FnBody::Eval })),
        Some(interp.realm.function),
    ))?;
    bind_global(interp, "eval", Value::Object(eval));
    Ok(())
}

fn global_is_nan(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Boolean(arg(args, 0).to_number(&interp.heap).is_nan()))
}

fn global_is_finite(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Boolean(arg(args, 0).to_number(&interp.heap).is_finite()))
}

fn global_parse_float(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let text = arg(args, 0).to_js_string(&interp.heap);
    Ok(Value::Number(parse_float_prefix(&text)))
}

fn global_parse_int(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let text = arg(args, 0).to_js_string(&interp.heap);
    let radix_arg = arg(args, 1).to_number(&interp.heap);
    let mut rest = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    let mut sign = 1.0;
    if let Some(stripped) = rest.strip_prefix('-') {
        sign = -1.0;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }
    let mut radix = if radix_arg.is_nan() || radix_arg == 0.0 {
        10
    } else {
        let r = radix_arg.trunc() as i64;
        if !(2..=36).contains(&r) {
            return Ok(Value::Number(f64::NAN));
        }
        r as u32
    };
    if (radix == 16 || radix_arg == 0.0 || radix_arg.is_nan())
        && let Some(stripped) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X"))
    {
        rest = stripped;
        radix = 16;
    }
    let digits: String = rest.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let mut result = 0.0f64;
    for c in digits.chars() {
        result = result * f64::from(radix) + f64::from(c.to_digit(radix).expect("checked digit"));
    }
    Ok(Value::Number(sign * result))
}

/// Characters left intact by `encodeURIComponent`.
fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()".contains(c)
}

/// Additional characters `encodeURI` keeps.
fn is_uri_reserved(c: char) -> bool {
    ";/?:@&=+$,#".contains(c)
}

fn uri_encode(interp: &mut Interpreter, _this: Value, args: &[Value], component: bool) -> Result<Value, Exception> {
    let text = arg(args, 0).to_js_string(&interp.heap);
    let mut out = String::new();
    for c in text.chars() {
        if is_unreserved(c) || (!component && is_uri_reserved(c)) {
            out.push(c);
        } else {
            let mut buffer = [0u8; 4];
            for byte in c.encode_utf8(&mut buffer).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    Ok(Value::string(&out))
}

fn uri_decode(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let text = arg(args, 0).to_js_string(&interp.heap);
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = bytes
                .get(index + 1..index + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            match hex {
                Some(byte) => {
                    out.push(byte);
                    index += 3;
                }
                None => return Err(Exception::new(crate::ErrorKind::URIError, "URI malformed")),
            }
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    match String::from_utf8(out) {
        Ok(decoded) => Ok(Value::string(&decoded)),
        Err(_) => Err(Exception::new(crate::ErrorKind::URIError, "URI malformed")),
    }
}
