//! The `Number` constructor, its constants and `Number.prototype`.

use crate::{
    builtins::{arg, called_as_new, define_frozen, define_method, new_ctor},
    error::{Exception, RunResult},
    heap::ObjKind,
    interp::Interpreter,
    value::{Value, number_to_string, number_to_string_radix},
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let (ctor, proto) = new_ctor(interp, "Number", number_ctor)?;
    interp.realm.number = ctor;

    define_frozen(interp, ctor, "MAX_VALUE", Value::Number(f64::MAX));
    define_frozen(interp, ctor, "MIN_VALUE", Value::Number(5e-324));
    define_frozen(interp, ctor, "NaN", Value::Number(f64::NAN));
    define_frozen(interp, ctor, "NEGATIVE_INFINITY", Value::Number(f64::NEG_INFINITY));
    define_frozen(interp, ctor, "POSITIVE_INFINITY", Value::Number(f64::INFINITY));

    define_method(interp, proto, "toString", proto_to_string)?;
    define_method(interp, proto, "toLocaleString", proto_to_locale_string)?;
    define_method(interp, proto, "valueOf", proto_value_of)?;
    define_method(interp, proto, "toFixed", proto_to_fixed)?;
    define_method(interp, proto, "toExponential", proto_to_exponential)?;
    define_method(interp, proto, "toPrecision", proto_to_precision)?;
    Ok(())
}

fn number_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let value = if args.is_empty() { 0.0 } else { arg(args, 0).to_number(&interp.heap) };
    if called_as_new(interp, &this, interp.realm.number) {
        let id = this.as_object().expect("constructor receiver");
        interp.heap.get_mut(id).kind = ObjKind::BoxedNumber(value);
        Ok(this)
    } else {
        Ok(Value::Number(value))
    }
}

fn this_number(interp: &Interpreter, this: &Value) -> Result<f64, Exception> {
    match this {
        Value::Number(n) => Ok(*n),
        Value::Object(id) => match interp.heap.get(*id).kind {
            ObjKind::BoxedNumber(n) => Ok(n),
            _ => Err(Exception::type_error("receiver is not a number")),
        },
        _ => Err(Exception::type_error("receiver is not a number")),
    }
}

fn digit_count(args: &[Value], heap: &crate::heap::Heap, max: u32) -> Result<Option<u32>, Exception> {
    match arg(args, 0) {
        Value::Undefined => Ok(None),
        other => {
            let n = other.to_number(heap);
            if n.is_nan() || n < 0.0 || n > f64::from(max) {
                return Err(Exception::range_error("digit count out of range"));
            }
            Ok(Some(n as u32))
        }
    }
}

fn proto_to_string(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let n = this_number(interp, &this)?;
    match arg(args, 0) {
        Value::Undefined => Ok(Value::string(&number_to_string(n))),
        radix => {
            let radix = radix.to_number(&interp.heap);
            if !(2.0..=36.0).contains(&radix) || radix.fract() != 0.0 {
                return Err(Exception::range_error("toString() radix must be between 2 and 36"));
            }
            if radix == 10.0 {
                Ok(Value::string(&number_to_string(n)))
            } else {
                Ok(Value::string(&number_to_string_radix(n, radix as u32)))
            }
        }
    }
}

fn proto_to_locale_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    let n = this_number(interp, &this)?;
    Ok(Value::string(&number_to_string(n)))
}

fn proto_value_of(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Number(this_number(interp, &this)?))
}

fn proto_to_fixed(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let n = this_number(interp, &this)?;
    let digits = digit_count(args, &interp.heap, 100)?.unwrap_or(0);
    if !n.is_finite() {
        return Ok(Value::string(&number_to_string(n)));
    }
    Ok(Value::string(&format!("{n:.prec$}", prec = digits as usize)))
}

/// Rewrites Rust's `1.5e2` exponent form into the `1.5e+2` shape the source
/// dialect prints.
fn js_exponent_form(formatted: &str) -> String {
    match formatted.find(['e', 'E']) {
        Some(pos) if !formatted[pos + 1..].starts_with(['+', '-']) => {
            let mut out = String::with_capacity(formatted.len() + 1);
            out.push_str(&formatted[..pos]);
            out.push_str("e+");
            out.push_str(&formatted[pos + 1..]);
            out
        }
        _ => formatted.replace('E', "e"),
    }
}

fn proto_to_exponential(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let n = this_number(interp, &this)?;
    if !n.is_finite() {
        return Ok(Value::string(&number_to_string(n)));
    }
    let rendered = match digit_count(args, &interp.heap, 100)? {
        Some(digits) => format!("{n:.prec$e}", prec = digits as usize),
        None => format!("{n:e}"),
    };
    Ok(Value::string(&js_exponent_form(&rendered)))
}

fn proto_to_precision(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Exception> {
    let n = this_number(interp, &this)?;
    let Some(precision) = digit_count(args, &interp.heap, 100)? else {
        return Ok(Value::string(&number_to_string(n)));
    };
    if precision == 0 {
        return Err(Exception::range_error("toPrecision() argument must be between 1 and 100"));
    }
    if !n.is_finite() || n == 0.0 {
        return Ok(Value::string(&number_to_string(n)));
    }
    let exponent = n.abs().log10().floor() as i32;
    let rendered = if exponent < -6 || exponent >= precision as i32 {
        js_exponent_form(&format!("{n:.prec$e}", prec = (precision - 1) as usize))
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        format!("{n:.decimals$}")
    };
    Ok(Value::string(&rendered))
}
