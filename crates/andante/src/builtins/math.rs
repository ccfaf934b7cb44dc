//! The `Math` namespace object.

use rand::Rng;

use crate::{
    builtins::{arg, bind_global, define_frozen, define_method},
    error::{Exception, RunResult},
    heap::{JsObject, ObjId, ObjKind},
    interp::Interpreter,
    value::Value,
};

pub(super) fn install(interp: &mut Interpreter) -> RunResult<()> {
    let object = interp.realm.object;
    let math = interp.heap.alloc(JsObject::new(ObjKind::Plain, Some(object)))?;
    bind_global(interp, "Math", Value::Object(math));

    define_frozen(interp, math, "E", Value::Number(std::f64::consts::E));
    define_frozen(interp, math, "LN2", Value::Number(std::f64::consts::LN_2));
    define_frozen(interp, math, "LN10", Value::Number(std::f64::consts::LN_10));
    define_frozen(interp, math, "LOG2E", Value::Number(std::f64::consts::LOG2_E));
    define_frozen(interp, math, "LOG10E", Value::Number(std::f64::consts::LOG10_E));
    define_frozen(interp, math, "PI", Value::Number(std::f64::consts::PI));
    define_frozen(interp, math, "SQRT1_2", Value::Number(std::f64::consts::FRAC_1_SQRT_2));
    define_frozen(interp, math, "SQRT2", Value::Number(std::f64::consts::SQRT_2));

    unary(interp, math, "abs", f64::abs)?;
    unary(interp, math, "acos", f64::acos)?;
    unary(interp, math, "asin", f64::asin)?;
    unary(interp, math, "atan", f64::atan)?;
    unary(interp, math, "ceil", f64::ceil)?;
    unary(interp, math, "cos", f64::cos)?;
    unary(interp, math, "exp", f64::exp)?;
    unary(interp, math, "floor", f64::floor)?;
    unary(interp, math, "log", f64::ln)?;
    unary(interp, math, "sin", f64::sin)?;
    unary(interp, math, "sqrt", f64::sqrt)?;
    unary(interp, math, "tan", f64::tan)?;
    // Math.round rounds halves toward positive infinity, unlike f64::round.
    unary(interp, math, "round", |n| (n + 0.5).floor())?;

    define_method(interp, math, "atan2", math_atan2)?;
    define_method(interp, math, "pow", math_pow)?;
    define_method(interp, math, "max", math_max)?;
    define_method(interp, math, "min", math_min)?;
    define_method(interp, math, "random", math_random)?;
    Ok(())
}

fn unary(interp: &mut Interpreter, math: ObjId, name: &str, f: impl Fn(f64) -> f64 + 'static) -> RunResult<()> {
    define_method(interp, math, name, move |i, _, args| {
        Ok(Value::Number(f(arg(args, 0).to_number(&i.heap))))
    })
}

fn math_atan2(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let y = arg(args, 0).to_number(&interp.heap);
    let x = arg(args, 1).to_number(&interp.heap);
    Ok(Value::Number(y.atan2(x)))
}

fn math_pow(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let base = arg(args, 0).to_number(&interp.heap);
    let exponent = arg(args, 1).to_number(&interp.heap);
    // powf(NaN, 0) is 1 in Rust and in the dialect, so plain powf matches.
    Ok(Value::Number(base.powf(exponent)))
}

fn math_max(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let mut best = f64::NEG_INFINITY;
    for value in args {
        let n = value.to_number(&interp.heap);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if n > best {
            best = n;
        }
    }
    Ok(Value::Number(best))
}

fn math_min(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Exception> {
    let mut best = f64::INFINITY;
    for value in args {
        let n = value.to_number(&interp.heap);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if n < best {
            best = n;
        }
    }
    Ok(Value::Number(best))
}

fn math_random(_interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Result<Value, Exception> {
    Ok(Value::Number(rand::thread_rng().gen_range(0.0..1.0)))
}
