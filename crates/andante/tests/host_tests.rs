//! Tests for the host bridge: value conversion, native injection, the
//! observable constructor graph, resource limits and tracing.

use std::{cell::RefCell, rc::Rc};

use andante::{
    ErrorKind, HostValue, Interpreter, LimitedTracker, NoopTracer, RecordingTracer, TraceEvent, Value,
};
use pretty_assertions::assert_eq;

// =============================================================================
// 1. Value conversion
// =============================================================================

/// `pseudo_to_native(native_to_pseudo(x))` deep-equals `x` for JSON-style
/// values.
#[test]
fn conversion_round_trips() {
    let mut interp = Interpreter::new(";").unwrap();
    let original = HostValue::Map(vec![
        ("num".to_owned(), HostValue::Number(1.5)),
        ("text".to_owned(), HostValue::String("hi".to_owned())),
        ("flag".to_owned(), HostValue::Boolean(true)),
        ("nothing".to_owned(), HostValue::Null),
        (
            "list".to_owned(),
            HostValue::Array(vec![HostValue::Number(1.0), HostValue::String("two".to_owned())]),
        ),
    ]);
    let pseudo = interp.native_to_pseudo(&original).unwrap();
    let round_tripped = interp.pseudo_to_native(&pseudo).unwrap();
    assert_eq!(round_tripped, original);
}

#[test]
fn create_primitive_reuses_inline_variants() {
    let mut interp = Interpreter::new(";").unwrap();
    assert_eq!(interp.create_primitive(10.0), Value::Number(10.0));
    assert_eq!(interp.create_primitive(true), Value::Boolean(true));
    assert_eq!(interp.create_primitive("hi"), Value::string("hi"));
    assert_eq!(interp.create_primitive(HostValue::Null), Value::Null);
    assert_eq!(interp.create_primitive(HostValue::Undefined), Value::Undefined);
}

#[test]
fn functions_do_not_convert_to_host_values() {
    let mut interp = Interpreter::new("var f = function() {}; f;").unwrap();
    interp.run().unwrap();
    let value = interp.value();
    assert!(interp.pseudo_to_native(&value).is_err());
}

// =============================================================================
// 2. Host-injected values and functions
// =============================================================================

/// The host injects a value before the program runs.
#[test]
fn injected_values_are_visible_as_globals() {
    let mut interp = Interpreter::with_init("x * 2;", |interp, global| {
        let x = interp.create_primitive(21.0);
        interp.set_property(&global, "x", x).unwrap();
    })
    .unwrap();
    interp.run().unwrap();
    assert_eq!(interp.value(), Value::Number(42.0));
}

/// A host-injected native returning `create_primitive(10)` is callable and
/// yields the number.
#[test]
fn injected_natives_are_callable() {
    let mut interp = Interpreter::with_init("boundFunction();", |interp, global| {
        let func = interp
            .create_native_function(|interp, _this, _args| Ok(interp.create_primitive(10.0)))
            .unwrap();
        interp.set_property(&global, "boundFunction", func).unwrap();
    })
    .unwrap();
    interp.run().unwrap();
    assert_eq!(interp.value(), Value::Number(10.0));
}

#[test]
fn natives_receive_arguments_and_this() {
    let mut interp = Interpreter::with_init("var o = { m: probe }; o.m('x', 2);", |interp, global| {
        let func = interp
            .create_native_function(|interp, this, args| {
                let receiver_is_object = this.is_object();
                let rendered = format!(
                    "{}:{}:{}",
                    receiver_is_object,
                    args.len(),
                    interp.pseudo_to_native(&args[0]).map(|_| "ok").unwrap_or("err"),
                );
                Ok(Value::string(&rendered))
            })
            .unwrap();
        interp.set_property(&global, "probe", func).unwrap();
    })
    .unwrap();
    interp.run().unwrap();
    assert_eq!(interp.value(), Value::string("true:2:ok"));
}

/// A native error becomes an interpreter-level throw catchable by the
/// sandboxed code.
#[test]
fn native_errors_are_catchable_in_sandbox() {
    let source = "var m; try { failing(); } catch (e) { m = e.name + ':' + e.message; } m;";
    let mut interp = Interpreter::with_init(source, |interp, global| {
        let func = interp
            .create_native_function(|_interp, _this, _args| {
                Err(andante::Exception::type_error("host says no"))
            })
            .unwrap();
        interp.set_property(&global, "failing", func).unwrap();
    })
    .unwrap();
    interp.run().unwrap();
    assert_eq!(interp.value(), Value::string("TypeError:host says no"));
}

#[test]
fn get_property_reads_program_results() {
    let mut interp = Interpreter::new("var out = { answer: 42 };").unwrap();
    interp.run().unwrap();
    let global = interp.global();
    let out = interp.get_property(&global, "out").unwrap();
    assert_eq!(interp.get_property(&out, "answer").unwrap(), Value::Number(42.0));
    assert_eq!(interp.get_property(&out, "missing").unwrap(), Value::Undefined);
}

#[test]
fn define_property_from_host_respects_attributes() {
    let mut interp = Interpreter::new("Object.keys(this).indexOf('hidden');").unwrap();
    let global = interp.global();
    interp
        .define_property(&global, "hidden", Value::Number(1.0), false, false, false)
        .unwrap();
    interp.run().unwrap();
    assert_eq!(interp.value(), Value::Number(-1.0));
}

// =============================================================================
// 3. The observable constructor graph
// =============================================================================

/// An error caught by the sandbox carries the `Error` constructor as its
/// parent, observable from the host.
#[test]
fn caught_error_objects_have_the_error_constructor() {
    let mut interp = Interpreter::new("var error; try { throw new Error('x'); } catch (e) { error = e; } error;").unwrap();
    interp.run().unwrap();
    let error = interp.value();
    let global = interp.global();
    let error_ctor = interp.get_property(&global, "Error").unwrap();
    assert_eq!(interp.constructor_of(&error), Some(error_ctor));
    assert_eq!(interp.get_property(&error, "message").unwrap(), Value::string("x"));
}

#[test]
fn primitive_constructors_govern_method_dispatch() {
    let mut interp = Interpreter::new("1;").unwrap();
    let global = interp.global();
    let number_ctor = interp.get_property(&global, "Number").unwrap();
    assert_eq!(interp.constructor_of(&Value::Number(1.0)), Some(number_ctor));
    assert_eq!(interp.constructor_of(&Value::Null), None);
}

// =============================================================================
// 4. Resource limits and tracing
// =============================================================================

#[test]
fn step_limit_stops_infinite_loops() {
    let mut interp = Interpreter::with_tracker("while (true) {}", LimitedTracker::max_steps(5_000)).unwrap();
    let err = interp.run().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Error);
    assert!(err.message.contains("step limit"), "got: {err}");
}

/// Resource errors are not catchable by sandboxed code.
#[test]
fn step_limit_bypasses_try_catch() {
    let source = "try { while (true) {} } catch (e) { 'caught'; }";
    let mut interp = Interpreter::with_tracker(source, LimitedTracker::max_steps(5_000)).unwrap();
    assert!(interp.run().is_err());
}

#[test]
fn object_limit_stops_allocation_storms() {
    let source = "var all = []; while (true) { all.push({}); }";
    let mut interp = Interpreter::with_tracker(source, LimitedTracker::new(None, Some(2_000), None)).unwrap();
    let err = interp.run().unwrap_err();
    assert!(err.message.contains("object limit"), "got: {err}");
}

#[test]
fn recording_tracer_sees_calls_and_steps() {
    let mut interp = Interpreter::new("function f() { return 1; } f();").unwrap();
    let tracer = Rc::new(RefCell::new(RecordingTracer::new()));
    interp.set_tracer(Rc::clone(&tracer) as Rc<RefCell<dyn andante::StepTracer>>);
    interp.run().unwrap();
    let events = tracer.borrow().events().to_vec();
    assert!(!events.is_empty());
    assert!(events.iter().any(|event| matches!(event, TraceEvent::Call { .. })));
    assert!(events.iter().any(|event| matches!(event, TraceEvent::Step { .. })));
}

#[test]
fn tracer_can_be_replaced() {
    let mut interp = Interpreter::new("1;").unwrap();
    interp.set_tracer(Rc::new(RefCell::new(NoopTracer)));
    interp.run().unwrap();
    assert_eq!(interp.value(), Value::Number(1.0));
}
