//! End-to-end tests for the core evaluator: values, scopes, control flow,
//! unwinding, `eval` and the stepping protocol.

use andante::{ErrorKind, Interpreter, Value};
use pretty_assertions::assert_eq;

/// Runs a program to completion and returns the last top-level expression
/// value.
fn eval_program(source: &str) -> Value {
    let mut interp = Interpreter::new(source).expect("program should parse");
    let paused = interp.run().expect("program should not throw");
    assert!(!paused, "program should not pause");
    interp.value()
}

fn eval_number(source: &str) -> f64 {
    match eval_program(source) {
        Value::Number(n) => n,
        other => panic!("expected a number, got {other:?}"),
    }
}

fn eval_string(source: &str) -> String {
    match eval_program(source) {
        Value::String(s) => s.to_string(),
        other => panic!("expected a string, got {other:?}"),
    }
}

fn eval_error(source: &str) -> andante::Exception {
    let mut interp = Interpreter::new(source).expect("program should parse");
    interp.run().expect_err("program should raise")
}

// =============================================================================
// 1. Values and conversions
// =============================================================================

/// A bare `null` leaves the null value in the observable register.
#[test]
fn null_literal() {
    assert_eq!(eval_program("null"), Value::Null);
}

#[test]
fn nan_is_itself() {
    match eval_program("NaN") {
        Value::Number(n) => assert!(n.is_nan()),
        other => panic!("expected NaN, got {other:?}"),
    }
}

#[test]
fn is_nan_and_is_finite() {
    assert_eq!(eval_program("isNaN(NaN)"), Value::Boolean(true));
    assert_eq!(eval_program("isNaN(null)"), Value::Boolean(false));
    assert_eq!(eval_program("isFinite(Infinity)"), Value::Boolean(false));
    assert_eq!(eval_program("isFinite(1)"), Value::Boolean(true));
}

#[test]
fn arithmetic_and_string_promotion() {
    assert_eq!(eval_number("1 + 2 * 3"), 7.0);
    assert_eq!(eval_string("1 + '2'"), "12");
    assert_eq!(eval_number("'6' * '7'"), 42.0);
    assert_eq!(eval_number("10 % 3"), 1.0);
}

#[test]
fn equality_operators() {
    assert_eq!(eval_program("'5' == 5"), Value::Boolean(true));
    assert_eq!(eval_program("'5' === 5"), Value::Boolean(false));
    assert_eq!(eval_program("null == undefined"), Value::Boolean(true));
    assert_eq!(eval_program("null === undefined"), Value::Boolean(false));
    assert_eq!(eval_program("NaN == NaN"), Value::Boolean(false));
}

#[test]
fn bit_operations_wrap_to_int32() {
    assert_eq!(eval_number("-1 >>> 0"), 4_294_967_295.0);
    assert_eq!(eval_number("5 & 3"), 1.0);
    assert_eq!(eval_number("1 << 31"), -2_147_483_648.0);
    assert_eq!(eval_number("~0"), -1.0);
}

#[test]
fn typeof_operator() {
    assert_eq!(eval_string("typeof 1"), "number");
    assert_eq!(eval_string("typeof 'x'"), "string");
    assert_eq!(eval_string("typeof undefined"), "undefined");
    assert_eq!(eval_string("typeof null"), "object");
    assert_eq!(eval_string("typeof {}"), "object");
    assert_eq!(eval_string("typeof function() {}"), "function");
    // A bare unbound name reads as "undefined" instead of throwing.
    assert_eq!(eval_string("typeof missing"), "undefined");
}

// =============================================================================
// 2. Scopes, hoisting and strict mode
// =============================================================================

#[test]
fn unbound_read_throws_reference_error() {
    let err = eval_error("missing;");
    assert_eq!(err.kind, ErrorKind::ReferenceError);
}

/// A sloppy-mode write to an unbound name installs a global binding.
#[test]
fn sloppy_write_installs_global() {
    assert_eq!(eval_number("function f() { leak = 41; } f(); leak + 1;"), 42.0);
}

#[test]
fn strict_write_to_unbound_name_throws() {
    let err = eval_error("'use strict';\nleak = 1;");
    assert_eq!(err.kind, ErrorKind::ReferenceError);
}

#[test]
fn var_hoisting_makes_names_visible_before_declaration() {
    assert_eq!(eval_string("typeof later; var later = 1;"), "undefined");
}

#[test]
fn function_declarations_hoist_with_their_bodies() {
    assert_eq!(eval_number("var r = f(); function f() { return 8; } r;"), 8.0);
}

#[test]
fn closures_capture_their_defining_scope() {
    let source = "
        function counter() {
            var n = 0;
            return function() { n = n + 1; return n; };
        }
        var tick = counter();
        tick(); tick(); tick();
    ";
    assert_eq!(eval_number(source), 3.0);
}

#[test]
fn named_function_expressions_see_their_own_name() {
    let source = "var f = function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); }; f(5);";
    assert_eq!(eval_number(source), 120.0);
}

#[test]
fn arguments_object_is_populated() {
    assert_eq!(
        eval_string("function f() { return arguments.length + ':' + arguments[1]; } f('a', 'b', 'c');"),
        "3:b"
    );
}

#[test]
fn with_statement_exposes_object_properties() {
    assert_eq!(eval_number("var o = { a: 5 }; var r; with (o) { r = a + 1; } r;"), 6.0);
}

#[test]
fn this_at_top_level_is_the_global_scope() {
    assert_eq!(eval_number("var x = 3; this.x;"), 3.0);
}

#[test]
fn method_calls_bind_this_to_the_receiver() {
    assert_eq!(
        eval_string("var o = { name: 'zed', who: function() { return this.name; } }; o.who();"),
        "zed"
    );
}

// =============================================================================
// 3. Control flow
// =============================================================================

#[test]
fn for_loop_computes_fibonacci() {
    let source = "
        var fib = [1, 1];
        for (var i = 2; i < 16; i++) {
            fib[i] = fib[i - 1] + fib[i - 2];
        }
        fib;
    ";
    let mut interp = Interpreter::new(source).unwrap();
    interp.run().unwrap();
    let value = interp.value();
    let host = interp.pseudo_to_native(&value).unwrap();
    let expected: Vec<andante::HostValue> = [
        1.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0, 55.0, 89.0, 144.0, 233.0, 377.0, 610.0, 987.0,
    ]
    .into_iter()
    .map(andante::HostValue::Number)
    .collect();
    assert_eq!(host, andante::HostValue::Array(expected));
}

#[test]
fn while_and_do_while() {
    assert_eq!(eval_number("var n = 0; while (n < 5) { n++; } n;"), 5.0);
    // do-while runs its body once even when the test is false.
    assert_eq!(eval_number("var n = 0; do { n++; } while (false); n;"), 1.0);
}

#[test]
fn for_in_enumerates_own_keys_in_insertion_order() {
    assert_eq!(
        eval_string("var o = { b: 1, a: 2 }; var ks = []; for (var k in o) { ks.push(k); } ks.join(',');"),
        "b,a"
    );
}

#[test]
fn for_in_over_null_is_a_no_op() {
    assert_eq!(eval_number("var n = 0; for (var k in null) { n++; } n;"), 0.0);
}

/// Once a case matches, every subsequent case's consequents run until a
/// `break`.
#[test]
fn switch_falls_through_subsequent_cases() {
    let source = "
        var log = [];
        switch (2) {
            case 1: log.push(1);
            case 2: log.push(2);
            case 3: log.push(3);
            default: log.push(4);
        }
        log.join(',');
    ";
    assert_eq!(eval_string(source), "2,3,4");
}

#[test]
fn switch_break_and_default() {
    let source = "
        function pick(x) {
            switch (x) {
                case 1: return 'one';
                case 2: break;
                default: return 'other';
            }
            return 'two';
        }
        pick(1) + '/' + pick(2) + '/' + pick(9);
    ";
    assert_eq!(eval_string(source), "one/two/other");
}

#[test]
fn labeled_break_and_continue() {
    let source = "
        var out = [];
        outer: for (var i = 0; i < 3; i++) {
            for (var j = 0; j < 3; j++) {
                if (j == 1) continue outer;
                if (i == 2) break outer;
                out.push(i + '' + j);
            }
        }
        out.join(',');
    ";
    assert_eq!(eval_string(source), "00,10");
}

#[test]
fn conditional_and_logical_short_circuit() {
    assert_eq!(eval_string("true ? 'a' : 'b'"), "a");
    assert_eq!(eval_number("0 || 7"), 7.0);
    assert_eq!(eval_number("0 && boom()"), 0.0);
    assert_eq!(eval_string("'left' && 'right'"), "right");
}

#[test]
fn sequence_expression_yields_last_value() {
    assert_eq!(eval_number("var x = (1, 2, 3); x;"), 3.0);
}

#[test]
fn compound_assignment_and_update() {
    assert_eq!(eval_number("var x = 10; x += 5; x -= 1; x *= 2; x;"), 28.0);
    assert_eq!(eval_number("var x = 5; var y = x++; y * 10 + x;"), 56.0);
    assert_eq!(eval_number("var x = 5; var y = ++x; y * 10 + x;"), 66.0);
}

// =============================================================================
// 4. Exceptions and unwinding
// =============================================================================

#[test]
fn uncaught_throw_surfaces_to_the_host() {
    let err = eval_error("throw new Error('x');");
    assert_eq!(err.kind, ErrorKind::Error);
    assert_eq!(err.message, "x");
}

#[test]
fn uncaught_subclass_error_keeps_its_kind() {
    let err = eval_error("undefined.x;");
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn uncaught_non_error_values_are_stringified() {
    let err = eval_error("throw 'plain';");
    assert_eq!(err.kind, ErrorKind::Error);
    assert_eq!(err.message, "plain");
}

#[test]
fn try_catch_binds_the_exception() {
    assert_eq!(
        eval_string("var m; try { throw new TypeError('boom'); } catch (e) { m = e.message; } m;"),
        "boom"
    );
}

#[test]
fn caught_errors_keep_their_prototype_chain() {
    assert_eq!(
        eval_program("var r; try { null.x; } catch (e) { r = e instanceof TypeError && e instanceof Error; } r;"),
        Value::Boolean(true)
    );
}

#[test]
fn finally_runs_on_normal_and_abrupt_exits() {
    let source = "
        var log = [];
        function f() {
            try { log.push('t'); return 'r'; } finally { log.push('f'); }
        }
        var r = f();
        log.join(',') + '|' + r;
    ";
    assert_eq!(eval_string(source), "t,f|r");
}

#[test]
fn finally_runs_before_exception_propagates() {
    let source = "
        var seen = '';
        try {
            try { throw new Error('boom'); } finally { seen += 'f'; }
        } catch (e) {
            seen += 'c:' + e.message;
        }
        seen;
    ";
    assert_eq!(eval_string(source), "fc:boom");
}

#[test]
fn exceptions_propagate_out_of_function_calls() {
    let source = "
        function inner() { throw new RangeError('deep'); }
        function outer() { inner(); }
        var m;
        try { outer(); } catch (e) { m = e.message; }
        m;
    ";
    assert_eq!(eval_string(source), "deep");
}

#[test]
fn catch_scope_does_not_leak_its_binding() {
    assert_eq!(
        eval_string("try { throw 1; } catch (oops) {} typeof oops;"),
        "undefined"
    );
}

// =============================================================================
// 5. eval and Function
// =============================================================================

#[test]
fn eval_shares_the_caller_scope() {
    assert_eq!(eval_number("var x = 2; eval('x + 3');"), 5.0);
    assert_eq!(eval_number("eval('var z = 9;'); z;"), 9.0);
}

#[test]
fn eval_of_non_string_passes_through() {
    assert_eq!(eval_number("eval(41) + 1"), 42.0);
}

#[test]
fn eval_syntax_errors_are_catchable() {
    assert_eq!(
        eval_program("var ok; try { eval('var ='); } catch (e) { ok = e instanceof SyntaxError; } ok;"),
        Value::Boolean(true)
    );
}

#[test]
fn function_constructor_builds_callable_functions() {
    assert_eq!(eval_number("var f = new Function('a', 'b', 'return a + b;'); f(2, 3);"), 5.0);
}

#[test]
fn apply_call_and_bind() {
    assert_eq!(eval_string("function who() { return this.name; } who.call({ name: 'x' });"), "x");
    assert_eq!(
        eval_number("function add(a, b) { return a + b; } add.apply(null, [3, 4]);"),
        7.0
    );
    assert_eq!(
        eval_number("function add(a, b) { return a + b; } var inc = add.bind(null, 1); inc(4);"),
        5.0
    );
}

// =============================================================================
// 6. Constructors and prototypes
// =============================================================================

#[test]
fn new_expressions_wire_the_prototype_chain() {
    let source = "
        function Point(x, y) { this.x = x; this.y = y; }
        Point.prototype.norm1 = function() { return this.x + this.y; };
        var p = new Point(3, 4);
        p.norm1();
    ";
    assert_eq!(eval_number(source), 7.0);
}

#[test]
fn constructor_returning_object_replaces_receiver() {
    assert_eq!(
        eval_number("function F() { return { v: 9 }; } new F().v;"),
        9.0
    );
    assert_eq!(
        eval_number("function G() { this.v = 1; return 42; } new G().v;"),
        1.0
    );
}

#[test]
fn instanceof_walks_the_prototype_chain() {
    assert_eq!(eval_program("[] instanceof Array"), Value::Boolean(true));
    assert_eq!(eval_program("({}) instanceof Array"), Value::Boolean(false));
    assert_eq!(eval_program("[] instanceof Object"), Value::Boolean(true));
}

#[test]
fn in_operator_consults_the_chain() {
    assert_eq!(eval_program("'a' in { a: 1 }"), Value::Boolean(true));
    assert_eq!(eval_program("'toString' in {}"), Value::Boolean(true));
    assert_eq!(eval_program("'missing' in {}"), Value::Boolean(false));
}

// =============================================================================
// 7. Stepping protocol
// =============================================================================

/// After completion, further `step()` calls keep returning false.
#[test]
fn step_is_monotone_after_completion() {
    let mut interp = Interpreter::new("1 + 1;").unwrap();
    while interp.step().unwrap() {}
    assert!(!interp.step().unwrap());
    assert!(!interp.step().unwrap());
    assert_eq!(interp.value(), Value::Number(2.0));
}

/// Stepping never observes polyfill frames: the very first step lands on
/// user code.
#[test]
fn stepping_is_equivalent_to_running() {
    let source = "var n = 0; for (var i = 0; i < 10; i++) { n += i; } n;";
    let mut by_steps = Interpreter::new(source).unwrap();
    let mut count = 0u32;
    while by_steps.step().unwrap() {
        count += 1;
        assert!(count < 10_000, "runaway stepping");
    }
    assert_eq!(by_steps.value(), Value::Number(45.0));
    assert!(count > 10, "a loop should take many steps");
}

#[test]
fn append_code_extends_an_idle_program() {
    let mut interp = Interpreter::new("var a = 1;").unwrap();
    interp.run().unwrap();
    interp.append_code("a + 1;").unwrap();
    interp.run().unwrap();
    assert_eq!(interp.value(), Value::Number(2.0));
}

#[test]
fn append_code_rejects_a_mid_statement_interpreter() {
    let mut interp = Interpreter::new("var a = 1; a + 1;").unwrap();
    // The first step stops with the first user statement pending on top of
    // the stack, so the program frame is no longer topmost.
    assert!(interp.step().unwrap());
    let err = interp.append_code("a;").unwrap_err();
    assert!(err.message.contains("mid-statement"), "got: {err}");
}

#[test]
fn parse_errors_surface_at_construction() {
    let err = Interpreter::new("var = ;").unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
}

#[test]
fn es2015_syntax_is_rejected() {
    assert!(Interpreter::new("let x = 1; const y = () => x;").is_err());
    assert!(Interpreter::new("class A {}").is_err());
    assert!(Interpreter::new("var [a] = [1];").is_err());
}
