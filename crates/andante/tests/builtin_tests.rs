//! Tests for the built-in library surface: Object reflection, Array and its
//! polyfilled iteration methods, String, Number, Math, JSON, RegExp, Date
//! and the error hierarchy.

use andante::{ErrorKind, HostValue, Interpreter, Value};
use pretty_assertions::assert_eq;

fn eval_program(source: &str) -> Value {
    let mut interp = Interpreter::new(source).expect("program should parse");
    assert!(!interp.run().expect("program should not throw"));
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

fn eval_host(source: &str) -> HostValue {
    let mut interp = Interpreter::new(source).expect("program should parse");
    assert!(!interp.run().expect("program should not throw"));
    let value = interp.value();
    interp.pseudo_to_native(&value).expect("value should convert")
}

// =============================================================================
// 1. Object
// =============================================================================

#[test]
fn define_property_controls_enumerability() {
    let source = "
        var o = {};
        Object.defineProperty(o, 'hidden', { value: 1 });
        Object.defineProperty(o, 'shown', { value: 2, enumerable: true });
        Object.keys(o).join(',') + '|' + o.hidden + '|' + o.shown;
    ";
    assert_eq!(eval_string(source), "shown|1|2");
}

/// Redefining a non-configurable property throws `TypeError`.
#[test]
fn define_property_locks_non_configurable_slots() {
    let source = "
        var o = {};
        Object.defineProperty(o, 'x', { value: 1 });
        var kind = '';
        try { Object.defineProperty(o, 'x', { value: 2 }); } catch (e) { kind = e.name; }
        kind + '|' + o.x;
    ";
    assert_eq!(eval_string(source), "TypeError|1");
}

#[test]
fn non_writable_properties_ignore_sloppy_writes() {
    let source = "
        var o = {};
        Object.defineProperty(o, 'x', { value: 1, configurable: true });
        o.x = 99;
        o.x;
    ";
    assert_eq!(eval_number(source), 1.0);
}

#[test]
fn define_properties_polyfill() {
    let source = "
        var o = Object.defineProperties({}, {
            a: { value: 1, enumerable: true },
            b: { value: 2, enumerable: true }
        });
        Object.keys(o).join(',') + '|' + (o.a + o.b);
    ";
    assert_eq!(eval_string(source), "a,b|3");
}

#[test]
fn descriptor_accessors_dispatch() {
    let source = "
        var calls = [];
        var o = {};
        Object.defineProperty(o, 'v', {
            get: function() { calls.push('get'); return 7; },
            set: function(x) { calls.push('set:' + x); }
        });
        o.v = 3;
        var got = o.v;
        got + '|' + calls.join(',');
    ";
    assert_eq!(eval_string(source), "7|set:3,get");
}

#[test]
fn object_create_and_get_prototype_of() {
    let source = "
        var base = { greet: function() { return 'hi'; } };
        var child = Object.create(base);
        var ok = Object.getPrototypeOf(child) === base;
        ok + '|' + child.greet();
    ";
    assert_eq!(eval_string(source), "true|hi");
}

#[test]
fn prevent_extensions_blocks_new_properties() {
    let source = "
        var o = { a: 1 };
        Object.preventExtensions(o);
        o.b = 2;
        Object.isExtensible(o) + '|' + (o.b === undefined);
    ";
    assert_eq!(eval_string(source), "false|true");
}

#[test]
fn has_own_property_and_is_prototype_of() {
    assert_eq!(eval_program("({ a: 1 }).hasOwnProperty('a')"), Value::Boolean(true));
    assert_eq!(eval_program("({ a: 1 }).hasOwnProperty('toString')"), Value::Boolean(false));
    assert_eq!(
        eval_program("Array.prototype.isPrototypeOf([])"),
        Value::Boolean(true)
    );
}

// =============================================================================
// 2. Array
// =============================================================================

#[test]
fn array_literal_holes_count_toward_length() {
    assert_eq!(eval_number("[1, , 3].length"), 3.0);
}

/// Lowering `length` deletes every superseded index.
#[test]
fn shrinking_length_deletes_elements() {
    let source = "var a = [1, 2, 3]; a.length = 1; (a[2] === undefined) + '|' + ('2' in a) + '|' + a.length;";
    assert_eq!(eval_string(source), "true|false|1");
}

#[test]
fn writing_past_the_end_grows_length() {
    assert_eq!(eval_number("var a = []; a[4] = 'x'; a.length;"), 5.0);
}

#[test]
fn invalid_length_assignment_throws_range_error() {
    let source = "var kind = ''; try { [].length = -1; } catch (e) { kind = e.name; } kind;";
    assert_eq!(eval_string(source), "RangeError");
}

#[test]
fn push_pop_shift_unshift() {
    let source = "
        var a = [2, 3];
        a.push(4);
        a.unshift(1);
        var first = a.shift();
        var last = a.pop();
        first + '|' + last + '|' + a.join(',');
    ";
    assert_eq!(eval_string(source), "1|4|2,3");
}

#[test]
fn slice_splice_concat() {
    assert_eq!(eval_string("[1, 2, 3, 4].slice(1, 3).join(',')"), "2,3");
    assert_eq!(eval_string("[1, 2, 3, 4].slice(-2).join(',')"), "3,4");
    let source = "
        var a = [1, 2, 3, 4];
        var removed = a.splice(1, 2, 'x');
        removed.join(',') + '|' + a.join(',');
    ";
    assert_eq!(eval_string(source), "2,3|1,x,4");
    assert_eq!(eval_string("[1].concat([2, 3], 4).join(',')"), "1,2,3,4");
}

#[test]
fn index_of_uses_strict_equality() {
    assert_eq!(eval_number("[1, '2', 3].indexOf('2')"), 1.0);
    assert_eq!(eval_number("[1, '2', 3].indexOf(2)"), -1.0);
    assert_eq!(eval_number("[1, 2, 1].lastIndexOf(1)"), 2.0);
}

/// The scenario from the host-embedding suite: constructed array + map.
#[test]
fn map_over_a_constructed_array() {
    let host = eval_host("new Array('1', '2', '3').map(function(x) { return 'm' + x; });");
    assert_eq!(
        host,
        HostValue::Array(vec![
            HostValue::String("m1".into()),
            HostValue::String("m2".into()),
            HostValue::String("m3".into()),
        ])
    );
}

#[test]
fn polyfilled_iteration_methods() {
    assert_eq!(eval_number("[1, 2, 3, 4].filter(function(x) { return x % 2 == 0; }).length"), 2.0);
    assert_eq!(eval_number("[1, 2, 3].reduce(function(a, b) { return a + b; })"), 6.0);
    assert_eq!(eval_number("[1, 2, 3].reduce(function(a, b) { return a + b; }, 10)"), 16.0);
    assert_eq!(eval_string("['a', 'b'].reduceRight(function(a, b) { return a + b; })"), "ba");
    assert_eq!(eval_program("[1, 2, 3].every(function(x) { return x > 0; })"), Value::Boolean(true));
    assert_eq!(eval_program("[1, 2, 3].some(function(x) { return x > 2; })"), Value::Boolean(true));
    assert_eq!(
        eval_number("var sum = 0; [1, 2, 3].forEach(function(x) { sum += x; }); sum;"),
        6.0
    );
}

#[test]
fn sort_with_and_without_comparator() {
    assert_eq!(eval_string("[3, 1, 2].sort().join(',')"), "1,2,3");
    assert_eq!(eval_string("[10, 9, 1].sort().join(',')"), "1,10,9");
    assert_eq!(
        eval_string("[10, 9, 1].sort(function(a, b) { return a - b; }).join(',')"),
        "1,9,10"
    );
}

#[test]
fn reduce_of_empty_array_throws() {
    let source = "var kind = ''; try { [].reduce(function(a, b) { return a + b; }); } catch (e) { kind = e.name; } kind;";
    assert_eq!(eval_string(source), "TypeError");
}

// =============================================================================
// 3. String
// =============================================================================

#[test]
fn string_length_and_indexing() {
    assert_eq!(eval_number("'abc'.length"), 3.0);
    assert_eq!(eval_string("'abc'[1]"), "b");
    assert_eq!(eval_string("'abc'.charAt(2)"), "c");
    assert_eq!(eval_number("'abc'.charCodeAt(1)"), 98.0);
}

/// Assignment to a string index is silently ignored.
#[test]
fn string_index_writes_are_ignored() {
    assert_eq!(eval_string("var s = 'abc'; s[1] = 'X'; s;"), "abc");
}

#[test]
fn slicing_and_searching() {
    assert_eq!(eval_string("'hello world'.slice(6)"), "world");
    assert_eq!(eval_string("'hello'.slice(1, -1)"), "ell");
    assert_eq!(eval_string("'hello'.substring(3, 1)"), "ell");
    assert_eq!(eval_string("'hello'.substr(1, 3)"), "ell");
    assert_eq!(eval_number("'abcabc'.indexOf('bc')"), 1.0);
    assert_eq!(eval_number("'abcabc'.lastIndexOf('bc')"), 4.0);
}

#[test]
fn split_and_join_round_trip() {
    assert_eq!(eval_string("'a,b,c'.split(',').join('|')"), "a|b|c");
    assert_eq!(eval_number("'abc'.split('').length"), 3.0);
    assert_eq!(eval_number("'a1b2c'.split(/[0-9]/).length"), 3.0);
}

#[test]
fn case_conversion_and_trim() {
    assert_eq!(eval_string("'MiXeD'.toLowerCase()"), "mixed");
    assert_eq!(eval_string("'MiXeD'.toUpperCase()"), "MIXED");
    assert_eq!(eval_string("'  pad  '.trim()"), "pad");
}

#[test]
fn replace_with_strings_and_patterns() {
    assert_eq!(eval_string("'aaa'.replace('a', 'b')"), "baa");
    assert_eq!(eval_string("'abcabc'.replace(/b/g, 'X')"), "aXcaXc");
    assert_eq!(eval_string("'john smith'.replace(/(\\w+) (\\w+)/, '$2 $1')"), "smith john");
}

#[test]
fn match_and_search() {
    assert_eq!(eval_number("'a1b2'.search(/[0-9]/)"), 1.0);
    assert_eq!(eval_number("'a1b2'.search(/z/)"), -1.0);
    assert_eq!(eval_number("'a1b2c3'.match(/[0-9]/g).length"), 3.0);
    assert_eq!(eval_program("'abc'.match(/z/)"), Value::Null);
}

#[test]
fn from_char_code() {
    assert_eq!(eval_string("String.fromCharCode(104, 105)"), "hi");
}

// =============================================================================
// 4. Number and Math
// =============================================================================

#[test]
fn number_formatting() {
    assert_eq!(eval_string("(255).toString(16)"), "ff");
    assert_eq!(eval_string("(1.5).toFixed(2)"), "1.50");
    assert_eq!(eval_string("(0.5).toString(2)"), "0.1");
    assert_eq!(eval_string("(12345.678).toString()"), "12345.678");
}

#[test]
fn number_constants() {
    assert_eq!(eval_program("Number.MAX_VALUE > 0"), Value::Boolean(true));
    assert_eq!(eval_program("Number.NEGATIVE_INFINITY < 0"), Value::Boolean(true));
    assert_eq!(eval_program("isNaN(Number.NaN)"), Value::Boolean(true));
}

#[test]
fn parse_int_and_parse_float() {
    assert_eq!(eval_number("parseInt('42px')"), 42.0);
    assert_eq!(eval_number("parseInt('0x1F')"), 31.0);
    assert_eq!(eval_number("parseInt('101', 2)"), 5.0);
    assert_eq!(eval_number("parseFloat('3.5px')"), 3.5);
    assert_eq!(eval_program("isNaN(parseInt('px'))"), Value::Boolean(true));
}

#[test]
fn math_functions() {
    assert_eq!(eval_number("Math.max(1, 7, 3)"), 7.0);
    assert_eq!(eval_number("Math.min(4, 2, 9)"), 2.0);
    assert_eq!(eval_program("Math.max() === -Infinity"), Value::Boolean(true));
    assert_eq!(eval_number("Math.pow(2, 10)"), 1024.0);
    assert_eq!(eval_number("Math.floor(1.9)"), 1.0);
    assert_eq!(eval_number("Math.round(2.5)"), 3.0);
    assert_eq!(eval_number("Math.abs(-4)"), 4.0);
    assert_eq!(eval_program("Math.random() >= 0 && Math.random() < 1"), Value::Boolean(true));
    assert_eq!(eval_number("Math.sqrt(81)"), 9.0);
}

#[test]
fn boxed_primitives_unwrap() {
    assert_eq!(eval_number("new Number(5).valueOf() + 1"), 6.0);
    assert_eq!(eval_string("new String('ab').toString()"), "ab");
    assert_eq!(eval_program("new Boolean(false).valueOf()"), Value::Boolean(false));
    assert_eq!(eval_number("new String('abc').length"), 3.0);
}

// =============================================================================
// 5. JSON
// =============================================================================

#[test]
fn json_parse_produces_interpreter_values() {
    assert_eq!(eval_string("typeof JSON.parse('{\"a\":10}').a"), "number");
    assert_eq!(eval_number("JSON.parse('{\"a\":10}').a"), 10.0);
    assert_eq!(eval_number("JSON.parse('[1,2,3]').length"), 3.0);
}

#[test]
fn json_stringify_round_trip() {
    assert_eq!(eval_string("JSON.stringify({ a: 10 })"), "{\"a\":10}");
    assert_eq!(
        eval_string("JSON.stringify(JSON.parse('{\"a\":10,\"b\":[true,null]}'))"),
        "{\"a\":10,\"b\":[true,null]}"
    );
}

#[test]
fn json_stringify_drops_undefined_and_functions() {
    assert_eq!(
        eval_string("JSON.stringify({ a: 1, b: undefined, c: function() {} })"),
        "{\"a\":1}"
    );
    assert_eq!(eval_program("JSON.stringify(undefined)"), Value::Undefined);
}

#[test]
fn json_stringify_rejects_cycles() {
    let source = "var o = {}; o.self = o; var kind = ''; try { JSON.stringify(o); } catch (e) { kind = e.name; } kind;";
    assert_eq!(eval_string(source), "TypeError");
}

#[test]
fn json_stringify_with_space() {
    assert_eq!(eval_string("JSON.stringify({ a: 1 }, null, 2)"), "{\n  \"a\": 1\n}");
}

#[test]
fn json_parse_errors_are_syntax_errors() {
    let err = {
        let mut interp = Interpreter::new("JSON.parse('{');").unwrap();
        interp.run().unwrap_err()
    };
    assert_eq!(err.kind, ErrorKind::SyntaxError);
}

// =============================================================================
// 6. RegExp
// =============================================================================

#[test]
fn regexp_literals_expose_their_parts() {
    assert_eq!(eval_string("/ab+c/gi.source"), "ab+c");
    assert_eq!(eval_program("/x/g.global"), Value::Boolean(true));
    assert_eq!(eval_program("/x/.global"), Value::Boolean(false));
    assert_eq!(eval_string("/a/m.toString()"), "/a/m");
}

#[test]
fn regexp_test_and_exec() {
    assert_eq!(eval_program("/a(b)/.test('zab')"), Value::Boolean(true));
    assert_eq!(eval_program("/a(b)/.test('zzz')"), Value::Boolean(false));
    let source = "var m = /a(b)/.exec('zab'); m[0] + '|' + m[1] + '|' + m.index;";
    assert_eq!(eval_string(source), "ab|b|1");
    assert_eq!(eval_program("/z/.exec('abc')"), Value::Null);
}

#[test]
fn global_regexp_advances_last_index() {
    let source = "
        var re = /a/g;
        var first = re.exec('aa');
        var second = re.exec('aa');
        var third = re.exec('aa');
        first.index + '|' + second.index + '|' + (third === null) + '|' + re.lastIndex;
    ";
    assert_eq!(eval_string(source), "0|1|true|0");
}

#[test]
fn regexp_constructor_accepts_strings_and_flags() {
    assert_eq!(eval_program("new RegExp('a.c').test('abc')"), Value::Boolean(true));
    assert_eq!(eval_string("new RegExp('x', 'g').toString()"), "/x/g");
}

#[test]
fn invalid_flags_throw_syntax_error() {
    let source = "var kind = ''; try { new RegExp('a', 'q'); } catch (e) { kind = e.name; } kind;";
    assert_eq!(eval_string(source), "SyntaxError");
}

// =============================================================================
// 7. Date
// =============================================================================

#[test]
fn date_epoch_round_trip() {
    assert_eq!(eval_number("new Date(0).getTime()"), 0.0);
    assert_eq!(eval_number("new Date(1234).valueOf()"), 1234.0);
    assert_eq!(eval_string("new Date(0).toISOString()"), "1970-01-01T00:00:00.000Z");
}

#[test]
fn date_utc_and_getters() {
    assert_eq!(eval_number("Date.UTC(1970, 0, 2)"), 86_400_000.0);
    assert_eq!(eval_number("new Date(86400000).getUTCDate()"), 2.0);
    assert_eq!(eval_number("new Date(0).getUTCFullYear()"), 1970.0);
    assert_eq!(eval_number("new Date(0).getUTCDay()"), 4.0);
}

#[test]
fn date_now_is_reasonable() {
    // Sometime after 2020 and before 2100.
    assert_eq!(
        eval_program("Date.now() > 1577836800000 && Date.now() < 4102444800000"),
        Value::Boolean(true)
    );
}

#[test]
fn date_setters_update_the_payload() {
    assert_eq!(eval_number("var d = new Date(0); d.setTime(5000); d.getTime();"), 5000.0);
    assert_eq!(
        eval_number("var d = new Date(0); d.setUTCFullYear(1971); d.getUTCFullYear();"),
        1971.0
    );
}

#[test]
fn invalid_dates_are_nan() {
    assert_eq!(eval_program("isNaN(new Date('garbage').getTime())"), Value::Boolean(true));
    assert_eq!(eval_program("isNaN(Date.parse('garbage'))"), Value::Boolean(true));
}

// =============================================================================
// 8. Errors
// =============================================================================

#[test]
fn error_hierarchy_names() {
    assert_eq!(eval_string("new Error('m').toString()"), "Error: m");
    assert_eq!(eval_string("new TypeError('m').toString()"), "TypeError: m");
    assert_eq!(eval_string("new RangeError().toString()"), "RangeError");
    assert_eq!(eval_string("new ReferenceError('r').name"), "ReferenceError");
}

#[test]
fn error_constructors_work_without_new() {
    assert_eq!(eval_string("Error('m').message"), "m");
    assert_eq!(eval_program("SyntaxError('m') instanceof SyntaxError"), Value::Boolean(true));
}

#[test]
fn uri_coding_round_trips() {
    assert_eq!(eval_string("encodeURIComponent('a b/c')"), "a%20b%2Fc");
    assert_eq!(eval_string("encodeURI('a b/c')"), "a%20b/c");
    assert_eq!(eval_string("decodeURIComponent('a%20b%2Fc')"), "a b/c");
    let source = "var kind = ''; try { decodeURIComponent('%zz'); } catch (e) { kind = e.name; } kind;";
    assert_eq!(eval_string(source), "URIError");
}
