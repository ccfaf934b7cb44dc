//! Tests for asynchronous native calls: the pause/resume protocol and the
//! completion mailbox.

use std::{cell::RefCell, rc::Rc};

use andante::{AsyncHandle, Exception, Interpreter, Value};
use pretty_assertions::assert_eq;

/// Builds an interpreter whose global `later()` is an asynchronous native;
/// the handle is parked in the returned cell for the test to resolve.
fn with_async(source: &str) -> (Interpreter, Rc<RefCell<Option<AsyncHandle>>>) {
    let parked: Rc<RefCell<Option<AsyncHandle>>> = Rc::new(RefCell::new(None));
    let parked_for_native = Rc::clone(&parked);
    let interp = Interpreter::with_init(source, move |interp, global| {
        let parked = Rc::clone(&parked_for_native);
        let func = interp
            .create_async_function(move |_interp, _this, _args, handle| {
                *parked.borrow_mut() = Some(handle);
                Ok(())
            })
            .unwrap();
        interp.set_property(&global, "later", func).unwrap();
    })
    .unwrap();
    (interp, parked)
}

/// The canonical flow: `run()` pauses, the host resolves, the next `run()`
/// completes with the resolved value.
#[test]
fn async_native_pauses_and_resumes() {
    let (mut interp, parked) = with_async("later();");
    assert!(interp.run().unwrap(), "run() should report the paused state");
    assert!(interp.is_paused());

    let handle = parked.borrow_mut().take().expect("the native ran");
    handle.resolve(Value::Number(10.0));
    assert!(!interp.run().unwrap(), "resumed run() should complete");
    assert_eq!(interp.value(), Value::Number(10.0));
}

/// The resolved value flows into the surrounding expression.
#[test]
fn async_results_feed_the_call_site() {
    let (mut interp, parked) = with_async("var r = later() + 1; r * 2;");
    assert!(interp.run().unwrap());
    parked.borrow_mut().take().unwrap().resolve(Value::Number(20.0));
    assert!(!interp.run().unwrap());
    assert_eq!(interp.value(), Value::Number(42.0));
}

/// While paused with an unresolved mailbox, `step()` makes no progress but
/// keeps reporting unfinished work.
#[test]
fn stepping_while_paused_is_a_no_op() {
    let (mut interp, parked) = with_async("later();");
    assert!(interp.run().unwrap());
    assert!(interp.step().unwrap());
    assert!(interp.is_paused());
    parked.borrow_mut().take().unwrap().resolve(Value::Undefined);
    assert!(!interp.run().unwrap());
}

/// A rejected call throws at the call site and is catchable by the sandbox.
#[test]
fn rejection_throws_into_the_sandbox() {
    let source = "var m = 'pre'; try { later(); } catch (e) { m = 'caught:' + e.message; } m;";
    let (mut interp, parked) = with_async(source);
    assert!(interp.run().unwrap());
    parked
        .borrow_mut()
        .take()
        .unwrap()
        .reject(Exception::type_error("nope"));
    assert!(!interp.run().unwrap());
    assert_eq!(interp.value(), Value::string("caught:nope"));
}

/// An unhandled rejection surfaces to the host as an exception.
#[test]
fn unhandled_rejection_surfaces_to_host() {
    let (mut interp, parked) = with_async("later();");
    assert!(interp.run().unwrap());
    parked
        .borrow_mut()
        .take()
        .unwrap()
        .reject(Exception::type_error("nope"));
    let err = interp.run().unwrap_err();
    assert_eq!(err.kind, andante::ErrorKind::TypeError);
}

/// Resolving before the host's next `run()` call (a promise that settled
/// synchronously) still follows the pause protocol.
#[test]
fn synchronous_resolution_is_picked_up_on_resume() {
    let (mut interp, parked) = with_async("later();");
    assert!(interp.run().unwrap());
    let handle = parked.borrow_mut().take().unwrap();
    handle.resolve(Value::Number(1.0));
    // A second resolve is ignored; the first outcome wins.
    handle.resolve(Value::Number(2.0));
    assert!(!interp.run().unwrap());
    assert_eq!(interp.value(), Value::Number(1.0));
}

/// Two sequential async calls each pause independently.
#[test]
fn sequential_async_calls() {
    let (mut interp, parked) = with_async("var a = later(); var b = later(); a + b;");
    assert!(interp.run().unwrap());
    parked.borrow_mut().take().unwrap().resolve(Value::Number(40.0));
    assert!(interp.run().unwrap(), "the second call should pause again");
    parked.borrow_mut().take().unwrap().resolve(Value::Number(2.0));
    assert!(!interp.run().unwrap());
    assert_eq!(interp.value(), Value::Number(42.0));
}
