//! The public interpreter type: construction, the host bridge, and the
//! observable execution state. The stepping machinery itself lives in
//! `machine/`.

use std::{cell::RefCell, rc::Rc};

use crate::{
    ast::Stmt,
    builtins,
    error::{ErrorKind, Exception, RunError},
    frame::{Frame, FrameKind, Outcome},
    heap::{
        AsyncFn, Descriptor, FnBody, FnData, Heap, JsObject, NativeFn, ObjId, ObjKind, PropLookup, SetOutcome,
    },
    host::{self, AsyncHandle, AsyncOutcome, HostValue},
    parse,
    resource::{NoLimitTracker, ResourceTracker},
    scope,
    tracer::{NoopTracer, StepTracer},
    value::Value,
};

/// The built-in constructors of one interpreter instance.
///
/// Everything is an arena index; the prototype objects are reached through
/// each constructor's `prototype` property.
#[derive(Debug, Clone)]
pub(crate) struct Realm {
    /// The global scope object.
    pub global: ObjId,
    pub object: ObjId,
    pub function: ObjId,
    pub array: ObjId,
    pub number: ObjId,
    pub string: ObjId,
    pub boolean: ObjId,
    pub date: ObjId,
    pub regexp: ObjId,
    pub error: ObjId,
    pub eval_error: ObjId,
    pub range_error: ObjId,
    pub reference_error: ObjId,
    pub syntax_error: ObjId,
    pub type_error: ObjId,
    pub uri_error: ObjId,
}

impl Realm {
    pub(crate) fn uninit() -> Self {
        let placeholder = ObjId::PLACEHOLDER;
        Self {
            global: placeholder,
            object: placeholder,
            function: placeholder,
            array: placeholder,
            number: placeholder,
            string: placeholder,
            boolean: placeholder,
            date: placeholder,
            regexp: placeholder,
            error: placeholder,
            eval_error: placeholder,
            range_error: placeholder,
            reference_error: placeholder,
            syntax_error: placeholder,
            type_error: placeholder,
            uri_error: placeholder,
        }
    }

    pub(crate) fn error_ctor(&self, kind: ErrorKind) -> ObjId {
        match kind {
            ErrorKind::Error => self.error,
            ErrorKind::EvalError => self.eval_error,
            ErrorKind::RangeError => self.range_error,
            ErrorKind::ReferenceError => self.reference_error,
            ErrorKind::SyntaxError => self.syntax_error,
            ErrorKind::TypeError => self.type_error,
            ErrorKind::URIError => self.uri_error,
        }
    }

    /// The error kind a constructor id corresponds to, if any.
    pub(crate) fn error_kind_of(&self, ctor: ObjId) -> Option<ErrorKind> {
        if ctor == self.error {
            return Some(ErrorKind::Error);
        }
        ErrorKind::SUBCLASSES.into_iter().find(|&kind| self.error_ctor(kind) == ctor)
    }
}

/// An in-process, sandboxed interpreter for a subset of ECMAScript 5.
///
/// The interpreter executes one small step at a time: [`step`](Self::step)
/// advances the reified frame stack by a single node event, [`run`](Self::run)
/// drives it until completion or until an asynchronous native pauses it, and
/// [`append_code`](Self::append_code) extends a live, idle program. Host code
/// is injected through the `create_*`/`set_property` bridge.
///
/// # Example
/// ```
/// use andante::Interpreter;
///
/// let mut interp = Interpreter::new("6 * 7;").unwrap();
/// interp.run().unwrap();
/// assert_eq!(interp.value(), andante::Value::Number(42.0));
/// ```
pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) realm: Realm,
    /// The program body: polyfill statements followed by user statements,
    /// extended in place by `append_code`.
    pub(crate) program: Vec<Stmt>,
    pub(crate) source: String,
    pub(crate) frames: Vec<Frame>,
    /// Single result register: a completed frame writes here, its parent
    /// consumes on the next step.
    pub(crate) reg: Option<Outcome>,
    pub(crate) last_value: Value,
    pub(crate) done: bool,
    /// Set while an asynchronous native call is in flight.
    pub(crate) paused: bool,
    /// Completion mailbox for the in-flight asynchronous call.
    pub(crate) mailbox: Option<Rc<RefCell<Option<AsyncOutcome>>>>,
    pub(crate) tracer: Rc<RefCell<dyn StepTracer>>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("frames", &self.frames.len())
            .field("done", &self.done)
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Parses `code`, installs the built-ins, runs the startup polyfills lazily
    /// as the first (invisible) steps, and leaves the program ready to step.
    pub fn new(code: &str) -> Result<Self, Exception> {
        Self::construct(code, Box::new(NoLimitTracker))
    }

    /// Like [`new`](Self::new), but calls `init` with the interpreter and its
    /// global scope object before returning, letting the host inject names.
    pub fn with_init(code: &str, init: impl FnOnce(&mut Self, Value)) -> Result<Self, Exception> {
        let mut interp = Self::new(code)?;
        let global = interp.global();
        init(&mut interp, global);
        Ok(interp)
    }

    /// Like [`new`](Self::new), with a resource tracker bounding execution.
    pub fn with_tracker(code: &str, tracker: impl ResourceTracker + 'static) -> Result<Self, Exception> {
        Self::construct(code, Box::new(tracker))
    }

    fn construct(code: &str, tracker: Box<dyn ResourceTracker>) -> Result<Self, Exception> {
        let user = parse::parse_program(code, false)?;
        let polyfill =
            parse::parse_program(builtins::polyfill::SOURCE, true).expect("polyfill source must parse");
        let mut interp = Self {
            heap: Heap::new(tracker),
            realm: Realm::uninit(),
            program: Vec::new(),
            source: code.to_owned(),
            frames: Vec::new(),
            reg: None,
            last_value: Value::Undefined,
            done: false,
            paused: false,
            mailbox: None,
            tracer: Rc::new(RefCell::new(NoopTracer)),
        };
        builtins::install(&mut interp).map_err(|err| interp.run_error_to_exception(err, None))?;
        if user.strict {
            interp.set_scope_strict(interp.realm.global, true);
        }
        interp.program.extend(polyfill.body);
        interp.program.extend(user.body);
        let global = interp.realm.global;
        let program = std::mem::take(&mut interp.program);
        let hoist = interp.hoist_into(&program, global);
        interp.program = program;
        hoist.map_err(|err| interp.run_error_to_exception(err, None))?;
        interp.frames.push(Frame::new(FrameKind::Program { index: 0 }, None));
        Ok(interp)
    }

    /// The value of the last top-level expression statement, initially
    /// `undefined`.
    #[must_use]
    pub fn value(&self) -> Value {
        self.last_value.clone()
    }

    /// The global scope object. Host-injected names become properties of it.
    #[must_use]
    pub fn global(&self) -> Value {
        Value::Object(self.realm.global)
    }

    /// Whether an asynchronous native call is currently in flight.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Installs an execution tracer. The host keeps its own clone of the
    /// `Rc` to read recorded events back.
    pub fn set_tracer(&mut self, tracer: Rc<RefCell<dyn StepTracer>>) {
        self.tracer = tracer;
    }

    /// Appends statements to the live program.
    ///
    /// Only legal while the interpreter is idle, i.e. the top of the stack is
    /// the program frame (before the first step, between steps at a statement
    /// boundary, or after completion).
    pub fn append_code(&mut self, code: &str) -> Result<(), Exception> {
        if self.paused {
            return Err(Exception::error("cannot append code while paused"));
        }
        match self.frames.last() {
            Some(frame) if matches!(frame.kind, FrameKind::Program { .. }) => {}
            _ => return Err(Exception::error("cannot append code: interpreter is mid-statement")),
        }
        let parsed = parse::parse_program(code, false)?;
        let global = self.realm.global;
        self.hoist_into(&parsed.body, global)
            .map_err(|err| self.run_error_to_exception(err, None))?;
        self.program.extend(parsed.body);
        self.done = false;
        Ok(())
    }

    /// The constructor (`parent`) of a value, if it has one.
    #[must_use]
    pub fn constructor_of(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Number(_) => Some(Value::Object(self.realm.number)),
            Value::String(_) => Some(Value::Object(self.realm.string)),
            Value::Boolean(_) => Some(Value::Object(self.realm.boolean)),
            Value::Object(id) => self.heap.get(*id).parent.map(Value::Object),
            Value::Undefined | Value::Null => None,
        }
    }

    // ---------------------------------------------------------------------
    // Host bridge
    // ---------------------------------------------------------------------

    /// Promotes a host primitive to an interpreter value.
    ///
    /// Array and map inputs are promoted through
    /// [`native_to_pseudo`](Self::native_to_pseudo); under a resource limit
    /// that conversion can fail, in which case this returns `undefined`
    /// (use `native_to_pseudo` directly for an error).
    pub fn create_primitive(&mut self, value: impl Into<HostValue>) -> Value {
        let value = value.into();
        match value {
            HostValue::Undefined => Value::Undefined,
            HostValue::Null => Value::Null,
            HostValue::Boolean(b) => Value::Boolean(b),
            HostValue::Number(n) => Value::Number(n),
            HostValue::String(s) => Value::string(&s),
            composite => self.native_to_pseudo(&composite).unwrap_or(Value::Undefined),
        }
    }

    /// Creates an empty plain object whose constructor is `Object`.
    pub fn create_object(&mut self) -> Result<Value, Exception> {
        let object = self.realm.object;
        let id = self
            .heap
            .alloc(JsObject::new(ObjKind::Plain, Some(object)))
            .map_err(|err| self.run_error_to_exception(err, None))?;
        Ok(Value::Object(id))
    }

    /// Creates an empty array.
    pub fn create_array(&mut self) -> Result<Value, Exception> {
        let array = self.realm.array;
        let id = self
            .heap
            .alloc(JsObject::new(ObjKind::Array { length: 0 }, Some(array)))
            .map_err(|err| self.run_error_to_exception(err, None))?;
        Ok(Value::Object(id))
    }

    /// Wraps a host function as a callable interpreter value.
    ///
    /// The function receives the interpreter, the `this` value and the
    /// argument list; an `Err` becomes an interpreter-level throw that
    /// sandboxed code can catch.
    pub fn create_native_function(
        &mut self,
        f: impl Fn(&mut Self, Value, &[Value]) -> Result<Value, Exception> + 'static,
    ) -> Result<Value, Exception> {
        let native: NativeFn = Rc::new(f);
        let id = self
            .new_function_object(FnBody::Native(native), 0)
            .map_err(|err| self.run_error_to_exception(err, None))?;
        Ok(Value::Object(id))
    }

    /// Wraps an asynchronous host function.
    ///
    /// Calling it from sandboxed code pauses execution; the host resolves or
    /// rejects the provided [`AsyncHandle`] and then calls
    /// [`run`](Self::run) again to resume.
    pub fn create_async_function(
        &mut self,
        f: impl Fn(&mut Self, Value, &[Value], AsyncHandle) -> Result<(), Exception> + 'static,
    ) -> Result<Value, Exception> {
        let type_erased: AsyncFn = Rc::new(f);
        let id = self
            .new_function_object(FnBody::Async(type_erased), 0)
            .map_err(|err| self.run_error_to_exception(err, None))?;
        Ok(Value::Object(id))
    }

    /// Ordinary assignment of a property, as `obj.name = value` would do it,
    /// except that prototype setters are not dispatched from host context.
    pub fn set_property(&mut self, object: &Value, name: &str, value: Value) -> Result<(), Exception> {
        match self.heap.set_prop(object, name, value, false) {
            Ok(SetOutcome::Done | SetOutcome::Setter(_)) => Ok(()),
            Err(err) => Err(self.run_error_to_exception(err, None)),
        }
    }

    /// Define-property semantics with explicit attributes; absent attributes
    /// default to off, matching `Object.defineProperty`.
    pub fn define_property(
        &mut self,
        object: &Value,
        name: &str,
        value: Value,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    ) -> Result<(), Exception> {
        let Some(id) = object.as_object() else {
            return Err(Exception::type_error("Object.defineProperty called on non-object"));
        };
        let desc = Descriptor {
            value: Some(value),
            writable: Some(writable),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
            ..Descriptor::default()
        };
        self.heap
            .define_prop(id, name, &desc)
            .map_err(|err| self.run_error_to_exception(err, None))
    }

    /// Reads a property through the prototype chain. Accessor properties are
    /// not invocable from host context and produce a `TypeError`.
    pub fn get_property(&self, object: &Value, name: &str) -> Result<Value, Exception> {
        match self.heap.lookup(&self.realm, object, name) {
            Ok(PropLookup::Data(value)) => Ok(value),
            Ok(PropLookup::NotFound) => Ok(Value::Undefined),
            Ok(PropLookup::Accessor { .. }) => Err(Exception::type_error(format!(
                "property '{name}' has an accessor and cannot be read from host context"
            ))),
            Err(err) => Err(self.run_error_to_exception_ref(err)),
        }
    }

    /// Deep conversion of a host value into the interpreter's object graph.
    pub fn native_to_pseudo(&mut self, value: &HostValue) -> Result<Value, Exception> {
        let realm = self.realm.clone();
        host::native_to_pseudo(&mut self.heap, &realm, value).map_err(|err| self.run_error_to_exception(err, None))
    }

    /// Deep conversion of an interpreter value back into a host value.
    pub fn pseudo_to_native(&self, value: &Value) -> Result<HostValue, Exception> {
        host::pseudo_to_native(&self.heap, value)
    }

    // ---------------------------------------------------------------------
    // Crate-internal plumbing shared by the machine and the built-ins
    // ---------------------------------------------------------------------

    pub(crate) fn set_scope_strict(&mut self, scope: ObjId, strict: bool) {
        if let ObjKind::Scope(data) = &mut self.heap.get_mut(scope).kind {
            data.strict = strict;
        }
    }

    /// Allocates a function object with its `prototype`/`constructor` pair
    /// and `length` property.
    pub(crate) fn new_function_object(&mut self, body: FnBody, param_count: usize) -> crate::error::RunResult<ObjId> {
        let func = self.heap.alloc(JsObject::new(
            ObjKind::Function(Box::new(FnData { body })),
            Some(self.realm.function),
        ))?;
        let proto = self.heap.alloc(JsObject::new(ObjKind::Plain, Some(self.realm.object)))?;
        self.heap
            .get_mut(proto)
            .props
            .insert(Rc::from("constructor"), crate::heap::Property::builtin(Value::Object(func)));
        self.heap
            .get_mut(func)
            .props
            .insert(Rc::from("prototype"), crate::heap::Property::builtin(Value::Object(proto)));
        self.heap.get_mut(func).props.insert(
            Rc::from("length"),
            crate::heap::Property::frozen(Value::Number(param_count as f64)),
        );
        Ok(func)
    }

    /// Maps an internal error to the public exception type; uncaught thrown
    /// values are rendered through their error object when they have one.
    pub(crate) fn run_error_to_exception(&self, err: RunError, loc: Option<crate::error::CodeLoc>) -> Exception {
        self.run_error_to_exception_ref(err).with_loc(loc)
    }

    pub(crate) fn run_error_to_exception_ref(&self, err: RunError) -> Exception {
        match err {
            RunError::Thrown(value) => self.exception_from_value(&value),
            RunError::Pending { kind, message } => Exception::new(kind, message),
            RunError::Resource(err) => Exception::error(err.to_string()),
            RunError::Host(exc) => exc,
        }
    }

    /// Renders an uncaught thrown value as a host exception: a pseudo-Error
    /// maps to its own kind and message, anything else is stringified.
    pub(crate) fn exception_from_value(&self, value: &Value) -> Exception {
        if let Value::Object(id) = value
            && let Some(parent) = self.heap.get(*id).parent
            && let Some(kind) = self.realm.error_kind_of(parent)
        {
            let message = self
                .heap
                .get(*id)
                .props
                .get("message")
                .map(|prop| prop.value.to_js_string(&self.heap).to_string())
                .unwrap_or_default();
            return Exception::new(kind, message);
        }
        Exception::error(value.to_js_string(&self.heap).to_string())
    }

    /// Hoists `var` and function declarations of `body` into `scope`.
    pub(crate) fn hoist_into(&mut self, body: &[Stmt], scope_id: ObjId) -> crate::error::RunResult<()> {
        let hoisted = scope::hoist_collect(body);
        for name in &hoisted.vars {
            scope::declare(&mut self.heap, scope_id, name, None);
        }
        for node in hoisted.funcs {
            let func = self.create_closure(&node, scope_id)?;
            let name = node.name.as_ref().expect("function declarations are named");
            scope::declare(&mut self.heap, scope_id, name, Some(func));
        }
        Ok(())
    }

    /// Creates a closure over `scope` for a function literal.
    pub(crate) fn create_closure(
        &mut self,
        node: &Rc<crate::ast::FunctionNode>,
        scope_id: ObjId,
    ) -> crate::error::RunResult<Value> {
        let id = self.new_function_object(
            FnBody::Ast {
                node: Rc::clone(node),
                scope: scope_id,
            },
            node.params.len(),
        )?;
        Ok(Value::Object(id))
    }
}
