//! The stepwise evaluation machine: the `step()`/`run()` driver, frame
//! pushing, reference resolution and the unwinding machinery shared by
//! `throw`, `break`, `continue` and `return`.

mod call;
mod expr;
mod stmt;

use std::rc::Rc;

use crate::{
    ast::{Expr, ExprKind, ForInit, Span, Stmt, StmtKind},
    error::{CodeLoc, Exception, RunError, RunResult},
    frame::{
        AssignStage, BinaryStage, CallStage, ForInStage, ForStage, Frame, FrameKind, LogicalStage, LoopStage,
        MemberStage, Outcome,
        PendingStage, RefSlot, SwitchStage, TryStage, UnaryStage, Unwind, UpdateStage, WithStage,
    },
    heap::{JsObject, ObjId, ObjKind, PropLookup, SetOutcome},
    host::AsyncOutcome,
    interp::Interpreter,
    scope::{self, AssignOutcome, NameLookup},
    value::Value,
};

/// Result of resolving a reference slot for reading.
#[derive(Debug)]
pub(crate) enum SlotRead {
    Value(Value),
    /// A getter must be dispatched with the given receiver.
    Getter { getter: ObjId, this_value: Value },
}

fn label_matches(frame: &Frame, label: Option<&Rc<str>>) -> bool {
    match label {
        None => true,
        Some(label) => frame.label.as_deref() == Some(&**label),
    }
}

fn set_try_stage(frame: &mut Frame, new_stage: TryStage) {
    if let FrameKind::Try { stage, .. } = &mut frame.kind {
        *stage = new_stage;
    }
}

impl Interpreter {
    /// Advances the interpreter by one node event.
    ///
    /// Returns `false` iff the program is complete. Polyfill frames (nodes
    /// with no span) are stepped through transparently, so a driver never
    /// observes them. While paused on an asynchronous native with an
    /// unresolved mailbox this is a no-op returning `true`.
    pub fn step(&mut self) -> Result<bool, Exception> {
        if self.paused && !self.deliver_async()? {
            return Ok(!self.done);
        }
        if self.done {
            return Ok(false);
        }
        loop {
            if let Err(err) = self.heap.tracker_mut().check_step() {
                self.done = true;
                return Err(Exception::error(err.to_string()));
            }
            let Some(frame) = self.frames.pop() else {
                self.done = true;
                return Ok(false);
            };
            self.tracer.borrow_mut().on_step(frame.kind_name(), frame.span);
            let span = frame.span;
            if let Err(err) = self.dispatch(frame) {
                self.handle_error(err, span)?;
            }
            if self.done || self.paused {
                return Ok(!self.done);
            }
            // Skip heuristic: keep stepping while the pending work has no
            // source position (polyfill code and synthesized frames).
            match self.frames.last() {
                Some(frame) if frame.span.is_none() => {}
                _ => return Ok(true),
            }
        }
    }

    /// Drives the program until completion or until an asynchronous native
    /// pauses execution. Returns the paused flag.
    pub fn run(&mut self) -> Result<bool, Exception> {
        loop {
            if self.paused && !self.deliver_async()? {
                return Ok(true);
            }
            if !self.step()? {
                return Ok(false);
            }
            if self.paused {
                return Ok(true);
            }
        }
    }

    /// Routes a frame to its stepper.
    fn dispatch(&mut self, frame: Frame) -> RunResult<()> {
        match &frame.kind {
            FrameKind::Program { .. }
            | FrameKind::EvalBody { .. }
            | FrameKind::FunctionBody { .. }
            | FrameKind::ScopedBlock { .. }
            | FrameKind::Block { .. }
            | FrameKind::ExprStmt { .. }
            | FrameKind::VarDecl { .. }
            | FrameKind::If { .. }
            | FrameKind::While { .. }
            | FrameKind::For { .. }
            | FrameKind::ForIn { .. }
            | FrameKind::Switch { .. }
            | FrameKind::Try { .. }
            | FrameKind::Throw { .. }
            | FrameKind::Return { .. }
            | FrameKind::BreakStmt { .. }
            | FrameKind::ContinueStmt { .. }
            | FrameKind::With { .. } => self.dispatch_stmt(frame),
            FrameKind::Call { .. } | FrameKind::PendingCall { .. } => self.dispatch_call(frame),
            _ => self.dispatch_expr(frame),
        }
    }

    /// Polls the completion mailbox; returns whether progress was made.
    fn deliver_async(&mut self) -> Result<bool, Exception> {
        let outcome = self.mailbox.as_ref().and_then(|slot| slot.borrow_mut().take());
        match outcome {
            None => Ok(false),
            Some(AsyncOutcome::Resolved(value)) => {
                self.paused = false;
                self.mailbox = None;
                self.reg = Some(Outcome::Val(value));
                Ok(true)
            }
            Some(AsyncOutcome::Rejected(exc)) => {
                self.paused = false;
                self.mailbox = None;
                self.handle_error(RunError::from(exc), None)?;
                Ok(true)
            }
        }
    }

    /// Turns a stepper error into unwinding (catchable throws) or a host
    /// exception (everything else).
    fn handle_error(&mut self, err: RunError, span: Option<Span>) -> Result<(), Exception> {
        let loc = span.map(|span| CodeLoc::from_offset(&self.source, span.start));
        let thrown = match err {
            RunError::Thrown(value) => value,
            RunError::Pending { kind, message } => {
                self.tracer.borrow_mut().on_throw(&message);
                match self.make_error_value(kind, &message) {
                    Ok(value) => value,
                    Err(err) => {
                        self.done = true;
                        return Err(self.run_error_to_exception(err, loc));
                    }
                }
            }
            RunError::Resource(resource) => {
                self.done = true;
                return Err(Exception::error(resource.to_string()).with_loc(loc));
            }
            RunError::Host(exc) => {
                self.done = true;
                return Err(exc.with_loc(loc));
            }
        };
        if let Err(err) = self.unwind(Unwind::Throw(thrown)) {
            self.done = true;
            return Err(self.run_error_to_exception(err, loc));
        }
        Ok(())
    }

    /// Builds an error object of the given kind, as `new Kind(message)`.
    pub(crate) fn make_error_value(&mut self, kind: crate::ErrorKind, message: &str) -> RunResult<Value> {
        let ctor = self.realm.error_ctor(kind);
        let id = self.heap.alloc(JsObject::new(ObjKind::Plain, Some(ctor)))?;
        if !message.is_empty() {
            self.heap.insert_data_prop(id, "message", Value::string(message));
        }
        Ok(Value::Object(id))
    }

    // ------------------------------------------------------------------
    // Unwinding
    // ------------------------------------------------------------------

    /// Pops frames until the unwind reason finds its target, running
    /// `finally` blocks encountered on the way. `break`/`continue` with no
    /// matching target, `return` outside a call and uncaught throws at the
    /// bottom of the stack are host-level errors.
    pub(crate) fn unwind(&mut self, reason: Unwind) -> RunResult<()> {
        self.reg = None;
        loop {
            let Some(mut frame) = self.frames.pop() else {
                return Err(self.unmatched_unwind(&reason));
            };
            match &frame.kind {
                FrameKind::Try {
                    handler,
                    finalizer,
                    stage,
                    ..
                } => {
                    let enter_catch =
                        matches!(reason, Unwind::Throw(_)) && matches!(stage, TryStage::Block) && handler.is_some();
                    let finalizer_pending = !matches!(stage, TryStage::Finalizer { .. }) && finalizer.is_some();
                    if enter_catch {
                        // Enter the catch clause: a fresh scope binding the
                        // exception name, no re-hoisting.
                        let clause = Rc::clone(handler.as_ref().expect("checked above"));
                        let Unwind::Throw(value) = &reason else { unreachable!() };
                        let value = value.clone();
                        // The try frame is already popped, so the current
                        // scope is the one enclosing it.
                        let parent = self.current_scope();
                        let strict = scope::scope_strict(&self.heap, parent);
                        let catch_scope = scope::new_scope(&mut self.heap, Some(parent), strict)?;
                        scope::declare(&mut self.heap, catch_scope, &clause.param, Some(value));
                        set_try_stage(&mut frame, TryStage::Handler);
                        self.frames.push(frame);
                        self.frames.push(Frame::new(
                            FrameKind::ScopedBlock {
                                body: Rc::clone(&clause.body),
                                index: 0,
                                scope: catch_scope,
                            },
                            None,
                        ));
                        return Ok(());
                    }
                    // No handler applies here: run the finalizer if it has
                    // not run yet, parking the unwind reason on the frame.
                    if finalizer_pending {
                        let body = match &frame.kind {
                            FrameKind::Try {
                                finalizer: Some(body), ..
                            } => Rc::clone(body),
                            _ => unreachable!(),
                        };
                        set_try_stage(
                            &mut frame,
                            TryStage::Finalizer {
                                pending: Some(reason),
                            },
                        );
                        self.frames.push(frame);
                        self.frames.push(Frame::new(FrameKind::Block { body, index: 0 }, None));
                        return Ok(());
                    }
                }
                FrameKind::Call {
                    stage: CallStage::Await { .. },
                    ..
                }
                | FrameKind::PendingCall {
                    stage: PendingStage::Await,
                    ..
                } => match &reason {
                    Unwind::Return(value) => {
                        self.tracer.borrow_mut().on_return(self.frames.len());
                        self.reg = Some(Outcome::Val(value.clone()));
                        self.frames.push(frame);
                        return Ok(());
                    }
                    // Exceptions propagate out of calls normally; loop
                    // control crossing a call boundary is a syntax error the
                    // parser missed.
                    Unwind::Throw(_) => {}
                    Unwind::Break(_) | Unwind::Continue(_) => {
                        return Err(self.unmatched_unwind(&reason));
                    }
                },
                _ if frame.is_loop() => match &reason {
                    Unwind::Break(label) if label_matches(&frame, label.as_ref()) => return Ok(()),
                    Unwind::Continue(label) if label_matches(&frame, label.as_ref()) => {
                        self.continue_loop(frame);
                        return Ok(());
                    }
                    _ => {}
                },
                _ if frame.is_switch() => {
                    if let Unwind::Break(label) = &reason
                        && label_matches(&frame, label.as_ref())
                    {
                        return Ok(());
                    }
                }
                // A labeled statement (e.g. a labeled block) is a valid
                // `break label;` target.
                _ => {
                    if let Unwind::Break(Some(label)) = &reason
                        && frame.label.as_deref() == Some(&**label)
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn unmatched_unwind(&self, reason: &Unwind) -> RunError {
        match reason {
            Unwind::Throw(value) => RunError::Host(self.exception_from_value(value)),
            Unwind::Break(_) => RunError::Host(Exception::syntax_error("Illegal break statement")),
            Unwind::Continue(_) => RunError::Host(Exception::syntax_error("Illegal continue statement")),
            Unwind::Return(_) => RunError::Host(Exception::syntax_error("Illegal return statement")),
        }
    }

    /// Re-enters a loop frame at its continue point.
    fn continue_loop(&mut self, mut frame: Frame) {
        match &mut frame.kind {
            FrameKind::While { stage, test, .. } => {
                *stage = LoopStage::Test;
                let test = test.clone();
                self.frames.push(frame);
                self.push_expr(&test, false);
            }
            FrameKind::For { stage, .. } => {
                // As if the body had completed: the update clause runs next.
                *stage = ForStage::Body;
                self.frames.push(frame);
            }
            FrameKind::ForIn { stage, .. } => {
                *stage = ForInStage::NextKey;
                self.frames.push(frame);
            }
            _ => unreachable!("continue target must be a loop frame"),
        }
    }

    // ------------------------------------------------------------------
    // Frame stack helpers
    // ------------------------------------------------------------------

    pub(crate) fn current_scope(&self) -> ObjId {
        for frame in self.frames.iter().rev() {
            match &frame.kind {
                FrameKind::FunctionBody { scope, .. }
                | FrameKind::EvalBody { scope, .. }
                | FrameKind::ScopedBlock { scope, .. }
                | FrameKind::With { scope: Some(scope), .. } => return *scope,
                FrameKind::Program { .. } => return self.realm.global,
                _ => {}
            }
        }
        self.realm.global
    }

    pub(crate) fn current_this(&self) -> Value {
        for frame in self.frames.iter().rev() {
            match &frame.kind {
                FrameKind::FunctionBody { this_value, .. } | FrameKind::EvalBody { this_value, .. } => {
                    return this_value.clone();
                }
                FrameKind::Program { .. } => return Value::Object(self.realm.global),
                _ => {}
            }
        }
        Value::Object(self.realm.global)
    }

    pub(crate) fn current_strict(&self) -> bool {
        scope::scope_strict(&self.heap, self.current_scope())
    }

    pub(crate) fn take_reg(&mut self) -> Outcome {
        self.reg.take().expect("stepper expected a result in the register")
    }

    pub(crate) fn take_reg_value(&mut self) -> Value {
        match self.take_reg() {
            Outcome::Val(value) => value,
            Outcome::Reference(_) => unreachable!("stepper expected a value, found a reference"),
        }
    }

    pub(crate) fn take_reg_slot(&mut self) -> RefSlot {
        match self.take_reg() {
            Outcome::Reference(slot) => slot,
            Outcome::Val(_) => unreachable!("stepper expected a reference, found a value"),
        }
    }

    /// Writes the result of a completed top-level expression statement: into
    /// the nearest `eval` body if one is running, else the interpreter's
    /// observable `value` field.
    pub(crate) fn finish_statement_value(&mut self, result: Value) {
        for frame in self.frames.iter_mut().rev() {
            match &mut frame.kind {
                FrameKind::EvalBody { value, .. } => {
                    *value = result;
                    return;
                }
                FrameKind::FunctionBody { .. } => break,
                _ => {}
            }
        }
        self.last_value = result;
    }

    /// Pushes the frame for a statement. Labels wrap their body frame;
    /// empty, debugger and (already hoisted) function declarations cost no
    /// frame at all.
    pub(crate) fn push_stmt(&mut self, stmt: &Stmt) {
        let mut label = None;
        let mut current = stmt;
        while let StmtKind::Labeled { label: name, body } = &current.kind {
            // Only the outermost label is addressable; nesting several
            // labels on one statement shares the frame.
            if label.is_none() {
                label = Some(Rc::clone(name));
            }
            current = body;
        }
        if let Some(frame) = Self::stmt_frame(current) {
            self.frames.push(frame.with_label(label));
        }
    }

    fn stmt_frame(stmt: &Stmt) -> Option<Frame> {
        let span = stmt.span;
        let kind = match &stmt.kind {
            StmtKind::Empty | StmtKind::Debugger | StmtKind::FunctionDecl(_) | StmtKind::Labeled { .. } => return None,
            StmtKind::Expression(expr) => FrameKind::ExprStmt {
                expr: expr.clone(),
                started: false,
            },
            StmtKind::VarDecl(decls) => FrameKind::VarDecl {
                decls: Rc::clone(decls),
                index: 0,
                pending: None,
            },
            StmtKind::Block(body) => FrameKind::Block {
                body: Rc::clone(body),
                index: 0,
            },
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => FrameKind::If {
                test: test.clone(),
                consequent: consequent.clone(),
                alternate: alternate.clone(),
                started: false,
            },
            StmtKind::While { test, body } => FrameKind::While {
                test: test.clone(),
                body: body.clone(),
                is_do: false,
                stage: LoopStage::Enter,
            },
            StmtKind::DoWhile { body, test } => FrameKind::While {
                test: test.clone(),
                body: body.clone(),
                is_do: true,
                stage: LoopStage::Enter,
            },
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => FrameKind::For {
                init: init.as_ref().map(|init| match init {
                    ForInit::Decl(decls) => ForInit::Decl(Rc::clone(decls)),
                    ForInit::Expr(expr) => ForInit::Expr(expr.clone()),
                }),
                test: test.clone(),
                update: update.clone(),
                body: body.clone(),
                stage: ForStage::Start,
            },
            StmtKind::ForIn { left, right, body } => FrameKind::ForIn {
                left: left.clone(),
                right: right.clone(),
                body: body.clone(),
                stage: ForInStage::Start,
                object: Value::Undefined,
                keys: Vec::new(),
                key_index: 0,
                visited: ahash::AHashSet::new(),
            },
            StmtKind::Switch { discriminant, cases } => FrameKind::Switch {
                discriminant: discriminant.clone(),
                cases: Rc::clone(cases),
                stage: SwitchStage::Start,
                disc: Value::Undefined,
                case_index: 0,
                default_index: None,
                exec_case: 0,
                exec_index: 0,
            },
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => FrameKind::Try {
                block: Rc::clone(block),
                handler: handler.clone(),
                finalizer: finalizer.clone(),
                stage: TryStage::Start,
            },
            StmtKind::Throw(expr) => FrameKind::Throw {
                expr: expr.clone(),
                started: false,
            },
            StmtKind::Return(arg) => FrameKind::Return {
                arg: arg.clone(),
                started: false,
            },
            StmtKind::Break(target) => FrameKind::BreakStmt { target: target.clone() },
            StmtKind::Continue(target) => FrameKind::ContinueStmt { target: target.clone() },
            StmtKind::With { object, body } => FrameKind::With {
                object: object.clone(),
                body: body.clone(),
                stage: WithStage::Start,
                scope: None,
            },
        };
        Some(Frame::new(kind, span))
    }

    /// Pushes the frame for an expression. `components` asks the child to
    /// yield a reference instead of a loaded value.
    pub(crate) fn push_expr(&mut self, expr: &Expr, components: bool) {
        let span = expr.span;
        let kind = match &expr.kind {
            ExprKind::Identifier(name) => FrameKind::Ident {
                name: Rc::clone(name),
                components,
                awaiting: false,
            },
            ExprKind::Member { object, property } => FrameKind::Member {
                object: object.clone(),
                property: property.clone(),
                components,
                stage: MemberStage::Start,
            },
            ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Null
            | ExprKind::Regex { .. }
            | ExprKind::This
            | ExprKind::Function(_) => FrameKind::Leaf { expr: expr.clone() },
            ExprKind::Array(elements) => FrameKind::ArrayLit {
                elements: Rc::clone(elements),
                index: 0,
                target: None,
            },
            ExprKind::Object(props) => FrameKind::ObjectLit {
                props: Rc::clone(props),
                index: 0,
                target: None,
            },
            ExprKind::Call { callee, args } => FrameKind::Call {
                is_new: false,
                stage: CallStage::Callee {
                    callee: callee.clone(),
                    args: Rc::clone(args),
                },
            },
            ExprKind::New { callee, args } => FrameKind::Call {
                is_new: true,
                stage: CallStage::Callee {
                    callee: callee.clone(),
                    args: Rc::clone(args),
                },
            },
            ExprKind::Unary { op, argument } => FrameKind::Unary {
                op: *op,
                argument: argument.clone(),
                stage: UnaryStage::Start,
            },
            ExprKind::Update { op, prefix, target } => FrameKind::Update {
                op: *op,
                prefix: *prefix,
                target: target.clone(),
                stage: UpdateStage::Start,
            },
            ExprKind::Binary { op, left, right } => FrameKind::Binary {
                op: *op,
                left: left.clone(),
                right: right.clone(),
                stage: BinaryStage::Start,
            },
            ExprKind::Logical { op, left, right } => FrameKind::Logical {
                op: *op,
                left: left.clone(),
                right: right.clone(),
                stage: LogicalStage::Start,
            },
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => FrameKind::Conditional {
                test: test.clone(),
                consequent: consequent.clone(),
                alternate: alternate.clone(),
                started: false,
            },
            ExprKind::Assign { op, target, value } => FrameKind::Assign {
                op: *op,
                target: target.clone(),
                value: value.clone(),
                stage: AssignStage::Start,
            },
            ExprKind::Sequence(exprs) => FrameKind::Sequence {
                exprs: Rc::clone(exprs),
                index: 0,
            },
        };
        self.frames.push(Frame::new(kind, span));
    }

    pub(crate) fn push_pending_call(&mut self, func: Value, this_value: Value, args: impl Into<crate::frame::Args>) {
        self.frames.push(Frame::new(
            FrameKind::PendingCall {
                func,
                this_value,
                args: args.into(),
                stage: PendingStage::Start,
            },
            None,
        ));
    }

    // ------------------------------------------------------------------
    // Reference slots
    // ------------------------------------------------------------------

    /// Loads a slot. Unbound names throw `ReferenceError`; missing
    /// properties read as `undefined`.
    pub(crate) fn get_slot(&mut self, slot: &RefSlot) -> RunResult<SlotRead> {
        match slot {
            RefSlot::Name(name) => {
                let scope = self.current_scope();
                match scope::lookup_name(&self.heap, &self.realm, scope, name)? {
                    NameLookup::NotFound => Err(RunError::reference_error(format!("{name} is not defined"))),
                    NameLookup::Data(value) => Ok(SlotRead::Value(value)),
                    NameLookup::Accessor { getter, this_value } => Ok(match getter {
                        Some(getter) => SlotRead::Getter { getter, this_value },
                        None => SlotRead::Value(Value::Undefined),
                    }),
                }
            }
            RefSlot::Member { base, key } => match self.heap.lookup(&self.realm, base, key)? {
                PropLookup::NotFound => Ok(SlotRead::Value(Value::Undefined)),
                PropLookup::Data(value) => Ok(SlotRead::Value(value)),
                PropLookup::Accessor { getter } => Ok(match getter {
                    Some(getter) => SlotRead::Getter {
                        getter,
                        this_value: base.clone(),
                    },
                    None => SlotRead::Value(Value::Undefined),
                }),
            },
        }
    }

    /// Stores into a slot; a returned pair is a setter to invoke with the
    /// value.
    pub(crate) fn store_slot(&mut self, slot: &RefSlot, value: Value) -> RunResult<Option<(ObjId, Value)>> {
        let strict = self.current_strict();
        match slot {
            RefSlot::Name(name) => {
                let scope = self.current_scope();
                let realm = self.realm.clone();
                match scope::assign_name(&mut self.heap, &realm, scope, name, value, strict)? {
                    AssignOutcome::Done => Ok(None),
                    AssignOutcome::Setter { setter, this_value } => Ok(Some((setter, this_value))),
                }
            }
            RefSlot::Member { base, key } => match self.heap.set_prop(base, key, value, strict)? {
                SetOutcome::Done => Ok(None),
                SetOutcome::Setter(setter) => Ok(Some((setter, base.clone()))),
            },
        }
    }

    /// The `delete` operator over a slot.
    pub(crate) fn delete_slot(&mut self, slot: &RefSlot) -> RunResult<bool> {
        let strict = self.current_strict();
        match slot {
            RefSlot::Name(name) => {
                let mut current = Some(self.current_scope());
                while let Some(scope_id) = current {
                    let data = self.heap.get(scope_id).scope_data().expect("scope object expected");
                    let parent = data.parent;
                    if data.with_object.is_none() && self.heap.get(scope_id).props.contains_key(name.as_ref()) {
                        return self.heap.delete_prop(&Value::Object(scope_id), name, strict);
                    }
                    current = parent;
                }
                Ok(true)
            }
            RefSlot::Member { base, key } => self.heap.delete_prop(base, key, strict),
        }
    }

    /// ToObject: boxes primitives, passes objects through, rejects
    /// `undefined`/`null`.
    pub(crate) fn to_object(&mut self, value: &Value) -> RunResult<ObjId> {
        match value {
            Value::Object(id) => Ok(*id),
            Value::Number(n) => {
                let number = self.realm.number;
                self.heap.alloc(JsObject::new(ObjKind::BoxedNumber(*n), Some(number)))
            }
            Value::String(s) => {
                let string = self.realm.string;
                self.heap
                    .alloc(JsObject::new(ObjKind::BoxedString(Rc::clone(s)), Some(string)))
            }
            Value::Boolean(b) => {
                let boolean = self.realm.boolean;
                self.heap.alloc(JsObject::new(ObjKind::BoxedBoolean(*b), Some(boolean)))
            }
            Value::Undefined | Value::Null => {
                Err(RunError::type_error("Cannot convert undefined or null to object"))
            }
        }
    }
}
