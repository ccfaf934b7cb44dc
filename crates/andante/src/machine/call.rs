//! Call and construction machinery: the `Call`/`PendingCall` steppers, the
//! function dispatch by body kind (user AST, native, asynchronous native,
//! bound, `eval`), and call-scope setup.

use std::rc::Rc;

use crate::{
    ast::FunctionNode,
    error::{RunError, RunResult},
    frame::{Args, CallStage, Frame, FrameKind, Outcome, PendingStage, RefSlot},
    heap::{FnBody, JsObject, ObjId, ObjKind},
    host::AsyncHandle,
    interp::Interpreter,
    machine::SlotRead,
    parse,
    scope,
    value::Value,
};

/// How a function dispatch proceeded.
pub(super) enum CallDispatch {
    /// Completed synchronously with a value.
    Done(Value),
    /// Frames were pushed; the result arrives through the register.
    Pushed,
    /// An asynchronous native is in flight; execution is paused.
    Paused,
}

impl Interpreter {
    pub(super) fn dispatch_call(&mut self, frame: Frame) -> RunResult<()> {
        let Frame { kind, label, span } = frame;
        let put = |kind| Frame { kind, label, span };
        match kind {
            FrameKind::Call { is_new, stage } => match stage {
                CallStage::Callee { callee, args } => {
                    // `new` takes the callee as a value; calls take it as a
                    // reference to capture the method receiver.
                    let components = !is_new;
                    self.frames.push(put(FrameKind::Call {
                        is_new,
                        stage: CallStage::CalleeDone { args },
                    }));
                    self.push_expr(&callee, components);
                }
                CallStage::CalleeDone { args } => {
                    let (func, this_value) = match self.take_reg() {
                        Outcome::Val(func) => (func, Value::Undefined),
                        Outcome::Reference(slot) => {
                            let this_value = match &slot {
                                RefSlot::Name(_) => Value::Undefined,
                                RefSlot::Member { base, .. } => base.clone(),
                            };
                            match self.get_slot(&slot)? {
                                SlotRead::Value(func) => (func, this_value),
                                SlotRead::Getter { getter, this_value } => {
                                    self.frames.push(put(FrameKind::Call {
                                        is_new,
                                        stage: CallStage::CalleeGetter {
                                            args,
                                            this_value: this_value.clone(),
                                        },
                                    }));
                                    self.push_pending_call(Value::Object(getter), this_value, Vec::new());
                                    return Ok(());
                                }
                            }
                        }
                    };
                    self.frames.push(put(FrameKind::Call {
                        is_new,
                        stage: CallStage::Args {
                            args,
                            index: 0,
                            func,
                            this_value,
                            values: Args::new(),
                        },
                    }));
                }
                CallStage::CalleeGetter { args, this_value } => {
                    let func = self.take_reg_value();
                    self.frames.push(put(FrameKind::Call {
                        is_new,
                        stage: CallStage::Args {
                            args,
                            index: 0,
                            func,
                            this_value,
                            values: Args::new(),
                        },
                    }));
                }
                CallStage::Args {
                    args,
                    index,
                    func,
                    mut this_value,
                    mut values,
                } => {
                    if self.reg.is_some() {
                        values.push(self.take_reg_value());
                    }
                    if index < args.len() {
                        let arg = args[index].clone();
                        self.frames.push(put(FrameKind::Call {
                            is_new,
                            stage: CallStage::Args {
                                args,
                                index: index + 1,
                                func,
                                this_value,
                                values,
                            },
                        }));
                        self.push_expr(&arg, false);
                        return Ok(());
                    }
                    let mut receiver = None;
                    if is_new {
                        let Some(ctor) = func.as_object().filter(|id| self.heap.get(*id).is_function()) else {
                            return Err(RunError::type_error(format!(
                                "{} is not a constructor",
                                func.to_js_string(&self.heap)
                            )));
                        };
                        let id = self.heap.alloc(JsObject::new(ObjKind::Plain, Some(ctor)))?;
                        this_value = Value::Object(id);
                        receiver = Some(this_value.clone());
                    }
                    self.frames.push(put(FrameKind::Call {
                        is_new,
                        stage: CallStage::Await { receiver },
                    }));
                    match self.call_function(&func, this_value, values, is_new)? {
                        CallDispatch::Done(result) => {
                            let awaiting = self.frames.pop().expect("await frame was just pushed");
                            self.finish_call(awaiting, result);
                        }
                        CallDispatch::Pushed | CallDispatch::Paused => {}
                    }
                }
                stage @ CallStage::Await { .. } => {
                    let result = self.take_reg_value();
                    let frame = put(FrameKind::Call { is_new, stage });
                    self.finish_call(frame, result);
                }
            },

            FrameKind::PendingCall {
                func,
                this_value,
                args,
                stage,
            } => match stage {
                PendingStage::Start => {
                    self.frames.push(put(FrameKind::PendingCall {
                        func: func.clone(),
                        this_value: this_value.clone(),
                        args: Args::new(),
                        stage: PendingStage::Await,
                    }));
                    match self.call_function(&func, this_value, args, false)? {
                        CallDispatch::Done(result) => {
                            self.frames.pop().expect("await frame was just pushed");
                            self.reg = Some(Outcome::Val(result));
                        }
                        CallDispatch::Pushed | CallDispatch::Paused => {}
                    }
                }
                PendingStage::Await => {
                    let result = self.take_reg_value();
                    self.reg = Some(Outcome::Val(result));
                }
            },

            other => unreachable!("dispatch_call received {:?}", other),
        }
        Ok(())
    }

    /// Completes a call frame: for `new`, a non-object return value is
    /// replaced with the receiver.
    fn finish_call(&mut self, frame: Frame, result: Value) {
        let result = match &frame.kind {
            FrameKind::Call {
                is_new: true,
                stage: CallStage::Await {
                    receiver: Some(receiver),
                },
            } if !result.is_object() => receiver.clone(),
            _ => result,
        };
        self.reg = Some(Outcome::Val(result));
    }

    /// Dispatches a resolved function with resolved arguments.
    ///
    /// Native functions run synchronously (and may push frames themselves,
    /// e.g. `Function.prototype.apply`); asynchronous natives pause the
    /// interpreter; user functions get a call scope and a body frame;
    /// `eval` runs over the caller's scope on the same stack.
    pub(super) fn call_function(
        &mut self,
        func: &Value,
        this_value: Value,
        args: impl Into<Args>,
        construct: bool,
    ) -> RunResult<CallDispatch> {
        let args: Args = args.into();
        let func_id = func
            .as_object()
            .filter(|id| self.heap.get(*id).is_function())
            .ok_or_else(|| {
                RunError::type_error(format!("{} is not a function", func.to_js_string(&self.heap)))
            })?;

        enum Plan {
            Ast { node: Rc<FunctionNode>, scope: ObjId },
            Native(crate::heap::NativeFn),
            Async(crate::heap::AsyncFn),
            Bound {
                target: ObjId,
                bound_this: Value,
                bound_args: Vec<Value>,
            },
            Eval,
        }

        let plan = match &self.heap.get(func_id).fn_data().expect("function object").body {
            FnBody::Ast { node, scope } => Plan::Ast {
                node: Rc::clone(node),
                scope: *scope,
            },
            FnBody::Native(f) => Plan::Native(Rc::clone(f)),
            FnBody::Async(f) => Plan::Async(Rc::clone(f)),
            FnBody::Bound {
                target,
                this_value,
                bound_args,
            } => Plan::Bound {
                target: *target,
                bound_this: this_value.clone(),
                bound_args: bound_args.clone(),
            },
            FnBody::Eval => Plan::Eval,
        };

        match plan {
            Plan::Bound {
                target,
                bound_this,
                bound_args,
            } => {
                let mut all_args = bound_args;
                all_args.extend(args);
                // Constructing through a bound function ignores the bound
                // `this` and keeps the fresh receiver.
                let this_value = if construct { this_value } else { bound_this };
                self.call_function(&Value::Object(target), this_value, all_args, construct)
            }
            Plan::Eval => self.call_eval(args),
            Plan::Native(f) => {
                let depth = self.frames.len();
                let result = f(self, this_value, &args).map_err(RunError::from)?;
                if self.frames.len() > depth {
                    Ok(CallDispatch::Pushed)
                } else {
                    Ok(CallDispatch::Done(result))
                }
            }
            Plan::Async(f) => {
                let handle = AsyncHandle::new();
                self.mailbox = Some(handle.slot());
                self.paused = true;
                self.tracer.borrow_mut().on_pause();
                match f(self, this_value, &args, handle) {
                    Ok(()) => Ok(CallDispatch::Paused),
                    Err(exc) => {
                        self.paused = false;
                        self.mailbox = None;
                        Err(RunError::from(exc))
                    }
                }
            }
            Plan::Ast { node, scope } => {
                let strict = node.strict || scope::scope_strict(&self.heap, scope);
                let this_value = match this_value {
                    // Sloppy-mode calls with no receiver get the global
                    // object.
                    Value::Undefined | Value::Null if !strict => Value::Object(self.realm.global),
                    other => other,
                };
                let call_scope = scope::new_scope(&mut self.heap, Some(scope), strict)?;
                if let Some(name) = &node.name {
                    // Named function expressions see their own name.
                    scope::declare(&mut self.heap, call_scope, name, Some(func.clone()));
                }
                let args_array = self.realm.array;
                let arguments = self.heap.alloc(JsObject::new(ObjKind::Array { length: 0 }, Some(args_array)))?;
                for arg in &args {
                    self.heap.array_push(arguments, arg.clone());
                }
                scope::declare(&mut self.heap, call_scope, "arguments", Some(Value::Object(arguments)));
                for (index, param) in node.params.iter().enumerate() {
                    let value = args.get(index).cloned().unwrap_or(Value::Undefined);
                    scope::declare(&mut self.heap, call_scope, param, Some(value));
                }
                self.hoist_into(&node.body, call_scope)?;
                self.tracer.borrow_mut().on_call(self.frames.len());
                self.frames.push(Frame::new(
                    FrameKind::FunctionBody {
                        body: Rc::clone(&node.body),
                        index: 0,
                        scope: call_scope,
                        this_value,
                    },
                    node.span,
                ));
                Ok(CallDispatch::Pushed)
            }
        }
    }

    /// The `eval` built-in: parse the argument, hoist into the caller's
    /// scope, and run the body over the same stack. Non-string arguments
    /// pass through unchanged.
    fn call_eval(&mut self, args: Args) -> RunResult<CallDispatch> {
        let arg = args.into_iter().next().unwrap_or(Value::Undefined);
        let Value::String(src) = arg else {
            return Ok(CallDispatch::Done(arg));
        };
        let parsed = parse::parse_program(&src, false).map_err(|err| RunError::syntax_error(err.message))?;
        let caller_scope = self.current_scope();
        let this_value = self.current_this();
        // Strict eval code gets its own scope so its bindings do not leak
        // into the caller.
        let scope_id = if parsed.strict {
            scope::new_scope(&mut self.heap, Some(caller_scope), true)?
        } else {
            caller_scope
        };
        self.hoist_into(&parsed.body, scope_id)?;
        self.frames.push(Frame::new(
            FrameKind::EvalBody {
                body: parsed.body.into(),
                index: 0,
                scope: scope_id,
                this_value,
                value: Value::Undefined,
            },
            None,
        ));
        Ok(CallDispatch::Pushed)
    }
}
