//! Statement steppers.
//!
//! Each stepper is a progression: on first entry it initializes its state
//! and pushes a child frame; on re-entry it consumes the register (the
//! child's result) and either pushes the next child or pops itself.

use std::rc::Rc;

use crate::{
    ast::ForInit,
    error::{RunError, RunResult},
    frame::{ForInStage, ForStage, Frame, FrameKind, LoopStage, RefSlot, SwitchStage, TryStage, Unwind, WithStage},
    interp::Interpreter,
    value::Value,
};

impl Interpreter {
    pub(super) fn dispatch_stmt(&mut self, frame: Frame) -> RunResult<()> {
        let Frame { kind, label, span } = frame;
        let put = |kind| Frame { kind, label, span };
        match kind {
            FrameKind::Program { index } => {
                self.reg = None;
                if index < self.program.len() {
                    let stmt = Rc::clone(&self.program[index]);
                    self.frames.push(put(FrameKind::Program { index: index + 1 }));
                    self.push_stmt(&stmt);
                } else {
                    // The program frame stays so appended code can extend it.
                    self.frames.push(put(FrameKind::Program { index }));
                    self.done = true;
                }
            }

            FrameKind::EvalBody {
                body,
                index,
                scope,
                this_value,
                value,
            } => {
                self.reg = None;
                if index < body.len() {
                    let stmt = Rc::clone(&body[index]);
                    self.frames.push(put(FrameKind::EvalBody {
                        body,
                        index: index + 1,
                        scope,
                        this_value,
                        value,
                    }));
                    self.push_stmt(&stmt);
                } else {
                    self.reg = Some(crate::frame::Outcome::Val(value));
                }
            }

            FrameKind::FunctionBody {
                body,
                index,
                scope,
                this_value,
            } => {
                self.reg = None;
                if index < body.len() {
                    let stmt = Rc::clone(&body[index]);
                    self.frames.push(put(FrameKind::FunctionBody {
                        body,
                        index: index + 1,
                        scope,
                        this_value,
                    }));
                    self.push_stmt(&stmt);
                } else {
                    // Fell off the end: the call completes with undefined.
                    self.tracer.borrow_mut().on_return(self.frames.len());
                    self.reg = Some(crate::frame::Outcome::Val(Value::Undefined));
                }
            }

            FrameKind::ScopedBlock { body, index, scope } => {
                self.reg = None;
                if index < body.len() {
                    let stmt = Rc::clone(&body[index]);
                    self.frames.push(put(FrameKind::ScopedBlock {
                        body,
                        index: index + 1,
                        scope,
                    }));
                    self.push_stmt(&stmt);
                }
            }

            FrameKind::Block { body, index } => {
                self.reg = None;
                if index < body.len() {
                    let stmt = Rc::clone(&body[index]);
                    self.frames.push(put(FrameKind::Block { body, index: index + 1 }));
                    self.push_stmt(&stmt);
                }
            }

            FrameKind::ExprStmt { expr, started } => {
                if started {
                    let value = self.take_reg_value();
                    self.finish_statement_value(value);
                } else {
                    self.frames.push(put(FrameKind::ExprStmt {
                        expr: expr.clone(),
                        started: true,
                    }));
                    self.push_expr(&expr, false);
                }
            }

            FrameKind::VarDecl { decls, index, pending } => {
                if let Some(name) = pending {
                    let value = self.take_reg_value();
                    let slot = RefSlot::Name(name);
                    if let Some((setter, this_value)) = self.store_slot(&slot, value.clone())? {
                        self.frames.push(put(FrameKind::VarDecl {
                            decls,
                            index,
                            pending: None,
                        }));
                        self.push_pending_call(Value::Object(setter), this_value, vec![value]);
                        return Ok(());
                    }
                    self.frames.push(put(FrameKind::VarDecl {
                        decls,
                        index,
                        pending: None,
                    }));
                    return Ok(());
                }
                self.reg = None;
                if index < decls.len() {
                    let name = Rc::clone(&decls[index].name);
                    let init = decls[index].init.clone();
                    match init {
                        Some(init) => {
                            self.frames.push(put(FrameKind::VarDecl {
                                decls,
                                index: index + 1,
                                pending: Some(name),
                            }));
                            self.push_expr(&init, false);
                        }
                        None => {
                            self.frames.push(put(FrameKind::VarDecl {
                                decls,
                                index: index + 1,
                                pending: None,
                            }));
                        }
                    }
                }
            }

            FrameKind::If {
                test,
                consequent,
                alternate,
                started,
            } => {
                if started {
                    if self.take_reg_value().to_boolean() {
                        self.push_stmt(&consequent);
                    } else if let Some(alternate) = &alternate {
                        self.push_stmt(alternate);
                    }
                } else {
                    self.frames.push(put(FrameKind::If {
                        test: test.clone(),
                        consequent,
                        alternate,
                        started: true,
                    }));
                    self.push_expr(&test, false);
                }
            }

            FrameKind::While {
                test,
                body,
                is_do,
                stage,
            } => match stage {
                LoopStage::Enter => {
                    if is_do {
                        // do-while runs its body once before the first test.
                        let body_stmt = body.clone();
                        self.frames.push(put(FrameKind::While {
                            test,
                            body,
                            is_do,
                            stage: LoopStage::Body,
                        }));
                        self.push_stmt(&body_stmt);
                    } else {
                        let test_expr = test.clone();
                        self.frames.push(put(FrameKind::While {
                            test,
                            body,
                            is_do,
                            stage: LoopStage::Test,
                        }));
                        self.push_expr(&test_expr, false);
                    }
                }
                LoopStage::Test => {
                    if self.take_reg_value().to_boolean() {
                        let body_stmt = body.clone();
                        self.frames.push(put(FrameKind::While {
                            test,
                            body,
                            is_do,
                            stage: LoopStage::Body,
                        }));
                        self.push_stmt(&body_stmt);
                    }
                }
                LoopStage::Body => {
                    self.reg = None;
                    let test_expr = test.clone();
                    self.frames.push(put(FrameKind::While {
                        test,
                        body,
                        is_do,
                        stage: LoopStage::Test,
                    }));
                    self.push_expr(&test_expr, false);
                }
            },

            FrameKind::For {
                init,
                test,
                update,
                body,
                stage,
            } => {
                self.step_for(put, init, test, update, body, stage)?;
            }

            FrameKind::ForIn {
                left,
                right,
                body,
                stage,
                object,
                keys,
                key_index,
                visited,
            } => {
                self.step_for_in(put, left, right, body, stage, object, keys, key_index, visited)?;
            }

            FrameKind::Switch {
                discriminant,
                cases,
                stage,
                disc,
                case_index,
                default_index,
                exec_case,
                exec_index,
            } => {
                self.step_switch(
                    put,
                    discriminant,
                    cases,
                    stage,
                    disc,
                    case_index,
                    default_index,
                    exec_case,
                    exec_index,
                )?;
            }

            FrameKind::Try {
                block,
                handler,
                finalizer,
                stage,
            } => match stage {
                TryStage::Start => {
                    let body = Rc::clone(&block);
                    self.frames.push(put(FrameKind::Try {
                        block,
                        handler,
                        finalizer,
                        stage: TryStage::Block,
                    }));
                    self.frames.push(Frame::new(FrameKind::Block { body, index: 0 }, None));
                }
                // The block or the catch clause completed normally.
                TryStage::Block | TryStage::Handler => {
                    if let Some(body) = finalizer.clone() {
                        self.frames.push(put(FrameKind::Try {
                            block,
                            handler,
                            finalizer,
                            stage: TryStage::Finalizer { pending: None },
                        }));
                        self.frames.push(Frame::new(FrameKind::Block { body, index: 0 }, None));
                    }
                }
                TryStage::Finalizer { pending } => {
                    if let Some(reason) = pending {
                        // The finalizer completed normally: resume whatever
                        // unwind it interrupted.
                        self.unwind(reason)?;
                    }
                }
            },

            FrameKind::Throw { expr, started } => {
                if started {
                    let value = self.take_reg_value();
                    return Err(RunError::Thrown(value));
                }
                self.frames.push(put(FrameKind::Throw {
                    expr: expr.clone(),
                    started: true,
                }));
                self.push_expr(&expr, false);
            }

            FrameKind::Return { arg, started } => {
                if started {
                    let value = self.take_reg_value();
                    self.unwind(Unwind::Return(value))?;
                } else {
                    match arg {
                        Some(arg) => {
                            self.frames.push(put(FrameKind::Return {
                                arg: Some(arg.clone()),
                                started: true,
                            }));
                            self.push_expr(&arg, false);
                        }
                        None => self.unwind(Unwind::Return(Value::Undefined))?,
                    }
                }
            }

            FrameKind::BreakStmt { target } => self.unwind(Unwind::Break(target))?,
            FrameKind::ContinueStmt { target } => self.unwind(Unwind::Continue(target))?,

            FrameKind::With {
                object,
                body,
                stage,
                scope,
            } => match stage {
                WithStage::Start => {
                    let object_expr = object.clone();
                    self.frames.push(put(FrameKind::With {
                        object,
                        body,
                        stage: WithStage::Object,
                        scope,
                    }));
                    self.push_expr(&object_expr, false);
                }
                WithStage::Object => {
                    let target = self.take_reg_value();
                    let target_id = self.to_object(&target)?;
                    let parent = self.current_scope();
                    let with_scope = crate::scope::new_with_scope(&mut self.heap, parent, target_id)?;
                    let body_stmt = body.clone();
                    self.frames.push(put(FrameKind::With {
                        object,
                        body,
                        stage: WithStage::Body,
                        scope: Some(with_scope),
                    }));
                    self.push_stmt(&body_stmt);
                }
                WithStage::Body => {}
            },

            other => unreachable!("dispatch_stmt received {:?}", other),
        }
        Ok(())
    }

    #[expect(clippy::too_many_arguments, reason = "destructured frame state")]
    fn step_for(
        &mut self,
        put: impl FnOnce(FrameKind) -> Frame,
        init: Option<ForInit>,
        test: Option<crate::ast::Expr>,
        update: Option<crate::ast::Expr>,
        body: crate::ast::Stmt,
        stage: ForStage,
    ) -> RunResult<()> {
        // Resolve the phase transition first, consuming the child result.
        let next = match stage {
            ForStage::Start => {
                if let Some(init_ref) = &init {
                    match init_ref {
                        ForInit::Decl(decls) => {
                            let decls = Rc::clone(decls);
                            self.frames.push(put(FrameKind::For {
                                init,
                                test,
                                update,
                                body,
                                stage: ForStage::Init,
                            }));
                            self.frames.push(Frame::new(
                                FrameKind::VarDecl {
                                    decls,
                                    index: 0,
                                    pending: None,
                                },
                                None,
                            ));
                        }
                        ForInit::Expr(expr) => {
                            let expr = expr.clone();
                            self.frames.push(put(FrameKind::For {
                                init,
                                test,
                                update,
                                body,
                                stage: ForStage::Init,
                            }));
                            self.push_expr(&expr, false);
                        }
                    }
                    return Ok(());
                }
                ForStage::Test
            }
            ForStage::Init => {
                self.reg = None;
                ForStage::Test
            }
            ForStage::Test => {
                if !self.take_reg_value().to_boolean() {
                    return Ok(());
                }
                ForStage::Body
            }
            ForStage::Body => {
                self.reg = None;
                ForStage::Update
            }
            ForStage::Update => {
                self.reg = None;
                ForStage::Test
            }
        };

        // Then push the child for the resolved phase. Phases with nothing to
        // evaluate fall through (`for (;;)`).
        match next {
            ForStage::Test => match &test {
                Some(test_expr) => {
                    let test_expr = test_expr.clone();
                    self.frames.push(put(FrameKind::For {
                        init,
                        test,
                        update,
                        body,
                        stage: ForStage::Test,
                    }));
                    self.push_expr(&test_expr, false);
                }
                None => {
                    let body_stmt = body.clone();
                    self.frames.push(put(FrameKind::For {
                        init,
                        test,
                        update,
                        body,
                        stage: ForStage::Body,
                    }));
                    self.push_stmt(&body_stmt);
                }
            },
            ForStage::Body => {
                let body_stmt = body.clone();
                self.frames.push(put(FrameKind::For {
                    init,
                    test,
                    update,
                    body,
                    stage: ForStage::Body,
                }));
                self.push_stmt(&body_stmt);
            }
            ForStage::Update => match &update {
                Some(update_expr) => {
                    let update_expr = update_expr.clone();
                    self.frames.push(put(FrameKind::For {
                        init,
                        test,
                        update,
                        body,
                        stage: ForStage::Update,
                    }));
                    self.push_expr(&update_expr, false);
                }
                None => {
                    // No update clause: behave as if it completed.
                    self.frames.push(put(FrameKind::For {
                        init,
                        test,
                        update,
                        body,
                        stage: ForStage::Update,
                    }));
                }
            },
            ForStage::Start | ForStage::Init => unreachable!(),
        }
        Ok(())
    }

    #[expect(clippy::too_many_arguments, reason = "destructured frame state")]
    fn step_for_in(
        &mut self,
        put: impl FnOnce(FrameKind) -> Frame,
        left: crate::ast::ForInTarget,
        right: crate::ast::Expr,
        body: crate::ast::Stmt,
        stage: ForInStage,
        object: Value,
        mut keys: Vec<Rc<str>>,
        mut key_index: usize,
        mut visited: ahash::AHashSet<Rc<str>>,
    ) -> RunResult<()> {
        match stage {
            ForInStage::Start => {
                let right_expr = right.clone();
                self.frames.push(put(FrameKind::ForIn {
                    left,
                    right,
                    body,
                    stage: ForInStage::Object,
                    object,
                    keys,
                    key_index,
                    visited,
                }));
                self.push_expr(&right_expr, false);
            }
            ForInStage::Object => {
                let target = self.take_reg_value();
                // Only objects enumerate; anything else makes the loop a
                // no-op.
                let Value::Object(id) = &target else {
                    return Ok(());
                };
                keys = self.heap.own_enumerable_keys(*id);
                key_index = 0;
                self.frames.push(put(FrameKind::ForIn {
                    left,
                    right,
                    body,
                    stage: ForInStage::NextKey,
                    object: target,
                    keys,
                    key_index,
                    visited,
                }));
            }
            ForInStage::NextKey => {
                self.reg = None;
                let id = object.as_object().expect("enumeration target is an object");
                if key_index >= keys.len() {
                    // Exhausted this object's own keys: continue up the
                    // prototype chain.
                    let Some(proto) = self.heap.proto_of(id) else {
                        return Ok(());
                    };
                    keys = self.heap.own_enumerable_keys(proto);
                    key_index = 0;
                    self.frames.push(put(FrameKind::ForIn {
                        left,
                        right,
                        body,
                        stage: ForInStage::NextKey,
                        object: Value::Object(proto),
                        keys,
                        key_index,
                        visited,
                    }));
                    return Ok(());
                }
                let key = Rc::clone(&keys[key_index]);
                key_index += 1;
                // Skip keys already seen (shadowed on an inner object) and
                // keys deleted mid-iteration.
                let stale = !visited.insert(Rc::clone(&key))
                    || !self.heap.get(id).props.get(key.as_ref()).is_some_and(|p| p.enumerable);
                if stale {
                    self.frames.push(put(FrameKind::ForIn {
                        left,
                        right,
                        body,
                        stage: ForInStage::NextKey,
                        object,
                        keys,
                        key_index,
                        visited,
                    }));
                    return Ok(());
                }
                match &left {
                    crate::ast::ForInTarget::Decl(name) => {
                        let slot = RefSlot::Name(Rc::clone(name));
                        let value = Value::String(Rc::clone(&key));
                        if let Some((setter, this_value)) = self.store_slot(&slot, value.clone())? {
                            self.frames.push(put(FrameKind::ForIn {
                                left,
                                right,
                                body,
                                stage: ForInStage::Stored,
                                object,
                                keys,
                                key_index,
                                visited,
                            }));
                            self.push_pending_call(Value::Object(setter), this_value, vec![value]);
                        } else {
                            let body_stmt = body.clone();
                            self.frames.push(put(FrameKind::ForIn {
                                left,
                                right,
                                body,
                                stage: ForInStage::Body,
                                object,
                                keys,
                                key_index,
                                visited,
                            }));
                            self.push_stmt(&body_stmt);
                        }
                    }
                    crate::ast::ForInTarget::Target(target_expr) => {
                        let target_expr = target_expr.clone();
                        self.frames.push(put(FrameKind::ForIn {
                            left,
                            right,
                            body,
                            stage: ForInStage::TargetRef { key },
                            object,
                            keys,
                            key_index,
                            visited,
                        }));
                        self.push_expr(&target_expr, true);
                    }
                }
            }
            ForInStage::TargetRef { key } => {
                let slot = self.take_reg_slot();
                let value = Value::String(key);
                if let Some((setter, this_value)) = self.store_slot(&slot, value.clone())? {
                    self.frames.push(put(FrameKind::ForIn {
                        left,
                        right,
                        body,
                        stage: ForInStage::Stored,
                        object,
                        keys,
                        key_index,
                        visited,
                    }));
                    self.push_pending_call(Value::Object(setter), this_value, vec![value]);
                } else {
                    let body_stmt = body.clone();
                    self.frames.push(put(FrameKind::ForIn {
                        left,
                        right,
                        body,
                        stage: ForInStage::Body,
                        object,
                        keys,
                        key_index,
                        visited,
                    }));
                    self.push_stmt(&body_stmt);
                }
            }
            ForInStage::Stored => {
                self.reg = None;
                let body_stmt = body.clone();
                self.frames.push(put(FrameKind::ForIn {
                    left,
                    right,
                    body,
                    stage: ForInStage::Body,
                    object,
                    keys,
                    key_index,
                    visited,
                }));
                self.push_stmt(&body_stmt);
            }
            ForInStage::Body => {
                self.reg = None;
                self.frames.push(put(FrameKind::ForIn {
                    left,
                    right,
                    body,
                    stage: ForInStage::NextKey,
                    object,
                    keys,
                    key_index,
                    visited,
                }));
            }
        }
        Ok(())
    }

    #[expect(clippy::too_many_arguments, reason = "destructured frame state")]
    fn step_switch(
        &mut self,
        put: impl FnOnce(FrameKind) -> Frame,
        discriminant: crate::ast::Expr,
        cases: Rc<[crate::ast::SwitchCase]>,
        stage: SwitchStage,
        mut disc: Value,
        mut case_index: usize,
        mut default_index: Option<usize>,
        mut exec_case: usize,
        mut exec_index: usize,
    ) -> RunResult<()> {
        let disc_expr = discriminant.clone();
        let repush = |stage, disc, case_index, default_index, exec_case, exec_index| FrameKind::Switch {
            discriminant,
            cases: Rc::clone(&cases),
            stage,
            disc,
            case_index,
            default_index,
            exec_case,
            exec_index,
        };
        match stage {
            SwitchStage::Start => {
                self.frames.push(put(repush(
                    SwitchStage::Disc,
                    disc,
                    case_index,
                    default_index,
                    exec_case,
                    exec_index,
                )));
                self.push_expr(&disc_expr, false);
            }
            SwitchStage::Disc => {
                disc = self.take_reg_value();
                self.frames.push(put(repush(
                    SwitchStage::FindCase,
                    disc,
                    case_index,
                    default_index,
                    exec_case,
                    exec_index,
                )));
            }
            SwitchStage::FindCase => {
                self.reg = None;
                if case_index < cases.len() {
                    match &cases[case_index].test {
                        None => {
                            // The default clause participates once no case
                            // matches.
                            default_index = Some(case_index);
                            case_index += 1;
                            self.frames.push(put(repush(
                                SwitchStage::FindCase,
                                disc,
                                case_index,
                                default_index,
                                exec_case,
                                exec_index,
                            )));
                        }
                        Some(test) => {
                            let test = test.clone();
                            self.frames.push(put(repush(
                                SwitchStage::TestCase,
                                disc,
                                case_index,
                                default_index,
                                exec_case,
                                exec_index,
                            )));
                            self.push_expr(&test, false);
                        }
                    }
                } else if let Some(default) = default_index {
                    exec_case = default;
                    exec_index = 0;
                    self.frames.push(put(repush(
                        SwitchStage::Exec,
                        disc,
                        case_index,
                        default_index,
                        exec_case,
                        exec_index,
                    )));
                }
            }
            SwitchStage::TestCase => {
                let test_value = self.take_reg_value();
                if test_value.loose_eq(&disc, &self.heap) {
                    exec_case = case_index;
                    exec_index = 0;
                    self.frames.push(put(repush(
                        SwitchStage::Exec,
                        disc,
                        case_index,
                        default_index,
                        exec_case,
                        exec_index,
                    )));
                } else {
                    case_index += 1;
                    self.frames.push(put(repush(
                        SwitchStage::FindCase,
                        disc,
                        case_index,
                        default_index,
                        exec_case,
                        exec_index,
                    )));
                }
            }
            SwitchStage::Exec => {
                // Once matched, consequents run through every subsequent
                // case until a `break` pops this frame.
                self.reg = None;
                if exec_case < cases.len() {
                    if exec_index < cases[exec_case].body.len() {
                        let stmt = Rc::clone(&cases[exec_case].body[exec_index]);
                        exec_index += 1;
                        self.frames.push(put(repush(
                            SwitchStage::Exec,
                            disc,
                            case_index,
                            default_index,
                            exec_case,
                            exec_index,
                        )));
                        self.push_stmt(&stmt);
                    } else {
                        exec_case += 1;
                        exec_index = 0;
                        self.frames.push(put(repush(
                            SwitchStage::Exec,
                            disc,
                            case_index,
                            default_index,
                            exec_case,
                            exec_index,
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
