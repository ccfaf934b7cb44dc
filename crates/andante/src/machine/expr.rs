//! Expression steppers and the binary/unary operator semantics.

use std::rc::Rc;

use crate::{
    ast::{BinaryOp, ExprKind, LogicalOp, PropKind, PropRef, UnaryOp, UpdateOp},
    error::{RunError, RunResult},
    frame::{
        AssignStage, BinaryStage, Frame, FrameKind, LogicalStage, MemberStage, Outcome, RefSlot, UnaryStage,
        UpdateStage,
    },
    heap::{JsObject, ObjId, ObjKind, Property},
    interp::Interpreter,
    machine::SlotRead,
    scope,
    value::Value,
};

impl Interpreter {
    pub(super) fn dispatch_expr(&mut self, frame: Frame) -> RunResult<()> {
        let Frame { kind, label, span } = frame;
        let put = |kind| Frame { kind, label, span };
        match kind {
            FrameKind::Leaf { expr } => {
                let value = match &expr.kind {
                    ExprKind::Number(n) => Value::Number(*n),
                    ExprKind::Str(s) => Value::String(Rc::clone(s)),
                    ExprKind::Bool(b) => Value::Boolean(*b),
                    ExprKind::Null => Value::Null,
                    ExprKind::This => self.current_this(),
                    ExprKind::Regex { pattern, flags } => {
                        crate::builtins::regexp::create_regexp(self, pattern, flags)?
                    }
                    ExprKind::Function(node) => {
                        let scope = self.current_scope();
                        self.create_closure(node, scope)?
                    }
                    other => unreachable!("not a leaf expression: {other:?}"),
                };
                self.reg = Some(Outcome::Val(value));
            }

            FrameKind::Ident {
                name,
                components,
                awaiting,
            } => {
                if awaiting {
                    let value = self.take_reg_value();
                    self.reg = Some(Outcome::Val(value));
                    return Ok(());
                }
                if components {
                    self.reg = Some(Outcome::Reference(RefSlot::Name(name)));
                    return Ok(());
                }
                match self.get_slot(&RefSlot::Name(Rc::clone(&name)))? {
                    SlotRead::Value(value) => self.reg = Some(Outcome::Val(value)),
                    SlotRead::Getter { getter, this_value } => {
                        self.frames.push(put(FrameKind::Ident {
                            name,
                            components,
                            awaiting: true,
                        }));
                        self.push_pending_call(Value::Object(getter), this_value, Vec::new());
                    }
                }
            }

            FrameKind::Member {
                object,
                property,
                components,
                stage,
            } => match stage {
                MemberStage::Start => {
                    let object_expr = object.clone();
                    self.frames.push(put(FrameKind::Member {
                        object,
                        property,
                        components,
                        stage: MemberStage::Object,
                    }));
                    self.push_expr(&object_expr, false);
                }
                MemberStage::Object => {
                    let base = self.take_reg_value();
                    match &property {
                        PropRef::Static(name) => {
                            let key = Rc::clone(name);
                            self.finish_member(put, object, property, components, base, key)?;
                        }
                        PropRef::Computed(expr) => {
                            let expr = expr.clone();
                            self.frames.push(put(FrameKind::Member {
                                object,
                                property,
                                components,
                                stage: MemberStage::Property { base },
                            }));
                            self.push_expr(&expr, false);
                        }
                    }
                }
                MemberStage::Property { base } => {
                    let key_value = self.take_reg_value();
                    let key = key_value.to_js_string(&self.heap);
                    self.finish_member(put, object, property, components, base, key)?;
                }
                MemberStage::Getter => {
                    let value = self.take_reg_value();
                    self.reg = Some(Outcome::Val(value));
                }
            },

            FrameKind::ArrayLit {
                elements,
                mut index,
                target,
            } => {
                let id = match target {
                    Some(id) => {
                        if self.reg.is_some() {
                            let value = self.take_reg_value();
                            self.heap.insert_data_prop(id, &(index - 1).to_string(), value);
                        }
                        id
                    }
                    None => {
                        let array = self.realm.array;
                        self.heap.alloc(JsObject::new(ObjKind::Array { length: 0 }, Some(array)))?
                    }
                };
                // Elisions contribute to length without a property.
                while index < elements.len() && elements[index].is_none() {
                    if let ObjKind::Array { length } = &mut self.heap.get_mut(id).kind
                        && *length < (index + 1) as u32
                    {
                        *length = (index + 1) as u32;
                    }
                    index += 1;
                }
                if index < elements.len() {
                    let element = elements[index].clone().expect("elisions were skipped");
                    self.frames.push(put(FrameKind::ArrayLit {
                        elements,
                        index: index + 1,
                        target: Some(id),
                    }));
                    self.push_expr(&element, false);
                } else {
                    self.reg = Some(Outcome::Val(Value::Object(id)));
                }
            }

            FrameKind::ObjectLit { props, index, target } => {
                let id = match target {
                    Some(id) => {
                        if self.reg.is_some() {
                            let value = self.take_reg_value();
                            let prop = &props[index - 1];
                            match prop.kind {
                                PropKind::Init => self.heap.insert_data_prop(id, &prop.key, value),
                                PropKind::Get => self.install_literal_accessor(id, &prop.key, &value, true)?,
                                PropKind::Set => self.install_literal_accessor(id, &prop.key, &value, false)?,
                            }
                        }
                        id
                    }
                    None => {
                        let object = self.realm.object;
                        self.heap.alloc(JsObject::new(ObjKind::Plain, Some(object)))?
                    }
                };
                if index < props.len() {
                    let value_expr = props[index].value.clone();
                    self.frames.push(put(FrameKind::ObjectLit {
                        props,
                        index: index + 1,
                        target: Some(id),
                    }));
                    self.push_expr(&value_expr, false);
                } else {
                    self.reg = Some(Outcome::Val(Value::Object(id)));
                }
            }

            FrameKind::Unary { op, argument, stage } => match stage {
                UnaryStage::Start => {
                    let components = matches!(op, UnaryOp::Typeof | UnaryOp::Delete);
                    let argument_expr = argument.clone();
                    self.frames.push(put(FrameKind::Unary {
                        op,
                        argument,
                        stage: UnaryStage::Arg,
                    }));
                    self.push_expr(&argument_expr, components);
                }
                UnaryStage::Arg => match op {
                    UnaryOp::Minus => {
                        let n = self.take_reg_value().to_number(&self.heap);
                        self.reg = Some(Outcome::Val(Value::Number(-n)));
                    }
                    UnaryOp::Plus => {
                        let n = self.take_reg_value().to_number(&self.heap);
                        self.reg = Some(Outcome::Val(Value::Number(n)));
                    }
                    UnaryOp::Not => {
                        let b = self.take_reg_value().to_boolean();
                        self.reg = Some(Outcome::Val(Value::Boolean(!b)));
                    }
                    UnaryOp::BitNot => {
                        let n = self.take_reg_value().to_number(&self.heap);
                        self.reg = Some(Outcome::Val(Value::Number(f64::from(!crate::value::to_int32(n)))));
                    }
                    UnaryOp::Void => {
                        self.take_reg_value();
                        self.reg = Some(Outcome::Val(Value::Undefined));
                    }
                    UnaryOp::Typeof => match self.take_reg() {
                        Outcome::Val(value) => {
                            self.reg = Some(Outcome::Val(Value::string(value.type_of(&self.heap))));
                        }
                        Outcome::Reference(slot) => {
                            // A bare unbound name reads as "undefined"
                            // instead of throwing.
                            if let RefSlot::Name(name) = &slot {
                                let scope = self.current_scope();
                                if !scope::name_is_bound(&self.heap, &self.realm, scope, name) {
                                    self.reg = Some(Outcome::Val(Value::string("undefined")));
                                    return Ok(());
                                }
                            }
                            match self.get_slot(&slot)? {
                                SlotRead::Value(value) => {
                                    self.reg = Some(Outcome::Val(Value::string(value.type_of(&self.heap))));
                                }
                                SlotRead::Getter { getter, this_value } => {
                                    self.frames.push(put(FrameKind::Unary {
                                        op,
                                        argument,
                                        stage: UnaryStage::Getter,
                                    }));
                                    self.push_pending_call(Value::Object(getter), this_value, Vec::new());
                                }
                            }
                        }
                    },
                    UnaryOp::Delete => {
                        let result = match self.take_reg() {
                            Outcome::Reference(slot) => self.delete_slot(&slot)?,
                            Outcome::Val(_) => true,
                        };
                        self.reg = Some(Outcome::Val(Value::Boolean(result)));
                    }
                },
                UnaryStage::Getter => {
                    let value = self.take_reg_value();
                    self.reg = Some(Outcome::Val(Value::string(value.type_of(&self.heap))));
                }
            },

            FrameKind::Update {
                op,
                prefix,
                target,
                stage,
            } => match stage {
                UpdateStage::Start => {
                    let target_expr = target.clone();
                    self.frames.push(put(FrameKind::Update {
                        op,
                        prefix,
                        target,
                        stage: UpdateStage::Ref,
                    }));
                    self.push_expr(&target_expr, true);
                }
                UpdateStage::Ref => {
                    let slot = self.take_reg_slot();
                    match self.get_slot(&slot)? {
                        SlotRead::Value(old) => self.apply_update(put, op, prefix, target, slot, &old)?,
                        SlotRead::Getter { getter, this_value } => {
                            self.frames.push(put(FrameKind::Update {
                                op,
                                prefix,
                                target,
                                stage: UpdateStage::Getter { slot },
                            }));
                            self.push_pending_call(Value::Object(getter), this_value, Vec::new());
                        }
                    }
                }
                UpdateStage::Getter { slot } => {
                    let old = self.take_reg_value();
                    self.apply_update(put, op, prefix, target, slot, &old)?;
                }
                UpdateStage::Store { result } => {
                    self.take_reg_value();
                    self.reg = Some(Outcome::Val(result));
                }
            },

            FrameKind::Binary { op, left, right, stage } => match stage {
                BinaryStage::Start => {
                    let left_expr = left.clone();
                    self.frames.push(put(FrameKind::Binary {
                        op,
                        left,
                        right,
                        stage: BinaryStage::Left,
                    }));
                    self.push_expr(&left_expr, false);
                }
                BinaryStage::Left => {
                    let left_value = self.take_reg_value();
                    let right_expr = right.clone();
                    self.frames.push(put(FrameKind::Binary {
                        op,
                        left,
                        right,
                        stage: BinaryStage::Right { left: left_value },
                    }));
                    self.push_expr(&right_expr, false);
                }
                BinaryStage::Right { left: left_value } => {
                    let right_value = self.take_reg_value();
                    let result = self.eval_binary(op, &left_value, &right_value)?;
                    self.reg = Some(Outcome::Val(result));
                }
            },

            FrameKind::Logical { op, left, right, stage } => match stage {
                LogicalStage::Start => {
                    let left_expr = left.clone();
                    self.frames.push(put(FrameKind::Logical {
                        op,
                        left,
                        right,
                        stage: LogicalStage::Left,
                    }));
                    self.push_expr(&left_expr, false);
                }
                LogicalStage::Left => {
                    let left_value = self.take_reg_value();
                    let short_circuit = match op {
                        LogicalOp::And => !left_value.to_boolean(),
                        LogicalOp::Or => left_value.to_boolean(),
                    };
                    if short_circuit {
                        self.reg = Some(Outcome::Val(left_value));
                    } else {
                        let right_expr = right.clone();
                        self.frames.push(put(FrameKind::Logical {
                            op,
                            left,
                            right,
                            stage: LogicalStage::Right,
                        }));
                        self.push_expr(&right_expr, false);
                    }
                }
                LogicalStage::Right => {
                    let value = self.take_reg_value();
                    self.reg = Some(Outcome::Val(value));
                }
            },

            FrameKind::Conditional {
                test,
                consequent,
                alternate,
                started,
            } => {
                if started {
                    if self.take_reg_value().to_boolean() {
                        self.push_expr(&consequent, false);
                    } else {
                        self.push_expr(&alternate, false);
                    }
                } else {
                    let test_expr = test.clone();
                    self.frames.push(put(FrameKind::Conditional {
                        test,
                        consequent,
                        alternate,
                        started: true,
                    }));
                    self.push_expr(&test_expr, false);
                }
            }

            FrameKind::Assign {
                op,
                target,
                value,
                stage,
            } => match stage {
                AssignStage::Start => {
                    let target_expr = target.clone();
                    self.frames.push(put(FrameKind::Assign {
                        op,
                        target,
                        value,
                        stage: AssignStage::Target,
                    }));
                    self.push_expr(&target_expr, true);
                }
                AssignStage::Target => {
                    let slot = self.take_reg_slot();
                    if op.binary_op().is_none() {
                        let value_expr = value.clone();
                        self.frames.push(put(FrameKind::Assign {
                            op,
                            target,
                            value,
                            stage: AssignStage::Value { slot, old: None },
                        }));
                        self.push_expr(&value_expr, false);
                        return Ok(());
                    }
                    // Compound operators load the old value first.
                    match self.get_slot(&slot)? {
                        SlotRead::Value(old) => {
                            let value_expr = value.clone();
                            self.frames.push(put(FrameKind::Assign {
                                op,
                                target,
                                value,
                                stage: AssignStage::Value { slot, old: Some(old) },
                            }));
                            self.push_expr(&value_expr, false);
                        }
                        SlotRead::Getter { getter, this_value } => {
                            self.frames.push(put(FrameKind::Assign {
                                op,
                                target,
                                value,
                                stage: AssignStage::OldGetter { slot },
                            }));
                            self.push_pending_call(Value::Object(getter), this_value, Vec::new());
                        }
                    }
                }
                AssignStage::OldGetter { slot } => {
                    let old = self.take_reg_value();
                    let value_expr = value.clone();
                    self.frames.push(put(FrameKind::Assign {
                        op,
                        target,
                        value,
                        stage: AssignStage::Value { slot, old: Some(old) },
                    }));
                    self.push_expr(&value_expr, false);
                }
                AssignStage::Value { slot, old } => {
                    let rhs = self.take_reg_value();
                    let result = match (&old, op.binary_op()) {
                        (Some(old), Some(binary)) => self.eval_binary(binary, old, &rhs)?,
                        _ => rhs,
                    };
                    if let Some((setter, this_value)) = self.store_slot(&slot, result.clone())? {
                        self.frames.push(put(FrameKind::Assign {
                            op,
                            target,
                            value,
                            stage: AssignStage::Setter { result: result.clone() },
                        }));
                        self.push_pending_call(Value::Object(setter), this_value, vec![result]);
                    } else {
                        self.reg = Some(Outcome::Val(result));
                    }
                }
                AssignStage::Setter { result } => {
                    // The setter's return value is discarded in favor of the
                    // stored value.
                    self.take_reg_value();
                    self.reg = Some(Outcome::Val(result));
                }
            },

            FrameKind::Sequence { exprs, index } => {
                if index > 0 && index >= exprs.len() {
                    // Last expression's value stays in the register.
                    return Ok(());
                }
                if index > 0 {
                    self.reg = None;
                }
                let expr = exprs[index].clone();
                self.frames.push(put(FrameKind::Sequence {
                    exprs,
                    index: index + 1,
                }));
                self.push_expr(&expr, false);
            }

            other => unreachable!("dispatch_expr received {:?}", other),
        }
        Ok(())
    }

    fn finish_member(
        &mut self,
        put: impl FnOnce(FrameKind) -> Frame,
        object: crate::ast::Expr,
        property: PropRef,
        components: bool,
        base: Value,
        key: Rc<str>,
    ) -> RunResult<()> {
        if components {
            self.reg = Some(Outcome::Reference(RefSlot::Member { base, key }));
            return Ok(());
        }
        let slot = RefSlot::Member {
            base: base.clone(),
            key,
        };
        match self.get_slot(&slot)? {
            SlotRead::Value(value) => self.reg = Some(Outcome::Val(value)),
            SlotRead::Getter { getter, this_value } => {
                self.frames.push(put(FrameKind::Member {
                    object,
                    property,
                    components,
                    stage: MemberStage::Getter,
                }));
                self.push_pending_call(Value::Object(getter), this_value, Vec::new());
            }
        }
        Ok(())
    }

    fn apply_update(
        &mut self,
        put: impl FnOnce(FrameKind) -> Frame,
        op: UpdateOp,
        prefix: bool,
        target: crate::ast::Expr,
        slot: RefSlot,
        old: &Value,
    ) -> RunResult<()> {
        let old_number = old.to_number(&self.heap);
        let new_number = match op {
            UpdateOp::Increment => old_number + 1.0,
            UpdateOp::Decrement => old_number - 1.0,
        };
        let result = Value::Number(if prefix { new_number } else { old_number });
        if let Some((setter, this_value)) = self.store_slot(&slot, Value::Number(new_number))? {
            self.frames.push(put(FrameKind::Update {
                op,
                prefix,
                target,
                stage: UpdateStage::Store { result },
            }));
            self.push_pending_call(Value::Object(setter), this_value, vec![Value::Number(new_number)]);
        } else {
            self.reg = Some(Outcome::Val(result));
        }
        Ok(())
    }

    /// Installs (or merges) an object-literal accessor property.
    fn install_literal_accessor(&mut self, id: ObjId, key: &str, func: &Value, is_getter: bool) -> RunResult<()> {
        let Some(func_id) = func.as_object().filter(|f| self.heap.get(*f).is_function()) else {
            return Err(RunError::type_error("object literal accessor must be a function"));
        };
        let (mut getter, mut setter) = match self.heap.get(id).props.get(key) {
            Some(prop) => (prop.getter, prop.setter),
            None => (None, None),
        };
        if is_getter {
            getter = Some(func_id);
        } else {
            setter = Some(func_id);
        }
        self.heap.get_mut(id).props.insert(
            Rc::from(key),
            Property {
                value: Value::Undefined,
                getter,
                setter,
                writable: true,
                enumerable: true,
                configurable: true,
            },
        );
        Ok(())
    }

    /// The binary operator table.
    pub(crate) fn eval_binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> RunResult<Value> {
        use std::cmp::Ordering;
        let heap = &self.heap;
        Ok(match op {
            BinaryOp::Add => {
                let left = left.to_primitive(heap);
                let right = right.to_primitive(heap);
                if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                    let mut out = left.to_js_string(heap).to_string();
                    out.push_str(&right.to_js_string(heap));
                    Value::string(&out)
                } else {
                    Value::Number(left.to_number(heap) + right.to_number(heap))
                }
            }
            BinaryOp::Sub => Value::Number(left.to_number(heap) - right.to_number(heap)),
            BinaryOp::Mul => Value::Number(left.to_number(heap) * right.to_number(heap)),
            BinaryOp::Div => Value::Number(left.to_number(heap) / right.to_number(heap)),
            BinaryOp::Rem => Value::Number(left.to_number(heap) % right.to_number(heap)),
            BinaryOp::Eq => Value::Boolean(left.loose_eq(right, heap)),
            BinaryOp::NotEq => Value::Boolean(!left.loose_eq(right, heap)),
            BinaryOp::StrictEq => Value::Boolean(left.strict_eq(right)),
            BinaryOp::StrictNotEq => Value::Boolean(!left.strict_eq(right)),
            BinaryOp::Lt => Value::Boolean(left.compare(right, heap) == Some(Ordering::Less)),
            BinaryOp::LtEq => Value::Boolean(matches!(
                left.compare(right, heap),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Gt => Value::Boolean(left.compare(right, heap) == Some(Ordering::Greater)),
            BinaryOp::GtEq => Value::Boolean(matches!(
                left.compare(right, heap),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::ShiftLeft => {
                let shift = crate::value::to_uint32(right.to_number(heap)) & 31;
                Value::Number(f64::from(crate::value::to_int32(left.to_number(heap)) << shift))
            }
            BinaryOp::ShiftRight => {
                let shift = crate::value::to_uint32(right.to_number(heap)) & 31;
                Value::Number(f64::from(crate::value::to_int32(left.to_number(heap)) >> shift))
            }
            BinaryOp::ShiftRightUnsigned => {
                let shift = crate::value::to_uint32(right.to_number(heap)) & 31;
                Value::Number(f64::from(crate::value::to_uint32(left.to_number(heap)) >> shift))
            }
            BinaryOp::BitAnd => Value::Number(f64::from(
                crate::value::to_int32(left.to_number(heap)) & crate::value::to_int32(right.to_number(heap)),
            )),
            BinaryOp::BitOr => Value::Number(f64::from(
                crate::value::to_int32(left.to_number(heap)) | crate::value::to_int32(right.to_number(heap)),
            )),
            BinaryOp::BitXor => Value::Number(f64::from(
                crate::value::to_int32(left.to_number(heap)) ^ crate::value::to_int32(right.to_number(heap)),
            )),
            BinaryOp::In => {
                if !right.is_object() {
                    return Err(RunError::type_error("Cannot use 'in' operator on a non-object"));
                }
                let key = left.to_js_string(heap);
                Value::Boolean(self.heap.has_property(&self.realm, right, &key))
            }
            BinaryOp::Instanceof => {
                let Some(ctor) = right.as_object().filter(|id| self.heap.get(*id).is_function()) else {
                    return Err(RunError::type_error("Right-hand side of 'instanceof' is not callable"));
                };
                Value::Boolean(self.heap.instance_of(left, ctor)?)
            }
        })
    }
}
