//! Assignment, compound assignment, and increment/decrement.
//!
//! The target of each of these is first compiled into a [`Location`], which holds the
//! already-compiled receiver, indices and arguments of the target.  A location can then be read
//! and written any number of times, as long as [`Location::make_reevaluable`] was called first.

use crate::error::InternalError;
use crate::js::{BinaryOp as JsBinaryOp, Effects, JsExpr, JsStmt, UnaryOp as JsUnaryOp};
use crate::metadata::{EventSemantics, FieldSemantics, MethodSemantics, PropertySemantics};
use crate::model::{
    BinaryOp, EventRef, Expr, ExprKind, FieldRef, IncDecOp, MethodId, MethodRef, OperatorInfo,
    PropertyRef, TypeKind,
};
use crate::pos::{Sp, Span};

use super::invoke::{CallArg, CallSite, Receiver};
use super::operators::{binary_overflow, native_binary_op, OperandTypes, Overflow};
use super::order::hoist_for_order;
use super::{ExprCompiler, ExprFlags, LResult};

/// A compiled assignment target.
#[derive(Debug, Clone)]
enum Location {
    /// Anything JavaScript can assign to: a variable, a member or an array element.
    Native(JsExpr),
    /// A property or indexer with accessor methods.
    Accessor(Box<AccessorLocation>),
    MultiDim { array: JsExpr, indices: Vec<JsExpr> },
    /// `this` inside a struct.  Assigning to it overwrites every field.
    WholeReceiver(JsExpr),
}

#[derive(Debug, Clone)]
struct AccessorLocation {
    name: String,
    getter: Option<(MethodRef, MethodSemantics)>,
    setter: Option<(MethodRef, MethodSemantics)>,
    /// `None` for static properties, or the implicit `this`.
    receiver: Option<JsExpr>,
    args: Vec<JsExpr>,
    is_non_virtual: bool,
    span: Span,
}

impl Location {
    fn parts_mut(&mut self) -> Vec<&mut JsExpr> {
        match self {
            Location::Native(JsExpr::Member { object, .. }) => vec![&mut **object],
            Location::Native(JsExpr::Index { object, index }) => vec![&mut **object, &mut **index],
            Location::Native(_) => vec![],
            Location::Accessor(accessor) => {
                let AccessorLocation { receiver, args, .. } = &mut **accessor;
                receiver.iter_mut().chain(args.iter_mut()).collect()
            },
            Location::MultiDim { array, indices } => std::iter::once(array).chain(indices.iter_mut()).collect(),
            Location::WholeReceiver(_) => vec![],
        }
    }

    /// Store every part in a temporary unless it's trivially safe to evaluate again.
    fn make_reevaluable(&mut self, compiler: &ExprCompiler<'_>, stmts: &mut Vec<JsStmt>) {
        for part in self.parts_mut() {
            let expr = std::mem::replace(part, JsExpr::Null);
            *part = compiler.ensure_reevaluable(expr, stmts);
        }
    }

    /// Hoist parts that code with the effects `later` would interfere with.
    fn hoist_before(&mut self, compiler: &ExprCompiler<'_>, stmts: &mut Vec<JsStmt>, later: &Effects) {
        let mut parts = self.parts_mut();
        let mut items = parts.iter_mut().map(|part| std::mem::replace(&mut **part, JsExpr::Null)).collect::<Vec<_>>();
        stmts.extend(hoist_for_order(&mut items, None, None, later, compiler.ctx.temporaries));
        for (part, item) in parts.into_iter().zip(items) {
            *part = item;
        }
    }
}

impl ExprCompiler<'_> {
    pub(super) fn compile_assign(
        &mut self,
        target: &Sp<Expr>,
        value: &Sp<Expr>,
        flags: ExprFlags,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let mut location = self.compile_location(target, span, stmts)?;

        let mut value_stmts = vec![];
        let value = self.compile_value_for_store(value, &mut value_stmts)?;
        self.sequence_location(&mut location, stmts, value_stmts);

        self.store(location, value, flags.returns_value, stmts)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn compile_compound_assign(
        &mut self,
        op: BinaryOp,
        target: &Sp<Expr>,
        value: &Sp<Expr>,
        info: &OperatorInfo,
        flags: ExprFlags,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        if let ExprKind::Event { receiver, event } = &target.kind {
            return self.compile_event_accessor(op, receiver.as_deref(), event, value, span, stmts);
        }

        let types = OperandTypes { left: &target.ty, right: value.converted_type(), result: &target.ty };
        let mut location = self.compile_location(target, span, stmts)?;

        let native_op = match &location {
            Location::Native(_) => self.native_compound_op(op, types, info),
            _ => None,
        };
        if let Some(js_op) = native_op {
            let mut value_stmts = vec![];
            let value = self.compile_expr(value, &mut value_stmts)?;
            self.sequence_location(&mut location, stmts, value_stmts);
            return match location {
                Location::Native(target_js) => Ok(JsExpr::binary(js_op, target_js, value)),
                _ => unreachable!("checked above"),
            };
        }

        tracing::debug!(op = %op, "decomposing compound assignment into a read and a write");
        location.make_reevaluable(self, stmts);
        let mut old = self.read_location(&location, stmts)?;

        let mut value_stmts = vec![];
        let value = self.compile_expr(value, &mut value_stmts)?;
        if !value_stmts.is_empty() {
            location.hoist_before(self, stmts, &Effects::of_stmts(&value_stmts));
        }
        self.sequence_after(&mut old, stmts, value_stmts);

        let new = self.apply_binary_operator(op, old, value, types, info, span, stmts)?;
        self.store(location, new, flags.returns_value, stmts)
    }

    pub(super) fn compile_inc_dec(
        &mut self,
        op: IncDecOp,
        target: &Sp<Expr>,
        info: &OperatorInfo,
        flags: ExprFlags,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let binary_op = if op.is_increment() { BinaryOp::Add } else { BinaryOp::Sub };
        let types = OperandTypes { left: &target.ty, right: &target.ty, result: &target.ty };
        let mut location = self.compile_location(target, span, stmts)?;

        if let Location::Native(target_js) = &location {
            if self.native_compound_op(binary_op, types, info).is_some() {
                let js_op = match op {
                    IncDecOp::PreInc => JsUnaryOp::PreInc,
                    IncDecOp::PreDec => JsUnaryOp::PreDec,
                    IncDecOp::PostInc => JsUnaryOp::PostInc,
                    IncDecOp::PostDec => JsUnaryOp::PostDec,
                };
                return Ok(JsExpr::unary(js_op, target_js.clone()));
            }
        }

        tracing::debug!(op = %op, "decomposing increment into a read and a write");
        location.make_reevaluable(self, stmts);
        let old = self.read_location(&location, stmts)?;

        let keep_old = op.is_postfix() && flags.returns_value;
        let old = match keep_old {
            true => JsExpr::ident(self.bind_temporary(old, stmts)),
            false => old,
        };

        let new = match &info.method {
            Some(method) if self.ctx.metadata.method_semantics(method.method) != MethodSemantics::NativeOperator => {
                let semantics = self.ctx.metadata.method_semantics(method.method);
                self.call_user_operator(method, &semantics, vec![old.clone()], info.lifted, span, stmts)?
            },
            _ => self.apply_binary_operator(binary_op, old.clone(), JsExpr::Number(1.0), types, info, span, stmts)?,
        };

        match keep_old {
            true => {
                let write = self.store(location, new, false, stmts)?;
                stmts.push(JsStmt::Expr(write));
                Ok(old)
            },
            false => self.store(location, new, flags.returns_value, stmts),
        }
    }

    /// The JavaScript compound assignment operator that does exactly what `op` does to a
    /// location of the given type, if there is one.
    fn native_compound_op(&self, op: BinaryOp, types: OperandTypes<'_>, info: &OperatorInfo) -> Option<JsBinaryOp> {
        let program = self.ctx.program;
        if info.lifted || types.result.is_delegate(program) {
            return None;
        }
        if let Some(method) = &info.method {
            if self.ctx.metadata.method_semantics(method.method) != MethodSemantics::NativeOperator {
                return None;
            }
        }
        if types.result.is_string() {
            return match op == BinaryOp::Add && types.right.is_string() {
                true => Some(JsBinaryOp::AddAssign),
                false => None,
            };
        }

        let prim = types.result.numeric_primitive(program)?;
        let is_unsigned = prim.int_range().map_or(false, |range| !range.signed);
        let js_op = native_binary_op(op, is_unsigned);
        if prim.is_floating() {
            return js_op.compound_assignment();
        }
        let omit_clipping = self.ctx.options.omit_integer_clipping;
        let is_native = op != BinaryOp::Div && match binary_overflow(op, prim) {
            Overflow::None => true,
            Overflow::Arithmetic => omit_clipping && !info.checked,
            Overflow::Reinterpret => omit_clipping,
        };
        match is_native {
            true => js_op.compound_assignment(),
            false => None,
        }
    }

    /// Put the statements from compiling a value into `stmts`, first hoisting the parts of a
    /// location they could interfere with.
    fn sequence_location(&self, location: &mut Location, stmts: &mut Vec<JsStmt>, value_stmts: Vec<JsStmt>) {
        if value_stmts.is_empty() {
            return;
        }
        location.hoist_before(self, stmts, &Effects::of_stmts(&value_stmts));
        stmts.extend(value_stmts);
    }

    // -------------------------------------------------------------------------
    // Locations

    fn compile_location(&mut self, target: &Sp<Expr>, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<Location> {
        match &target.kind {
            ExprKind::Local(id) => Ok(Location::Native(self.local_location(*id))),

            ExprKind::Field { receiver, field } => self.field_location(receiver.as_deref(), field, span, stmts),

            ExprKind::Property { receiver, property, args } => {
                self.property_location(receiver.as_deref(), property, args, span, stmts)
            },

            ExprKind::ArrayElement { array, indices } => {
                let array = self.compile_receiver(array, stmts)?;
                self.compile_index_list(array, indices, stmts)
            },

            ExprKind::LateBoundMember { receiver, name } => {
                let object = self.compile_receiver(receiver, stmts)?;
                Ok(Location::Native(object.member(name.clone())))
            },

            ExprKind::LateBoundIndexer { receiver, candidates, args } => match candidates.first() {
                Some(first) => {
                    self.check_indexer_candidates(candidates, span)?;
                    self.property_location(Some(receiver), first, args, span, stmts)
                },
                None => {
                    let object = self.compile_receiver(receiver, stmts)?;
                    self.compile_index_list(object, args, stmts)
                },
            },

            ExprKind::This => {
                let is_struct = self.ctx.this_type.map_or(false, |id| self.ctx.program.type_def(id).kind == TypeKind::Struct);
                match is_struct {
                    true => Ok(Location::WholeReceiver(self.this_expr.clone())),
                    false => Err(InternalError::UnexpectedNode {
                        what: target.descr().to_owned(),
                        context: "'this' is only assignable inside a struct",
                        span,
                    }.into()),
                }
            },

            _ => Err(InternalError::UnexpectedNode {
                what: target.descr().to_owned(),
                context: "not an assignable location",
                span,
            }.into()),
        }
    }

    /// An element of an array, which is native when there is one index.
    fn compile_index_list(&mut self, array: JsExpr, indices: &[Sp<Expr>], stmts: &mut Vec<JsStmt>) -> LResult<Location> {
        let mut list = vec![array];
        for index in indices {
            let mut sub = vec![];
            let js = self.compile_expr(index, &mut sub)?;
            self.sequence_push(&mut list, stmts, sub, js);
        }
        let mut list = list.into_iter();
        let array = list.next().unwrap_or(JsExpr::Null);
        let mut indices = list.collect::<Vec<_>>();
        match indices.len() {
            1 => Ok(Location::Native(array.index(indices.remove(0)))),
            _ => Ok(Location::MultiDim { array, indices }),
        }
    }

    fn field_location(&mut self, receiver: Option<&Sp<Expr>>, field: &FieldRef, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<Location> {
        let def = self.ctx.program.field(field.id);
        let name = match self.ctx.metadata.field_semantics(field.id) {
            FieldSemantics::Field { name } => name,
            FieldSemantics::Constant { .. } => return Err(self.report(error!(
                code="E0701",
                message("cannot assign to constant '{}'", def.name),
                primary(span, "assignment happens here"),
            ))),
            FieldSemantics::NotUsableFromScript => return Err(self.report(error!(
                code="E0702",
                message("field '{}' is not usable from script", def.name),
                primary(span, "used here"),
            ))),
        };
        if def.is_readonly && !self.ctx.is_in_constructor_of(def.declaring, def.is_static) {
            return Err(self.report(error!(
                code="E0701",
                message("cannot assign to read-only field '{}'", def.name),
                primary(span, "assignment happens here"),
                note("read-only fields can only be assigned in a constructor of their type"),
            )));
        }

        let object = match receiver {
            Some(receiver) => self.compile_receiver(receiver, stmts)?,
            None if def.is_static => self.type_object(def.declaring, stmts)?,
            None => self.this_expr.clone(),
        };
        Ok(Location::Native(object.member(name)))
    }

    fn property_location(
        &mut self,
        receiver: Option<&Sp<Expr>>,
        property: &PropertyRef,
        args: &[Sp<Expr>],
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<Location> {
        let def = self.ctx.program.property(property.id);
        let (getter, setter) = match self.ctx.metadata.property_semantics(property.id) {
            PropertySemantics::Field { name } => {
                let object = match receiver {
                    Some(receiver) => self.compile_receiver(receiver, stmts)?,
                    None if def.is_static => self.type_object(def.declaring, stmts)?,
                    None => self.this_expr.clone(),
                };
                return Ok(Location::Native(object.member(name)));
            },
            PropertySemantics::GetAndSetMethods { getter, setter } => (getter, setter),
            PropertySemantics::NotUsableFromScript => return Err(self.report(error!(
                code="E0702",
                message("property '{}' is not usable from script", def.name),
                primary(span, "used here"),
            ))),
        };

        let accessor = |id: Option<MethodId>, semantics: Option<MethodSemantics>| match (id, semantics) {
            (Some(id), Some(semantics)) if semantics != MethodSemantics::NotUsableFromScript => {
                let method = MethodRef { method: id, type_args: property.type_args.clone(), method_args: vec![] };
                Some((method, semantics))
            },
            _ => None,
        };
        let getter = accessor(def.getter, getter);
        let setter = accessor(def.setter, setter);

        let mut list = vec![];
        if let Some(receiver) = receiver {
            list.push(self.compile_receiver(receiver, stmts)?);
        }
        for arg in args {
            let mut sub = vec![];
            let js = self.compile_expr(arg, &mut sub)?;
            self.sequence_push(&mut list, stmts, sub, js);
        }
        let mut list = list.into_iter();
        let receiver_js = match receiver {
            Some(_) => list.next(),
            None => None,
        };
        let args_js = list.collect::<Vec<_>>();

        let is_native_indexer = |accessor: &Option<(MethodRef, MethodSemantics)>| {
            matches!(accessor, Some((_, MethodSemantics::NativeIndexer)))
        };
        if is_native_indexer(&setter) && args_js.len() == 1 {
            let object = receiver_js.unwrap_or_else(|| self.this_expr.clone());
            let index = args_js.into_iter().next().unwrap_or(JsExpr::Null);
            return Ok(Location::Native(object.index(index)));
        }

        Ok(Location::Accessor(Box::new(AccessorLocation {
            name: def.name.clone(),
            getter,
            setter,
            receiver: receiver_js,
            args: args_js,
            is_non_virtual: matches!(receiver.map(|r| &r.kind), Some(ExprKind::Base)),
            span,
        })))
    }

    fn read_location(&mut self, location: &Location, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        match location {
            Location::Native(js) | Location::WholeReceiver(js) => Ok(js.clone()),
            Location::MultiDim { array, indices } => {
                let rt = self.ctx.runtime;
                Ok(rt.get_multidim_array_value(array.clone(), indices.clone(), &mut self.rt(stmts))?)
            },
            Location::Accessor(accessor) => match &accessor.getter {
                Some((method, semantics)) => {
                    let args = accessor.args.iter().cloned().map(CallArg::Compiled).collect();
                    self.call_accessor(accessor, method, semantics, args, stmts)
                },
                None => Err(self.report(error!(
                    code="E0703",
                    message("property '{}' cannot be read from script", accessor.name),
                    primary(accessor.span, "read here"),
                ))),
            },
        }
    }

    /// Write a value, producing an expression that evaluates to the new value if
    /// `returns_value` is set.
    fn store(&mut self, location: Location, value: JsExpr, returns_value: bool, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let rt = self.ctx.runtime;
        match location {
            Location::Native(target) => Ok(JsExpr::assign(target, value)),
            Location::MultiDim { array, indices } => {
                Ok(rt.set_multidim_array_value(array, indices, value, &mut self.rt(stmts))?)
            },
            Location::WholeReceiver(target) => Ok(rt.shallow_copy(value, target, &mut self.rt(stmts))?),
            Location::Accessor(accessor) => {
                let (method, semantics) = match &accessor.setter {
                    Some(setter) => setter,
                    None => return Err(self.report(error!(
                        code="E0703",
                        message("property '{}' cannot be assigned from script", accessor.name),
                        primary(accessor.span, "assigned here"),
                    ))),
                };
                // the setter returns nothing, so the value must be kept around
                let value = match returns_value {
                    true => self.ensure_reevaluable(value, stmts),
                    false => value,
                };
                let mut args = accessor.args.iter().cloned().map(CallArg::Compiled).collect::<Vec<_>>();
                args.push(CallArg::Compiled(value.clone()));
                let call = self.call_accessor(&accessor, method, semantics, args, stmts)?;
                match returns_value {
                    true => {
                        stmts.push(JsStmt::Expr(call));
                        Ok(value)
                    },
                    false => Ok(call),
                }
            },
        }
    }

    fn call_accessor(
        &mut self,
        accessor: &AccessorLocation,
        method: &MethodRef,
        semantics: &MethodSemantics,
        args: Vec<CallArg<'_>>,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let receiver = accessor.receiver.clone().map_or(Receiver::None, Receiver::Compiled);
        let site = CallSite {
            is_non_virtual: accessor.is_non_virtual,
            ..CallSite::new(method, receiver, args, accessor.span)
        };
        self.compile_call(semantics, site, stmts)
    }

    /// `e += handler` and `e -= handler`.
    fn compile_event_accessor(
        &mut self,
        op: BinaryOp,
        receiver: Option<&Sp<Expr>>,
        event: &EventRef,
        value: &Sp<Expr>,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let def = self.ctx.program.event(event.id);
        let (adder, remover) = match self.ctx.metadata.event_semantics(event.id) {
            EventSemantics::AddAndRemoveMethods { adder, remover } => (adder, remover),
            EventSemantics::NotUsableFromScript => return Err(self.report(error!(
                code="E0702",
                message("event '{}' is not usable from script", def.name),
                primary(span, "used here"),
            ))),
        };
        let (id, semantics) = match op {
            BinaryOp::Add => (def.adder, adder),
            BinaryOp::Sub => (def.remover, remover),
            _ => return Err(InternalError::UnexpectedNode {
                what: format!("'{}=' on an event", op),
                context: "events only support += and -=",
                span,
            }.into()),
        };
        let method = MethodRef { method: id, type_args: event.type_args.clone(), method_args: vec![] };
        let site = CallSite {
            receiver: receiver.map_or(Receiver::None, Receiver::Expr),
            is_non_virtual: matches!(receiver.map(|r| &r.kind), Some(ExprKind::Base)),
            ..CallSite::new(&method, Receiver::None, vec![CallArg::Expr(value)], span)
        };
        self.compile_call(&semantics, site, stmts)
    }
}
