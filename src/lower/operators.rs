//! Built-in and user-defined operators, and the conditionally evaluated expressions.

use crate::js::{BinaryOp as JsBinaryOp, JsExpr, JsStmt, UnaryOp as JsUnaryOp};
use crate::metadata::MethodSemantics;
use crate::model::{BinaryOp, Expr, MethodRef, OperatorInfo, Primitive, Type, UnaryOp};
use crate::pos::{Sp, Span};

use super::invoke::{CallArg, CallSite, Receiver};
use super::{ExprCompiler, LResult};

/// Types involved in a binary operation, after the operands' conversions.
#[derive(Debug, Copy, Clone)]
pub(super) struct OperandTypes<'t> {
    pub left: &'t Type,
    pub right: &'t Type,
    pub result: &'t Type,
}

/// How an integral result must be brought back into the range of its type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum Overflow {
    /// JavaScript already produces the right value.
    None,
    /// Can overflow; wraps around, or throws in a checked context.
    Arithmetic,
    /// Produces a signed 32-bit result that must be reinterpreted.
    Reinterpret,
}

pub(super) fn binary_overflow(op: BinaryOp, prim: Primitive) -> Overflow {
    use BinaryOp as B;
    match op {
        B::Add | B::Sub | B::Mul => Overflow::Arithmetic,
        // already wraps around like int32
        B::Shl if prim == Primitive::Int32 => Overflow::None,
        B::Shl => Overflow::Arithmetic,
        B::BitAnd | B::BitOr | B::BitXor if prim == Primitive::UInt32 => Overflow::Reinterpret,
        _ => Overflow::None,
    }
}

fn unary_overflow(op: UnaryOp, prim: Primitive) -> Overflow {
    match op {
        UnaryOp::Neg => Overflow::Arithmetic,
        UnaryOp::BitNot if prim == Primitive::UInt32 => Overflow::Reinterpret,
        _ => Overflow::None,
    }
}

pub(super) fn native_binary_op(op: BinaryOp, left_is_unsigned: bool) -> JsBinaryOp {
    use BinaryOp as B;
    use JsBinaryOp as J;
    match op {
        B::Add => J::Add,
        B::Sub => J::Sub,
        B::Mul => J::Mul,
        B::Div => J::Div,
        B::Rem => J::Rem,
        B::Shl => J::Shl,
        B::Shr if left_is_unsigned => J::UShr,
        B::Shr => J::Shr,
        B::BitAnd => J::BitAnd,
        B::BitOr => J::BitOr,
        B::BitXor => J::BitXor,
        B::Eq => J::StrictEq,
        B::Ne => J::StrictNe,
        B::Lt => J::Lt,
        B::Le => J::Le,
        B::Gt => J::Gt,
        B::Ge => J::Ge,
        B::AndAlso => J::LogicalAnd,
        B::OrElse => J::LogicalOr,
    }
}

fn native_unary_op(op: UnaryOp) -> JsUnaryOp {
    match op {
        UnaryOp::Plus => JsUnaryOp::Plus,
        UnaryOp::Neg => JsUnaryOp::Neg,
        UnaryOp::Not => JsUnaryOp::Not,
        UnaryOp::BitNot => JsUnaryOp::BitNot,
    }
}

impl ExprCompiler<'_> {
    pub(super) fn compile_unary(
        &mut self,
        op: UnaryOp,
        operand: &Sp<Expr>,
        info: &OperatorInfo,
        ty: &Type,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let js = self.compile_expr(operand, stmts)?;
        self.apply_unary_operator(op, js, ty, info, span, stmts)
    }

    pub(super) fn apply_unary_operator(&mut self, op: UnaryOp, js: JsExpr, result: &Type, info: &OperatorInfo, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        if let Some(method) = &info.method {
            let semantics = self.ctx.metadata.method_semantics(method.method);
            if semantics != MethodSemantics::NativeOperator {
                return self.call_user_operator(method, &semantics, vec![js], info.lifted, span, stmts);
            }
        }

        let js = match (op, info.lifted) {
            // unary plus does nothing to a number
            (UnaryOp::Plus, false) => return Ok(js),
            _ => JsExpr::unary(native_unary_op(op), js),
        };
        let js = self.lift_if(info.lifted, js, stmts)?;
        match result.numeric_primitive(self.ctx.program) {
            Some(prim) if prim.is_integral() => {
                let overflow = unary_overflow(op, prim);
                self.clip_result(js, prim, overflow, info, stmts)
            },
            _ => Ok(js),
        }
    }

    pub(super) fn compile_binary(
        &mut self,
        op: BinaryOp,
        left: &Sp<Expr>,
        right: &Sp<Expr>,
        info: &OperatorInfo,
        ty: &Type,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        if matches!(op, BinaryOp::AndAlso | BinaryOp::OrElse) {
            return self.compile_short_circuit(op, left, right, stmts);
        }

        let mut a = self.compile_expr(left, stmts)?;
        let mut right_stmts = vec![];
        let b = self.compile_expr(right, &mut right_stmts)?;
        self.sequence_after(&mut a, stmts, right_stmts);

        let types = OperandTypes { left: left.converted_type(), right: right.converted_type(), result: ty };
        self.apply_binary_operator(op, a, b, types, info, span, stmts)
    }

    /// Apply a binary operator to operands that were already compiled in order.
    ///
    /// Each operand appears exactly once in the result.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn apply_binary_operator(
        &mut self,
        op: BinaryOp,
        a: JsExpr,
        b: JsExpr,
        types: OperandTypes<'_>,
        info: &OperatorInfo,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        if let Some(method) = &info.method {
            let semantics = self.ctx.metadata.method_semantics(method.method);
            if semantics != MethodSemantics::NativeOperator {
                return self.call_user_operator(method, &semantics, vec![a, b], info.lifted, span, stmts);
            }
        }

        let program = self.ctx.program;
        let rt = self.ctx.runtime;

        if types.result.is_delegate(program) {
            match op {
                BinaryOp::Add => return Ok(rt.combine_delegates(a, b, &mut self.rt(stmts))?),
                BinaryOp::Sub => return Ok(rt.remove_delegate(a, b, &mut self.rt(stmts))?),
                _ => {},
            }
        }

        if op == BinaryOp::Add && (types.left.is_string() || types.right.is_string()) {
            let a = char_to_string(a, types.left);
            let b = char_to_string(b, types.right);
            return Ok(JsExpr::binary(JsBinaryOp::Add, a, b));
        }

        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) && (
            types.left.needs_reference_equality(program) || types.right.needs_reference_equality(program)
        ) {
            return match op {
                BinaryOp::Eq => Ok(rt.reference_equals(a, b, &mut self.rt(stmts))?),
                _ => Ok(rt.reference_not_equals(a, b, &mut self.rt(stmts))?),
            };
        }

        if types.result.unwrap_nullable() == &Type::BOOL && matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor) {
            return self.boolean_operator(op, a, b, info.lifted, stmts);
        }

        let left_prim = types.left.numeric_primitive(program);
        let left_is_unsigned = left_prim.and_then(Primitive::int_range).map_or(false, |range| !range.signed);
        let result_prim = types.result.numeric_primitive(program).filter(|prim| prim.is_integral());

        let exact_multiply = op == BinaryOp::Mul
            && !info.checked
            && !self.ctx.options.omit_integer_clipping
            && matches!(result_prim, Some(Primitive::Int32) | Some(Primitive::UInt32));
        let js = match (op, result_prim) {
            (BinaryOp::Div, Some(_)) => rt.integer_division(a, b, &mut self.rt(stmts))?,
            (BinaryOp::Mul, Some(prim)) if exact_multiply => rt.integer_multiply(a, b, prim, &mut self.rt(stmts))?,
            _ => JsExpr::binary(native_binary_op(op, left_is_unsigned), a, b),
        };
        let js = self.lift_if(info.lifted, js, stmts)?;
        match result_prim {
            // already wrapped
            Some(_) if exact_multiply => Ok(js),
            Some(prim) if !op.is_comparison() => {
                let overflow = binary_overflow(op, prim);
                self.clip_result(js, prim, overflow, info, stmts)
            },
            _ => Ok(js),
        }
    }

    /// `&`, `|` and `^` on booleans, which must not turn into numbers.
    fn boolean_operator(&mut self, op: BinaryOp, a: JsExpr, b: JsExpr, lifted: bool, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let rt = self.ctx.runtime;
        match (op, lifted) {
            (BinaryOp::BitAnd, true) => Ok(rt.lifted_boolean_and(a, b, &mut self.rt(stmts))?),
            (BinaryOp::BitOr, true) => Ok(rt.lifted_boolean_or(a, b, &mut self.rt(stmts))?),
            (BinaryOp::BitXor, true) => {
                let js = JsExpr::binary(JsBinaryOp::StrictNe, a, b);
                self.lift_if(true, js, stmts)
            },
            (BinaryOp::BitXor, false) => Ok(JsExpr::binary(JsBinaryOp::StrictNe, a, b)),
            _ => {
                let js = JsExpr::binary(native_binary_op(op, false), a, b);
                Ok(JsExpr::unary(JsUnaryOp::Not, JsExpr::unary(JsUnaryOp::Not, js)))
            },
        }
    }

    fn clip_result(&mut self, js: JsExpr, prim: Primitive, overflow: Overflow, info: &OperatorInfo, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let checked = info.checked && overflow == Overflow::Arithmetic;
        if overflow == Overflow::None || (!checked && self.ctx.options.omit_integer_clipping) {
            return Ok(js);
        }
        let rt = self.ctx.runtime;
        let js = rt.clip_integer(js, prim, checked, &mut self.rt(stmts))?;
        self.lift_if(info.lifted, js, stmts)
    }

    pub(super) fn call_user_operator(
        &mut self,
        method: &MethodRef,
        semantics: &MethodSemantics,
        args: Vec<JsExpr>,
        lifted: bool,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let args = args.into_iter().map(CallArg::Compiled).collect();
        let site = CallSite::new(method, Receiver::None, args, span);
        let js = self.compile_call(semantics, site, stmts)?;
        self.lift_if(lifted, js, stmts)
    }

    // -------------------------------------------------------------------------
    // Conditional evaluation

    fn compile_short_circuit(&mut self, op: BinaryOp, left: &Sp<Expr>, right: &Sp<Expr>, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let a = self.compile_expr(left, stmts)?;
        let mut right_stmts = vec![];
        let b = self.compile_expr(right, &mut right_stmts)?;

        let js_op = native_binary_op(op, false);
        if right_stmts.is_empty() {
            return Ok(JsExpr::binary(js_op, a, b));
        }

        let temp = self.bind_temporary(a, stmts);
        let cond = match op {
            BinaryOp::AndAlso => JsExpr::ident(temp.clone()),
            _ => JsExpr::unary(JsUnaryOp::Not, JsExpr::ident(temp.clone())),
        };
        right_stmts.push(JsStmt::Expr(JsExpr::assign(JsExpr::ident(temp.clone()), b)));
        stmts.push(JsStmt::If { cond, then: right_stmts, else_: vec![] });
        Ok(JsExpr::ident(temp))
    }

    pub(super) fn compile_conditional(&mut self, cond: &Sp<Expr>, then: &Sp<Expr>, else_: &Sp<Expr>, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let cond = self.compile_expr(cond, stmts)?;
        let mut then_stmts = vec![];
        let then = self.compile_expr(then, &mut then_stmts)?;
        let mut else_stmts = vec![];
        let else_ = self.compile_expr(else_, &mut else_stmts)?;

        if then_stmts.is_empty() && else_stmts.is_empty() {
            return Ok(JsExpr::conditional(cond, then, else_));
        }

        let temp = self.new_temporary();
        stmts.push(JsStmt::Var { name: temp.clone(), init: None });
        then_stmts.push(JsStmt::Expr(JsExpr::assign(JsExpr::ident(temp.clone()), then)));
        else_stmts.push(JsStmt::Expr(JsExpr::assign(JsExpr::ident(temp.clone()), else_)));
        stmts.push(JsStmt::If { cond, then: then_stmts, else_: else_stmts });
        Ok(JsExpr::ident(temp))
    }

    pub(super) fn compile_coalesce(&mut self, left: &Sp<Expr>, right: &Sp<Expr>, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let a = self.compile_expr(left, stmts)?;
        let mut right_stmts = vec![];
        let b = self.compile_expr(right, &mut right_stmts)?;

        let rt = self.ctx.runtime;
        if right_stmts.is_empty() && b.effects().is_pure() {
            return Ok(rt.coalesce(a, b, &mut self.rt(stmts))?);
        }

        let temp = self.bind_temporary(a, stmts);
        let has_value = rt.is_value(JsExpr::ident(temp.clone()), &mut self.rt(stmts))?;
        right_stmts.push(JsStmt::Expr(JsExpr::assign(JsExpr::ident(temp.clone()), b)));
        stmts.push(JsStmt::If {
            cond: JsExpr::unary(JsUnaryOp::Not, has_value),
            then: right_stmts,
            else_: vec![],
        });
        Ok(JsExpr::ident(temp))
    }
}

fn char_to_string(js: JsExpr, ty: &Type) -> JsExpr {
    match ty.unwrap_nullable() {
        Type::Primitive(Primitive::Char) => JsExpr::path("String.fromCharCode").call(vec![js]),
        _ => js,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_classes() {
        assert_eq!(binary_overflow(BinaryOp::Add, Primitive::Int32), Overflow::Arithmetic);
        assert_eq!(binary_overflow(BinaryOp::Shl, Primitive::Int32), Overflow::None);
        assert_eq!(binary_overflow(BinaryOp::Shl, Primitive::Int64), Overflow::Arithmetic);
        assert_eq!(binary_overflow(BinaryOp::BitOr, Primitive::UInt32), Overflow::Reinterpret);
        assert_eq!(binary_overflow(BinaryOp::BitOr, Primitive::Int32), Overflow::None);
        assert_eq!(binary_overflow(BinaryOp::Rem, Primitive::Int32), Overflow::None);
        assert_eq!(unary_overflow(UnaryOp::BitNot, Primitive::UInt32), Overflow::Reinterpret);
    }

    #[test]
    fn unsigned_shift() {
        assert_eq!(native_binary_op(BinaryOp::Shr, true), JsBinaryOp::UShr);
        assert_eq!(native_binary_op(BinaryOp::Shr, false), JsBinaryOp::Shr);
    }
}
