//! `await` expressions.
//!
//! An await becomes a [`JsStmt::Await`] marker on the statement list, which the statement-level
//! async rewriter turns into a real suspension point.  The expression itself is the call that
//! fetches the result from the awaiter afterwards.

use crate::js::{JsExpr, JsStmt};
use crate::metadata::MethodSemantics;
use crate::model::{Await, Type};
use crate::pos::Span;

use super::invoke::CallSite;
use super::{ExprCompiler, LResult};

impl ExprCompiler<'_> {
    pub(super) fn compile_await(&mut self, await_: &Await, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        if *await_.operand.converted_type() == Type::Dynamic {
            return Err(self.report(error!(
                code="E0707",
                message("cannot await an expression of type 'dynamic'"),
                primary(await_.operand.span, "this has type 'dynamic'"),
                note("cast the operand to an awaitable type first"),
            )));
        }

        let operand = self.compile_expr(&await_.operand, stmts)?;
        let get_awaiter = self.ctx.metadata.method_semantics(await_.get_awaiter.method);
        let is_extension = self.ctx.program.method(await_.get_awaiter.method).is_static;
        let site = CallSite::on_value(&await_.get_awaiter, is_extension, operand, vec![], span);
        let awaiter = self.compile_call(&get_awaiter, site, stmts)?;
        let awaiter = self.bind_temporary(awaiter, stmts);

        let registration = await_.unsafe_on_completed.as_ref().unwrap_or(&await_.on_completed);
        let on_completed = match self.ctx.metadata.method_semantics(registration.method) {
            MethodSemantics::Normal { name, .. } => name,
            _ => return Err(self.report(error!(
                code="E0708",
                message(
                    "'{}' must be implemented as an ordinary method to be used by await",
                    self.ctx.program.method_display(registration.method),
                ),
                primary(span, "awaited here"),
            ))),
        };
        tracing::trace!(awaiter = %awaiter, %on_completed, "suspension point");
        stmts.push(JsStmt::Await { awaiter: JsExpr::ident(awaiter.clone()), on_completed });

        let get_result = self.ctx.metadata.method_semantics(await_.get_result.method);
        let is_extension = self.ctx.program.method(await_.get_result.method).is_static;
        let site = CallSite::on_value(&await_.get_result, is_extension, JsExpr::ident(awaiter), vec![], span);
        self.compile_call(&get_result, site, stmts)
    }
}
