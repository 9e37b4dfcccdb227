//! Function literals and method groups converted to delegates.

use crate::error::InternalError;
use crate::js::{JsExpr, JsStmt};
use crate::metadata::{DelegateSemantics, MethodSemantics};
use crate::model::{Expr, Lambda, LambdaBody, MethodId, MethodRef, NestedFunctionContext, Type, TypeKind};
use crate::pos::{Sp, Span};

use super::invoke::{CallArg, CallSite, Receiver};
use super::{ExprCompiler, LResult};

/// State of the compiler that differs inside of a function literal.
struct FunctionScope {
    nested: Option<NestedFunctionContext>,
    this_expr: JsExpr,
}

impl ExprCompiler<'_> {
    fn enter_function(&mut self, scope: FunctionScope) -> FunctionScope {
        FunctionScope {
            nested: std::mem::replace(&mut self.nested, scope.nested),
            this_expr: std::mem::replace(&mut self.this_expr, scope.this_expr),
        }
    }

    /// Delegate semantics of a delegate type, along with its `Invoke` method.
    fn delegate_info(&self, ty: &Type, span: Span) -> LResult<(DelegateSemantics, MethodId)> {
        let program = self.ctx.program;
        match ty.delegate_def(program).map(|def| (def, &program.type_def(def).kind)) {
            Some((def, TypeKind::Delegate { invoke })) => Ok((self.ctx.metadata.delegate_semantics(def), *invoke)),
            _ => Err(InternalError::UnexpectedNode {
                what: format!("conversion to '{}'", ty.display(program)),
                context: "functions can only be converted to delegate types",
                span,
            }.into()),
        }
    }

    pub(super) fn compile_lambda(&mut self, lambda: &Lambda, delegate_type: &Type, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let (delegate, invoke) = self.delegate_info(delegate_type, span)?;
        let captures = &lambda.captures;

        // what the function literal will be bound to, if anything
        let bind_target = match (captures.captured_by_ref.is_empty(), captures.uses_this) {
            (true, false) => None,
            (true, true) => Some(self.this_expr.clone()),
            (false, _) => {
                let mut members = captures.captured_by_ref.iter()
                    .map(|&id| (self.ctx.variable(id).name, self.variable_expr(id)))
                    .collect::<Vec<_>>();
                if captures.uses_this {
                    members.push(("$this".to_owned(), self.this_expr.clone()));
                }
                Some(JsExpr::Object(members))
            },
        };
        let inner_this = match captures.captured_by_ref.is_empty() {
            true => JsExpr::This,
            false => JsExpr::This.member("$this"),
        };

        let mut params = lambda.params.iter().map(|&id| self.ctx.variable(id).name).collect::<Vec<_>>();
        let mut body = self.params_prologue(&delegate, invoke, &mut params);

        let outer = self.enter_function(FunctionScope { nested: Some(captures.clone()), this_expr: inner_this });
        let compiled_body = self.compile_lambda_body(lambda, span);
        self.enter_function(outer);
        body.extend(compiled_body?);

        let function = JsExpr::Function { params, body };
        let rt = self.ctx.runtime;
        let function = match bind_target {
            Some(target) => rt.bind(function, target, &mut self.rt(stmts))?,
            None => function,
        };
        self.apply_delegate_semantics(function, &delegate, stmts)
    }

    fn compile_lambda_body(&mut self, lambda: &Lambda, span: Span) -> LResult<Vec<JsStmt>> {
        match &lambda.body {
            LambdaBody::Expr(expr) => {
                let mut body = vec![];
                let js = self.compile_expr(expr, &mut body)?;
                match lambda.return_type {
                    Type::Void => {
                        if !js.effects().is_pure() {
                            body.push(JsStmt::Expr(js));
                        }
                    },
                    _ => body.push(JsStmt::Return(Some(js))),
                }
                Ok(body)
            },
            LambdaBody::Block(block) => match self.ctx.body_compiler {
                Some(body_compiler) => Ok(body_compiler.compile_body(&self.ctx, *block, &lambda.captures)?),
                None => Err(InternalError::NoBodyCompiler { span }.into()),
            },
        }
    }

    /// For a delegate that passes its `params` array expanded, removes the last parameter from
    /// `params` and returns a statement that collects it from `arguments`.
    fn params_prologue(&self, delegate: &DelegateSemantics, invoke: MethodId, params: &mut Vec<String>) -> Vec<JsStmt> {
        let index = match self.ctx.program.method(invoke).params_index() {
            Some(index) if delegate.expand_params && index + 1 == params.len() => index,
            _ => return vec![],
        };
        let name = params.remove(index);
        let rest = JsExpr::path("Array.prototype.slice.call")
            .call(vec![JsExpr::ident("arguments"), JsExpr::Number(index as f64)]);
        vec![JsStmt::var(name, rest)]
    }

    fn apply_delegate_semantics(&mut self, function: JsExpr, delegate: &DelegateSemantics, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        match delegate.bind_this_to_first_parameter {
            true => {
                let rt = self.ctx.runtime;
                Ok(rt.bind_first_parameter_to_this(function, &mut self.rt(stmts))?)
            },
            false => Ok(function),
        }
    }

    pub(super) fn compile_method_group(
        &mut self,
        receiver: Option<&Sp<Expr>>,
        method: &MethodRef,
        is_non_virtual: bool,
        delegate_type: &Type,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let program = self.ctx.program;
        let def = program.method(method.method);
        let (delegate, invoke) = self.delegate_info(delegate_type, span)?;
        let semantics = self.ctx.metadata.method_semantics(method.method);

        let receiver = match (receiver, def.is_static) {
            (_, true) => None,
            (Some(receiver), false) => Some(self.compile_receiver(receiver, stmts)?),
            (None, false) => Some(self.this_expr.clone()),
        };

        let rt = self.ctx.runtime;
        if let MethodSemantics::Normal { name, expand_params, ignore_generic_arguments } = &semantics {
            let is_plain = *expand_params == delegate.expand_params && !(is_non_virtual && def.is_overridable);
            if is_plain {
                let generic_args = match *ignore_generic_arguments || method.method_args.is_empty() {
                    true => None,
                    false => Some(&method.method_args[..]),
                };
                let function = match receiver {
                    None => {
                        let owner = self.declaring_type_object(method, stmts)?;
                        let mut function = owner.member(name.clone());
                        if let Some(type_args) = generic_args {
                            function = rt.instantiate_generic_method(function, type_args, &mut self.rt(stmts))?;
                        }
                        function
                    },
                    Some(receiver) => {
                        let receiver = self.ensure_reevaluable(receiver, stmts);
                        let mut function = receiver.clone().member(name.clone());
                        if let Some(type_args) = generic_args {
                            function = rt.instantiate_generic_method(function, type_args, &mut self.rt(stmts))?;
                        }
                        rt.bind(function, receiver, &mut self.rt(stmts))?
                    },
                };
                return self.apply_delegate_semantics(function, &delegate, stmts);
            }
        }

        // anything else is called from a function literal
        tracing::trace!(method = %program.method_display(method.method), "wrapping method group in a function");
        let mut params = def.params.iter().map(|param| param.name.clone()).collect::<Vec<_>>();
        let mut body = self.params_prologue(&delegate, invoke, &mut params);
        let args = def.params.iter().map(|param| CallArg::Compiled(JsExpr::ident(param.name.clone()))).collect();
        let site = CallSite {
            receiver: match receiver {
                Some(_) => Receiver::Compiled(JsExpr::This),
                None => Receiver::None,
            },
            is_non_virtual,
            ..CallSite::new(method, Receiver::None, args, span)
        };
        let outer = self.enter_function(FunctionScope { nested: None, this_expr: JsExpr::This });
        let call = self.compile_call(&semantics, site, &mut body);
        self.enter_function(outer);
        let call = call?;

        body.push(match def.return_type {
            Type::Void => JsStmt::Expr(call),
            _ => JsStmt::Return(Some(call)),
        });
        let function = JsExpr::Function { params, body };
        let function = match receiver {
            Some(receiver) => rt.bind(function, receiver, &mut self.rt(stmts))?,
            None => function,
        };
        self.apply_delegate_semantics(function, &delegate, stmts)
    }
}
