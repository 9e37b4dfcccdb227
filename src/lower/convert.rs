//! Conversions between source types.

use crate::error::InternalError;
use crate::js::{JsExpr, JsStmt};
use crate::metadata::MethodSemantics;
use crate::model::{Conversion, ConversionKind, GenericOwner, MethodRef, Type};
use crate::pos::Span;

use super::invoke::{CallArg, CallSite, Receiver};
use super::{ExprCompiler, LResult};

impl ExprCompiler<'_> {
    /// Apply a conversion chosen by the resolver to a compiled value of type `from`.
    pub(super) fn convert(&mut self, js: JsExpr, from: &Type, conversion: &Conversion, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        use ConversionKind as C;

        let to = &conversion.to;
        let checked = conversion.is_checked;
        match &conversion.kind {
            C::Identity | C::MethodGroup | C::AnonymousFunction | C::ImplicitConstant | C::NullLiteral => Ok(js),

            C::ImplicitReference => self.convert_reference(js, from, to, false, span, stmts),
            C::ExplicitReference => self.convert_reference(js, from, to, true, span, stmts),

            C::Boxing => self.convert_boxing(js, from, to, stmts),

            C::Unboxing => {
                let rt = self.ctx.runtime;
                let mut js = rt.downcast(js, from, to, &mut self.rt(stmts))?;
                if !to.is_nullable() && to.is_value_type(self.ctx.program) && !self.ctx.options.omit_nullable_checks {
                    js = rt.from_nullable(js, &mut self.rt(stmts))?;
                }
                Ok(js)
            },

            C::ImplicitNumeric | C::ExplicitNumeric | C::ImplicitNullable | C::ExplicitNullable => {
                self.convert_numeric(js, from, to, checked, stmts)
            },

            C::ImplicitEnumeration | C::ExplicitEnumeration => match js {
                // the literal 0 converts to every enum type
                JsExpr::Number(x) if x == 0.0 && !from.is_enum(self.ctx.program) => {
                    let rt = self.ctx.runtime;
                    Ok(rt.default_value(to.unwrap_nullable(), &mut self.rt(stmts))?)
                },
                js => self.convert_numeric(js, from, to, checked, stmts),
            },

            C::UserDefined { method, is_lifted } => {
                self.convert_user_defined(js, from, to, method, *is_lifted, checked, span, stmts)
            },

            C::ImplicitDynamic | C::ExplicitDynamic => {
                if *to == Type::Dynamic || *to == Type::OBJECT || *from != Type::Dynamic {
                    return Ok(js);
                }
                let rt = self.ctx.runtime;
                let js = rt.downcast(js, from, to, &mut self.rt(stmts))?;
                match !to.is_nullable() && to.is_value_type(self.ctx.program) && !self.ctx.options.omit_nullable_checks {
                    true => Ok(rt.from_nullable(js, &mut self.rt(stmts))?),
                    false => Ok(js),
                }
            },

            C::Pointer => Err(InternalError::UnsupportedConversion {
                kind: conversion.kind.descr(),
                from: from.display(self.ctx.program),
                to: to.display(self.ctx.program),
            }.into()),
        }
    }

    fn convert_reference(&mut self, js: JsExpr, from: &Type, to: &Type, is_explicit: bool, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let program = self.ctx.program;
        if *from == Type::Null || *to == Type::Dynamic {
            return Ok(js);
        }
        // arrays are covariant at runtime
        if let (Type::Array { .. }, Type::Array { .. }) = (from, to) {
            return Ok(js);
        }
        if let (Some(from_def), Some(to_def)) = (from.delegate_def(program), to.delegate_def(program)) {
            let from_semantics = self.ctx.metadata.delegate_semantics(from_def);
            let to_semantics = self.ctx.metadata.delegate_semantics(to_def);
            if from_semantics != to_semantics {
                return Err(self.report(error!(
                    code="E0709",
                    message("cannot convert between delegate types with different calling conventions"),
                    primary(span, "converts '{}' to '{}'", from.display(program), to.display(program)),
                    note("the delegate types must agree on expanding params and on binding 'this' to the first parameter"),
                )));
            }
            return Ok(js);
        }

        let rt = self.ctx.runtime;
        match is_explicit {
            true if self.ctx.options.omit_downcasts => Ok(js),
            true => Ok(rt.downcast(js, from, to, &mut self.rt(stmts))?),
            false => Ok(rt.upcast(js, from, to, &mut self.rt(stmts))?),
        }
    }

    fn convert_boxing(&mut self, js: JsExpr, from: &Type, to: &Type, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let rt = self.ctx.runtime;
        let js = match self.ctx.metadata.is_mutable_value_type(from) {
            true => rt.clone_value_type(js, from, &mut self.rt(stmts))?,
            false => js,
        };

        if let Type::TypeParam { owner, index } = from {
            if !self.type_param_converts_to(*owner, *index, to) {
                return Ok(rt.downcast(js, from, to, &mut self.rt(stmts))?);
            }
        }
        Ok(rt.upcast(js, from, to, &mut self.rt(stmts))?)
    }

    /// Whether every argument for a type parameter is statically known to convert to a type.
    fn type_param_converts_to(&self, owner: GenericOwner, index: u32, to: &Type) -> bool {
        if *to == Type::OBJECT || *to == Type::Dynamic {
            return true;
        }
        self.ctx.program.type_param(owner, index)
            .map_or(false, |param| param.constraints.contains(to))
    }

    /// Conversions between numeric types, enums, and nullable versions of them.
    fn convert_numeric(&mut self, mut js: JsExpr, from: &Type, to: &Type, checked: bool, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let program = self.ctx.program;
        let options = self.ctx.options;
        let rt = self.ctx.runtime;

        let relift = from.is_nullable() && to.is_nullable();
        if from.is_nullable() && !to.is_nullable() && !options.omit_nullable_checks {
            js = rt.from_nullable(js, &mut self.rt(stmts))?;
        }

        let (from_prim, to_prim) = match (from.numeric_primitive(program), to.numeric_primitive(program)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(js),
        };
        let clip = checked || !options.omit_integer_clipping;
        if !from_prim.is_integral() && to_prim.is_integral() {
            js = rt.float_to_int(js, &mut self.rt(stmts))?;
            js = self.lift_if(relift, js, stmts)?;
            if clip {
                js = rt.clip_integer(js, to_prim, checked, &mut self.rt(stmts))?;
                js = self.lift_if(relift, js, stmts)?;
            }
        } else if from_prim.is_integral() && to_prim.is_integral() && !from_prim.fits_in(to_prim) && clip {
            js = rt.clip_integer(js, to_prim, checked, &mut self.rt(stmts))?;
            js = self.lift_if(relift, js, stmts)?;
        }
        Ok(js)
    }

    pub(super) fn lift_if(&mut self, cond: bool, js: JsExpr, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        match cond {
            true => {
                let rt = self.ctx.runtime;
                Ok(rt.lift(js, &mut self.rt(stmts))?)
            },
            false => Ok(js),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_user_defined(
        &mut self,
        js: JsExpr,
        from: &Type,
        to: &Type,
        method: &MethodRef,
        is_lifted: bool,
        checked: bool,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let def = self.ctx.program.method(method.method);
        let param_ty = match def.params.first() {
            Some(param) => param.ty.substitute(&method.type_args, &method.method_args),
            None => return Err(InternalError::BadArgumentMap {
                method: self.ctx.program.method_display(method.method),
                num_params: 0,
            }.into()),
        };
        let return_ty = def.return_type.substitute(&method.type_args, &method.method_args);

        let operand_ty = if is_lifted { from.unwrap_nullable().clone() } else { from.clone() };
        let operand = self.convert_standard(js, &operand_ty, &param_ty, checked, stmts)?;

        let semantics = self.ctx.metadata.method_semantics(method.method);
        let result = match semantics {
            MethodSemantics::NativeOperator => operand,
            _ => {
                let site = CallSite::new(method, Receiver::None, vec![CallArg::Compiled(operand)], span);
                let call = self.compile_call(&semantics, site, stmts)?;
                self.lift_if(is_lifted, call, stmts)?
            },
        };

        let result_ty = if is_lifted { Type::nullable(return_ty) } else { return_ty };
        self.convert_standard(result, &result_ty, to, checked, stmts)
    }

    /// Conversions that a user-defined conversion implicitly performs before and after calling
    /// its method.
    fn convert_standard(&mut self, js: JsExpr, from: &Type, to: &Type, checked: bool, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let program = self.ctx.program;
        let rt = self.ctx.runtime;
        if from == to || *from == Type::Null {
            return Ok(js);
        }
        let is_numeric = |ty: &Type| ty.numeric_primitive(program).is_some();
        if is_numeric(from) && is_numeric(to) {
            return self.convert_numeric(js, from, to, checked, stmts);
        }
        if let Type::Nullable(inner) = to {
            if **inner == *from {
                return Ok(js);
            }
        }
        if let Type::Nullable(inner) = from {
            if **inner == *to {
                return match self.ctx.options.omit_nullable_checks {
                    true => Ok(js),
                    false => Ok(rt.from_nullable(js, &mut self.rt(stmts))?),
                };
            }
        }
        if from.is_value_type(program) && !to.is_value_type(program) {
            return self.convert_boxing(js, from, to, stmts);
        }
        Ok(rt.upcast(js, from, to, &mut self.rt(stmts))?)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::Primitive;

    /// Whether converting between two integral types can change the value.
    fn is_narrowing(from: Primitive, to: Primitive) -> bool {
        from.is_integral() && to.is_integral() && !from.fits_in(to)
    }

    #[test]
    fn narrowing_table() {
        assert!(is_narrowing(Primitive::Int32, Primitive::Byte));
        assert!(is_narrowing(Primitive::Int32, Primitive::UInt32));
        assert!(is_narrowing(Primitive::UInt32, Primitive::Int32));
        assert!(!is_narrowing(Primitive::UInt16, Primitive::Int32));
        assert!(!is_narrowing(Primitive::Char, Primitive::UInt16));
        assert!(!is_narrowing(Primitive::Double, Primitive::Int32));
    }
}
