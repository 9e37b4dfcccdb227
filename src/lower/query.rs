//! Query expressions.
//!
//! Each clause becomes a call of its resolved transformation method on the sequence produced so
//! far, with function literals for its keys and projections.  While more than one range variable
//! is in scope, the elements of the sequence are carrier objects; a carrier holds the previous
//! element (a range variable or an older carrier) alongside one new range variable.  Function
//! literals read range variables out of their parameter through [`ExprCompiler::substitutions`].

use indexmap::IndexMap;

use crate::error::InternalError;
use crate::js::{walk_expr, JsExpr, JsStmt, Visit};
use crate::model::{Expr, ExprKind, LocalId, MethodRef, Query, QueryBody, QueryClause, QueryEnd, Type};
use crate::pos::{Sp, Span};

use super::invoke::{CallArg, CallSite};
use super::{ExprCompiler, LResult};

/// Member of a carrier that holds the previous carrier.
const NESTED_CARRIER_FIELD: &str = "$carrier";

/// Type of a member of a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CarrierMemberType {
    Type(Type),
    /// Another carrier, by id.
    Carrier(u32),
}

/// Shape of a carrier object synthesized for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierDescriptor {
    pub id: u32,
    pub members: Vec<(String, CarrierMemberType)>,
}

/// Carriers synthesized during one compilation, keyed by shape.
#[derive(Debug, Default)]
pub(super) struct CarrierCache {
    shapes: IndexMap<Vec<(String, CarrierMemberType)>, u32>,
}

impl CarrierCache {
    /// Id of the carrier with these members, and whether it was just created.
    fn get_or_insert(&mut self, members: Vec<(String, CarrierMemberType)>) -> (u32, bool) {
        let next_id = self.shapes.len() as u32;
        match self.shapes.get(&members) {
            Some(&id) => (id, false),
            None => {
                self.shapes.insert(members, next_id);
                (next_id, true)
            },
        }
    }

    pub fn into_descriptors(self) -> Vec<CarrierDescriptor> {
        self.shapes.into_iter().map(|(members, id)| CarrierDescriptor { id, members }).collect()
    }
}

/// What an element of the sequence looks like at some point in a query.
#[derive(Debug, Clone, PartialEq)]
enum QueryContext {
    Range(LocalId),
    Transparent { carrier: u32, left: Box<QueryContext>, right: LocalId },
}

impl QueryContext {
    /// Where every range variable lives relative to an element.
    fn bindings(&self, element: JsExpr, names: &dyn Fn(LocalId) -> String, out: &mut Vec<(LocalId, JsExpr)>) {
        match self {
            QueryContext::Range(id) => out.push((*id, element)),
            QueryContext::Transparent { left, right, .. } => {
                left.bindings(element.clone().member(left.field_name(names)), names, out);
                out.push((*right, element.member(names(*right))));
            },
        }
    }

    /// Name of the member of a carrier that holds this.
    fn field_name(&self, names: &dyn Fn(LocalId) -> String) -> String {
        match self {
            QueryContext::Range(id) => names(*id),
            QueryContext::Transparent { .. } => NESTED_CARRIER_FIELD.to_owned(),
        }
    }

    fn member_type(&self, types: &dyn Fn(LocalId) -> Type) -> CarrierMemberType {
        match self {
            QueryContext::Range(id) => CarrierMemberType::Type(types(*id)),
            QueryContext::Transparent { carrier, .. } => CarrierMemberType::Carrier(*carrier),
        }
    }
}

/// Finds uses of `this` that run when a function is called, skipping nested functions.
#[derive(Default)]
struct UsesThis(bool);

impl Visit for UsesThis {
    fn visit_expr(&mut self, e: &JsExpr) {
        match e {
            JsExpr::This => self.0 = true,
            _ => walk_expr(self, e),
        }
    }

    fn visit_function_body(&mut self, _: &[String], _: &[JsStmt]) {}
}

/// The final expression of a function literal.
enum LambdaResult<'e> {
    Expr(&'e Sp<Expr>),
    /// A carrier of the first parameter's element and the value of the second parameter.
    CarrierOfParams { carrier: &'e QueryContext },
    /// A carrier of the first parameter's element and a new value.
    CarrierOfValue { carrier: &'e QueryContext, value: &'e Sp<Expr> },
}

impl ExprCompiler<'_> {
    pub(super) fn compile_query(&mut self, query: &Query, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let mut current = self.compile_expr(&query.source, stmts)?;
        if let Some(cast) = &query.cast {
            current = self.call_query_method(Some(cast), "from", current, vec![], span, stmts)?;
        }
        self.compile_query_body(&query.body, QueryContext::Range(query.range), current, false, stmts)
    }

    fn compile_query_body(
        &mut self,
        body: &QueryBody,
        mut context: QueryContext,
        mut current: JsExpr,
        is_continuation: bool,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let num_clauses = body.clauses.len();
        // a final from or join can produce the selected value directly
        let mut end_consumed = false;

        for (index, clause) in body.clauses.iter().enumerate() {
            let span = clause.span;
            let select_value = match &body.end.value {
                QueryEnd::Select { value, .. } if index + 1 == num_clauses => Some(value),
                _ => None,
            };

            match &clause.value {
                QueryClause::From { range, source, cast, method } => {
                    let collection = self.compile_query_lambda(&[&context], stmts, |this, _, sub| {
                        let js = this.compile_expr(source, sub)?;
                        match cast {
                            Some(cast) => this.call_query_method(Some(cast), "from", js, vec![], source.span, sub),
                            None => Ok(js),
                        }
                    })?;
                    let new_range = QueryContext::Range(*range);
                    let (result, next) = match select_value {
                        Some(value) => {
                            end_consumed = true;
                            (self.query_result_lambda(&[&context, &new_range], LambdaResult::Expr(value), stmts)?, None)
                        },
                        None => {
                            let carrier = self.carrier_for(&context, *range);
                            let lambda = self.query_result_lambda(&[&context, &new_range], LambdaResult::CarrierOfParams { carrier: &carrier }, stmts)?;
                            (lambda, Some(carrier))
                        },
                    };
                    current = self.call_query_method(method.as_ref(), clause.descr(), current, vec![collection, result], span, stmts)?;
                    if let Some(next) = next {
                        context = next;
                    }
                },

                QueryClause::Let { range, value, method } => {
                    let carrier = self.carrier_for(&context, *range);
                    let lambda = self.query_result_lambda(&[&context], LambdaResult::CarrierOfValue { carrier: &carrier, value }, stmts)?;
                    current = self.call_query_method(method.as_ref(), clause.descr(), current, vec![lambda], span, stmts)?;
                    context = carrier;
                },

                QueryClause::Where { predicate, method } => {
                    let lambda = self.query_result_lambda(&[&context], LambdaResult::Expr(predicate), stmts)?;
                    current = self.call_query_method(method.as_ref(), clause.descr(), current, vec![lambda], span, stmts)?;
                },

                QueryClause::Join { range, source, cast, outer_key, inner_key, into, method } => {
                    let mut sub = vec![];
                    let mut inner = self.compile_expr(source, &mut sub)?;
                    if let Some(cast) = cast {
                        inner = self.call_query_method(Some(cast), "join", inner, vec![], source.span, &mut sub)?;
                    }
                    self.sequence_after(&mut current, stmts, sub);

                    let outer_lambda = self.query_result_lambda(&[&context], LambdaResult::Expr(outer_key), stmts)?;
                    let inner_lambda = self.query_result_lambda(&[&QueryContext::Range(*range)], LambdaResult::Expr(inner_key), stmts)?;

                    // with `into`, the result selector gets the group instead of the element
                    let new_var = into.unwrap_or(*range);
                    let new_range = QueryContext::Range(new_var);
                    let (result, next) = match select_value {
                        Some(value) => {
                            end_consumed = true;
                            (self.query_result_lambda(&[&context, &new_range], LambdaResult::Expr(value), stmts)?, None)
                        },
                        None => {
                            let carrier = self.carrier_for(&context, new_var);
                            let lambda = self.query_result_lambda(&[&context, &new_range], LambdaResult::CarrierOfParams { carrier: &carrier }, stmts)?;
                            (lambda, Some(carrier))
                        },
                    };
                    let args = vec![inner, outer_lambda, inner_lambda, result];
                    current = self.call_query_method(method.as_ref(), clause.descr(), current, args, span, stmts)?;
                    if let Some(next) = next {
                        context = next;
                    }
                },

                QueryClause::OrderBy { orderings } => {
                    for ordering in orderings {
                        let lambda = self.query_result_lambda(&[&context], LambdaResult::Expr(&ordering.key), stmts)?;
                        current = self.call_query_method(ordering.method.as_ref(), clause.descr(), current, vec![lambda], ordering.key.span, stmts)?;
                    }
                },
            }
        }

        if !end_consumed {
            let span = body.end.span;
            current = match &body.end.value {
                QueryEnd::Select { value, method } => {
                    let is_degenerate = match (&context, &value.kind) {
                        (QueryContext::Range(range), ExprKind::Local(id)) => range == id && value.conversion.is_none(),
                        _ => false,
                    };
                    match is_degenerate && (num_clauses > 0 || is_continuation) {
                        true => current,
                        false => {
                            let lambda = self.query_result_lambda(&[&context], LambdaResult::Expr(value), stmts)?;
                            self.call_query_method(method.as_ref(), "select", current, vec![lambda], span, stmts)?
                        },
                    }
                },

                QueryEnd::GroupBy { element, key, method } => {
                    let method_ref = method.as_ref().ok_or(InternalError::MissingQueryMethod { clause: "group by", span })?;
                    let def = self.ctx.program.method(method_ref.method);
                    let num_lambdas = def.params.len().checked_sub(usize::from(def.is_static && def.is_extension))
                        .ok_or_else(|| InternalError::BadArgumentMap {
                            method: self.ctx.program.method_display(method_ref.method),
                            num_params: def.params.len(),
                        })?;

                    let mut lambdas = vec![self.query_result_lambda(&[&context], LambdaResult::Expr(key), stmts)?];
                    if num_lambdas > 1 {
                        lambdas.push(self.query_result_lambda(&[&context], LambdaResult::Expr(element), stmts)?);
                    }
                    self.call_query_method(Some(method_ref), "group by", current, lambdas, span, stmts)?
                },
            };
        }

        match &body.continuation {
            Some(continuation) => {
                let context = QueryContext::Range(continuation.range);
                self.compile_query_body(&continuation.body, context, current, true, stmts)
            },
            None => Ok(current),
        }
    }

    /// Call a transformation method on the sequence.  Extension methods take it as their first
    /// argument.
    fn call_query_method(
        &mut self,
        method: Option<&MethodRef>,
        clause: &'static str,
        source: JsExpr,
        args: Vec<JsExpr>,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let method = method.ok_or(InternalError::MissingQueryMethod { clause, span })?;
        let def = self.ctx.program.method(method.method);
        let semantics = self.ctx.metadata.method_semantics(method.method);

        let args = args.into_iter().map(CallArg::Compiled).collect();
        self.compile_call(&semantics, CallSite::on_value(method, def.is_static, source, args, span), stmts)
    }

    /// Describe a carrier holding the elements of `left` together with a new range variable.
    fn carrier_for(&mut self, left: &QueryContext, right: LocalId) -> QueryContext {
        let ctx = self.ctx;
        let names = |id: LocalId| ctx.variable(id).name;
        let types = |id: LocalId| ctx.program.local(id).ty.clone();
        let members = vec![
            (left.field_name(&names), left.member_type(&types)),
            (names(right), CarrierMemberType::Type(types(right))),
        ];
        let member_names = members.iter().map(|(name, _)| &name[..]).collect::<Vec<_>>().join(", ");
        let (carrier, is_new) = self.carriers.get_or_insert(members);
        match is_new {
            true => tracing::debug!(carrier, members = %member_names, "synthesized query carrier"),
            false => tracing::trace!(carrier, members = %member_names, "reusing query carrier"),
        }
        QueryContext::Transparent { carrier, left: Box::new(left.clone()), right }
    }

    fn query_result_lambda(&mut self, params: &[&QueryContext], result: LambdaResult<'_>, outer: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        self.compile_query_lambda(params, outer, |this, params, sub| match result {
            LambdaResult::Expr(expr) => Ok(this.compile_expr(expr, sub)?),
            LambdaResult::CarrierOfParams { carrier } => {
                let right = params.get(1).cloned().unwrap_or(JsExpr::Null);
                this.construct_carrier(carrier, params[0].clone(), right, sub)
            },
            LambdaResult::CarrierOfValue { carrier, value } => {
                let value = this.compile_value_for_store(value, sub)?;
                this.construct_carrier(carrier, params[0].clone(), value, sub)
            },
        })
    }

    fn construct_carrier(&mut self, carrier: &QueryContext, left: JsExpr, right: JsExpr, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let (left_context, right_var) = match carrier {
            QueryContext::Transparent { left, right, .. } => (left, *right),
            QueryContext::Range(_) => unreachable!("carriers are always transparent"),
        };
        let ctx = self.ctx;
        let names = |id: LocalId| ctx.variable(id).name;
        let members = vec![
            (left_context.field_name(&names), left),
            (names(right_var), right),
        ];
        let rt = self.ctx.runtime;
        Ok(rt.construct_anonymous_object(members, &mut self.rt(stmts))?)
    }

    /// Build a function literal whose parameters are elements of the sequence, with the range
    /// variables they carry in scope.  A function that uses `this` is bound to it, with any
    /// statements for that going to `outer`.
    fn compile_query_lambda(
        &mut self,
        params: &[&QueryContext],
        outer: &mut Vec<JsStmt>,
        body: impl FnOnce(&mut Self, &[JsExpr], &mut Vec<JsStmt>) -> LResult<JsExpr>,
    ) -> LResult<JsExpr> {
        let ctx = self.ctx;
        let names = |id: LocalId| ctx.variable(id).name;
        let param_names = params.iter().map(|context| match context {
            QueryContext::Range(id) => names(*id),
            QueryContext::Transparent { .. } => self.new_temporary(),
        }).collect::<Vec<_>>();

        let mut bindings = vec![];
        for (context, name) in params.iter().zip(&param_names) {
            context.bindings(JsExpr::ident(name.clone()), &names, &mut bindings);
        }
        let saved = self.substitutions.clone();
        self.substitutions.extend(bindings);

        let param_exprs = param_names.iter().cloned().map(JsExpr::ident).collect::<Vec<_>>();
        let mut stmts = vec![];
        let result = body(self, &param_exprs, &mut stmts);
        self.substitutions = saved;
        stmts.push(JsStmt::Return(Some(result?)));

        let mut uses_this = UsesThis::default();
        stmts.iter().for_each(|stmt| uses_this.visit_stmt(stmt));
        let function = JsExpr::Function { params: param_names, body: stmts };
        match uses_this.0 {
            true => {
                let rt = self.ctx.runtime;
                Ok(rt.bind(function, JsExpr::This, &mut self.rt(outer))?)
            },
            false => Ok(function),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carriers_are_cached_by_shape() {
        let mut cache = CarrierCache::default();
        let shape = |a: &str, b: &str| vec![
            (a.to_owned(), CarrierMemberType::Type(Type::INT)),
            (b.to_owned(), CarrierMemberType::Type(Type::STRING)),
        ];
        assert_eq!(cache.get_or_insert(shape("x", "y")), (0, true));
        assert_eq!(cache.get_or_insert(shape("a", "b")), (1, true));
        assert_eq!(cache.get_or_insert(shape("x", "y")), (0, false));

        let nested = vec![
            (NESTED_CARRIER_FIELD.to_owned(), CarrierMemberType::Carrier(0)),
            ("z".to_owned(), CarrierMemberType::Type(Type::BOOL)),
        ];
        assert_eq!(cache.get_or_insert(nested.clone()), (2, true));

        let descriptors = cache.into_descriptors();
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[2], CarrierDescriptor { id: 2, members: nested });
    }

    #[test]
    fn transparent_bindings() {
        let names = |id: LocalId| format!("v{}", id.0);
        let first = QueryContext::Transparent {
            carrier: 0,
            left: Box::new(QueryContext::Range(LocalId(0))),
            right: LocalId(1),
        };
        let second = QueryContext::Transparent { carrier: 1, left: Box::new(first), right: LocalId(2) };

        let mut out = vec![];
        second.bindings(JsExpr::ident("$t"), &names, &mut out);
        assert_eq!(out, vec![
            (LocalId(0), JsExpr::path("$t.$carrier.v0")),
            (LocalId(1), JsExpr::path("$t.$carrier.v1")),
            (LocalId(2), JsExpr::path("$t.v2")),
        ]);
    }
}
