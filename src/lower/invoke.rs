//! Calls of methods, constructors and delegates.
//!
//! All calls funnel through [`ExprCompiler::compile_call_args`], which compiles the receiver and
//! the arguments exactly once in source order and returns them in parameter order.  The binding
//! strategy of the method then decides what the call looks like.

use crate::error::InternalError;
use crate::js::{Effects, JsExpr, JsStmt};
use crate::metadata::{ConstructorSemantics, FieldSemantics, JsonMember, MethodSemantics, PropertySemantics, TypeSemantics};
use crate::model::{Constant, Expr, ExprKind, Initializer, Invocation, MethodKind, MethodRef, ObjectCreation, PropertyRef, Type, TypeKind};
use crate::pos::{Sp, Span};

use super::order::hoist_for_order;
use super::{constant_to_js, AttributeMember, ExprCompiler, ExprFlags, LResult};

/// An argument of a call, in whatever state it's in.
pub(super) enum CallArg<'a> {
    Expr(&'a Sp<Expr>),
    Constant(Constant),
    Compiled(JsExpr),
}

pub(super) enum Receiver<'a> {
    /// No receiver expression.  Instance methods use `this`.
    None,
    Expr(&'a Sp<Expr>),
    Compiled(JsExpr),
}

/// Everything about a call that doesn't depend on the binding strategy.
pub(super) struct CallSite<'a> {
    pub method: &'a MethodRef,
    pub receiver: Receiver<'a>,
    /// In source order.
    pub args: Vec<CallArg<'a>>,
    /// Parameter index of each argument, if not the identity.
    pub arg_map: Option<&'a [usize]>,
    /// The trailing arguments are the elements of the `params` parameter.
    pub expanded: bool,
    pub is_non_virtual: bool,
    pub span: Span,
}

impl<'a> CallSite<'a> {
    pub fn new(method: &'a MethodRef, receiver: Receiver<'a>, args: Vec<CallArg<'a>>, span: Span) -> Self {
        CallSite { method, receiver, args, arg_map: None, expanded: false, is_non_virtual: false, span }
    }

    /// A call on an already compiled value.  Extension methods are static and receive the
    /// value as their first argument.
    pub fn on_value(method: &'a MethodRef, is_static: bool, target: JsExpr, mut args: Vec<CallArg<'a>>, span: Span) -> Self {
        match is_static {
            true => {
                args.insert(0, CallArg::Compiled(target));
                CallSite::new(method, Receiver::None, args, span)
            },
            false => CallSite::new(method, Receiver::Compiled(target), args, span),
        }
    }
}

/// The compiled value for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum ParamValue {
    Single(JsExpr),
    /// Elements of an expanded `params` array.
    Expanded(Vec<JsExpr>),
}

impl ParamValue {
    pub fn into_expr(self) -> JsExpr {
        match self {
            ParamValue::Single(js) => js,
            ParamValue::Expanded(elems) => JsExpr::Array(elems),
        }
    }
}

pub(super) struct CompiledArgs {
    pub receiver: Option<JsExpr>,
    pub params: Vec<ParamValue>,
}

/// Arguments as they are passed to a JavaScript function.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum ArgsOut {
    Direct(Vec<JsExpr>),
    /// The arguments are `leading` followed by the elements of a runtime array.
    Spread { leading: Vec<JsExpr>, array: JsExpr },
}

impl ArgsOut {
    /// Lay out parameter values, spreading the final `params` array into separate arguments if
    /// `expand` is set.
    pub fn from_params(params: Vec<ParamValue>, expand: bool) -> ArgsOut {
        let num_params = params.len();
        let mut out = vec![];
        for (index, param) in params.into_iter().enumerate() {
            let is_last = index + 1 == num_params;
            match param {
                ParamValue::Expanded(elems) if expand && is_last => out.extend(elems),
                ParamValue::Single(JsExpr::Array(elems)) if expand && is_last => out.extend(elems),
                ParamValue::Single(array) if expand && is_last => {
                    return ArgsOut::Spread { leading: out, array };
                },
                param => out.push(param.into_expr()),
            }
        }
        ArgsOut::Direct(out)
    }

    fn prepend(&mut self, first: JsExpr) {
        match self {
            ArgsOut::Direct(args) => args.insert(0, first),
            ArgsOut::Spread { leading, .. } => leading.insert(0, first),
        }
    }
}

/// `[leading...].concat(array)`
fn concat_args(leading: Vec<JsExpr>, array: JsExpr) -> JsExpr {
    match leading.is_empty() {
        true => array,
        false => JsExpr::Array(leading).member("concat").call(vec![array]),
    }
}

/// Call a function with an explicit `this`.
pub(super) fn call_with_this(function: JsExpr, this: JsExpr, args: ArgsOut) -> JsExpr {
    match args {
        ArgsOut::Direct(mut args) => {
            args.insert(0, this);
            function.member("call").call(args)
        },
        ArgsOut::Spread { leading, array } => {
            function.member("apply").call(vec![this, concat_args(leading, array)])
        },
    }
}

/// Rewrite `f.call(a, b...)` into `f.apply(a, [b...].concat(array))`.
fn spread_call(call: JsExpr, array: JsExpr) -> Option<JsExpr> {
    match call {
        JsExpr::Call { callee, mut args } => match *callee {
            JsExpr::Member { object, name } if name == "call" && !args.is_empty() => {
                let this = args.remove(0);
                Some(object.member("apply").call(vec![this, concat_args(args, array)]))
            },
            _ => None,
        },
        _ => None,
    }
}

impl ExprCompiler<'_> {
    pub(super) fn compile_invocation(&mut self, invocation: &Invocation, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let semantics = self.ctx.metadata.method_semantics(invocation.method.method);
        let site = CallSite {
            method: &invocation.method,
            receiver: match &invocation.receiver {
                Some(receiver) => Receiver::Expr(receiver),
                None => Receiver::None,
            },
            args: invocation.args.iter().map(CallArg::Expr).collect(),
            arg_map: invocation.arg_map.as_deref(),
            expanded: invocation.expanded,
            is_non_virtual: invocation.is_non_virtual,
            span,
        };
        self.compile_call(&semantics, site, stmts)
    }

    /// Compile a call of a method with a known binding strategy.
    pub(super) fn compile_call(&mut self, semantics: &MethodSemantics, site: CallSite<'_>, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let program = self.ctx.program;
        let method = site.method;
        let def = program.method(method.method);
        let span = site.span;
        let is_non_virtual = site.is_non_virtual;

        let template_text = match semantics {
            MethodSemantics::NotUsableFromScript => return Err(self.report(error!(
                code="E0702",
                message("method '{}' is not usable from script", program.method_display(method.method)),
                primary(span, "called here"),
            ))),
            MethodSemantics::NativeOperator => return Err(InternalError::UnexpectedNode {
                what: program.method_display(method.method),
                context: "native operators can only be used through operator syntax",
                span,
            }.into()),
            MethodSemantics::InlineCode { template, non_virtual_template, .. } => match (is_non_virtual, non_virtual_template) {
                (true, Some(non_virtual)) => Some(non_virtual),
                _ => Some(template),
            },
            _ => None,
        };

        // arguments first, so that their diagnostics aren't hidden by a bad template
        let CompiledArgs { receiver, params } = self.compile_call_args(site, stmts)?;
        let expand = semantics.expand_params() && def.params_index().is_some();

        if let Some(text) = template_text {
            let template = self.parse_inline_code(text, method, span)?;
            return self.substitute_inline_code(&template, method, receiver, params, span, stmts);
        }
        if let MethodSemantics::Normal { ignore_generic_arguments: false, .. }
            | MethodSemantics::StaticMethodWithThisAsFirstArgument { ignore_generic_arguments: false, .. } = semantics
        {
            self.check_generic_arguments(method, span)?;
        }

        match semantics {
            MethodSemantics::Normal { name, ignore_generic_arguments, .. } => {
                let args = ArgsOut::from_params(params, expand);
                let generic_args = match *ignore_generic_arguments || method.method_args.is_empty() {
                    true => None,
                    false => Some(&method.method_args[..]),
                };
                if def.is_static {
                    let owner = self.declaring_type_object(method, stmts)?;
                    return self.invoke_member(owner, name, generic_args, args, stmts);
                }
                let receiver = receiver.unwrap_or_else(|| self.this_expr.clone());
                if is_non_virtual && def.is_overridable {
                    return self.compile_base_call(method, receiver, args, stmts);
                }
                self.invoke_member(receiver, name, generic_args, args, stmts)
            },

            MethodSemantics::StaticMethodWithThisAsFirstArgument { name, ignore_generic_arguments, .. } => {
                let mut args = ArgsOut::from_params(params, expand);
                args.prepend(receiver.unwrap_or_else(|| self.this_expr.clone()));
                let generic_args = match *ignore_generic_arguments || method.method_args.is_empty() {
                    true => None,
                    false => Some(&method.method_args[..]),
                };
                let owner = self.declaring_type_object(method, stmts)?;
                self.invoke_member(owner, name, generic_args, args, stmts)
            },

            MethodSemantics::InstanceMethodOnFirstArgument { name, .. } => {
                let mut params = params.into_iter();
                let first = match params.next() {
                    Some(first) => first.into_expr(),
                    None => return Err(InternalError::BadArgumentMap {
                        method: program.method_display(method.method),
                        num_params: 0,
                    }.into()),
                };
                let args = ArgsOut::from_params(params.collect(), expand);
                self.invoke_member(first, name, None, args, stmts)
            },

            MethodSemantics::NativeIndexer => {
                let receiver = receiver.unwrap_or_else(|| self.this_expr.clone());
                match <[ParamValue; 1]>::try_from(params) {
                    Ok([index]) => Ok(receiver.index(index.into_expr())),
                    Err(params) => Err(InternalError::Other(format!(
                        "native indexer '{}' called with {} arguments", program.method_display(method.method), params.len(),
                    )).into()),
                }
            },

            MethodSemantics::InlineCode { .. }
            | MethodSemantics::NativeOperator
            | MethodSemantics::NotUsableFromScript => unreachable!("handled above"),
        }
    }

    /// `owner.name(args)`, going through `call`/`apply` when the function must be instantiated
    /// or the arguments spread.
    fn invoke_member(
        &mut self,
        owner: JsExpr,
        name: &str,
        generic_args: Option<&[Type]>,
        args: ArgsOut,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        match (generic_args, args) {
            (None, ArgsOut::Direct(args)) => Ok(owner.member(name).call(args)),
            (generic_args, args) => {
                let owner = self.ensure_reevaluable(owner, stmts);
                let mut function = owner.clone().member(name);
                if let Some(type_args) = generic_args {
                    let rt = self.ctx.runtime;
                    function = rt.instantiate_generic_method(function, type_args, &mut self.rt(stmts))?;
                }
                Ok(call_with_this(function, owner, args))
            },
        }
    }

    fn compile_base_call(&mut self, method: &MethodRef, receiver: JsExpr, args: ArgsOut, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let rt = self.ctx.runtime;
        match args {
            ArgsOut::Direct(mut args) => {
                args.insert(0, receiver);
                Ok(rt.call_base(method, args, &mut self.rt(stmts))?)
            },
            ArgsOut::Spread { mut leading, array } => {
                leading.insert(0, receiver);
                let call = rt.call_base(method, leading, &mut self.rt(stmts))?;
                spread_call(call, array).ok_or_else(|| InternalError::Other(format!(
                    "cannot spread arguments into a base call of '{}'", self.ctx.program.method_display(method.method),
                )).into())
            },
        }
    }

    pub(super) fn declaring_type_object(&mut self, method: &MethodRef, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let declaring = self.ctx.program.method(method.method).declaring;
        let ty = Type::Named { def: declaring, args: method.type_args.clone() };
        let rt = self.ctx.runtime;
        Ok(rt.instantiate_type(&ty, &mut self.rt(stmts))?)
    }

    fn check_generic_arguments(&self, method: &MethodRef, span: Span) -> LResult<()> {
        for arg in &method.method_args {
            if let Some(bad) = self.unusable_type(arg) {
                return Err(self.report(error!(
                    code="E0706",
                    message("cannot instantiate '{}' with type '{}'", self.ctx.program.method_display(method.method), bad),
                    primary(span, "generic method used here"),
                    note("generic arguments are passed at runtime, so they must be usable from script"),
                )));
            }
        }
        Ok(())
    }

    /// Name of the first type in `ty` (including itself) that is not usable from script.
    pub(super) fn unusable_type(&self, ty: &Type) -> Option<String> {
        match ty {
            Type::Named { def, args } => match self.ctx.metadata.type_semantics(*def) {
                TypeSemantics::NotUsableFromScript => Some(ty.display(self.ctx.program)),
                _ => args.iter().find_map(|arg| self.unusable_type(arg)),
            },
            Type::Nullable(inner) | Type::Array { elem: inner, .. } => self.unusable_type(inner),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Arguments

    /// Compile the receiver and arguments of a call in source order, and arrange them in
    /// parameter order.
    pub(super) fn compile_call_args(&mut self, site: CallSite<'_>, stmts: &mut Vec<JsStmt>) -> LResult<CompiledArgs> {
        let program = self.ctx.program;
        let def = program.method(site.method.method);
        let num_params = def.params.len();
        let params_index = def.params_index();
        let bad_map = || InternalError::BadArgumentMap { method: program.method_display(site.method.method), num_params };

        let targets: Vec<usize> = match site.arg_map {
            Some(map) if map.len() != site.args.len() => return Err(bad_map().into()),
            Some(map) => map.to_vec(),
            None => (0..site.args.len()).map(|index| match params_index {
                Some(params_index) if site.expanded && index >= params_index => params_index,
                _ => index,
            }).collect(),
        };
        if targets.iter().any(|&target| target >= num_params) {
            return Err(bad_map().into());
        }

        let mut items = vec![];
        // (output position, source position) of every item
        let mut keys = vec![];

        let has_receiver = match site.receiver {
            Receiver::None if def.is_static || def.kind == MethodKind::Constructor => false,
            Receiver::None => {
                items.push(self.this_expr.clone());
                true
            },
            Receiver::Expr(expr) => {
                let js = self.compile_receiver(expr, stmts)?;
                items.push(js);
                true
            },
            Receiver::Compiled(js) => {
                items.push(js);
                true
            },
        };
        if has_receiver {
            keys.push((0, 0));
        }

        for (index, arg) in site.args.into_iter().enumerate() {
            let param = &def.params[targets[index]];
            let mut sub = vec![];
            let js = match arg {
                CallArg::Expr(expr) if param.is_by_ref() => self.compile_by_ref_arg(expr)?,
                CallArg::Expr(expr) => self.compile_value_for_store(expr, &mut sub)?,
                CallArg::Constant(value) => constant_to_js(&value),
                CallArg::Compiled(js) => js,
            };
            self.sequence_push(&mut items, stmts, sub, js);
            keys.push((targets[index] + 1, index + 1));
        }

        // named arguments may put the arguments in a different order than they are evaluated
        let mut order = (0..items.len()).collect::<Vec<_>>();
        order.sort_by_key(|&index| keys[index]);
        if order.iter().enumerate().any(|(position, &index)| position != index) {
            let mut positions = vec![0; items.len()];
            for (position, &index) in order.iter().enumerate() {
                positions[index] = position;
            }
            let hoisted = hoist_for_order(&mut items, Some(&positions), None, &Effects::default(), self.ctx.temporaries);
            stmts.extend(hoisted);
        }

        let mut items = items.into_iter();
        let receiver = if has_receiver { items.next() } else { None };
        let mut slots = vec![vec![]; num_params];
        for (js, &target) in items.zip(&targets) {
            slots[target].push(js);
        }

        let mut params = vec![];
        for (index, mut values) in slots.into_iter().enumerate() {
            let param = &def.params[index];
            let value = match values.len() {
                _ if site.expanded && Some(index) == params_index => ParamValue::Expanded(values),
                1 => ParamValue::Single(values.remove(0)),
                0 => match &param.default {
                    Some(value) => ParamValue::Single(constant_to_js(value)),
                    None if param.is_params => ParamValue::Expanded(vec![]),
                    None => return Err(bad_map().into()),
                },
                _ => return Err(bad_map().into()),
            };
            params.push(value);
        }
        Ok(CompiledArgs { receiver, params })
    }

    /// A by-reference argument passes the box of a variable rather than its value.
    fn compile_by_ref_arg(&mut self, expr: &Sp<Expr>) -> LResult<JsExpr> {
        if let ExprKind::Local(id) = expr.kind {
            let is_boxed = !self.substitutions.contains_key(&id) && self.ctx.variable(id).use_by_ref_semantics;
            if is_boxed && expr.conversion.is_none() {
                return Ok(self.variable_expr(id));
            }
        }
        Err(self.report(error!(
            code="E0711",
            message("argument for a by-reference parameter must be a by-reference variable"),
            primary(expr.span, "this {} is not stored in a box", expr.descr()),
        )))
    }

    // -------------------------------------------------------------------------
    // Delegates and late binding

    pub(super) fn compile_delegate_invocation(&mut self, delegate: &Sp<Expr>, args: &[Sp<Expr>], span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let program = self.ctx.program;
        let delegate_type = delegate.converted_type();
        let (def, invoke) = match delegate_type.delegate_def(program).map(|def| (def, &program.type_def(def).kind)) {
            Some((def, TypeKind::Delegate { invoke })) => (def, *invoke),
            _ => return Err(InternalError::UnexpectedNode {
                what: delegate.descr().to_owned(),
                context: "only a delegate can be invoked",
                span,
            }.into()),
        };
        let semantics = self.ctx.metadata.delegate_semantics(def);
        let invoke = MethodRef::new(invoke);

        let function = self.compile_expr(delegate, stmts)?;
        let site = CallSite::new(&invoke, Receiver::Compiled(function), args.iter().map(CallArg::Expr).collect(), span);
        let CompiledArgs { receiver, params } = self.compile_call_args(site, stmts)?;
        let function = receiver.unwrap_or(JsExpr::Null);
        let expand = semantics.expand_params && program.method(invoke.method).params_index().is_some();
        let args = ArgsOut::from_params(params, expand);

        match (semantics.bind_this_to_first_parameter, args) {
            (false, ArgsOut::Direct(args)) => Ok(function.call(args)),
            (false, args) => {
                let function = self.ensure_reevaluable(function, stmts);
                Ok(call_with_this(function, JsExpr::Null, args))
            },
            (true, ArgsOut::Direct(mut args)) if !args.is_empty() => {
                let this = args.remove(0);
                Ok(call_with_this(function, this, ArgsOut::Direct(args)))
            },
            (true, ArgsOut::Spread { mut leading, array }) if !leading.is_empty() => {
                let this = leading.remove(0);
                Ok(call_with_this(function, this, ArgsOut::Spread { leading, array }))
            },
            (true, _) => Err(InternalError::Other(format!(
                "delegate type '{}' binds 'this' to its first parameter but has none",
                delegate_type.display(program),
            )).into()),
        }
    }

    pub(super) fn compile_late_bound_call(
        &mut self,
        receiver: Option<&Sp<Expr>>,
        name: &str,
        candidates: &[MethodRef],
        args: &[Sp<Expr>],
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let first = match candidates.first() {
            Some(first) => first,
            None => return self.compile_dynamic_call(receiver, name, args, stmts),
        };

        let semantics = self.ctx.metadata.method_semantics(first.method);
        for other in &candidates[1..] {
            let other_semantics = self.ctx.metadata.method_semantics(other.method);
            let agrees = match (&semantics, &other_semantics) {
                (MethodSemantics::InlineCode { template: a, .. }, MethodSemantics::InlineCode { template: b, .. }) => a == b,
                _ => {
                    std::mem::discriminant(&semantics) == std::mem::discriminant(&other_semantics)
                        && semantics.name() == other_semantics.name()
                        && semantics.expand_params() == other_semantics.expand_params()
                },
            };
            if !agrees {
                return Err(self.report(error!(
                    code="E0704",
                    message("cannot decide at runtime between the overloads of '{}'", name),
                    primary(span, "late-bound call here"),
                    note("'{}' is a {}", self.ctx.program.method_display(first.method), semantics.descr()),
                    note("'{}' is a {}", self.ctx.program.method_display(other.method), other_semantics.descr()),
                )));
            }
        }

        let site = CallSite::new(
            first,
            match receiver {
                Some(receiver) => Receiver::Expr(receiver),
                None => Receiver::None,
            },
            args.iter().map(CallArg::Expr).collect(),
            span,
        );
        self.compile_call(&semantics, site, stmts)
    }

    /// A call on a `dynamic` receiver, or with `dynamic` arguments and no candidates.
    fn compile_dynamic_call(&mut self, receiver: Option<&Sp<Expr>>, name: &str, args: &[Sp<Expr>], stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let mut items = vec![];
        if let Some(receiver) = receiver {
            let js = self.compile_receiver(receiver, stmts)?;
            items.push(js);
        }
        for arg in args {
            let mut sub = vec![];
            let js = self.compile_value_for_store(arg, &mut sub)?;
            self.sequence_push(&mut items, stmts, sub, js);
        }
        match receiver {
            Some(_) => {
                let object = items.remove(0);
                Ok(object.member(name).call(items))
            },
            None => Ok(JsExpr::ident(name).call(items)),
        }
    }

    pub(super) fn compile_late_bound_indexer_get(
        &mut self,
        receiver: &Sp<Expr>,
        candidates: &[PropertyRef],
        args: &[Sp<Expr>],
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        match candidates.first() {
            Some(first) => {
                self.check_indexer_candidates(candidates, span)?;
                self.compile_property_get(Some(receiver), first, args, span, stmts)
            },
            None => {
                let mut items = vec![self.compile_receiver(receiver, stmts)?];
                for arg in args {
                    let mut sub = vec![];
                    let js = self.compile_expr(arg, &mut sub)?;
                    self.sequence_push(&mut items, stmts, sub, js);
                }
                let object = items.remove(0);
                match <[JsExpr; 1]>::try_from(items) {
                    Ok([index]) => Ok(object.index(index)),
                    Err(indices) => {
                        let rt = self.ctx.runtime;
                        Ok(rt.get_multidim_array_value(object, indices, &mut self.rt(stmts))?)
                    },
                }
            },
        }
    }

    /// Late-bound indexer candidates must all compile the same way.
    pub(super) fn check_indexer_candidates(&self, candidates: &[PropertyRef], span: Span) -> LResult<()> {
        let metadata = self.ctx.metadata;
        let shape = |property: &PropertyRef| match metadata.property_semantics(property.id) {
            PropertySemantics::Field { name } => format!("field '{}'", name),
            PropertySemantics::GetAndSetMethods { getter, setter } => {
                let describe = |accessor: Option<MethodSemantics>| match accessor {
                    Some(semantics) => format!("{} {}", semantics.descr(), semantics.name().unwrap_or_default()),
                    None => "none".to_owned(),
                };
                format!("accessors ({}, {})", describe(getter), describe(setter))
            },
            PropertySemantics::NotUsableFromScript => "not usable from script".to_owned(),
        };
        let first = shape(&candidates[0]);
        for other in &candidates[1..] {
            let other_shape = shape(other);
            if other_shape != first {
                return Err(self.report(error!(
                    code="E0704",
                    message("cannot decide at runtime between the indexers of '{}'", self.ctx.program.type_def(self.ctx.program.property(other.id).declaring).name),
                    primary(span, "late-bound indexer here"),
                    note("one candidate is {}", first),
                    note("another candidate is {}", other_shape),
                )));
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Constructors

    pub(super) fn compile_object_creation(&mut self, creation: &ObjectCreation, ty: &Type, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let site = ConstructorSite {
            ctor: creation.ctor.as_ref(),
            ty,
            args: creation.args.iter().map(CallArg::Expr).collect(),
            arg_map: creation.arg_map.as_deref(),
            expanded: creation.expanded,
            initializers: &creation.initializers,
            span,
        };
        self.compile_constructor_call(site, stmts)
    }

    pub(super) fn compile_constructor_call(&mut self, site: ConstructorSite<'_>, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let ConstructorSite { ctor, ty, args, arg_map, expanded, initializers, span } = site;
        if let Some(bad) = self.unusable_type(ty) {
            return Err(self.report(error!(
                code="E0702",
                message("type '{}' is not usable from script", bad),
                primary(span, "constructed here"),
            )));
        }

        let rt = self.ctx.runtime;
        let object = match ctor {
            None if ty.is_value_type(self.ctx.program) => rt.default_value(ty, &mut self.rt(stmts))?,
            None => rt.instantiate_type(ty, &mut self.rt(stmts))?.new_(vec![]),
            Some(ctor) => {
                let semantics = self.ctx.metadata.constructor_semantics(ctor.method);
                let call_site = CallSite { arg_map, expanded, ..CallSite::new(ctor, Receiver::None, args, span) };
                self.compile_constructor_semantics(&semantics, ctor, ty, call_site, initializers, stmts)?
            },
        };

        if initializers.is_empty() {
            return Ok(object);
        }
        let temp = JsExpr::ident(self.bind_temporary(object, stmts));
        self.initialized_objects.push(temp.clone());
        let result = self.compile_initializers(initializers, stmts);
        self.initialized_objects.pop();
        result?;
        Ok(temp)
    }

    fn compile_constructor_semantics(
        &mut self,
        semantics: &ConstructorSemantics,
        ctor: &MethodRef,
        ty: &Type,
        site: CallSite<'_>,
        initializers: &[Initializer],
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let program = self.ctx.program;
        let span = site.span;
        let rt = self.ctx.runtime;
        let expand = semantics.expand_params() && program.method(ctor.method).params_index().is_some();

        match semantics {
            ConstructorSemantics::NotUsableFromScript => Err(self.report(error!(
                code="E0702",
                message("this constructor of '{}' is not usable from script", ty.display(program)),
                primary(span, "called here"),
            ))),

            ConstructorSemantics::Json { param_to_member } => {
                self.check_json_initializers(param_to_member, initializers, ty)?;
                let CompiledArgs { params, .. } = self.compile_call_args(site, stmts)?;
                if params.len() != param_to_member.len() {
                    return Err(InternalError::BadArgumentMap {
                        method: program.method_display(ctor.method),
                        num_params: param_to_member.len(),
                    }.into());
                }
                let mut members = vec![];
                for (member, value) in param_to_member.iter().zip(params) {
                    let name = self.json_member_name(*member, span)?;
                    members.push((name, value.into_expr()));
                }
                Ok(JsExpr::Object(members))
            },

            ConstructorSemantics::InlineCode { template, .. } => {
                let CompiledArgs { params, .. } = self.compile_call_args(site, stmts)?;
                let template = self.parse_inline_code(template, ctor, span)?;
                self.substitute_inline_code(&template, ctor, None, params, span, stmts)
            },

            ConstructorSemantics::Unnamed { .. } | ConstructorSemantics::Named { .. } => {
                let CompiledArgs { params, .. } = self.compile_call_args(site, stmts)?;
                let mut function = rt.instantiate_type(ty, &mut self.rt(stmts))?;
                if let ConstructorSemantics::Named { name, .. } = semantics {
                    function = function.member(name.clone());
                }
                match ArgsOut::from_params(params, expand) {
                    ArgsOut::Direct(args) => Ok(function.new_(args)),
                    ArgsOut::Spread { leading, array } => {
                        Ok(rt.apply_constructor(function, concat_args(leading, array), &mut self.rt(stmts))?)
                    },
                }
            },

            ConstructorSemantics::StaticMethod { name, .. } => {
                let CompiledArgs { params, .. } = self.compile_call_args(site, stmts)?;
                let owner = rt.instantiate_type(ty, &mut self.rt(stmts))?;
                self.invoke_member(owner, name, None, ArgsOut::from_params(params, expand), stmts)
            },
        }
    }

    fn json_member_name(&self, member: JsonMember, span: Span) -> LResult<String> {
        let metadata = self.ctx.metadata;
        let program = self.ctx.program;
        let (name, script_name) = match member {
            JsonMember::Field(id) => (&program.field(id).name, match metadata.field_semantics(id) {
                FieldSemantics::Field { name } => Some(name),
                _ => None,
            }),
            JsonMember::Property(id) => (&program.property(id).name, match metadata.property_semantics(id) {
                PropertySemantics::Field { name } => Some(name),
                _ => None,
            }),
        };
        script_name.ok_or_else(|| self.report(error!(
            code="E0702",
            message("member '{}' cannot be set by a record constructor", name),
            primary(span, "constructed here"),
            note("record constructors can only set members that are stored as plain fields"),
        )))
    }

    /// A member set by a record constructor can't also be set by the initializer.
    fn check_json_initializers(&self, param_to_member: &[JsonMember], initializers: &[Initializer], ty: &Type) -> LResult<()> {
        for initializer in initializers {
            let target = match initializer {
                Initializer::Assign { target, .. } | Initializer::Nested { target, .. } => target,
                Initializer::Add(_) => continue,
            };
            let member = match &target.kind {
                ExprKind::Field { field, .. } => JsonMember::Field(field.id),
                ExprKind::Property { property, .. } => JsonMember::Property(property.id),
                _ => continue,
            };
            if param_to_member.contains(&member) {
                return Err(self.report(error!(
                    code="E0710",
                    message("member of '{}' is initialized twice", ty.display(self.ctx.program)),
                    primary(target.span, "also set by a constructor parameter"),
                )));
            }
        }
        Ok(())
    }

    fn compile_initializers(&mut self, initializers: &[Initializer], stmts: &mut Vec<JsStmt>) -> LResult<()> {
        for initializer in initializers {
            match initializer {
                Initializer::Assign { target, value } => {
                    let js = super::recover(self.compile_assign(target, value, ExprFlags::STATEMENT, target.span, stmts))?;
                    push_effectful(stmts, js);
                },
                Initializer::Nested { target, initializers } => {
                    let js = self.compile_receiver(target, stmts)?;
                    let object = self.ensure_reevaluable(js, stmts);
                    self.initialized_objects.push(object);
                    let result = self.compile_initializers(initializers, stmts);
                    self.initialized_objects.pop();
                    result?;
                },
                Initializer::Add(call) => {
                    let js = self.compile_expr_flags(call, stmts, ExprFlags::STATEMENT)?;
                    push_effectful(stmts, js);
                },
            }
        }
        Ok(())
    }

    /// `: base(...)` or `: this(...)`.
    pub(super) fn compile_chained_constructor(
        &mut self,
        ctor: &MethodRef,
        args: &[Sp<Expr>],
        arg_map: Option<&[usize]>,
        expanded: bool,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let program = self.ctx.program;
        let semantics = self.ctx.metadata.constructor_semantics(ctor.method);
        let name = match &semantics {
            ConstructorSemantics::Unnamed { .. } => None,
            ConstructorSemantics::Named { name, .. } => Some(name.clone()),
            _ => return Err(self.report(error!(
                code="E0712",
                message("cannot chain to a constructor of '{}' from an initializer", program.type_def(program.method(ctor.method).declaring).name),
                primary(span, "chained here"),
                note("only constructors that are invoked with 'new' can be chained to"),
            ))),
        };

        let site = CallSite {
            arg_map,
            expanded,
            ..CallSite::new(ctor, Receiver::None, args.iter().map(CallArg::Expr).collect(), span)
        };
        let CompiledArgs { params, .. } = self.compile_call_args(site, stmts)?;
        let mut function = self.declaring_type_object(ctor, stmts)?;
        if let Some(name) = name {
            function = function.member(name);
        }
        let expand = semantics.expand_params() && program.method(ctor.method).params_index().is_some();
        Ok(call_with_this(function, self.this_expr.clone(), ArgsOut::from_params(params, expand)))
    }

    pub(super) fn compile_attribute(
        &mut self,
        ctor: &MethodRef,
        ty: &Type,
        args: &[Constant],
        named: &[(AttributeMember, Constant)],
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let site = ConstructorSite {
            ctor: Some(ctor),
            ty,
            args: args.iter().cloned().map(CallArg::Constant).collect(),
            arg_map: None,
            expanded: false,
            initializers: &[],
            span,
        };
        let object = self.compile_constructor_call(site, stmts)?;
        if named.is_empty() {
            return Ok(object);
        }

        let temp = JsExpr::ident(self.bind_temporary(object, stmts));
        for (member, value) in named {
            let assignment = self.compile_attribute_member(temp.clone(), member, value, span, stmts)?;
            stmts.push(JsStmt::Expr(assignment));
        }
        Ok(temp)
    }

    fn compile_attribute_member(
        &mut self,
        object: JsExpr,
        member: &AttributeMember,
        value: &Constant,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let program = self.ctx.program;
        let value = constant_to_js(value);
        match member {
            AttributeMember::Field(field) => match self.ctx.metadata.field_semantics(field.id) {
                FieldSemantics::Field { name } => Ok(JsExpr::assign(object.member(name), value)),
                _ => Err(self.report(error!(
                    code="E0702",
                    message("field '{}' cannot be set from script", program.field(field.id).name),
                    primary(span, "set by this attribute"),
                ))),
            },
            AttributeMember::Property(property) => {
                let def = program.property(property.id);
                match (self.ctx.metadata.property_semantics(property.id), def.setter) {
                    (PropertySemantics::Field { name }, _) => Ok(JsExpr::assign(object.member(name), value)),
                    (PropertySemantics::GetAndSetMethods { setter: Some(semantics), .. }, Some(setter)) => {
                        let setter = MethodRef { method: setter, type_args: property.type_args.clone(), method_args: vec![] };
                        let site = CallSite::new(&setter, Receiver::Compiled(object), vec![CallArg::Compiled(value)], span);
                        self.compile_call(&semantics, site, stmts)
                    },
                    _ => Err(self.report(error!(
                        code="E0703",
                        message("property '{}' cannot be set from script", def.name),
                        primary(span, "set by this attribute"),
                    ))),
                }
            },
        }
    }
}

/// A constructor call.
pub(super) struct ConstructorSite<'a> {
    /// `None` for the implicit parameterless constructor.
    pub ctor: Option<&'a MethodRef>,
    pub ty: &'a Type,
    pub args: Vec<CallArg<'a>>,
    pub arg_map: Option<&'a [usize]>,
    pub expanded: bool,
    pub initializers: &'a [Initializer],
    pub span: Span,
}

/// Keep the value of an expression statement only if evaluating it does something.
fn push_effectful(stmts: &mut Vec<JsStmt>, js: JsExpr) {
    if !js.effects().is_pure() {
        stmts.push(JsStmt::Expr(js));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::fmt::stringify;

    fn args(names: &[&str]) -> Vec<JsExpr> { names.iter().map(|&n| JsExpr::ident(n)).collect() }

    #[test]
    fn params_layout() {
        let params = vec![ParamValue::Single(JsExpr::ident("a")), ParamValue::Expanded(args(&["b", "c"]))];
        assert_eq!(ArgsOut::from_params(params.clone(), true), ArgsOut::Direct(args(&["a", "b", "c"])));
        assert_eq!(
            ArgsOut::from_params(params, false),
            ArgsOut::Direct(vec![JsExpr::ident("a"), JsExpr::Array(args(&["b", "c"]))]),
        );

        let params = vec![ParamValue::Single(JsExpr::ident("a")), ParamValue::Single(JsExpr::ident("arr"))];
        let out = ArgsOut::from_params(params, true);
        assert_eq!(out, ArgsOut::Spread { leading: args(&["a"]), array: JsExpr::ident("arr") });
        assert_eq!(stringify(&call_with_this(JsExpr::ident("f"), JsExpr::Null, out)), "f.apply(null, [a].concat(arr))");
    }

    #[test]
    fn spreading_a_base_call() {
        let call = JsExpr::path("B.prototype.m").member("call").call(args(&["this_", "x"]));
        let spread = spread_call(call, JsExpr::ident("rest")).unwrap();
        assert_eq!(stringify(&spread), "B.prototype.m.apply(this_, [x].concat(rest))");
        assert!(spread_call(JsExpr::ident("f").call(vec![]), JsExpr::Null).is_none());
    }
}
