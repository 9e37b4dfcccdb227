//! Lowering of typed expressions into JavaScript.
//!
//! Every expression compiles into a result expression plus a list of statements that must run
//! immediately before it.  The statement list is an explicit accumulator (`stmts: &mut Vec<JsStmt>`)
//! threaded through every function in here.  Code that is only conditionally evaluated (the
//! right side of `&&`, branches of `?:`, function bodies) is compiled into a fresh accumulator
//! and merged back by its parent.
//!
//! Problems that the source program can be blamed for are reported to the [`Emitter`] and the
//! offending node compiles to `null`, so that compilation can continue and find more errors.
//! Problems that indicate a bug in whatever produced the typed tree are [`InternalError`]s and
//! stop compilation.

use indexmap::IndexMap;

use crate::diagnostic::Emitter;
use crate::error::{CompileError, ErrorReported, InternalError};
use crate::ident::TemporaryAllocator;
use crate::js::{JsExpr, JsStmt};
use crate::metadata::{FieldSemantics, MetadataImporter, PropertySemantics};
use crate::model::{
    BlockId, Constant, Conversion, Expr, ExprKind, GenericOwner, LocalId, MethodId, MethodRef,
    NestedFunctionContext, Program, PropertyRef, FieldRef, Type, TypeDefId, MethodKind,
};
use crate::options::CompileOptions;
use crate::pos::{Sp, Span};
use crate::runtime::{RuntimeContext, RuntimeLibrary};

pub use query::CarrierDescriptor;
use query::CarrierCache;

mod order;
mod convert;
mod assign;
mod invoke;
mod inline_code;
mod operators;
mod lambda;
mod query;
mod array;
mod await_;

/// How a local variable is represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableData {
    pub name: String,
    /// The variable is stored in a box object `{ $: value }`, so that it can be shared with
    /// callees (`ref`/`out`) or closures.
    pub use_by_ref_semantics: bool,
}

/// The statement compiler, which statement-bodied function literals are handed back to.
pub trait BodyCompiler {
    fn compile_body(
        &self,
        ctx: &Context<'_>,
        block: BlockId,
        captures: &NestedFunctionContext,
    ) -> Result<Vec<JsStmt>, InternalError>;
}

/// Everything the lowering core reads but never changes.
#[derive(Copy, Clone)]
pub struct Context<'a> {
    pub program: &'a Program,
    pub metadata: &'a dyn MetadataImporter,
    pub runtime: &'a dyn RuntimeLibrary,
    pub emitter: &'a dyn Emitter,
    pub temporaries: &'a dyn TemporaryAllocator,
    pub options: &'a CompileOptions,
    /// Variables missing from here use their source name and no by-ref semantics (unless they
    /// are `ref`/`out` parameters).
    pub variables: Option<&'a IndexMap<LocalId, VariableData>>,
    /// The type whose code is being compiled.
    pub this_type: Option<TypeDefId>,
    /// The method whose body is being compiled.
    pub current_method: Option<MethodId>,
    pub body_compiler: Option<&'a dyn BodyCompiler>,
}

impl<'a> Context<'a> {
    pub fn new(
        program: &'a Program,
        metadata: &'a dyn MetadataImporter,
        runtime: &'a dyn RuntimeLibrary,
        emitter: &'a dyn Emitter,
        temporaries: &'a dyn TemporaryAllocator,
        options: &'a CompileOptions,
    ) -> Self {
        Context {
            program, metadata, runtime, emitter, temporaries, options,
            variables: None,
            this_type: None,
            current_method: None,
            body_compiler: None,
        }
    }

    pub fn with_variables(self, variables: &'a IndexMap<LocalId, VariableData>) -> Self {
        Context { variables: Some(variables), ..self }
    }

    /// Compile code inside the body of a method, which also determines the type of `this`.
    pub fn in_method(self, method: MethodId) -> Self {
        let this_type = Some(self.program.method(method).declaring);
        Context { current_method: Some(method), this_type, ..self }
    }

    pub fn with_body_compiler(self, body_compiler: &'a dyn BodyCompiler) -> Self {
        Context { body_compiler: Some(body_compiler), ..self }
    }

    pub fn compiler(&self) -> ExprCompiler<'a> {
        ExprCompiler {
            ctx: *self,
            carriers: CarrierCache::default(),
            nested: None,
            substitutions: IndexMap::new(),
            this_expr: JsExpr::This,
            initialized_objects: vec![],
        }
    }

    pub fn variable(&self, id: LocalId) -> VariableData {
        if let Some(data) = self.variables.and_then(|vars| vars.get(&id)) {
            return data.clone();
        }
        let local = self.program.local(id);
        VariableData { name: local.name.clone(), use_by_ref_semantics: local.is_ref_param }
    }

    fn is_in_constructor_of(&self, declaring: TypeDefId, is_static: bool) -> bool {
        match self.current_method {
            Some(id) => {
                let method = self.program.method(id);
                let wanted_kind = if is_static { MethodKind::StaticConstructor } else { MethodKind::Constructor };
                method.declaring == declaring && method.kind == wanted_kind
            },
            None => false,
        }
    }
}

/// Output of one of the entry points of [`ExprCompiler`].
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub expr: JsExpr,
    /// Statements that must run immediately before `expr` is evaluated.
    pub stmts: Vec<JsStmt>,
    /// Query carrier types that were synthesized.
    pub carriers: Vec<CarrierDescriptor>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExprFlags {
    /// The value of the expression is used.  When false, assignments can skip saving the value.
    pub returns_value: bool,
    /// A mutable value type read from a multidimensional array may be returned without being
    /// copied, because the caller wants to mutate it in place.
    pub mutable_reference: bool,
}

impl Default for ExprFlags {
    fn default() -> Self { ExprFlags { returns_value: true, mutable_reference: false } }
}

impl ExprFlags {
    pub const STATEMENT: ExprFlags = ExprFlags { returns_value: false, mutable_reference: false };
    const RECEIVER: ExprFlags = ExprFlags { returns_value: true, mutable_reference: true };
}

/// A named member assigned by an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeMember {
    Field(FieldRef),
    Property(PropertyRef),
}

/// Compile each expression independently, collecting all of the diagnostics.
pub fn compile_expressions(ctx: &Context<'_>, exprs: &[Sp<Expr>]) -> Result<Vec<Compiled>, InternalError> {
    exprs.iter().map(|expr| ctx.compiler().compile_expression(expr, ExprFlags::default())).collect()
}

// =============================================================================

/// Failure of a compile function that has already been dealt with by the caller's caller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LowerError {
    /// A diagnostic was emitted; the node becomes a placeholder.
    Reported(ErrorReported),
    Internal(InternalError),
}

impl From<ErrorReported> for LowerError {
    fn from(e: ErrorReported) -> Self { LowerError::Reported(e) }
}

impl From<InternalError> for LowerError {
    fn from(e: InternalError) -> Self { LowerError::Internal(e) }
}

pub(crate) type LResult<T> = Result<T, LowerError>;

/// Compiles expressions for one entry point.
///
/// Obtain one through [`Context::compiler`].
pub struct ExprCompiler<'a> {
    ctx: Context<'a>,
    carriers: CarrierCache,
    /// Captures of the function literal whose body is being compiled.
    nested: Option<NestedFunctionContext>,
    /// Range variables of a query, which are read from carrier objects.
    substitutions: IndexMap<LocalId, JsExpr>,
    /// How to refer to the source `this`.
    this_expr: JsExpr,
    /// Temporaries holding the objects of enclosing object initializers.
    initialized_objects: Vec<JsExpr>,
}

impl<'a> ExprCompiler<'a> {
    fn reset(&mut self) {
        self.carriers = CarrierCache::default();
        self.nested = None;
        self.substitutions.clear();
        self.this_expr = JsExpr::This;
        self.initialized_objects.clear();
    }

    fn finish(&mut self, expr: JsExpr, stmts: Vec<JsStmt>) -> Compiled {
        Compiled { expr, stmts, carriers: std::mem::take(&mut self.carriers).into_descriptors() }
    }

    /// Compile a complete expression.
    pub fn compile_expression(&mut self, expr: &Sp<Expr>, flags: ExprFlags) -> Result<Compiled, InternalError> {
        self.reset();
        let mut stmts = vec![];
        let js = self.compile_expr_flags(expr, &mut stmts, flags)?;
        Ok(self.finish(js, stmts))
    }

    /// Compile a call given a method and its arguments.
    pub fn compile_method_invocation(&mut self, invocation: &crate::model::Invocation, span: Span) -> Result<Compiled, InternalError> {
        self.reset();
        let mut stmts = vec![];
        let js = recover(self.compile_invocation(invocation, span, &mut stmts))?;
        Ok(self.finish(js, stmts))
    }

    /// Compile a constructor call whose arguments are already compiled, in parameter order.
    pub fn compile_constructor_invocation(&mut self, ctor: &MethodRef, ty: &Type, args: Vec<JsExpr>, span: Span) -> Result<Compiled, InternalError> {
        self.reset();
        let mut stmts = vec![];
        let site = invoke::ConstructorSite {
            ctor: Some(ctor),
            ty,
            args: args.into_iter().map(invoke::CallArg::Compiled).collect(),
            arg_map: None,
            expanded: false,
            initializers: &[],
            span,
        };
        let js = recover(self.compile_constructor_call(site, &mut stmts))?;
        Ok(self.finish(js, stmts))
    }

    pub fn compile_property_read(&mut self, receiver: Option<&Sp<Expr>>, property: &PropertyRef, span: Span) -> Result<Compiled, InternalError> {
        self.reset();
        let mut stmts = vec![];
        let js = recover(self.compile_property_get(receiver, property, &[], span, &mut stmts))?;
        Ok(self.finish(js, stmts))
    }

    /// Apply a conversion to an already compiled value of type `from`.
    pub fn compile_conversion(&mut self, expr: JsExpr, from: &Type, conversion: &Conversion, span: Span) -> Result<Compiled, InternalError> {
        self.reset();
        let mut stmts = vec![];
        let js = recover(self.convert(expr, from, conversion, span, &mut stmts))?;
        Ok(self.finish(js, stmts))
    }

    /// Compile `: base(...)` or `: this(...)` at the start of a constructor body.
    ///
    /// The chained call is the last of the returned statements; the returned expression is
    /// always `null`.
    pub fn compile_constructor_initializer(
        &mut self,
        ctor: &MethodRef,
        args: &[Sp<Expr>],
        arg_map: Option<&[usize]>,
        expanded: bool,
        span: Span,
    ) -> Result<Compiled, InternalError> {
        self.reset();
        let mut stmts = vec![];
        match self.compile_chained_constructor(ctor, args, arg_map, expanded, span, &mut stmts) {
            Ok(call) => stmts.push(JsStmt::Expr(call)),
            Err(LowerError::Reported(_)) => {},
            Err(LowerError::Internal(e)) => return Err(e),
        }
        Ok(self.finish(JsExpr::Null, stmts))
    }

    /// Compile the construction of an attribute: a constructor call with constant arguments
    /// (in parameter order), followed by assignments of constants to named members.
    pub fn compile_attribute_construction(
        &mut self,
        ctor: &MethodRef,
        ty: &Type,
        args: &[Constant],
        named: &[(AttributeMember, Constant)],
        span: Span,
    ) -> Result<Compiled, InternalError> {
        self.reset();
        let mut stmts = vec![];
        let js = recover(self.compile_attribute(ctor, ty, args, named, span, &mut stmts))?;
        Ok(self.finish(js, stmts))
    }
}

/// Turn reported errors into a placeholder.
fn recover(result: LResult<JsExpr>) -> Result<JsExpr, InternalError> {
    match result {
        Ok(js) => Ok(js),
        Err(LowerError::Reported(_)) => Ok(JsExpr::Null),
        Err(LowerError::Internal(e)) => Err(e),
    }
}

pub(crate) fn constant_to_js(value: &Constant) -> JsExpr {
    match value {
        Constant::Null => JsExpr::Null,
        Constant::Bool(b) => JsExpr::Bool(*b),
        Constant::Int(x) => JsExpr::Number(*x as f64),
        Constant::Float(x) => JsExpr::Number(*x),
        Constant::Char(c) => JsExpr::Number(*c as u32 as f64),
        Constant::String(s) => JsExpr::String(s.clone()),
    }
}

// =============================================================================
// The visitor

impl<'a> ExprCompiler<'a> {
    fn report(&self, error: CompileError) -> LowerError {
        self.ctx.emitter.emit(error).into()
    }

    /// Compile a node whose value is needed, applying its conversion.
    fn compile_expr(&mut self, expr: &Sp<Expr>, stmts: &mut Vec<JsStmt>) -> Result<JsExpr, InternalError> {
        self.compile_expr_flags(expr, stmts, ExprFlags::default())
    }

    fn compile_expr_flags(&mut self, expr: &Sp<Expr>, stmts: &mut Vec<JsStmt>, flags: ExprFlags) -> Result<JsExpr, InternalError> {
        recover(self.compile_expr_inner(expr, stmts, flags))
    }

    fn compile_expr_inner(&mut self, expr: &Sp<Expr>, stmts: &mut Vec<JsStmt>, flags: ExprFlags) -> LResult<JsExpr> {
        let js = self.compile_node(expr, stmts, flags)?;
        match &expr.conversion {
            Some(conversion) => self.convert(js, &expr.ty, conversion, expr.span, stmts),
            None => Ok(js),
        }
    }

    /// Compile a receiver of a member access or call.
    fn compile_receiver(&mut self, expr: &Sp<Expr>, stmts: &mut Vec<JsStmt>) -> Result<JsExpr, InternalError> {
        self.compile_expr_flags(expr, stmts, ExprFlags::RECEIVER)
    }

    /// Compile a value that is about to be stored somewhere, copying it if it's a mutable value
    /// type that still lives in some other location.
    fn compile_value_for_store(&mut self, expr: &Sp<Expr>, stmts: &mut Vec<JsStmt>) -> Result<JsExpr, InternalError> {
        let js = self.compile_expr(expr, stmts)?;
        recover(self.clone_if_location_read(expr, js, stmts))
    }

    fn clone_if_location_read(&mut self, expr: &Sp<Expr>, js: JsExpr, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let ty = expr.converted_type();
        if !self.ctx.metadata.is_mutable_value_type(ty) || !self.is_location_read(expr) {
            return Ok(js);
        }
        let rt = self.ctx.runtime;
        Ok(rt.clone_value_type(js, ty, &mut self.rt(stmts))?)
    }

    fn is_location_read(&self, expr: &Expr) -> bool {
        use crate::model::ConversionKind as C;
        let conversion_keeps_identity = match &expr.conversion {
            None => true,
            Some(conversion) => matches!(conversion.kind, C::Identity | C::ImplicitNullable | C::ExplicitNullable),
        };
        conversion_keeps_identity && match &expr.kind {
            ExprKind::Local(_) | ExprKind::This | ExprKind::Field { .. } => true,
            // multidimensional reads are already copies
            ExprKind::ArrayElement { indices, .. } => indices.len() == 1,
            ExprKind::Property { property, .. } => matches!(
                self.ctx.metadata.property_semantics(property.id),
                PropertySemantics::Field { .. },
            ),
            _ => false,
        }
    }

    fn compile_node(&mut self, expr: &Sp<Expr>, stmts: &mut Vec<JsStmt>, flags: ExprFlags) -> LResult<JsExpr> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(value) => Ok(constant_to_js(value)),

            ExprKind::Default => {
                let rt = self.ctx.runtime;
                Ok(rt.default_value(&expr.ty, &mut self.rt(stmts))?)
            },

            ExprKind::Local(id) => Ok(self.read_local(*id)),

            ExprKind::This | ExprKind::Base => Ok(self.this_expr.clone()),

            ExprKind::Field { receiver, field } => self.compile_field_read(receiver.as_deref(), field, span, stmts),

            ExprKind::Property { receiver, property, args } => {
                self.compile_property_get(receiver.as_deref(), property, args, span, stmts)
            },

            ExprKind::Event { .. } => Err(InternalError::UnexpectedNode {
                what: expr.descr().to_owned(),
                context: "events can only be the target of += or -=",
                span,
            }.into()),

            ExprKind::MethodGroup { receiver, method, is_non_virtual } => {
                let delegate_type = match &expr.conversion {
                    Some(conversion) => conversion.to.clone(),
                    None => return Err(InternalError::UnexpectedNode {
                        what: expr.descr().to_owned(),
                        context: "a method group must be converted to a delegate",
                        span,
                    }.into()),
                };
                self.compile_method_group(receiver.as_deref(), method, *is_non_virtual, &delegate_type, span, stmts)
            },

            ExprKind::Invocation(invocation) => self.compile_invocation(invocation, span, stmts),

            ExprKind::DelegateInvocation { delegate, args } => self.compile_delegate_invocation(delegate, args, span, stmts),

            ExprKind::LateBoundCall { receiver, name, candidates, args } => {
                self.compile_late_bound_call(receiver.as_deref(), name, candidates, args, span, stmts)
            },

            ExprKind::LateBoundIndexer { receiver, candidates, args } => {
                self.compile_late_bound_indexer_get(receiver, candidates, args, span, stmts)
            },

            ExprKind::LateBoundMember { receiver, name } => {
                let object = self.compile_receiver(receiver, stmts)?;
                Ok(object.member(name.clone()))
            },

            ExprKind::ObjectCreation(creation) => self.compile_object_creation(creation, &expr.ty, span, stmts),

            ExprKind::ArrayCreation { elem, sizes, init } => {
                self.compile_array_creation(elem, sizes, init.as_ref(), &expr.ty, stmts)
            },

            ExprKind::ArrayElement { array, indices } => {
                self.compile_array_element_read(array, indices, &expr.ty, flags, stmts)
            },

            ExprKind::Unary { op, operand, info } => self.compile_unary(*op, operand, info, &expr.ty, span, stmts),

            ExprKind::Binary { op, left, right, info } => self.compile_binary(*op, left, right, info, &expr.ty, span, stmts),

            ExprKind::Assign { target, value } => self.compile_assign(target, value, flags, span, stmts),

            ExprKind::CompoundAssign { op, target, value, info } => {
                self.compile_compound_assign(*op, target, value, info, flags, span, stmts)
            },

            ExprKind::IncDec { op, target, info } => self.compile_inc_dec(*op, target, info, flags, span, stmts),

            ExprKind::Conditional { cond, then, else_ } => self.compile_conditional(cond, then, else_, stmts),

            ExprKind::Coalesce { left, right } => self.compile_coalesce(left, right, stmts),

            ExprKind::Cast { operand, conversion } => {
                let js = self.compile_expr(operand, stmts)?;
                self.convert(js, operand.converted_type(), conversion, span, stmts)
            },

            ExprKind::Is { operand, target } => {
                let js = self.compile_expr(operand, stmts)?;
                let rt = self.ctx.runtime;
                Ok(rt.type_is(js, operand.converted_type(), target, &mut self.rt(stmts))?)
            },

            ExprKind::As { operand, target } => {
                let js = self.compile_expr(operand, stmts)?;
                let rt = self.ctx.runtime;
                Ok(rt.try_downcast(js, operand.converted_type(), target, &mut self.rt(stmts))?)
            },

            ExprKind::TypeOf(ty) => {
                self.check_type_usable(ty, span)?;
                let rt = self.ctx.runtime;
                Ok(rt.instantiate_type(ty, &mut self.rt(stmts))?)
            },

            ExprKind::Lambda(lambda) => {
                let delegate_type = match &expr.conversion {
                    Some(conversion) => conversion.to.clone(),
                    None => return Err(InternalError::UnexpectedNode {
                        what: expr.descr().to_owned(),
                        context: "an anonymous function must be converted to a delegate",
                        span,
                    }.into()),
                };
                self.compile_lambda(lambda, &delegate_type, span, stmts)
            },

            ExprKind::Await(await_) => self.compile_await(await_, span, stmts),

            ExprKind::Query(query) => self.compile_query(query, span, stmts),

            ExprKind::AnonymousObject { members } => {
                let mut values = vec![];
                for (_, value) in members {
                    let mut sub = vec![];
                    let js = self.compile_value_for_store(value, &mut sub)?;
                    self.sequence_push(&mut values, stmts, sub, js);
                }
                let members = members.iter().map(|(name, _)| name.clone()).zip(values).collect();
                let rt = self.ctx.runtime;
                Ok(rt.construct_anonymous_object(members, &mut self.rt(stmts))?)
            },

            ExprKind::InitializedObject => match self.initialized_objects.last() {
                Some(object) => Ok(object.clone()),
                None => Err(InternalError::UnexpectedNode {
                    what: expr.descr().to_owned(),
                    context: "outside of an object initializer",
                    span,
                }.into()),
            },
        }
    }

    // -------------------------------------------------------------------------
    // Variables and simple members

    /// JavaScript for a variable, ignoring by-ref boxing.
    fn variable_expr(&self, id: LocalId) -> JsExpr {
        if let Some(substitute) = self.substitutions.get(&id) {
            return substitute.clone();
        }
        let data = self.ctx.variable(id);
        let captured_by_ref = self.nested.as_ref().map_or(false, |nested| nested.captured_by_ref.contains(&id));
        match captured_by_ref {
            true => JsExpr::This.member(data.name),
            false => JsExpr::ident(data.name),
        }
    }

    /// An assignable JavaScript expression for a variable.
    fn local_location(&self, id: LocalId) -> JsExpr {
        let base = self.variable_expr(id);
        match self.substitutions.contains_key(&id) || !self.ctx.variable(id).use_by_ref_semantics {
            true => base,
            false => base.member("$"),
        }
    }

    fn read_local(&self, id: LocalId) -> JsExpr { self.local_location(id) }

    fn type_object(&mut self, ty: TypeDefId, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let rt = self.ctx.runtime;
        Ok(rt.instantiate_type(&Type::named(ty), &mut self.rt(stmts))?)
    }

    fn check_type_usable(&self, ty: &Type, span: Span) -> LResult<()> {
        match self.unusable_type(ty) {
            Some(name) => Err(self.report(error!(
                code="E0702",
                message("type '{}' is not usable from script", name),
                primary(span, "used here"),
            ))),
            None => Ok(()),
        }
    }

    fn compile_field_read(&mut self, receiver: Option<&Sp<Expr>>, field: &FieldRef, span: Span, stmts: &mut Vec<JsStmt>) -> LResult<JsExpr> {
        let def = self.ctx.program.field(field.id);
        match self.ctx.metadata.field_semantics(field.id) {
            FieldSemantics::Constant { value } => {
                // the receiver could still have side effects
                if let Some(receiver) = receiver {
                    let js = self.compile_receiver(receiver, stmts)?;
                    if !js.effects().is_pure() {
                        stmts.push(JsStmt::Expr(js));
                    }
                }
                Ok(constant_to_js(&value))
            },
            FieldSemantics::Field { name } => {
                let object = match receiver {
                    Some(receiver) => self.compile_receiver(receiver, stmts)?,
                    None if def.is_static => self.type_object(def.declaring, stmts)?,
                    None => self.this_expr.clone(),
                };
                Ok(object.member(name))
            },
            FieldSemantics::NotUsableFromScript => Err(self.report(error!(
                code="E0702",
                message("field '{}' is not usable from script", def.name),
                primary(span, "used here"),
            ))),
        }
    }

    /// Read a property or indexer.
    fn compile_property_get(
        &mut self,
        receiver: Option<&Sp<Expr>>,
        property: &PropertyRef,
        args: &[Sp<Expr>],
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let def = self.ctx.program.property(property.id);
        match self.ctx.metadata.property_semantics(property.id) {
            PropertySemantics::Field { name } => {
                let object = match receiver {
                    Some(receiver) => self.compile_receiver(receiver, stmts)?,
                    None if def.is_static => self.type_object(def.declaring, stmts)?,
                    None => self.this_expr.clone(),
                };
                Ok(object.member(name))
            },
            PropertySemantics::GetAndSetMethods { getter: Some(semantics), .. } if semantics != crate::metadata::MethodSemantics::NotUsableFromScript => {
                let getter = def.getter.ok_or_else(|| InternalError::Other(format!(
                    "property '{}' has getter semantics but no getter", def.name,
                )))?;
                let method = MethodRef { method: getter, type_args: property.type_args.clone(), method_args: vec![] };
                let is_non_virtual = matches!(receiver.map(|r| &r.kind), Some(ExprKind::Base));
                let args = args.iter().map(invoke::CallArg::Expr).collect();
                let site = invoke::CallSite {
                    receiver: receiver.map_or(invoke::Receiver::None, invoke::Receiver::Expr),
                    is_non_virtual,
                    ..invoke::CallSite::new(&method, invoke::Receiver::None, args, span)
                };
                self.compile_call(&semantics, site, stmts)
            },
            PropertySemantics::GetAndSetMethods { .. } => Err(self.report(error!(
                code="E0703",
                message("property '{}' cannot be read from script", def.name),
                primary(span, "read here"),
            ))),
            PropertySemantics::NotUsableFromScript => Err(self.report(error!(
                code="E0702",
                message("property '{}' is not usable from script", def.name),
                primary(span, "used here"),
            ))),
        }
    }

    // -------------------------------------------------------------------------
    // Runtime library access

    /// Gives the runtime library access to this compiler.
    fn rt<'s>(&self, stmts: &'s mut Vec<JsStmt>) -> CompilerRuntimeContext<'a, 's> {
        CompilerRuntimeContext { ctx: self.ctx, stmts }
    }

    fn new_temporary(&self) -> String { self.ctx.temporaries.new_temporary() }
}

struct CompilerRuntimeContext<'a, 's> {
    ctx: Context<'a>,
    stmts: &'s mut Vec<JsStmt>,
}

impl RuntimeContext for CompilerRuntimeContext<'_, '_> {
    fn program(&self) -> &Program { self.ctx.program }
    fn metadata(&self) -> &dyn MetadataImporter { self.ctx.metadata }

    fn resolve_type_parameter(&mut self, owner: GenericOwner, index: u32) -> Result<JsExpr, InternalError> {
        match self.ctx.program.type_param(owner, index) {
            Some(param) => Ok(JsExpr::ident(param.name.clone())),
            None => Err(InternalError::UnboundTypeParameter { owner: format!("{:?}", owner), index }),
        }
    }

    fn ensure_can_be_evaluated_multiple_times(&mut self, expr: JsExpr) -> JsExpr {
        order::ensure_reevaluable(expr, self.ctx.temporaries, self.stmts)
    }
}
