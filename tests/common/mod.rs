//! Helpers shared by the integration tests.

#![allow(dead_code)]

use indexmap::IndexMap;

use jslower::diagnostic::CapturedEmitter;
use jslower::js::fmt::{stringify, stringify_stmts};
use jslower::lower::{compile_expressions, Compiled, Context, ExprCompiler, ExprFlags, VariableData};
use jslower::metadata::ConventionalMetadata;
use jslower::model::{Expr, LocalId, MethodId, Program};
use jslower::runtime::ReferenceRuntime;
use jslower::vm::{JsVm, Value};
use jslower::{CompileOptions, GensymContext, InternalError, Sp};

/// Route `tracing` output through the test harness.  Set `RUST_LOG=jslower=trace` to see it.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Everything needed to lower expressions of one program.
pub struct Lowering<'a> {
    pub program: &'a Program,
    pub metadata: ConventionalMetadata<'a>,
    pub options: CompileOptions,
    pub variables: IndexMap<LocalId, VariableData>,
    /// Method whose body the expressions appear in.
    pub method: Option<MethodId>,
}

pub struct Lowered {
    pub compiled: Compiled,
    pub emitter: CapturedEmitter,
}

impl<'a> Lowering<'a> {
    pub fn new(program: &'a Program) -> Self {
        Lowering {
            program,
            metadata: ConventionalMetadata::new(program),
            options: CompileOptions::default(),
            variables: IndexMap::new(),
            method: None,
        }
    }

    pub fn lower(&self, expr: &Sp<Expr>) -> Lowered {
        self.lower_flags(expr, ExprFlags::default())
    }

    pub fn lower_flags(&self, expr: &Sp<Expr>, flags: ExprFlags) -> Lowered {
        self.lower_with(|compiler| compiler.compile_expression(expr, flags))
    }

    /// Call some entry point of a fresh compiler.
    pub fn lower_with(&self, entry: impl FnOnce(&mut ExprCompiler<'_>) -> Result<Compiled, InternalError>) -> Lowered {
        self.try_lower_with(entry).unwrap()
    }

    /// Lower an expression that may hit an internal error.
    pub fn try_lower(&self, expr: &Sp<Expr>) -> Result<Lowered, InternalError> {
        self.try_lower_with(|compiler| compiler.compile_expression(expr, ExprFlags::default()))
    }

    fn try_lower_with(&self, entry: impl FnOnce(&mut ExprCompiler<'_>) -> Result<Compiled, InternalError>) -> Result<Lowered, InternalError> {
        let emitter = CapturedEmitter::new();
        let compiled = self.with_context(&emitter, |ctx| entry(&mut ctx.compiler()))?;
        Ok(Lowered { compiled, emitter })
    }

    /// Compile several top-level expressions, sharing one emitter.
    pub fn lower_all(&self, exprs: &[Sp<Expr>]) -> (Vec<Compiled>, CapturedEmitter) {
        let emitter = CapturedEmitter::new();
        let compiled = self.with_context(&emitter, |ctx| compile_expressions(ctx, exprs)).unwrap();
        (compiled, emitter)
    }

    fn with_context<R>(&self, emitter: &CapturedEmitter, func: impl FnOnce(&Context<'_>) -> R) -> R {
        init_test_logging();
        let runtime = ReferenceRuntime::new(&self.options);
        let temporaries = GensymContext::with_prefix(&self.options.temporary_prefix);
        let mut ctx = Context::new(self.program, &self.metadata, &runtime, emitter, &temporaries, &self.options)
            .with_variables(&self.variables);
        if let Some(method) = self.method {
            ctx = ctx.in_method(method);
        }
        func(&ctx)
    }
}

impl Lowered {
    /// The generated code, statements first.
    pub fn js(&self) -> String {
        format!("{}{}", stringify_stmts(&self.compiled.stmts), stringify(&self.compiled.expr))
    }

    pub fn error_codes(&self) -> Vec<String> { self.emitter.codes() }

    #[track_caller]
    pub fn assert_no_errors(&self) {
        assert_eq!(self.error_codes(), Vec::<String>::new(), "unexpected diagnostics for:\n{}", self.js());
    }

    /// Run the code in a VM and return the value of the expression.
    #[track_caller]
    pub fn run(&self, vm: &mut JsVm) -> Value {
        match vm.eval_with(&self.compiled.stmts, &self.compiled.expr) {
            Ok(value) => value,
            Err(e) => panic!("{}\nwhile running:\n{}", e, self.js()),
        }
    }
}

/// A global object whose members are logged functions of the same name.
pub fn logged_object(names: &[&str]) -> Value {
    Value::plain(names.iter().map(|&name| (name, Value::logged(name))).collect())
}
