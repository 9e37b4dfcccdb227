//! Expression lowering for a compiler from a statically typed, C#-like source language to
//! JavaScript.
//!
//! The entry point is [`lower::Context`], which bundles the [`model::Program`] under
//! compilation with its [`metadata`] and the [`runtime`] library that generated code targets.
//! Lowering produces [`js`] syntax trees; diagnostics are reported through a
//! [`diagnostic::Emitter`].

#[macro_use]
mod util_macros;

pub use error::{CompileError, InternalError};
#[macro_use]
pub mod error;
pub mod diagnostic;

pub use pos::{Files, Span, Sp};
#[macro_use]
pub mod pos;

pub use ident::GensymContext;
pub mod ident;

pub use options::CompileOptions;
pub mod options;

pub use js::{JsExpr, JsStmt};
pub mod js;

pub mod model;

pub mod metadata;

pub mod runtime;

pub use lower::{compile_expressions, Compiled, Context, ExprFlags};
pub mod lower;

pub mod vm;
