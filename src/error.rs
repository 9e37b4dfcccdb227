use crate::pos::{FileId, Span};

use codespan_reporting as cs;
pub type Diagnostic = cs::diagnostic::Diagnostic<FileId>;
pub type Label = cs::diagnostic::Label<FileId>;

/// One or more diagnostics, intended to be pretty-printed through [`codespan_reporting`].
///
/// Inside the lowering core these are never returned; they are handed to an
/// [`Emitter`][`crate::diagnostic::Emitter`], which produces an [`ErrorReported`].
#[derive(thiserror::Error, Debug)]
#[must_use = "A CompileError must be emitted or it will not be seen!"]
#[error("a diagnostic wasn't formatted. This is a bug! The diagnostic was: {:?}", .diagnostics)]
pub struct CompileError {
    #[doc(hidden)]
    pub diagnostics: Vec<Diagnostic>
}

impl CompileError {
    pub fn error_count(&self) -> usize { self.diagnostics.len() }
}

/// Token proving that an error was sent to an [`Emitter`][`crate::diagnostic::Emitter`].
///
/// Functions that return `Result<_, ErrorReported>` have already told the user what went wrong;
/// the caller only needs to substitute a placeholder and keep going.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ErrorReported;

/// A problem that indicates a bug upstream of (or inside of) the lowering core.
///
/// The resolver is expected to hand us a program whose every node and symbol is something the
/// target can at least attempt to represent.  When that contract is broken we must not keep
/// generating code, so these are never turned into placeholders.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InternalError {
    #[error("{what} is not valid in this position ({context})")]
    UnexpectedNode { what: String, context: &'static str, span: Span },

    #[error("cannot apply a {kind} conversion from {from} to {to}")]
    UnsupportedConversion { kind: &'static str, from: String, to: String },

    #[error("query clause '{clause}' has no resolved transformation method")]
    MissingQueryMethod { clause: &'static str, span: Span },

    #[error("argument map of a call to '{method}' does not fit its {num_params} parameters")]
    BadArgumentMap { method: String, num_params: usize },

    #[error("type parameter #{index} of {owner} has no runtime representation here")]
    UnboundTypeParameter { owner: String, index: u32 },

    #[error("a statement-bodied function was found, but no body compiler was supplied")]
    NoBodyCompiler { span: Span },

    #[error("{0}")]
    Other(String),
}

lazy_static::lazy_static! {
    pub(crate) static ref TERM_CONFIG: codespan_reporting::term::Config = {
        let mut config = codespan_reporting::term::Config::default();
        // Make output closer to rustc. Fewer colors overall, looks better.
        config.styles.primary_label_error.set_intense(true);
        config.styles.secondary_label.set_intense(true);
        config.styles.line_number.set_intense(true);
        config.styles.source_border.set_intense(true);
        config
    };
}

#[macro_export]
macro_rules! _diagnostic {
    (
        @ $severity:ident,
        $(code=$code:literal,)? message($($message:tt)+)
        $(, primary( $primary_span:expr, $($primary_msg:tt)+ ) )*
        $(, secondary( $secondary_span:expr, $($secondary_msg:tt)+ ) )*
        $(, note( $($note_msg:tt)+ ) )*
        $(,)?
    ) => {{
        #[allow(unused)]
        use $crate::error::{CompileError, Diagnostic, Label};
        #[allow(unused)]
        use $crate::pos::HasSpan;

        CompileError { diagnostics: vec![
            Diagnostic::$severity()
                $( .with_code($code) )?
                .with_message(format!( $($message)+ ))
                .with_labels(vec![
                    $( match HasSpan::span(&$primary_span) {
                        span => Label::primary(span.file_id, span).with_message(format!( $($primary_msg)+ ))
                    } ,)*
                    $( match HasSpan::span(&$secondary_span) {
                        span => Label::secondary(span.file_id, span).with_message(format!( $($secondary_msg)+ ))
                    } ,)*
                ])
                .with_notes(vec![ $(format!( $($note_msg)+ )),* ]),
        ]}
    }};
    ( // shorthand for message only
        @ $severity:ident,
        $message_fmt:literal $(, $message_arg:expr)* $(,)?
    ) => { $crate::_diagnostic!{
        @ $severity,
        message($message_fmt $(, $message_arg)*),
    }};
}

/// Generates a `CompileError` of severity `error`.
///
/// ```
/// # use jslower::{error, Span};
/// # let some_span = Span::NULL;
/// let e = error!(
///     code="E0701",
///     message("cannot assign to constant '{}'", "MAX"),
///     primary(some_span, "assignment happens here"),
///     note("constants are inlined at each use"),
/// );
/// assert_eq!(e.error_count(), 1);
/// ```
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => { $crate::_diagnostic!(@error, $($arg)+) };
}

/// Generates a `CompileError` of severity `warning`.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)+) => { $crate::_diagnostic!(@warning, $($arg)+) };
}
