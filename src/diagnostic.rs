//! Diagnostic sinks.
//!
//! The lowering core reports every diagnosable problem through `&dyn Emitter` and then carries
//! on with a placeholder, so that a single run can report many errors.

use std::cell::RefCell;

use codespan_reporting as cs;
use cs::term::termcolor as tc;

use crate::error::{CompileError, Diagnostic, ErrorReported, TERM_CONFIG};
use crate::pos::Files;

/// Something that receives diagnostics.
///
/// Emitting takes `&self`, so one emitter can be shared by every compiler session spawned
/// during a compilation.
pub trait Emitter {
    /// Record a diagnostic.
    ///
    /// Returns [`ErrorReported`] so that it can be used like `return Err(emitter.emit(e).into())`.
    fn emit(&self, error: CompileError) -> ErrorReported;
}

/// An [`Emitter`] that keeps everything in memory.
///
/// This is what tests use, and what an embedder should use if it wants to decide for itself
/// how to present the diagnostics.
#[derive(Debug, Default)]
pub struct CapturedEmitter {
    captured: RefCell<Vec<Diagnostic>>,
}

impl CapturedEmitter {
    pub fn new() -> Self { Self::default() }

    pub fn diagnostics(&self) -> Vec<Diagnostic> { self.captured.borrow().clone() }

    pub fn error_count(&self) -> usize {
        self.captured.borrow().iter()
            .filter(|d| d.severity >= cs::diagnostic::Severity::Error)
            .count()
    }

    /// The codes of all captured diagnostics, in the order they were emitted.
    pub fn codes(&self) -> Vec<String> {
        self.captured.borrow().iter().filter_map(|d| d.code.clone()).collect()
    }

    /// Render all captured diagnostics as uncolored text.
    ///
    /// Labels whose spans don't belong to any file in `files` are dropped rather than rendered.
    pub fn render(&self, files: &Files) -> String {
        let mut writer = tc::NoColor::new(vec![]);
        for diagnostic in self.captured.borrow().iter() {
            let diagnostic = without_dummy_labels(diagnostic);
            // writing into a Vec can't fail, and every remaining label has a file
            let _ = cs::term::emit(&mut writer, &*TERM_CONFIG, files, &diagnostic);
        }
        String::from_utf8_lossy(&writer.into_inner()).into_owned()
    }
}

impl Emitter for CapturedEmitter {
    fn emit(&self, error: CompileError) -> ErrorReported {
        tracing::debug!(count = error.diagnostics.len(), "captured diagnostics");
        self.captured.borrow_mut().extend(error.diagnostics);
        ErrorReported
    }
}

/// An [`Emitter`] that immediately writes to the standard error stream.
pub struct StderrEmitter<'a> {
    files: &'a Files,
}

impl<'a> StderrEmitter<'a> {
    pub fn new(files: &'a Files) -> Self { StderrEmitter { files } }
}

impl Emitter for StderrEmitter<'_> {
    fn emit(&self, error: CompileError) -> ErrorReported {
        let writer = tc::StandardStream::stderr(stderr_color_choice());
        for diagnostic in &error.diagnostics {
            let diagnostic = without_dummy_labels(diagnostic);
            // STDERR not being writable is hardly any reason to stop what we're doing
            let _ = cs::term::emit(&mut writer.lock(), &*TERM_CONFIG, self.files, &diagnostic);
        }
        ErrorReported
    }
}

fn stderr_color_choice() -> tc::ColorChoice {
    match atty::is(atty::Stream::Stderr) {
        true => tc::ColorChoice::Auto,
        false => tc::ColorChoice::Never,
    }
}

fn without_dummy_labels(diagnostic: &Diagnostic) -> Diagnostic {
    let mut diagnostic = diagnostic.clone();
    diagnostic.labels.retain(|label| label.file_id.is_some());
    diagnostic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Span;

    #[test]
    fn captured_emitter_renders_labels() {
        let files = Files::new();
        let file_id = files.add("<input>", "x = MAX;");
        let emitter = CapturedEmitter::new();
        emitter.emit(error!(
            code="E0701",
            message("cannot assign to constant 'MAX'"),
            primary(Span::new(file_id, 4, 7), "this is a constant"),
        ));
        // no file; label gets dropped
        emitter.emit(error!(code="E0702", message("no labels"), primary(Span::NULL, "dropped")));

        assert_eq!(emitter.codes(), vec!["E0701", "E0702"]);
        assert_eq!(emitter.error_count(), 2);
        let text = emitter.render(&files);
        assert!(text.contains("error[E0701]: cannot assign to constant 'MAX'"), "{}", text);
        assert!(text.contains("this is a constant"), "{}", text);
        assert!(!text.contains("dropped"), "{}", text);
    }
}
