//! Locations in the source program.
//!
//! Only diagnostics use these.  Nothing in the generated JavaScript carries a span.

/// `None` for spans that don't belong to any registered file.
pub type FileId = Option<std::num::NonZeroU32>;
pub use codespan::ByteIndex as BytePos;

pub use span::{Sp, Span, HasSpan};
#[macro_use] mod span;

pub use source_map::Files;
mod source_map;
