use core::fmt;

use crate::pos::{BytePos, FileId};

/// Wrap a node of the source program in [`Sp`].
///
/// * `sp!(span => value)` uses the given span.
/// * `sp!(value)` uses [`Span::NULL`], which is what hand-built programs in tests do.
///
/// ```
/// use jslower::{sp, Files, Sp, Span};
///
/// let files = Files::new();
/// let file_id = files.add("<input>", "a + b");
/// let spanned: Sp<i32> = sp!(Span::new(file_id, 0, 5) => 10);
/// assert_eq!(spanned, sp!(10));  // spans don't participate in comparisons
/// ```
#[macro_export]
macro_rules! sp {
    ($span:expr => $expr:expr) => { $crate::Sp { span: $span, value: $expr } };
    ($expr:expr) => { $crate::Sp { span: $crate::pos::Span::NULL, value: $expr } };
}

/// A byte range in one of the files registered with [`Files`][`crate::Files`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: BytePos,
    pub end: BytePos,
    pub file_id: FileId,
}

impl Span {
    /// Span of a node that has no source text, e.g. one synthesized by the resolver.
    ///
    /// Diagnostic labels at this span are dropped when rendering.
    pub const NULL: Span = Span { start: BytePos(0), end: BytePos(0), file_id: None };

    pub fn new(file_id: FileId, start: impl Into<BytePos>, end: impl Into<BytePos>) -> Span {
        let (start, end) = (start.into(), end.into());
        assert!(end >= start);
        Span { file_id, start, end }
    }
}

impl Default for Span {
    fn default() -> Span { Span::NULL }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// codespan labels take ranges
impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> std::ops::Range<usize> {
        span.start.into()..span.end.into()
    }
}

/// A node of the source program together with where it came from.
///
/// Derefs to `T`; the span takes no part in comparisons or hashing.
#[derive(Copy, Clone, Default)]
pub struct Sp<T: ?Sized> {
    pub span: Span,
    pub value: T,
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Sp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span.file_id {
            None => fmt::Debug::fmt(&self.value, f),
            Some(_) => {
                write!(f, "{}@", self.span)?;
                fmt::Debug::fmt(&self.value, f)
            },
        }
    }
}

impl<T: ?Sized + PartialEq> PartialEq for Sp<T> {
    fn eq(&self, other: &Self) -> bool { self.value == other.value }
}

impl<T: ?Sized + Eq> Eq for Sp<T> {}

impl<T: ?Sized + std::hash::Hash> std::hash::Hash for Sp<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.value.hash(state) }
}

impl<T: ?Sized> std::ops::Deref for Sp<T> {
    type Target = T;
    fn deref(&self) -> &T { &self.value }
}

impl<T: ?Sized> std::ops::DerefMut for Sp<T> {
    fn deref_mut(&mut self) -> &mut T { &mut self.value }
}

/// Anything that can locate a diagnostic label.
pub trait HasSpan {
    fn span(&self) -> Span;
}

impl<T: ?Sized> HasSpan for Sp<T> {
    fn span(&self) -> Span { self.span }
}

impl HasSpan for Span {
    fn span(&self) -> Span { *self }
}

impl<T: ?Sized + HasSpan> HasSpan for &T {
    fn span(&self) -> Span { (**self).span() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_are_ignored_by_comparisons() {
        let file_id = std::num::NonZeroU32::new(1);
        let a = sp!(Span::new(file_id, 3, 7) => "x");
        let b = sp!(Span::new(file_id, 10, 12) => "x");
        assert_eq!(a, b);
        assert_ne!(a, sp!("y"));
        assert_eq!(format!("{:?}", a), "[3, 7)@\"x\"");
        assert_eq!(format!("{:?}", sp!(1)), "1");
    }
}
