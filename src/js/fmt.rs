//! Debug rendering of the JavaScript AST.
//!
//! This is good enough to read generated code in tests and diagnostics; it makes no attempt
//! at pretty line-breaking.

use std::io::{self, Write};

use thiserror::Error;

use super::{BinaryOp, JsExpr, JsStmt, UnaryOp, VerbatimPart};

/// Trait for displaying JavaScript code.
pub trait Format {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result;
}

/// Format a value into a string.
///
/// ```
/// use jslower::js::{fmt::stringify, JsExpr};
///
/// let expr = JsExpr::ident("a").member("b").call(vec![JsExpr::Number(1.0)]);
/// assert_eq!(stringify(&expr), "a.b(1)");
/// ```
pub fn stringify<T: Format + ?Sized>(value: &T) -> String {
    let mut f = Formatter::new(vec![]);
    // writing into a Vec can't fail
    let _ = value.fmt(&mut f);
    let bytes = f.into_inner().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Format a list of statements into a string, one per line.
pub fn stringify_stmts(stmts: &[JsStmt]) -> String {
    let mut f = Formatter::new(vec![]);
    for stmt in stmts {
        let _ = f.fmt(stmt).and_then(|()| f.next_line());
    }
    let bytes = f.into_inner().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

//==============================================================================

pub type Result<T = ()> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(#[from] io::Error);

//==============================================================================

pub use formatter::Formatter;
mod formatter {
    use super::*;

    const INDENT: usize = 4;

    /// Type that is primarily responsible for managing indentation.
    pub struct Formatter<W: io::Write> {
        // This is an Option only so that `into_inner` can remove it.
        writer: Option<W>,
        pending_data: bool,
        line_buffer: Vec<u8>,
        indent: usize,
    }

    /// If a partially-written line has not yet been committed through a call to
    /// [`Formatter::next_line`], it will be written on drop, and errors will be ignored.
    impl<W: io::Write> Drop for Formatter<W> {
        fn drop(&mut self) {
            let _ = self._flush_incomplete_line();
        }
    }

    impl<W: io::Write> Formatter<W> {
        /// Construct a new [`Formatter`] for writing at an initial indent level of 0.
        pub fn new(writer: W) -> Self {
            Self {
                writer: Some(writer),
                pending_data: false,
                line_buffer: vec![],
                indent: 0,
            }
        }

        /// Recover the wrapped `io::Write` object.
        ///
        /// **Important:** If the last line has not yet been written by calling
        /// [`Formatter::next_line`], it will attempt to write this data now.
        pub fn into_inner(mut self) -> Result<W> {
            self._flush_incomplete_line()?;
            Ok(self.writer.take().expect("writer is only taken here"))
        }

        fn _flush_incomplete_line(&mut self) -> Result {
            if self.pending_data {
                if let Some(writer) = self.writer.as_mut() {
                    writer.write_all(&self.line_buffer)?;
                }
                self.pending_data = false;
            }
            Ok(())
        }
    }

    impl<W: io::Write> Formatter<W> {
        /// Convenience method that calls [`Format::fmt`].
        pub fn fmt<T: Format>(&mut self, x: T) -> Result { x.fmt(self) }

        /// Write a comma-separated list on one line.
        pub fn fmt_comma_separated<T: Format>(
            &mut self,
            open: &'static str,
            close: &'static str,
            items: impl IntoIterator<Item=T>,
        ) -> Result {
            self.fmt(open)?;
            self.fmt_separated(items, |me| me.fmt(", "))?;
            self.fmt(close)
        }

        /// Helper which writes items from an iterator, invoking the separator closure between
        /// each pair of items. (but NOT after the final item)
        pub fn fmt_separated<T: Format, B>(
            &mut self,
            items: impl IntoIterator<Item=T>,
            mut sep: impl FnMut(&mut Self) -> Result<B>,
        ) -> Result {
            let mut first = true;
            for x in items {
                if !first { sep(self)?; }
                first = false;
                self.fmt(x)?;
            }
            Ok(())
        }

        /// Increases the indent level.
        ///
        /// Panics if not at the beginning of a line.
        pub fn indent(&mut self) -> Result { self._set_indent(self.indent + INDENT) }

        /// Decreases the indent level.
        ///
        /// Panics if not at the beginning of a line, or if an attempt is made to dedent beyond the
        /// left margin.
        pub fn dedent(&mut self) -> Result {
            assert!(self.indent >= INDENT, "Attempted to dedent past 0. This is a bug!");
            self._set_indent(self.indent - INDENT)
        }

        /// Output a line and start a new one at the same indent level.
        pub fn next_line(&mut self) -> Result {
            self.pending_data = false;
            self.line_buffer.push(b'\n');
            if let Some(writer) = self.writer.as_mut() {
                writer.write_all(&self.line_buffer)?;
            }
            self.line_buffer.clear();
            self.line_buffer.resize(self.indent, b' ');
            Ok(())
        }

        /// Appends a string to the current (not yet written) line.
        pub(super) fn append_to_line(&mut self, bytes: &[u8]) -> Result {
            // Catch accidental use of "\n" in output strings where next_line() should be used.
            assert!(!bytes.contains(&b'\n'), "Tried to append newline to line. This is a bug!");
            self.pending_data = true;
            self.line_buffer.extend_from_slice(bytes);
            Ok(())
        }

        /// Append to the current (not yet written) line using [`std::fmt::Display`].
        pub(super) fn append_display_to_line(&mut self, x: impl std::fmt::Display) -> Result {
            self.pending_data = true;
            write!(&mut self.line_buffer, "{}", x)?;
            Ok(())
        }

        fn _set_indent(&mut self, new_indent: usize) -> Result {
            assert!(!self.pending_data, "Attempted to change indent mid-line. This is a bug!");
            self.indent = new_indent;
            self.line_buffer.resize(self.indent, b' ');
            Ok(())
        }
    }
}

//==============================================================================

// Base impls: To write arbitrary text, use a string type.
impl Format for str {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        out.append_to_line(self.as_bytes())
    }
}
impl Format for String {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        out.append_to_line(self.as_bytes())
    }
}

// Use `format_args!` to delegate to a `std::fmt` trait.
impl Format for std::fmt::Arguments<'_> {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        out.append_display_to_line(self)
    }
}

// Forwarded impls
impl<T: Format + ?Sized> Format for &T {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        Format::fmt(&**self, out)
    }
}
impl<T: Format + ?Sized> Format for Box<T> {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        Format::fmt(&**self, out)
    }
}

// Tuples concatenate their arguments.
macro_rules! impl_tuple_format {
    ($($a:ident:$A:ident),*) => {
        impl<$($A: Format),*> Format for ( $($A),* ) {
            fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
                let ( $($a),* ) = self;
                $( Format::fmt($a, out)?; )*
                Ok(())
            }
        }
    }
}

impl_tuple_format!(a:A, b:B);
impl_tuple_format!(a:A, b:B, c:C);
impl_tuple_format!(a:A, b:B, c:C, d:D);

//==============================================================================
// Expressions

mod prec {
    pub const COMMA: u8 = 1;
    pub const ASSIGN: u8 = 2;
    pub const CONDITIONAL: u8 = 3;
    pub const LOGICAL_OR: u8 = 4;
    pub const PREFIX: u8 = 14;
    pub const POSTFIX: u8 = 15;
    pub const CALL: u8 = 16;
    pub const PRIMARY: u8 = 17;
}

fn precedence(e: &JsExpr) -> u8 {
    match e {
        JsExpr::Number(x) if *x < 0.0 || (*x == 0.0 && x.is_sign_negative()) => prec::PREFIX,
        JsExpr::Null | JsExpr::Bool(_) | JsExpr::Number(_) | JsExpr::String(_) |
        JsExpr::Identifier(_) | JsExpr::This | JsExpr::Array(_) | JsExpr::Object(_) |
        JsExpr::Function { .. } => prec::PRIMARY,
        JsExpr::Member { .. } | JsExpr::Index { .. } | JsExpr::Call { .. } | JsExpr::New { .. } => prec::CALL,
        JsExpr::Unary { op, .. } if op.is_postfix() => prec::POSTFIX,
        JsExpr::Unary { .. } => prec::PREFIX,
        JsExpr::Binary { op, .. } => op.precedence(),
        JsExpr::Conditional { .. } => prec::CONDITIONAL,
        // the text of a template could contain anything
        JsExpr::Verbatim(_) => prec::ASSIGN,
    }
}

struct Prec<'a>(&'a JsExpr, u8);

impl Format for Prec<'_> {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        let &Prec(expr, min) = self;
        if precedence(expr) < min {
            out.fmt(("(", expr, ")"))
        } else {
            out.fmt(expr)
        }
    }
}

/// Number formatting that agrees with JavaScript for the values we ever generate.
fn fmt_number<W: Write>(out: &mut Formatter<W>, x: f64) -> Result {
    if x.is_nan() {
        out.fmt("NaN")
    } else if x.is_infinite() {
        out.fmt(if x > 0.0 { "Infinity" } else { "-Infinity" })
    } else if x.fract() == 0.0 && x.abs() < 1e21 {
        out.fmt(format_args!("{}", x as i128))
    } else {
        out.fmt(format_args!("{}", x))
    }
}

impl Format for JsExpr {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        match self {
            JsExpr::Null => out.fmt("null"),
            JsExpr::Bool(b) => out.fmt(if *b { "true" } else { "false" }),
            JsExpr::Number(x) => fmt_number(out, *x),
            JsExpr::String(s) => {
                // JSON string literals are JavaScript string literals
                let quoted = serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s));
                out.fmt(&quoted[..])
            },
            JsExpr::Identifier(name) => out.fmt(&name[..]),
            JsExpr::This => out.fmt("this"),
            JsExpr::Member { object, name } => {
                let object_prec = match **object {
                    // `1.toString` would parse as a number
                    JsExpr::Number(_) => prec::PRIMARY + 1,
                    _ => prec::CALL,
                };
                out.fmt((Prec(object, object_prec), ".", &name[..]))
            },
            JsExpr::Index { object, index } => {
                out.fmt((Prec(object, prec::CALL), "[", Prec(index, prec::COMMA + 1), "]"))
            },
            JsExpr::Call { callee, args } => {
                out.fmt(Prec(callee, prec::CALL))?;
                out.fmt_comma_separated("(", ")", args.iter().map(|a| Prec(a, prec::ASSIGN)))
            },
            JsExpr::New { callee, args } => {
                out.fmt("new ")?;
                match **callee {
                    // the arguments would otherwise be taken by the inner call
                    JsExpr::Call { .. } => out.fmt(("(", callee, ")"))?,
                    _ => out.fmt(Prec(callee, prec::CALL))?,
                }
                out.fmt_comma_separated("(", ")", args.iter().map(|a| Prec(a, prec::ASSIGN)))
            },
            JsExpr::Unary { op, operand } => match op {
                UnaryOp::PostInc | UnaryOp::PostDec => {
                    out.fmt((Prec(operand, prec::POSTFIX), op.token()))
                },
                UnaryOp::Typeof => out.fmt(("typeof ", Prec(operand, prec::PREFIX))),
                _ => {
                    out.fmt(op.token())?;
                    // avoid gluing `- -x` into `--x`
                    let first_char = stringify(&**operand).chars().next();
                    let glued = matches!((op, first_char), (UnaryOp::Neg | UnaryOp::PreDec, Some('-')) | (UnaryOp::Plus | UnaryOp::PreInc, Some('+')));
                    if glued {
                        out.fmt(" ")?;
                    }
                    out.fmt(Prec(operand, prec::PREFIX))
                },
            },
            JsExpr::Binary { op, left, right } => {
                let p = op.precedence();
                let (left_min, right_min) = match op {
                    _ if op.is_assignment() => (prec::CALL, p),
                    _ => (p, p + 1),
                };
                let sep = match op {
                    BinaryOp::Comma => ", ".to_owned(),
                    _ => format!(" {} ", op),
                };
                out.fmt((Prec(left, left_min), &sep[..], Prec(right, right_min)))
            },
            JsExpr::Conditional { cond, then, else_ } => {
                out.fmt((Prec(cond, prec::LOGICAL_OR), " ? ", Prec(then, prec::ASSIGN), " : "))?;
                out.fmt(Prec(else_, prec::ASSIGN))
            },
            JsExpr::Function { params, body } => {
                out.fmt("function")?;
                out.fmt_comma_separated("(", ")", params.iter().map(|p| &p[..]))?;
                fmt_block(out, body)
            },
            JsExpr::Array(items) => {
                out.fmt_comma_separated("[", "]", items.iter().map(|a| Prec(a, prec::ASSIGN)))
            },
            JsExpr::Object(props) => {
                if props.is_empty() {
                    return out.fmt("{}");
                }
                out.fmt_comma_separated("{ ", " }", props.iter().map(|(key, value)| {
                    (PropertyKey(key), ": ", Prec(value, prec::ASSIGN))
                }))
            },
            JsExpr::Verbatim(parts) => {
                for part in parts {
                    match part {
                        VerbatimPart::Text(text) => out.fmt(&text[..])?,
                        VerbatimPart::Expr(expr) => out.fmt(Prec(expr, prec::PRIMARY))?,
                    }
                }
                Ok(())
            },
        }
    }
}

struct PropertyKey<'a>(&'a str);

impl Format for PropertyKey<'_> {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        match crate::ident::is_valid_identifier(self.0) {
            true => out.fmt(self.0),
            false => out.fmt(&JsExpr::String(self.0.to_owned())),
        }
    }
}

//==============================================================================
// Statements

fn fmt_block<W: Write>(out: &mut Formatter<W>, stmts: &[JsStmt]) -> Result {
    if stmts.is_empty() {
        return out.fmt(" {}");
    }
    out.fmt(" {")?;
    out.next_line()?;
    out.indent()?;
    for stmt in stmts {
        out.fmt(stmt)?;
        out.next_line()?;
    }
    out.dedent()?;
    out.fmt("}")
}

/// Expression statements can't begin with `function` or `{`.
fn needs_statement_parens(expr: &JsExpr) -> bool {
    match expr {
        JsExpr::Function { .. } | JsExpr::Object(_) => true,
        JsExpr::Member { object, .. } | JsExpr::Index { object, .. } => needs_statement_parens(object),
        JsExpr::Call { callee, .. } => needs_statement_parens(callee),
        JsExpr::Binary { left, .. } => needs_statement_parens(left),
        JsExpr::Conditional { cond, .. } => needs_statement_parens(cond),
        JsExpr::Unary { op, operand } if op.is_postfix() => needs_statement_parens(operand),
        _ => false,
    }
}

impl Format for JsStmt {
    fn fmt<W: Write>(&self, out: &mut Formatter<W>) -> Result {
        match self {
            JsStmt::Var { name, init: None } => out.fmt(("var ", &name[..], ";")),
            JsStmt::Var { name, init: Some(init) } => {
                out.fmt(("var ", &name[..], " = ", Prec(init, prec::ASSIGN)))?;
                out.fmt(";")
            },
            JsStmt::Expr(expr) => match needs_statement_parens(expr) {
                true => out.fmt(("(", expr, ");")),
                false => out.fmt((expr, ";")),
            },
            JsStmt::If { cond, then, else_ } => {
                out.fmt(("if (", cond, ")"))?;
                fmt_block(out, then)?;
                if !else_.is_empty() {
                    out.fmt(" else")?;
                    fmt_block(out, else_)?;
                }
                Ok(())
            },
            JsStmt::Block(stmts) => {
                out.fmt("{")?;
                out.next_line()?;
                out.indent()?;
                for stmt in stmts {
                    out.fmt(stmt)?;
                    out.next_line()?;
                }
                out.dedent()?;
                out.fmt("}")
            },
            JsStmt::Return(None) => out.fmt("return;"),
            JsStmt::Return(Some(value)) => out.fmt(("return ", value, ";")),
            JsStmt::Await { awaiter, on_completed } => {
                out.fmt(("await ", Prec(awaiter, prec::CALL), ".", &on_completed[..]))?;
                out.fmt(";")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::JsExpr as E;

    #[test]
    fn parenthesization() {
        let a = || E::ident("a");
        let b = || E::ident("b");
        let c = || E::ident("c");

        let sum = E::binary(BinaryOp::Add, a(), b());
        assert_eq!(stringify(&E::binary(BinaryOp::Mul, sum.clone(), c())), "(a + b) * c");
        assert_eq!(stringify(&E::binary(BinaryOp::Sub, c(), sum.clone())), "c - (a + b)");
        assert_eq!(stringify(&E::binary(BinaryOp::Add, sum.clone(), c())), "a + b + c");
        assert_eq!(stringify(&sum.clone().member("x")), "(a + b).x");
        assert_eq!(stringify(&E::assign(a(), E::assign(b(), c()))), "a = b = c");
        assert_eq!(stringify(&E::unary(UnaryOp::Neg, E::Number(-1.0))), "- -1");
        assert_eq!(stringify(&E::unary(UnaryOp::PostInc, a().member("x"))), "a.x++");
        assert_eq!(stringify(&E::Number(1.5)), "1.5");
        assert_eq!(stringify(&E::string("a\"b")), r#""a\"b""#);
    }

    #[test]
    fn statements() {
        let stmts = vec![
            JsStmt::var("$t0", E::ident("f").call(vec![])),
            JsStmt::If {
                cond: E::ident("$t0"),
                then: vec![JsStmt::Expr(E::assign(E::ident("x"), E::Number(1.0)))],
                else_: vec![],
            },
            JsStmt::Expr(E::Function { params: vec![], body: vec![] }.call(vec![])),
        ];
        assert_eq!(stringify_stmts(&stmts), "\
var $t0 = f();
if ($t0) {
    x = 1;
}
(function() {}());
");
    }
}
