//! The target language: a small JavaScript AST.
//!
//! Nodes are plain immutable trees built bottom-up by the lowering core.  Nothing here carries a
//! source span; diagnostics are always reported against the source program.

pub use visit::{Visit, walk_expr, walk_stmt};
mod visit;

pub use effects::Effects;
mod effects;

pub mod fmt;

string_enum! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub enum UnaryOp {
        #[strum(serialize = "-")] Neg,
        #[strum(serialize = "+")] Plus,
        #[strum(serialize = "!")] Not,
        #[strum(serialize = "~")] BitNot,
        #[strum(serialize = "typeof")] Typeof,
        #[strum(serialize = "++")] PreInc,
        #[strum(serialize = "--")] PreDec,
        #[strum(serialize = "++ (postfix)")] PostInc,
        #[strum(serialize = "-- (postfix)")] PostDec,
    }
}

impl UnaryOp {
    pub fn is_update(self) -> bool {
        matches!(self, UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec)
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }

    /// The token as it is written in source.
    pub fn token(self) -> &'static str {
        match self {
            UnaryOp::PostInc => "++",
            UnaryOp::PostDec => "--",
            _ => self.into(),
        }
    }
}

string_enum! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub enum BinaryOp {
        #[strum(serialize = "+")] Add,
        #[strum(serialize = "-")] Sub,
        #[strum(serialize = "*")] Mul,
        #[strum(serialize = "/")] Div,
        #[strum(serialize = "%")] Rem,
        #[strum(serialize = "<<")] Shl,
        #[strum(serialize = ">>")] Shr,
        #[strum(serialize = ">>>")] UShr,
        #[strum(serialize = "&")] BitAnd,
        #[strum(serialize = "|")] BitOr,
        #[strum(serialize = "^")] BitXor,
        #[strum(serialize = "===")] StrictEq,
        #[strum(serialize = "!==")] StrictNe,
        #[strum(serialize = "==")] LooseEq,
        #[strum(serialize = "!=")] LooseNe,
        #[strum(serialize = "<")] Lt,
        #[strum(serialize = "<=")] Le,
        #[strum(serialize = ">")] Gt,
        #[strum(serialize = ">=")] Ge,
        #[strum(serialize = "&&")] LogicalAnd,
        #[strum(serialize = "||")] LogicalOr,
        #[strum(serialize = "instanceof")] InstanceOf,
        #[strum(serialize = "=")] Assign,
        #[strum(serialize = "+=")] AddAssign,
        #[strum(serialize = "-=")] SubAssign,
        #[strum(serialize = "*=")] MulAssign,
        #[strum(serialize = "/=")] DivAssign,
        #[strum(serialize = "%=")] RemAssign,
        #[strum(serialize = "<<=")] ShlAssign,
        #[strum(serialize = ">>=")] ShrAssign,
        #[strum(serialize = ">>>=")] UShrAssign,
        #[strum(serialize = "&=")] BitAndAssign,
        #[strum(serialize = "|=")] BitOrAssign,
        #[strum(serialize = "^=")] BitXorAssign,
        #[strum(serialize = ",")] Comma,
    }
}

impl BinaryOp {
    pub fn is_assignment(self) -> bool {
        self.compound_base().is_some() || self == BinaryOp::Assign
    }

    /// For a compound assignment operator, the operator it applies.
    pub fn compound_base(self) -> Option<BinaryOp> {
        use BinaryOp as B;
        match self {
            B::AddAssign => Some(B::Add),
            B::SubAssign => Some(B::Sub),
            B::MulAssign => Some(B::Mul),
            B::DivAssign => Some(B::Div),
            B::RemAssign => Some(B::Rem),
            B::ShlAssign => Some(B::Shl),
            B::ShrAssign => Some(B::Shr),
            B::UShrAssign => Some(B::UShr),
            B::BitAndAssign => Some(B::BitAnd),
            B::BitOrAssign => Some(B::BitOr),
            B::BitXorAssign => Some(B::BitXor),
            _ => None,
        }
    }

    /// The compound assignment operator that applies this operator, if JavaScript has one.
    pub fn compound_assignment(self) -> Option<BinaryOp> {
        use BinaryOp as B;
        match self {
            B::Add => Some(B::AddAssign),
            B::Sub => Some(B::SubAssign),
            B::Mul => Some(B::MulAssign),
            B::Div => Some(B::DivAssign),
            B::Rem => Some(B::RemAssign),
            B::Shl => Some(B::ShlAssign),
            B::Shr => Some(B::ShrAssign),
            B::UShr => Some(B::UShrAssign),
            B::BitAnd => Some(B::BitAndAssign),
            B::BitOr => Some(B::BitOrAssign),
            B::BitXor => Some(B::BitXorAssign),
            _ => None,
        }
    }

    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        use BinaryOp as B;
        match self {
            B::Comma => 1,
            _ if self.is_assignment() => 2,
            B::LogicalOr => 4,
            B::LogicalAnd => 5,
            B::BitOr => 6,
            B::BitXor => 7,
            B::BitAnd => 8,
            B::StrictEq | B::StrictNe | B::LooseEq | B::LooseNe => 9,
            B::Lt | B::Le | B::Gt | B::Ge | B::InstanceOf => 10,
            B::Shl | B::Shr | B::UShr => 11,
            B::Add | B::Sub => 12,
            B::Mul | B::Div | B::Rem => 13,
            _ => unreachable!(),
        }
    }
}

/// A piece of an inline-code expression.
#[derive(Debug, Clone, PartialEq)]
pub enum VerbatimPart {
    Text(String),
    Expr(JsExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsExpr {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Identifier(String),
    This,
    Member { object: Box<JsExpr>, name: String },
    Index { object: Box<JsExpr>, index: Box<JsExpr> },
    Call { callee: Box<JsExpr>, args: Vec<JsExpr> },
    New { callee: Box<JsExpr>, args: Vec<JsExpr> },
    Unary { op: UnaryOp, operand: Box<JsExpr> },
    Binary { op: BinaryOp, left: Box<JsExpr>, right: Box<JsExpr> },
    Conditional { cond: Box<JsExpr>, then: Box<JsExpr>, else_: Box<JsExpr> },
    Function { params: Vec<String>, body: Vec<JsStmt> },
    Array(Vec<JsExpr>),
    Object(Vec<(String, JsExpr)>),
    /// Text from an inline-code template with the substituted expressions.
    ///
    /// The text is opaque, so it is assumed to read and write anything.
    Verbatim(Vec<VerbatimPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsStmt {
    Var { name: String, init: Option<JsExpr> },
    Expr(JsExpr),
    If { cond: JsExpr, then: Vec<JsStmt>, else_: Vec<JsStmt> },
    Block(Vec<JsStmt>),
    Return(Option<JsExpr>),
    /// Suspension point of an async function.
    ///
    /// The statement-level async rewriter replaces this with a call to `awaiter.on_completed`
    /// that resumes the state machine.
    Await { awaiter: JsExpr, on_completed: String },
}

impl JsExpr {
    pub fn ident(name: impl Into<String>) -> JsExpr { JsExpr::Identifier(name.into()) }
    pub fn string(s: impl Into<String>) -> JsExpr { JsExpr::String(s.into()) }

    pub fn member(self, name: impl Into<String>) -> JsExpr {
        JsExpr::Member { object: Box::new(self), name: name.into() }
    }

    pub fn index(self, index: JsExpr) -> JsExpr {
        JsExpr::Index { object: Box::new(self), index: Box::new(index) }
    }

    pub fn call(self, args: Vec<JsExpr>) -> JsExpr {
        JsExpr::Call { callee: Box::new(self), args }
    }

    pub fn new_(self, args: Vec<JsExpr>) -> JsExpr {
        JsExpr::New { callee: Box::new(self), args }
    }

    pub fn unary(op: UnaryOp, operand: JsExpr) -> JsExpr {
        JsExpr::Unary { op, operand: Box::new(operand) }
    }

    pub fn binary(op: BinaryOp, left: JsExpr, right: JsExpr) -> JsExpr {
        JsExpr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn assign(target: JsExpr, value: JsExpr) -> JsExpr {
        JsExpr::binary(BinaryOp::Assign, target, value)
    }

    pub fn conditional(cond: JsExpr, then: JsExpr, else_: JsExpr) -> JsExpr {
        JsExpr::Conditional { cond: Box::new(cond), then: Box::new(then), else_: Box::new(else_) }
    }

    /// Parse a dotted path like `System.Collections.List` into nested member accesses.
    pub fn path(dotted: &str) -> JsExpr {
        let mut parts = dotted.split('.');
        let first = JsExpr::ident(parts.next().unwrap_or_default());
        parts.fold(first, |acc, part| acc.member(part))
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            JsExpr::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, JsExpr::Null | JsExpr::Bool(_) | JsExpr::Number(_) | JsExpr::String(_))
    }

    /// Whether evaluating this expression a second time is guaranteed to produce the same
    /// value with no additional effects.
    pub fn is_reevaluable(&self) -> bool {
        self.is_literal() || matches!(self, JsExpr::Identifier(_) | JsExpr::This)
    }

    /// Whether the expression may be written to by an assignment operator.
    pub fn is_assignable(&self) -> bool {
        matches!(self, JsExpr::Identifier(_) | JsExpr::Member { .. } | JsExpr::Index { .. })
    }

    pub fn effects(&self) -> Effects { Effects::of_expr(self) }
}

impl JsStmt {
    pub fn var(name: impl Into<String>, init: JsExpr) -> JsStmt {
        JsStmt::Var { name: name.into(), init: Some(init) }
    }
}
