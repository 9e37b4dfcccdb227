use crate::pos::Sp;

use super::{EventId, FieldId, LocalId, MethodId, PropertyId, Type};

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    String(String),
}

impl Constant {
    pub fn is_zero(&self) -> bool {
        match self {
            Constant::Int(0) => true,
            Constant::Float(x) => *x == 0.0,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A method, together with the generic arguments it is used with.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub method: MethodId,
    /// Arguments for the generic parameters of the declaring type.
    pub type_args: Vec<Type>,
    /// Arguments for the method's own generic parameters.
    pub method_args: Vec<Type>,
}

impl MethodRef {
    pub fn new(method: MethodId) -> Self {
        MethodRef { method, type_args: vec![], method_args: vec![] }
    }
}

/// A field, property or event, together with the generic arguments of its declaring type.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef<I> {
    pub id: I,
    pub type_args: Vec<Type>,
}

impl<I> MemberRef<I> {
    pub fn new(id: I) -> Self { MemberRef { id, type_args: vec![] } }
}

pub type FieldRef = MemberRef<FieldId>;
pub type PropertyRef = MemberRef<PropertyId>;
pub type EventRef = MemberRef<EventId>;

// =============================================================================

/// How the resolver decided to turn a value of one type into another.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub kind: ConversionKind,
    pub to: Type,
    /// Appears in a `checked` context.
    pub is_checked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionKind {
    Identity,
    ImplicitNumeric,
    ExplicitNumeric,
    ImplicitNullable,
    ExplicitNullable,
    ImplicitReference,
    ExplicitReference,
    Boxing,
    Unboxing,
    ImplicitEnumeration,
    ExplicitEnumeration,
    ImplicitConstant,
    NullLiteral,
    MethodGroup,
    AnonymousFunction,
    UserDefined { method: MethodRef, is_lifted: bool },
    ImplicitDynamic,
    ExplicitDynamic,
    /// Conversions involving unmanaged pointers.
    Pointer,
}

impl ConversionKind {
    pub fn descr(&self) -> &'static str {
        match self {
            ConversionKind::Identity => "identity",
            ConversionKind::ImplicitNumeric => "implicit numeric",
            ConversionKind::ExplicitNumeric => "explicit numeric",
            ConversionKind::ImplicitNullable => "implicit nullable",
            ConversionKind::ExplicitNullable => "explicit nullable",
            ConversionKind::ImplicitReference => "implicit reference",
            ConversionKind::ExplicitReference => "explicit reference",
            ConversionKind::Boxing => "boxing",
            ConversionKind::Unboxing => "unboxing",
            ConversionKind::ImplicitEnumeration => "implicit enumeration",
            ConversionKind::ExplicitEnumeration => "explicit enumeration",
            ConversionKind::ImplicitConstant => "constant expression",
            ConversionKind::NullLiteral => "null literal",
            ConversionKind::MethodGroup => "method group",
            ConversionKind::AnonymousFunction => "anonymous function",
            ConversionKind::UserDefined { .. } => "user-defined",
            ConversionKind::ImplicitDynamic => "implicit dynamic",
            ConversionKind::ExplicitDynamic => "explicit dynamic",
            ConversionKind::Pointer => "pointer",
        }
    }
}

// =============================================================================

string_enum! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub enum UnaryOp {
        #[strum(serialize = "+")] Plus,
        #[strum(serialize = "-")] Neg,
        #[strum(serialize = "!")] Not,
        #[strum(serialize = "~")] BitNot,
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
        #[strum(serialize = "&")] BitAnd,
        #[strum(serialize = "|")] BitOr,
        #[strum(serialize = "^")] BitXor,
        #[strum(serialize = "==")] Eq,
        #[strum(serialize = "!=")] Ne,
        #[strum(serialize = "<")] Lt,
        #[strum(serialize = "<=")] Le,
        #[strum(serialize = ">")] Gt,
        #[strum(serialize = ">=")] Ge,
        #[strum(serialize = "&&")] AndAlso,
        #[strum(serialize = "||")] OrElse,
    }
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        use BinaryOp as B;
        matches!(self, B::Eq | B::Ne | B::Lt | B::Le | B::Gt | B::Ge)
    }
}

string_enum! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub enum IncDecOp {
        #[strum(serialize = "++x")] PreInc,
        #[strum(serialize = "--x")] PreDec,
        #[strum(serialize = "x++")] PostInc,
        #[strum(serialize = "x--")] PostDec,
    }
}

impl IncDecOp {
    pub fn is_increment(self) -> bool { matches!(self, IncDecOp::PreInc | IncDecOp::PostInc) }
    pub fn is_postfix(self) -> bool { matches!(self, IncDecOp::PostInc | IncDecOp::PostDec) }
}

/// How the resolver bound an operator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperatorInfo {
    /// Appears in a `checked` context.
    pub checked: bool,
    /// User-defined operator method.
    pub method: Option<MethodRef>,
    /// Operands were nullable and the operator was lifted to them.
    pub lifted: bool,
}

// =============================================================================

/// A typed expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// The type of the node before `conversion` is applied.
    pub ty: Type,
    /// Implicit conversion the resolver applied to this node's value.
    pub conversion: Option<Box<Conversion>>,
}

impl Expr {
    /// The type of this node's value after its conversion.
    pub fn converted_type(&self) -> &Type {
        match &self.conversion {
            Some(conversion) => &conversion.to,
            None => &self.ty,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            ExprKind::Literal(c) => Some(c),
            _ => None,
        }
    }

    pub fn descr(&self) -> &'static str { self.kind.descr() }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Constant),
    /// `default(T)`, with `T` being the node's type.
    Default,
    Local(LocalId),
    This,
    /// `base`; only valid as the receiver of a member access.
    Base,
    Field { receiver: Option<Box<Sp<Expr>>>, field: FieldRef },
    /// A property, or an indexer if `args` is non-empty.
    Property { receiver: Option<Box<Sp<Expr>>>, property: PropertyRef, args: Vec<Sp<Expr>> },
    Event { receiver: Option<Box<Sp<Expr>>>, event: EventRef },
    /// A method group; always has a [`ConversionKind::MethodGroup`] conversion to a delegate type.
    MethodGroup { receiver: Option<Box<Sp<Expr>>>, method: MethodRef, is_non_virtual: bool },
    Invocation(Invocation),
    DelegateInvocation { delegate: Box<Sp<Expr>>, args: Vec<Sp<Expr>> },
    /// A call that could not be bound to one method at compile time.  If `candidates` is empty,
    /// the receiver is `dynamic`.
    LateBoundCall { receiver: Option<Box<Sp<Expr>>>, name: String, candidates: Vec<MethodRef>, args: Vec<Sp<Expr>> },
    LateBoundIndexer { receiver: Box<Sp<Expr>>, candidates: Vec<PropertyRef>, args: Vec<Sp<Expr>> },
    /// Member access on a `dynamic` receiver.
    LateBoundMember { receiver: Box<Sp<Expr>>, name: String },
    ObjectCreation(ObjectCreation),
    ArrayCreation { elem: Type, sizes: Vec<Sp<Expr>>, init: Option<ArrayInit> },
    ArrayElement { array: Box<Sp<Expr>>, indices: Vec<Sp<Expr>> },
    Unary { op: UnaryOp, operand: Box<Sp<Expr>>, info: OperatorInfo },
    Binary { op: BinaryOp, left: Box<Sp<Expr>>, right: Box<Sp<Expr>>, info: OperatorInfo },
    Assign { target: Box<Sp<Expr>>, value: Box<Sp<Expr>> },
    CompoundAssign { op: BinaryOp, target: Box<Sp<Expr>>, value: Box<Sp<Expr>>, info: OperatorInfo },
    IncDec { op: IncDecOp, target: Box<Sp<Expr>>, info: OperatorInfo },
    Conditional { cond: Box<Sp<Expr>>, then: Box<Sp<Expr>>, else_: Box<Sp<Expr>> },
    Coalesce { left: Box<Sp<Expr>>, right: Box<Sp<Expr>> },
    /// An explicit cast.
    Cast { operand: Box<Sp<Expr>>, conversion: Conversion },
    Is { operand: Box<Sp<Expr>>, target: Type },
    As { operand: Box<Sp<Expr>>, target: Type },
    TypeOf(Type),
    Lambda(Lambda),
    Await(Await),
    Query(Box<Query>),
    AnonymousObject { members: Vec<(String, Sp<Expr>)> },
    /// The object under construction, inside an object or collection initializer.
    InitializedObject,
}

impl ExprKind {
    pub fn descr(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "literal",
            ExprKind::Default => "default value",
            ExprKind::Local(_) => "local variable",
            ExprKind::This => "'this'",
            ExprKind::Base => "'base'",
            ExprKind::Field { .. } => "field",
            ExprKind::Property { args, .. } if !args.is_empty() => "indexer",
            ExprKind::Property { .. } => "property",
            ExprKind::Event { .. } => "event",
            ExprKind::MethodGroup { .. } => "method group",
            ExprKind::Invocation(_) => "method call",
            ExprKind::DelegateInvocation { .. } => "delegate call",
            ExprKind::LateBoundCall { .. } => "late-bound call",
            ExprKind::LateBoundIndexer { .. } => "late-bound indexer",
            ExprKind::LateBoundMember { .. } => "late-bound member",
            ExprKind::ObjectCreation(_) => "object creation",
            ExprKind::ArrayCreation { .. } => "array creation",
            ExprKind::ArrayElement { .. } => "array element",
            ExprKind::Unary { .. } => "unary operation",
            ExprKind::Binary { .. } => "binary operation",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::CompoundAssign { .. } => "compound assignment",
            ExprKind::IncDec { .. } => "increment or decrement",
            ExprKind::Conditional { .. } => "conditional expression",
            ExprKind::Coalesce { .. } => "null-coalescing expression",
            ExprKind::Cast { .. } => "cast",
            ExprKind::Is { .. } => "'is' test",
            ExprKind::As { .. } => "'as' cast",
            ExprKind::TypeOf(_) => "typeof",
            ExprKind::Lambda(_) => "anonymous function",
            ExprKind::Await(_) => "await",
            ExprKind::Query(_) => "query expression",
            ExprKind::AnonymousObject { .. } => "anonymous object",
            ExprKind::InitializedObject => "initialized object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// `None` for static methods.  Extension methods are static, and receive their receiver as
    /// the first argument.
    pub receiver: Option<Box<Sp<Expr>>>,
    pub method: MethodRef,
    /// Arguments in the order they appear at the call site.
    pub args: Vec<Sp<Expr>>,
    /// For each argument, the index of the parameter it binds to.  `None` means each argument
    /// binds to the parameter at the same position.
    pub arg_map: Option<Vec<usize>>,
    /// The `params` parameter receives the trailing arguments as individual elements.
    pub expanded: bool,
    /// `base.M()`.
    pub is_non_virtual: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCreation {
    /// `None` for the implicit parameterless constructor of a struct.
    pub ctor: Option<MethodRef>,
    pub args: Vec<Sp<Expr>>,
    pub arg_map: Option<Vec<usize>>,
    pub expanded: bool,
    pub initializers: Vec<Initializer>,
}

/// One entry of an object or collection initializer.
///
/// Targets and calls use [`ExprKind::InitializedObject`] as the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    /// `Member = value`
    Assign { target: Sp<Expr>, value: Sp<Expr> },
    /// `Member = { ... }`, initializing the object already stored in the member.
    Nested { target: Sp<Expr>, initializers: Vec<Initializer> },
    /// A collection initializer element, as the resolved `Add` call.
    Add(Sp<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayInit {
    Element(Box<Sp<Expr>>),
    List(Vec<ArrayInit>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum LambdaBody {
    Expr(Box<Sp<Expr>>),
    /// A statement body, compiled by the statement compiler.
    Block(BlockId),
}

/// What a function literal must close over explicitly.
///
/// Ordinary captured variables are captured by JavaScript closures; only the variables listed
/// here, and `this`, need to be bound.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NestedFunctionContext {
    pub captured_by_ref: Vec<LocalId>,
    pub uses_this: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<LocalId>,
    pub body: LambdaBody,
    pub return_type: Type,
    pub captures: NestedFunctionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Await {
    pub operand: Box<Sp<Expr>>,
    pub get_awaiter: MethodRef,
    pub on_completed: MethodRef,
    /// Preferred over `on_completed` when the awaiter has it.
    pub unsafe_on_completed: Option<MethodRef>,
    pub get_result: MethodRef,
}

// =============================================================================

/// A comprehension, with every transformation method already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub range: LocalId,
    pub source: Box<Sp<Expr>>,
    /// `Cast<T>` method for `from T x in ...`.
    pub cast: Option<MethodRef>,
    pub body: QueryBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryBody {
    pub clauses: Vec<Sp<QueryClause>>,
    pub end: Sp<QueryEnd>,
    pub continuation: Option<Box<QueryContinuation>>,
}

/// `into x ...`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContinuation {
    pub range: LocalId,
    pub body: QueryBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryClause {
    /// `from x in source` (`SelectMany`)
    From { range: LocalId, source: Sp<Expr>, cast: Option<MethodRef>, method: Option<MethodRef> },
    /// `let x = value` (`Select`)
    Let { range: LocalId, value: Sp<Expr>, method: Option<MethodRef> },
    /// `where predicate` (`Where`)
    Where { predicate: Sp<Expr>, method: Option<MethodRef> },
    /// `join x in source on outer_key equals inner_key [into g]` (`Join` or `GroupJoin`)
    Join {
        range: LocalId,
        source: Sp<Expr>,
        cast: Option<MethodRef>,
        outer_key: Sp<Expr>,
        inner_key: Sp<Expr>,
        into: Option<LocalId>,
        method: Option<MethodRef>,
    },
    /// `orderby k1, k2 descending`
    OrderBy { orderings: Vec<Ordering> },
}

impl QueryClause {
    pub fn descr(&self) -> &'static str {
        match self {
            QueryClause::From { .. } => "from",
            QueryClause::Let { .. } => "let",
            QueryClause::Where { .. } => "where",
            QueryClause::Join { into: None, .. } => "join",
            QueryClause::Join { into: Some(_), .. } => "join into",
            QueryClause::OrderBy { .. } => "orderby",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub key: Sp<Expr>,
    pub descending: bool,
    /// `OrderBy`, `OrderByDescending`, `ThenBy` or `ThenByDescending`.
    pub method: Option<MethodRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryEnd {
    Select { value: Sp<Expr>, method: Option<MethodRef> },
    GroupBy { element: Sp<Expr>, key: Sp<Expr>, method: Option<MethodRef> },
}
