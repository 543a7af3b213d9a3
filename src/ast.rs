use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use crate::filters::{BoxedFilter, BoxedFilterArgs};
use crate::tests::BoxedTest;
use crate::tokens::Span;
use crate::value::Value;

/// Container for nodes with location info.
///
/// This container fulfills two purposes: it adds location information to
/// nodes, but it also ensures the nodes are heap allocated.  The latter is
/// useful to ensure that enum variants do not cause the enum to become
/// too large.
pub struct Spanned<T> {
    node: Box<T>,
    span: Span,
}

impl<T> Spanned<T> {
    /// Creates a new spanned node.
    pub fn new(node: T, span: Span) -> Spanned<T> {
        Spanned {
            node: Box::new(node),
            span,
        }
    }

    /// Accesses the span.
    pub fn span(&self) -> Span {
        self.span
    }
}

impl<T> Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl<T: fmt::Debug> fmt::Debug for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.node, f)
    }
}

/// A statement node.
#[derive(Debug)]
pub enum Stmt<'a> {
    Template(Spanned<Template<'a>>),
    EmitExpr(Spanned<EmitExpr<'a>>),
    EmitRaw(Spanned<EmitRaw<'a>>),
    ForLoop(Spanned<ForLoop<'a>>),
    IfCond(Spanned<IfCond<'a>>),
    WithBlock(Spanned<WithBlock<'a>>),
    Set(Spanned<Set<'a>>),
}

/// An expression node.
#[derive(Debug)]
pub enum Expr<'a> {
    Const(Spanned<Const>),
    Var(Spanned<Var<'a>>),
    UnaryOp(Spanned<UnaryOp<'a>>),
    BinOp(Spanned<BinOp<'a>>),
    Filtered(Spanned<Filtered<'a>>),
    Test(Spanned<TestCall<'a>>),
    List(Spanned<List<'a>>),
    Map(Spanned<Map<'a>>),
}

impl<'a> Expr<'a> {
    /// The span of the underlying node.
    pub fn span(&self) -> Span {
        match self {
            Expr::Const(s) => s.span(),
            Expr::Var(s) => s.span(),
            Expr::UnaryOp(s) => s.span(),
            Expr::BinOp(s) => s.span(),
            Expr::Filtered(s) => s.span(),
            Expr::Test(s) => s.span(),
            Expr::List(s) => s.span(),
            Expr::Map(s) => s.span(),
        }
    }

    /// Checks whether a filter with the given name was applied anywhere in
    /// the filter chain of this expression.
    pub(crate) fn filter_applied(&self, name: &str) -> bool {
        match self {
            Expr::Filtered(f) => {
                f.chain.iter().any(|call| call.name == name) || f.expr.filter_applied(name)
            }
            Expr::Test(t) => t.term.filter_applied(name),
            Expr::UnaryOp(op) => op.expr.filter_applied(name),
            _ => false,
        }
    }
}

/// Root template node.
#[derive(Debug)]
pub struct Template<'a> {
    pub children: Vec<Stmt<'a>>,
}

/// Outputs the expression with the autoescape wrapper applied.
#[derive(Debug)]
pub struct EmitExpr<'a> {
    pub expr: Expr<'a>,
}

/// Outputs raw template data.
#[derive(Debug)]
pub struct EmitRaw<'a> {
    pub raw: &'a str,
}

/// A for loop with optional `sorted` / `reversed` modifiers.
#[derive(Debug)]
pub struct ForLoop<'a> {
    pub target: &'a str,
    pub value_target: Option<&'a str>,
    pub iter: Expr<'a>,
    pub sorted: bool,
    pub reversed: bool,
    pub body: Vec<Stmt<'a>>,
    pub else_body: Vec<Stmt<'a>>,
}

/// An if/elif/else condition.
#[derive(Debug)]
pub struct IfCond<'a> {
    pub expr: Expr<'a>,
    pub true_body: Vec<Stmt<'a>>,
    pub false_body: Vec<Stmt<'a>>,
}

/// A with block introducing scoped bindings.
#[derive(Debug)]
pub struct WithBlock<'a> {
    pub assignments: Vec<(&'a str, Expr<'a>)>,
    pub body: Vec<Stmt<'a>>,
}

/// A set statement.
#[derive(Debug)]
pub struct Set<'a> {
    pub name: &'a str,
    pub expr: Expr<'a>,
}

/// Loads a constant.
#[derive(Debug)]
pub struct Const {
    pub value: Value,
}

/// A single part of a variable path.
#[derive(Debug)]
pub enum PartKind<'a> {
    /// Descend into a field, key or method by name.
    Ident(&'a str),
    /// Descend into a sequence or string by constant index.
    Index(i64),
    /// Descend by a computed subscript expression.
    Subscript(Expr<'a>),
    /// The nil marker, terminating resolution with nil.
    Nil,
}

/// Call arguments attached to a variable part or filter.
#[derive(Debug, Default)]
pub struct CallArgs<'a> {
    pub positional: Vec<Expr<'a>>,
    pub named: Vec<(&'a str, Expr<'a>)>,
}

/// A variable part with an optional function call.
#[derive(Debug)]
pub struct Part<'a> {
    pub kind: PartKind<'a>,
    pub call: Option<CallArgs<'a>>,
}

impl<'a> fmt::Display for Part<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PartKind::Ident(name) => write!(f, "{}", name),
            PartKind::Index(idx) => write!(f, "{}", idx),
            PartKind::Subscript(_) => write!(f, "[subscript]"),
            PartKind::Nil => write!(f, "nil"),
        }
    }
}

/// Resolves a variable path against the render state.
///
/// The first part determines the root looked up in the scopes, the
/// following parts descend into the value.
#[derive(Debug)]
pub struct Var<'a> {
    pub parts: Vec<Part<'a>>,
}

impl<'a> Var<'a> {
    /// A diagnostic rendition of the path, eg. `user.name`.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        parts.join(".")
    }
}

/// A kind of unary operator.
#[derive(Debug)]
pub enum UnaryOpKind {
    Not,
    Neg,
}

/// An unary operator expression.
#[derive(Debug)]
pub struct UnaryOp<'a> {
    pub op: UnaryOpKind,
    pub expr: Expr<'a>,
}

/// A kind of binary operator.
#[derive(Debug)]
pub enum BinOpKind {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    ScAnd,
    ScOr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    In,
}

/// A binary operator expression.
#[derive(Debug)]
pub struct BinOp<'a> {
    pub op: BinOpKind,
    pub left: Expr<'a>,
    pub right: Expr<'a>,
}

/// How a filter call passes its arguments.
pub enum FilterArgsKind<'a> {
    /// The legacy single parameter form (`|filter:param`).
    Single(Option<Expr<'a>>),
    /// The full argument form (`|filter(a, b=c)`).
    Full(CallArgs<'a>),
}

impl<'a> fmt::Debug for FilterArgsKind<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterArgsKind::Single(p) => f.debug_tuple("Single").field(p).finish(),
            FilterArgsKind::Full(args) => f.debug_tuple("Full").field(args).finish(),
        }
    }
}

/// The filter function bound at parse time.
#[derive(Clone)]
pub enum FilterBinding {
    Single(BoxedFilter),
    Args(BoxedFilterArgs),
}

impl fmt::Debug for FilterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterBinding::Single(_) => write!(f, "<filter>"),
            FilterBinding::Args(_) => write!(f, "<filter-args>"),
        }
    }
}

/// A single filter application in a chain.
#[derive(Debug)]
pub struct FilterCall<'a> {
    pub name: &'a str,
    pub span: Span,
    pub args: FilterArgsKind<'a>,
    pub binding: FilterBinding,
}

/// An expression with a filter chain applied to it.
#[derive(Debug)]
pub struct Filtered<'a> {
    pub expr: Expr<'a>,
    pub chain: Vec<FilterCall<'a>>,
}

/// A test invocation (`term is [not] name(args)`).
pub struct TestCall<'a> {
    pub name: Cow<'a, str>,
    pub span: Span,
    pub term: Expr<'a>,
    pub args: CallArgs<'a>,
    pub negated: bool,
    pub binding: BoxedTest,
}

impl<'a> fmt::Debug for TestCall<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCall")
            .field("name", &self.name)
            .field("term", &self.term)
            .field("args", &self.args)
            .field("negated", &self.negated)
            .finish()
    }
}

/// Creates a sequence of values.
#[derive(Debug)]
pub struct List<'a> {
    pub items: Vec<Expr<'a>>,
}

/// Creates a map with literal keys.
#[derive(Debug)]
pub struct Map<'a> {
    pub keys: Vec<Cow<'a, str>>,
    pub values: Vec<Expr<'a>>,
}
