/// Expression tree definitions.
///
/// Reductions and scans are unary operators whose symbol carries the `/` or
/// `\` suffix ("+/"); inner and outer products are binary operators whose
/// symbol contains a dot ("+.*", "o.*"). Assignment is the binary operator
/// "=". The evaluator takes these apart by name.
use crate::core::value::Value;

#[derive(Debug, Clone)]
pub enum Expr {
    Const(Value),
    Var(String),
    Unary {
        op: String,
        right: Box<Expr>,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Operand juxtaposition; elements evaluate right to left.
    VectorLit(Vec<Expr>),
    /// `left[e1; …; ek]`; `None` is a placeholder axis.
    Index {
        left: Box<Expr>,
        indexes: Vec<Option<Expr>>,
    },
    /// `cond : value` — early return from the enclosing body when truthy.
    Cond {
        cond: Box<Expr>,
        value: Box<Expr>,
    },
    While {
        cond: Box<Expr>,
        body: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_body: Vec<Expr>,
        else_body: Vec<Expr>,
    },
    Ret(Option<Box<Expr>>),
}

/// A user-defined operator. `left` is present for the binary form.
#[derive(Debug, Clone)]
pub struct OpDef {
    pub name: String,
    pub left: Option<String>,
    pub right: String,
    pub body: Vec<Expr>,
}

/// One parsed statement, stamped with the source line it starts on; the
/// evaluator keeps that as the last-set position for error reports.
#[derive(Debug, Clone)]
pub struct Item {
    pub line: usize,
    pub kind: ItemKind,
}

#[derive(Debug, Clone)]
pub enum ItemKind {
    Expr(Expr),
    OpDef(OpDef),
}
