use crate::statement::Select;

/// An expression, as produced by the parser's precedence-climbing descent
/// (§4.3). The executor (in `relite`) pattern-matches this directly —
/// no virtual dispatch, per §9's "AST polymorphism" note.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Identifier(String),
    QualifiedIdentifier { table: String, column: String },
    StringLit(String),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    Null,
    /// `?` placeholder; `index` is its 0-based position, assigned by the
    /// parser in left-to-right parse order.
    Placeholder(usize),
    /// `*`, optionally qualified as `table.*`.
    Star(Option<String>),
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    FunctionCall { name: String, args: Vec<Expr> },
    Like { expr: Box<Expr>, pattern: Box<Expr>, negated: bool },
    In { expr: Box<Expr>, list: InList, negated: bool },
    Between { expr: Box<Expr>, low: Box<Expr>, high: Box<Expr>, negated: bool },
    IsNull { expr: Box<Expr>, negated: bool },
    Subquery(Box<Select>),
    JsonPath { column: Box<Expr>, path: Vec<String>, as_text: bool },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InList {
    List(Vec<Expr>),
    Subquery(Box<Select>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

impl Expr {
    pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }
}
