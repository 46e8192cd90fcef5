//! Expression evaluation against a row (§4.4.7).

use relite_sats::{scalar_cmp, Value};
use relite_sql_ast::{BinaryOp, Expr, InList, Select, UnaryOp};

use crate::error::{EngineError, EngineResult, ExecutionError};

use super::functions;

/// A column slot in a row being evaluated against: its declaration name and
/// the table (or alias) it came from, used to resolve bare and
/// table-qualified identifiers alike. Shared by single-table scans and the
/// combined rows JOIN produces.
#[derive(Clone, Debug)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(table: Option<String>, name: impl Into<String>) -> ColumnRef {
        ColumnRef { table, name: name.into() }
    }
}

/// Resolves a subquery to its result rows. Boxed so `Expr::Subquery`/`In`
/// can be evaluated without the expression evaluator depending on the
/// executor's full `Select` machinery directly (avoids a module cycle
/// between `expr` and `select`).
pub trait SubqueryRunner {
    fn run(&self, select: &Select) -> EngineResult<Vec<Vec<Value>>>;
}

/// A [`SubqueryRunner`] for contexts where a subquery cannot legally
/// appear — default-value expressions, CHECK constraints evaluated without
/// the surrounding SELECT machinery, and procedure-call argument binding.
/// Any subquery encountered there resolves to an empty result set rather
/// than panicking.
pub struct NoSubqueries;
impl SubqueryRunner for NoSubqueries {
    fn run(&self, _select: &Select) -> EngineResult<Vec<Vec<Value>>> {
        Ok(Vec::new())
    }
}

pub struct EvalCtx<'a> {
    pub columns: &'a [ColumnRef],
    pub row: &'a [Value],
    pub args: &'a [Value],
    pub subqueries: &'a dyn SubqueryRunner,
}

impl<'a> EvalCtx<'a> {
    fn resolve(&self, table: Option<&str>, name: &str) -> EngineResult<Value> {
        for (idx, col) in self.columns.iter().enumerate() {
            if col.name.eq_ignore_ascii_case(name) {
                if let Some(want) = table {
                    if let Some(have) = &col.table {
                        if !have.eq_ignore_ascii_case(want) {
                            continue;
                        }
                    }
                }
                return Ok(self.row[idx].clone());
            }
        }
        Err(EngineError::Schema(relite_schema::SchemaError::ColumnNotFound(name.to_owned())))
    }
}

pub fn eval(expr: &Expr, ctx: &EvalCtx) -> EngineResult<Value> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::IntLit(i) => Ok(Value::Int(*i)),
        Expr::FloatLit(f) => Ok(Value::Float(*f)),
        Expr::StringLit(s) => Ok(Value::Text(s.clone())),
        Expr::Placeholder(idx) => ctx.args.get(*idx).cloned().ok_or_else(|| {
            EngineError::Execution(ExecutionError::PlaceholderOutOfRange { index: *idx, supplied: ctx.args.len() })
        }),
        Expr::Identifier(name) => ctx.resolve(None, name),
        Expr::QualifiedIdentifier { table, column } => ctx.resolve(Some(table), column),
        Expr::Star(_) => Ok(Value::Null),
        Expr::Unary { op, expr } => {
            let v = eval(expr, ctx)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!v.is_truthy()),
                UnaryOp::Neg => match v.as_numeric() {
                    Some(n) => numeric_result(v.kind(), -n),
                    None => Value::Null,
                },
                UnaryOp::Pos => v,
            })
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
        Expr::Like { expr, pattern, negated } => {
            let v = eval(expr, ctx)?;
            let p = eval(pattern, ctx)?;
            if v.is_null() || p.is_null() {
                return Ok(Value::Bool(false));
            }
            let matched = like_match(&v.coerce_text(), &p.coerce_text());
            Ok(Value::Bool(matched != *negated))
        }
        Expr::In { expr, list, negated } => {
            let v = eval(expr, ctx)?;
            let found = match list {
                InList::List(items) => {
                    let mut found = false;
                    for item in items {
                        let iv = eval(item, ctx)?;
                        if scalar_cmp(&v, &iv) == Some(std::cmp::Ordering::Equal) {
                            found = true;
                            break;
                        }
                    }
                    found
                }
                InList::Subquery(select) => {
                    let rows = ctx.subqueries.run(select)?;
                    rows.iter().any(|row| row.first().is_some_and(|first| scalar_cmp(&v, first) == Some(std::cmp::Ordering::Equal)))
                }
            };
            Ok(Value::Bool(found != *negated))
        }
        Expr::Between { expr, low, high, negated } => {
            let v = eval(expr, ctx)?;
            let lo = eval(low, ctx)?;
            let hi = eval(high, ctx)?;
            let within = scalar_cmp(&lo, &v).is_some_and(|o| o != std::cmp::Ordering::Greater)
                && scalar_cmp(&v, &hi).is_some_and(|o| o != std::cmp::Ordering::Greater);
            Ok(Value::Bool(within != *negated))
        }
        Expr::IsNull { expr, negated } => {
            let v = eval(expr, ctx)?;
            Ok(Value::Bool(v.is_null() != *negated))
        }
        Expr::FunctionCall { name, args } => {
            let values = args.iter().map(|a| eval(a, ctx)).collect::<EngineResult<Vec<_>>>()?;
            functions::call(name, &values)
        }
        Expr::Subquery(select) => {
            let rows = ctx.subqueries.run(select)?;
            Ok(rows.into_iter().next().and_then(|r| r.into_iter().next()).unwrap_or(Value::Null))
        }
        Expr::JsonPath { column, path, as_text } => {
            let v = eval(column, ctx)?;
            functions::json_path(&v, path, *as_text)
        }
    }
}

fn numeric_result(kind: relite_sats::ValueKind, n: f64) -> Value {
    if kind == relite_sats::ValueKind::Int {
        Value::Int(n as i64)
    } else {
        Value::Float(n)
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &EvalCtx) -> EngineResult<Value> {
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let l = eval(left, ctx)?;
        return Ok(match op {
            BinaryOp::And => Value::Bool(l.is_truthy() && eval(right, ctx)?.is_truthy()),
            BinaryOp::Or => Value::Bool(l.is_truthy() || eval(right, ctx)?.is_truthy()),
            _ => unreachable!(),
        });
    }

    let l = eval(left, ctx)?;
    let r = eval(right, ctx)?;

    match op {
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            if l.is_null() || r.is_null() {
                return Ok(Value::Bool(false));
            }
            let cmp = scalar_cmp(&l, &r);
            let result = match (op, cmp) {
                (BinaryOp::Eq, Some(std::cmp::Ordering::Equal)) => true,
                (BinaryOp::NotEq, c) => c != Some(std::cmp::Ordering::Equal),
                (BinaryOp::Lt, Some(std::cmp::Ordering::Less)) => true,
                (BinaryOp::Gt, Some(std::cmp::Ordering::Greater)) => true,
                (BinaryOp::Le, Some(o)) => o != std::cmp::Ordering::Greater,
                (BinaryOp::Ge, Some(o)) => o != std::cmp::Ordering::Less,
                _ => false,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            match (l.as_numeric(), r.as_numeric()) {
                (Some(a), Some(b)) => {
                    let result = match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => a / b,
                        BinaryOp::Mod => a % b,
                        _ => unreachable!(),
                    };
                    let both_int = matches!(l, Value::Int(_)) && matches!(r, Value::Int(_));
                    Ok(if both_int && op != BinaryOp::Div { Value::Int(result as i64) } else { Value::Float(result) })
                }
                _ => Ok(Value::Null),
            }
        }
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

/// SQL `LIKE`: `%` matches any run (including empty), `_` matches exactly
/// one character, everything else matches literally. Implemented by
/// backtracking recursion over the pattern, matching §4.4.7.
fn like_match(text: &str, pattern: &str) -> bool {
    fn go(t: &[u8], p: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'%') => go(t, &p[1..]) || (!t.is_empty() && go(&t[1..], p)),
            Some(b'_') => !t.is_empty() && go(&t[1..], &p[1..]),
            Some(&c) => t.first().is_some_and(|&tc| tc == c) && go(&t[1..], &p[1..]),
        }
    }
    go(text.as_bytes(), pattern.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_handles_percent_and_underscore() {
        assert!(like_match("hello", "h%o"));
        assert!(like_match("hello", "h_ll_"));
        assert!(!like_match("hello", "h_llo_"));
        assert!(like_match("", "%"));
    }
}
