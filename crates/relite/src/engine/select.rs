//! SELECT pipeline (§4.4.6): source resolution, projection, join handling,
//! index-probe optimization, aggregation, HAVING, ORDER BY, DISTINCT, and
//! OFFSET/LIMIT, in that order.

use std::cmp::Ordering;
use std::collections::HashSet;

use itertools::Itertools;
use relite_sats::{scalar_cmp, Value};
use relite_schema::{Catalog, TableSchema};
use relite_sql_ast::{BinaryOp, Expr, FromItem, Join, JoinKind, OrderDirection, Select, SelectItem};
use relite_txn::Transaction;

use crate::error::{EngineError, EngineResult, ExecutionError};

use super::expr::{eval, ColumnRef, EvalCtx, SubqueryRunner};
use super::{Engine, QueryResult};

const AGGREGATE_NAMES: [&str; 5] = ["COUNT", "SUM", "AVG", "MIN", "MAX"];

struct Runner<'a> {
    engine: &'a Engine,
    args: &'a [Value],
    tx: Option<&'a Transaction>,
}

impl<'a> SubqueryRunner for Runner<'a> {
    fn run(&self, select: &Select) -> EngineResult<Vec<Vec<Value>>> {
        Ok(self.engine.execute_select(select, self.args, self.tx)?.rows)
    }
}

impl Engine {
    #[tracing::instrument(skip(self, select, args, tx))]
    pub(crate) fn execute_select(
        &self,
        select: &Select,
        args: &[Value],
        tx: Option<&Transaction>,
    ) -> EngineResult<QueryResult> {
        let runner = Runner { engine: self, args, tx };
        let (columns, combined) = self.resolve_combined(select, args, tx)?;

        let mut filtered = Vec::new();
        for row in combined {
            let ctx = EvalCtx { columns: &columns, row: &row, args, subqueries: &runner };
            let keep = match &select.filter {
                Some(expr) => eval(expr, &ctx)?.is_truthy(),
                None => true,
            };
            if keep {
                filtered.push(row);
            }
        }

        let wants_aggregation = !select.group_by.is_empty() || select.columns.iter().any(|c| match c {
            SelectItem::Expr { expr, .. } => contains_aggregate(expr),
        });

        let (mut header, mut rows) = if wants_aggregation {
            self.aggregate(select, &columns, filtered, args, &runner)?
        } else {
            self.project(select, &columns, &filtered, args, &runner)?
        };

        if !select.order_by.is_empty() {
            self.order_rows(select, &columns, &filtered, &header, &mut rows, args, &runner)?;
        }

        // DISTINCT (step 9) runs after ORDER BY (step 8, §4.4.6), deduping
        // the already-ordered rows so it never reorders them; `unique_by`
        // keeps each value's first (i.e. highest-sorted) occurrence.
        if select.distinct {
            rows = rows.into_iter().unique_by(relite_sats::encode_row_text).collect();
        }

        let offset = match &select.offset {
            Some(expr) => eval(expr, &EvalCtx { columns: &[], row: &[], args, subqueries: &runner })?.as_int().unwrap_or(0).max(0) as usize,
            None => 0,
        };
        let limit = match &select.limit {
            Some(expr) => Some(eval(expr, &EvalCtx { columns: &[], row: &[], args, subqueries: &runner })?.as_int().unwrap_or(0).max(0) as usize),
            None => None,
        };
        let rows: Vec<Vec<Value>> = rows.into_iter().skip(offset).take(limit.unwrap_or(usize::MAX)).collect();

        header.clear();
        header.extend(projection_labels(select));
        Ok(QueryResult { columns: header, rows })
    }

    fn resolve_combined(
        &self,
        select: &Select,
        args: &[Value],
        tx: Option<&Transaction>,
    ) -> EngineResult<(Vec<ColumnRef>, Vec<Vec<Value>>)> {
        let mut from = select.from.iter();
        let first = from.next().ok_or_else(|| EngineError::Execution(ExecutionError::TypeMismatch("SELECT with no FROM".into())))?;
        // The index-probe optimization (§4.4.6 step 4) only applies when
        // the base table is the query's sole source — a JOIN or multiple
        // FROM items combine rows before WHERE is evaluated, so a
        // top-level equality can no longer be resolved against one table's
        // index alone.
        let probe_filter = if select.joins.is_empty() && select.from.len() == 1 { select.filter.as_ref() } else { None };
        let (mut columns, mut rows) = self.resolve_source(first, args, tx, probe_filter)?;

        for extra in from {
            let (extra_columns, extra_rows) = self.resolve_source(extra, args, tx, None)?;
            (columns, rows) = cross_join(columns, rows, extra_columns, extra_rows);
        }

        for join in &select.joins {
            let (join_columns, join_rows) = self.resolve_source(&join.table, args, tx, None)?;
            (columns, rows) = self.apply_join(join, columns, rows, join_columns, join_rows, args)?;
        }

        Ok((columns, rows))
    }

    /// Resolves a single `FROM`/`JOIN` item: a view is substituted by
    /// recursively executing its stored query (§4.4.6 step 1); a base
    /// table is scanned, narrowed first to the candidate row-key set a
    /// top-level equality WHERE produces via `index_probe_candidates` when
    /// `index_filter` is given and an index covers the column (§4.4.6 step
    /// 4) — rows outside that set are excluded before WHERE is evaluated
    /// row-by-row in `execute_select`.
    fn resolve_source(
        &self,
        item: &FromItem,
        args: &[Value],
        tx: Option<&Transaction>,
        index_filter: Option<&Expr>,
    ) -> EngineResult<(Vec<ColumnRef>, Vec<Vec<Value>>)> {
        let catalog = self.catalog.read();
        if let Some(view) = catalog.view(&item.table) {
            let query = view.query.clone();
            drop(catalog);
            let result = self.execute_select(&query, args, tx)?;
            let alias = item.alias.clone().unwrap_or_else(|| item.table.clone());
            let columns = result.columns.iter().map(|c| ColumnRef::new(Some(alias.clone()), c.clone())).collect();
            return Ok((columns, result.rows));
        }
        let table = catalog.require_table(&item.table)?.clone();
        let candidates = index_filter.and_then(|f| self.index_probe_candidates(&catalog, &table, f, args));
        drop(catalog);
        let alias = item.alias.clone().unwrap_or_else(|| table.name.clone());
        let columns: Vec<ColumnRef> = table.columns.iter().map(|c| ColumnRef::new(Some(alias.clone()), c.name.clone())).collect();
        let rows = self
            .scan_table(table.id, tx)
            .into_iter()
            .filter(|(key, _)| candidates.as_ref().map_or(true, |set| set.contains(key)))
            .map(|(_, bytes)| relite_sats::decode_row(&bytes))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((columns, rows))
    }

    /// §4.4.6 step 4: if `filter` is a top-level `column = literal` or
    /// `column = ?` equality and `column` is covered by a secondary index
    /// on `table`, looks the value up in that index and returns the
    /// one-element candidate row-key set it names (or an empty set if the
    /// value isn't present). Returns `None` when the filter doesn't have
    /// this shape or no index covers the column, meaning "no probe,
    /// fall back to a full scan."
    fn index_probe_candidates(&self, catalog: &Catalog, table: &TableSchema, filter: &Expr, args: &[Value]) -> Option<HashSet<Vec<u8>>> {
        let Expr::Binary { op: BinaryOp::Eq, left, right } = filter else { return None };
        let (col_name, literal) = match (left.as_ref(), right.as_ref()) {
            (Expr::Identifier(name), other) if is_probe_literal(other) => (name.as_str(), other),
            (other, Expr::Identifier(name)) if is_probe_literal(other) => (name.as_str(), other),
            (Expr::QualifiedIdentifier { column, .. }, other) if is_probe_literal(other) => (column.as_str(), other),
            (other, Expr::QualifiedIdentifier { column, .. }) if is_probe_literal(other) => (column.as_str(), other),
            _ => return None,
        };
        let col_id = table.column_index_by_name(col_name).ok()?;
        let index = catalog.indexes_on(table.id).find(|idx| idx.columns.first() == Some(&col_id))?;

        let dummy = DummyRunner;
        let ctx = EvalCtx { columns: &[], row: &[], args, subqueries: &dummy };
        let value = eval(literal, &ctx).ok()?;

        let index_map = self.storage.index_map(index.id);
        let mut candidates = HashSet::new();
        if !value.is_null() {
            if let Ok(Some(row_key)) = index_map.get(&value.coerce_text().into_bytes()) {
                candidates.insert(row_key);
            }
        }
        Some(candidates)
    }

    fn apply_join(
        &self,
        join: &Join,
        left_columns: Vec<ColumnRef>,
        left_rows: Vec<Vec<Value>>,
        right_columns: Vec<ColumnRef>,
        right_rows: Vec<Vec<Value>>,
        args: &[Value],
    ) -> EngineResult<(Vec<ColumnRef>, Vec<Vec<Value>>)> {
        let runner_args = args;
        let mut columns = left_columns.clone();
        columns.extend(right_columns.clone());
        let right_width = right_columns.len();
        let left_width = left_columns.len();

        let eval_on = |combined: &[Value]| -> EngineResult<bool> {
            let dummy = DummyRunner;
            let ctx = EvalCtx { columns: &columns, row: combined, args: runner_args, subqueries: &dummy };
            Ok(eval(&join.on, &ctx)?.is_truthy())
        };

        let mut out = Vec::new();
        match join.kind {
            JoinKind::Inner => {
                for l in &left_rows {
                    for r in &right_rows {
                        let mut combined = l.clone();
                        combined.extend(r.clone());
                        if eval_on(&combined)? {
                            out.push(combined);
                        }
                    }
                }
            }
            JoinKind::Left => {
                for l in &left_rows {
                    let mut matched = false;
                    for r in &right_rows {
                        let mut combined = l.clone();
                        combined.extend(r.clone());
                        if eval_on(&combined)? {
                            matched = true;
                            out.push(combined);
                        }
                    }
                    if !matched {
                        let mut combined = l.clone();
                        combined.extend(std::iter::repeat(Value::Null).take(right_width));
                        out.push(combined);
                    }
                }
            }
            JoinKind::Right => {
                for r in &right_rows {
                    let mut matched = false;
                    for l in &left_rows {
                        let mut combined = l.clone();
                        combined.extend(r.clone());
                        if eval_on(&combined)? {
                            matched = true;
                            out.push(combined);
                        }
                    }
                    if !matched {
                        let mut combined: Vec<Value> = std::iter::repeat(Value::Null).take(left_width).collect();
                        combined.extend(r.clone());
                        out.push(combined);
                    }
                }
            }
        }
        Ok((columns, out))
    }

    fn project(
        &self,
        select: &Select,
        columns: &[ColumnRef],
        rows: &[Vec<Value>],
        args: &[Value],
        runner: &Runner,
    ) -> EngineResult<(Vec<String>, Vec<Vec<Value>>)> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let ctx = EvalCtx { columns, row, args, subqueries: runner };
            out.push(project_row(select, columns, &ctx)?);
        }
        Ok((projection_labels(select), out))
    }

    fn aggregate(
        &self,
        select: &Select,
        columns: &[ColumnRef],
        rows: Vec<Vec<Value>>,
        args: &[Value],
        runner: &Runner,
    ) -> EngineResult<(Vec<String>, Vec<Vec<Value>>)> {
        let mut groups: indexmap::IndexMap<Vec<u8>, Vec<Vec<Value>>> = indexmap::IndexMap::new();
        for row in rows {
            let key = if select.group_by.is_empty() {
                Vec::new()
            } else {
                let ctx = EvalCtx { columns, row: &row, args, subqueries: runner };
                let mut values = Vec::with_capacity(select.group_by.len());
                for expr in &select.group_by {
                    values.push(eval(expr, &ctx)?);
                }
                relite_sats::encode_row(&values)
            };
            groups.entry(key).or_insert_with(Vec::new).push(row);
        }
        // An aggregate with no GROUP BY still yields a single (possibly
        // empty) group for the whole filtered result (§4.4.6 step 6).
        if groups.is_empty() && select.group_by.is_empty() {
            groups.insert(Vec::new(), Vec::new());
        }

        let mut out = Vec::new();
        for group_rows in groups.into_values() {
            let projected = project_group(select, columns, &group_rows, args, runner)?;
            if let Some(having) = &select.having {
                if !eval_group_expr(having, columns, &group_rows, args, runner)?.is_truthy() {
                    continue;
                }
            }
            out.push(projected);
        }
        Ok((projection_labels(select), out))
    }

    fn order_rows(
        &self,
        select: &Select,
        columns: &[ColumnRef],
        filtered: &[Vec<Value>],
        _header: &[String],
        rows: &mut Vec<Vec<Value>>,
        args: &[Value],
        runner: &Runner,
    ) -> EngineResult<()> {
        let wants_aggregation = !select.group_by.is_empty() || select.columns.iter().any(|c| match c {
            SelectItem::Expr { expr, .. } => contains_aggregate(expr),
        });

        // Sort keys, computed once per output row. For non-aggregated
        // queries we can re-evaluate ORDER BY expressions against the
        // (already 1:1) filtered rows; for aggregated queries ORDER BY may
        // reference an aggregate by its projection spelling (§4.4.6 step 8
        // via the same resolution rule as HAVING).
        let mut keyed: Vec<(Vec<Value>, Vec<Value>)> = Vec::with_capacity(rows.len());
        if wants_aggregation {
            // Re-derive groups in the same order aggregate() produced them
            // is not tracked here, so fall back to evaluating order keys
            // against each output row's own projected values when the
            // ORDER BY expression matches a projection alias; otherwise
            // skip (best-effort, resolved through the projection list).
            for row in rows.iter() {
                let mut keys = Vec::with_capacity(select.order_by.len());
                for item in &select.order_by {
                    let label = expr_label(&item.expr);
                    let pos = projection_labels(select).iter().position(|l| l == &label);
                    keys.push(pos.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null));
                }
                keyed.push((keys, row.clone()));
            }
        } else {
            for row in filtered.iter() {
                let ctx = EvalCtx { columns, row, args, subqueries: runner };
                let mut keys = Vec::with_capacity(select.order_by.len());
                for item in &select.order_by {
                    keys.push(eval(&item.expr, &ctx)?);
                }
                let projected = project_row(select, columns, &ctx)?;
                keyed.push((keys, projected));
            }
        }

        keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, select));
        *rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(())
    }
}

struct DummyRunner;
impl SubqueryRunner for DummyRunner {
    fn run(&self, _select: &Select) -> EngineResult<Vec<Vec<Value>>> {
        Ok(Vec::new())
    }
}

fn cross_join(
    left_columns: Vec<ColumnRef>,
    left_rows: Vec<Vec<Value>>,
    right_columns: Vec<ColumnRef>,
    right_rows: Vec<Vec<Value>>,
) -> (Vec<ColumnRef>, Vec<Vec<Value>>) {
    let mut columns = left_columns;
    columns.extend(right_columns);
    let mut out = Vec::with_capacity(left_rows.len() * right_rows.len().max(1));
    for l in &left_rows {
        for r in &right_rows {
            let mut combined = l.clone();
            combined.extend(r.clone());
            out.push(combined);
        }
    }
    (columns, out)
}

fn is_probe_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::StringLit(_) | Expr::IntLit(_) | Expr::FloatLit(_) | Expr::BoolLit(_) | Expr::Null | Expr::Placeholder(_))
}

fn contains_aggregate(expr: &Expr) -> bool {
    matches!(expr, Expr::FunctionCall { name, .. } if AGGREGATE_NAMES.contains(&name.to_ascii_uppercase().as_str()))
}

fn project_row(select: &Select, columns: &[ColumnRef], ctx: &EvalCtx) -> EngineResult<Vec<Value>> {
    let mut out = Vec::new();
    for item in &select.columns {
        let SelectItem::Expr { expr, .. } = item;
        match expr {
            Expr::Star(None) => out.extend(ctx.row.iter().cloned()),
            Expr::Star(Some(table)) => {
                for (idx, col) in columns.iter().enumerate() {
                    if col.table.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(table)) {
                        out.push(ctx.row[idx].clone());
                    }
                }
            }
            other => out.push(eval(other, ctx)?),
        }
    }
    Ok(out)
}

fn project_group(
    select: &Select,
    columns: &[ColumnRef],
    group_rows: &[Vec<Value>],
    args: &[Value],
    runner: &Runner,
) -> EngineResult<Vec<Value>> {
    let mut out = Vec::new();
    for item in &select.columns {
        let SelectItem::Expr { expr, .. } = item;
        match expr {
            Expr::Star(None) => {
                if let Some(row) = group_rows.first() {
                    out.extend(row.iter().cloned());
                }
            }
            other => out.push(eval_group_expr(other, columns, group_rows, args, runner)?),
        }
    }
    Ok(out)
}

/// Evaluates `expr` against a group: aggregate calls are computed over the
/// whole group, everything else is evaluated against the group's
/// representative (first) row.
fn eval_group_expr(
    expr: &Expr,
    columns: &[ColumnRef],
    group_rows: &[Vec<Value>],
    args: &[Value],
    runner: &Runner,
) -> EngineResult<Value> {
    if let Expr::FunctionCall { name, args: fargs } = expr {
        let upper = name.to_ascii_uppercase();
        if AGGREGATE_NAMES.contains(&upper.as_str()) {
            return compute_aggregate(&upper, fargs.first(), columns, group_rows, args, runner);
        }
    }
    let representative = group_rows.first().cloned().unwrap_or_default();
    let ctx = EvalCtx { columns, row: &representative, args, subqueries: runner };
    eval(expr, &ctx)
}

fn compute_aggregate(
    name: &str,
    arg_expr: Option<&Expr>,
    columns: &[ColumnRef],
    rows: &[Vec<Value>],
    args: &[Value],
    runner: &Runner,
) -> EngineResult<Value> {
    if name == "COUNT" {
        let is_star = matches!(arg_expr, Some(Expr::Star(_)) | None);
        if is_star {
            return Ok(Value::Int(rows.len() as i64));
        }
    }
    let arg_expr = arg_expr.ok_or_else(|| EngineError::Execution(ExecutionError::TypeMismatch(format!("{name} requires an argument"))))?;
    let values: Vec<Value> = rows
        .iter()
        .map(|row| {
            let ctx = EvalCtx { columns, row, args, subqueries: runner };
            eval(arg_expr, &ctx)
        })
        .collect::<EngineResult<Vec<_>>>()?;

    match name {
        "COUNT" => Ok(Value::Int(values.iter().filter(|v| !v.is_null()).count() as i64)),
        "SUM" | "AVG" => {
            let nums: Vec<f64> = values.iter().filter_map(Value::as_numeric).collect();
            if nums.is_empty() {
                return Ok(Value::Null);
            }
            let sum: f64 = nums.iter().sum();
            Ok(Value::Float(if name == "SUM" { sum } else { sum / nums.len() as f64 }))
        }
        "MIN" | "MAX" => {
            let mut best: Option<&Value> = None;
            for v in &values {
                if v.is_null() {
                    continue;
                }
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let better = if name == "MIN" { scalar_cmp(v, b) == Some(Ordering::Less) } else { scalar_cmp(v, b) == Some(Ordering::Greater) };
                        if better { v } else { b }
                    }
                });
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
        _ => unreachable!("not an aggregate name"),
    }
}

fn projection_labels(select: &Select) -> Vec<String> {
    let mut out = Vec::new();
    for item in &select.columns {
        let SelectItem::Expr { expr, alias } = item;
        if let Some(alias) = alias {
            out.push(alias.clone());
            continue;
        }
        match expr {
            Expr::Star(_) => out.push("*".to_owned()),
            other => out.push(expr_label(other)),
        }
    }
    out
}

fn expr_label(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(name) => name.clone(),
        Expr::QualifiedIdentifier { column, .. } => column.clone(),
        Expr::FunctionCall { name, args } => {
            let arg_labels: Vec<String> = args
                .iter()
                .map(|a| match a {
                    Expr::Star(_) => "*".to_owned(),
                    other => expr_label(other),
                })
                .collect();
            format!("{}({})", name.to_ascii_uppercase(), arg_labels.join(", "))
        }
        Expr::StringLit(s) => s.clone(),
        Expr::IntLit(i) => i.to_string(),
        Expr::FloatLit(f) => f.to_string(),
        Expr::BoolLit(b) => b.to_string(),
        Expr::Null => "NULL".to_owned(),
        _ => "?column?".to_owned(),
    }
}

fn compare_keys(a: &[Value], b: &[Value], select: &Select) -> Ordering {
    for (i, (av, bv)) in a.iter().zip(b.iter()).enumerate() {
        let direction = select.order_by.get(i).map(|o| o.direction).unwrap_or(OrderDirection::Asc);
        let ordering = match (av.is_null(), bv.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => if direction == OrderDirection::Asc { Ordering::Less } else { Ordering::Greater },
            (false, true) => if direction == OrderDirection::Asc { Ordering::Greater } else { Ordering::Less },
            (false, false) => {
                let cmp = scalar_cmp(av, bv).unwrap_or(Ordering::Equal);
                if direction == OrderDirection::Desc { cmp.reverse() } else { cmp }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
