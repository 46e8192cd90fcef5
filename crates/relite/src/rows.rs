//! `Rows`: a materialized SELECT result iterated one row at a time (§6).
//!
//! A scan materializes the whole result set up front (the executor already
//! builds a `Vec<Vec<Value>>` in [`crate::engine::QueryResult`]), so unlike
//! the ordered map's snapshot iterator this doesn't hold any lock open —
//! `Rows` just walks a `Vec` it already owns.

use relite_sats::Value;

use crate::engine::QueryResult;
use crate::error::{EngineError, EngineResult, ExecutionError};

/// A destination for [`Rows::scan`], one slot per projected column.
/// Mirrors §6's "Scan coercions" table: each variant accepts exactly the
/// crossings that table allows and nothing else.
pub enum ScanTarget<'a> {
    Int(&'a mut i64),
    Float(&'a mut f64),
    Bool(&'a mut bool),
    Text(&'a mut String),
    Bytes(&'a mut Vec<u8>),
}

/// Iterates a materialized [`QueryResult`] one row at a time (§6 `Rows`).
pub struct Rows {
    columns: Vec<String>,
    pending: std::vec::IntoIter<Vec<Value>>,
    current: Option<Vec<Value>>,
    closed: bool,
}

impl Rows {
    pub(crate) fn new(result: QueryResult) -> Rows {
        Rows { columns: result.columns, pending: result.rows.into_iter(), current: None, closed: false }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Advances to the next row, returning `false` once exhausted or after
    /// [`Rows::close`] — a pure predicate plus advance, the same contract
    /// the ordered map's own iterator follows in §4.1.
    pub fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.pending.next();
        self.current.is_some()
    }

    /// The current row's values in projection order. Empty before the
    /// first [`Rows::next`] call, after exhaustion, or after [`Rows::close`].
    pub fn row(&self) -> &[Value] {
        self.current.as_deref().unwrap_or(&[])
    }

    /// Scans the current row into `targets` per §6's coercion table:
    /// integer destinations accept int or float (truncating), float
    /// destinations accept float only, bool accepts bool only, text
    /// accepts any value via textual coercion, bytes accepts bytes only.
    pub fn scan(&self, targets: &mut [ScanTarget<'_>]) -> EngineResult<()> {
        let row = self.current.as_deref().ok_or(EngineError::Execution(ExecutionError::NoRows))?;
        if row.len() != targets.len() {
            return Err(EngineError::Execution(ExecutionError::ScanArityMismatch {
                destinations: targets.len(),
                columns: row.len(),
            }));
        }
        for (value, target) in row.iter().zip(targets.iter_mut()) {
            scan_one(value, target)?;
        }
        Ok(())
    }

    /// Releases the iterator early; subsequent `next()` calls return `false`.
    pub fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}

fn scan_one(value: &Value, target: &mut ScanTarget<'_>) -> EngineResult<()> {
    match target {
        ScanTarget::Int(dest) => match value {
            Value::Int(i) => **dest = *i,
            Value::Float(f) => **dest = *f as i64,
            other => return Err(unsupported("integer", other)),
        },
        ScanTarget::Float(dest) => match value {
            Value::Float(f) => **dest = *f,
            other => return Err(unsupported("float64", other)),
        },
        ScanTarget::Bool(dest) => match value {
            Value::Bool(b) => **dest = *b,
            other => return Err(unsupported("bool", other)),
        },
        ScanTarget::Text(dest) => **dest = value.coerce_text(),
        ScanTarget::Bytes(dest) => match value {
            Value::Bytes(b) => **dest = b.clone(),
            other => return Err(unsupported("bytes", other)),
        },
    }
    Ok(())
}

fn unsupported(dest_kind: &str, value: &Value) -> EngineError {
    EngineError::Execution(ExecutionError::UnsupportedScanCoercion(format!(
        "{dest_kind} destination cannot accept a {:?} value",
        value.kind()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult { columns: columns.iter().map(|s| s.to_string()).collect(), rows }
    }

    #[test]
    fn next_advances_then_exhausts() {
        let mut rows = Rows::new(result(&["n"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]));
        assert!(rows.next());
        assert_eq!(rows.row(), &[Value::Int(1)]);
        assert!(rows.next());
        assert_eq!(rows.row(), &[Value::Int(2)]);
        assert!(!rows.next());
    }

    #[test]
    fn close_stops_iteration() {
        let mut rows = Rows::new(result(&["n"], vec![vec![Value::Int(1)]]));
        rows.close();
        assert!(!rows.next());
    }

    #[test]
    fn scan_coerces_int_destination_from_float() {
        let mut rows = Rows::new(result(&["n"], vec![vec![Value::Float(3.0)]]));
        rows.next();
        let mut dest = 0i64;
        rows.scan(&mut [ScanTarget::Int(&mut dest)]).unwrap();
        assert_eq!(dest, 3);
    }

    #[test]
    fn scan_rejects_bytes_into_float_destination() {
        let mut rows = Rows::new(result(&["n"], vec![vec![Value::Bytes(vec![1, 2])]]));
        rows.next();
        let mut dest = 0.0f64;
        assert!(rows.scan(&mut [ScanTarget::Float(&mut dest)]).is_err());
    }

    #[test]
    fn scan_rejects_arity_mismatch() {
        let mut rows = Rows::new(result(&["a", "b"], vec![vec![Value::Int(1), Value::Int(2)]]));
        rows.next();
        let mut dest = 0i64;
        assert!(rows.scan(&mut [ScanTarget::Int(&mut dest)]).is_err());
    }
}
