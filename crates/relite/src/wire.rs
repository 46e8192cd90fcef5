//! Wire protocol (§6): the length-prefixed framed message contract and the
//! request handler a TCP server calls per frame. The accept loop and
//! per-connection I/O plumbing are out of scope (§1) — this module defines
//! only the frame codec, the MessagePack payload shapes, and a pure
//! frame-in/frame-out dispatch function a server wires to its socket reads.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use relite_sats::Value;
use relite_sql_ast::Statement;
use relite_sql_parser::parse_statement;

use crate::error::{EngineError, ExecutionError, StorageError};
use crate::{Db, ExecResult};

/// One byte naming a frame's payload shape (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Query = 0x01,
    Prepare = 0x02,
    Execute = 0x03,
    Result = 0x10,
    Ok = 0x11,
    Error = 0x12,
    Ping = 0x20,
    Pong = 0x21,
}

impl MessageType {
    fn from_byte(b: u8) -> Option<MessageType> {
        Some(match b {
            0x01 => MessageType::Query,
            0x02 => MessageType::Prepare,
            0x03 => MessageType::Execute,
            0x10 => MessageType::Result,
            0x11 => MessageType::Ok,
            0x12 => MessageType::Error,
            0x20 => MessageType::Ping,
            0x21 => MessageType::Pong,
            _ => return None,
        })
    }
}

/// `Query`/`Execute`/`Prepare` request payload (§6). `Prepare` is accepted
/// with this same shape and handled identically to `Query` — prepared-
/// statement plan caching is a Non-goal (§1), so "preparing" a statement
/// here means parsing and executing it immediately, with nothing cached
/// for a later `Execute` to reuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<Value>,
}

/// `Result` response payload, for a `SELECT` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPayload {
    pub cols: Vec<String>,
    pub types: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub count: i64,
}

/// `OK` response payload, for DDL/DML (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OkPayload {
    pub last_insert_id: i64,
    pub rows_affected: i64,
}

/// `Error` response payload (§6, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i32,
    pub message: String,
}

impl From<ExecResult> for OkPayload {
    fn from(r: ExecResult) -> OkPayload {
        OkPayload { last_insert_id: r.last_insert_id, rows_affected: r.rows_affected as i64 }
    }
}

/// A decoded frame: its message type and raw (still MessagePack-encoded)
/// payload bytes.
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

/// Frames `payload` behind its 4-byte little-endian length prefix (which
/// counts the message-type byte) and 1-byte message type (§6).
pub fn encode_frame(message_type: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + payload.len());
    buf.extend_from_slice(&((payload.len() + 1) as u32).to_le_bytes());
    buf.push(message_type as u8);
    buf.extend_from_slice(payload);
    buf
}

/// Decodes one frame from the front of `bytes`, returning it along with
/// whatever trailing bytes follow (for a server reading a stream of
/// back-to-back frames out of a buffer).
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, &[u8]), FrameError> {
    if bytes.len() < 4 {
        return Err(FrameError::ShortLengthPrefix);
    }
    let len = LittleEndian::read_u32(&bytes[..4]) as usize;
    if len == 0 {
        return Err(FrameError::EmptyFrame);
    }
    if bytes.len() < 4 + len {
        return Err(FrameError::ShortBody { expected: len, found: bytes.len() - 4 });
    }
    let message_type = MessageType::from_byte(bytes[4]).ok_or(FrameError::UnknownMessageType(bytes[4]))?;
    let payload = bytes[5..4 + len].to_vec();
    Ok((Frame { message_type, payload }, &bytes[4 + len..]))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame shorter than the 4-byte length prefix")]
    ShortLengthPrefix,
    #[error("frame declares zero length (missing message-type byte)")]
    EmptyFrame,
    #[error("frame body shorter than declared: expected {expected} bytes, found {found}")]
    ShortBody { expected: usize, found: usize },
    #[error("unknown message type byte {0:#04x}")]
    UnknownMessageType(u8),
}

/// Maps the §7 error taxonomy to a small stable integer for the wire
/// `Error` payload's `code` field, grouped by the taxonomy's top-level kind
/// rather than by concrete variant (so adding a variant to an existing kind
/// never renumbers another kind's code).
fn error_code(err: &EngineError) -> i32 {
    match err {
        EngineError::Parse(_) => 1,
        EngineError::Schema(_) => 2,
        EngineError::Constraint(_) => 3,
        EngineError::Execution(_) => 4,
        EngineError::Transaction(_) => 5,
        EngineError::Storage(_) => 6,
        EngineError::Lifecycle(_) => 7,
        EngineError::Codec(_) => 8,
        EngineError::Map(_) => 8,
    }
}

fn error_payload(err: EngineError) -> ErrorPayload {
    ErrorPayload { code: error_code(&err), message: err.to_string() }
}

fn encode_error(err: EngineError) -> (MessageType, Vec<u8>) {
    let payload = error_payload(err);
    (MessageType::Error, rmp_serde::to_vec(&payload).unwrap_or_default())
}

fn encode_frame_error(err: FrameError) -> Vec<u8> {
    let payload = ErrorPayload { code: 0, message: err.to_string() };
    encode_frame(MessageType::Error, &rmp_serde::to_vec(&payload).unwrap_or_default())
}

/// Runs one `Query`/`Prepare`/`Execute` request against `db` and returns the
/// response message type plus its encoded payload.
fn handle_query_request(db: &Db, req: QueryRequest) -> (MessageType, Vec<u8>) {
    let stmt = match parse_statement(&req.sql) {
        Ok(stmt) => stmt,
        Err(e) => return encode_error(EngineError::Parse(e)),
    };

    if matches!(stmt, Statement::Select(_)) {
        match db.query(&req.sql, &req.params) {
            Ok(mut rows) => {
                let cols = rows.columns().to_vec();
                let mut out_rows = Vec::new();
                while rows.next() {
                    out_rows.push(rows.row().to_vec());
                }
                let types = result_types(&out_rows, cols.len());
                let count = out_rows.len() as i64;
                let payload = ResultPayload { cols, types, rows: out_rows, count };
                (MessageType::Result, rmp_serde::to_vec(&payload).unwrap_or_default())
            }
            Err(e) => encode_error(e),
        }
    } else {
        match db.exec(&req.sql, &req.params) {
            Ok(result) => {
                let payload: OkPayload = result.into();
                (MessageType::Ok, rmp_serde::to_vec(&payload).unwrap_or_default())
            }
            Err(e) => encode_error(e),
        }
    }
}

/// A value's wire type name, used to fill `ResultPayload::types`. Derived
/// from the first row that has a non-null value in that column — the
/// engine doesn't carry static column types through aggregate/expression
/// projections, so this is a best-effort runtime label, not a declared
/// schema type.
fn result_types(rows: &[Vec<Value>], col_count: usize) -> Vec<String> {
    let mut types = vec!["NULL".to_string(); col_count];
    for row in rows {
        for (i, value) in row.iter().enumerate().take(col_count) {
            if types[i] != "NULL" {
                continue;
            }
            let name = match value {
                Value::Null => continue,
                Value::Int(_) => "INTEGER",
                Value::Float(_) => "REAL",
                Value::Bool(_) => "BOOLEAN",
                Value::Text(_) => "TEXT",
                Value::Bytes(_) => "BLOB",
            };
            types[i] = name.to_string();
        }
    }
    types
}

/// The request/response handler a TCP server calls once per decoded frame
/// (§1's "the core only defines the wire message contract and the handler
/// function the server calls"). Pure frame-in, frame-out: no socket I/O.
pub fn handle_frame(db: &Db, frame: &Frame) -> Vec<u8> {
    match frame.message_type {
        MessageType::Query | MessageType::Prepare | MessageType::Execute => {
            match rmp_serde::from_slice::<QueryRequest>(&frame.payload) {
                Ok(req) => {
                    let (message_type, payload) = handle_query_request(db, req);
                    encode_frame(message_type, &payload)
                }
                Err(e) => encode_error_frame(EngineError::Storage(StorageError::Corrupt(format!(
                    "malformed request payload: {e}"
                )))),
            }
        }
        MessageType::Ping => encode_frame(MessageType::Pong, &[]),
        MessageType::Result | MessageType::Ok | MessageType::Error | MessageType::Pong => {
            encode_error_frame(EngineError::Execution(ExecutionError::TypeMismatch(
                "response-only message type sent as a request".into(),
            )))
        }
    }
}

fn encode_error_frame(err: EngineError) -> Vec<u8> {
    let (message_type, payload) = encode_error(err);
    encode_frame(message_type, &payload)
}

/// Decodes one or more back-to-back frames out of `bytes` and runs
/// [`handle_frame`] on each, returning one encoded response frame per
/// request frame. A malformed leading frame is reported as a single
/// `Error` frame; nothing after it is attempted.
pub fn handle_stream(db: &Db, mut bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        match decode_frame(bytes) {
            Ok((frame, rest)) => {
                out.extend_from_slice(&handle_frame(db, &frame));
                bytes = rest;
            }
            Err(e) => {
                out.extend_from_slice(&encode_frame_error(e));
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Db, DbOptions};

    #[test]
    fn ping_yields_pong_frame() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        let frame = Frame { message_type: MessageType::Ping, payload: Vec::new() };
        let response = handle_frame(&db, &frame);
        let (decoded, rest) = decode_frame(&response).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.message_type, MessageType::Pong);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn frame_round_trips_through_encode_decode() {
        let payload = b"hello".to_vec();
        let framed = encode_frame(MessageType::Query, &payload);
        let (decoded, rest) = decode_frame(&framed).unwrap();
        assert_eq!(decoded.message_type, MessageType::Query);
        assert_eq!(decoded.payload, payload);
        assert!(rest.is_empty());
    }

    #[test]
    fn ddl_request_yields_ok_frame() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        let req = QueryRequest { sql: "CREATE TABLE t (id INTEGER)".into(), params: Vec::new() };
        let payload = rmp_serde::to_vec(&req).unwrap();
        let framed = encode_frame(MessageType::Query, &payload);
        let response = handle_stream(&db, &framed);
        let (decoded, _) = decode_frame(&response).unwrap();
        assert_eq!(decoded.message_type, MessageType::Ok);
        let ok: OkPayload = rmp_serde::from_slice(&decoded.payload).unwrap();
        assert_eq!(ok.rows_affected, 0);
    }

    #[test]
    fn select_request_yields_result_frame() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[]).unwrap();
        db.exec("INSERT INTO t (id, v) VALUES (1, 'a')", &[]).unwrap();

        let req = QueryRequest { sql: "SELECT id, v FROM t".into(), params: Vec::new() };
        let payload = rmp_serde::to_vec(&req).unwrap();
        let framed = encode_frame(MessageType::Query, &payload);
        let response = handle_stream(&db, &framed);
        let (decoded, _) = decode_frame(&response).unwrap();
        assert_eq!(decoded.message_type, MessageType::Result);
        let result: ResultPayload = rmp_serde::from_slice(&decoded.payload).unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.cols, vec!["id".to_string(), "v".to_string()]);
        assert_eq!(result.rows, vec![vec![Value::Int(1), Value::Text("a".into())]]);
    }

    #[test]
    fn parse_error_yields_error_frame_with_parse_code() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        let req = QueryRequest { sql: "SELEC".into(), params: Vec::new() };
        let payload = rmp_serde::to_vec(&req).unwrap();
        let framed = encode_frame(MessageType::Query, &payload);
        let response = handle_stream(&db, &framed);
        let (decoded, _) = decode_frame(&response).unwrap();
        assert_eq!(decoded.message_type, MessageType::Error);
        let err: ErrorPayload = rmp_serde::from_slice(&decoded.payload).unwrap();
        assert_eq!(err.code, 1);
    }

    #[test]
    fn short_length_prefix_reports_frame_error() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        let response = handle_stream(&db, &[1, 2]);
        let (decoded, _) = decode_frame(&response).unwrap();
        assert_eq!(decoded.message_type, MessageType::Error);
    }
}
