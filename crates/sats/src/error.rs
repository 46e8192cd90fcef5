use thiserror::Error;

/// Errors raised by the row codec (§4.2). These are `Storage`-kind errors in
/// the engine-wide taxonomy: a codec failure always means the bytes on disk
/// (or in an index) don't agree with what the codec wrote.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of buffer while decoding")]
    UnexpectedEof,
    #[error("unknown type tag {0}")]
    UnknownTag(u8),
    #[error("string payload exceeds the 65535-byte length cap")]
    StringTooLong,
    #[error("invalid UTF-8 in decoded string")]
    InvalidUtf8,
    #[error("malformed textual row encoding: {0}")]
    MalformedText(String),
}
