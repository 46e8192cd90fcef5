//! Scalar value representation and row codec.
//!
//! This crate plays the role `spacetimedb-sats` plays in the reference
//! engine: the lowest-level shared vocabulary ("what is a row made of, and
//! how do I turn it into bytes") that every other crate in the workspace
//! depends on.

mod codec;
mod error;
mod value;

pub use codec::{decode_row, decode_row_text, encode_row, encode_row_text};
pub use error::CodecError;
pub use value::{scalar_cmp, Value, ValueKind};
