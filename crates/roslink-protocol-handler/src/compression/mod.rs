//! Payload decompression strategies.

pub mod cbor;
pub mod png;

pub use cbor::{CborDecompressor, TypedArray, resolve_typed_array};
pub use png::PngDecompressor;

use roslink_core::error::ProtocolError;
use serde_json::Value;

/// The compressed body of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressedPayload {
    /// The `data` field of a text envelope such as `{"op":"png","data":...}`.
    Text(String),
    /// A whole binary frame.
    Binary(Vec<u8>),
}

/// Turns a compressed payload back into the JSON frame it carries.
pub trait Decompressor: Send + Sync {
    fn name(&self) -> &str;

    fn decompress(&self, payload: CompressedPayload) -> Result<Value, ProtocolError>;

    /// Whether decoding is slow enough to run off the actor's thread.
    fn is_blocking(&self) -> bool {
        true
    }
}

pub(crate) fn failure(codec: &str, reason: impl ToString) -> ProtocolError {
    ProtocolError::Decompression {
        codec: codec.to_string(),
        reason: reason.to_string(),
    }
}
