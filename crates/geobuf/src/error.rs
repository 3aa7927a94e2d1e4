//! Error types for geobuf decoding.

use tablemap_common::TableError;
use thiserror::Error;

/// Errors that can occur while decoding a geobuf payload.
#[derive(Error, Debug)]
pub enum GeobufError {
    /// The cell text is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The bytes are not a valid protobuf message.
    #[error("invalid protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// The payload holds something other than a feature or geometry.
    #[error("unsupported payload: {0}")]
    UnsupportedPayload(&'static str),

    /// Unknown geometry type code.
    #[error("unknown geometry type {0}")]
    UnknownType(i32),

    /// Lengths reference more coordinates than the payload holds.
    #[error("coordinates truncated: need {needed}, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Dimension or precision outside the supported range.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

/// Result type for geobuf operations.
pub type Result<T> = std::result::Result<T, GeobufError>;

impl From<GeobufError> for TableError {
    fn from(err: GeobufError) -> Self {
        TableError::GeometryDecode(err.to_string())
    }
}
