//! Error types for the protocol codecs.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// CBOR serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Unknown delta type code.
    #[error("unknown delta type code: {0}")]
    UnknownDeltaType(u8),
}

impl<E: std::fmt::Debug> From<ciborium::ser::Error<E>> for ProtocolError {
    fn from(err: ciborium::ser::Error<E>) -> Self {
        ProtocolError::Encode(format!("{err:?}"))
    }
}

impl<E: std::fmt::Debug> From<ciborium::de::Error<E>> for ProtocolError {
    fn from(err: ciborium::de::Error<E>) -> Self {
        ProtocolError::Decode(format!("{err:?}"))
    }
}
