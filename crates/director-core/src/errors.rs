//! Protocol-level error types.

use thiserror::Error;

/// Failure to decode or encode a wire message.
///
/// All variants are local, non-fatal conditions: the offending message is
/// dropped and the connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The text was not a JSON envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    /// Serialising an outbound envelope failed.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
    /// The command requires a `data` object but none was sent.
    #[error("command '{command}' is missing its data payload")]
    MissingPayload {
        /// Offending command.
        command: String,
    },
    /// The `data` object did not match the command's payload shape.
    #[error("invalid payload for command '{command}': {source}")]
    InvalidPayload {
        /// Offending command.
        command: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED_ENVELOPE",
            Self::Encode(_) => "ENCODE_FAILED",
            Self::MissingPayload { .. } => "MISSING_PAYLOAD",
            Self::InvalidPayload { .. } => "INVALID_PAYLOAD",
        }
    }
}
