//! Client error types.

use director_core::ProtocolError;
use tokio_tungstenite::tungstenite;

/// Failures talking to the director.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Socket-level failure.
    #[error("websocket error: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),

    /// The director sent something that is not a valid envelope.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Self::Closed,
            other => Self::WebSocket(Box::new(other)),
        }
    }
}

impl ClientError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "WEBSOCKET",
            Self::Protocol(err) => err.code(),
            Self::Closed => "CLOSED",
        }
    }
}
