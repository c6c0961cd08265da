//! Engine error types.

use director_core::{ConnectionId, InvocationId, ProtocolError};

/// Failures raised by the invocation state machine.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// None of the force candidates is currently registered.
    #[error("no registered action among candidates {candidates:?}")]
    NoValidCandidates {
        /// Names the force request offered.
        candidates: Vec<String>,
    },

    /// A result arrived while nothing was outstanding.
    #[error("result for {received} arrived with no invocation outstanding")]
    NoOutstanding {
        /// ID carried by the stray result.
        received: InvocationId,
    },

    /// A result arrived for some other invocation.
    #[error("result for {received} does not match outstanding invocation {expected}")]
    Mismatch {
        /// ID of the outstanding invocation.
        expected: InvocationId,
        /// ID carried by the result.
        received: InvocationId,
    },
}

/// Errors surfaced by command handlers and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A connection tried to re-bind to a different game.
    #[error("connection {connection} is bound to '{bound}', refusing '{requested}'")]
    AlreadyBound {
        /// The connection.
        connection: ConnectionId,
        /// Game it is bound to.
        bound: String,
        /// Game it asked for.
        requested: String,
    },

    /// The connection is not (or no longer) registered.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// A game-scoped command arrived before a handshake.
    #[error("connection {0} has not completed a handshake")]
    UnboundConnection(ConnectionId),

    /// No connection currently serves this game.
    #[error("unknown game '{0}'")]
    UnknownGame(String),

    /// Invocation state machine refused the transition.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Envelope or payload could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A handler panicked while processing a command.
    #[error("handler for '{command}' panicked")]
    HandlerPanicked {
        /// Command being handled.
        command: String,
    },
}

impl EngineError {
    /// Stable error code used for logs and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyBound { .. } => "ALREADY_BOUND",
            Self::UnknownConnection(_) => "UNKNOWN_CONNECTION",
            Self::UnboundConnection(_) => "UNBOUND_CONNECTION",
            Self::UnknownGame(_) => "UNKNOWN_GAME",
            Self::Coordinator(CoordinatorError::NoValidCandidates { .. }) => "NO_VALID_CANDIDATES",
            Self::Coordinator(CoordinatorError::NoOutstanding { .. }) => "NO_OUTSTANDING_INVOCATION",
            Self::Coordinator(CoordinatorError::Mismatch { .. }) => "INVOCATION_MISMATCH",
            Self::Protocol(e) => e.code(),
            Self::HandlerPanicked { .. } => "HANDLER_PANICKED",
        }
    }
}
