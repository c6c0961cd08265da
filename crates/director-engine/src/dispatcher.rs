//! Command table and dispatch.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use director_core::{ConnectionId, Envelope};
use metrics::counter;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::errors::EngineError;
use crate::metrics::{COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL};

/// What a handler gets to work with.
pub struct CommandContext<'a> {
    /// The engine the command is applied to.
    pub engine: &'a Engine,
    /// Connection the envelope arrived on.
    pub connection: &'a ConnectionId,
}

impl CommandContext<'_> {
    /// Game the sending connection is bound to.
    ///
    /// An envelope naming some other game is served under the bound name.
    pub fn bound_game(&self, envelope: &Envelope) -> Result<String, EngineError> {
        let bound = self
            .engine
            .game_of(self.connection)
            .ok_or_else(|| EngineError::UnboundConnection(self.connection.clone()))?;
        if let Some(named) = envelope.game.as_deref() {
            if named != bound {
                warn!(
                    connection = %self.connection,
                    bound = %bound,
                    named,
                    command = %envelope.command,
                    "envelope names a different game than the connection is bound to"
                );
            }
        }
        Ok(bound)
    }
}

/// Implemented by every inbound command handler.
pub trait CommandHandler: Send + Sync {
    /// Apply `envelope` to the engine.
    fn handle(&self, envelope: &Envelope, ctx: &CommandContext<'_>) -> Result<(), EngineError>;
}

/// How a dispatch ended.
#[derive(Debug)]
pub enum Dispatched {
    /// A handler ran to completion.
    Handled,
    /// No handler for the command; the envelope was ignored.
    Unknown,
    /// The handler failed; nothing else was affected.
    Failed(EngineError),
}

/// Command name → handler.
pub struct CommandDispatcher {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandDispatcher {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Add or replace the handler for `command`.
    pub fn register(&mut self, command: &str, handler: impl CommandHandler + 'static) {
        let _ = self.handlers.insert(command.to_owned(), Arc::new(handler));
    }

    /// Route an envelope to its handler.
    ///
    /// Unknown commands and handler failures (including panics) are logged
    /// and counted; they never propagate to the caller.
    pub fn dispatch(&self, envelope: &Envelope, ctx: &CommandContext<'_>) -> Dispatched {
        let command = envelope.command.clone();
        counter!(COMMANDS_TOTAL, "command" => command.clone()).increment(1);

        let Some(handler) = self.handlers.get(&command) else {
            counter!(COMMAND_ERRORS_TOTAL, "command" => command.clone(), "code" => "UNKNOWN_COMMAND")
                .increment(1);
            warn!(connection = %ctx.connection, command, "unknown command ignored");
            return Dispatched::Unknown;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(envelope, ctx)))
            .unwrap_or_else(|_| {
                Err(EngineError::HandlerPanicked {
                    command: command.clone(),
                })
            });

        match outcome {
            Ok(()) => {
                debug!(connection = %ctx.connection, command, "command handled");
                Dispatched::Handled
            }
            Err(err) => {
                counter!(COMMAND_ERRORS_TOTAL, "command" => command.clone(), "code" => err.code())
                    .increment(1);
                warn!(
                    connection = %ctx.connection,
                    command,
                    code = err.code(),
                    error = %err,
                    "command failed"
                );
                Dispatched::Failed(err)
            }
        }
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `command` has a handler.
    pub fn has_command(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
