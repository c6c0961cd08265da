//! Built-in handlers for the client → director commands.

use director_core::envelope::{ContextData, ForceData, HandshakeData, RegisterData, ResultData, UnregisterData};
use director_core::{Envelope, ProtocolError, commands};

use crate::coordinator::ForceRequest;
use crate::dispatcher::{CommandContext, CommandDispatcher, CommandHandler};
use crate::errors::EngineError;

/// Install every built-in handler.
pub fn register_builtin(dispatcher: &mut CommandDispatcher) {
    dispatcher.register(commands::HANDSHAKE, HandshakeHandler);
    dispatcher.register(commands::REGISTER, RegisterHandler);
    dispatcher.register(commands::UNREGISTER, UnregisterHandler);
    dispatcher.register(commands::FORCE, ForceHandler);
    dispatcher.register(commands::RESULT, ResultHandler);
    dispatcher.register(commands::CONTEXT, ContextHandler);
}

/// Binds the connection to a game; the first bind resets the game's catalogue.
pub struct HandshakeHandler;

impl CommandHandler for HandshakeHandler {
    fn handle(&self, envelope: &Envelope, ctx: &CommandContext<'_>) -> Result<(), EngineError> {
        let game = match envelope.payload::<HandshakeData>() {
            Ok(data) => data.game,
            Err(ProtocolError::MissingPayload { .. }) => envelope.game.clone().ok_or_else(|| {
                ProtocolError::MissingPayload {
                    command: envelope.command.clone(),
                }
            })?,
            Err(err) => return Err(err.into()),
        };
        let _ = ctx.engine.bind(ctx.connection, &game)?;
        Ok(())
    }
}

/// Inserts or replaces actions.
pub struct RegisterHandler;

impl CommandHandler for RegisterHandler {
    fn handle(&self, envelope: &Envelope, ctx: &CommandContext<'_>) -> Result<(), EngineError> {
        let data: RegisterData = envelope.payload()?;
        let game = ctx.bound_game(envelope)?;
        let _ = ctx.engine.register_actions(&game, data.actions)?;
        Ok(())
    }
}

/// Removes actions by name.
pub struct UnregisterHandler;

impl CommandHandler for UnregisterHandler {
    fn handle(&self, envelope: &Envelope, ctx: &CommandContext<'_>) -> Result<(), EngineError> {
        let data: UnregisterData = envelope.payload()?;
        let game = ctx.bound_game(envelope)?;
        let _ = ctx.engine.unregister_actions(&game, &data.action_names)?;
        Ok(())
    }
}

/// Asks the director to invoke one of several candidates.
pub struct ForceHandler;

impl CommandHandler for ForceHandler {
    fn handle(&self, envelope: &Envelope, ctx: &CommandContext<'_>) -> Result<(), EngineError> {
        let data: ForceData = envelope.payload()?;
        let game = ctx.bound_game(envelope)?;
        let _ = ctx.engine.force(&game, ForceRequest::from(data))?;
        Ok(())
    }
}

/// Reports the outcome of an invocation.
pub struct ResultHandler;

impl CommandHandler for ResultHandler {
    fn handle(&self, envelope: &Envelope, ctx: &CommandContext<'_>) -> Result<(), EngineError> {
        let data: ResultData = envelope.payload()?;
        let game = ctx.bound_game(envelope)?;
        ctx.engine.complete(&game, &data)
    }
}

/// Records a context message from the game.
pub struct ContextHandler;

impl CommandHandler for ContextHandler {
    fn handle(&self, envelope: &Envelope, ctx: &CommandContext<'_>) -> Result<(), EngineError> {
        let data: ContextData = envelope.payload()?;
        let game = ctx.bound_game(envelope)?;
        ctx.engine.record_context(&game, data)
    }
}
