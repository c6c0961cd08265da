//! Wire envelopes and typed command payloads.
//!
//! Every message in either direction is a JSON object
//! `{ "command": string, "game"?: string, "data"?: object }`. The engine only
//! decodes `data` into the typed payloads below once a handler has been
//! selected for the command.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::action::Action;
use crate::errors::ProtocolError;
use crate::ids::InvocationId;

/// Command strings recognised on the wire.
pub mod commands {
    /// Client announces its game name.
    pub const HANDSHAKE: &str = "handshake";
    /// Client adds or replaces actions in its catalogue.
    pub const REGISTER: &str = "register";
    /// Client removes actions from its catalogue.
    pub const UNREGISTER: &str = "unregister";
    /// Client asks the director to pick and invoke one of a set of actions.
    pub const FORCE: &str = "force";
    /// Client reports the outcome of an invocation.
    pub const RESULT: &str = "result";
    /// Client shares free-form context about the game state.
    pub const CONTEXT: &str = "context";
    /// Director asks the client to execute an action.
    pub const INVOKE: &str = "invoke";
    /// Director asks a freshly connected client to re-send its catalogue.
    pub const REREGISTER_ALL: &str = "reregister_all";
}

/// Classification of a command string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `handshake`
    Handshake,
    /// `register`
    Register,
    /// `unregister`
    Unregister,
    /// `force`
    Force,
    /// `result`
    Result,
    /// `context`
    Context,
    /// `invoke`
    Invoke,
    /// `reregister_all`
    ReregisterAll,
    /// Anything else.
    Other,
}

impl CommandKind {
    /// Classify a command string.
    pub fn parse(command: &str) -> Self {
        match command {
            commands::HANDSHAKE => Self::Handshake,
            commands::REGISTER => Self::Register,
            commands::UNREGISTER => Self::Unregister,
            commands::FORCE => Self::Force,
            commands::RESULT => Self::Result,
            commands::CONTEXT => Self::Context,
            commands::INVOKE => Self::Invoke,
            commands::REREGISTER_ALL => Self::ReregisterAll,
            _ => Self::Other,
        }
    }

    /// Catalogue mutations are the only commands that may be merged while queued.
    pub fn is_coalescible(self) -> bool {
        matches!(self, Self::Register | Self::Unregister)
    }
}

/// The wire-level message unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Command string (see [`commands`]).
    pub command: String,
    /// Game the message concerns, if the sender includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    /// Opaque command payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Create an envelope with no game and no payload.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            game: None,
            data: None,
        }
    }

    /// Set the game field.
    #[must_use]
    pub fn with_game(mut self, game: impl Into<String>) -> Self {
        self.game = Some(game.into());
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Classify this envelope's command.
    pub fn kind(&self) -> CommandKind {
        CommandKind::parse(&self.command)
    }

    /// Decode an envelope from JSON text.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Encode this envelope as JSON text.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode the payload into a typed command body.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let data = self.data.clone().ok_or_else(|| ProtocolError::MissingPayload {
            command: self.command.clone(),
        })?;
        serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload {
            command: self.command.clone(),
            source,
        })
    }

    // ── Director → client ───────────────────────────────────────────

    /// `invoke` envelope for a scheduled invocation.
    pub fn invoke(invoke: &InvokeData) -> Self {
        let mut data = json!({ "id": invoke.id, "name": invoke.name });
        if let Some(ref args) = invoke.data {
            data["data"] = Value::String(args.clone());
        }
        Self::new(commands::INVOKE).with_data(data)
    }

    /// `reregister_all` envelope sent to every newly accepted connection.
    pub fn reregister_all() -> Self {
        Self::new(commands::REREGISTER_ALL)
    }

    // ── Client → director ───────────────────────────────────────────

    /// `handshake` envelope announcing `game`.
    pub fn handshake(game: &str) -> Self {
        Self::new(commands::HANDSHAKE)
            .with_game(game)
            .with_data(json!({ "game": game }))
    }

    /// `register` envelope carrying `actions`.
    pub fn register(game: &str, actions: &[Action]) -> Self {
        Self::new(commands::REGISTER)
            .with_game(game)
            .with_data(json!({ "actions": actions }))
    }

    /// `unregister` envelope carrying `names`.
    pub fn unregister(game: &str, names: &[String]) -> Self {
        Self::new(commands::UNREGISTER)
            .with_game(game)
            .with_data(json!({ "action_names": names }))
    }

    /// `force` envelope.
    pub fn force(game: &str, force: &ForceData) -> Self {
        Self::new(commands::FORCE).with_game(game).with_data(json!({
            "query": force.query,
            "state": force.state,
            "ephemeral_context": force.ephemeral_context,
            "action_names": force.action_names,
        }))
    }

    /// `result` envelope.
    pub fn result(game: &str, result: &ResultData) -> Self {
        Self::new(commands::RESULT).with_game(game).with_data(json!({
            "id": result.id,
            "success": result.success,
            "message": result.message,
        }))
    }

    /// `context` envelope.
    pub fn context(game: &str, message: &str, silent: bool) -> Self {
        Self::new(commands::CONTEXT)
            .with_game(game)
            .with_data(json!({ "message": message, "silent": silent }))
    }
}

/// `handshake` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeData {
    /// Game name the connection binds to.
    pub game: String,
}

/// `register` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisterData {
    /// Actions to insert or replace.
    pub actions: Vec<Action>,
}

/// `unregister` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterData {
    /// Names to remove.
    pub action_names: Vec<String>,
}

/// `force` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceData {
    /// Prompt describing what the game wants done.
    #[serde(default)]
    pub query: String,
    /// Optional serialized game state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Whether the query/state should be forgotten after this invocation.
    #[serde(default)]
    pub ephemeral_context: bool,
    /// Candidate action names; the director picks one.
    pub action_names: Vec<String>,
}

/// `result` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultData {
    /// Invocation being reported on.
    pub id: InvocationId,
    /// Whether the game executed the action.
    pub success: bool,
    /// Optional explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `context` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextData {
    /// Free-form description of what is happening in the game.
    pub message: String,
    /// Silent context is recorded without prompting a reaction.
    #[serde(default)]
    pub silent: bool,
}

/// `invoke` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeData {
    /// Fresh invocation ID the client must echo in its result.
    pub id: InvocationId,
    /// Action to execute.
    pub name: String,
    /// JSON-encoded arguments matching the action's schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}
