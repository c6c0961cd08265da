//! # director-engine
//!
//! The director-side protocol engine. Game clients advertise actions; the
//! director invokes them one at a time per game and waits for a result.
//!
//! - [`catalogue`]: per-game action catalogue
//! - [`registry`]: connection tracking, game binding, heartbeat sweep
//! - [`coordinator`]: the invoke/await-result state machine with FIFO backlog
//! - [`scheduler`]: cancellable deferred timers keyed by game and purpose
//! - [`dispatcher`]: command-name → handler table
//! - [`engine`]: the shared [`Engine`] tying it all together behind a [`Transport`]
//! - [`heartbeat`]: the liveness loop driving [`Engine::heartbeat_tick`]

#![deny(unsafe_code)]

pub mod catalogue;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod heartbeat;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod transport;

pub use catalogue::ActionCatalogue;
pub use coordinator::{ForceRequest, Invocation, InvocationCoordinator};
pub use dispatcher::{CommandContext, CommandDispatcher, CommandHandler};
pub use engine::{Engine, EngineBuilder, EngineConfig, ForceOutcome, GameSummary};
pub use errors::EngineError;
pub use registry::ConnectionRegistry;
pub use transport::Transport;
