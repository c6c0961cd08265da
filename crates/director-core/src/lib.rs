//! # director-core
//!
//! Foundation types shared by the director engine, its transport, and game
//! clients:
//!
//! - **Branded IDs**: `ConnectionId`, `InvocationId` as newtypes for type safety
//! - **Actions**: the [`Action`](action::Action) definition a game advertises
//! - **Envelopes**: the `{ command, game?, data? }` wire unit plus typed payloads
//! - **Outbound queue**: per-destination buffer that coalesces catalogue mutations
//! - **Errors**: `ProtocolError` for decode/payload failures
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod action;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod queue;

pub use action::Action;
pub use envelope::{Envelope, commands};
pub use errors::ProtocolError;
pub use ids::{ConnectionId, InvocationId};
pub use queue::OutboundQueue;
