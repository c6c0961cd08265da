//! # director-client
//!
//! Game-side counterpart of the director: connect, handshake, advertise
//! actions, answer invokes.
//!
//! Catalogue mutations are buffered in the same coalescing
//! [`OutboundQueue`](director_core::OutboundQueue) the director uses and go
//! out on [`GameClient::flush`]. The client remembers what it has
//! registered and re-sends the whole set when the director asks for it.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;

pub use client::{GameClient, Incoming};
pub use errors::ClientError;
