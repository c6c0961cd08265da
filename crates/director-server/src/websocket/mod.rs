//! `WebSocket` connection handling.

pub mod connection;
pub mod hub;
pub mod session;
