//! # director-server
//!
//! Axum HTTP + `WebSocket` transport for the director engine.
//!
//! - `WebSocket` gateway at `/ws`: one session task per game connection
//! - [`ConnectionHub`](websocket::hub::ConnectionHub) implements the engine's `Transport`
//! - Heartbeat task driving probe/evict sweeps
//! - HTTP endpoints: health, Prometheus metrics, game inspection, force
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::DirectorServer;
