//! `/health` endpoint.

use std::time::Instant;

use director_engine::GameSummary;
use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// `"ok"`, or `"draining"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live game connections, bound or not.
    pub connections: usize,
    /// Games with at least one bound connection.
    pub games: usize,
    /// Games waiting on an action result.
    pub busy_games: usize,
    /// Force requests parked across all games.
    pub backlog: usize,
}

impl HealthReport {
    /// Summarise the engine's current games.
    pub fn new(
        start_time: Instant,
        draining: bool,
        connections: usize,
        games: &[GameSummary],
    ) -> Self {
        Self {
            status: if draining { "draining" } else { "ok" },
            uptime_secs: start_time.elapsed().as_secs(),
            connections,
            games: games.len(),
            busy_games: games.iter().filter(|g| g.outstanding_id.is_some()).count(),
            backlog: games.iter().map(|g| g.backlog).sum(),
        }
    }
}
