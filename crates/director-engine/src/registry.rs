//! Connection tracking, game binding, and the heartbeat sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use director_core::ConnectionId;
use parking_lot::Mutex;

use crate::errors::EngineError;

/// Per-connection bookkeeping.
#[derive(Debug)]
pub struct ConnectionEntry {
    game: Option<String>,
    alive: bool,
    gate: Arc<Mutex<()>>,
    connected_at: Instant,
}

impl ConnectionEntry {
    /// Starts alive. Eviction counts sweeps, not elapsed time, so a
    /// connection accepted just before a sweep is gone after the next one.
    fn new() -> Self {
        Self {
            game: None,
            alive: true,
            gate: Arc::new(Mutex::new(())),
            connected_at: Instant::now(),
        }
    }

    /// Game this connection is bound to.
    pub fn game(&self) -> Option<&str> {
        self.game.as_deref()
    }

    /// Liveness flag as of the last sweep or pong.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// When the connection was accepted.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }
}

/// Result of a successful [`ConnectionRegistry::bind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// First handshake on this connection.
    New,
    /// Repeat handshake naming the same game.
    Unchanged,
}

/// What one heartbeat tick decided.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeartbeatSweep {
    /// Connections whose flag was still clear: evict these.
    pub evict: Vec<ConnectionId>,
    /// Connections that were alive: flag cleared, send each a probe.
    pub probe: Vec<ConnectionId>,
}

/// Every open connection, keyed by ID.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection: unbound, alive.
    pub fn accept(&mut self) -> ConnectionId {
        let id = ConnectionId::new();
        let _ = self.entries.insert(id.clone(), ConnectionEntry::new());
        id
    }

    /// Bind a connection to `game`. A connection binds at most once; naming
    /// the same game again is a no-op, naming a different one is refused.
    pub fn bind(&mut self, id: &ConnectionId, game: &str) -> Result<Binding, EngineError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownConnection(id.clone()))?;
        match entry.game.as_deref() {
            None => {
                entry.game = Some(game.to_owned());
                Ok(Binding::New)
            }
            Some(bound) if bound == game => Ok(Binding::Unchanged),
            Some(bound) => Err(EngineError::AlreadyBound {
                connection: id.clone(),
                bound: bound.to_owned(),
                requested: game.to_owned(),
            }),
        }
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionEntry> {
        self.entries.get(id)
    }

    /// Game `id` is bound to.
    pub fn game_of(&self, id: &ConnectionId) -> Option<&str> {
        self.entries.get(id).and_then(ConnectionEntry::game)
    }

    /// Record a probe acknowledgement. Returns `false` for unknown connections.
    pub fn mark_alive(&mut self, id: &ConnectionId) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.alive = true;
                true
            }
            None => false,
        }
    }

    /// Connections bound to `game`, or all connections when `None`. Sorted.
    pub fn connections(&self, game: Option<&str>) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .entries
            .iter()
            .filter(|(_, entry)| game.is_none() || entry.game.as_deref() == game)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether any connection is bound to `game`.
    pub fn serves(&self, game: &str) -> bool {
        self.entries
            .values()
            .any(|entry| entry.game.as_deref() == Some(game))
    }

    /// Per-connection gate serializing dispatch against eviction.
    pub fn gate(&self, id: &ConnectionId) -> Option<Arc<Mutex<()>>> {
        self.entries.get(id).map(|entry| Arc::clone(&entry.gate))
    }

    /// Stop tracking a connection.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionEntry> {
        self.entries.remove(id)
    }

    /// Whether `id` is tracked.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connections are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One heartbeat tick: connections with a clear flag are marked for
    /// eviction; the rest have their flag cleared and are marked for a probe.
    ///
    /// Evicted connections are not removed here; the caller evicts them under
    /// each connection's gate.
    pub fn sweep(&mut self) -> HeartbeatSweep {
        let mut sweep = HeartbeatSweep::default();
        for (id, entry) in &mut self.entries {
            if entry.alive {
                entry.alive = false;
                sweep.probe.push(id.clone());
            } else {
                sweep.evict.push(id.clone());
            }
        }
        sweep.evict.sort();
        sweep.probe.sort();
        sweep
    }
}
