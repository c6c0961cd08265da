//! Live sockets by connection ID; the engine's [`Transport`].

use std::collections::HashMap;
use std::sync::Arc;

use director_core::ConnectionId;
use director_engine::Transport;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::connection::{ClientConnection, Frame};

/// Routes engine output to the right socket writer.
#[derive(Default)]
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Remove a connection by ID.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(id)
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Number of live sockets.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Ask every socket to close.
    pub fn close_all(&self) -> usize {
        let conns = self.connections.read();
        for conn in conns.values() {
            let _ = conn.send(Frame::Close);
        }
        conns.len()
    }

    fn deliver(&self, id: &ConnectionId, frame: Frame) -> bool {
        let Some(conn) = self.get(id) else {
            debug!(connection = %id, "no socket for connection");
            return false;
        };
        if conn.send(frame) {
            true
        } else {
            warn!(connection = %id, dropped = conn.drop_count(), "socket send queue full or closed");
            false
        }
    }
}

impl Transport for ConnectionHub {
    fn send(&self, connection: &ConnectionId, text: String) -> bool {
        self.deliver(connection, Frame::Text(text))
    }

    fn ping(&self, connection: &ConnectionId) {
        let _ = self.deliver(connection, Frame::Ping);
    }

    fn close(&self, connection: &ConnectionId) {
        let _ = self.deliver(connection, Frame::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn attach(hub: &ConnectionHub, id: &str) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(8);
        hub.add(Arc::new(ClientConnection::new(ConnectionId::from(id), tx)));
        rx
    }

    #[tokio::test]
    async fn routes_by_id() {
        let hub = ConnectionHub::new();
        let mut a = attach(&hub, "a");
        let mut b = attach(&hub, "b");

        assert!(hub.send(&ConnectionId::from("a"), "one".into()));
        hub.ping(&ConnectionId::from("b"));

        assert_eq!(a.recv().await.unwrap(), Frame::Text("one".into()));
        assert_eq!(b.recv().await.unwrap(), Frame::Ping);
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn unknown_connection_send_fails() {
        let hub = ConnectionHub::new();
        assert!(!hub.send(&ConnectionId::from("ghost"), "x".into()));
    }

    #[tokio::test]
    async fn close_sends_close_frame() {
        let hub = ConnectionHub::new();
        let mut a = attach(&hub, "a");
        hub.close(&ConnectionId::from("a"));
        assert_eq!(a.recv().await.unwrap(), Frame::Close);
    }

    #[tokio::test]
    async fn close_all_reaches_everyone() {
        let hub = ConnectionHub::new();
        let mut a = attach(&hub, "a");
        let mut b = attach(&hub, "b");
        assert_eq!(hub.close_all(), 2);
        assert_eq!(a.recv().await.unwrap(), Frame::Close);
        assert_eq!(b.recv().await.unwrap(), Frame::Close);
    }

    #[test]
    fn add_and_remove() {
        let hub = ConnectionHub::new();
        let _rx = attach(&hub, "a");
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.remove(&ConnectionId::from("a")).is_some());
        assert_eq!(hub.connection_count(), 0);
        assert!(hub.get(&ConnectionId::from("a")).is_none());
    }
}
