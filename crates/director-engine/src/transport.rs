//! The seam between the engine and whatever carries bytes to clients.

use director_core::ConnectionId;

/// Delivers text frames, liveness probes, and closes to connections.
///
/// Implementations must not block; the engine calls these while holding
/// per-game state.
pub trait Transport: Send + Sync {
    /// Queue `text` for `connection`. Returns `false` if it could not be queued.
    fn send(&self, connection: &ConnectionId, text: String) -> bool;

    /// Issue a liveness probe.
    fn ping(&self, connection: &ConnectionId);

    /// Close the connection from the director side.
    fn close(&self, connection: &ConnectionId);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use director_core::Envelope;
    use parking_lot::Mutex;

    /// Records everything the engine asks the transport to do.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        sent: Mutex<Vec<(ConnectionId, Envelope)>>,
        pings: Mutex<Vec<ConnectionId>>,
        closed: Mutex<Vec<ConnectionId>>,
    }

    impl RecordingTransport {
        pub(crate) fn sent_to(&self, connection: &ConnectionId) -> Vec<Envelope> {
            self.sent
                .lock()
                .iter()
                .filter(|(c, _)| c == connection)
                .map(|(_, e)| e.clone())
                .collect()
        }

        pub(crate) fn sent_commands(&self, connection: &ConnectionId) -> Vec<String> {
            self.sent_to(connection)
                .into_iter()
                .map(|e| e.command)
                .collect()
        }

        pub(crate) fn take_sent(&self) -> Vec<(ConnectionId, Envelope)> {
            std::mem::take(&mut *self.sent.lock())
        }

        pub(crate) fn pings(&self) -> Vec<ConnectionId> {
            self.pings.lock().clone()
        }

        pub(crate) fn closed(&self) -> Vec<ConnectionId> {
            self.closed.lock().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, connection: &ConnectionId, text: String) -> bool {
            let envelope = Envelope::decode(&text).expect("engine sent an undecodable envelope");
            self.sent.lock().push((connection.clone(), envelope));
            true
        }

        fn ping(&self, connection: &ConnectionId) {
            self.pings.lock().push(connection.clone());
        }

        fn close(&self, connection: &ConnectionId) {
            self.closed.lock().push(connection.clone());
        }
    }
}
