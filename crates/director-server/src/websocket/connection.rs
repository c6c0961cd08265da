//! Per-socket outbound handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use director_core::ConnectionId;
use tokio::sync::mpsc;

/// What the socket writer task should put on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A text frame carrying an encoded envelope.
    Text(String),
    /// A liveness probe.
    Ping,
    /// Close the socket.
    Close,
}

/// A connected game client, as seen by the hub.
pub struct ClientConnection {
    /// Engine-assigned connection ID.
    pub id: ConnectionId,
    /// Send channel to the socket's write task.
    tx: mpsc::Sender<Frame>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of frames dropped due to a full or closed channel.
    dropped_frames: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Queue a frame for the writer.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped frame counter.
    pub fn send(&self, frame: Frame) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
