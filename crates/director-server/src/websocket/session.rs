//! `WebSocket` session lifecycle: one game client from upgrade through disconnect.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use director_engine::Engine;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::connection::{ClientConnection, Frame};
use super::hub::ConnectionHub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Run a session for a connected game client.
///
/// 1. Registers the connection with the engine and the hub
/// 2. Flushes the `reregister_all` queued on accept
/// 3. Feeds inbound text frames and pongs to the engine
/// 4. Forwards engine output (text, probes, closes) to the socket
/// 5. Releases the connection on disconnect, eviction, or shutdown
#[instrument(skip_all)]
pub async fn run_ws_session(
    ws: WebSocket,
    engine: Arc<Engine>,
    hub: Arc<ConnectionHub>,
    send_queue_capacity: usize,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Frame>(send_queue_capacity);

    let id = engine.accept_with(|id| {
        hub.add(Arc::new(ClientConnection::new(id.clone(), send_tx)));
    });
    let started = std::time::Instant::now();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(connection = %id, "client connected");

    engine.flush();

    let writer_id = id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = send_rx.recv().await {
            let message = match frame {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Ping => Message::Ping(Bytes::new()),
                Frame::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    debug!(connection = %writer_id, "socket closed by director");
                    break;
                }
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => engine.handle_text(&id, text.as_str()),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => engine.handle_text(&id, text),
                        Err(_) => debug!(connection = %id, len = data.len(), "non-UTF8 binary frame dropped"),
                    },
                    Some(Ok(Message::Pong(_))) => engine.on_pong(&id),
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        info!(connection = %id, "client closed the socket");
                        break;
                    }
                    Some(Err(err)) => {
                        debug!(connection = %id, error = %err, "socket read failed");
                        break;
                    }
                }
            }
            _ = &mut writer => {
                break;
            }
            () = cancel.cancelled() => {
                break;
            }
        }
    }

    writer.abort();
    engine.close(&id);
    let _ = hub.remove(&id);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(connection = %id, "client disconnected");
}
