//! Liveness loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::Engine;

/// Run [`Engine::heartbeat_tick`] every `interval` until `cancel` fires.
///
/// The first tick happens one full interval after start, so a fresh
/// connection always gets at least one probe before it can be evicted.
pub async fn run_heartbeat(engine: Arc<Engine>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX), "heartbeat started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = engine.heartbeat_tick();
            }
            () = cancel.cancelled() => {
                info!("heartbeat stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineBuilder;
    use crate::transport::testing::RecordingTransport;

    const INTERVAL: Duration = Duration::from_secs(30);

    fn setup() -> (Arc<Engine>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let engine = EngineBuilder::new(Arc::clone(&transport) as Arc<dyn crate::Transport>).build();
        (engine, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_survives_first_interval() {
        let (engine, transport) = setup();
        let conn = engine.accept();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(Arc::clone(&engine), INTERVAL, cancel.clone()));

        time::sleep(INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(transport.pings(), vec![conn.clone()]);
        assert_eq!(engine.connection_count(), 1);

        time::sleep(INTERVAL).await;
        assert_eq!(engine.connection_count(), 0, "evicted on the second missed interval");
        assert_eq!(transport.closed(), vec![conn]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledged_probes_keep_connection() {
        let (engine, transport) = setup();
        let conn = engine.accept();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(Arc::clone(&engine), INTERVAL, cancel.clone()));

        // Pong shortly after each probe.
        time::sleep(Duration::from_millis(10)).await;
        for _ in 0..5 {
            time::sleep(INTERVAL).await;
            engine.on_pong(&conn);
        }
        assert_eq!(engine.connection_count(), 1);
        assert!(transport.closed().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_loop() {
        let (engine, _transport) = setup();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(engine, INTERVAL, cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }
}
