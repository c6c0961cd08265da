//! `DirectorServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use director_engine::heartbeat::run_heartbeat;
use director_engine::{Engine, EngineBuilder, EngineConfig, Transport};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::config::ServerConfig;
use crate::health::HealthReport;
use crate::metrics;
use crate::shutdown::{DrainOutcome, Shutdown};
use crate::websocket::hub::ConnectionHub;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The protocol engine.
    pub engine: Arc<Engine>,
    /// Live sockets.
    pub hub: Arc<ConnectionHub>,
    /// Shared shutdown signal.
    pub shutdown: Shutdown,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Per-connection outbound frame capacity.
    pub send_queue_capacity: usize,
    /// Max inbound `WebSocket` message size.
    pub max_message_size: usize,
}

/// The director server.
pub struct DirectorServer {
    config: ServerConfig,
    engine: Arc<Engine>,
    hub: Arc<ConnectionHub>,
    shutdown: Shutdown,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl DirectorServer {
    /// Create a server whose engine sends through a fresh [`ConnectionHub`].
    pub fn new(
        config: ServerConfig,
        engine_config: EngineConfig,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let engine = EngineBuilder::new(Arc::clone(&hub) as Arc<dyn Transport>)
            .config(engine_config)
            .build();
        Self {
            config,
            engine,
            hub,
            shutdown: Shutdown::new(),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: Arc::clone(&self.engine),
            hub: Arc::clone(&self.hub),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            send_queue_capacity: self.config.send_queue_capacity,
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/games", get(api::list_games))
            .route("/games/{game}/actions", get(api::list_actions))
            .route("/games/{game}/force", post(api::force))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = served {
                error!(error = %err, "http server failed");
            }
        });
        info!(%addr, "director listening");
        Ok((addr, handle))
    }

    /// Start the heartbeat loop; it stops when shutdown begins.
    pub fn spawn_heartbeat(&self) -> JoinHandle<()> {
        tokio::spawn(run_heartbeat(
            Arc::clone(&self.engine),
            self.config.heartbeat_interval(),
            self.shutdown.token(),
        ))
    }

    /// Stop accepting work, close every socket, cancel pending timers,
    /// and wait up to `timeout` for `handles`.
    pub async fn shutdown_gracefully(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> DrainOutcome {
        let closing = self.hub.close_all();
        self.engine.shutdown();
        info!(closing, "shutting down");
        self.shutdown.drain(handles, timeout).await
    }

    /// Get the engine.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Get the connection hub.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Get the shutdown signal.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::new(
        state.start_time,
        state.shutdown.is_draining(),
        state.engine.connection_count(),
        &state.engine.games(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, metrics::render(handle)),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_owned()),
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let AppState {
        engine,
        hub,
        shutdown,
        send_queue_capacity,
        max_message_size,
        ..
    } = state;
    ws.max_message_size(max_message_size).on_upgrade(move |socket| {
        run_ws_session(socket, engine, hub, send_queue_capacity, shutdown.token())
    })
}
