//! # director-agent
//!
//! Director server binary: loads settings, starts the HTTP/`WebSocket`
//! server and the heartbeat, and shuts down cleanly on Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use director_core::logging::init_subscriber;
use director_engine::EngineConfig;
use director_server::config::ServerConfig;
use director_server::metrics::install_recorder;
use director_server::server::DirectorServer;
use director_settings::{DirectorSettings, load_settings, load_settings_from_path};

/// Time allowed for sessions and the heartbeat to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Director server for game clients.
#[derive(Parser, Debug)]
#[command(name = "director-agent", about = "Director server for game clients")]
struct Cli {
    /// Settings file (defaults to `~/.director/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn settings(&self) -> Result<DirectorSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => load_settings().context("failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics = install_recorder().context("failed to install metrics recorder")?;
    let server = DirectorServer::new(
        ServerConfig::from(&settings),
        EngineConfig::from(&settings),
        Some(metrics),
    );

    let (addr, serve) = server
        .listen()
        .await
        .with_context(|| format!("failed to bind {}:{}", settings.server.host, settings.server.port))?;
    let heartbeat = server.spawn_heartbeat();
    tracing::info!(
        %addr,
        settle_delay_ms = settings.invocation.settle_delay_ms,
        heartbeat_ms = settings.heartbeat.interval_ms,
        "director ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("ctrl-c received");
    let drained = server
        .shutdown_gracefully(vec![serve, heartbeat], Some(SHUTDOWN_TIMEOUT))
        .await;
    tracing::info!(finished = drained.finished, aborted = drained.aborted, "director stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"host":"0.0.0.0","port":7000}}"#).unwrap();

        let cli = Cli::parse_from([
            "director-agent",
            "--settings",
            path.to_str().unwrap(),
            "--port",
            "7100",
            "--json",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 7100);
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cli = Cli::parse_from(["director-agent", "--settings", path.to_str().unwrap()]);
        assert!(cli.settings().is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
