//! `nal2-host`: runs the NAL2 server with the serial mock fitting engine.

mod relay;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nal2_core::{Engine, MockFitting, SerialEngine};
use nal2_server::{ControlFailure, Nal2Server, ServerConfig};
use nal2_settings::{LoggingSettings, Nal2Settings, ServerSettings};
use nal2_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "nal2-host", version, about = "Local HTTP + WebSocket host for the NAL2 fitting engine")]
struct Cli {
    /// Settings file (default `~/.nal2/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Port to listen on; 0 picks a free one.
    #[arg(long)]
    port: Option<u16>,
    /// Address to bind.
    #[arg(long)]
    host: Option<String>,
    /// Log level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long)]
    log_level: Option<String>,
    /// Emit JSON log lines.
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut Nal2Settings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json {
            settings.logging.json = true;
        }
    }
}

fn telemetry_config(settings: &LoggingSettings) -> TelemetryConfig {
    TelemetryConfig::from_level_name(&settings.level, settings.json)
        .with_module_levels(&settings.modules)
}

fn server_config(settings: &ServerSettings) -> ServerConfig {
    ServerConfig {
        host: settings.host.clone(),
        port: settings.port,
        max_workers: settings.max_workers,
        engine_timeout_secs: settings.engine_timeout_secs,
        read_timeout_secs: settings.read_timeout_secs,
        max_body_bytes: settings.max_body_bytes,
        session_queue: settings.session_queue,
        shutdown_grace_secs: settings.shutdown_grace_secs,
        ..ServerConfig::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => nal2_settings::load_settings_from_path(path),
        None => nal2_settings::load_settings(),
    }
    .context("failed to load settings")?;
    cli.apply(&mut settings);

    let _ = init_telemetry(&telemetry_config(&settings.logging));

    let config = server_config(&settings.server);
    let port = config.port;
    let engine: Arc<dyn Engine> =
        Arc::new(SerialEngine::spawn(MockFitting::new()).context("failed to start fitting engine")?);
    let server = Nal2Server::new(config, engine);

    let report = match server.start(port).await {
        Ok(report) => report,
        Err(err) => {
            let failure = ControlFailure::from(&err);
            error!(error = %failure.error, "server failed to start");
            return Err(err).context("failed to start server");
        }
    };
    info!(
        port = report.port,
        local_address = %report.local_address,
        "NAL2 server ready"
    );

    let relay = relay::spawn_relay(Arc::clone(server.registry()), server.bridge().clone());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    let _ = server.stop().await;
    relay.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "nal2-host",
            "--port",
            "9000",
            "--host",
            "127.0.0.1",
            "--log-level",
            "debug",
            "--json",
        ]);
        let mut settings = Nal2Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn absent_flags_keep_settings() {
        let cli = Cli::parse_from(["nal2-host"]);
        let mut settings = Nal2Settings::default();
        settings.server.port = 7000;
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 7000);
        assert!(!settings.logging.json);
    }

    #[test]
    fn logging_modules_reach_the_filter() {
        let mut settings = LoggingSettings::default();
        let _ = settings.modules.insert("nal2_server".into(), "debug".into());
        let cli = Cli::parse_from(["nal2-host", "--log-level", "warn"]);
        let mut all = Nal2Settings {
            logging: settings,
            ..Nal2Settings::default()
        };
        cli.apply(&mut all);

        let config = telemetry_config(&all.logging);
        assert_eq!(config.filter_directive(), "warn,nal2_server=debug");
    }

    #[test]
    fn settings_map_onto_server_config() {
        let settings = ServerSettings {
            max_workers: 4,
            engine_timeout_secs: 12,
            ..ServerSettings::default()
        };
        let config = server_config(&settings);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.engine_timeout_secs, 12);
        assert_eq!(config.port, 8080);
        assert_eq!(config.server_name, "FuncApp4NAL2");
    }
}
