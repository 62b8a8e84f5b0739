mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use session_log::{EventSource, SessionEvent, SessionEventKind, SessionLog};
use ws_relay::{Relay, RelayConfig};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref host) = cli.listen_host {
        cfg.server.listen_host = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    if let Some(ref path) = cli.session_log {
        cfg.logging.session_log_path = path.clone();
    }

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    // 4. Validate mode invariants. Fatal before anything binds; no session
    //    is ever accepted under a partially valid configuration.
    let mode = config::validate(&cfg).context("invalid configuration")?;

    info!(
        config_file = %cli.config.display(),
        host = %cfg.server.listen_host,
        port = cfg.server.port,
        mode = %cfg.server.mode,
        "ws-relayd starting"
    );

    // 5. Start the session event log.
    let (session_log, _log_handle) = SessionLog::start(&cfg.logging.session_log_path)
        .await
        .context("failed to start session log")?;

    session_log
        .log(SessionEvent::new(
            SessionEventKind::ServerStarted,
            EventSource::new("ws-relayd"),
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_file": cli.config.display().to_string(),
            }),
        ))
        .await;

    // 6. Build the relay.
    let relay = Relay::new(RelayConfig {
        listen_host: cfg.server.listen_host.clone(),
        listen_port: cfg.server.port,
        mode,
        password: cfg.auth.password.clone(),
        send_prefix: cfg.transport.send_prefix.clone(),
        send_suffix: cfg.transport.send_suffix.clone(),
        max_messages_per_session: cfg.server.max_messages_per_session,
        session_log: session_log.clone(),
    });

    // 7. Run until the relay exits or a shutdown signal arrives.
    tokio::select! {
        result = relay.run() => {
            result.context("relay server failed")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    info!("ws-relayd shutting down");
    session_log
        .log(SessionEvent::new(
            SessionEventKind::ServerStopped,
            EventSource::new("ws-relayd"),
            serde_json::json!({}),
        ))
        .await;

    Ok(())
}

/// Wait for ctrl-c or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (ctrl-c)");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT (ctrl-c)");
    }
}
