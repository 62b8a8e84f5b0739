use std::net::SocketAddr;
use std::sync::Arc;

use session_log::{EventSource, SessionEvent, SessionEventKind, SessionLog};
use tokio::net::{TcpListener, TcpStream};

use crate::channel::Channel;
use crate::engine;
use crate::session::{ServerMode, SessionContext};

/// Configuration for the relay server. Immutable once the listener starts;
/// shared across sessions as an `Arc`. This is the only state sessions have
/// in common.
pub struct RelayConfig {
    /// Host the listening socket binds to.
    pub listen_host: String,
    /// Port the listening socket binds to.
    pub listen_port: u16,
    /// Destination/authentication mode.
    pub mode: ServerMode,
    /// Expected client password. Empty means clients must send an empty
    /// password field; it is not a bypass.
    pub password: String,
    /// Literal prefix applied to every forwarded request.
    pub send_prefix: String,
    /// Literal suffix applied to every forwarded request.
    pub send_suffix: String,
    /// Maximum number of requests forwarded within one session.
    pub max_messages_per_session: u32,
    /// Session event log sink.
    pub session_log: SessionLog,
}

/// The relay server.
///
/// Accepts client WebSocket connections and runs each one through the
/// session engine in its own Tokio task: authentication gate, destination
/// resolution, outbound connect, then the bidirectional relay loop.
pub struct Relay {
    config: Arc<RelayConfig>,
}

impl Relay {
    /// Create a new relay with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Bind the configured listen address and serve forever.
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener =
            TcpListener::bind((self.config.listen_host.as_str(), self.config.listen_port))
                .await?;
        tracing::info!(
            host = %self.config.listen_host,
            port = self.config.listen_port,
            "ws-relay listening"
        );
        self.serve(listener).await
    }

    /// Accept connections from an already-bound listener.
    ///
    /// Each connection is handled in its own Tokio task; a failing session
    /// never affects the accept loop or other sessions.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, remote_addr, config).await {
                    tracing::error!(%remote_addr, %err, "connection handler error");
                }
            });
        }
    }
}

/// Handle a single TCP connection from WebSocket handshake through session
/// teardown.
async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    config: Arc<RelayConfig>,
) -> anyhow::Result<()> {
    let ctx = SessionContext {
        session_id: uuid::Uuid::new_v4(),
        remote_addr,
    };

    let ws = tokio_tungstenite::accept_async(stream).await?;
    let mut client = Channel::new(ws);

    tracing::info!(session_id = %ctx.session_id, %remote_addr, "client connected");
    config
        .session_log
        .log(SessionEvent::new(
            SessionEventKind::SessionOpened,
            event_source(&ctx),
            serde_json::json!({ "remote_addr": remote_addr.to_string() }),
        ))
        .await;

    let reason = engine::drive_session(&config, &ctx, &mut client).await?;
    let _ = client.close().await;

    tracing::info!(session_id = %ctx.session_id, %remote_addr, ?reason, "session closed");
    config
        .session_log
        .log(SessionEvent::new(
            SessionEventKind::SessionClosed,
            event_source(&ctx),
            serde_json::json!({ "reason": format!("{:?}", reason) }),
        ))
        .await;

    Ok(())
}

/// Construct an [`EventSource`] for the relay engine component.
pub(crate) fn event_source(ctx: &SessionContext) -> EventSource {
    EventSource {
        component: "ws-relay".to_string(),
        remote_addr: Some(ctx.remote_addr.to_string()),
        session_id: Some(ctx.session_id.to_string()),
    }
}
