//! End-to-end relay sessions over real loopback listeners: a test client,
//! the relay, and a scripted destination server, all on 127.0.0.1.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use session_log::SessionLog;
use ws_relay::{Relay, RelayConfig, ServerMode};

type ClientWs = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a session log writing to a unique temp file.
async fn start_session_log() -> (SessionLog, std::path::PathBuf) {
    let path = std::env::temp_dir().join(format!("ws-relay-test-{}.jsonl", uuid::Uuid::new_v4()));
    let (log, _handle) = SessionLog::start(&path).await.expect("start session log");
    (log, path)
}

/// Start a destination server that echoes every text frame back verbatim.
/// Returns its `ws://` url and a counter of accepted connections.
async fn start_echo_destination() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind echo server");
    let addr = listener.local_addr().expect("echo server addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        if ws.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    (format!("ws://{addr}"), accepted)
}

/// Start a destination server that records every received text frame and
/// always replies `"reply"`.
async fn start_recording_destination() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind recording server");
    let addr = listener.local_addr().expect("recording server addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let _ = tx.send(text.to_string());
                        if ws.send(Message::Text("reply".into())).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    (format!("ws://{addr}"), rx)
}

fn relay_config(mode: ServerMode, password: &str, log: SessionLog) -> RelayConfig {
    RelayConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: 0,
        mode,
        password: password.to_string(),
        send_prefix: String::new(),
        send_suffix: String::new(),
        max_messages_per_session: 10_000,
        session_log: log,
    }
}

/// Bind the relay on an ephemeral port and serve it in the background.
async fn start_relay(config: RelayConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let addr = listener.local_addr().expect("relay addr");
    let relay = Relay::new(config);
    tokio::spawn(async move {
        let _ = relay.serve(listener).await;
    });
    addr
}

async fn connect_client(addr: SocketAddr) -> ClientWs {
    let (ws, _) = connect_async(format!("ws://{addr}")).await.expect("connect to relay");
    ws
}

async fn send_text(ws: &mut ClientWs, text: &str) {
    ws.send(Message::Text(text.into())).await.expect("send to relay");
}

/// Next text frame from the relay, or `None` once the connection closed.
async fn recv_text(ws: &mut ClientWs) -> Option<String> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

/// Split a status envelope into its `(status, message)` fields.
fn envelope(text: &str) -> (String, String) {
    let value: serde_json::Value = serde_json::from_str(text).expect("envelope json");
    (
        value["status"].as_str().expect("status field").to_string(),
        value["message"].as_str().expect("message field").to_string(),
    )
}

#[tokio::test]
async fn open_url_session_relays_round_trips() {
    let (dest_url, _) = start_echo_destination().await;
    let (log, _path) = start_session_log().await;
    let addr = start_relay(relay_config(ServerMode::OpenUrl, "", log)).await;

    let mut client = connect_client(addr).await;

    // Empty configured password still authenticates an empty password field.
    send_text(&mut client, "{\"password\": \"\"}").await;
    let (status, message) = envelope(&recv_text(&mut client).await.expect("auth reply"));
    assert_eq!(status, "ok");
    assert_eq!(message, "Authenticated. Supply URL.");

    send_text(&mut client, &format!("{{\"url\": \"{dest_url}\"}}")).await;
    let (status, message) = envelope(&recv_text(&mut client).await.expect("open reply"));
    assert_eq!(status, "ok");
    assert!(message.contains("open for arbitrary requests"));

    send_text(&mut client, "ping").await;
    assert_eq!(recv_text(&mut client).await.as_deref(), Some("ping"));
}

#[tokio::test]
async fn wrong_password_rejected_without_outbound_attempt() {
    let (dest_url, accepted) = start_echo_destination().await;
    let (log, _path) = start_session_log().await;
    let mode = ServerMode::ForcedUrl {
        destination: dest_url,
    };
    let addr = start_relay(relay_config(mode, "gogol", log)).await;

    let mut client = connect_client(addr).await;
    send_text(&mut client, "{\"password\": \"wrong\"}").await;

    let (status, message) = envelope(&recv_text(&mut client).await.expect("rejection reply"));
    assert_eq!(status, "error");
    assert!(message.contains("Authentication failed"));

    // Session closes; the destination never saw a connection attempt.
    assert!(recv_text(&mut client).await.is_none());
    assert_eq!(accepted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn quota_allows_limit_then_rejects() {
    let (dest_url, _) = start_echo_destination().await;
    let (log, _path) = start_session_log().await;
    let mut config = relay_config(
        ServerMode::ForcedUrlNoPassword {
            destination: dest_url,
        },
        "",
        log,
    );
    config.max_messages_per_session = 2;
    let addr = start_relay(config).await;

    let mut client = connect_client(addr).await;
    let (status, _) = envelope(&recv_text(&mut client).await.expect("open reply"));
    assert_eq!(status, "ok");

    // Messages 1..=limit are forwarded and replied to normally.
    for text in ["one", "two"] {
        send_text(&mut client, text).await;
        assert_eq!(recv_text(&mut client).await.as_deref(), Some(text));
    }

    // The third request is forwarded, then answered with the quota envelope.
    send_text(&mut client, "three").await;
    let (status, message) = envelope(&recv_text(&mut client).await.expect("quota reply"));
    assert_eq!(status, "error");
    assert!(message.contains("exceeds config limit of [2]"));
    assert!(recv_text(&mut client).await.is_none());
}

#[tokio::test]
async fn no_password_mode_relays_without_credentials() {
    let (dest_url, accepted) = start_echo_destination().await;
    let (log, _path) = start_session_log().await;
    let addr = start_relay(relay_config(
        ServerMode::ForcedUrlNoPassword {
            destination: dest_url,
        },
        "unused",
        log,
    ))
    .await;

    let mut client = connect_client(addr).await;

    // No credentials, no url request: the relay connects straight through.
    let (status, message) = envelope(&recv_text(&mut client).await.expect("open reply"));
    assert_eq!(status, "ok");
    assert!(message.contains("open for arbitrary requests"));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    send_text(&mut client, "hello").await;
    assert_eq!(recv_text(&mut client).await.as_deref(), Some("hello"));
}

#[tokio::test]
async fn prefix_suffix_wrap_requests_but_not_replies() {
    let (dest_url, mut received) = start_recording_destination().await;
    let (log, _path) = start_session_log().await;
    let mut config = relay_config(
        ServerMode::ForcedUrlNoPassword {
            destination: dest_url,
        },
        "",
        log,
    );
    config.send_prefix = ">>".to_string();
    config.send_suffix = "<<".to_string();
    let addr = start_relay(config).await;

    let mut client = connect_client(addr).await;
    let (status, _) = envelope(&recv_text(&mut client).await.expect("open reply"));
    assert_eq!(status, "ok");

    send_text(&mut client, "ping").await;

    // The destination observes exactly prefix + payload + suffix.
    assert_eq!(received.recv().await.as_deref(), Some(">>ping<<"));
    // The reply reaches the client verbatim, never wrapped.
    assert_eq!(recv_text(&mut client).await.as_deref(), Some("reply"));
}

#[tokio::test]
async fn close_signal_ends_session_without_forwarding() {
    let (dest_url, mut received) = start_recording_destination().await;
    let (log, _path) = start_session_log().await;
    let addr = start_relay(relay_config(
        ServerMode::ForcedUrlNoPassword {
            destination: dest_url,
        },
        "",
        log,
    ))
    .await;

    let mut client = connect_client(addr).await;
    let (status, _) = envelope(&recv_text(&mut client).await.expect("open reply"));
    assert_eq!(status, "ok");

    send_text(&mut client, "{\"action\": \"close\"}").await;
    assert!(recv_text(&mut client).await.is_none());

    // The close signal itself is never forwarded to the destination.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received.try_recv().is_err());
}

#[tokio::test]
async fn missing_url_in_destination_request() {
    let (log, _path) = start_session_log().await;
    let addr = start_relay(relay_config(ServerMode::OpenUrl, "", log)).await;

    let mut client = connect_client(addr).await;
    send_text(&mut client, "{\"password\": \"\"}").await;
    let (status, _) = envelope(&recv_text(&mut client).await.expect("auth reply"));
    assert_eq!(status, "ok");

    send_text(&mut client, "blah").await;
    let (status, message) = envelope(&recv_text(&mut client).await.expect("url error reply"));
    assert_eq!(status, "error");
    assert!(message.contains("Url not provided in [blah]"));
    assert!(recv_text(&mut client).await.is_none());
}

#[tokio::test]
async fn secure_scheme_rejected_before_any_dial() {
    let (log, _path) = start_session_log().await;
    let addr = start_relay(relay_config(ServerMode::OpenUrl, "", log)).await;

    let mut client = connect_client(addr).await;
    send_text(&mut client, "{\"password\": \"\"}").await;
    let (status, _) = envelope(&recv_text(&mut client).await.expect("auth reply"));
    assert_eq!(status, "ok");

    send_text(&mut client, "{\"url\": \"wss://127.0.0.1:9/echo\"}").await;
    let (status, message) = envelope(&recv_text(&mut client).await.expect("scheme reply"));
    assert_eq!(status, "error");
    assert!(message.contains("secure scheme 'wss'"));
    assert!(recv_text(&mut client).await.is_none());
}

#[tokio::test]
async fn unrecognized_scheme_rejected_before_any_dial() {
    let (log, _path) = start_session_log().await;
    let addr = start_relay(relay_config(ServerMode::OpenUrl, "", log)).await;

    let mut client = connect_client(addr).await;
    send_text(&mut client, "{\"password\": \"\"}").await;
    let (status, _) = envelope(&recv_text(&mut client).await.expect("auth reply"));
    assert_eq!(status, "ok");

    send_text(&mut client, "{\"url\": \"http://127.0.0.1:9/echo\"}").await;
    let (status, message) = envelope(&recv_text(&mut client).await.expect("scheme reply"));
    assert_eq!(status, "error");
    assert!(message.contains("unrecognized scheme 'http'"));
}

#[tokio::test]
async fn connect_refused_reported_to_client() {
    // Grab a loopback port with nothing listening on it.
    let dead = TcpListener::bind("127.0.0.1:0").await.expect("bind dead port");
    let dead_addr = dead.local_addr().expect("dead addr");
    drop(dead);

    let (log, _path) = start_session_log().await;
    let addr = start_relay(relay_config(ServerMode::OpenUrl, "", log)).await;

    let mut client = connect_client(addr).await;
    send_text(&mut client, "{\"password\": \"\"}").await;
    let (status, _) = envelope(&recv_text(&mut client).await.expect("auth reply"));
    assert_eq!(status, "ok");

    send_text(&mut client, &format!("{{\"url\": \"ws://{dead_addr}\"}}")).await;
    let (status, message) = envelope(&recv_text(&mut client).await.expect("connect error reply"));
    assert_eq!(status, "error");
    assert!(message.contains(&format!(
        "Unable to establish connection with proxied url [ws://{dead_addr}]"
    )));
    assert!(recv_text(&mut client).await.is_none());
}

#[tokio::test]
async fn session_log_records_lifecycle() {
    let (log, path) = start_session_log().await;
    let addr = start_relay(relay_config(ServerMode::OpenUrl, "gogol", log)).await;

    let mut client = connect_client(addr).await;
    send_text(&mut client, "{\"password\": \"nope\"}").await;
    let (status, _) = envelope(&recv_text(&mut client).await.expect("rejection reply"));
    assert_eq!(status, "error");
    assert!(recv_text(&mut client).await.is_none());

    // Give the background writer a moment to drain the channel.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let contents = std::fs::read_to_string(&path).expect("read session log");
    assert!(contents.contains("\"session_opened\""));
    assert!(contents.contains("\"auth_rejected\""));
    assert!(contents.contains("\"session_closed\""));

    std::fs::remove_file(&path).ok();
}
