use anyhow::Result;
use control_proto::StatusEnvelope;
use session_log::{SessionEvent, SessionEventKind};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::channel::{Channel, ChannelError};
use crate::dest;
use crate::listener::{event_source, RelayConfig};
use crate::session::{CloseReason, ServerMode, Session, SessionContext};

/// Envelope text sent when the destination side of an established session
/// has gone away. A closed peer is an expected terminal condition, so this
/// travels in an `"ok"` envelope rather than an `"error"` one.
const UPSTREAM_CLOSED: &str = "Proxied connection closed.";

/// Check client credentials against the configured password.
///
/// Credentials are expected as `{"password": "..."}`. Text that does not
/// parse to that shape fails authentication; it is not an error. An empty
/// configured password still requires the client to send an empty password
/// field; the only bypass is [`ServerMode::ForcedUrlNoPassword`], which
/// skips this gate entirely.
pub fn authenticate(credentials_text: &str, expected_password: &str) -> bool {
    match control_proto::password_from(credentials_text) {
        Some(password) => password == expected_password,
        None => false,
    }
}

/// The directions message sent to a client right after it authenticates,
/// telling it what the relay expects next.
pub fn post_auth_directions(mode: &ServerMode) -> &'static str {
    match mode {
        ServerMode::ForcedUrl { .. } => {
            "Authenticated. Socket open for arbitrary proxy requests."
        }
        _ => "Authenticated. Supply URL.",
    }
}

/// Run the full lifecycle of one accepted session: authentication gate,
/// destination resolution, outbound establishment, then the relay loop.
///
/// Every failure path reports to the client via a status envelope and
/// resolves to a [`CloseReason`]; none of them propagate to the accept
/// loop. The only errors surfaced here are unexpected transport failures.
pub(crate) async fn drive_session<S>(
    config: &RelayConfig,
    ctx: &SessionContext,
    client: &mut Channel<S>,
) -> Result<CloseReason>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new();

    // Authentication gate. ForcedUrlNoPassword skips it entirely.
    if config.mode.requires_authentication() {
        let credentials = match client.recv().await? {
            Some(text) => text,
            None => return Ok(CloseReason::ClientDisconnected),
        };
        tracing::debug!(
            session_id = %ctx.session_id,
            credentials = %credentials,
            "credentials received from client"
        );
        session.credentials = credentials;

        if !authenticate(&session.credentials, &config.password) {
            let message = format!(
                "Authentication failed. Password invalid [{}]",
                session.credentials
            );
            tracing::warn!(
                session_id = %ctx.session_id,
                credentials = %session.credentials,
                "client credentials rejected"
            );
            config
                .session_log
                .log(SessionEvent::new(
                    SessionEventKind::AuthRejected,
                    event_source(ctx),
                    serde_json::json!({ "credentials": session.credentials }),
                ))
                .await;
            client.send(&StatusEnvelope::error(message).to_json()).await?;
            return Ok(CloseReason::AuthRejected);
        }

        tracing::info!(session_id = %ctx.session_id, "user authenticated");
        config
            .session_log
            .log(SessionEvent::new(
                SessionEventKind::AuthSucceeded,
                event_source(ctx),
                serde_json::json!({}),
            ))
            .await;
        client
            .send(&StatusEnvelope::ok(post_auth_directions(&config.mode)).to_json())
            .await?;
    }

    // Destination resolution.
    let destination = match &config.mode {
        ServerMode::OpenUrl => {
            let raw = match client.recv().await? {
                Some(text) => text,
                None => return Ok(CloseReason::ClientDisconnected),
            };
            match control_proto::destination_url(&raw) {
                Some(url) => {
                    tracing::debug!(
                        session_id = %ctx.session_id,
                        url = %url,
                        "destination url received from client"
                    );
                    url
                }
                None => {
                    let message =
                        format!("Couldn't establish proxy. Url not provided in [{raw}]");
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        request = %raw,
                        "destination request rejected"
                    );
                    config
                        .session_log
                        .log(SessionEvent::new(
                            SessionEventKind::DestinationRejected,
                            event_source(ctx),
                            serde_json::json!({ "request": raw }),
                        ))
                        .await;
                    client.send(&StatusEnvelope::error(message).to_json()).await?;
                    return Ok(CloseReason::DestinationRejected);
                }
            }
        }
        ServerMode::ForcedUrl { destination }
        | ServerMode::ForcedUrlNoPassword { destination } => destination.clone(),
    };
    session.destination = destination;

    // Scheme gate, before any dial.
    if let Err(rejection) = dest::validate_destination(&session.destination) {
        tracing::warn!(
            session_id = %ctx.session_id,
            destination = %session.destination,
            %rejection,
            "destination refused"
        );
        config
            .session_log
            .log(SessionEvent::new(
                SessionEventKind::DestinationRejected,
                event_source(ctx),
                serde_json::json!({
                    "destination": session.destination,
                    "reason": rejection.to_string(),
                }),
            ))
            .await;
        client
            .send(&StatusEnvelope::error(rejection.to_string()).to_json())
            .await?;
        return Ok(CloseReason::DestinationRejected);
    }

    config
        .session_log
        .log(SessionEvent::new(
            SessionEventKind::DestinationResolved,
            event_source(ctx),
            serde_json::json!({ "destination": session.destination }),
        ))
        .await;

    // Outbound establishment. A refused connection terminates the session
    // cleanly; nothing propagates to the accept loop.
    let upstream_ws = match tokio_tungstenite::connect_async(session.destination.as_str()).await
    {
        Ok((ws, _response)) => ws,
        Err(err) => {
            let message = format!(
                "Unable to establish connection with proxied url [{}]. Connection closed.",
                session.destination
            );
            tracing::warn!(
                session_id = %ctx.session_id,
                destination = %session.destination,
                %err,
                "outbound connection failed"
            );
            config
                .session_log
                .log(SessionEvent::new(
                    SessionEventKind::UpstreamConnectFailed,
                    event_source(ctx),
                    serde_json::json!({
                        "destination": session.destination,
                        "error": err.to_string(),
                    }),
                ))
                .await;
            client.send(&StatusEnvelope::error(message).to_json()).await?;
            return Ok(CloseReason::ConnectFailed);
        }
    };
    let mut upstream = Channel::new(upstream_ws);

    tracing::info!(
        session_id = %ctx.session_id,
        destination = %session.destination,
        "proxied connection established"
    );
    config
        .session_log
        .log(SessionEvent::new(
            SessionEventKind::UpstreamConnected,
            event_source(ctx),
            serde_json::json!({ "destination": session.destination }),
        ))
        .await;
    client
        .send(
            &StatusEnvelope::ok(format!(
                "Proxied connection [{}] open for arbitrary requests.",
                session.destination
            ))
            .to_json(),
        )
        .await?;

    relay_loop(config, ctx, client, &mut upstream, &mut session).await
}

/// The steady state of an established session: strictly request/response
/// paired forwarding.
///
/// The quota check runs after a request is forwarded and before its reply is
/// awaited, so the quota bounds the number of forwarded requests, not
/// replies. Replies are relayed verbatim; the configured prefix/suffix apply
/// to requests only.
async fn relay_loop<C, U>(
    config: &RelayConfig,
    ctx: &SessionContext,
    client: &mut Channel<C>,
    upstream: &mut Channel<U>,
    session: &mut Session,
) -> Result<CloseReason>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let request = match client.recv().await? {
            Some(text) => text,
            None => return Ok(CloseReason::ClientDisconnected),
        };

        if control_proto::is_close_signal(&request) {
            tracing::info!(session_id = %ctx.session_id, "close signal received from client");
            return Ok(CloseReason::ClientClosed);
        }

        let effective = format!("{}{}{}", config.send_prefix, request, config.send_suffix);

        match upstream.send(&effective).await {
            Ok(()) => {}
            Err(ChannelError::Closed) => {
                client.send(&StatusEnvelope::ok(UPSTREAM_CLOSED).to_json()).await?;
                return Ok(CloseReason::UpstreamClosed);
            }
            Err(err) => return Err(err.into()),
        }

        session.message_count += 1;

        if session.message_count > config.max_messages_per_session {
            let message = format!(
                "Unable to proxy request, connection exceeds config limit of [{}] requests per connection.",
                config.max_messages_per_session
            );
            tracing::warn!(
                session_id = %ctx.session_id,
                limit = config.max_messages_per_session,
                "session message quota exceeded"
            );
            config
                .session_log
                .log(SessionEvent::new(
                    SessionEventKind::QuotaExceeded,
                    event_source(ctx),
                    serde_json::json!({ "limit": config.max_messages_per_session }),
                ))
                .await;
            client.send(&StatusEnvelope::error(message).to_json()).await?;
            return Ok(CloseReason::QuotaExceeded);
        }

        tracing::debug!(
            session_id = %ctx.session_id,
            count = session.message_count,
            "request forwarded to destination"
        );

        let reply = match upstream.recv().await? {
            Some(text) => text,
            None => {
                client.send(&StatusEnvelope::ok(UPSTREAM_CLOSED).to_json()).await?;
                return Ok(CloseReason::UpstreamClosed);
            }
        };

        client.send(&reply).await?;
        tracing::debug!(session_id = %ctx.session_id, "response relayed to client");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_with_matching_credentials() {
        assert!(authenticate("{\"password\": \"test\"}", "test"));
    }

    #[test]
    fn authenticate_with_non_matching_credentials() {
        assert!(!authenticate("{\"password\": \"test\"}", "something else"));
    }

    #[test]
    fn authenticate_with_bad_json() {
        assert!(!authenticate("&\"password\": \"test\"}", "test"));
    }

    #[test]
    fn authenticate_without_password_key() {
        assert!(!authenticate("{}", "test"));
        assert!(!authenticate("{\"user\": \"test\"}", "test"));
    }

    #[test]
    fn empty_configured_password_still_requires_the_field() {
        assert!(authenticate("{\"password\": \"\"}", ""));
        assert!(!authenticate("{}", ""));
        assert!(!authenticate("not json", ""));
    }

    #[test]
    fn directions_by_mode() {
        assert_eq!(
            post_auth_directions(&ServerMode::OpenUrl),
            "Authenticated. Supply URL."
        );
        assert_eq!(
            post_auth_directions(&ServerMode::ForcedUrl {
                destination: "ws://localhost:8081".to_string()
            }),
            "Authenticated. Socket open for arbitrary proxy requests."
        );
    }
}
