use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

/// Errors surfaced by [`Channel`] operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer has closed the connection. An expected terminal condition,
    /// not a fault.
    #[error("channel closed by peer")]
    Closed,

    /// The underlying transport failed.
    #[error("websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// A bidirectional, message-oriented channel over an established WebSocket
/// stream.
///
/// Two instances exist per relay session: the inbound (client-facing)
/// channel and the outbound (destination-facing) channel. The relay only
/// speaks text frames; binary, ping, and pong frames are skipped on receive
/// and ping/pong is answered by the protocol layer underneath.
pub struct Channel<S> {
    ws: WebSocketStream<S>,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }

    /// Send one text message.
    ///
    /// Sending to a peer that has already closed surfaces as
    /// [`ChannelError::Closed`].
    pub async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| match err {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    ChannelError::Closed
                }
                other => ChannelError::Transport(other),
            })
    }

    /// Receive the next text message, blocking until one arrives.
    ///
    /// Returns `Ok(None)` once the peer has closed; a client dropping the
    /// connection unblocks a pending `recv` the same way.
    pub async fn recv(&mut self) -> Result<Option<String>, ChannelError> {
        loop {
            match self.ws.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                )) => return Ok(None),
                Some(Err(err)) => return Err(ChannelError::Transport(err)),
            }
        }
    }

    /// Initiate a graceful close handshake. Closing an already-closed
    /// channel is a no-op.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        match self.ws.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(ChannelError::Transport(err)),
        }
    }
}
