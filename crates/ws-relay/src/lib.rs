//! Authenticating single-hop WebSocket relay.
//!
//! This crate implements the relay engine: it accepts client WebSocket
//! connections, optionally authenticates them, resolves a destination URL
//! (fixed by configuration or supplied by the client), opens an outbound
//! WebSocket session to that destination, and relays request/response pairs
//! until either side closes or the per-session message quota is exceeded.
//!
//! # Architecture
//!
//! ```text
//! Client  <--WS-->  ws-relay  <--WS-->  Destination
//!                      |
//!               [auth gate]
//!               [destination resolution]
//!               [relay loop + quota]
//! ```
//!
//! All relay-to-client signaling travels as JSON `{status, message}`
//! envelopes (see the `control-proto` crate). Forwarding is strictly
//! request/response paired: the engine never issues a second outbound send
//! before the reply to the first has been relayed back, which is what the
//! quota accounting and ordering guarantees rely on.

pub mod channel;
pub mod dest;
pub mod engine;
pub mod listener;
pub mod session;

// Re-export the primary public types at the crate root for convenience.
pub use channel::{Channel, ChannelError};
pub use dest::DestinationRejection;
pub use listener::{Relay, RelayConfig};
pub use session::{CloseReason, ServerMode, Session, SessionContext};
