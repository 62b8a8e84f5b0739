//! In-band control protocol for the ws-relay server.
//!
//! The relay and its clients exchange a small set of JSON text messages over
//! the client-facing WebSocket connection, alongside the opaque payloads
//! being relayed:
//!
//! | Direction      | Message             | Shape                                  |
//! |----------------|---------------------|----------------------------------------|
//! | client → relay | credentials         | `{"password": "..."}`                  |
//! | client → relay | destination request | `{"url": "ws://..."}`                  |
//! | client → relay | session close       | `{"action": "close"}`                  |
//! | relay → client | status envelope     | `{"status": "ok"\|"error", "message"}` |
//!
//! The inbound parsers are total: text that is not valid JSON, or valid JSON
//! of the wrong shape, simply fails to parse (`None` / `false`). Consumers
//! never need to handle a decode error.

pub mod envelope;
pub mod messages;

// Re-export the primary public types at the crate root for convenience.
pub use envelope::{Status, StatusEnvelope};
pub use messages::{destination_url, is_close_signal, password_from};
