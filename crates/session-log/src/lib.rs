//! Append-only structured JSON-lines session logging for the ws-relay
//! server.
//!
//! Every relay session produces a handful of lifecycle events (opened,
//! authenticated or rejected, destination resolved, quota exceeded, closed,
//! ...). Each event is serialised as a single newline-terminated JSON object
//! and appended to a log file, producing a
//! [JSON Lines](https://jsonlines.org/) stream that is easy to ship, parse,
//! and replay.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use session_log::{EventSource, SessionEvent, SessionEventKind, SessionLog};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (log, _handle) = SessionLog::start("/var/log/ws-relay/sessions.jsonl").await?;
//!
//! log.log(SessionEvent::new(
//!     SessionEventKind::ServerStarted,
//!     EventSource::new("ws-relayd"),
//!     serde_json::json!({"version": "0.1.0"}),
//! ))
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use entry::{EventSource, SessionEvent, SessionEventKind};
pub use sink::SessionLog;
pub use writer::{EventWriter, SessionLogError};
