use serde::{Deserialize, Serialize};

/// A single session-log entry describing one relay lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub kind: SessionEventKind,
    pub source: EventSource,
    pub details: serde_json::Value,
}

impl SessionEvent {
    /// Create a new event with an auto-generated UUID v4 and the current UTC
    /// timestamp. The caller supplies the kind, source, and free-form
    /// details JSON value.
    pub fn new(kind: SessionEventKind, source: EventSource, details: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            kind,
            source,
            details,
        }
    }
}

/// The category of relay event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    ServerStarted,
    ServerStopped,
    SessionOpened,
    SessionClosed,
    AuthSucceeded,
    AuthRejected,
    DestinationResolved,
    DestinationRejected,
    UpstreamConnected,
    UpstreamConnectFailed,
    QuotaExceeded,
}

/// Identifies which component and connection an event came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl EventSource {
    /// Convenience constructor that only requires the component name. The
    /// per-connection fields default to `None`.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            remote_addr: None,
            session_id: None,
        }
    }
}
