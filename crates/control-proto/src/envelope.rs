use serde::{Deserialize, Serialize};

/// Status discriminator of a relay-to-client envelope. Consumers match on
/// this field only; the envelope is not versioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// The JSON `{status, message}` structure used for all relay-to-client
/// signaling: authentication results, destination errors, quota rejection,
/// and peer-closed notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub status: Status,
    pub message: String,
}

impl StatusEnvelope {
    /// An `"ok"` envelope carrying `message`.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
        }
    }

    /// An `"error"` envelope carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }

    /// Serialize to the wire form sent verbatim over the inbound channel.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "status": self.status,
            "message": self.message,
        })
        .to_string()
    }
}
