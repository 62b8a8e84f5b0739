use serde_json::Value;

/// Extract a string field from arbitrary JSON text. Malformed JSON or a
/// missing/non-string field collapses to `None`.
fn string_field(text: &str, key: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get(key)?.as_str().map(str::to_string)
}

/// Parse a credentials message, expecting `{"password": "..."}`.
pub fn password_from(text: &str) -> Option<String> {
    string_field(text, "password")
}

/// Parse a destination request, expecting `{"url": "ws://host:port/path"}`.
pub fn destination_url(text: &str) -> Option<String> {
    string_field(text, "url")
}

/// Returns true iff `text` is the session close signal `{"action": "close"}`.
pub fn is_close_signal(text: &str) -> bool {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value.get("action").and_then(Value::as_str) == Some("close"),
        Err(_) => false,
    }
}
