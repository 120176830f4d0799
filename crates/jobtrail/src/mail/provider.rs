//! Provider seam: everything the sync engine needs from a mailbox, shaped
//! after the Gmail REST API since that is the production backend. Tests
//! implement the trait directly with in-memory fixtures.

use async_trait::async_trait;
use serde::Deserialize;

use super::error::Result;

/// Messages added since a checkpoint, plus the new checkpoint to persist.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub ids: Vec<String>,
    pub checkpoint: Option<String>,
}

/// A full message as the provider returns it: identifiers plus a MIME-like
/// part tree with base64url-encoded bodies.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMessage {
    pub id: String,
    pub history_id: Option<String>,
    /// Provider-assigned receive time, epoch milliseconds as a string.
    pub internal_date: Option<String>,
    pub payload: Option<MessagePart>,
}

impl RawMessage {
    pub fn internal_date_ms(&self) -> i64 {
        self.internal_date
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePart {
    pub mime_type: String,
    pub headers: Vec<Header>,
    pub body: Option<PartBody>,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartBody {
    /// Base64url-encoded content, usually unpadded.
    pub data: Option<String>,
    pub size: i64,
}

#[async_trait]
pub trait MailboxProvider: Send + Sync {
    /// Runs a full-text query over the mailbox and returns matching
    /// message ids, newest first, up to `max_results`.
    async fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>>;

    /// Fetches one full message.
    async fn get_message(&self, id: &str) -> Result<RawMessage>;

    /// Messages added since the given checkpoint.
    async fn changes_since(&self, checkpoint: &str) -> Result<ChangeSet>;

    /// The provider's newest checkpoint, persisted after every run so the
    /// next one can fetch incrementally.
    async fn latest_checkpoint(&self) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_message_deserializes_from_provider_json() {
        let json = r#"{
            "id": "m1",
            "historyId": "4711",
            "internalDate": "1714000000000",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "Subject", "value": "Hello"}],
                "parts": [
                    {"mimeType": "text/plain", "body": {"data": "aGk", "size": 2}}
                ]
            }
        }"#;
        let message: RawMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.internal_date_ms(), 1714000000000);
        let payload = message.payload.unwrap();
        assert_eq!(payload.parts.len(), 1);
        assert_eq!(payload.headers[0].name, "Subject");
    }

    #[test]
    fn missing_internal_date_defaults_to_zero() {
        let message = RawMessage::default();
        assert_eq!(message.internal_date_ms(), 0);
    }
}
