use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted guestbook submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Entry {
    pub id: i64,
    pub name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Sanitized submission produced by the validator, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub name: String,
    pub message: String,
}

/// Queue payload describing a newly created entry.
///
/// Field names mirror `Entry`'s serialized form exactly, so the wire shape is
/// `{id, name, message, created_at}`. Unknown fields are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NotificationEvent {
    #[serde(rename = "id")]
    pub entry_id: i64,
    pub name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Entry> for NotificationEvent {
    fn from(entry: &Entry) -> Self {
        Self {
            entry_id: entry.id,
            name: entry.name.clone(),
            message: entry.message.clone(),
            created_at: entry.created_at,
        }
    }
}

impl NotificationEvent {
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }
}
