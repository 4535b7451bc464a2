//! Core note record.
//!
//! Timestamps are held as [`DateTime<Utc>`] in memory and written as
//! epoch-millisecond integers everywhere they are serialized.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{extract_text, now_millis, truncate_preview, Document};

/// Title given to notes created without one.
pub const DEFAULT_TITLE: &str = "New Note";

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier for the note
    #[serde(default)]
    pub id: String,
    /// Note title, opaque to the core (may carry editor markup)
    #[serde(default)]
    pub title: String,
    /// Rich-text body
    #[serde(default)]
    pub content: Document,
    /// Free-form labels
    #[serde(default)]
    pub labels: Vec<String>,
    /// When the note was created
    #[serde(with = "epoch_millis", default = "epoch_millis::unix_epoch")]
    pub created_at: DateTime<Utc>,
    /// Last title, content or label modification
    #[serde(with = "epoch_millis", default = "epoch_millis::unix_epoch")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_bookmarked: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_locked: bool,
    /// Where the editor cursor was last; advisory only
    #[serde(default)]
    pub last_cursor_position: i64,
}

impl Note {
    /// Creates an empty note with a fresh id.
    pub fn new(title: Option<&str>) -> Self {
        let now = now_millis();
        let title = match title.map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => DEFAULT_TITLE.to_string(),
        };

        Note {
            id: Uuid::new_v4().to_string(),
            title,
            content: Document::empty(),
            labels: Vec::new(),
            created_at: now,
            updated_at: now,
            is_bookmarked: false,
            is_archived: false,
            is_locked: false,
            last_cursor_position: 0,
        }
    }

    /// Refreshes `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn plain_text(&self) -> String {
        extract_text(&self.content)
    }

    pub fn preview(&self, max_len: usize) -> String {
        truncate_preview(&self.content, max_len)
    }
}

/// Serde adapter writing instants as epoch milliseconds.
///
/// Reading is lenient: integers, floats, numeric strings and RFC 3339
/// strings are accepted; anything else becomes the Unix epoch.
pub mod epoch_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        instant: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(instant.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(from_value(&value))
    }

    pub fn unix_epoch() -> DateTime<Utc> {
        DateTime::UNIX_EPOCH
    }

    pub fn from_millis(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
    }

    fn from_value(value: &Value) -> DateTime<Utc> {
        match value {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f as i64))
                .map(from_millis)
                .unwrap_or(DateTime::UNIX_EPOCH),
            Value::String(text) => text
                .parse::<i64>()
                .map(from_millis)
                .or_else(|_| {
                    DateTime::parse_from_rfc3339(text).map(|instant| instant.with_timezone(&Utc))
                })
                .unwrap_or(DateTime::UNIX_EPOCH),
            _ => DateTime::UNIX_EPOCH,
        }
    }
}
