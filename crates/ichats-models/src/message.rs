use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Whether messages of this kind carry an attachment and its metadata.
    pub fn has_attachment(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

/// A persisted direct message as it travels over the wire (`receiveMessage`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(with = "string_id")]
    pub id: i64,
    pub sender_id: String,
    pub sender_username: String,
    pub recipient_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub delivered: bool,
    pub read: bool,
}

/// A message that has been accepted for persistence but has no id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_username: String,
    pub recipient_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub delivered: bool,
}

impl NewMessage {
    pub fn into_message(self, id: i64) -> Message {
        Message {
            id,
            sender_id: self.sender_id,
            sender_username: self.sender_username,
            recipient_id: self.recipient_id,
            content: self.content,
            kind: self.kind,
            file_name: self.file_name,
            file_type: self.file_type,
            file_size: self.file_size,
            timestamp: self.timestamp,
            delivered: self.delivered,
            read: false,
        }
    }
}

/// Snowflake ids exceed the integer range JavaScript clients can represent,
/// so they are always written as strings. Both forms are accepted on input.
pub mod string_id {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(i64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(n),
            Raw::Str(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}
