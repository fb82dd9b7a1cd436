use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Selects which subsystem handles an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    File,
    HistoryRequest,
    #[serde(other)]
    Unknown,
}

/// What the sender wants done. `Download` is answered to the sender alone,
/// everything else is broadcast. Envelopes without an event default to `Send`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEvent {
    #[default]
    Send,
    Edit,
    Delete,
    Star,
    Download,
    /// Any event this build does not know; stores decide what to do with it.
    #[serde(other)]
    Other,
}

impl MessageEvent {
    pub fn is_direct_reply(self) -> bool {
        matches!(self, MessageEvent::Download)
    }
}

/// File body attached to an inbound `File`/`Send` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBody {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A decoded envelope as it arrives from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub kind: MessageKind,
    #[serde(default)]
    pub event: MessageEvent,
    pub sender_id: Identifier,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Target of edit/delete/star/download.
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub file: Option<FileBody>,
}

impl InboundMessage {
    pub fn new(kind: MessageKind, event: MessageEvent, sender_id: impl Into<Identifier>) -> Self {
        Self {
            kind,
            event,
            sender_id: sender_id.into(),
            thread_id: None,
            message_id: None,
            reply_to: None,
            content: String::new(),
            file: None,
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_file(mut self, file: FileBody) -> Self {
        self.file = Some(file);
        self
    }
}

/// A chat message as held by the chat store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub thread_id: String,
    pub sender_id: Identifier,
    pub content: String,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub starred: bool,
    /// Tombstone for deleted messages
    #[serde(default)]
    pub deleted: bool,
    /// Event that produced this revision.
    pub event: MessageEvent,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
}

/// File metadata as held by the file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub sender_id: Identifier,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub content_hash: String,
    pub event: MessageEvent,
    pub created_at: DateTime<Utc>,
    /// Only populated on download replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

/// Canonical record returned by a store after a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredMessage {
    Chat(ChatMessage),
    File(FileMessage),
}

impl StoredMessage {
    pub fn id(&self) -> &str {
        match self {
            StoredMessage::Chat(m) => &m.id,
            StoredMessage::File(m) => &m.id,
        }
    }

    pub fn event(&self) -> MessageEvent {
        match self {
            StoredMessage::Chat(m) => m.event,
            StoredMessage::File(m) => m.event,
        }
    }
}

/// An ordered conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl ChatThread {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn find(&self, message_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn find_mut(&mut self, message_id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }
}

/// Reply to a `HistoryRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryReply {
    pub kind: MessageKind,
    pub threads: Vec<ChatThread>,
}

impl HistoryReply {
    pub fn new(threads: Vec<ChatThread>) -> Self {
        Self {
            kind: MessageKind::HistoryRequest,
            threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognized_kind_decodes_as_unknown() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"kind":"whiteboard","event":"send","sender_id":"4"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert_eq!(msg.sender_id.as_str(), "4");
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_missing_or_unlisted_event() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"kind":"history_request","sender_id":"7"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::HistoryRequest);
        assert_eq!(msg.event, MessageEvent::Send);

        let msg: InboundMessage =
            serde_json::from_str(r#"{"kind":"chat","event":"react","sender_id":"7"}"#).unwrap();
        assert_eq!(msg.event, MessageEvent::Other);
        assert!(!msg.event.is_direct_reply());
    }

    #[test]
    fn test_stored_message_is_tagged() {
        let msg = StoredMessage::Chat(ChatMessage {
            id: "m1".into(),
            thread_id: "t1".into(),
            sender_id: "3".into(),
            content: "hi".into(),
            reply_to: None,
            starred: false,
            deleted: false,
            event: MessageEvent::Send,
            created_at: Utc::now(),
            edited_at: None,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "chat");
        assert_eq!(value["event"], "send");
        assert_eq!(value["sender_id"], "3");
    }

    #[test]
    fn test_only_download_is_direct() {
        assert!(MessageEvent::Download.is_direct_reply());
        assert!(!MessageEvent::Send.is_direct_reply());
        assert!(!MessageEvent::Star.is_direct_reply());
    }
}
