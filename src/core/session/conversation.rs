use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TITLE_MAX_CHARS: usize = 30;
pub const DEFAULT_TITLE: &str = "New chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

/// Provider and model captured when a conversation is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub provider: String,
    pub model: String,
}

/// Lightweight pointer to an attachment held by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
}

/// Attachment record as kept by the blob store. `data` is base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub data: String,
}

impl Attachment {
    pub fn reference(&self) -> AttachmentRef {
        AttachmentRef {
            id: self.id.clone(),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
        }
    }
}

/// A file supplied with a message before it has been stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// What the user (or the completion) hands to the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageInput {
    pub text: String,
    pub attachments: Vec<AttachmentUpload>,
}

impl MessageInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, upload: AttachmentUpload) -> Self {
        self.attachments.push(upload);
        self
    }
}

impl From<&str> for MessageInput {
    fn from(text: &str) -> Self {
        MessageInput::text(text)
    }
}

impl From<String> for MessageInput {
    fn from(text: String) -> Self {
        MessageInput::text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    WithAttachments {
        text: String,
        attachments: Vec<AttachmentRef>,
    },
}

impl MessageContent {
    pub fn text(&self) -> &str {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::WithAttachments { text, .. } => text,
        }
    }

    pub fn attachments(&self) -> &[AttachmentRef] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::WithAttachments { attachments, .. } => attachments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn text(&self) -> &str {
        self.content.text()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub model: Option<ModelDescriptor>,
}

impl Conversation {
    pub fn new(id: String, model: Option<ModelDescriptor>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            model,
        }
    }

    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role.is_user())
    }

    pub fn attachment_ids(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .flat_map(|m| m.content.attachments())
            .map(|a| a.id.as_str())
    }

    /// Moves `updated_at` forward, never backward.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Title from the first user message: its first 30 characters, then "…"
/// when cut. A blank message keeps the default title.
pub fn derive_title(text: &str) -> String {
    if text.trim().is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_first_message_is_truncated_with_ellipsis() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHI";
        assert_eq!(text.chars().count(), 45);
        let title = derive_title(text);
        assert_eq!(title, format!("{}…", &text[..30]));
    }

    #[test]
    fn short_first_message_is_kept() {
        let text = "twenty characters!!!";
        assert_eq!(text.chars().count(), 20);
        assert_eq!(derive_title(text), text);
    }

    #[test]
    fn exactly_thirty_characters_has_no_ellipsis() {
        let text = "a".repeat(30);
        assert_eq!(derive_title(&text), text);
    }

    #[test]
    fn title_takes_the_text_as_written() {
        let text = format!("  {}", "b".repeat(29));
        assert_eq!(derive_title(&text), format!("  {}…", "b".repeat(28)));
        assert_eq!(derive_title(" \n "), DEFAULT_TITLE);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(31);
        let title = derive_title(&text);
        assert_eq!(title.chars().count(), 31);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn content_serializes_as_plain_string_or_structured_payload() {
        let plain = MessageContent::Text("hi".into());
        assert_eq!(serde_json::to_string(&plain).unwrap(), "\"hi\"");

        let structured = MessageContent::WithAttachments {
            text: "see file".into(),
            attachments: vec![AttachmentRef {
                id: "a1".into(),
                name: "f.txt".into(),
                mime_type: "text/plain".into(),
                size: 3,
            }],
        };
        let json = serde_json::to_value(&structured).unwrap();
        assert_eq!(json["attachments"][0]["type"], "text/plain");
        let back: MessageContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, structured);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let now = Utc::now();
        let mut conversation = Conversation::new("c".into(), None, now);
        conversation.touch(now - chrono::Duration::seconds(10));
        assert_eq!(conversation.updated_at, now);
    }
}
