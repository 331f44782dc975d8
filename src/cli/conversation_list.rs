use std::error::Error;
use std::rc::Rc;

use crate::core::config::Config;
use crate::core::session::conversation::Conversation;
use crate::core::session::ChatSessionManager;
use crate::core::storage::{FileBlobStore, FileKeyValueStore};

pub fn list_conversations(config: &Config) -> Result<(), Box<dyn Error>> {
    let data_dir = config.data_dir()?;
    let storage = Rc::new(FileKeyValueStore::open(data_dir.join("state.json"))?);
    let blobs = Rc::new(FileBlobStore::open(data_dir.join("attachments"))?);
    let session = ChatSessionManager::load(storage, blobs, config.usage_limits());

    let conversations = session.conversations();
    if conversations.is_empty() {
        println!("No conversations yet. Start one with 'chatdesk chat'.");
        return Ok(());
    }

    println!("💬 Conversations");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for conversation in conversations {
        let active = session.active_id() == Some(conversation.id.as_str());
        println!("{}", conversation_line(conversation, active));
    }
    Ok(())
}

fn conversation_line(conversation: &Conversation, active: bool) -> String {
    let marker = if active { '*' } else { ' ' };
    let model = conversation
        .model
        .as_ref()
        .map(|m| format!("  [{} {}]", m.provider, m.model))
        .unwrap_or_default();
    format!(
        "{marker} {}  {}  {} messages, updated {}{model}",
        conversation.id,
        conversation.title,
        conversation.messages.len(),
        conversation.updated_at.format("%Y-%m-%d %H:%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::conversation::ModelDescriptor;
    use chrono::{TimeZone, Utc};

    #[test]
    fn line_shows_marker_model_and_count() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 0).unwrap();
        let mut conversation = Conversation::new(
            "abc".into(),
            Some(ModelDescriptor {
                provider: "openai".into(),
                model: "gpt-4o-mini".into(),
            }),
            now,
        );
        conversation.title = "Trip plans".into();

        assert_eq!(
            conversation_line(&conversation, true),
            "* abc  Trip plans  0 messages, updated 2026-03-09 14:05  [openai gpt-4o-mini]"
        );
        conversation.model = None;
        assert!(conversation_line(&conversation, false).starts_with("  abc"));
    }
}
