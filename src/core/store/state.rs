use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::completion::ModelSelection;
use crate::core::session::conversation::Conversation;
use crate::core::session::usage::UsageCounter;

pub const DEFAULT_THEME: &str = "dark";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// The whole client state. Replaced as a unit on every dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StoreState {
    pub ui: UiSlice,
    pub chat: ChatSlice,
    pub api: ApiSlice,
    pub system: SystemSlice,
    pub settings: SettingsSlice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSlice {
    pub theme: String,
    pub sidebar_open: bool,
    pub status: Option<String>,
}

impl Default for UiSlice {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
            sidebar_open: true,
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            updated_at: conversation.updated_at,
            message_count: conversation.messages.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChatSlice {
    pub active_conversation_id: Option<String>,
    pub conversations: Vec<ConversationSummary>,
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ApiSlice {
    pub active_model: Option<ModelSelection>,
    /// Provider whose stored credential is in use; the key itself never enters the state.
    pub api_key_provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSlice {
    pub online: bool,
    pub usage: Option<UsageCounter>,
}

impl Default for SystemSlice {
    fn default() -> Self {
        Self {
            online: true,
            usage: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPrompt {
    pub id: String,
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSlice {
    pub temperature: f32,
    pub max_tokens: u32,
    pub memory_enabled: bool,
    pub web_search: bool,
    pub system_prompts: Vec<SystemPrompt>,
    pub active_system_prompt_id: Option<String>,
}

impl Default for SettingsSlice {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            memory_enabled: true,
            web_search: false,
            system_prompts: Vec::new(),
            active_system_prompt_id: None,
        }
    }
}

impl SettingsSlice {
    pub fn active_system_prompt(&self) -> Option<&SystemPrompt> {
        let id = self.active_system_prompt_id.as_deref()?;
        self.system_prompts.iter().find(|p| p.id == id)
    }
}
