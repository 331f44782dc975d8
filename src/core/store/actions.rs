use serde::{Deserialize, Serialize};

use super::state::{ConversationSummary, StoreState, SystemPrompt};
use crate::core::completion::ModelSelection;
use crate::core::error::{ChatError, ChatResult};
use crate::core::session::usage::UsageCounter;

/// Every state mutation, as a named action with its payload.
///
/// The serialized form is `{"type": <name>, "payload": <value>}`, which is
/// how [`super::Store::dispatch_named`] decodes dynamic dispatches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreAction {
    SetTheme(String),
    SetSidebarOpen(bool),
    SetStatus(String),
    ClearStatus,
    SetActiveConversation(Option<String>),
    SetConversations(Vec<ConversationSummary>),
    SetStreaming(bool),
    SetActiveModel(Option<ModelSelection>),
    SetApiKeyProvider(Option<String>),
    SetOnline(bool),
    SetUsage(UsageCounter),
    SetTemperature(f32),
    SetMaxTokens(u32),
    SetMemoryEnabled(bool),
    SetWebSearch(bool),
    UpsertSystemPrompt(SystemPrompt),
    DeleteSystemPrompt(String),
    SetActiveSystemPrompt(Option<String>),
}

impl StoreAction {
    pub fn name(&self) -> &'static str {
        match self {
            StoreAction::SetTheme(_) => "set_theme",
            StoreAction::SetSidebarOpen(_) => "set_sidebar_open",
            StoreAction::SetStatus(_) => "set_status",
            StoreAction::ClearStatus => "clear_status",
            StoreAction::SetActiveConversation(_) => "set_active_conversation",
            StoreAction::SetConversations(_) => "set_conversations",
            StoreAction::SetStreaming(_) => "set_streaming",
            StoreAction::SetActiveModel(_) => "set_active_model",
            StoreAction::SetApiKeyProvider(_) => "set_api_key_provider",
            StoreAction::SetOnline(_) => "set_online",
            StoreAction::SetUsage(_) => "set_usage",
            StoreAction::SetTemperature(_) => "set_temperature",
            StoreAction::SetMaxTokens(_) => "set_max_tokens",
            StoreAction::SetMemoryEnabled(_) => "set_memory_enabled",
            StoreAction::SetWebSearch(_) => "set_web_search",
            StoreAction::UpsertSystemPrompt(_) => "upsert_system_prompt",
            StoreAction::DeleteSystemPrompt(_) => "delete_system_prompt",
            StoreAction::SetActiveSystemPrompt(_) => "set_active_system_prompt",
        }
    }
}

/// Pure reducer: returns the next snapshot or an error, never a partial write.
pub fn reduce(state: &StoreState, action: &StoreAction) -> ChatResult<StoreState> {
    let mut next = state.clone();
    match action {
        StoreAction::SetTheme(theme) => {
            let theme = theme.trim();
            if theme.is_empty() {
                return Err(ChatError::InvalidValue {
                    field: "theme",
                    reason: "theme name is empty".to_string(),
                });
            }
            next.ui.theme = theme.to_string();
        }
        StoreAction::SetSidebarOpen(open) => next.ui.sidebar_open = *open,
        StoreAction::SetStatus(message) => next.ui.status = Some(message.clone()),
        StoreAction::ClearStatus => next.ui.status = None,
        StoreAction::SetActiveConversation(id) => next.chat.active_conversation_id = id.clone(),
        StoreAction::SetConversations(summaries) => next.chat.conversations = summaries.clone(),
        StoreAction::SetStreaming(streaming) => next.chat.streaming = *streaming,
        StoreAction::SetActiveModel(selection) => next.api.active_model = selection.clone(),
        StoreAction::SetApiKeyProvider(provider) => next.api.api_key_provider = provider.clone(),
        StoreAction::SetOnline(online) => next.system.online = *online,
        StoreAction::SetUsage(usage) => next.system.usage = Some(usage.clone()),
        StoreAction::SetTemperature(temperature) => {
            if !(0.0..=2.0).contains(temperature) {
                return Err(ChatError::InvalidValue {
                    field: "temperature",
                    reason: format!("{temperature} is outside 0.0..=2.0"),
                });
            }
            next.settings.temperature = *temperature;
        }
        StoreAction::SetMaxTokens(max_tokens) => {
            if *max_tokens == 0 {
                return Err(ChatError::InvalidValue {
                    field: "max_tokens",
                    reason: "must be greater than zero".to_string(),
                });
            }
            next.settings.max_tokens = *max_tokens;
        }
        StoreAction::SetMemoryEnabled(enabled) => next.settings.memory_enabled = *enabled,
        StoreAction::SetWebSearch(enabled) => next.settings.web_search = *enabled,
        StoreAction::UpsertSystemPrompt(prompt) => {
            let prompts = &mut next.settings.system_prompts;
            match prompts.iter_mut().find(|p| p.id == prompt.id) {
                Some(existing) => *existing = prompt.clone(),
                None => prompts.push(prompt.clone()),
            }
        }
        StoreAction::DeleteSystemPrompt(id) => {
            let before = next.settings.system_prompts.len();
            next.settings.system_prompts.retain(|p| &p.id != id);
            if next.settings.system_prompts.len() == before {
                return Err(ChatError::not_found("system prompt", id.clone()));
            }
            if next.settings.active_system_prompt_id.as_ref() == Some(id) {
                next.settings.active_system_prompt_id = None;
            }
        }
        StoreAction::SetActiveSystemPrompt(id) => {
            if let Some(id) = id {
                if !next.settings.system_prompts.iter().any(|p| &p.id == id) {
                    return Err(ChatError::not_found("system prompt", id.clone()));
                }
            }
            next.settings.active_system_prompt_id = id.clone();
        }
    }
    Ok(next)
}
