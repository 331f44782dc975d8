use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::api::ChatMessage;
use crate::core::error::{ChatResult, UsageTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    #[default]
    Standard,
    Premium,
}

impl ModelCategory {
    pub fn usage_tier(self) -> UsageTier {
        match self {
            ModelCategory::Standard => UsageTier::Standard,
            ModelCategory::Premium => UsageTier::Premium,
        }
    }
}

/// One entry of a provider's model catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub max_tokens: u32,
    #[serde(default)]
    pub category: ModelCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

impl std::str::FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            other => Err(format!("invalid reasoning effort: {other}")),
        }
    }
}

/// The persisted provider/model choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// Per-call overrides layered on top of stored settings.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub web_search: Option<bool>,
    pub cancel_token: Option<CancellationToken>,
}

/// Fully resolved request handed to a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub message: String,
    pub history: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub web_search: bool,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub cancel_token: CancellationToken,
}

impl CompletionRequest {
    /// System prompt first, then history in order, then the current message.
    pub fn api_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(prompt) = self
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        {
            messages.push(ChatMessage::new("system", prompt));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::new("user", self.message.clone()));
        messages
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// Receives the cumulative reply text after every delta.
pub type StreamCallback<'a> = dyn for<'s> FnMut(&'s str) + 'a;

/// A named backend with a fixed model catalog and a streaming completion call.
///
/// `on_update` receives the cumulative text after every delta.
#[async_trait(?Send)]
pub trait Provider {
    fn name(&self) -> &str;

    fn available_models(&self) -> Vec<ModelInfo>;

    fn supports_model(&self, id: &str) -> bool {
        self.available_models().iter().any(|m| m.id == id)
    }

    fn model_info(&self, id: &str) -> Option<ModelInfo> {
        self.available_models().into_iter().find(|m| m.id == id)
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        on_update: &mut StreamCallback<'_>,
    ) -> ChatResult<CompletionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(system_prompt: Option<&str>) -> CompletionRequest {
        CompletionRequest {
            model: "m".into(),
            message: "current".into(),
            history: vec![
                ChatMessage::new("user", "first"),
                ChatMessage::new("assistant", "reply"),
            ],
            system_prompt: system_prompt.map(str::to_string),
            temperature: None,
            max_tokens: None,
            web_search: false,
            reasoning_effort: None,
            cancel_token: CancellationToken::new(),
        }
    }

    #[test]
    fn api_messages_put_system_prompt_first_and_current_last() {
        let roles: Vec<_> = request(Some("be brief"))
            .api_messages()
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect();
        assert_eq!(
            roles,
            vec![
                ("system".to_string(), "be brief".to_string()),
                ("user".to_string(), "first".to_string()),
                ("assistant".to_string(), "reply".to_string()),
                ("user".to_string(), "current".to_string()),
            ]
        );
    }

    #[test]
    fn blank_system_prompt_is_skipped() {
        let messages = request(Some("   ")).api_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn reasoning_effort_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<ReasoningEffort>(), Ok(ReasoningEffort::High));
        assert!("extreme".parse::<ReasoningEffort>().is_err());
    }
}
