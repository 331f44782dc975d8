//! Provider registry, model selection and the streaming completion call.

pub mod openai;
pub mod provider;
pub mod sse;

use std::collections::BTreeMap;
use std::rc::Rc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::error::{ChatError, ChatResult, UsageTier};
use crate::core::storage::{keys, KeyValueStore};
pub use provider::{
    CompletionOptions, CompletionRequest, CompletionResponse, ModelCategory, ModelInfo,
    ModelSelection, Provider, ReasoningEffort, StreamCallback,
};

/// Settings read from durable storage before per-call overrides apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredCompletionSettings {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub web_search: bool,
}

pub struct CompletionClient {
    providers: BTreeMap<String, Box<dyn Provider>>,
    selection: Option<ModelSelection>,
    storage: Rc<dyn KeyValueStore>,
}

impl CompletionClient {
    pub fn new(storage: Rc<dyn KeyValueStore>) -> Self {
        Self {
            providers: BTreeMap::new(),
            selection: None,
            storage,
        }
    }

    /// Adds a provider keyed by its name, replacing any previous one.
    pub fn register_provider(&mut self, provider: Box<dyn Provider>) {
        let name = provider.name().to_string();
        debug!(provider = %name, models = provider.available_models().len(), "registered provider");
        self.providers.insert(name, provider);
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn provider(&self, name: &str) -> Option<&dyn Provider> {
        self.resolve_name(name)
            .and_then(|key| self.providers.get(key))
            .map(|p| p.as_ref())
    }

    fn resolve_name(&self, name: &str) -> Option<&String> {
        let name = name.trim();
        self.providers
            .keys()
            .find(|key| key.as_str() == name)
            .or_else(|| self.providers.keys().find(|key| key.eq_ignore_ascii_case(name)))
    }

    pub fn set_active_model(
        &mut self,
        provider_name: &str,
        model_id: &str,
        reasoning_effort: Option<ReasoningEffort>,
    ) -> ChatResult<ModelSelection> {
        let key = self
            .resolve_name(provider_name)
            .cloned()
            .ok_or_else(|| ChatError::not_found("provider", provider_name))?;
        let model_id = model_id.trim();
        let provider = &self.providers[&key];
        if !provider.supports_model(model_id) {
            return Err(ChatError::UnsupportedModel {
                provider: key,
                model: model_id.to_string(),
            });
        }

        let selection = ModelSelection {
            provider: key,
            model: model_id.to_string(),
            reasoning_effort,
        };
        let encoded = serde_json::to_string(&selection)?;
        self.storage.set(keys::MODEL_SELECTION, &encoded)?;
        self.selection = Some(selection.clone());
        Ok(selection)
    }

    /// Reloads the persisted selection if it still names a registered model.
    pub fn restore_selection(&mut self) -> Option<ModelSelection> {
        let raw = match self.storage.get(keys::MODEL_SELECTION) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("failed to read model selection: {err}");
                return None;
            }
        };
        let stored: ModelSelection = match serde_json::from_str(&raw) {
            Ok(selection) => selection,
            Err(err) => {
                warn!("ignoring unparsable model selection: {err}");
                return None;
            }
        };
        let valid = self
            .provider(&stored.provider)
            .is_some_and(|p| p.supports_model(&stored.model));
        if !valid {
            debug!(provider = %stored.provider, model = %stored.model, "stored model selection no longer available");
            return None;
        }
        self.selection = Some(stored.clone());
        Some(stored)
    }

    pub fn active_selection(&self) -> Option<&ModelSelection> {
        self.selection.as_ref()
    }

    pub fn active_model_info(&self) -> Option<ModelInfo> {
        let selection = self.selection.as_ref()?;
        self.provider(&selection.provider)?
            .model_info(&selection.model)
    }

    /// Quota bucket a send with the active model is charged against.
    pub fn active_tier(&self) -> UsageTier {
        self.active_model_info()
            .map(|info| info.category.usage_tier())
            .unwrap_or(UsageTier::Standard)
    }

    pub fn stored_settings(&self) -> StoredCompletionSettings {
        StoredCompletionSettings {
            temperature: self.read_setting(keys::TEMPERATURE),
            max_tokens: self.read_setting(keys::MAX_TOKENS),
            web_search: self.read_setting(keys::WEB_SEARCH).unwrap_or(false),
        }
    }

    fn read_setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.storage.get(key).ok().flatten()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("ignoring unparsable setting {key}: {err}");
                None
            }
        }
    }

    pub async fn send_message(
        &self,
        message: &str,
        history: Vec<ChatMessage>,
        options: CompletionOptions,
        on_update: &mut StreamCallback<'_>,
    ) -> ChatResult<CompletionResponse> {
        let selection = self.selection.as_ref().ok_or(ChatError::NoActiveModel)?;
        let provider = self
            .provider(&selection.provider)
            .ok_or_else(|| ChatError::not_found("provider", selection.provider.clone()))?;

        let stored = self.stored_settings();
        let request = CompletionRequest {
            model: selection.model.clone(),
            message: message.to_string(),
            history,
            system_prompt: options.system_prompt,
            temperature: options.temperature.or(stored.temperature),
            max_tokens: options.max_tokens.or(stored.max_tokens),
            web_search: options.web_search.unwrap_or(stored.web_search),
            reasoning_effort: selection.reasoning_effort,
            cancel_token: options.cancel_token.unwrap_or_else(CancellationToken::new),
        };

        provider.complete(request, on_update).await
    }
}
