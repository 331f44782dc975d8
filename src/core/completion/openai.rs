use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use super::provider::{
    CompletionRequest, CompletionResponse, ModelInfo, Provider, StreamCallback,
};
use super::sse::{LineBuffer, StreamAccumulator};
use crate::api::{ChatPlugin, ChatRequest, ReasoningConfig};
use crate::core::error::{ChatError, ChatResult};
use crate::utils::url::construct_api_url;

/// Any endpoint speaking the OpenAI chat completions streaming protocol.
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    api_key: String,
    models: Vec<ModelInfo>,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        models: Vec<ModelInfo>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            models,
            client: reqwest::Client::new(),
        }
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatRequest {
        ChatRequest {
            model: request.model.clone(),
            messages: request.api_messages(),
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            plugins: request.web_search.then(|| {
                vec![ChatPlugin {
                    id: "web".to_string(),
                }]
            }),
            reasoning: request.reasoning_effort.map(|effort| ReasoningConfig {
                effort: effort.as_str().to_string(),
            }),
        }
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        on_update: &mut StreamCallback<'_>,
    ) -> ChatResult<String> {
        let body = self.build_request(request);
        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        debug!(provider = %self.name, model = %body.model, messages = body.messages.len(), "sending completion request");

        let response = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ChatError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut accumulator = StreamAccumulator::new();

        while let Some(chunk) = stream.next().await {
            lines.extend(&chunk?);
            while let Some(line) = lines.next_line() {
                if accumulator.feed_line(&line, on_update) {
                    return Ok(accumulator.into_text());
                }
            }
        }

        if let Some(rest) = lines.take_remainder() {
            accumulator.feed_line(&rest, on_update);
        }
        Ok(accumulator.into_text())
    }
}

#[async_trait(?Send)]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        on_update: &mut StreamCallback<'_>,
    ) -> ChatResult<CompletionResponse> {
        let cancel_token = request.cancel_token.clone();
        let text = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(ChatError::Cancelled),
            result = self.stream_completion(&request, on_update) => result?,
        };

        Ok(CompletionResponse {
            text,
            provider: self.name.clone(),
            model: request.model,
        })
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Human-readable rendering of a provider error body.
pub fn format_api_error(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("API Error ({status}): <empty>");
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
            return format!("API Error ({status}): {summary}");
        }
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            return format!("API Error ({status}):\n{pretty_json}");
        }
    }

    format!("API Error ({status}): {trimmed}")
}
