#![cfg(test)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;

use crate::core::completion::{
    CompletionRequest, CompletionResponse, ModelCategory, ModelInfo, Provider, StreamCallback,
};
use crate::core::error::{ChatError, ChatResult};

pub fn standard_model(id: &str) -> ModelInfo {
    ModelInfo {
        id: id.to_string(),
        name: id.to_uppercase(),
        description: format!("{id} test model"),
        max_tokens: 4096,
        category: ModelCategory::Standard,
    }
}

pub fn premium_model(id: &str) -> ModelInfo {
    ModelInfo {
        category: ModelCategory::Premium,
        ..standard_model(id)
    }
}

enum ScriptedReply {
    Chunks(Vec<String>),
    Failure { status: u16, body: String },
}

#[derive(Default)]
struct StubState {
    replies: VecDeque<ScriptedReply>,
    requests: Vec<CompletionRequest>,
}

/// Provider that replays scripted deltas. Clones share one script.
#[derive(Clone)]
pub struct StubProvider {
    name: String,
    models: Vec<ModelInfo>,
    state: Rc<RefCell<StubState>>,
}

impl StubProvider {
    pub fn new(name: &str, models: Vec<ModelInfo>) -> Self {
        Self {
            name: name.to_string(),
            models,
            state: Rc::new(RefCell::new(StubState::default())),
        }
    }

    pub fn push_response(&self, chunks: &[&str]) {
        self.state
            .borrow_mut()
            .replies
            .push_back(ScriptedReply::Chunks(
                chunks.iter().map(|c| c.to_string()).collect(),
            ));
    }

    pub fn push_failure(&self, status: u16, body: &str) {
        self.state
            .borrow_mut()
            .replies
            .push_back(ScriptedReply::Failure {
                status,
                body: body.to_string(),
            });
    }

    pub fn request_count(&self) -> usize {
        self.state.borrow().requests.len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.state.borrow().requests.last().cloned()
    }
}

#[async_trait(?Send)]
impl Provider for StubProvider {
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
        let model = request.model.clone();
        let reply = {
            let mut state = self.state.borrow_mut();
            state.requests.push(request);
            state.replies.pop_front()
        };

        match reply {
            Some(ScriptedReply::Chunks(chunks)) => {
                let mut text = String::new();
                for chunk in chunks {
                    text.push_str(&chunk);
                    on_update(&text);
                }
                Ok(CompletionResponse {
                    text,
                    provider: self.name.clone(),
                    model,
                })
            }
            Some(ScriptedReply::Failure { status, body }) => {
                Err(ChatError::Provider { status, body })
            }
            None => Err(ChatError::Provider {
                status: 500,
                body: "no scripted response".to_string(),
            }),
        }
    }
}
