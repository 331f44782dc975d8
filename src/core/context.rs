//! One store, one session manager and one completion client, kept in sync.

use std::rc::Rc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::completion::{
    CompletionClient, CompletionResponse, ModelSelection, ReasoningEffort,
};
use crate::core::error::ChatResult;
use crate::core::session::conversation::{MessageInput, ModelDescriptor};
use crate::core::session::{ChatSessionManager, SendOptions, UsageLimits};
use crate::core::storage::{BlobStore, KeyValueStore};
use crate::core::store::{ConversationSummary, Store, StoreAction};

pub struct ChatContext {
    store: Store,
    session: ChatSessionManager,
    client: CompletionClient,
    next_stream_id: u64,
}

impl ChatContext {
    /// `client` should already have its providers registered and share
    /// `storage`, so a persisted model selection can be restored.
    pub fn new(
        storage: Rc<dyn KeyValueStore>,
        blobs: Rc<dyn BlobStore>,
        mut client: CompletionClient,
        limits: UsageLimits,
    ) -> Self {
        let store = Store::new(storage.clone());
        let session = ChatSessionManager::load(storage, blobs, limits);
        client.restore_selection();

        let mut context = Self {
            store,
            session,
            client,
            next_stream_id: 0,
        };
        let selection = context.client.active_selection().cloned();
        context.apply(StoreAction::SetActiveModel(selection));
        context.sync_session();
        context
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn session(&self) -> &ChatSessionManager {
        &self.session
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    /// Id for the next streamed reply; stale renderer chunks are told apart by it.
    pub fn start_stream(&mut self) -> u64 {
        self.next_stream_id += 1;
        self.next_stream_id
    }

    pub fn select_model(
        &mut self,
        provider: &str,
        model: &str,
        reasoning_effort: Option<ReasoningEffort>,
    ) -> ChatResult<ModelSelection> {
        let selection = self
            .client
            .set_active_model(provider, model, reasoning_effort)?;
        self.apply(StoreAction::SetActiveModel(Some(selection.clone())));
        self.apply(StoreAction::SetApiKeyProvider(Some(selection.provider.clone())));
        Ok(selection)
    }

    pub fn new_conversation(&mut self) -> ChatResult<String> {
        let model = self.client.active_selection().map(|selection| ModelDescriptor {
            provider: selection.provider.clone(),
            model: selection.model.clone(),
        });
        let id = self.session.create_conversation(model)?;
        self.sync_session();
        Ok(id)
    }

    pub fn switch_conversation(&mut self, id: &str) -> ChatResult<()> {
        self.session.set_active(id)?;
        self.sync_session();
        Ok(())
    }

    pub fn delete_conversation(&mut self, id: &str) -> ChatResult<bool> {
        let removed = self.session.delete_conversation(id)?;
        self.sync_session();
        Ok(removed)
    }

    pub fn refresh_usage(&mut self, now: DateTime<Utc>) {
        if self.session.refresh_usage(now) {
            self.sync_session();
        }
    }

    fn send_options(&self, cancel_token: Option<CancellationToken>) -> SendOptions {
        let settings = &self.store.state().settings;
        SendOptions {
            memory_enabled: settings.memory_enabled,
            system_prompt: settings.active_system_prompt().map(|p| p.text.clone()),
            cancel_token,
        }
    }

    /// Sends through the session manager with the current settings. The
    /// store shows streaming while the request is in flight.
    pub async fn send(
        &mut self,
        input: MessageInput,
        cancel_token: Option<CancellationToken>,
        on_stream_chunk: &mut dyn FnMut(&str),
    ) -> ChatResult<CompletionResponse> {
        let options = self.send_options(cancel_token);
        self.apply(StoreAction::SetStreaming(true));
        let result = self
            .session
            .send_message(&self.client, input, options, on_stream_chunk)
            .await;
        self.finish_send(result)
    }

    pub async fn retry(
        &mut self,
        cancel_token: Option<CancellationToken>,
        on_stream_chunk: &mut dyn FnMut(&str),
    ) -> ChatResult<CompletionResponse> {
        let options = self.send_options(cancel_token);
        self.apply(StoreAction::SetStreaming(true));
        let result = self
            .session
            .retry_last(&self.client, options, on_stream_chunk)
            .await;
        self.finish_send(result)
    }

    fn finish_send(
        &mut self,
        result: ChatResult<CompletionResponse>,
    ) -> ChatResult<CompletionResponse> {
        self.apply(StoreAction::SetStreaming(false));
        match &result {
            Ok(_) => self.apply(StoreAction::ClearStatus),
            Err(err) => self.apply(StoreAction::SetStatus(err.to_string())),
        }
        self.sync_session();
        result
    }

    fn sync_session(&mut self) {
        let summaries: Vec<ConversationSummary> = self
            .session
            .conversations()
            .into_iter()
            .map(ConversationSummary::from)
            .collect();
        let active = self.session.active_id().map(str::to_string);
        let usage = self.session.usage().clone();

        self.apply(StoreAction::SetConversations(summaries));
        self.apply(StoreAction::SetActiveConversation(active));
        self.apply(StoreAction::SetUsage(usage));
    }

    fn apply(&mut self, action: StoreAction) {
        let name = action.name();
        if let Err(err) = self.store.dispatch(action) {
            warn!(action = name, "state update rejected: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ChatError;
    use crate::core::storage::{keys, MemoryBlobStore, MemoryKeyValueStore};
    use crate::core::store::SystemPrompt;
    use crate::utils::test_utils::{premium_model, standard_model, StubProvider};
    use std::cell::RefCell;

    fn context() -> (ChatContext, StubProvider, Rc<MemoryKeyValueStore>) {
        let storage = Rc::new(MemoryKeyValueStore::new());
        let mut client = CompletionClient::new(storage.clone());
        let stub = StubProvider::new("stub", vec![standard_model("fast"), premium_model("smart")]);
        client.register_provider(Box::new(stub.clone()));
        let context = ChatContext::new(
            storage.clone(),
            Rc::new(MemoryBlobStore::new()),
            client,
            UsageLimits::default(),
        );
        (context, stub, storage)
    }

    #[tokio::test]
    async fn send_updates_chat_and_usage_slices() {
        let (mut ctx, stub, _) = context();
        ctx.select_model("stub", "fast", None).unwrap();
        stub.push_response(&["Hello", " there"]);

        let streaming_seen = Rc::new(RefCell::new(Vec::new()));
        let seen = streaming_seen.clone();
        ctx.store_mut().subscribe("chat.streaming", move |new, _| {
            seen.borrow_mut().push(new.chat.streaming);
        });

        ctx.send("Hi".into(), None, &mut |_: &str| {}).await.unwrap();

        let state = ctx.store().state();
        assert_eq!(state.chat.conversations.len(), 1);
        assert_eq!(state.chat.conversations[0].title, "Hi");
        assert_eq!(state.chat.conversations[0].message_count, 2);
        assert_eq!(
            state.chat.active_conversation_id.as_deref(),
            ctx.session().active_id()
        );
        assert_eq!(state.system.usage.as_ref().unwrap().standard_count, 1);
        assert_eq!(*streaming_seen.borrow(), vec![true, false]);
    }

    #[tokio::test]
    async fn active_system_prompt_and_memory_flag_reach_the_provider() {
        let (mut ctx, stub, _) = context();
        ctx.select_model("stub", "fast", None).unwrap();
        let store = ctx.store_mut();
        store
            .dispatch(StoreAction::UpsertSystemPrompt(SystemPrompt {
                id: "pirate".into(),
                name: "Pirate".into(),
                text: "Talk like a pirate".into(),
            }))
            .unwrap();
        store
            .dispatch(StoreAction::SetActiveSystemPrompt(Some("pirate".into())))
            .unwrap();
        store.dispatch(StoreAction::SetMemoryEnabled(false)).unwrap();

        stub.push_response(&["one"]);
        stub.push_response(&["two"]);
        ctx.send("first".into(), None, &mut |_: &str| {}).await.unwrap();
        ctx.send("second".into(), None, &mut |_: &str| {}).await.unwrap();

        let request = stub.last_request().unwrap();
        assert_eq!(request.system_prompt.as_deref(), Some("Talk like a pirate"));
        assert!(request.history.is_empty());
    }

    #[tokio::test]
    async fn failed_send_sets_status_and_retry_clears_it() {
        let (mut ctx, stub, _) = context();
        ctx.select_model("stub", "fast", None).unwrap();
        stub.push_failure(503, "overloaded");

        let err = ctx.send("Hi".into(), None, &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Provider { status: 503, .. }));
        assert!(ctx.store().state().ui.status.is_some());
        assert!(!ctx.store().state().chat.streaming);

        stub.push_response(&["ok"]);
        ctx.retry(None, &mut |_: &str| {}).await.unwrap();
        assert!(ctx.store().state().ui.status.is_none());
        assert_eq!(ctx.store().state().chat.conversations.len(), 1);
    }

    #[test]
    fn model_selection_survives_restart() {
        let (mut ctx, _, storage) = context();
        ctx.select_model("STUB", "smart", Some(ReasoningEffort::Low))
            .unwrap();
        assert!(storage.get(keys::MODEL_SELECTION).unwrap().is_some());

        let mut client = CompletionClient::new(storage.clone());
        client.register_provider(Box::new(StubProvider::new(
            "stub",
            vec![standard_model("fast"), premium_model("smart")],
        )));
        let restarted = ChatContext::new(
            storage.clone(),
            Rc::new(MemoryBlobStore::new()),
            client,
            UsageLimits::default(),
        );
        let selection = restarted.store().state().api.active_model.clone().unwrap();
        assert_eq!(selection.model, "smart");
        assert_eq!(selection.reasoning_effort, Some(ReasoningEffort::Low));
        assert_eq!(restarted.client().active_selection(), Some(&selection));
    }

    #[test]
    fn switching_and_deleting_keep_store_in_step() {
        let (mut ctx, _, _) = context();
        let first = ctx.new_conversation().unwrap();
        let second = ctx.new_conversation().unwrap();
        assert_eq!(
            ctx.store().state().chat.active_conversation_id.as_deref(),
            Some(second.as_str())
        );

        ctx.switch_conversation(&first).unwrap();
        assert_eq!(
            ctx.store().value("chat.active_conversation_id"),
            Some(serde_json::json!(first))
        );
        assert!(matches!(
            ctx.switch_conversation("missing"),
            Err(ChatError::NotFound { .. })
        ));

        assert!(ctx.delete_conversation(&first).unwrap());
        let state = ctx.store().state();
        assert_eq!(state.chat.conversations.len(), 1);
        assert_eq!(state.chat.active_conversation_id.as_deref(), Some(second.as_str()));
    }

    #[test]
    fn stream_ids_increase() {
        let (mut ctx, _, _) = context();
        let a = ctx.start_stream();
        let b = ctx.start_stream();
        assert!(b > a);
    }
}
