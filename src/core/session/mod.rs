//! Conversations, messages, attachments and usage quotas.

pub mod conversation;
pub mod usage;

use std::collections::HashSet;
use std::rc::Rc;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ChatMessage;
use crate::core::completion::{CompletionClient, CompletionOptions, CompletionResponse};
use crate::core::error::{ChatError, ChatResult};
use crate::core::storage::{keys, BlobStore, KeyValueStore};
use conversation::{
    derive_title, Attachment, AttachmentRef, Conversation, Message, MessageContent, MessageInput,
    ModelDescriptor, Role,
};
use usage::{UsageCounter, DEFAULT_PREMIUM_LIMIT, DEFAULT_STANDARD_LIMIT};

/// Conversations kept when storage overflows and pruning kicks in.
pub const OVERFLOW_KEEP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLimits {
    pub standard: u32,
    pub premium: u32,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            standard: DEFAULT_STANDARD_LIMIT,
            premium: DEFAULT_PREMIUM_LIMIT,
        }
    }
}

/// Per-send behaviour drawn from the settings slice.
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub memory_enabled: bool,
    pub system_prompt: Option<String>,
    pub cancel_token: Option<CancellationToken>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            system_prompt: None,
            cancel_token: None,
        }
    }
}

struct AppendSnapshot {
    title: String,
    updated_at: DateTime<Utc>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub struct ChatSessionManager {
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    usage: UsageCounter,
    pending_retry: Option<MessageInput>,
    storage: Rc<dyn KeyValueStore>,
    blobs: Rc<dyn BlobStore>,
}

impl ChatSessionManager {
    pub fn load(
        storage: Rc<dyn KeyValueStore>,
        blobs: Rc<dyn BlobStore>,
        limits: UsageLimits,
    ) -> Self {
        Self::load_at(storage, blobs, limits, Utc::now())
    }

    /// Restores conversations, active id and usage from storage. Usage that
    /// is past its reset time is zeroed and a new reset time computed.
    pub fn load_at(
        storage: Rc<dyn KeyValueStore>,
        blobs: Rc<dyn BlobStore>,
        limits: UsageLimits,
        now: DateTime<Utc>,
    ) -> Self {
        let conversations: Vec<Conversation> =
            read_json(storage.as_ref(), keys::CONVERSATIONS).unwrap_or_default();
        let stored_active: Option<String> = read_json(storage.as_ref(), keys::ACTIVE_CONVERSATION);
        let mut usage = read_json::<UsageCounter>(storage.as_ref(), keys::USAGE)
            .unwrap_or_else(|| UsageCounter::new(limits.standard, limits.premium, now));
        usage.standard_limit = limits.standard;
        usage.premium_limit = limits.premium;

        let mut manager = Self {
            conversations,
            active_id: None,
            usage,
            pending_retry: None,
            storage,
            blobs,
        };

        manager.active_id = match stored_active {
            Some(id) if manager.conversation(&id).is_some() => Some(id),
            _ => manager.most_recent_id(),
        };
        if manager.usage.refresh(now) {
            info!("usage counters reset; next reset at {}", manager.usage.reset_at);
        }
        manager.persist_usage();
        debug!(conversations = manager.conversations.len(), "loaded chat sessions");
        manager
    }

    /// Conversations, most recently updated first.
    pub fn conversations(&self) -> Vec<&Conversation> {
        let mut sorted: Vec<&Conversation> = self.conversations.iter().collect();
        sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sorted
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_id.as_deref().and_then(|id| self.conversation(id))
    }

    pub fn set_active(&mut self, id: &str) -> ChatResult<()> {
        if self.conversation(id).is_none() {
            return Err(ChatError::not_found("conversation", id));
        }
        self.active_id = Some(id.to_string());
        self.persist_active();
        Ok(())
    }

    pub fn usage(&self) -> &UsageCounter {
        &self.usage
    }

    pub fn last_failed_input(&self) -> Option<&MessageInput> {
        self.pending_retry.as_ref()
    }

    /// Background tick: resets counters once the weekly deadline passes.
    pub fn refresh_usage(&mut self, now: DateTime<Utc>) -> bool {
        let reset = self.usage.refresh(now);
        if reset {
            info!("usage counters reset; next reset at {}", self.usage.reset_at);
            self.persist_usage();
        }
        reset
    }

    pub fn attachment(&self, id: &str) -> ChatResult<Attachment> {
        self.blobs
            .get(id)?
            .ok_or_else(|| ChatError::not_found("attachment", id))
    }

    pub fn create_conversation(&mut self, model: Option<ModelDescriptor>) -> ChatResult<String> {
        let id = new_id();
        let previous_active = self.active_id.clone();
        self.conversations
            .push(Conversation::new(id.clone(), model, Utc::now()));
        self.active_id = Some(id.clone());

        if let Err(err) = self.save_conversations() {
            self.conversations.retain(|c| c.id != id);
            self.active_id = previous_active;
            return Err(err);
        }
        self.persist_active();
        debug!(conversation = %id, "created conversation");
        Ok(id)
    }

    pub fn add_message(
        &mut self,
        conversation_id: &str,
        input: MessageInput,
        role: Role,
    ) -> ChatResult<Message> {
        let snapshot = {
            let conversation = self
                .conversation(conversation_id)
                .ok_or_else(|| ChatError::not_found("conversation", conversation_id))?;
            AppendSnapshot {
                title: conversation.title.clone(),
                updated_at: conversation.updated_at,
            }
        };

        let content = self.store_attachments(input)?;
        let message = Message {
            id: new_id(),
            role,
            content,
            timestamp: Utc::now(),
        };

        if let Some(conversation) = self.conversation_mut(conversation_id) {
            if role.is_user() && !conversation.has_user_message() {
                conversation.title = derive_title(message.text());
            }
            conversation.messages.push(message.clone());
            conversation.touch(message.timestamp);
        }

        if let Err(err) = self.save_conversations() {
            warn!(conversation = %conversation_id, "failed to persist message: {err}");
            self.rollback_message(conversation_id, &message, snapshot);
            return Err(err);
        }
        Ok(message)
    }

    fn store_attachments(&self, input: MessageInput) -> ChatResult<MessageContent> {
        if input.attachments.is_empty() {
            return Ok(MessageContent::Text(input.text));
        }

        let mut references: Vec<AttachmentRef> = Vec::with_capacity(input.attachments.len());
        for upload in input.attachments {
            let attachment = Attachment {
                id: new_id(),
                name: upload.name,
                mime_type: upload.mime_type,
                size: upload.bytes.len() as u64,
                data: base64::prelude::BASE64_STANDARD.encode(&upload.bytes),
            };
            if let Err(err) = self.blobs.put(&attachment) {
                for stored in &references {
                    self.delete_blob_best_effort(&stored.id);
                }
                return Err(err);
            }
            references.push(attachment.reference());
        }

        Ok(MessageContent::WithAttachments {
            text: input.text,
            attachments: references,
        })
    }

    fn rollback_message(&mut self, conversation_id: &str, message: &Message, snapshot: AppendSnapshot) {
        if let Some(conversation) = self.conversation_mut(conversation_id) {
            conversation.messages.retain(|m| m.id != message.id);
            conversation.title = snapshot.title;
            conversation.updated_at = snapshot.updated_at;
        }
        for reference in message.content.attachments() {
            self.delete_blob_best_effort(&reference.id);
        }
    }

    fn delete_blob_best_effort(&self, id: &str) {
        if let Err(err) = self.blobs.delete(id) {
            warn!(attachment = %id, "failed to delete attachment: {err}");
        }
    }

    pub fn delete_conversation(&mut self, conversation_id: &str) -> ChatResult<bool> {
        let Some(position) = self
            .conversations
            .iter()
            .position(|c| c.id == conversation_id)
        else {
            return Ok(false);
        };

        self.cascade_attachments(position);
        self.conversations.remove(position);

        if self.active_id.as_deref() == Some(conversation_id) {
            self.active_id = self.most_recent_id();
        }
        self.save_conversations()?;
        self.persist_active();
        debug!(conversation = %conversation_id, "deleted conversation");
        Ok(true)
    }

    /// Deletes attachments of the conversation at `position` that no other
    /// conversation references.
    fn cascade_attachments(&self, position: usize) {
        let referenced_elsewhere: HashSet<&str> = self
            .conversations
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != position)
            .flat_map(|(_, c)| c.attachment_ids())
            .collect();

        let exclusive: HashSet<&str> = self.conversations[position]
            .attachment_ids()
            .filter(|id| !referenced_elsewhere.contains(id))
            .collect();
        for id in exclusive {
            self.delete_blob_best_effort(id);
        }
    }

    fn most_recent_id(&self) -> Option<String> {
        self.conversations
            .iter()
            .max_by_key(|c| c.updated_at)
            .map(|c| c.id.clone())
    }

    /// Writes the conversation list. On a quota error with more than
    /// [`OVERFLOW_KEEP`] conversations, prunes to the most recent ones and
    /// retries once.
    fn save_conversations(&mut self) -> ChatResult<()> {
        let mut attempts = 0;
        loop {
            let encoded = serde_json::to_string(&self.conversations)?;
            match self.storage.set(keys::CONVERSATIONS, &encoded) {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.is_quota_exceeded()
                        && attempts == 0
                        && self.conversations.len() > OVERFLOW_KEEP =>
                {
                    attempts += 1;
                    warn!(
                        conversations = self.conversations.len(),
                        "storage full; keeping the {OVERFLOW_KEEP} most recent conversations"
                    );
                    self.prune_to_most_recent(OVERFLOW_KEEP);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn prune_to_most_recent(&mut self, keep: usize) {
        let mut by_recency: Vec<(DateTime<Utc>, String)> = self
            .conversations
            .iter()
            .map(|c| (c.updated_at, c.id.clone()))
            .collect();
        by_recency.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, id) in by_recency.into_iter().skip(keep) {
            if let Some(position) = self.conversations.iter().position(|c| c.id == id) {
                self.cascade_attachments(position);
                self.conversations.remove(position);
            }
        }

        let active_survived = self
            .active_id
            .as_deref()
            .is_some_and(|id| self.conversation(id).is_some());
        if !active_survived {
            self.active_id = self.most_recent_id();
            self.persist_active();
        }
    }

    fn persist_active(&self) {
        let result = match &self.active_id {
            Some(id) => serde_json::to_string(id)
                .map_err(ChatError::from)
                .and_then(|encoded| self.storage.set(keys::ACTIVE_CONVERSATION, &encoded)),
            None => self.storage.remove(keys::ACTIVE_CONVERSATION),
        };
        if let Err(err) = result {
            warn!("failed to persist active conversation: {err}");
        }
    }

    fn persist_usage(&self) {
        let result = serde_json::to_string(&self.usage)
            .map_err(ChatError::from)
            .and_then(|encoded| self.storage.set(keys::USAGE, &encoded));
        if let Err(err) = result {
            warn!("failed to persist usage counters: {err}");
        }
    }

    /// Sends `input` in the active conversation, creating one if needed,
    /// and appends the assistant reply. On failure every optimistic change
    /// is undone, nothing is charged, and the input is kept for
    /// [`ChatSessionManager::retry_last`].
    pub async fn send_message(
        &mut self,
        client: &CompletionClient,
        input: MessageInput,
        options: SendOptions,
        on_stream_chunk: &mut dyn FnMut(&str),
    ) -> ChatResult<CompletionResponse> {
        self.refresh_usage(Utc::now());
        let tier = client.active_tier();
        self.usage.ensure_available(tier)?;
        let selection = client
            .active_selection()
            .cloned()
            .ok_or(ChatError::NoActiveModel)?;

        let previous_active = self.active_id.clone();
        let (conversation_id, created) = match self.active_conversation() {
            Some(conversation) => (conversation.id.clone(), false),
            None => {
                let descriptor = ModelDescriptor {
                    provider: selection.provider.clone(),
                    model: selection.model.clone(),
                };
                (self.create_conversation(Some(descriptor))?, true)
            }
        };

        let history: Vec<ChatMessage> = if options.memory_enabled {
            self.conversation(&conversation_id)
                .map(|c| {
                    c.messages
                        .iter()
                        .map(|m| ChatMessage::new(m.role.as_str(), m.text()))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let text = input.text.clone();

        let result = self
            .exchange(client, &conversation_id, input.clone(), text, history, options, on_stream_chunk)
            .await;

        match result {
            Ok(response) => {
                self.usage.record(tier);
                self.persist_usage();
                self.pending_retry = None;
                Ok(response)
            }
            Err(err) => {
                warn!(conversation = %conversation_id, "send failed: {err}");
                if created {
                    self.conversations.retain(|c| c.id != conversation_id);
                    self.active_id = previous_active;
                    if let Err(save_err) = self.save_conversations() {
                        warn!("failed to persist rollback: {save_err}");
                    }
                    self.persist_active();
                }
                self.pending_retry = Some(input);
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn exchange(
        &mut self,
        client: &CompletionClient,
        conversation_id: &str,
        input: MessageInput,
        text: String,
        history: Vec<ChatMessage>,
        options: SendOptions,
        on_stream_chunk: &mut dyn FnMut(&str),
    ) -> ChatResult<CompletionResponse> {
        let snapshot = self
            .conversation(conversation_id)
            .map(|c| AppendSnapshot {
                title: c.title.clone(),
                updated_at: c.updated_at,
            })
            .ok_or_else(|| ChatError::not_found("conversation", conversation_id))?;
        let user_message = self.add_message(conversation_id, input, Role::User)?;

        let completion_options = CompletionOptions {
            system_prompt: options.system_prompt,
            cancel_token: options.cancel_token,
            ..CompletionOptions::default()
        };
        let outcome = match client
            .send_message(&text, history, completion_options, on_stream_chunk)
            .await
        {
            Ok(response) => self
                .add_message(conversation_id, MessageInput::text(response.text.clone()), Role::Assistant)
                .map(|_| response),
            Err(err) => Err(err),
        };

        if outcome.is_err() {
            self.rollback_message(conversation_id, &user_message, snapshot);
            if let Err(save_err) = self.save_conversations() {
                warn!("failed to persist rollback: {save_err}");
            }
        }
        outcome
    }

    /// Replays the exact input of the last failed send. The input stays
    /// pending until a send of it succeeds.
    pub async fn retry_last(
        &mut self,
        client: &CompletionClient,
        options: SendOptions,
        on_stream_chunk: &mut dyn FnMut(&str),
    ) -> ChatResult<CompletionResponse> {
        let input = self
            .pending_retry
            .clone()
            .ok_or_else(|| ChatError::not_found("pending message", "last"))?;
        self.send_message(client, input, options, on_stream_chunk).await
    }
}

fn read_json<T: serde::de::DeserializeOwned>(storage: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(raw) => raw?,
        Err(err) => {
            warn!(key, "failed to read stored value: {err}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, "ignoring unparsable stored value: {err}");
            None
        }
    }
}
