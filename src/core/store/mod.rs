//! Single source of truth for UI, chat, api, system and settings state.
//!
//! Mutations go through [`Store::dispatch`]: the reducer builds a new
//! snapshot, observers watching a path whose value changed are notified in
//! registration order, and persisted fields are mirrored to storage.

pub mod actions;
pub mod state;

use std::cell::Cell;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

pub use actions::{reduce, StoreAction};
pub use state::{ConversationSummary, StoreState, SystemPrompt};

use crate::core::error::{ChatError, ChatResult};
use crate::core::storage::{keys, KeyValueStore};

pub const WILDCARD: &str = "*";

/// Fields mirrored to durable storage, by storage key and dotted state path.
const PERSISTED_FIELDS: &[(&str, &str)] = &[
    (keys::THEME, "ui.theme"),
    (keys::ACTIVE_CONVERSATION, "chat.active_conversation_id"),
    (keys::MODEL_SELECTION, "api.active_model"),
    (keys::API_KEY_PROVIDER, "api.api_key_provider"),
    (keys::USAGE, "system.usage"),
    (keys::TEMPERATURE, "settings.temperature"),
    (keys::MAX_TOKENS, "settings.max_tokens"),
    (keys::MEMORY_ENABLED, "settings.memory_enabled"),
    (keys::WEB_SEARCH, "settings.web_search"),
    (keys::SYSTEM_PROMPTS, "settings.system_prompts"),
    (keys::ACTIVE_SYSTEM_PROMPT, "settings.active_system_prompt_id"),
];

type Callback = Box<dyn FnMut(&StoreState, &StoreState)>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchPath {
    All,
    Path(String),
}

struct Subscriber {
    path: WatchPath,
    callback: Callback,
    active: Rc<Cell<bool>>,
}

/// Handle returned by [`Store::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to end it.
#[derive(Debug, Clone)]
pub struct Subscription {
    active: Rc<Cell<bool>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

fn to_pointer(path: &str) -> String {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .fold(String::new(), |mut pointer, segment| {
            pointer.push('/');
            pointer.push_str(segment);
            pointer
        })
}

fn project(state: &StoreState) -> Value {
    serde_json::to_value(state).unwrap_or_default()
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    value.pointer(&to_pointer(path))
}

pub struct Store {
    state: StoreState,
    subscribers: Vec<Subscriber>,
    storage: Rc<dyn KeyValueStore>,
}

impl Store {
    /// Builds the initial snapshot from defaults overlaid with stored values.
    /// Missing or unparsable values keep their defaults.
    pub fn new(storage: Rc<dyn KeyValueStore>) -> Self {
        let state = load_persisted(storage.as_ref());
        Self {
            state,
            subscribers: Vec::new(),
            storage,
        }
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    /// Resolves a dotted path such as `settings.temperature`.
    pub fn value(&self, path: &str) -> Option<Value> {
        let projected = project(&self.state);
        if path == WILDCARD || path.is_empty() {
            return Some(projected);
        }
        lookup(&projected, path).cloned()
    }

    pub fn subscribe<F>(&mut self, path: &str, callback: F) -> Subscription
    where
        F: FnMut(&StoreState, &StoreState) + 'static,
    {
        let active = Rc::new(Cell::new(true));
        let path = if path == WILDCARD {
            WatchPath::All
        } else {
            WatchPath::Path(path.to_string())
        };
        self.subscribers.push(Subscriber {
            path,
            callback: Box::new(callback),
            active: active.clone(),
        });
        Subscription { active }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|s| s.active.get()).count()
    }

    pub fn dispatch(&mut self, action: StoreAction) -> ChatResult<()> {
        let next = match reduce(&self.state, &action) {
            Ok(next) => next,
            Err(err) => {
                warn!(action = action.name(), "action rejected: {err}");
                return Err(err);
            }
        };
        debug!(action = action.name(), "dispatch");

        let previous = std::mem::replace(&mut self.state, next);
        self.persist_changes(&previous);
        self.notify(&previous);
        Ok(())
    }

    /// Dispatch by action name with a JSON payload. Unknown names and
    /// malformed payloads are logged and leave the state untouched.
    pub fn dispatch_named(&mut self, name: &str, payload: Value) -> ChatResult<()> {
        let mut envelope = serde_json::Map::new();
        envelope.insert("type".to_string(), Value::String(name.to_string()));
        if !payload.is_null() {
            envelope.insert("payload".to_string(), payload);
        }

        match serde_json::from_value::<StoreAction>(Value::Object(envelope)) {
            Ok(action) => self.dispatch(action),
            Err(err) => {
                warn!(action = name, "ignoring unknown or malformed action: {err}");
                Err(ChatError::UnknownAction(name.to_string()))
            }
        }
    }

    fn notify(&mut self, previous: &StoreState) {
        self.subscribers.retain(|s| s.active.get());
        if self.subscribers.is_empty() {
            return;
        }

        let needs_projection = self
            .subscribers
            .iter()
            .any(|s| matches!(s.path, WatchPath::Path(_)));
        let (old_json, new_json) = if needs_projection {
            (project(previous), project(&self.state))
        } else {
            (Value::Null, Value::Null)
        };

        for subscriber in self.subscribers.iter_mut() {
            if !subscriber.active.get() {
                continue;
            }
            let changed = match &subscriber.path {
                WatchPath::All => true,
                WatchPath::Path(path) => lookup(&old_json, path) != lookup(&new_json, path),
            };
            if changed {
                (subscriber.callback)(&self.state, previous);
            }
        }
    }

    fn persist_changes(&self, previous: &StoreState) {
        let old_json = project(previous);
        let new_json = project(&self.state);

        for (key, path) in PERSISTED_FIELDS {
            let new_value = lookup(&new_json, path);
            if lookup(&old_json, path) == new_value {
                continue;
            }
            let result = match new_value {
                None | Some(Value::Null) => self.storage.remove(key),
                Some(value) => self.storage.set(key, &value.to_string()),
            };
            if let Err(err) = result {
                warn!(key, "failed to persist state field: {err}");
            }
        }
    }
}

fn load_persisted(storage: &dyn KeyValueStore) -> StoreState {
    let defaults = StoreState::default();
    let mut candidate = project(&defaults);

    for (key, path) in PERSISTED_FIELDS {
        let raw = match storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(err) => {
                warn!(key, "failed to read stored value: {err}");
                continue;
            }
        };
        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, "ignoring unparsable stored value: {err}");
                continue;
            }
        };

        let pointer = to_pointer(path);
        let Some(slot) = candidate.pointer_mut(&pointer) else {
            continue;
        };
        let previous = std::mem::replace(slot, parsed);
        if serde_json::from_value::<StoreState>(candidate.clone()).is_err() {
            warn!(key, "stored value has the wrong shape; using default");
            if let Some(slot) = candidate.pointer_mut(&pointer) {
                *slot = previous;
            }
        }
    }

    serde_json::from_value(candidate).unwrap_or(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryKeyValueStore;
    use std::cell::RefCell;

    fn store() -> (Store, Rc<MemoryKeyValueStore>) {
        let storage = Rc::new(MemoryKeyValueStore::new());
        (Store::new(storage.clone()), storage)
    }

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(&StoreState, &StoreState)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |label: &str| {
            let log = log_clone.clone();
            let label = label.to_string();
            Box::new(move |_: &StoreState, _: &StoreState| log.borrow_mut().push(label.clone()))
                as Box<dyn FnMut(&StoreState, &StoreState)>
        };
        (log, make)
    }

    #[test]
    fn path_subscription_fires_only_on_deep_change() {
        let (mut store, _) = store();
        let (log, make) = recorder();
        store.subscribe("settings.temperature", make("temp"));
        store.subscribe("ui", make("ui"));

        store.dispatch(StoreAction::SetTemperature(0.7)).unwrap();
        assert!(log.borrow().is_empty(), "same value must not notify");

        store.dispatch(StoreAction::SetTemperature(1.0)).unwrap();
        assert_eq!(*log.borrow(), vec!["temp"]);

        store.dispatch(StoreAction::SetStatus("busy".into())).unwrap();
        assert_eq!(*log.borrow(), vec!["temp", "ui"]);
    }

    #[test]
    fn wildcard_fires_on_every_successful_dispatch_in_registration_order() {
        let (mut store, _) = store();
        let (log, make) = recorder();
        store.subscribe(WILDCARD, make("first"));
        store.subscribe("ui.theme", make("theme"));
        store.subscribe(WILDCARD, make("last"));

        store.dispatch(StoreAction::SetOnline(true)).unwrap();
        store.dispatch(StoreAction::SetTheme("light".into())).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["first", "last", "first", "theme", "last"]
        );
    }

    #[test]
    fn failed_reducer_leaves_state_and_observers_untouched() {
        let (mut store, _) = store();
        let (log, make) = recorder();
        store.subscribe(WILDCARD, make("any"));
        let before = store.state().clone();

        assert!(store.dispatch(StoreAction::SetMaxTokens(0)).is_err());
        assert_eq!(store.state(), &before);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unknown_named_action_is_a_noop() {
        let (mut store, _) = store();
        let (log, make) = recorder();
        store.subscribe(WILDCARD, make("any"));
        let before = store.state().clone();

        let err = store
            .dispatch_named("launch_rockets", serde_json::json!(3))
            .unwrap_err();
        assert!(matches!(err, ChatError::UnknownAction(name) if name == "launch_rockets"));
        assert!(store
            .dispatch_named("set_max_tokens", serde_json::json!("lots"))
            .is_err());
        assert_eq!(store.state(), &before);
        assert!(log.borrow().is_empty());

        store
            .dispatch_named("set_theme", serde_json::json!("solarized"))
            .unwrap();
        store.dispatch_named("clear_status", Value::Null).unwrap();
        assert_eq!(store.state().ui.theme, "solarized");
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_and_is_idempotent() {
        let (mut store, _) = store();
        let (log, make) = recorder();
        let a = store.subscribe(WILDCARD, make("a"));
        let _b = store.subscribe(WILDCARD, make("b"));

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(store.subscriber_count(), 1);

        store.dispatch(StoreAction::SetSidebarOpen(false)).unwrap();
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn callbacks_receive_new_then_old() {
        let (mut store, _) = store();
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        store.subscribe("ui.theme", move |new, old| {
            *seen_clone.borrow_mut() = Some((new.ui.theme.clone(), old.ui.theme.clone()));
        });
        store.dispatch(StoreAction::SetTheme("light".into())).unwrap();
        assert_eq!(
            seen.borrow().clone(),
            Some(("light".to_string(), "dark".to_string()))
        );
    }

    #[test]
    fn value_resolves_dotted_paths() {
        let (store, _) = store();
        assert_eq!(store.value("ui.theme"), Some(Value::String("dark".into())));
        assert_eq!(store.value("settings.max_tokens"), Some(serde_json::json!(2048)));
        assert_eq!(store.value("settings.nope"), None);
        assert!(store.value("*").unwrap().get("chat").is_some());
    }

    #[test]
    fn persisted_fields_round_trip_through_storage() {
        let (mut store, storage) = store();
        store.dispatch(StoreAction::SetTheme("light".into())).unwrap();
        store
            .dispatch(StoreAction::SetActiveConversation(Some("c1".into())))
            .unwrap();
        store.dispatch(StoreAction::SetMemoryEnabled(false)).unwrap();
        store.dispatch(StoreAction::SetStatus("transient".into())).unwrap();

        assert_eq!(storage.get(keys::THEME).unwrap().as_deref(), Some("\"light\""));

        let reloaded = Store::new(storage.clone());
        assert_eq!(reloaded.state().ui.theme, "light");
        assert_eq!(
            reloaded.state().chat.active_conversation_id.as_deref(),
            Some("c1")
        );
        assert!(!reloaded.state().settings.memory_enabled);
        assert_eq!(reloaded.state().ui.status, None);

        store.dispatch(StoreAction::SetActiveConversation(None)).unwrap();
        assert_eq!(storage.get(keys::ACTIVE_CONVERSATION).unwrap(), None);
    }

    #[test]
    fn unparsable_or_mistyped_values_fall_back_to_defaults() {
        let storage = Rc::new(MemoryKeyValueStore::new());
        storage.set(keys::THEME, "{{{").unwrap();
        storage.set(keys::MAX_TOKENS, "\"many\"").unwrap();
        storage.set(keys::TEMPERATURE, "1.5").unwrap();

        let store = Store::new(storage);
        assert_eq!(store.state().ui.theme, "dark");
        assert_eq!(store.state().settings.max_tokens, 2048);
        assert_eq!(store.state().settings.temperature, 1.5);
    }

    #[test]
    fn storage_failure_does_not_corrupt_state() {
        let (mut store, storage) = store();
        storage.set_fail_writes(true);
        store.dispatch(StoreAction::SetTheme("light".into())).unwrap();
        assert_eq!(store.state().ui.theme, "light");
    }
}
