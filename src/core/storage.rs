//! Durable storage backends.
//!
//! Two kinds of storage back the client: a string-keyed value store for
//! settings, conversations and counters, and a blob store that owns
//! attachment payloads. Both are single-threaded and shared through `Rc`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::error::{ChatError, ChatResult};
use crate::core::session::conversation::Attachment;

pub mod keys {
    pub const CONVERSATIONS: &str = "chatdesk.conversations";
    pub const ACTIVE_CONVERSATION: &str = "chatdesk.active_conversation";
    pub const MODEL_SELECTION: &str = "chatdesk.model_selection";
    pub const API_KEY_PROVIDER: &str = "chatdesk.api_key_provider";
    pub const USAGE: &str = "chatdesk.usage";
    pub const THEME: &str = "chatdesk.theme";
    pub const TEMPERATURE: &str = "chatdesk.temperature";
    pub const MAX_TOKENS: &str = "chatdesk.max_tokens";
    pub const MEMORY_ENABLED: &str = "chatdesk.memory_enabled";
    pub const WEB_SEARCH: &str = "chatdesk.web_search";
    pub const SYSTEM_PROMPTS: &str = "chatdesk.system_prompts";
    pub const ACTIVE_SYSTEM_PROMPT: &str = "chatdesk.active_system_prompt";
}

/// String-keyed durable storage. Structured values are stored as JSON text.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> ChatResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ChatResult<()>;
    fn remove(&self, key: &str) -> ChatResult<()>;
}

/// Attachment payload storage keyed by attachment id.
pub trait BlobStore {
    fn get(&self, id: &str) -> ChatResult<Option<Attachment>>;
    fn put(&self, attachment: &Attachment) -> ChatResult<()>;
    fn delete(&self, id: &str) -> ChatResult<()>;
}

fn map_io_error(err: std::io::Error) -> ChatError {
    if err.kind() == ErrorKind::StorageFull {
        ChatError::StorageQuotaExceeded
    } else {
        ChatError::Storage(err.to_string())
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> ChatResult<()> {
    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir).map_err(map_io_error)?;
    }

    let mut temp_file = match parent {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(map_io_error)?;

    temp_file.write_all(contents).map_err(map_io_error)?;
    temp_file.as_file_mut().sync_all().map_err(map_io_error)?;
    temp_file
        .persist(path)
        .map_err(|err| map_io_error(err.error))?;
    Ok(())
}

/// In-memory value store with an optional byte quota.
///
/// Exceeding the quota yields [`ChatError::StorageQuotaExceeded`], the same
/// way a full browser-style storage area would.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RefCell<BTreeMap<String, String>>,
    quota_bytes: Cell<Option<usize>>,
    fail_writes: Cell<bool>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        let store = Self::default();
        store.quota_bytes.set(Some(quota_bytes));
        store
    }

    pub fn set_quota(&self, quota_bytes: Option<usize>) {
        self.quota_bytes.set(quota_bytes);
    }

    /// Make every subsequent write fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn used_bytes(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> ChatResult<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ChatResult<()> {
        if self.fail_writes.get() {
            return Err(ChatError::Storage(format!("write to '{key}' rejected")));
        }
        if let Some(quota) = self.quota_bytes.get() {
            let existing = self
                .entries
                .borrow()
                .get(key)
                .map(|v| key.len() + v.len())
                .unwrap_or(0);
            let projected = self.used_bytes() - existing + key.len() + value.len();
            if projected > quota {
                return Err(ChatError::StorageQuotaExceeded);
            }
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ChatResult<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Value store persisted as a single JSON map on disk.
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: RefCell<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    pub fn open(path: impl Into<PathBuf>) -> ChatResult<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(map_io_error(err)),
        };
        debug!(path = %path.display(), entries = entries.len(), "opened value store");
        Ok(Self {
            path,
            entries: RefCell::new(entries),
        })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> ChatResult<()> {
        let contents = serde_json::to_vec_pretty(entries)?;
        write_atomically(&self.path, &contents)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> ChatResult<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ChatResult<()> {
        let mut next = self.entries.borrow().clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *self.entries.borrow_mut() = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> ChatResult<()> {
        let mut next = self.entries.borrow().clone();
        if next.remove(key).is_none() {
            return Ok(());
        }
        self.flush(&next)?;
        *self.entries.borrow_mut() = next;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RefCell<BTreeMap<String, Attachment>>,
    fail_deletes: Cell<bool>,
    put_capacity: Cell<Option<usize>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.borrow().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.blobs.borrow().contains_key(id)
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.set(fail);
    }

    /// Rejects puts once `capacity` blobs are stored; `None` lifts the cap.
    pub fn set_put_capacity(&self, capacity: Option<usize>) {
        self.put_capacity.set(capacity);
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, id: &str) -> ChatResult<Option<Attachment>> {
        Ok(self.blobs.borrow().get(id).cloned())
    }

    fn put(&self, attachment: &Attachment) -> ChatResult<()> {
        if let Some(capacity) = self.put_capacity.get() {
            if self.len() >= capacity {
                return Err(ChatError::Storage(format!(
                    "put of '{}' rejected",
                    attachment.id
                )));
            }
        }
        self.blobs
            .borrow_mut()
            .insert(attachment.id.clone(), attachment.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> ChatResult<()> {
        if self.fail_deletes.get() {
            return Err(ChatError::Storage(format!("delete of '{id}' rejected")));
        }
        self.blobs.borrow_mut().remove(id);
        Ok(())
    }
}

/// Blob store keeping one JSON record per attachment in a directory.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn open(dir: impl Into<PathBuf>) -> ChatResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(map_io_error)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> ChatResult<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ChatError::InvalidValue {
                field: "attachment id",
                reason: format!("'{id}' is not a valid file name"),
            });
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, id: &str) -> ChatResult<Option<Attachment>> {
        let path = self.record_path(id)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(map_io_error(err)),
        }
    }

    fn put(&self, attachment: &Attachment) -> ChatResult<()> {
        let path = self.record_path(&attachment.id)?;
        let contents = serde_json::to_vec(attachment)?;
        write_atomically(&path, &contents)
    }

    fn delete(&self, id: &str) -> ChatResult<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(map_io_error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_attachment(id: &str) -> Attachment {
        Attachment {
            id: id.to_string(),
            name: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            size: 5,
            data: "aGVsbG8=".to_string(),
        }
    }

    #[test]
    fn memory_store_enforces_quota() {
        let store = MemoryKeyValueStore::with_quota(16);
        store.set("a", "12345").unwrap();
        let err = store.set("b", "0123456789abcdef").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(store.get("b").unwrap(), None);

        // Overwriting an existing key only counts the difference.
        store.set("a", "1234567890").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1234567890"));
    }

    #[test]
    fn memory_store_can_reject_writes() {
        let store = MemoryKeyValueStore::new();
        store.set_fail_writes(true);
        assert!(matches!(store.set("k", "v"), Err(ChatError::Storage(_))));
        store.set_fail_writes(false);
        store.set("k", "v").unwrap();
    }

    #[test]
    fn file_store_round_trips_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("values.json");

        let store = FileKeyValueStore::open(&path).unwrap();
        store.set(keys::THEME, "\"dark\"").unwrap();
        store.set(keys::TEMPERATURE, "0.7").unwrap();
        store.remove(keys::TEMPERATURE).unwrap();
        drop(store);

        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(keys::THEME).unwrap().as_deref(),
            Some("\"dark\"")
        );
        assert_eq!(reopened.get(keys::TEMPERATURE).unwrap(), None);
    }

    #[test]
    fn file_blob_store_put_get_delete() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path().join("blobs")).unwrap();
        let attachment = sample_attachment("att-1");

        store.put(&attachment).unwrap();
        let loaded = store.get("att-1").unwrap().expect("stored attachment");
        assert_eq!(loaded.name, "notes.txt");
        assert_eq!(loaded.data, "aGVsbG8=");

        store.delete("att-1").unwrap();
        assert!(store.get("att-1").unwrap().is_none());
        // Deleting twice is fine.
        store.delete("att-1").unwrap();
    }

    #[test]
    fn file_blob_store_rejects_path_like_ids() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get("../escape"),
            Err(ChatError::InvalidValue { .. })
        ));
    }
}
