//! The bookmark store: load, migrate, cache, and save the persisted tag map.
//!
//! Owns all persisted tag state exclusively. Reads for consumers come from
//! an in-process cache holding the tombstone-filtered view of the last
//! loaded store; the cache is rebuilt whenever persisted state changes,
//! including changes observed from another browsing context through the
//! storage change listener.
//!
//! Every write rewrites the entire store blob (no partial-field
//! persistence); the whole read-modify-write sequence runs under one save
//! lock so in-process writes are totally ordered.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::database::Storage;
use crate::managers::migration_engine::{self, MigrationOutcome, CURRENT_DATABASE_VERSION};
use crate::managers::update_serializer::UpdateSerializer;
use crate::types::bookmark::{
    normalize_timestamps, BookmarkEntry, BookmarkRecord, BookmarksStore, RecordMeta, RecordState,
};
use crate::types::errors::StoreError;

/// Storage key of the whole persisted store blob.
pub const URL_MAP_KEY: &str = "extension.utags.urlmap";

/// Callback fired after persisted tag state changes from any source,
/// including other browsing contexts.
pub type TagsChangeListener = Box<dyn Fn() + Send + Sync>;

/// Splits a comma-separated tag string into a clean tag list: trimmed,
/// blanks dropped, duplicates removed, order preserved, case-sensitive.
pub fn split_tags(input: &str) -> Vec<String> {
    normalize_tags(input.split(',').map(str::trim))
}

/// Deduplicates and cleans an already-split tag list.
pub fn normalize_tag_list(tags: &[String]) -> Vec<String> {
    normalize_tags(tags.iter().map(|tag| tag.trim()))
}

fn normalize_tags<'a>(tags: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if tag.is_empty() || out.iter().any(|seen| seen == tag) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

/// Store keys must be well-formed http(s) URLs; anything else is cleaned up
/// rather than saved.
pub fn is_valid_key(key: &str) -> bool {
    key.strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .map(|rest| !rest.is_empty())
        .unwrap_or(false)
}

/// Persistent tag store over [`Storage`].
pub struct BookmarkStore {
    storage: Arc<Storage>,
    serializer: Arc<UpdateSerializer>,
    extension_version: String,
    cache: Arc<Mutex<BTreeMap<String, BookmarkRecord>>>,
    tag_listeners: Arc<Mutex<Vec<TagsChangeListener>>>,
    save_lock: Mutex<()>,
    listener_armed: AtomicBool,
}

impl BookmarkStore {
    /// Opens the store: loads the persisted blob, migrates it to the
    /// current schema if behind, persists the migrated form, fills the
    /// cache, and arms the storage change listener exactly once.
    ///
    /// # Errors
    /// [`StoreError::NewerSchema`] if the blob was written by a newer
    /// build; [`StoreError::Migration`] for unknown past schemas.
    pub fn open(
        storage: Arc<Storage>,
        serializer: Arc<UpdateSerializer>,
        extension_version: &str,
    ) -> Result<Self, StoreError> {
        let store = Self {
            storage,
            serializer,
            extension_version: extension_version.to_string(),
            cache: Arc::new(Mutex::new(BTreeMap::new())),
            tag_listeners: Arc::new(Mutex::new(Vec::new())),
            save_lock: Mutex::new(()),
            listener_armed: AtomicBool::new(false),
        };

        match store.storage.get(URL_MAP_KEY)? {
            None => {
                let empty = BookmarksStore::new_empty(
                    CURRENT_DATABASE_VERSION,
                    extension_version,
                    now_ms(),
                );
                store.storage.set(URL_MAP_KEY, &empty.to_json()?)?;
            }
            Some(blob) => {
                let raw: serde_json::Value = serde_json::from_str(&blob)?;
                match migration_engine::migrate(raw, extension_version, now_ms())? {
                    MigrationOutcome::Ready(migrated) => {
                        let fresh = migrated.to_json()?;
                        if fresh != blob {
                            debug!(
                                version = migrated.meta.database_version,
                                "persisting migrated store"
                            );
                            store.storage.set(URL_MAP_KEY, &fresh)?;
                        }
                    }
                    MigrationOutcome::ReloadRequired { found_version } => {
                        return Err(StoreError::NewerSchema(found_version));
                    }
                }
            }
        }

        store.refresh_cache()?;
        store.arm_change_listener();
        Ok(store)
    }

    /// Registers the storage change listener. Idempotent: guarded so a
    /// second call never arms a second listener.
    fn arm_change_listener(&self) {
        if self
            .listener_armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let storage = Arc::downgrade(&self.storage);
        let cache = Arc::clone(&self.cache);
        let tag_listeners = Arc::clone(&self.tag_listeners);
        self.storage.add_change_listener(Box::new(move |key| {
            if key != URL_MAP_KEY {
                return;
            }
            let Some(storage) = storage.upgrade() else {
                return;
            };
            match reload_filtered(&storage) {
                Ok(filtered) => {
                    if let Ok(mut cache) = cache.lock() {
                        *cache = filtered;
                    }
                }
                Err(err) => warn!(error = %err, "cache reload after storage change failed"),
            }
            if let Ok(listeners) = tag_listeners.lock() {
                for listener in listeners.iter() {
                    listener();
                }
            }
        }));
    }

    /// Synchronous cache-only read. Absent keys return a zeroed entry, so
    /// callers never branch on existence.
    pub fn get_bookmark(&self, key: &str) -> BookmarkEntry {
        let Ok(cache) = self.cache.lock() else {
            return BookmarkEntry::default();
        };
        match cache.get(key) {
            Some(record) => BookmarkEntry {
                tags: record.tags().to_vec(),
                meta: record.meta.clone(),
            },
            None => BookmarkEntry::default(),
        }
    }

    /// Saves tags for `key`.
    ///
    /// Non-http(s) keys are removed from the store (cleanup, not an
    /// error). An empty cleaned tag list tombstones the record, once. A
    /// non-empty list upserts, preserving `created` through the
    /// normalization rule and letting a non-blank caller title win. Newly
    /// added tags (set difference against the previous list) feed the
    /// usage ledger.
    pub fn save_bookmark(
        &self,
        key: &str,
        tags: &[String],
        meta: Option<RecordMeta>,
    ) -> Result<(), StoreError> {
        let _guard = self
            .save_lock
            .lock()
            .map_err(|_| StoreError::Storage("save lock poisoned".to_string()))?;
        let now = now_ms();

        if !is_valid_key(key) {
            let mut store = self.load_store()?;
            if store.data.remove(key).is_some() {
                debug!(key, "removed entry with invalid key");
                self.stamp(&mut store, now);
                self.persist(&store)?;
            }
            return Ok(());
        }

        let tags = normalize_tag_list(tags);
        let mut store = self.load_store()?;
        let existing = store.data.get(key);
        let old_tags: Vec<String> = existing.map(|r| r.tags().to_vec()).unwrap_or_default();

        if tags.is_empty() {
            // Tombstone, idempotently: a second empty save changes nothing.
            match existing {
                Some(record) if !record.is_deleted() => {
                    let mut record = record.clone();
                    record.state = RecordState::Deleted {
                        at: now,
                        previous_tags: old_tags,
                    };
                    record.meta.updated = now;
                    store.data.insert(key.to_string(), record);
                    self.stamp(&mut store, now);
                    self.persist(&store)?;
                }
                _ => {}
            }
            return Ok(());
        }

        let supplied = meta.unwrap_or_default();
        let (created, _) = match existing {
            Some(record) => normalize_timestamps(record.meta.created, record.meta.updated, now),
            None => (now, now),
        };
        let title = match supplied.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Some(t.to_string()),
            _ => existing.and_then(|r| r.meta.title.clone()),
        };
        let description = supplied
            .description
            .or_else(|| existing.and_then(|r| r.meta.description.clone()));
        let kind = supplied
            .kind
            .or_else(|| existing.and_then(|r| r.meta.kind.clone()));

        let record = BookmarkRecord {
            state: RecordState::Active(tags.clone()),
            meta: RecordMeta {
                title,
                description,
                kind,
                created,
                updated: now,
                updated2: Some(now),
            },
        };
        store.data.insert(key.to_string(), record);
        self.stamp(&mut store, now);
        self.persist(&store)?;

        // Tags already on the record are not re-scored; the ledger takes
        // the set difference itself.
        self.serializer.submit(tags, Some(old_tags));
        Ok(())
    }

    /// Full map read from persistence, tombstones included.
    pub fn get_url_map(&self) -> Result<BTreeMap<String, BookmarkRecord>, StoreError> {
        Ok(self.load_store()?.data)
    }

    /// Full map read from the cache (tombstone-filtered), no persistence touch.
    pub fn get_cached_url_map(&self) -> BTreeMap<String, BookmarkRecord> {
        self.cache.lock().map(|cache| cache.clone()).unwrap_or_default()
    }

    /// Exports the whole store as an opaque JSON blob.
    pub fn serialize_bookmarks(&self) -> Result<String, StoreError> {
        Ok(self.load_store()?.to_json()?)
    }

    /// Imports a whole-store blob, replacing persisted state. Older
    /// exported blobs are accepted and migrated on the way in.
    pub fn deserialize_bookmarks(&self, blob: &str) -> Result<(), StoreError> {
        let _guard = self
            .save_lock
            .lock()
            .map_err(|_| StoreError::Storage("save lock poisoned".to_string()))?;
        let raw: serde_json::Value =
            serde_json::from_str(blob).map_err(|e| StoreError::Serialization(e.to_string()))?;
        match migration_engine::migrate(raw, &self.extension_version, now_ms())? {
            MigrationOutcome::Ready(mut store) => {
                self.stamp(&mut store, now_ms());
                self.persist(&store)
            }
            MigrationOutcome::ReloadRequired { found_version } => {
                Err(StoreError::NewerSchema(found_version))
            }
        }
    }

    /// Registers a callback fired after any persisted tag change, local or
    /// external. Callbacks run on the mutating thread and must not write
    /// back into the store.
    pub fn add_tags_value_change_listener(&self, listener: TagsChangeListener) {
        if let Ok(mut listeners) = self.tag_listeners.lock() {
            listeners.push(listener);
        }
    }

    /// Drops and rebuilds the cache from persisted state.
    pub fn invalidate_cache(&self) {
        if let Err(err) = self.refresh_cache() {
            warn!(error = %err, "cache refresh failed, clearing");
            if let Ok(mut cache) = self.cache.lock() {
                cache.clear();
            }
        }
    }

    pub fn extension_version(&self) -> &str {
        &self.extension_version
    }

    fn load_store(&self) -> Result<BookmarksStore, StoreError> {
        match self.storage.get(URL_MAP_KEY)? {
            Some(blob) => Ok(BookmarksStore::from_json(&blob)?),
            None => Ok(BookmarksStore::new_empty(
                CURRENT_DATABASE_VERSION,
                &self.extension_version,
                now_ms(),
            )),
        }
    }

    /// Store-level signature: every mutating save marks which code version
    /// touched the store.
    fn stamp(&self, store: &mut BookmarksStore, now: i64) {
        store.meta.updated = now;
        store.meta.database_version = CURRENT_DATABASE_VERSION;
        store.meta.extension_version = self.extension_version.clone();
    }

    fn persist(&self, store: &BookmarksStore) -> Result<(), StoreError> {
        // The storage change listener rebuilds the cache and fires tag
        // listeners as part of this set().
        self.storage.set(URL_MAP_KEY, &store.to_json()?)?;
        Ok(())
    }

    fn refresh_cache(&self) -> Result<(), StoreError> {
        let filtered = reload_filtered(&self.storage)?;
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| StoreError::Storage("cache mutex poisoned".to_string()))?;
        *cache = filtered;
        Ok(())
    }
}

fn reload_filtered(storage: &Storage) -> Result<BTreeMap<String, BookmarkRecord>, StoreError> {
    match storage.get(URL_MAP_KEY)? {
        Some(blob) => Ok(BookmarksStore::from_json(&blob)?.filter_deleted()),
        None => Ok(BTreeMap::new()),
    }
}

/// Current wall clock in epoch milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
