//! Record and store types for the tag store, plus timestamp normalization.
//!
//! Domain types keep deletion as a tagged variant ([`RecordState`]); the
//! persisted format's sentinel-tag encoding is restored only at the wire
//! boundary by [`WireRecord`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sentinel tag appended to a record's persisted tag list when it is
/// tombstoned. Never present in domain-level tag lists.
pub const DELETED_TAG: &str = "._DELETED_";

/// Lower bound (exclusive) of the valid timestamp range, epoch ms (~1990).
pub const MIN_VALID_TIMESTAMP: i64 = 631_152_000_000;

/// Upper bound (exclusive) of the valid timestamp range, epoch ms.
pub const MAX_VALID_TIMESTAMP: i64 = 9_999_999_999_999;

/// Returns true if `ts` lies strictly inside the valid timestamp range.
pub fn is_valid_timestamp(ts: i64) -> bool {
    ts > MIN_VALID_TIMESTAMP && ts < MAX_VALID_TIMESTAMP
}

/// Normalizes a `(created, updated)` pair against the valid range.
///
/// Invalid or missing (zero) values are replaced from the valid member of
/// the pair; if neither is valid both fall back to `default`. The result
/// always satisfies `created <= updated`.
pub fn normalize_timestamps(created: i64, updated: i64, default: i64) -> (i64, i64) {
    match (is_valid_timestamp(created), is_valid_timestamp(updated)) {
        (true, true) => (created.min(updated), created.max(updated)),
        (true, false) => (created, created),
        (false, true) => (updated, updated),
        (false, false) => (default, default),
    }
}

/// Per-record metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Resource type hint ("type" on the wire).
    pub kind: Option<String>,
    pub created: i64,
    pub updated: i64,
    pub updated2: Option<i64>,
}

/// Whether a record is live or tombstoned.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState {
    /// Live record with its deduplicated tag list.
    Active(Vec<String>),
    /// Tombstoned record. The tag list at deletion time is retained so a
    /// sync peer can distinguish "deleted after X" from "never existed".
    Deleted { at: i64, previous_tags: Vec<String> },
}

/// One tagged URL.
#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkRecord {
    pub state: RecordState,
    pub meta: RecordMeta,
}

impl BookmarkRecord {
    pub fn is_deleted(&self) -> bool {
        matches!(self.state, RecordState::Deleted { .. })
    }

    /// Tags of a live record; empty for tombstones.
    pub fn tags(&self) -> &[String] {
        match &self.state {
            RecordState::Active(tags) => tags,
            RecordState::Deleted { .. } => &[],
        }
    }
}

/// Store-level metadata. Field names match the persisted JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    #[serde(rename = "databaseVersion")]
    pub database_version: u32,
    #[serde(rename = "extensionVersion")]
    pub extension_version: String,
    pub created: i64,
    pub updated: i64,
}

/// The whole persisted unit: one map of URL to record, plus store metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BookmarksStore {
    pub data: BTreeMap<String, BookmarkRecord>,
    pub meta: StoreMeta,
}

impl BookmarksStore {
    /// Creates an empty store at the given schema version.
    pub fn new_empty(database_version: u32, extension_version: &str, now: i64) -> Self {
        Self {
            data: BTreeMap::new(),
            meta: StoreMeta {
                database_version,
                extension_version: extension_version.to_string(),
                created: now,
                updated: now,
            },
        }
    }

    /// The tombstone-filtered view served to consumers.
    pub fn filter_deleted(&self) -> BTreeMap<String, BookmarkRecord> {
        self.data
            .iter()
            .filter(|(_, record)| !record.is_deleted())
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    /// Serializes to the persisted JSON shape.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireStore::from(self))
    }

    /// Parses the persisted JSON shape. The blob must already be at the
    /// current schema (older blobs go through the migration engine first).
    pub fn from_json(blob: &str) -> Result<Self, serde_json::Error> {
        let wire: WireStore = serde_json::from_str(blob)?;
        Ok(wire.into())
    }

    /// Converts to a loose JSON value in the persisted shape.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(WireStore::from(self))
    }

    /// Parses a loose JSON value already at the current schema.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let wire: WireStore = serde_json::from_value(value)?;
        Ok(wire.into())
    }
}

// === Wire shapes ===

/// Record metadata as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated2: Option<i64>,
}

/// Deletion marker as persisted alongside the sentinel tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDeletedMeta {
    pub deleted: i64,
    #[serde(rename = "actionType")]
    pub action_type: String,
}

/// Record as persisted: tombstones carry the [`DELETED_TAG`] sentinel at the
/// end of the tag list plus a `deletedMeta` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRecord {
    pub tags: Vec<String>,
    pub meta: WireMeta,
    #[serde(rename = "deletedMeta", default, skip_serializing_if = "Option::is_none")]
    pub deleted_meta: Option<WireDeletedMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireStore {
    data: BTreeMap<String, WireRecord>,
    meta: StoreMeta,
}

impl From<&BookmarkRecord> for WireRecord {
    fn from(record: &BookmarkRecord) -> Self {
        let meta = WireMeta {
            title: record.meta.title.clone(),
            description: record.meta.description.clone(),
            kind: record.meta.kind.clone(),
            created: record.meta.created,
            updated: record.meta.updated,
            updated2: record.meta.updated2,
        };
        match &record.state {
            RecordState::Active(tags) => Self {
                tags: tags.clone(),
                meta,
                deleted_meta: None,
            },
            RecordState::Deleted { at, previous_tags } => {
                let mut tags = previous_tags.clone();
                tags.push(DELETED_TAG.to_string());
                Self {
                    tags,
                    meta,
                    deleted_meta: Some(WireDeletedMeta {
                        deleted: *at,
                        action_type: "DELETE".to_string(),
                    }),
                }
            }
        }
    }
}

impl From<WireRecord> for BookmarkRecord {
    fn from(wire: WireRecord) -> Self {
        let meta = RecordMeta {
            title: wire.meta.title,
            description: wire.meta.description,
            kind: wire.meta.kind,
            created: wire.meta.created,
            updated: wire.meta.updated,
            updated2: wire.meta.updated2,
        };
        let tombstoned = wire.deleted_meta.is_some() || wire.tags.iter().any(|t| t == DELETED_TAG);
        let state = if tombstoned {
            let at = wire.deleted_meta.map(|d| d.deleted).unwrap_or(meta.updated);
            let previous_tags = wire
                .tags
                .into_iter()
                .filter(|t| t != DELETED_TAG)
                .collect();
            RecordState::Deleted { at, previous_tags }
        } else {
            RecordState::Active(wire.tags)
        };
        Self { state, meta }
    }
}

impl From<&BookmarksStore> for WireStore {
    fn from(store: &BookmarksStore) -> Self {
        Self {
            data: store
                .data
                .iter()
                .map(|(key, record)| (key.clone(), WireRecord::from(record)))
                .collect(),
            meta: store.meta.clone(),
        }
    }
}

impl From<WireStore> for BookmarksStore {
    fn from(wire: WireStore) -> Self {
        Self {
            data: wire
                .data
                .into_iter()
                .map(|(key, record)| (key, BookmarkRecord::from(record)))
                .collect(),
            meta: wire.meta,
        }
    }
}

/// Read result of `get_bookmark`: always materialized, never null.
///
/// Absent keys yield an empty tag list and zeroed timestamps so callers
/// never branch on existence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookmarkEntry {
    pub tags: Vec<String>,
    pub meta: RecordMeta,
}
