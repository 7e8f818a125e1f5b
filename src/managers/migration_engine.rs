//! Data-level migrations for the persisted tag store blob.
//!
//! A state machine over `(databaseVersion, extensionVersion)` pairs. Each
//! step rebuilds the store into a brand-new object — never in place, so a
//! failed step cannot leave partially-migrated state — and the driver
//! re-enters the engine until the store is at the current schema.
//!
//! Validation failures inside a migration are recovered locally: the
//! offending field is dropped or defaulted with a warning and the record is
//! still migrated. Only an unknown past schema version is a hard error.

use serde_json::{Map, Value};
use tracing::warn;

use crate::types::bookmark::{
    normalize_timestamps, BookmarkRecord, BookmarksStore, WireDeletedMeta, WireMeta, WireRecord,
};
use crate::types::errors::MigrationError;

/// Current data schema version of the persisted store blob.
pub const CURRENT_DATABASE_VERSION: u32 = 3;

/// The one release that shipped corrupted record timestamps. Stores last
/// written by it get a targeted repair pass.
pub const TIMESTAMP_REPAIR_VERSION: &str = "0.13.0";

// One hop per known migration plus the terminal check.
const MAX_MIGRATION_STEPS: usize = 4;

/// Terminal result of running the engine.
#[derive(Debug)]
pub enum MigrationOutcome {
    /// Store is at the current schema and usable.
    Ready(BookmarksStore),
    /// The store was written by a newer build than this one. The caller
    /// must restart so the newer code can reassert itself; this build never
    /// merges backward.
    ReloadRequired { found_version: u32 },
}

enum Step {
    Done(BookmarksStore),
    Again(Value),
    Reload(u32),
}

/// Upgrades a raw loaded store value to the current schema.
///
/// # Errors
/// [`MigrationError::UnsupportedVersion`] when the stored version is older
/// than current with no known migration path; [`MigrationError::InvalidStore`]
/// when the blob has no recognizable store shape.
pub fn migrate(
    raw: Value,
    extension_version: &str,
    now: i64,
) -> Result<MigrationOutcome, MigrationError> {
    let mut current = raw;
    for _ in 0..MAX_MIGRATION_STEPS {
        match step(current, extension_version, now)? {
            Step::Done(store) => return Ok(MigrationOutcome::Ready(store)),
            Step::Reload(found_version) => {
                return Ok(MigrationOutcome::ReloadRequired { found_version })
            }
            Step::Again(next) => current = next,
        }
    }
    Err(MigrationError::InvalidStore(
        "migration did not converge".to_string(),
    ))
}

fn step(raw: Value, extension_version: &str, now: i64) -> Result<Step, MigrationError> {
    let version = detect_version(&raw)?;

    if version > CURRENT_DATABASE_VERSION {
        return Ok(Step::Reload(version));
    }

    match version {
        2 => {
            let store = migrate_v2_to_v3(raw, extension_version, now)?;
            let value = store
                .to_value()
                .map_err(|e| MigrationError::InvalidStore(e.to_string()))?;
            Ok(Step::Again(value))
        }
        CURRENT_DATABASE_VERSION => {
            let store = BookmarksStore::from_value(raw)
                .map_err(|e| MigrationError::InvalidStore(e.to_string()))?;
            if store.meta.extension_version == TIMESTAMP_REPAIR_VERSION {
                let repaired = repair_timestamps(store, extension_version, now);
                let value = repaired
                    .to_value()
                    .map_err(|e| MigrationError::InvalidStore(e.to_string()))?;
                Ok(Step::Again(value))
            } else {
                Ok(Step::Done(store))
            }
        }
        other => Err(MigrationError::UnsupportedVersion(other)),
    }
}

/// Determines the stored schema version.
///
/// Version 2 blobs are a flat URL map with no `meta` wrapper, so a missing
/// `meta` object means version 2.
fn detect_version(raw: &Value) -> Result<u32, MigrationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| MigrationError::InvalidStore("store blob is not an object".to_string()))?;

    match obj.get("meta") {
        None => Ok(2),
        Some(meta) => meta
            .get("databaseVersion")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .ok_or_else(|| {
                MigrationError::InvalidStore("meta.databaseVersion missing or not a number".to_string())
            }),
    }
}

/// V2 → V3: rebuild a fresh store, validating every record.
///
/// Records whose `tags` field is not an array are dropped (the only case a
/// record is lost). Non-string tag entries and ill-typed `title`/
/// `description` fields are dropped field-wise. Timestamps are normalized
/// against `now`. The store-level `created` becomes the minimum normalized
/// `created` across all migrated records.
fn migrate_v2_to_v3(
    raw: Value,
    extension_version: &str,
    now: i64,
) -> Result<BookmarksStore, MigrationError> {
    let obj = match raw {
        Value::Object(obj) => obj,
        _ => return Err(MigrationError::InvalidStore("v2 store is not an object".to_string())),
    };

    let mut store = BookmarksStore::new_empty(CURRENT_DATABASE_VERSION, extension_version, now);
    let mut min_created = now;

    for (url, value) in obj {
        match migrate_v2_record(&url, value, now) {
            Some(record) => {
                min_created = min_created.min(record.meta.created);
                store.data.insert(url, BookmarkRecord::from(record));
            }
            None => warn!(url = %url, "dropping record with invalid tags during v2 migration"),
        }
    }

    store.meta.created = min_created;
    store.meta.updated = now;
    Ok(store)
}

fn migrate_v2_record(url: &str, value: Value, now: i64) -> Option<WireRecord> {
    let obj = value.as_object()?;

    let tags: Vec<String> = match obj.get("tags") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(tag) => Some(tag.clone()),
                other => {
                    warn!(url = %url, ?other, "dropping non-string tag entry");
                    None
                }
            })
            .collect(),
        _ => return None,
    };

    let meta = obj.get("meta").and_then(Value::as_object);
    let title = string_field(meta, "title", url);
    let description = string_field(meta, "description", url);
    let kind = string_field(meta, "type", url);

    let created = meta
        .and_then(|m| m.get("created"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let updated = meta
        .and_then(|m| m.get("updated"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let (created, updated) = normalize_timestamps(created, updated, now);

    let deleted_meta = obj
        .get("deletedMeta")
        .cloned()
        .and_then(|v| serde_json::from_value::<WireDeletedMeta>(v).ok());

    Some(WireRecord {
        tags,
        meta: WireMeta {
            title,
            description,
            kind,
            created,
            updated,
            updated2: None,
        },
        deleted_meta,
    })
}

/// Reads an optional string field, dropping ill-typed values with a warning.
fn string_field(meta: Option<&Map<String, Value>>, field: &str, url: &str) -> Option<String> {
    match meta?.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            warn!(url = %url, field, ?other, "dropping ill-typed meta field");
            None
        }
    }
}

/// Targeted repair for stores last written by [`TIMESTAMP_REPAIR_VERSION`]:
/// re-normalizes every record's timestamps with the same min/max rule,
/// preserving the store-level `created`.
fn repair_timestamps(store: BookmarksStore, extension_version: &str, now: i64) -> BookmarksStore {
    let mut repaired = BookmarksStore::new_empty(CURRENT_DATABASE_VERSION, extension_version, now);
    repaired.meta.created = store.meta.created;
    repaired.meta.updated = now;

    for (url, mut record) in store.data {
        let (created, updated) = normalize_timestamps(record.meta.created, record.meta.updated, now);
        record.meta.created = created;
        record.meta.updated = updated;
        repaired.data.insert(url, record);
    }

    repaired
}
