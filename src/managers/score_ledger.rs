//! Usage ledger for ranked tag suggestions.
//!
//! An append-only log of tag-usage events, coarsely bounded, from which two
//! persisted lists are derived after every append: "most used" and
//! "recently added". Readers consume the derived lists directly and never
//! recompute them.
//!
//! Scoring is a deliberate approximation, not exponential decay: the per-use
//! score `floor(now_seconds / SCORE_SCALE_SECONDS)` changes only on a
//! multi-decade timescale, so repeated use accumulates additively and
//! frequency dominates while recency acts as a very coarse tie-breaker.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::database::Storage;
use crate::types::errors::StoreError;

/// Storage key of the raw usage ledger.
pub const RECENT_TAGS_KEY: &str = "extension.utags.recenttags";

/// Storage key of the derived most-used list.
pub const MOST_USED_TAGS_KEY: &str = "extension.utags.mostusedtags";

/// Storage key of the derived recently-added list.
pub const RECENT_ADDED_TAGS_KEY: &str = "extension.utags.recentaddedtags";

/// Ledger cap; exceeding it drops the oldest [`PRUNE_BATCH`] entries.
/// A coarse-grained ring, not strict LRU.
pub const MAX_LEDGER_ENTRIES: usize = 1000;

/// Number of oldest entries dropped when the ledger overflows.
pub const PRUNE_BATCH: usize = 100;

/// Cap of both derived lists.
pub const DERIVED_LIST_CAP: usize = 200;

/// Seconds scale of the raw score. Tuning constant with no deeper
/// rationale; kept configurable rather than treated as an invariant.
pub const SCORE_SCALE_SECONDS: f64 = 1e9;

/// Weight of the most-used inclusion threshold. Tuning constant.
pub const MOST_USED_WEIGHT: f64 = 1.5;

/// One usage event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub tag: String,
    pub score: f64,
}

/// Append log of tag-usage events with persisted derived rankings.
///
/// Holds no independent copy of any data: every read and write goes
/// through [`Storage`].
pub struct ScoreLedger {
    storage: Arc<Storage>,
}

impl ScoreLedger {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Records usage of the tags in `new_tags` that are not in `old_tags`.
    ///
    /// With `old_tags` absent, every non-empty entry of `new_tags` counts.
    /// No-ops on an empty difference. Tags that already existed on the
    /// record are not re-scored.
    pub fn add_recent_tags(
        &self,
        new_tags: &[String],
        old_tags: Option<&[String]>,
    ) -> Result<(), StoreError> {
        let unique: Vec<&String> = match old_tags {
            Some(old) => new_tags
                .iter()
                .filter(|tag| !tag.is_empty() && !old.contains(tag))
                .collect(),
            None => new_tags.iter().filter(|tag| !tag.is_empty()).collect(),
        };
        if unique.is_empty() {
            return Ok(());
        }

        let mut entries = self.load_entries()?;
        let score = scaled_score(1.0);
        for tag in unique {
            entries.push(ScoreEntry {
                tag: tag.clone(),
                score,
            });
        }
        if entries.len() > MAX_LEDGER_ENTRIES {
            entries.drain(..PRUNE_BATCH);
        }

        self.storage
            .set(RECENT_TAGS_KEY, &serde_json::to_string(&entries)?)?;
        self.recompute_derived(&entries)
    }

    /// The persisted most-used list, highest summed score first.
    pub fn most_used_tags(&self) -> Result<Vec<String>, StoreError> {
        self.load_list(MOST_USED_TAGS_KEY)
    }

    /// The persisted recently-added list, most recent use first.
    pub fn recently_added_tags(&self) -> Result<Vec<String>, StoreError> {
        self.load_list(RECENT_ADDED_TAGS_KEY)
    }

    fn load_entries(&self) -> Result<Vec<ScoreEntry>, StoreError> {
        match self.storage.get(RECENT_TAGS_KEY)? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    fn load_list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.storage.get(key)? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    /// Recomputes both derived lists from the entire ledger and persists
    /// them. Not incremental: the ledger is small enough that a full pass
    /// per append is cheaper than keeping the lists consistent piecemeal.
    fn recompute_derived(&self, entries: &[ScoreEntry]) -> Result<(), StoreError> {
        // Most used: sum per tag in first-seen order, keep tags above the
        // threshold, sort by summed score descending (stable, so ties keep
        // first-seen order).
        let mut totals: HashMap<&str, f64> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for entry in entries {
            if !totals.contains_key(entry.tag.as_str()) {
                order.push(&entry.tag);
            }
            *totals.entry(&entry.tag).or_insert(0.0) += entry.score;
        }
        let threshold = scaled_score(MOST_USED_WEIGHT);
        let mut ranked: Vec<(&str, f64)> = order
            .into_iter()
            .map(|tag| (tag, totals[tag]))
            .filter(|(_, score)| *score > threshold)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(DERIVED_LIST_CAP);
        let most_used: Vec<&str> = ranked.into_iter().map(|(tag, _)| tag).collect();

        // Recently added: newest first, deduplicated so the last use of a
        // tag determines its position.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut recent: Vec<&str> = Vec::new();
        for entry in entries.iter().rev() {
            if seen.insert(&entry.tag) {
                recent.push(&entry.tag);
                if recent.len() == DERIVED_LIST_CAP {
                    break;
                }
            }
        }

        self.storage
            .set(MOST_USED_TAGS_KEY, &serde_json::to_string(&most_used)?)?;
        self.storage
            .set(RECENT_ADDED_TAGS_KEY, &serde_json::to_string(&recent)?)?;
        Ok(())
    }
}

/// Raw score scaled by `weight` at the current wall clock.
fn scaled_score(weight: f64) -> f64 {
    let now_seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as f64;
    (now_seconds / SCORE_SCALE_SECONDS).floor() * weight
}
