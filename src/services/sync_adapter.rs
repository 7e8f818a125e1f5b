//! Message-passing bridge between the tag store and the companion webapp.
//!
//! A small RPC server over the `postMessage`-shaped envelope in
//! [`crate::types::sync`]. Requests failing validation are silently
//! ignored (no response at all); requests failing during handling get an
//! error response. Uploads are guarded by optimistic concurrency: a
//! caller-supplied expected version token is compared against the stored
//! one and mismatches are rejected with no write.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::database::Storage;
use crate::managers::bookmark_store::{now_ms, BookmarkStore};
use crate::services::availability::AvailabilityProbe;
use crate::types::errors::{StoreError, SyncError};
use crate::types::sync::{
    MessageType, SyncMessage, SyncMetadata, SOURCE_EXTENSION, SOURCE_WEBAPP, TARGET_ANY,
};

/// Storage key of the current sync version token.
pub const SYNC_METADATA_KEY: &str = "extension.utags.sync.metadata";

/// Storage key of the persisted extension instance id.
pub const EXTENSION_ID_KEY: &str = "extension.utags.sync.extensionid";

/// Name reported in discovery responses.
pub const EXTENSION_NAME: &str = "utags-store";

/// Where a message arrived from, as observed by the receiving page.
pub struct MessageContext {
    /// Origin of the sending window.
    pub origin: String,
    /// Hostname of the page this adapter runs on.
    pub hostname: String,
    /// Whether the sender left a postable reply channel.
    pub can_reply: bool,
}

/// RPC endpoint serving discovery, metadata, download, and conflict-checked
/// upload to the external web application.
pub struct SyncAdapter {
    store: Arc<BookmarkStore>,
    storage: Arc<Storage>,
    probe: Box<dyn AvailabilityProbe>,
    own_origin: String,
    allowed_hosts: Vec<String>,
    extension_id: String,
}

impl SyncAdapter {
    /// Creates the adapter, loading or generating the persisted extension
    /// instance id. The id is a uuid minted once and reused for the
    /// adapter's lifetime so a webapp juggling several extension instances
    /// can address a specific one.
    pub fn new(
        store: Arc<BookmarkStore>,
        storage: Arc<Storage>,
        probe: Box<dyn AvailabilityProbe>,
        own_origin: &str,
        allowed_hosts: Vec<String>,
    ) -> Result<Self, StoreError> {
        let extension_id = match storage.get(EXTENSION_ID_KEY)? {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = Uuid::new_v4().to_string();
                storage.set(EXTENSION_ID_KEY, &id)?;
                id
            }
        };
        Ok(Self {
            store,
            storage,
            probe,
            own_origin: own_origin.to_string(),
            allowed_hosts,
            extension_id,
        })
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// Handles one incoming message. Returns `None` when the message fails
    /// validation and must be ignored without any response.
    pub fn handle_message(&self, ctx: &MessageContext, raw: &Value) -> Option<SyncMessage> {
        if ctx.origin != self.own_origin || !ctx.can_reply || !self.host_allowed(&ctx.hostname) {
            return None;
        }

        // Unknown message types fail envelope parsing and are ignored too.
        let msg: SyncMessage = serde_json::from_value(raw.clone()).ok()?;
        if msg.source != SOURCE_WEBAPP || msg.id.is_empty() {
            return None;
        }
        match msg.target_extension_id.as_deref() {
            Some(TARGET_ANY) => {}
            Some(target) if target == self.extension_id => {}
            _ => return None,
        }

        debug!(kind = ?msg.kind, id = %msg.id, "sync message accepted");
        Some(self.dispatch(&msg))
    }

    fn dispatch(&self, msg: &SyncMessage) -> SyncMessage {
        match msg.kind {
            MessageType::Ping => self.reply(msg, msg.kind, Ok(json!({"status": "PONG"}))),
            MessageType::DiscoverTargets => self.reply(
                msg,
                MessageType::DiscoveryResponse,
                Ok(json!({
                    "extensionId": self.extension_id,
                    "extensionName": EXTENSION_NAME,
                })),
            ),
            // Everything below needs a reachable host environment.
            _ if !self.probe.is_available() => {
                self.reply(msg, msg.kind, Err(SyncError::HostUnavailable))
            }
            MessageType::GetAuthStatus => {
                self.reply(msg, msg.kind, Ok(json!({"status": "authenticated"})))
            }
            MessageType::GetRemoteMetadata => {
                let result = self.remote_metadata().map(|meta| match meta {
                    Some(meta) => json!({ "metadata": meta }),
                    None => json!({}),
                });
                self.reply(msg, msg.kind, result)
            }
            MessageType::DownloadData => {
                let result = (|| {
                    let data = self.store.serialize_bookmarks().map_err(SyncError::from)?;
                    let remote = self.remote_metadata()?;
                    Ok(match remote {
                        Some(meta) => json!({ "data": data, "remoteMeta": meta }),
                        None => json!({ "data": data }),
                    })
                })();
                self.reply(msg, msg.kind, result)
            }
            MessageType::UploadData => {
                let result = self
                    .apply_upload(msg.payload.as_ref())
                    .map(|meta| json!({ "metadata": meta }));
                self.reply(msg, msg.kind, result)
            }
            // Response type arriving as a request: nothing to do.
            MessageType::DiscoveryResponse => self.reply(
                msg,
                msg.kind,
                Err(SyncError::InvalidPayload("not a request type".to_string())),
            ),
        }
    }

    /// Applies an upload with compare-and-swap semantics over the
    /// `(version, timestamp)` token.
    ///
    /// On acceptance the store data and the new metadata are persisted as
    /// two sequential writes, data first. This is knowingly non-atomic: a
    /// crash between the writes leaves data updated with stale metadata.
    fn apply_upload(&self, payload: Option<&Value>) -> Result<SyncMetadata, SyncError> {
        let payload = payload
            .and_then(Value::as_object)
            .ok_or_else(|| SyncError::InvalidPayload("missing payload".to_string()))?;
        let data = payload
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::InvalidPayload("payload.data must be a string".to_string()))?;
        let expected: Option<SyncMetadata> = match payload.get("metadata") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value(value.clone())
                    .map_err(|e| SyncError::InvalidPayload(e.to_string()))?,
            ),
        };

        let remote = self.remote_metadata()?;
        match (&expected, &remote) {
            (Some(e), Some(r)) if e != r => {
                return Err(SyncError::Conflict(
                    "expected metadata does not match remote".to_string(),
                ))
            }
            (Some(_), None) => {
                return Err(SyncError::Conflict(
                    "expected remote metadata but none found".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(SyncError::Conflict(
                    "concurrent modification suspected".to_string(),
                ))
            }
            _ => {}
        }

        self.store.deserialize_bookmarks(data)?;
        let next = SyncMetadata {
            version: remote.map(|r| r.version + 1).unwrap_or(1),
            timestamp: now_ms(),
        };
        let encoded =
            serde_json::to_string(&next).map_err(|e| SyncError::Store(e.to_string()))?;
        self.storage
            .set(SYNC_METADATA_KEY, &encoded)
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(next)
    }

    /// The stored sync token, absent until the first accepted upload.
    pub fn remote_metadata(&self) -> Result<Option<SyncMetadata>, SyncError> {
        match self
            .storage
            .get(SYNC_METADATA_KEY)
            .map_err(|e| SyncError::Store(e.to_string()))?
        {
            Some(blob) => serde_json::from_str(&blob)
                .map(Some)
                .map_err(|e| SyncError::Store(e.to_string())),
            None => Ok(None),
        }
    }

    fn reply(
        &self,
        msg: &SyncMessage,
        kind: MessageType,
        result: Result<Value, SyncError>,
    ) -> SyncMessage {
        let (payload, error) = match result {
            Ok(payload) => (Some(payload), None),
            Err(err) => (None, Some(err.to_string())),
        };
        SyncMessage {
            source: SOURCE_EXTENSION.to_string(),
            kind,
            id: msg.id.clone(),
            target_extension_id: None,
            extension_id: Some(self.extension_id.clone()),
            payload,
            error,
        }
    }

    /// Operator-controlled allowlist: exact hostnames or `*.suffix`
    /// wildcard patterns.
    fn host_allowed(&self, hostname: &str) -> bool {
        self.allowed_hosts.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                hostname == suffix || hostname.ends_with(&pattern[1..])
            } else {
                pattern == hostname
            }
        })
    }
}
