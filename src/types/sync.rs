//! Wire types for the webapp sync bridge.
//!
//! The envelope mirrors the `postMessage` protocol spoken by the companion
//! web application. Internally the version token is numeric; the `"v<int>"`
//! string form exists only on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope `source` value for messages sent by the web application.
pub const SOURCE_WEBAPP: &str = "utags-webapp";

/// Envelope `source` value for messages sent by this extension.
pub const SOURCE_EXTENSION: &str = "utags-extension";

/// Wildcard target accepted by every extension instance.
pub const TARGET_ANY: &str = "*";

/// Enumerated message types. Unknown strings fail envelope parsing, which
/// the adapter treats as "silently ignore".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "DISCOVER_UTAGS_TARGETS")]
    DiscoverTargets,
    #[serde(rename = "DISCOVERY_RESPONSE")]
    DiscoveryResponse,
    #[serde(rename = "GET_AUTH_STATUS")]
    GetAuthStatus,
    #[serde(rename = "GET_REMOTE_METADATA")]
    GetRemoteMetadata,
    #[serde(rename = "DOWNLOAD_DATA")]
    DownloadData,
    #[serde(rename = "UPLOAD_DATA")]
    UploadData,
}

/// Optimistic-concurrency token for the store: compared for equality only,
/// never used for ordering beyond "versions differ".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    #[serde(with = "version_token")]
    pub version: u64,
    pub timestamp: i64,
}

/// Encodes the numeric version as the wire's `"v<int>"` token.
mod version_token {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("v{}", version))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let token = String::deserialize(deserializer)?;
        token
            .strip_prefix('v')
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| de::Error::custom(format!("invalid version token: {}", token)))
    }
}

/// The message envelope, both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub id: String,
    #[serde(
        rename = "targetExtensionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_extension_id: Option<String>,
    #[serde(rename = "extensionId", default, skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
