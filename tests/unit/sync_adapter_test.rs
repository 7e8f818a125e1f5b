//! Unit tests for the sync bridge: envelope validation, discovery,
//! availability gating, and conflict-checked uploads.

use std::sync::Arc;

use rstest::rstest;
use serde_json::{json, Value};
use utags_store::database::Storage;
use utags_store::managers::bookmark_store::BookmarkStore;
use utags_store::managers::score_ledger::ScoreLedger;
use utags_store::managers::update_serializer::UpdateSerializer;
use utags_store::services::availability::AvailabilityProbe;
use utags_store::services::sync_adapter::{
    MessageContext, SyncAdapter, EXTENSION_NAME, SYNC_METADATA_KEY,
};
use utags_store::types::sync::{MessageType, SyncMetadata};

const ORIGIN: &str = "https://utags.example.com";
const HOST: &str = "utags.example.com";

struct StubProbe(bool);

impl AvailabilityProbe for StubProbe {
    fn is_available(&self) -> bool {
        self.0
    }
}

fn setup(available: bool) -> (Arc<Storage>, SyncAdapter) {
    let storage = Arc::new(Storage::open_in_memory().expect("open failed"));
    let ledger = Arc::new(ScoreLedger::new(Arc::clone(&storage)));
    let serializer = Arc::new(UpdateSerializer::new(ledger));
    let store = Arc::new(
        BookmarkStore::open(Arc::clone(&storage), serializer, "0.14.0")
            .expect("store open failed"),
    );
    let adapter = SyncAdapter::new(
        store,
        Arc::clone(&storage),
        Box::new(StubProbe(available)),
        ORIGIN,
        vec![HOST.to_string()],
    )
    .expect("adapter init failed");
    (storage, adapter)
}

fn ctx() -> MessageContext {
    MessageContext {
        origin: ORIGIN.to_string(),
        hostname: HOST.to_string(),
        can_reply: true,
    }
}

fn request(kind: &str, id: &str, payload: Option<Value>) -> Value {
    let mut msg = json!({
        "source": "utags-webapp",
        "type": kind,
        "id": id,
        "targetExtensionId": "*",
    });
    if let Some(payload) = payload {
        msg["payload"] = payload;
    }
    msg
}

// ─── Validation ───

#[test]
fn test_ping_gets_pong_without_availability() {
    let (_storage, adapter) = setup(false);
    let reply = adapter
        .handle_message(&ctx(), &request("PING", "m1", None))
        .expect("ping must be answered");
    assert_eq!(reply.kind, MessageType::Ping);
    assert_eq!(reply.id, "m1");
    assert_eq!(reply.source, "utags-extension");
    assert_eq!(reply.payload, Some(json!({"status": "PONG"})));
    assert!(reply.error.is_none());
}

#[rstest]
#[case::wrong_origin("https://evil.example.com", HOST, true)]
#[case::disallowed_host(ORIGIN, "other.example.org", true)]
#[case::no_reply_channel(ORIGIN, HOST, false)]
fn test_bad_context_is_silently_ignored(
    #[case] origin: &str,
    #[case] hostname: &str,
    #[case] can_reply: bool,
) {
    let (_storage, adapter) = setup(true);
    let ctx = MessageContext {
        origin: origin.to_string(),
        hostname: hostname.to_string(),
        can_reply,
    };
    assert!(adapter.handle_message(&ctx, &request("PING", "m1", None)).is_none());
}

#[test]
fn test_wildcard_host_pattern_matches_subdomains() {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let ledger = Arc::new(ScoreLedger::new(Arc::clone(&storage)));
    let serializer = Arc::new(UpdateSerializer::new(ledger));
    let store = Arc::new(
        BookmarkStore::open(Arc::clone(&storage), serializer, "0.14.0").unwrap(),
    );
    let adapter = SyncAdapter::new(
        store,
        storage,
        Box::new(StubProbe(true)),
        ORIGIN,
        vec!["*.example.com".to_string()],
    )
    .unwrap();

    let sub = MessageContext {
        origin: ORIGIN.to_string(),
        hostname: "app.example.com".to_string(),
        can_reply: true,
    };
    assert!(adapter.handle_message(&sub, &request("PING", "m1", None)).is_some());

    let bare = MessageContext {
        origin: ORIGIN.to_string(),
        hostname: "example.com".to_string(),
        can_reply: true,
    };
    assert!(adapter.handle_message(&bare, &request("PING", "m2", None)).is_some());

    let unrelated = MessageContext {
        origin: ORIGIN.to_string(),
        hostname: "notexample.com".to_string(),
        can_reply: true,
    };
    assert!(adapter
        .handle_message(&unrelated, &request("PING", "m3", None))
        .is_none());
}

#[test]
fn test_wrong_source_empty_id_and_unknown_type_are_ignored() {
    let (_storage, adapter) = setup(true);

    let mut wrong_source = request("PING", "m1", None);
    wrong_source["source"] = json!("someone-else");
    assert!(adapter.handle_message(&ctx(), &wrong_source).is_none());

    assert!(adapter.handle_message(&ctx(), &request("PING", "", None)).is_none());

    assert!(adapter
        .handle_message(&ctx(), &request("MAKE_COFFEE", "m2", None))
        .is_none());
}

#[test]
fn test_message_for_other_extension_is_ignored() {
    let (_storage, adapter) = setup(true);

    let mut other = request("PING", "m1", None);
    other["targetExtensionId"] = json!("not-this-instance");
    assert!(adapter.handle_message(&ctx(), &other).is_none());

    let mut untargeted = request("PING", "m2", None);
    untargeted.as_object_mut().unwrap().remove("targetExtensionId");
    assert!(adapter.handle_message(&ctx(), &untargeted).is_none());

    let mut direct = request("PING", "m3", None);
    direct["targetExtensionId"] = json!(adapter.extension_id());
    assert!(adapter.handle_message(&ctx(), &direct).is_some());
}

// ─── Discovery ───

#[test]
fn test_discovery_reports_id_and_name() {
    let (_storage, adapter) = setup(false);
    let reply = adapter
        .handle_message(&ctx(), &request("DISCOVER_UTAGS_TARGETS", "m1", None))
        .unwrap();
    assert_eq!(reply.kind, MessageType::DiscoveryResponse);
    assert_eq!(
        reply.payload,
        Some(json!({
            "extensionId": adapter.extension_id(),
            "extensionName": EXTENSION_NAME,
        }))
    );
}

#[test]
fn test_extension_id_persists_across_adapters() {
    let (storage, adapter) = setup(true);
    let first_id = adapter.extension_id().to_string();
    drop(adapter);

    let ledger = Arc::new(ScoreLedger::new(Arc::clone(&storage)));
    let serializer = Arc::new(UpdateSerializer::new(ledger));
    let store = Arc::new(
        BookmarkStore::open(Arc::clone(&storage), serializer, "0.14.0").unwrap(),
    );
    let reopened = SyncAdapter::new(
        store,
        storage,
        Box::new(StubProbe(true)),
        ORIGIN,
        vec![HOST.to_string()],
    )
    .unwrap();
    assert_eq!(reopened.extension_id(), first_id);
}

// ─── Availability gating ───

#[rstest]
#[case("GET_AUTH_STATUS")]
#[case("GET_REMOTE_METADATA")]
#[case("DOWNLOAD_DATA")]
#[case("UPLOAD_DATA")]
fn test_data_operations_require_available_host(#[case] kind: &str) {
    let (_storage, adapter) = setup(false);
    let reply = adapter
        .handle_message(&ctx(), &request(kind, "m1", None))
        .unwrap();
    assert_eq!(reply.error.as_deref(), Some("userscript not available"));
    assert!(reply.payload.is_none());
}

#[test]
fn test_auth_status_when_available() {
    let (_storage, adapter) = setup(true);
    let reply = adapter
        .handle_message(&ctx(), &request("GET_AUTH_STATUS", "m1", None))
        .unwrap();
    assert_eq!(reply.payload, Some(json!({"status": "authenticated"})));
}

// ─── Metadata and download ───

#[test]
fn test_remote_metadata_absent_yields_empty_payload() {
    let (_storage, adapter) = setup(true);
    let reply = adapter
        .handle_message(&ctx(), &request("GET_REMOTE_METADATA", "m1", None))
        .unwrap();
    assert_eq!(reply.payload, Some(json!({})));
}

#[test]
fn test_download_returns_current_store_blob() {
    let (_storage, adapter) = setup(true);
    let reply = adapter
        .handle_message(&ctx(), &request("DOWNLOAD_DATA", "m1", None))
        .unwrap();
    let payload = reply.payload.unwrap();
    let data = payload["data"].as_str().unwrap();
    let blob: Value = serde_json::from_str(data).unwrap();
    assert_eq!(blob["meta"]["databaseVersion"], json!(3));
    // No upload yet, so no remote metadata rides along.
    assert!(payload.get("remoteMeta").is_none());
}

// ─── Upload ───

fn upload_payload(data: &Value, metadata: Option<Value>) -> Value {
    let mut payload = json!({ "data": data.to_string() });
    if let Some(metadata) = metadata {
        payload["metadata"] = metadata;
    }
    payload
}

fn store_blob(url: &str, tag: &str) -> Value {
    json!({
        "data": {
            url: {
                "tags": [tag],
                "meta": {"created": 1_690_000_000_000i64, "updated": 1_690_000_000_000i64}
            }
        },
        "meta": {
            "databaseVersion": 3,
            "extensionVersion": "0.14.0",
            "created": 1_690_000_000_000i64,
            "updated": 1_690_000_000_000i64
        }
    })
}

#[test]
fn test_first_upload_mints_version_one() {
    let (_storage, adapter) = setup(true);
    let payload = upload_payload(&store_blob("https://example.com/a", "rust"), None);
    let reply = adapter
        .handle_message(&ctx(), &request("UPLOAD_DATA", "m1", Some(payload)))
        .unwrap();

    assert!(reply.error.is_none());
    let meta = reply.payload.unwrap();
    assert_eq!(meta["metadata"]["version"], json!("v1"));
    assert!(meta["metadata"]["timestamp"].is_i64());

    let stored = adapter.remote_metadata().unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[test]
fn test_matching_token_advances_version() {
    let (storage, adapter) = setup(true);
    storage
        .set(
            SYNC_METADATA_KEY,
            &json!({"version": "v3", "timestamp": 1000}).to_string(),
        )
        .unwrap();

    let payload = upload_payload(
        &store_blob("https://example.com/a", "rust"),
        Some(json!({"version": "v3", "timestamp": 1000})),
    );
    let reply = adapter
        .handle_message(&ctx(), &request("UPLOAD_DATA", "m1", Some(payload)))
        .unwrap();

    assert!(reply.error.is_none());
    assert_eq!(reply.payload.unwrap()["metadata"]["version"], json!("v4"));
}

#[rstest]
#[case::stale_token(
    Some(json!({"version": "v2", "timestamp": 900})),
    "Sync conflict: expected metadata does not match remote"
)]
#[case::no_token_but_remote_exists(None, "Sync conflict: concurrent modification suspected")]
fn test_mismatched_token_rejected_without_write(
    #[case] expected: Option<Value>,
    #[case] message: &str,
) {
    let (storage, adapter) = setup(true);
    storage
        .set(
            SYNC_METADATA_KEY,
            &json!({"version": "v3", "timestamp": 1000}).to_string(),
        )
        .unwrap();

    let payload = upload_payload(&store_blob("https://example.com/a", "rust"), expected);
    let reply = adapter
        .handle_message(&ctx(), &request("UPLOAD_DATA", "m1", Some(payload)))
        .unwrap();

    assert_eq!(reply.error.as_deref(), Some(message));
    // The stored token and the store data are untouched.
    let stored = adapter.remote_metadata().unwrap().unwrap();
    assert_eq!(stored, SyncMetadata { version: 3, timestamp: 1000 });
    let download = adapter
        .handle_message(&ctx(), &request("DOWNLOAD_DATA", "m2", None))
        .unwrap();
    let data = download.payload.unwrap()["data"].as_str().unwrap().to_string();
    let blob: Value = serde_json::from_str(&data).unwrap();
    assert!(blob["data"].as_object().unwrap().is_empty());
}

#[test]
fn test_token_against_empty_remote_is_a_conflict() {
    let (_storage, adapter) = setup(true);
    let payload = upload_payload(
        &store_blob("https://example.com/a", "rust"),
        Some(json!({"version": "v1", "timestamp": 1})),
    );
    let reply = adapter
        .handle_message(&ctx(), &request("UPLOAD_DATA", "m1", Some(payload)))
        .unwrap();
    assert_eq!(
        reply.error.as_deref(),
        Some("Sync conflict: expected remote metadata but none found")
    );
}

#[test]
fn test_non_string_data_is_invalid_payload() {
    let (_storage, adapter) = setup(true);
    let payload = json!({ "data": {"not": "a string"} });
    let reply = adapter
        .handle_message(&ctx(), &request("UPLOAD_DATA", "m1", Some(payload)))
        .unwrap();
    assert_eq!(
        reply.error.as_deref(),
        Some("Invalid payload: payload.data must be a string")
    );
}

#[test]
fn test_uploaded_legacy_blob_is_migrated() {
    let (_storage, adapter) = setup(true);
    // A v2 flat map with no meta wrapper.
    let legacy = json!({
        "https://example.com/old": {
            "tags": ["legacy"],
            "meta": {"created": 1_680_000_000_000i64, "updated": 1_680_000_000_000i64}
        }
    });
    let reply = adapter
        .handle_message(
            &ctx(),
            &request("UPLOAD_DATA", "m1", Some(upload_payload(&legacy, None))),
        )
        .unwrap();
    assert!(reply.error.is_none());

    let download = adapter
        .handle_message(&ctx(), &request("DOWNLOAD_DATA", "m2", None))
        .unwrap();
    let data = download.payload.unwrap()["data"].as_str().unwrap().to_string();
    let blob: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(blob["meta"]["databaseVersion"], json!(3));
    assert_eq!(
        blob["data"]["https://example.com/old"]["tags"],
        json!(["legacy"])
    );
}
