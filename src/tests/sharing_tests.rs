//! Shared-container document and mutation protocol.

use std::sync::Arc;

use http::{HeaderMap, StatusCode};

use crate::constants::SHARED_META_HEADER;
use crate::error::GatewayError;
use crate::identity::Identity;
use crate::logging::setup_test_logging;
use crate::sharing::{ShareManager, ShareOp, SharedAclDocument};

use super::MockStorage;

fn caller() -> Identity {
    Identity::from_provider_id(super::TEST_PREFIX, "1")
}

#[test]
fn test_document_add_then_remove() {
    let mut document = SharedAclDocument::default();
    document.add("g_2", "photos");
    assert!(document.contains("g_2", "photos"));

    document.remove("g_2", "photos");
    assert!(!document.contains("g_2", "photos"));
    assert!(document.is_empty());
}

#[test]
fn test_document_remove_absent_key_is_noop() {
    let mut document = SharedAclDocument::default();
    document.remove("g_2", "never-shared");
    assert!(document.is_empty());
}

#[test]
fn test_document_serializes_to_composite_keys() {
    let mut document = SharedAclDocument::default();
    document.add("g_2", "photos");
    let json = document.to_json().expect("Should serialize");
    assert_eq!(json, r#"{"g_2/photos":"shared"}"#);
}

#[test]
fn test_document_roundtrip() {
    let mut document = SharedAclDocument::default();
    document.add("g_2", "photos");
    document.add("g_3", "music");

    let json = document.to_json().expect("Should serialize");
    let parsed: SharedAclDocument = serde_json::from_str(&json).expect("Should parse");
    assert_eq!(parsed, document);
}

#[test]
fn test_corrupt_metadata_yields_empty_document() {
    let mut headers = HeaderMap::new();
    headers.insert(
        SHARED_META_HEADER,
        "][ not json".parse().expect("Should build header"),
    );
    assert!(SharedAclDocument::from_metadata(&headers).is_empty());
}

#[test]
fn test_absent_metadata_yields_empty_document() {
    assert!(SharedAclDocument::from_metadata(&HeaderMap::new()).is_empty());
}

#[test]
fn test_parse_share_path() {
    let (op, account, container) =
        ShareManager::parse_share_path("load/g_2/photos").expect("Should parse");
    assert_eq!(op, ShareOp::Add);
    assert_eq!(account, "g_2");
    assert_eq!(container, "photos");

    let (op, _, _) = ShareManager::parse_share_path("drop/g_2/photos").expect("Should parse");
    assert_eq!(op, ShareOp::Remove);
}

#[test]
fn test_parse_share_path_rejects_unknown_op() {
    assert!(matches!(
        ShareManager::parse_share_path("munge/g_2/photos"),
        Err(GatewayError::NotFound(_))
    ));
}

#[test]
fn test_parse_share_path_rejects_missing_segments() {
    assert!(ShareManager::parse_share_path("load").is_err());
    assert!(ShareManager::parse_share_path("load/g_2").is_err());
    assert!(ShareManager::parse_share_path("").is_err());
}

#[tokio::test]
async fn test_add_posts_updated_document_to_callers_account() {
    setup_test_logging();
    let mut storage = MockStorage::with_account();
    storage.head_headers.insert(
        "x-account-meta-color",
        "blue".parse().expect("Should build header"),
    );
    let storage = Arc::new(storage);
    let manager = ShareManager::new(storage.clone());

    let response = manager
        .handle(&caller(), "load/g_2/photos")
        .await
        .expect("Share add should succeed");

    // The storage response comes back unchanged.
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let posted = storage.posted.lock().await;
    let (account, headers) = posted.first().expect("Should have posted metadata");
    assert_eq!(account, caller().as_str());
    // Pre-existing metadata is carried forward verbatim.
    assert_eq!(
        headers.get("x-account-meta-color").map(|v| v.to_str().ok()),
        Some(Some("blue"))
    );
    let document = headers
        .get(SHARED_META_HEADER)
        .and_then(|value| value.to_str().ok())
        .expect("Should carry the shared document");
    assert!(document.contains("g_2/photos"));
}

#[tokio::test]
async fn test_remove_deletes_key_from_existing_document() {
    let mut storage = MockStorage::with_account();
    storage.head_headers.insert(
        SHARED_META_HEADER,
        r#"{"g_2/photos":"shared","g_3/music":"shared"}"#
            .parse()
            .expect("Should build header"),
    );
    let storage = Arc::new(storage);
    let manager = ShareManager::new(storage.clone());

    manager
        .handle(&caller(), "drop/g_2/photos")
        .await
        .expect("Share remove should succeed");

    let posted = storage.posted.lock().await;
    let (_, headers) = posted.first().expect("Should have posted metadata");
    let document = headers
        .get(SHARED_META_HEADER)
        .and_then(|value| value.to_str().ok())
        .expect("Should carry the shared document");
    assert!(!document.contains("g_2/photos"));
    assert!(document.contains("g_3/music"));
}

#[tokio::test]
async fn test_remove_of_absent_key_succeeds() {
    let storage = Arc::new(MockStorage::with_account());
    let manager = ShareManager::new(storage.clone());

    manager
        .handle(&caller(), "drop/g_9/never-shared")
        .await
        .expect("Removing an absent key should not fail");

    let posted = storage.posted.lock().await;
    assert_eq!(posted.len(), 1);
}

#[tokio::test]
async fn test_missing_account_is_not_found() {
    let storage = Arc::new(MockStorage::missing_account());
    let manager = ShareManager::new(storage);

    let result = manager.handle(&caller(), "load/g_2/photos").await;
    assert!(matches!(result, Err(GatewayError::NotFound(_))));
}

#[tokio::test]
async fn test_corrupt_document_self_heals_on_mutation() {
    let mut storage = MockStorage::with_account();
    storage.head_headers.insert(
        SHARED_META_HEADER,
        "corrupt{".parse().expect("Should build header"),
    );
    let storage = Arc::new(storage);
    let manager = ShareManager::new(storage.clone());

    manager
        .handle(&caller(), "load/g_2/photos")
        .await
        .expect("Mutation over corrupt state should succeed");

    let posted = storage.posted.lock().await;
    let (_, headers) = posted.first().expect("Should have posted metadata");
    let document = headers
        .get(SHARED_META_HEADER)
        .and_then(|value| value.to_str().ok())
        .expect("Should carry the shared document");
    assert_eq!(document, r#"{"g_2/photos":"shared"}"#);
}
