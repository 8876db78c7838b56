use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use heirloom_api::{create_router, ApiState};
use heirloom_storage::{InMemoryStore, KvStore, StoreError};
use std::sync::Arc;
use tower::ServiceExt;

struct UnreachableStore;

#[async_trait]
impl KvStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<usize, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn list_keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }
}

async fn seeded_router() -> Router {
    let store = InMemoryStore::new();
    store.set("attester:mainnet:0xaa", r#"{"address":"0xaa"}"#).await.unwrap();
    store.set("attester:mainnet:0xbb", r#"{"address":"0xbb"}"#).await.unwrap();
    store.set("claim:testnet:4", r#"{"id":4}"#).await.unwrap();
    store.set("lastBlock:attester:mainnet", "123").await.unwrap();
    create_router(Arc::new(ApiState {
        store: Arc::new(store),
    }))
}

async fn get(router: Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_defaults_list_mainnet_attesters_one_per_line() {
    let (status, content_type, body) = get(seeded_router().await, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(body, "{\"address\":\"0xaa\"}\n{\"address\":\"0xbb\"}\n");
}

#[tokio::test]
async fn test_sepolia_alias_reads_testnet_keys() {
    let (status, _, body) = get(seeded_router().await, "/?module=CLAIMS&chain=sepolia").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "{\"id\":4}\n");

    let (status, _, _) = get(seeded_router().await, "/?module=claims&chain=testnet").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_module_is_rejected() {
    let (status, content_type, body) = get(seeded_router().await, "/?module=deposits").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert!(body.starts_with("Invalid module"));
}

#[tokio::test]
async fn test_missing_data_is_not_found() {
    let (status, _, body) = get(seeded_router().await, "/?module=safes&chain=mainnet").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "No data found for safes on mainnet");
}

#[tokio::test]
async fn test_unknown_chain_falls_back_to_mainnet() {
    let (status, _, body) = get(seeded_router().await, "/?chain=polygon").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.lines().count(), 2);
}

#[tokio::test]
async fn test_store_failure_is_a_server_error() {
    let router = create_router(Arc::new(ApiState {
        store: Arc::new(UnreachableStore),
    }));

    let (status, _, _) = get(router.clone(), "/?module=attesters").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _, body) = get(router, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("degraded"));
}

#[tokio::test]
async fn test_health_reports_reachable_store() {
    let (status, _, body) = get(seeded_router().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("healthy"));
}

#[tokio::test]
async fn test_cors_is_permissive() {
    let response = seeded_router()
        .await
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::ORIGIN, "https://example.org")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
