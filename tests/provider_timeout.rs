use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use recall::config::{EmbeddingConfig, RetrievalConfig};
use recall::provider::OpenAiEmbedder;
use recall::server::router;
use recall::service::Recall;
use recall_core::embedding::Embedder;
use recall_core::store::InMemoryItemStore;
use recall_core::RecallError;

const KEY_ENV: &str = "RECALL_TIMEOUT_TEST_API_KEY";

/// Accepts connections and holds them open without ever answering.
async fn silent_provider() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

async fn slow_embedder() -> OpenAiEmbedder {
    std::env::set_var(KEY_ENV, "test-key");
    let config = EmbeddingConfig {
        provider: "openai".into(),
        base_url: Some(silent_provider().await),
        api_key_env: KEY_ENV.into(),
        timeout_secs: 1,
        ..EmbeddingConfig::default()
    };
    OpenAiEmbedder::new(&config).unwrap()
}

#[tokio::test]
async fn test_embed_deadline_is_recoverable_unavailable() {
    let embedder = slow_embedder().await;
    let err = embedder.embed("never answered").await.unwrap_err();
    assert!(matches!(err, RecallError::ProviderUnavailable(_)), "got {:?}", err);
    assert!(err.is_timeout());
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_embed_deadline_maps_to_gateway_timeout() {
    let recall = Recall::new(
        Arc::new(InMemoryItemStore::new()),
        Arc::new(slow_embedder().await),
        None,
        RetrievalConfig::default(),
        0.3,
    );
    let app = router(Arc::new(recall));

    let request = Request::builder()
        .method("POST")
        .uri("/api/items")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "text": "stuck item", "options": { "analyze": false } }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "provider_unavailable");
}
