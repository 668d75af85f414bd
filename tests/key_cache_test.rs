mod common;

use common::*;
use nila_isb::prelude::*;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve_jwks(server: &MockServer, body: serde_json::Value, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/jwks/broker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn cache(server: &MockServer, interval: Duration) -> KeyCache {
    let url = Url::parse(&format!("{}/jwks/broker", server.uri())).unwrap();
    KeyCache::new(url, interval, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_lookup_returns_the_published_key() {
    let server = MockServer::start().await;
    serve_jwks(&server, broker_jwks(), 1).await;

    let key = cache(&server, Duration::from_secs(300)).lookup(BROKER_KID).await.unwrap();
    assert_eq!(key, public_key(BROKER_SIGNING_KEY_PEM));
    println!("✅ Key decoded from the key set matches the broker public key.");
}

#[tokio::test]
async fn test_refresh_within_interval_fetches_once() {
    let server = MockServer::start().await;
    serve_jwks(&server, broker_jwks(), 1).await;

    let cache = cache(&server, Duration::from_secs(300));
    cache.refresh().await.unwrap();
    cache.refresh().await.unwrap();
    cache.lookup(BROKER_KID).await.unwrap();
    assert_eq!(cache.key_ids().await, vec![BROKER_KID.to_string()]);
    // `expect(1)` is verified when the server drops.
}

#[tokio::test]
async fn test_refresh_after_interval_fetches_again() {
    let server = MockServer::start().await;
    serve_jwks(&server, broker_jwks(), 2).await;

    let cache = cache(&server, Duration::from_millis(50));
    cache.refresh().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    cache.refresh().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks/broker"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(broker_jwks())
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache(&server, Duration::from_secs(300));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.lookup(BROKER_KID).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}

#[tokio::test]
async fn test_rotation_replaces_the_whole_key_set() {
    let server = MockServer::start().await;
    let old_key = public_key(CLIENT_SIGNING_KEY_PEM);
    let new_key = public_key(BROKER_SIGNING_KEY_PEM);

    Mock::given(method("GET"))
        .and(path("/jwks/broker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "keys": [jwk("old", &old_key)] })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks/broker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "keys": [jwk("new", &new_key)] })))
        .mount(&server)
        .await;

    let cache = cache(&server, Duration::from_millis(50));
    assert_eq!(cache.lookup("old").await.unwrap(), old_key);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(cache.lookup("new").await.unwrap(), new_key);
    assert!(matches!(cache.lookup("old").await, Err(NilaIsbError::KeyNotFound(kid)) if kid == "old"));
}

#[tokio::test]
async fn test_unknown_kid_is_key_not_found() {
    let server = MockServer::start().await;
    serve_jwks(&server, broker_jwks(), 1).await;

    let result = cache(&server, Duration::from_secs(300)).lookup("missing").await;
    assert!(matches!(result, Err(NilaIsbError::KeyNotFound(kid)) if kid == "missing"));
}

#[tokio::test]
async fn test_non_success_status_is_key_source_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks/broker"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache(&server, Duration::from_secs(300));
    assert!(matches!(cache.refresh().await, Err(NilaIsbError::KeySource(_))));
    // A failed fetch does not count as a refresh.
    assert!(matches!(cache.lookup(BROKER_KID).await, Err(NilaIsbError::KeySource(_))));
}

#[tokio::test]
async fn test_unreachable_source_is_key_source_error() {
    let server = MockServer::start().await;
    let cache = cache(&server, Duration::from_secs(300));
    drop(server);

    assert!(matches!(cache.refresh().await, Err(NilaIsbError::KeySource(_))));
}

#[tokio::test]
async fn test_malformed_body_is_key_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks/broker"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let result = cache(&server, Duration::from_secs(300)).refresh().await;
    assert!(matches!(result, Err(NilaIsbError::KeyFormat(_))));
}

#[tokio::test]
async fn test_encryption_key_record_is_rejected_on_lookup() {
    let server = MockServer::start().await;
    let mut record = jwk("enc-key", &public_key(CLIENT_ENCRYPTION_KEY_PEM));
    record["use"] = serde_json::json!("enc");
    serve_jwks(&server, serde_json::json!({ "keys": [record] }), 1).await;

    let result = cache(&server, Duration::from_secs(300)).lookup("enc-key").await;
    assert!(matches!(result, Err(NilaIsbError::KeyFormat(_))));
}

#[tokio::test]
async fn test_record_without_kid_does_not_break_the_key_set() {
    // --- 1. SETUP: an EC record without a kid next to the broker key ---
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "keys": [
            { "kty": "EC", "crv": "P-256", "x": "AA", "y": "AA" },
            jwk(BROKER_KID, &public_key(BROKER_SIGNING_KEY_PEM)),
        ]
    });
    serve_jwks(&server, body, 1).await;

    // --- 2. LOOKUP ---
    let cache = cache(&server, Duration::from_secs(300));
    assert_eq!(cache.lookup(BROKER_KID).await.unwrap(), public_key(BROKER_SIGNING_KEY_PEM));
    assert!(matches!(cache.lookup("").await, Err(NilaIsbError::KeyNotFound(kid)) if kid.is_empty()));
    assert_eq!(cache.key_ids().await, vec![BROKER_KID.to_string()]);
    println!("✅ Kid-less records are ignored; the broker key still resolves.");
}
