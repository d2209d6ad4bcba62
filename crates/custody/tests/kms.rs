use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use kms_custody::config::{CacheConfig, KmsConfig};
use kms_custody::error::SignerError;
use kms_custody::kms::{FakeKms, HttpKmsClient, KeyHandle, KmsClient, KmsError};
use kms_custody::signing::{DigestSigner, KmsSigner};

// ── Stub of the Google KMS REST surface ──────────────────────────────
//
// Serves the three endpoints the signer uses, backed by a `FakeKms` so
// the HTTP client is exercised against the exact wire shapes it parses.

#[derive(Clone)]
struct GoogleState {
    fake: Arc<FakeKms>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some("Bearer test-token")
}

fn kms_failure(err: KmsError) -> Response {
    match err {
        KmsError::Api { status, message } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message,
        )
            .into_response(),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

async fn google_get(
    State(state): State<GoogleState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if name.ends_with("/cryptoKeyVersions") {
        if params.get("filter").is_none_or(|f| !f.contains("ENABLED")) {
            return (StatusCode::BAD_REQUEST, "missing filter").into_response();
        }
        let versions = match state.fake.list_enabled_versions().await {
            Ok(versions) => versions,
            Err(err) => return kms_failure(err),
        };
        // Two pages so the client's pagination loop gets exercised.
        let split = versions.len().div_ceil(2);
        let (page, next) = match params.get("pageToken").map(String::as_str) {
            None => (&versions[..split], "second"),
            Some("second") => (&versions[split..], ""),
            Some(other) => {
                return (StatusCode::BAD_REQUEST, format!("bad page token {other}"))
                    .into_response();
            }
        };
        let names: Vec<_> = page
            .iter()
            .map(|name| serde_json::json!({ "name": name }))
            .collect();
        return Json(serde_json::json!({
            "cryptoKeyVersions": names,
            "nextPageToken": next,
        }))
        .into_response();
    }
    if let Some(handle) = name.strip_suffix("/publicKey") {
        return match state.fake.public_key_pem(&KeyHandle::new(handle)).await {
            Ok(pem) => Json(serde_json::json!({ "pem": pem })).into_response(),
            Err(err) => kms_failure(err),
        };
    }
    StatusCode::NOT_FOUND.into_response()
}

async fn google_post(
    State(state): State<GoogleState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(handle) = name.strip_suffix(":asymmetricSign") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let digest = BASE64
        .decode(body["digest"]["sha256"].as_str().unwrap_or_default())
        .unwrap();
    let crc: u32 = body["digestCrc32c"].as_str().unwrap().parse().unwrap();
    match state
        .fake
        .asymmetric_sign(&KeyHandle::new(handle), B256::from_slice(&digest), crc)
        .await
    {
        Ok(output) => Json(serde_json::json!({
            "signature": BASE64.encode(&output.der_signature),
            "signatureCrc32c": output.signature_crc32c.to_string(),
            "verifiedDigestCrc32c": output.verified_digest_crc32c,
        }))
        .into_response(),
        Err(err) => kms_failure(err),
    }
}

fn google_router(fake: Arc<FakeKms>) -> Router {
    Router::new()
        .route("/v1/{*name}", get(google_get).post(google_post))
        .with_state(GoogleState { fake })
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    url
}

fn config(endpoint: &str) -> KmsConfig {
    KmsConfig {
        endpoint: endpoint.into(),
        auth_token: Some("test-token".into()),
        project: "local".into(),
        location: "global".into(),
        key_ring: "dev".into(),
        key: "signer".into(),
        key_version: None,
        request_timeout: Duration::from_secs(2),
    }
}

// ── End to end over HTTP ─────────────────────────────────────────────

#[tokio::test]
async fn signing_works_end_to_end_over_rest() {
    let fake = Arc::new(FakeKms::from_seed("remote").unwrap());
    let url = spawn(google_router(fake.clone())).await;

    let client = HttpKmsClient::new(config(&url)).unwrap();
    let signer = KmsSigner::connect(Arc::new(client), CacheConfig::default())
        .await
        .unwrap();

    let address = fake.addresses()[0];
    let digest = B256::repeat_byte(0x5a);
    let signature = signer.sign_digest(&address, digest).await.unwrap();
    assert_eq!(signature.recover_address(digest).unwrap(), address);
    assert_eq!(fake.sign_calls(), 1);

    let key = signer.public_key().await.unwrap();
    assert_eq!(Address::from_public_key(&key), address);
}

#[tokio::test]
async fn version_listing_pages_through_the_catalog() {
    let fake = Arc::new(FakeKms::from_seeds(&["a", "b", "c"]).unwrap());
    let url = spawn(google_router(fake.clone())).await;

    let client = HttpKmsClient::new(config(&url)).unwrap();
    let signer = KmsSigner::connect(Arc::new(client), CacheConfig::default())
        .await
        .unwrap();

    let mut listed = signer.addresses().await.unwrap();
    assert_eq!(listed[0], fake.addresses()[0]);
    listed.sort_unstable();
    let mut expected = fake.addresses();
    expected.sort_unstable();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn pinned_version_skips_the_catalog() {
    let fake = Arc::new(FakeKms::from_seeds(&["a", "b"]).unwrap());
    let url = spawn(google_router(fake.clone())).await;

    let mut cfg = config(&url);
    cfg.key_version = Some("2".into());
    let client = HttpKmsClient::new(cfg).unwrap();
    let signer = KmsSigner::connect(Arc::new(client), CacheConfig::default())
        .await
        .unwrap();

    assert_eq!(signer.addresses().await.unwrap(), vec![fake.addresses()[1]]);
    assert_eq!(fake.list_calls(), 0);
}

#[tokio::test]
async fn unreachable_key_service_fails_startup() {
    let client = HttpKmsClient::new(config("http://127.0.0.1:1")).unwrap();
    let err = KmsSigner::connect(Arc::new(client), CacheConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SignerError::ConnectionFailed(_)));
}

#[tokio::test]
async fn listing_failures_fail_startup() {
    let fake = Arc::new(FakeKms::from_seed("remote").unwrap());
    fake.set_fail_listing(true);
    let url = spawn(google_router(fake)).await;

    let client = HttpKmsClient::new(config(&url)).unwrap();
    let err = KmsSigner::connect(Arc::new(client), CacheConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SignerError::ConnectionFailed(_)));
}
