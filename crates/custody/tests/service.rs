use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use kms_custody::chain::{ChainClient, ChainProxyState, HttpChainClient, chain_proxy_router};
use kms_custody::config::CacheConfig;
use kms_custody::error::SignerError;
use kms_custody::kms::FakeKms;
use kms_custody::policy::{HttpPolicyClient, ScreeningState, StaticBlocklist, screening_router};
use kms_custody::server::{
    AddressResponse, AppState, PublicKeyResponse, SignRequest, SignResponse, router,
};
use kms_custody::service::SigningService;
use kms_custody::signing::{KmsSigner, WalletSigner};
use kms_custody::tx::LegacyTransaction;

struct StubChain {
    chain_id: u64,
}

#[async_trait]
impl ChainClient for StubChain {
    async fn chain_id(&self) -> Result<U256, SignerError> {
        Ok(U256::from(self.chain_id))
    }

    async fn pending_nonce(&self, _address: &Address) -> Result<u64, SignerError> {
        Ok(9)
    }

    async fn suggest_gas_price(&self) -> Result<U256, SignerError> {
        Ok(U256::from(20_000_000_000u64))
    }

    async fn send_raw_transaction(&self, _raw: &[u8]) -> Result<(), SignerError> {
        Ok(())
    }
}

fn demo_destination() -> Address {
    "0x4549f47920997A486e9986d2e3e4540230534A03"
        .parse()
        .unwrap()
}

fn transfer(to: Address) -> LegacyTransaction {
    LegacyTransaction {
        nonce: 9,
        gas_price: U256::from(20_000_000_000u64),
        gas_limit: 21_000,
        to: Some(to),
        value: U256::from(100u64),
        data: Bytes::new(),
        ..Default::default()
    }
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    url
}

/// Brings up screening, chain access and the signer on ephemeral ports,
/// wired together the way the deployed services are.
async fn launch_stack(kms: &Arc<FakeKms>, blocklist: Vec<Address>) -> String {
    let screening_url = spawn(screening_router(ScreeningState {
        blocklist: Arc::new(StaticBlocklist::new(blocklist)),
    }))
    .await;
    let chain_url = spawn(chain_proxy_router(ChainProxyState {
        node: Arc::new(StubChain { chain_id: 1337 }),
    }))
    .await;

    let signer = KmsSigner::connect(kms.clone(), CacheConfig::default())
        .await
        .unwrap();
    let wallet = WalletSigner::new(Arc::new(signer));
    let policy = HttpPolicyClient::new(&screening_url, Duration::from_secs(2)).unwrap();
    let chain = HttpChainClient::new(&chain_url, Duration::from_secs(2)).unwrap();
    let service = SigningService::new(wallet, Arc::new(policy), Arc::new(chain));
    spawn(router(AppState {
        service: Arc::new(service),
    }))
    .await
}

// ── Full stack over real listeners ───────────────────────────────────

#[tokio::test]
async fn sign_round_trip_through_all_services() {
    let kms = Arc::new(FakeKms::from_seed("stack").unwrap());
    let url = launch_stack(&kms, Vec::new()).await;
    let http = reqwest::Client::new();

    // 1. Ask the signer who it is
    let body: AddressResponse = http
        .get(format!("{url}/address"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let from: Address = body.address.parse().unwrap();
    assert_eq!(from, kms.addresses()[0]);

    // 2. Submit an unsigned transfer
    let tx = transfer(demo_destination());
    let request = SignRequest {
        tx: format!("0x{}", hex::encode(tx.encoded())),
    };
    let response = http
        .post(format!("{url}/sign"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: SignResponse = response.json().await.unwrap();

    // 3. The returned payload is a valid transaction for the stub chain
    let raw = hex::decode(body.tx.trim_start_matches("0x")).unwrap();
    let signed = LegacyTransaction::decode_payload(&raw).unwrap();
    let v = u64::try_from(signed.v).unwrap();
    assert!(v == 2709 || v == 2710, "v should carry chain id 1337, got {v}");
    assert_eq!(signed.nonce, tx.nonce);
    assert_eq!(signed.to, Some(demo_destination()));
    assert_ne!(signed.r, U256::ZERO);
    assert_eq!(kms.sign_calls(), 1);
}

#[tokio::test]
async fn blocked_destination_is_forbidden() {
    let kms = Arc::new(FakeKms::from_seed("stack").unwrap());
    let url = launch_stack(&kms, vec![demo_destination()]).await;
    let http = reqwest::Client::new();

    let request = SignRequest {
        tx: format!("0x{}", hex::encode(transfer(demo_destination()).encoded())),
    };
    let response = http
        .post(format!("{url}/sign"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(kms.sign_calls(), 0);
}

#[tokio::test]
async fn public_key_endpoint_matches_the_address() {
    let kms = Arc::new(FakeKms::from_seed("stack").unwrap());
    let url = launch_stack(&kms, Vec::new()).await;
    let http = reqwest::Client::new();

    let body: PublicKeyResponse = http
        .get(format!("{url}/public-key"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let key_bytes = hex::decode(body.public_key.trim_start_matches("0x")).unwrap();
    assert_eq!(key_bytes.len(), 65, "uncompressed key should be 65 bytes");
    assert_eq!(key_bytes[0], 0x04);

    let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&key_bytes).unwrap();
    assert_eq!(Address::from_public_key(&key), kms.addresses()[0]);
}

// ── Router behaviour ─────────────────────────────────────────────────

async fn local_router(kms: &Arc<FakeKms>) -> Router {
    let signer = KmsSigner::connect(kms.clone(), CacheConfig::default())
        .await
        .unwrap();
    let wallet = WalletSigner::new(Arc::new(signer));
    let service = SigningService::new(
        wallet,
        Arc::new(StaticBlocklist::default()),
        Arc::new(StubChain { chain_id: 1337 }),
    );
    router(AppState {
        service: Arc::new(service),
    })
}

#[tokio::test]
async fn healthcheck_responds_ok() {
    let kms = Arc::new(FakeKms::from_seed("router").unwrap());
    let response = local_router(&kms)
        .await
        .oneshot(
            Request::builder()
                .uri("/healthcheck")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Ok");
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let kms = Arc::new(FakeKms::from_seed("router").unwrap());
    let response = local_router(&kms)
        .await
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_hex_is_a_bad_request() {
    let kms = Arc::new(FakeKms::from_seed("router").unwrap());
    let request = Request::builder()
        .method("POST")
        .uri("/sign")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&SignRequest { tx: "0xzz".into() }).unwrap(),
        ))
        .unwrap();
    let response = local_router(&kms).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(kms.sign_calls(), 0);
}

#[tokio::test]
async fn garbage_rlp_is_a_bad_request() {
    let kms = Arc::new(FakeKms::from_seed("router").unwrap());
    let request = Request::builder()
        .method("POST")
        .uri("/sign")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&SignRequest {
                tx: "0xdeadbeef".into(),
            })
            .unwrap(),
        ))
        .unwrap();
    let response = local_router(&kms).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(kms.sign_calls(), 0);
}
