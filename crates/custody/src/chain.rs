use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{
    Json, Router,
    extract::{Path, State},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SignerError;
use crate::tx::decode_hex_payload;

/// Read and submit access to an Ethereum network.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<U256, SignerError>;
    async fn pending_nonce(&self, address: &Address) -> Result<u64, SignerError>;
    async fn suggest_gas_price(&self) -> Result<U256, SignerError>;
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<(), SignerError>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client for an Ethereum node.
pub struct NodeClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl NodeClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SignerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SignerError::ConnectionFailed(err.to_string()))?;
        Ok(Self {
            http,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SignerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(SignerError::upstream)?;
        let response: RpcResponse = response.json().await.map_err(SignerError::upstream)?;
        if let Some(error) = response.error {
            return Err(SignerError::UpstreamUnavailable(format!(
                "{method} failed with code {}: {}",
                error.code, error.message
            )));
        }
        response.result.ok_or_else(|| {
            SignerError::UpstreamUnavailable(format!("{method} returned no result"))
        })
    }
}

fn parse_quantity(value: &Value) -> Result<U256, SignerError> {
    let text = value.as_str().ok_or_else(|| {
        SignerError::UpstreamUnavailable(format!("expected a hex quantity, got {value}"))
    })?;
    let bare = text.strip_prefix("0x").unwrap_or(text);
    U256::from_str_radix(bare, 16)
        .map_err(|err| SignerError::UpstreamUnavailable(format!("bad hex quantity {text}: {err}")))
}

fn parse_decimal(text: &str) -> Result<U256, SignerError> {
    U256::from_str_radix(text, 10).map_err(|err| {
        SignerError::UpstreamUnavailable(format!("bad decimal quantity {text}: {err}"))
    })
}

#[async_trait]
impl ChainClient for NodeClient {
    async fn chain_id(&self) -> Result<U256, SignerError> {
        let result = self.call("eth_chainId", Value::Array(vec![])).await?;
        parse_quantity(&result)
    }

    async fn pending_nonce(&self, address: &Address) -> Result<u64, SignerError> {
        let params = serde_json::json!([address, "pending"]);
        let result = self.call("eth_getTransactionCount", params).await?;
        let nonce = parse_quantity(&result)?;
        u64::try_from(nonce)
            .map_err(|_| SignerError::UpstreamUnavailable(format!("nonce {nonce} overflows u64")))
    }

    async fn suggest_gas_price(&self) -> Result<U256, SignerError> {
        let result = self.call("eth_gasPrice", Value::Array(vec![])).await?;
        parse_quantity(&result)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<(), SignerError> {
        let params = serde_json::json!([format!("0x{}", hex::encode(raw))]);
        self.call("eth_sendRawTransaction", params).await?;
        Ok(())
    }
}

// Chain values cross the proxy as decimal strings so callers never deal
// with hex quantities. Nonces fit in a JSON number.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChainIdResponse {
    pub chain_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GasPriceResponse {
    pub gas_price: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendRawRequest {
    pub tx: String,
}

#[derive(Clone)]
pub struct ChainProxyState {
    pub node: Arc<dyn ChainClient>,
}

/// Router for the standalone chain access service.
pub fn chain_proxy_router(state: ChainProxyState) -> Router {
    Router::new()
        .route(
            "/healthcheck",
            get(|| async move { (StatusCode::OK, "Ok").into_response() }),
        )
        .route("/chain-id", get(chain_id))
        .route("/nonce/{address}", get(nonce))
        .route("/gas-price", get(gas_price))
        .route("/transactions", post(send_transaction))
        .with_state(state)
}

async fn chain_id(
    State(state): State<ChainProxyState>,
) -> Result<Json<ChainIdResponse>, SignerError> {
    let id = state.node.chain_id().await?;
    Ok(Json(ChainIdResponse {
        chain_id: id.to_string(),
    }))
}

async fn nonce(
    State(state): State<ChainProxyState>,
    Path(address): Path<Address>,
) -> Result<Json<NonceResponse>, SignerError> {
    Ok(Json(NonceResponse {
        nonce: state.node.pending_nonce(&address).await?,
    }))
}

async fn gas_price(
    State(state): State<ChainProxyState>,
) -> Result<Json<GasPriceResponse>, SignerError> {
    Ok(Json(GasPriceResponse {
        gas_price: state.node.suggest_gas_price().await?.to_string(),
    }))
}

async fn send_transaction(
    State(state): State<ChainProxyState>,
    Json(request): Json<SendRawRequest>,
) -> Result<StatusCode, SignerError> {
    let raw = decode_hex_payload(&request.tx)?;
    state.node.send_raw_transaction(&raw).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Client for the chain access service.
pub struct HttpChainClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChainClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SignerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SignerError::ConnectionFailed(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SignerError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(SignerError::upstream)?;
        if !response.status().is_success() {
            return Err(SignerError::UpstreamUnavailable(format!(
                "chain proxy returned {}",
                response.status()
            )));
        }
        response.json().await.map_err(SignerError::upstream)
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn chain_id(&self) -> Result<U256, SignerError> {
        let body: ChainIdResponse = self.get_json("/chain-id").await?;
        parse_decimal(&body.chain_id)
    }

    async fn pending_nonce(&self, address: &Address) -> Result<u64, SignerError> {
        let body: NonceResponse = self.get_json(&format!("/nonce/{address}")).await?;
        Ok(body.nonce)
    }

    async fn suggest_gas_price(&self) -> Result<U256, SignerError> {
        let body: GasPriceResponse = self.get_json("/gas-price").await?;
        parse_decimal(&body.gas_price)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<(), SignerError> {
        let response = self
            .http
            .post(format!("{}/transactions", self.base_url))
            .json(&SendRawRequest {
                tx: format!("0x{}", hex::encode(raw)),
            })
            .send()
            .await
            .map_err(SignerError::upstream)?;
        if !response.status().is_success() {
            return Err(SignerError::UpstreamUnavailable(format!(
                "chain proxy returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
