use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SignerError;

/// Compliance verdict provider consulted before every signature.
#[async_trait]
pub trait PolicyClient: Send + Sync {
    async fn is_blocked(&self, address: &Address) -> Result<bool, SignerError>;
}

/// Fixed set of barred destination addresses.
#[derive(Debug, Clone, Default)]
pub struct StaticBlocklist {
    addresses: HashSet<Address>,
}

impl StaticBlocklist {
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[async_trait]
impl PolicyClient for StaticBlocklist {
    async fn is_blocked(&self, address: &Address) -> Result<bool, SignerError> {
        Ok(self.contains(address))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckRequest {
    pub address: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub blocked: bool,
}

/// Asks a screening service over HTTP whether an address is barred.
pub struct HttpPolicyClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPolicyClient {
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
}

#[async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn is_blocked(&self, address: &Address) -> Result<bool, SignerError> {
        let response = self
            .http
            .post(format!("{}/check", self.base_url))
            .json(&CheckRequest { address: *address })
            .send()
            .await
            .map_err(SignerError::upstream)?;
        if !response.status().is_success() {
            return Err(SignerError::UpstreamUnavailable(format!(
                "screening service returned {}",
                response.status()
            )));
        }
        let verdict: CheckResponse = response.json().await.map_err(SignerError::upstream)?;
        Ok(verdict.blocked)
    }
}

#[derive(Clone)]
pub struct ScreeningState {
    pub blocklist: Arc<StaticBlocklist>,
}

/// Router for the standalone screening service.
pub fn screening_router(state: ScreeningState) -> Router {
    Router::new()
        .route(
            "/healthcheck",
            get(|| async move { (StatusCode::OK, "Ok").into_response() }),
        )
        .route("/check", post(check_address))
        .with_state(state)
}

async fn check_address(
    State(state): State<ScreeningState>,
    Json(request): Json<CheckRequest>,
) -> Json<CheckResponse> {
    let blocked = state.blocklist.contains(&request.address);
    if blocked {
        info!(address = %request.address, "screening rejected destination");
    }
    Json(CheckResponse { blocked })
}
