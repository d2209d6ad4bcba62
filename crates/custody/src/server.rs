use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SignerError;
use crate::service::SigningService;
use crate::tx::decode_hex_payload;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SigningService>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignRequest {
    /// Hex encoded RLP transaction, with or without a `0x` prefix.
    pub tx: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignResponse {
    pub tx: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

/// Routes of the signing service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/healthcheck",
            get(|| async move { (StatusCode::OK, "Ok").into_response() }),
        )
        .route("/sign", post(sign))
        .route("/address", get(address))
        .route("/public-key", get(public_key))
        .with_state(state)
}

async fn sign(
    State(state): State<AppState>,
    Json(request): Json<SignRequest>,
) -> Result<Json<SignResponse>, SignerError> {
    let raw = decode_hex_payload(&request.tx)?;
    let signed = state.service.sign(&raw).await?;
    Ok(Json(SignResponse {
        tx: format!("0x{}", hex::encode(signed)),
    }))
}

async fn address(State(state): State<AppState>) -> Result<Json<AddressResponse>, SignerError> {
    let address = state.service.signer_address().await?;
    Ok(Json(AddressResponse {
        address: address.to_string(),
    }))
}

async fn public_key(State(state): State<AppState>) -> Result<Json<PublicKeyResponse>, SignerError> {
    let key = state.service.signer_public_key().await?;
    Ok(Json(PublicKeyResponse {
        public_key: format!("0x{}", hex::encode(key)),
    }))
}

/// Binds and serves the signing service until shutdown.
pub async fn run(host: &str, port: u16, state: AppState) -> Result<()> {
    run_router(host, port, router(state), "signer").await
}

/// Serves one of this crate's routers with graceful shutdown.
pub async fn run_router(host: &str, port: u16, router: Router, service: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(service, address = %listener.local_addr()?, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
