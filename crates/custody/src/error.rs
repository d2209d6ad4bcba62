use alloy_primitives::Address;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::kms::KmsError;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid transaction payload: {0}")]
    InvalidTransaction(String),
    #[error("No key material held for address {0}")]
    UnknownAddress(Address),
    #[error("Signing request was corrupted before reaching the key store")]
    RequestCorrupted,
    #[error("Signature returned by the key store failed checksum verification")]
    ResponseCorrupted,
    #[error("No recovery id reproduces the signing address")]
    RecoveryIdUnresolved,
    #[error("Remote signing failed: {0}")]
    RemoteSign(String),
    #[error("Destination {0} is barred by the screening policy")]
    PolicyViolation(Address),
    #[error("Upstream dependency unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Failed to connect to upstream: {0}")]
    ConnectionFailed(String),
    #[error("Key enumeration produced no usable signing key")]
    NoUsableKey,
}

impl SignerError {
    pub(crate) fn upstream(error: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable(error.to_string())
    }

    /// Transport failures mean the key store could not be reached; anything
    /// else is the key store refusing or botching the request itself.
    pub(crate) fn from_kms(error: KmsError) -> Self {
        match error {
            KmsError::Transport(inner) => Self::UpstreamUnavailable(inner.to_string()),
            other => Self::RemoteSign(other.to_string()),
        }
    }
}

/// Trait implementation to convert this error into an axum http response
impl IntoResponse for SignerError {
    fn into_response(self) -> Response {
        match self {
            bad_request_error @ (SignerError::InvalidTransaction(_)
            | SignerError::UnknownAddress(_)) => {
                (StatusCode::BAD_REQUEST, bad_request_error.to_string()).into_response()
            }
            policy_error @ SignerError::PolicyViolation(_) => {
                (StatusCode::FORBIDDEN, policy_error.to_string()).into_response()
            }
            upstream_error @ (SignerError::UpstreamUnavailable(_)
            | SignerError::ConnectionFailed(_)) => {
                (StatusCode::BAD_GATEWAY, upstream_error.to_string()).into_response()
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something wrong happened.",
            )
                .into_response(),
        }
    }
}
