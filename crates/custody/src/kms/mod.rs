mod fake;
mod http;

pub use fake::FakeKms;
pub use http::HttpKmsClient;

use std::fmt;

use alloy_primitives::B256;
use async_trait::async_trait;

/// Filter expression selecting the key versions this signer may use.
pub const ENABLED_SECP256K1_FILTER: &str = "state=ENABLED AND algorithm=EC_SIGN_SECP256K1_SHA256";

/// Fully qualified resource name of one crypto key version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyHandle(String);

impl KeyHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw signing result, before any integrity checks have run.
#[derive(Debug, Clone)]
pub struct SignOutput {
    pub der_signature: Vec<u8>,
    /// CRC-32C the service computed over the signature it returned.
    pub signature_crc32c: u32,
    /// Whether the service acknowledged verifying the digest checksum we sent.
    pub verified_digest_crc32c: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("key service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed key service response: {0}")]
    Malformed(String),
    #[error("bad key service configuration: {0}")]
    Config(String),
}

/// Client for an asymmetric-signing key service.
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Resource names of every enabled secp256k1 version under the key.
    async fn list_enabled_versions(&self) -> Result<Vec<String>, KmsError>;

    /// PEM encoded public key of one version.
    async fn public_key_pem(&self, handle: &KeyHandle) -> Result<String, KmsError>;

    /// Signs a 32 byte digest held by `handle`. `digest_crc32c` covers the
    /// digest so corruption in transit is detectable on both ends.
    async fn asymmetric_sign(
        &self,
        handle: &KeyHandle,
        digest: B256,
        digest_crc32c: u32,
    ) -> Result<SignOutput, KmsError>;
}
