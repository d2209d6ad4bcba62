use std::sync::Arc;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use k256::ecdsa::{Signature, VerifyingKey};
use k256::pkcs8::DecodePublicKey;

use super::{AccountCache, DigestSigner, RECOVERY_ID_BASE, RecoverableSignature};
use crate::config::CacheConfig;
use crate::error::SignerError;
use crate::kms::KmsClient;

/// Digest signer whose private keys never leave the key service.
///
/// Every signing call is checksummed in both directions with CRC-32C and
/// the returned signature is only accepted once it recovers to the address
/// it was requested for.
pub struct KmsSigner {
    client: Arc<dyn KmsClient>,
    cache: AccountCache,
}

impl std::fmt::Debug for KmsSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsSigner")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl KmsSigner {
    /// Enumerates the key ring once and fails fast if it is unreachable or
    /// holds no usable key.
    pub async fn connect(
        client: Arc<dyn KmsClient>,
        config: CacheConfig,
    ) -> Result<Self, SignerError> {
        let cache = AccountCache::new(client.clone(), config).await?;
        Ok(Self { client, cache })
    }
}

#[async_trait]
impl DigestSigner for KmsSigner {
    async fn addresses(&self) -> Result<Vec<Address>, SignerError> {
        Ok(self.cache.current().await?.addresses())
    }

    async fn has_address(&self, address: &Address) -> Result<bool, SignerError> {
        Ok(self.cache.current().await?.contains(address))
    }

    async fn sign_digest(
        &self,
        address: &Address,
        digest: B256,
    ) -> Result<RecoverableSignature, SignerError> {
        let snapshot = self.cache.current().await?;
        let handle = snapshot
            .lookup(address)
            .ok_or(SignerError::UnknownAddress(*address))?;

        let digest_crc32c = crc32c::crc32c(digest.as_slice());
        let output = self
            .client
            .asymmetric_sign(handle, digest, digest_crc32c)
            .await
            .map_err(SignerError::from_kms)?;

        if !output.verified_digest_crc32c {
            return Err(SignerError::RequestCorrupted);
        }
        if crc32c::crc32c(&output.der_signature) != output.signature_crc32c {
            return Err(SignerError::ResponseCorrupted);
        }

        assemble_signature(&output.der_signature, digest, *address)
    }

    async fn public_key(&self) -> Result<VerifyingKey, SignerError> {
        let snapshot = self.cache.current().await?;
        let handle = snapshot.primary_handle().ok_or(SignerError::NoUsableKey)?;
        let pem = self
            .client
            .public_key_pem(handle)
            .await
            .map_err(SignerError::from_kms)?;
        VerifyingKey::from_public_key_pem(&pem)
            .map_err(|err| SignerError::RemoteSign(format!("public key pem: {err}")))
    }
}

/// Turns a DER signature from the key service into the recoverable form.
///
/// The key service has no notion of recovery ids, so try the base value and
/// its complement, accepting whichever recovers the expected address. High
/// `s` values are folded into the canonical low half first.
fn assemble_signature(
    der: &[u8],
    digest: B256,
    expected: Address,
) -> Result<RecoverableSignature, SignerError> {
    let parsed = Signature::from_der(der)
        .map_err(|err| SignerError::RemoteSign(format!("signature DER: {err}")))?;
    let parsed = parsed.normalize_s().unwrap_or(parsed);

    for v in [RECOVERY_ID_BASE, RECOVERY_ID_BASE + 1] {
        let candidate = RecoverableSignature::from_parts(&parsed, v);
        if candidate.recover_address(digest).ok() == Some(expected) {
            return Ok(candidate);
        }
    }
    Err(SignerError::RecoveryIdUnresolved)
}
