mod cache;
mod kms_signer;
mod wallet;

pub use cache::AccountCache;
pub use kms_signer::KmsSigner;
pub use wallet::WalletSigner;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::error::SignerError;

/// Offset legacy Ethereum adds to the recovery id in the trailing byte.
pub const RECOVERY_ID_BASE: u8 = 27;

/// Recoverable signature over a 32 byte digest (65 bytes: r + s + v).
///
/// The recovery id in `v` lets `ecrecover` reproduce the signer's address
/// from the signature alone, which is also how this crate validates that a
/// remote signing call used the key it was supposed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverableSignature([u8; 65]);

impl RecoverableSignature {
    pub fn from_parts(signature: &Signature, v: u8) -> Self {
        debug_assert!(v >= RECOVERY_ID_BASE);
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = v;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn r_bytes(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn s_bytes(&self) -> &[u8] {
        &self.0[32..64]
    }

    /// Trailing byte, 27 or 28.
    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn recovery_id(&self) -> u8 {
        self.0[64] - RECOVERY_ID_BASE
    }

    /// Replay-protected `v` per EIP-155: `recovery_id + 35 + 2 * chain_id`.
    pub fn v_eip155(&self, chain_id: U256) -> U256 {
        U256::from(self.recovery_id()) + U256::from(35) + chain_id * U256::from(2)
    }

    /// Address whose key produced this signature over `digest`.
    pub fn recover_address(&self, digest: B256) -> Result<Address, SignerError> {
        let signature =
            Signature::from_slice(&self.0[..64]).map_err(|_| SignerError::RecoveryIdUnresolved)?;
        let recovery_id =
            RecoveryId::from_byte(self.recovery_id()).ok_or(SignerError::RecoveryIdUnresolved)?;
        let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map_err(|_| SignerError::RecoveryIdUnresolved)?;
        Ok(Address::from_public_key(&key))
    }
}

/// Signs raw digests with keys held somewhere else.
#[async_trait]
pub trait DigestSigner: Send + Sync {
    /// Every address this signer can currently sign for.
    async fn addresses(&self) -> Result<Vec<Address>, SignerError>;

    async fn has_address(&self, address: &Address) -> Result<bool, SignerError> {
        Ok(self.addresses().await?.contains(address))
    }

    /// Signs `digest` with the key behind `address`. The returned signature
    /// is guaranteed to recover to `address`.
    async fn sign_digest(
        &self,
        address: &Address,
        digest: B256,
    ) -> Result<RecoverableSignature, SignerError>;

    /// Public key of the primary account.
    async fn public_key(&self) -> Result<VerifyingKey, SignerError>;
}
