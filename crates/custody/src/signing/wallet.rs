use std::sync::Arc;

use alloy_primitives::{Address, U256};
use k256::ecdsa::VerifyingKey;

use super::DigestSigner;
use crate::error::SignerError;
use crate::tx::LegacyTransaction;

/// Ethereum wallet facade over a digest signer: builds the EIP-155 signing
/// hash, requests the raw signature and folds it back into the transaction
/// with the replay protected `v`.
pub struct WalletSigner {
    signer: Arc<dyn DigestSigner>,
}

impl WalletSigner {
    pub fn new(signer: Arc<dyn DigestSigner>) -> Self {
        Self { signer }
    }

    /// Addresses available for signing, primary account first.
    pub async fn accounts(&self) -> Result<Vec<Address>, SignerError> {
        self.signer.addresses().await
    }

    /// Address of the primary account, derived from its public key.
    pub async fn pub_address(&self) -> Result<Address, SignerError> {
        Ok(Address::from_public_key(&self.signer.public_key().await?))
    }

    pub async fn public_key(&self) -> Result<VerifyingKey, SignerError> {
        self.signer.public_key().await
    }

    /// Signs `tx` for `from` under the replay protection of `chain_id`.
    pub async fn sign_tx(
        &self,
        from: &Address,
        tx: &LegacyTransaction,
        chain_id: U256,
    ) -> Result<LegacyTransaction, SignerError> {
        let digest = tx.signing_hash(chain_id);
        let signature = self.signer.sign_digest(from, digest).await?;
        Ok(tx.with_signature(&signature, chain_id))
    }
}
