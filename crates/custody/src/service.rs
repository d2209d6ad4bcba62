use std::sync::Arc;

use alloy_primitives::Address;
use tracing::{info, warn};

use crate::chain::ChainClient;
use crate::error::SignerError;
use crate::policy::PolicyClient;
use crate::signing::WalletSigner;
use crate::tx::LegacyTransaction;

/// The signing pipeline: screen the destination, pin the chain id, sign
/// with the custodial key and hand back a broadcastable payload.
pub struct SigningService {
    wallet: WalletSigner,
    policy: Arc<dyn PolicyClient>,
    chain: Arc<dyn ChainClient>,
}

impl SigningService {
    pub fn new(
        wallet: WalletSigner,
        policy: Arc<dyn PolicyClient>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            wallet,
            policy,
            chain,
        }
    }

    /// Signs an RLP encoded legacy transaction with the primary account.
    ///
    /// No signature is produced unless the destination passed screening,
    /// and a screening outage is an outage, not an approval.
    pub async fn sign(&self, raw: &[u8]) -> Result<Vec<u8>, SignerError> {
        let tx = LegacyTransaction::decode_payload(raw)?;

        // Contract creations are screened as the zero address.
        let destination = tx.to.unwrap_or(Address::ZERO);
        if self.policy.is_blocked(&destination).await? {
            warn!(address = %destination, "refusing to sign, destination is blocklisted");
            return Err(SignerError::PolicyViolation(destination));
        }

        // The chain id is fetched per request, never cached.
        let chain_id = self.chain.chain_id().await?;
        let from = self.primary_account().await?;
        let signed = self.wallet.sign_tx(&from, &tx, chain_id).await?;
        info!(
            %from,
            to = %destination,
            nonce = signed.nonce,
            %chain_id,
            "signed transaction"
        );
        Ok(signed.encoded())
    }

    pub async fn signer_address(&self) -> Result<Address, SignerError> {
        self.wallet.pub_address().await
    }

    /// Uncompressed SEC1 public key of the signing account.
    pub async fn signer_public_key(&self) -> Result<Vec<u8>, SignerError> {
        Ok(self
            .wallet
            .public_key()
            .await?
            .to_encoded_point(false)
            .as_bytes()
            .to_vec())
    }

    async fn primary_account(&self) -> Result<Address, SignerError> {
        self.wallet
            .accounts()
            .await?
            .first()
            .copied()
            .ok_or(SignerError::NoUsableKey)
    }
}
