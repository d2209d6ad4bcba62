use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use k256::ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner};
use k256::pkcs8::{EncodePublicKey, LineEnding};
use sha2::{Digest, Sha256};

use super::{KeyHandle, KmsClient, KmsError, SignOutput};

/// In-process stand-in for the real key service.
///
/// Keys derive from string seeds so development runs and tests are
/// reproducible. The failure toggles let tests trip each integrity check
/// without a misbehaving network.
pub struct FakeKms {
    keys: BTreeMap<String, SigningKey>,
    /// Valid key that is deliberately absent from `keys`.
    foreign_key: SigningKey,
    list_calls: AtomicUsize,
    sign_calls: AtomicUsize,
    report_unverified_request: AtomicBool,
    corrupt_response_checksum: AtomicBool,
    mangle_signature: AtomicBool,
    sign_with_foreign_key: AtomicBool,
    fail_listing: AtomicBool,
}

fn version_name(index: usize) -> String {
    format!(
        "projects/local/locations/global/keyRings/dev/cryptoKeys/signer/cryptoKeyVersions/{}",
        index + 1
    )
}

fn key_from_seed(seed: &str) -> Result<SigningKey> {
    let hash = Sha256::digest(seed.as_bytes());
    SigningKey::from_bytes((&hash).into()).map_err(|e| anyhow::anyhow!("invalid seed: {e}"))
}

impl FakeKms {
    pub fn from_seed(seed: &str) -> Result<Self> {
        Self::from_seeds(&[seed])
    }

    pub fn from_seeds(seeds: &[&str]) -> Result<Self> {
        let mut keys = BTreeMap::new();
        for (index, seed) in seeds.iter().enumerate() {
            keys.insert(version_name(index), key_from_seed(seed)?);
        }
        Self::build(keys)
    }

    pub fn from_signing_key(key: SigningKey) -> Result<Self> {
        let mut keys = BTreeMap::new();
        keys.insert(version_name(0), key);
        Self::build(keys)
    }

    fn build(keys: BTreeMap<String, SigningKey>) -> Result<Self> {
        Ok(Self {
            keys,
            foreign_key: key_from_seed("someone-else-entirely")?,
            list_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
            report_unverified_request: AtomicBool::new(false),
            corrupt_response_checksum: AtomicBool::new(false),
            mangle_signature: AtomicBool::new(false),
            sign_with_foreign_key: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
        })
    }

    /// Addresses of the held keys, in version order.
    pub fn addresses(&self) -> Vec<Address> {
        self.keys
            .values()
            .map(|key| Address::from_public_key(key.verifying_key()))
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Claim the request checksum did not verify.
    pub fn set_report_unverified_request(&self, on: bool) {
        self.report_unverified_request.store(on, Ordering::SeqCst);
    }

    /// Return a checksum that does not match the signature bytes.
    pub fn set_corrupt_response_checksum(&self, on: bool) {
        self.corrupt_response_checksum.store(on, Ordering::SeqCst);
    }

    /// Truncate the DER signature, with a checksum matching the damage.
    pub fn set_mangle_signature(&self, on: bool) {
        self.mangle_signature.store(on, Ordering::SeqCst);
    }

    /// Sign with a key that belongs to nobody in the key ring.
    pub fn set_sign_with_foreign_key(&self, on: bool) {
        self.sign_with_foreign_key.store(on, Ordering::SeqCst);
    }

    /// Fail version enumeration outright.
    pub fn set_fail_listing(&self, on: bool) {
        self.fail_listing.store(on, Ordering::SeqCst);
    }

    fn lookup(&self, handle: &KeyHandle) -> Result<&SigningKey, KmsError> {
        self.keys.get(handle.as_str()).ok_or_else(|| KmsError::Api {
            status: 404,
            message: format!("no such key version: {handle}"),
        })
    }
}

#[async_trait]
impl KmsClient for FakeKms {
    async fn list_enabled_versions(&self) -> Result<Vec<String>, KmsError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(KmsError::Api {
                status: 500,
                message: "key version listing is disabled".into(),
            });
        }
        Ok(self.keys.keys().cloned().collect())
    }

    async fn public_key_pem(&self, handle: &KeyHandle) -> Result<String, KmsError> {
        let key = self.lookup(handle)?;
        key.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KmsError::Malformed(format!("pem encode: {e}")))
    }

    async fn asymmetric_sign(
        &self,
        handle: &KeyHandle,
        digest: B256,
        digest_crc32c: u32,
    ) -> Result<SignOutput, KmsError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        let key = if self.sign_with_foreign_key.load(Ordering::SeqCst) {
            &self.foreign_key
        } else {
            self.lookup(handle)?
        };
        let signature: Signature = key.sign_prehash(digest.as_slice()).map_err(|e| {
            KmsError::Api {
                status: 500,
                message: format!("signing failed: {e}"),
            }
        })?;
        let mut der_signature = signature.to_der().as_bytes().to_vec();
        if self.mangle_signature.load(Ordering::SeqCst) {
            der_signature.truncate(der_signature.len() / 2);
        }
        let mut signature_crc32c = crc32c::crc32c(&der_signature);
        if self.corrupt_response_checksum.load(Ordering::SeqCst) {
            signature_crc32c ^= 1;
        }
        let verified_digest_crc32c = !self.report_unverified_request.load(Ordering::SeqCst)
            && digest_crc32c == crc32c::crc32c(digest.as_slice());
        Ok(SignOutput {
            der_signature,
            signature_crc32c,
            verified_digest_crc32c,
        })
    }
}
