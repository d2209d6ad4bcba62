use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use k256::ecdsa::VerifyingKey;
use k256::pkcs8::DecodePublicKey;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::SignerError;
use crate::kms::{KeyHandle, KmsClient, KmsError};

/// One enumeration of the key ring: every enabled version resolved to the
/// address of its public key.
#[derive(Debug)]
pub struct Snapshot {
    accounts: HashMap<Address, KeyHandle>,
    primary: Address,
    loaded_at: Instant,
}

impl Snapshot {
    pub fn lookup(&self, address: &Address) -> Option<&KeyHandle> {
        self.accounts.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// First listed address, the account used when callers do not name one.
    pub fn primary(&self) -> Address {
        self.primary
    }

    pub fn primary_handle(&self) -> Option<&KeyHandle> {
        self.accounts.get(&self.primary)
    }

    /// All addresses, primary first, the rest in stable order.
    pub fn addresses(&self) -> Vec<Address> {
        let mut rest: Vec<Address> = self
            .accounts
            .keys()
            .copied()
            .filter(|address| *address != self.primary)
            .collect();
        rest.sort_unstable();
        rest.insert(0, self.primary);
        rest
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() > ttl
    }
}

/// Address book over the key service, reloaded at most once per TTL window.
///
/// Readers always get a complete snapshot. A reload builds the replacement
/// off to the side and swaps it in whole, and the reload mutex collapses
/// concurrent stale readers into a single upstream enumeration.
pub struct AccountCache {
    client: Arc<dyn KmsClient>,
    ttl: Duration,
    snapshot: RwLock<Arc<Snapshot>>,
    reload: Mutex<()>,
}

impl std::fmt::Debug for AccountCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCache")
            .field("ttl", &self.ttl)
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl AccountCache {
    /// Performs the initial enumeration. An unreachable key service or an
    /// empty key ring is a startup failure, not something to retry into.
    pub async fn new(client: Arc<dyn KmsClient>, config: CacheConfig) -> Result<Self, SignerError> {
        let snapshot = enumerate(client.as_ref())
            .await
            .map_err(|err| SignerError::ConnectionFailed(err.to_string()))?
            .ok_or(SignerError::NoUsableKey)?;
        Ok(Self {
            client,
            ttl: config.ttl,
            snapshot: RwLock::new(Arc::new(snapshot)),
            reload: Mutex::new(()),
        })
    }

    /// Current snapshot, refreshed first if the TTL has lapsed.
    pub async fn current(&self) -> Result<Arc<Snapshot>, SignerError> {
        let snapshot = self.snapshot.read().await.clone();
        if !snapshot.is_stale(self.ttl) {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<Arc<Snapshot>, SignerError> {
        let _guard = self.reload.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        let snapshot = self.snapshot.read().await.clone();
        if !snapshot.is_stale(self.ttl) {
            return Ok(snapshot);
        }
        let fresh = enumerate(self.client.as_ref())
            .await
            .map_err(SignerError::upstream)?
            .ok_or(SignerError::NoUsableKey)?;
        let fresh = Arc::new(fresh);
        *self.snapshot.write().await = fresh.clone();
        debug!(accounts = fresh.len(), "account cache refreshed");
        Ok(fresh)
    }
}

/// Walks the key ring and resolves each enabled version to an address.
/// Returns `None` when the ring has no usable version at all.
async fn enumerate(client: &dyn KmsClient) -> Result<Option<Snapshot>, KmsError> {
    let versions = client.list_enabled_versions().await?;
    let mut accounts = HashMap::with_capacity(versions.len());
    let mut primary = None;
    for name in versions {
        let handle = KeyHandle::new(name);
        let pem = client.public_key_pem(&handle).await?;
        let key = VerifyingKey::from_public_key_pem(&pem)
            .map_err(|err| KmsError::Malformed(format!("public key pem for {handle}: {err}")))?;
        let address = Address::from_public_key(&key);
        if primary.is_none() {
            primary = Some(address);
        }
        if let Some(dropped) = accounts.insert(address, handle) {
            warn!(%address, %dropped, "key versions share an address, keeping the later one");
        }
    }
    Ok(primary.map(|primary| Snapshot {
        accounts,
        primary,
        loaded_at: Instant::now(),
    }))
}
