use std::fmt;
use std::time::Duration;

/// Where to reach the key management service and which key ring to use.
///
/// The resource path pieces follow the Google Cloud KMS naming scheme:
/// `projects/*/locations/*/keyRings/*/cryptoKeys/*`.
#[derive(Clone)]
pub struct KmsConfig {
    pub endpoint: String,
    pub auth_token: Option<String>,
    pub project: String,
    pub location: String,
    pub key_ring: String,
    pub key: String,
    /// Pin a single key version instead of enumerating enabled ones.
    pub key_version: Option<String>,
    pub request_timeout: Duration,
}

impl KmsConfig {
    /// Fully qualified resource name of the crypto key, without a version.
    pub fn key_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            self.project, self.location, self.key_ring, self.key
        )
    }

    /// Resource name of the pinned key version, when one is configured.
    pub fn key_version_name(&self) -> Option<String> {
        self.key_version
            .as_ref()
            .map(|version| format!("{}/cryptoKeyVersions/{version}", self.key_name()))
    }
}

impl fmt::Debug for KmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("project", &self.project)
            .field("location", &self.location)
            .field("key_ring", &self.key_ring)
            .field("key", &self.key)
            .field("key_version", &self.key_version)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Staleness policy for the cached address-to-key mapping.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
        }
    }
}
