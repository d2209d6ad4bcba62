use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kms_custody::chain::HttpChainClient;
use kms_custody::config::{CacheConfig, KmsConfig};
use kms_custody::kms::{FakeKms, HttpKmsClient, KmsClient};
use kms_custody::policy::HttpPolicyClient;
use kms_custody::server::AppState;
use kms_custody::signing::{KmsSigner, WalletSigner};
use kms_custody::{SigningService, init_logging, run};
use tracing::warn;

/// Custodial transaction signing service.
#[derive(Parser, Debug)]
struct Args {
    /// Host to bind on.
    #[arg(long, env = "SIGNERD_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "SIGNERD_PORT", default_value_t = 50051)]
    port: u16,

    /// Base URL of the Cloud KMS REST endpoint.
    #[arg(
        long,
        env = "KMS_ENDPOINT",
        default_value = "https://cloudkms.googleapis.com"
    )]
    kms_endpoint: String,

    /// OAuth bearer token for the key service.
    #[arg(long, env = "KMS_AUTH_TOKEN")]
    kms_auth_token: Option<String>,

    /// Google Cloud project holding the key ring.
    #[arg(long, env = "KMS_PROJECT")]
    kms_project: Option<String>,

    /// Location of the key ring.
    #[arg(long, env = "KMS_LOCATION")]
    kms_location: Option<String>,

    /// Key ring name.
    #[arg(long, env = "KMS_KEY_RING")]
    kms_key_ring: Option<String>,

    /// Crypto key name.
    #[arg(long, env = "KMS_KEY")]
    kms_key: Option<String>,

    /// Pin one key version instead of enumerating enabled ones.
    #[arg(long, env = "KMS_KEY_VERSION")]
    kms_key_version: Option<String>,

    /// Seconds before the cached account list goes stale.
    #[arg(long, env = "SIGNERD_CACHE_TTL_SECS", default_value_t = 60)]
    cache_ttl_secs: u64,

    /// Per-request timeout towards the key service, in seconds.
    #[arg(long, env = "SIGNERD_KMS_TIMEOUT_SECS", default_value_t = 10)]
    kms_timeout_secs: u64,

    /// Base URL of the screening service.
    #[arg(
        long,
        env = "SIGNERD_POLICY_URL",
        default_value = "http://127.0.0.1:50053"
    )]
    policy_url: String,

    /// Base URL of the chain access service.
    #[arg(
        long,
        env = "SIGNERD_CHAIN_URL",
        default_value = "http://127.0.0.1:50052"
    )]
    chain_url: String,

    /// Per-request timeout towards screening and chain, in seconds.
    #[arg(long, env = "SIGNERD_UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    upstream_timeout_secs: u64,

    /// Serve with in-process keys derived from this seed. Development only.
    #[arg(long, env = "SIGNERD_DEV_SEED")]
    dev_seed: Option<String>,
}

fn required(value: Option<String>, flag: &str) -> Result<String> {
    value.with_context(|| format!("--{flag} is required unless --dev-seed is set"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let kms: Arc<dyn KmsClient> = match &args.dev_seed {
        Some(seed) => {
            warn!("running with in-process development keys, do not use in production");
            Arc::new(FakeKms::from_seed(seed)?)
        }
        None => {
            let config = KmsConfig {
                endpoint: args.kms_endpoint.clone(),
                auth_token: args.kms_auth_token.clone(),
                project: required(args.kms_project.clone(), "kms-project")?,
                location: required(args.kms_location.clone(), "kms-location")?,
                key_ring: required(args.kms_key_ring.clone(), "kms-key-ring")?,
                key: required(args.kms_key.clone(), "kms-key")?,
                key_version: args.kms_key_version.clone(),
                request_timeout: Duration::from_secs(args.kms_timeout_secs),
            };
            Arc::new(HttpKmsClient::new(config)?)
        }
    };

    let cache = CacheConfig {
        ttl: Duration::from_secs(args.cache_ttl_secs),
    };
    let signer = KmsSigner::connect(kms, cache).await?;
    let wallet = WalletSigner::new(Arc::new(signer));

    let upstream_timeout = Duration::from_secs(args.upstream_timeout_secs);
    let policy = HttpPolicyClient::new(&args.policy_url, upstream_timeout)?;
    let chain = HttpChainClient::new(&args.chain_url, upstream_timeout)?;

    let service = SigningService::new(wallet, Arc::new(policy), Arc::new(chain));
    let state = AppState {
        service: Arc::new(service),
    };
    run(&args.host, args.port, state).await
}
