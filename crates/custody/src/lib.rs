pub mod chain;
pub mod config;
pub mod error;
pub mod kms;
pub mod policy;
pub mod server;
pub mod service;
pub mod signing;
pub mod tx;

pub use error::SignerError;
pub use server::{AppState, router, run};
pub use service::SigningService;
pub use signing::{DigestSigner, KmsSigner, RecoverableSignature, WalletSigner};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global tracing subscriber, honouring `RUST_LOG`.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
