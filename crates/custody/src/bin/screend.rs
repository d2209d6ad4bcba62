use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::Result;
use clap::Parser;
use kms_custody::init_logging;
use kms_custody::policy::{ScreeningState, StaticBlocklist, screening_router};
use kms_custody::server::run_router;
use tracing::{info, warn};

/// Destination screening service.
#[derive(Parser, Debug)]
struct Args {
    /// Host to bind on.
    #[arg(long, env = "SCREEND_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "SCREEND_PORT", default_value_t = 50053)]
    port: u16,

    /// Addresses to refuse, comma separated.
    #[arg(long, env = "SCREEND_BLOCKLIST", value_delimiter = ',')]
    block: Vec<Address>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let blocklist = StaticBlocklist::new(args.block);
    if blocklist.is_empty() {
        warn!("screening with an empty blocklist, every destination will pass");
    } else {
        info!(entries = blocklist.len(), "loaded blocklist");
    }

    let state = ScreeningState {
        blocklist: Arc::new(blocklist),
    };
    run_router(&args.host, args.port, screening_router(state), "screening").await
}
