use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use kms_custody::chain::{ChainProxyState, NodeClient, chain_proxy_router};
use kms_custody::init_logging;
use kms_custody::server::run_router;

/// Chain access service, a thin proxy over an Ethereum JSON-RPC node.
#[derive(Parser, Debug)]
struct Args {
    /// Host to bind on.
    #[arg(long, env = "CHAIND_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "CHAIND_PORT", default_value_t = 50052)]
    port: u16,

    /// JSON-RPC endpoint of the Ethereum node.
    #[arg(long, env = "CHAIND_RPC_URL", default_value = "https://rpc.flashbots.net")]
    rpc_url: String,

    /// Per-request timeout towards the node, in seconds.
    #[arg(long, env = "CHAIND_RPC_TIMEOUT_SECS", default_value_t = 10)]
    rpc_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let node = NodeClient::new(&args.rpc_url, Duration::from_secs(args.rpc_timeout_secs))?;
    let state = ChainProxyState {
        node: Arc::new(node),
    };
    run_router(&args.host, args.port, chain_proxy_router(state), "chain").await
}
