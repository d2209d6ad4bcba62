use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use anyhow::Context;
use clap::Parser;

use kms_custody::chain::{ChainClient, HttpChainClient};
use kms_custody::server::{AddressResponse, SignRequest, SignResponse};
use kms_custody::tx::LegacyTransaction;

/// Builds one transfer, has the signing service sign it and optionally
/// hands it to the chain service for broadcast.
#[derive(Parser)]
struct Args {
    #[arg(long, env = "SIGNER_URL", default_value = "http://127.0.0.1:50051")]
    signer_url: String,
    #[arg(long, env = "CHAIN_URL", default_value = "http://127.0.0.1:50052")]
    chain_url: String,
    /// Destination account.
    #[arg(long, default_value = "0x4549f47920997a486e9986d2e3e4540230534a03")]
    to: Address,
    /// Amount in wei.
    #[arg(long, default_value = "100")]
    value: U256,
    #[arg(long, default_value_t = 21_000)]
    gas_limit: u64,
    /// Calldata as hex, with or without a 0x prefix.
    #[arg(long)]
    data: Option<String>,
    /// Submit the signed transaction to the network.
    #[arg(long)]
    broadcast: bool,
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let timeout = Duration::from_secs(args.timeout_secs);
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    let chain = HttpChainClient::new(&args.chain_url, timeout)?;
    let signer_url = args.signer_url.trim_end_matches('/');

    let account: AddressResponse = http
        .get(format!("{signer_url}/address"))
        .send()
        .await
        .context("signing service is unreachable")?
        .error_for_status()?
        .json()
        .await?;
    let from: Address = account.address.parse()?;
    println!("signer account {from}");

    let nonce = chain.pending_nonce(&from).await?;
    let gas_price = chain.suggest_gas_price().await?;
    println!("nonce {nonce}, gas price {gas_price} wei");

    let data = match &args.data {
        Some(text) => {
            let bare = text.strip_prefix("0x").unwrap_or(text);
            Bytes::from(hex::decode(bare).context("calldata is not valid hex")?)
        }
        None => Bytes::new(),
    };
    let tx = LegacyTransaction {
        nonce,
        gas_price,
        gas_limit: args.gas_limit,
        to: Some(args.to),
        value: args.value,
        data,
        ..Default::default()
    };

    let response = http
        .post(format!("{signer_url}/sign"))
        .json(&SignRequest {
            tx: format!("0x{}", hex::encode(tx.encoded())),
        })
        .send()
        .await
        .context("signing service is unreachable")?;
    if !response.status().is_success() {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        anyhow::bail!("signing service refused the transaction ({status}): {message}");
    }
    let signed: SignResponse = response.json().await?;

    let raw = hex::decode(signed.tx.trim_start_matches("0x"))?;
    let decoded = LegacyTransaction::decode_payload(&raw)?;
    println!("signed for {} (v = {})", args.to, decoded.v);
    println!("{}", signed.tx);

    if args.broadcast {
        chain.send_raw_transaction(&raw).await?;
        println!("broadcast accepted");
    }
    Ok(())
}
