//! Facilitator service binary.
//!
//! Builds the network registry and chain adapters from the environment
//! and serves the facilitator API over HTTP.
//!
//! Environment variables:
//! - `EVM_PRIVATE_KEY`: facilitator key paying gas on EVM networks
//! - `SOLANA_FEE_PAYER_KEYPAIR`: base58 keypair signing as Solana fee payer
//! - `RPC_URL_<NETWORK>`: RPC endpoint overrides (e.g. `RPC_URL_BASE_SEPOLIA`)
//! - `VERIFY_PREFLIGHT`: set to `1` to enable read-only chain checks in verify
//! - `HOST` / `PORT`: bind address (default `0.0.0.0:3001`)

use anyhow::Context;
use std::sync::Arc;
use x402_facilitator::chain::evm::EvmChain;
use x402_facilitator::chain::solana::SolanaChain;
use x402_facilitator::chain::AdapterMap;
use x402_facilitator::facilitator::{Facilitator, FacilitatorOptions};
use x402_facilitator::http::routes;
use x402_facilitator::registry::{ChainFamily, NetworkRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let mut registry = NetworkRegistry::with_defaults();
    let evm_key = std::env::var("EVM_PRIVATE_KEY").ok();
    let solana_keypair = std::env::var("SOLANA_FEE_PAYER_KEYPAIR").ok();

    let mut adapters: AdapterMap = AdapterMap::new();
    let networks: Vec<(String, x402_facilitator::registry::NetworkEntry)> = registry
        .iter()
        .map(|(name, entry)| (name.clone(), entry.clone()))
        .collect();

    for (network, entry) in networks {
        match entry.family {
            ChainFamily::Evm { .. } => {
                if let Some(key) = &evm_key {
                    let adapter = EvmChain::new(&network, entry, key)
                        .with_context(|| format!("building EVM adapter for {}", network))?;
                    tracing::info!(%network, signer = ?adapter.signer_address(), "EVM network enabled");
                    adapters.insert(network, Arc::new(adapter));
                } else {
                    tracing::warn!(%network, "skipped: EVM_PRIVATE_KEY not set");
                }
            }
            ChainFamily::Solana => {
                if let Some(keypair) = &solana_keypair {
                    let adapter = SolanaChain::new(&network, entry, keypair)
                        .with_context(|| format!("building Solana adapter for {}", network))?;
                    let fee_payer = adapter.fee_payer_pubkey();
                    // Advertise the live fee payer through /supported.
                    if let Some(entry) = registry.network_mut(&network) {
                        entry.fee_payer = Some(fee_payer.clone());
                    }
                    tracing::info!(%network, %fee_payer, "Solana network enabled");
                    adapters.insert(network, Arc::new(adapter));
                } else {
                    tracing::warn!(%network, "skipped: SOLANA_FEE_PAYER_KEYPAIR not set");
                }
            }
        }
    }

    anyhow::ensure!(
        !adapters.is_empty(),
        "no networks enabled; set EVM_PRIVATE_KEY and/or SOLANA_FEE_PAYER_KEYPAIR"
    );

    let options = FacilitatorOptions {
        preflight: std::env::var("VERIFY_PREFLIGHT").map(|v| v == "1").unwrap_or(false),
        ..FacilitatorOptions::default()
    };
    let facilitator = Arc::new(Facilitator::new(registry, adapters, options));

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse()
        .context("invalid PORT")?;
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "facilitator listening");

    axum::serve(listener, routes(facilitator)).await?;
    Ok(())
}
