//! Network and asset registry.
//!
//! Static configuration describing which (scheme, network, asset)
//! combinations the facilitator serves, plus the chain-specific metadata
//! each needs: chain ids and EIP-712 domains for account-based networks,
//! the designated fee payer for fee-delegated networks. Built once at
//! startup; the adapter lookup table is derived from it.

use crate::types::{Scheme, SupportedKind, SupportedResponse, X402_VERSION};
use serde_json::json;
use std::collections::HashMap;

/// Chain family a network belongs to, selecting the adapter variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFamily {
    /// Account-based EVM chain with EIP-3009 token support.
    Evm {
        /// Numeric chain id used in the EIP-712 domain separator.
        chain_id: u64,
    },
    /// Fee-delegated Solana chain.
    Solana,
}

/// EIP-712 domain fields of an EIP-3009 token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    /// Token name as registered in the contract's domain separator.
    pub name: String,
    /// Domain version string.
    pub version: String,
}

/// One asset the facilitator settles on a given network.
#[derive(Debug, Clone)]
pub struct AssetEntry {
    /// Token contract address (EVM) or mint (Solana).
    pub address: String,
    /// Token decimals.
    pub decimals: u8,
    /// EIP-712 domain, for EVM assets.
    pub eip712: Option<Eip712Domain>,
}

/// Configuration for one supported network.
#[derive(Debug, Clone)]
pub struct NetworkEntry {
    /// Chain family and family-specific parameters.
    pub family: ChainFamily,
    /// RPC endpoint for this network.
    pub rpc_url: String,
    /// Assets accepted on this network.
    pub assets: Vec<AssetEntry>,
    /// Schemes advertised for this network.
    pub schemes: Vec<Scheme>,
    /// Designated fee-payer public key (base58), Solana networks only.
    pub fee_payer: Option<String>,
}

/// Registry of every network the facilitator serves.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: HashMap<String, NetworkEntry>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the canonical USDC (and GLUE) deployments
    /// on the networks this facilitator is usually run against. RPC URLs
    /// honor `RPC_URL_<NETWORK>` environment overrides.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.insert(
            "base",
            NetworkEntry {
                family: ChainFamily::Evm { chain_id: 8453 },
                rpc_url: rpc_url_for("base", "https://mainnet.base.org"),
                assets: vec![AssetEntry {
                    address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
                    decimals: 6,
                    eip712: Some(Eip712Domain {
                        name: "USD Coin".to_string(),
                        version: "2".to_string(),
                    }),
                }],
                schemes: vec![Scheme::Exact],
                fee_payer: None,
            },
        );

        registry.insert(
            "base-sepolia",
            NetworkEntry {
                family: ChainFamily::Evm { chain_id: 84532 },
                rpc_url: rpc_url_for("base-sepolia", "https://sepolia.base.org"),
                assets: vec![AssetEntry {
                    address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string(),
                    decimals: 6,
                    eip712: Some(Eip712Domain {
                        name: "USDC".to_string(),
                        version: "2".to_string(),
                    }),
                }],
                schemes: vec![Scheme::Exact],
                fee_payer: None,
            },
        );

        registry.insert(
            "avalanche-fuji",
            NetworkEntry {
                family: ChainFamily::Evm { chain_id: 43113 },
                rpc_url: rpc_url_for(
                    "avalanche-fuji",
                    "https://api.avax-test.network/ext/bc/C/rpc",
                ),
                assets: vec![AssetEntry {
                    address: "0x3D19A80b3bD5CC3a4E55D4b5B753bC36d6A44743".to_string(),
                    decimals: 6,
                    eip712: Some(Eip712Domain {
                        name: "Gasless Ultravioleta DAO Extended Token".to_string(),
                        version: "1".to_string(),
                    }),
                }],
                schemes: vec![Scheme::Exact],
                fee_payer: None,
            },
        );

        registry.insert(
            "solana",
            NetworkEntry {
                family: ChainFamily::Solana,
                rpc_url: rpc_url_for("solana", "https://api.mainnet-beta.solana.com"),
                assets: vec![AssetEntry {
                    address: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
                    decimals: 6,
                    eip712: None,
                }],
                schemes: vec![Scheme::Exact],
                fee_payer: None,
            },
        );

        registry.insert(
            "solana-devnet",
            NetworkEntry {
                family: ChainFamily::Solana,
                rpc_url: rpc_url_for("solana-devnet", "https://api.devnet.solana.com"),
                assets: vec![AssetEntry {
                    address: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU".to_string(),
                    decimals: 6,
                    eip712: None,
                }],
                schemes: vec![Scheme::Exact],
                fee_payer: None,
            },
        );

        registry
    }

    /// Adds or replaces a network entry.
    pub fn insert(&mut self, network: impl Into<String>, entry: NetworkEntry) {
        self.networks.insert(network.into(), entry);
    }

    /// Looks up a network entry.
    pub fn network(&self, network: &str) -> Option<&NetworkEntry> {
        self.networks.get(network)
    }

    /// Mutable lookup, used at startup to stamp in fee-payer keys.
    pub fn network_mut(&mut self, network: &str) -> Option<&mut NetworkEntry> {
        self.networks.get_mut(network)
    }

    /// Looks up an asset on a network. EVM addresses compare
    /// case-insensitively; base58 mints compare exactly.
    pub fn asset(&self, network: &str, asset: &str) -> Option<&AssetEntry> {
        self.networks.get(network)?.assets.iter().find(|entry| {
            crate::utils::addresses_equal(&entry.address, asset)
        })
    }

    /// Iterates over all configured networks.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &NetworkEntry)> {
        self.networks.iter()
    }

    /// Static capability advertisement for the `/supported` endpoint.
    pub fn supported_kinds(&self) -> SupportedResponse {
        let mut kinds = Vec::new();
        for (network, entry) in &self.networks {
            for asset in &entry.assets {
                for scheme in &entry.schemes {
                    kinds.push(SupportedKind {
                        x402_version: X402_VERSION,
                        scheme: *scheme,
                        network: network.clone(),
                        asset: asset.address.clone(),
                        extra: kind_extra(entry, asset),
                    });
                }
            }
        }
        kinds.sort_by(|a, b| (&a.network, &a.asset).cmp(&(&b.network, &b.asset)));
        SupportedResponse { kinds }
    }
}

fn kind_extra(entry: &NetworkEntry, asset: &AssetEntry) -> Option<serde_json::Value> {
    match &entry.family {
        ChainFamily::Evm { .. } => asset.eip712.as_ref().map(|domain| {
            json!({
                "name": domain.name,
                "version": domain.version,
            })
        }),
        ChainFamily::Solana => entry
            .fee_payer
            .as_ref()
            .map(|fee_payer| json!({ "feePayer": fee_payer })),
    }
}

fn rpc_url_for(network: &str, default: &str) -> String {
    let var = format!("RPC_URL_{}", network.to_uppercase().replace('-', "_"));
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}
