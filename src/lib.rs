//! # x402-facilitator
//!
//! A payment facilitator for the x402 protocol: it lets a payer
//! authorize a stablecoin transfer off-chain by signing a structured
//! message, and executes that transfer on-chain on the payer's behalf,
//! without the payer ever holding native gas currency.
//!
//! The facilitator sits between a resource server (seller) that demands
//! payment before releasing a response and a client (buyer) that
//! supplies a signed authorization:
//!
//! 1. The seller rejects an unpaid request with HTTP 402 carrying one or
//!    more [`types::PaymentRequirements`].
//! 2. The buyer signs an authorization satisfying a requirement and
//!    resends the request with the encoded [`types::PaymentPayload`] in
//!    the `X-PAYMENT` header.
//! 3. The seller forwards payload and requirement to
//!    [`facilitator::Facilitator::verify`]; only on a valid result does
//!    it produce its paid response.
//! 4. The seller then calls [`facilitator::Facilitator::settle`], and
//!    the facilitator submits the on-chain transaction, paying the gas.
//!
//! ## Chain families
//!
//! - **Account-based EVM networks** ([`chain::evm`]): EIP-3009
//!   `transferWithAuthorization` with EIP-712 signatures, recovered and
//!   checked against the declared payer.
//! - **Fee-delegated Solana networks** ([`chain::solana`]): SPL-token
//!   `TransferChecked` transactions pre-signed by the payer, completed
//!   with the facilitator's fee-payer signature at settlement.
//!
//! ## Exactly-once settlement without local state
//!
//! The facilitator stores nothing between requests. Replay protection
//! and idempotency rest on the ledger itself: the token contract
//! consumes each authorization nonce atomically, and the settlement
//! executor reads that state back instead of keeping its own record, so
//! duplicate or concurrent settle calls for the same payload are safe on
//! any number of facilitator replicas.
//!
//! ## Running a facilitator
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use x402_facilitator::chain::AdapterMap;
//! use x402_facilitator::chain::evm::EvmChain;
//! use x402_facilitator::facilitator::{Facilitator, FacilitatorOptions};
//! use x402_facilitator::registry::NetworkRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = NetworkRegistry::with_defaults();
//! let entry = registry.network("base-sepolia").unwrap().clone();
//!
//! let mut adapters = AdapterMap::new();
//! adapters.insert(
//!     "base-sepolia".to_string(),
//!     Arc::new(EvmChain::new("base-sepolia", entry, "0xYOUR_PRIVATE_KEY")?),
//! );
//!
//! let facilitator = Facilitator::new(registry, adapters, FacilitatorOptions::default());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod chain;
pub mod errors;
pub mod facilitator;
pub mod http;
pub mod registry;
pub mod settlement;
pub mod types;
pub mod utils;
pub mod verify;

// Re-export commonly used items
pub use errors::{FacilitatorError, Result};
pub use types::{
    InvalidReason, PaymentPayload, PaymentRequirements, SettleRequest, SettleResponse,
    SupportedKind, SupportedResponse, TransferAuthorization, VerifyRequest, VerifyResponse,
    X402_VERSION,
};
