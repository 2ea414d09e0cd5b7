//! Chain adapters.
//!
//! One adapter per configured network knows how to parse its payload
//! shape, verify signatures against the chain's signable-message format,
//! submit the settlement transaction, and poll for finality. Adapters
//! are selected by the `network` tag through a lookup table built at
//! startup from the [`crate::registry::NetworkRegistry`].

pub mod evm;
pub mod solana;

use crate::errors::Result;
use crate::types::{InvalidReason, PaymentPayload, PaymentRequirements};
use async_trait::async_trait;
use ethers::types::U256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

/// Chain-agnostic view of what a payload authorizes, extracted by the
/// adapter so the constraint verifier can run identically across chain
/// families.
#[derive(Debug, Clone)]
pub struct TransferIntent {
    /// The payer whose funds move.
    pub payer: String,

    /// The wallet the funds go to. When the chain-native destination is
    /// derived (a token account), the adapter resolves it back to the
    /// owning wallet where possible, or reports the raw destination.
    pub pay_to: String,

    /// The asset being moved, when the payload names it explicitly.
    /// Account-based payloads bind the asset through the signature's
    /// domain separator instead and leave this empty.
    pub asset: Option<String>,

    /// Authorized amount in the token's smallest unit.
    pub amount: U256,

    /// Start of the validity window, when the payload carries one.
    pub valid_after: Option<u64>,

    /// End of the validity window, when the payload carries one.
    pub valid_before: Option<u64>,

    /// One-time authorization nonce, for chains that use one. The
    /// fee-delegated family relies on the ledger's transaction-id
    /// uniqueness instead.
    pub nonce: Option<String>,
}

/// Why a submission attempt failed, classified by the adapter so the
/// settlement executor can decide whether retrying is safe.
#[derive(Debug, Clone)]
pub enum SubmitError {
    /// Transport-level failure before the transaction reached the
    /// chain. Safe to retry.
    Transport(String),

    /// The chain (or its mempool rules) refused the transaction.
    /// `replayed` is set when the rejection message indicates the
    /// authorization was already consumed; the executor confirms that
    /// against chain state before reporting an idempotent success.
    Rejected {
        /// Chain-reported rejection detail.
        reason: String,
        /// Whether the rejection looks like authorization reuse.
        replayed: bool,
    },
}

/// Outcome of polling a broadcast transaction for finality.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// Included and final enough per the network's assumptions.
    Confirmed,

    /// Executed on-chain but reverted.
    Reverted(String),

    /// Deadline elapsed with the transaction still in flight.
    Pending,
}

/// Capability interface implemented once per chain family, instantiated
/// per network. All methods take the payload and the requirement it was
/// built against; adapters hold their RPC client, signing key, and
/// registry entry for process lifetime and are safe for arbitrary
/// concurrent use.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Network this adapter serves.
    fn network(&self) -> &str;

    /// Parses the chain-native payload into a normalized transfer
    /// intent. Purely structural; no chain access.
    fn extract_intent(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<TransferIntent, InvalidReason>;

    /// Verifies the payload's cryptographic material against the
    /// chain-specific signable message. No chain access.
    async fn verify_signature(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<(), InvalidReason>;

    /// Optional read-only chain checks that short-circuit settlements
    /// certain to fail (spent nonce, insufficient balance). Adapters
    /// without a useful preflight return `Ok(())`.
    async fn preflight(
        &self,
        _payload: &PaymentPayload,
        _requirements: &PaymentRequirements,
    ) -> std::result::Result<(), InvalidReason> {
        Ok(())
    }

    /// Whether the payload's authorization has already been consumed
    /// on-chain. This read is the idempotency source of truth: the
    /// facilitator keeps no local record of settlements.
    async fn nonce_consumed(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<bool>;

    /// Broadcasts the settlement transaction once, returning the
    /// chain-native transaction reference.
    async fn submit(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<String, SubmitError>;

    /// Polls the chain for the fate of a broadcast transaction until
    /// the deadline.
    async fn confirm(&self, tx_ref: &str, deadline: Instant) -> ConfirmOutcome;

    /// One read RPC round-trip, for the deep health probe.
    async fn probe(&self) -> Result<()>;
}

/// Adapter lookup table keyed by network name, built at startup.
pub type AdapterMap = HashMap<String, Arc<dyn ChainAdapter>>;
