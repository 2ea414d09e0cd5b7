//! Core type definitions for the facilitator protocol surface.
//!
//! This module contains the wire-level data structures exchanged between
//! buyers, sellers, and the facilitator: payment requirements, payment
//! payloads, and the verification/settlement request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Version of the x402 protocol.
pub const X402_VERSION: u32 = 1;

/// Payment scheme identifier.
///
/// `Exact` requires the authorized value to equal `maxAmountRequired`;
/// `UpTo` accepts any value up to and including it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Pay exactly the required amount.
    Exact,
    /// Pay any amount up to the required maximum.
    UpTo,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Exact => write!(f, "exact"),
            Scheme::UpTo => write!(f, "upto"),
        }
    }
}

/// Describes the payment a seller demands before releasing a resource.
///
/// Issued by a seller in a 402 response and forwarded verbatim to the
/// facilitator alongside the payload it is meant to satisfy. `extra`
/// carries chain-specific material the client needs to build a valid
/// signature: the EIP-712 domain (`name`/`version`) for account-based
/// chains, or the designated `feePayer` public key for fee-delegated
/// chains.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme the seller accepts.
    pub scheme: Scheme,

    /// Network identifier (e.g. "base", "base-sepolia", "solana").
    pub network: String,

    /// Token contract address (EVM) or mint address (Solana).
    pub asset: String,

    /// Recipient address for the payment.
    pub pay_to: String,

    /// Maximum amount required, in the token's smallest unit.
    /// String-encoded to round-trip uint256 values.
    pub max_amount_required: String,

    /// Seconds the authorization is expected to remain valid.
    pub valid_duration_seconds: u64,

    /// The resource being paid for, if the seller chose to identify it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Human-readable description of what the payment is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Chain-specific signing material (EIP-712 domain fields, fee payer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// EIP-3009 `transferWithAuthorization` parameters: the payer's signed
/// intent to move `value` from `from` to `to` within a time window.
///
/// `nonce` is a random 32-byte value chosen by the payer; the token
/// contract enforces its single use, not the facilitator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    /// Address of the payer (token holder).
    pub from: String,

    /// Address of the payee.
    pub to: String,

    /// Amount to transfer (uint256 as decimal string).
    pub value: String,

    /// Unix timestamp after which the authorization becomes valid.
    pub valid_after: String,

    /// Unix timestamp before which the authorization must be used.
    pub valid_before: String,

    /// Unique 32-byte nonce as 0x-prefixed hex.
    pub nonce: String,
}

/// Scheme payload for account-based (EVM) networks: an authorization
/// plus the payer's EIP-712 signature over it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    /// 65-byte r||s||v signature as 0x-prefixed hex.
    pub signature: String,

    /// The signed authorization.
    pub authorization: TransferAuthorization,
}

/// Scheme payload for fee-delegated (Solana) networks: a serialized
/// transaction signed by the payer in every required slot except the
/// fee-payer slot, which the facilitator fills at settlement.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaPayload {
    /// Base64-encoded serialized transaction.
    pub transaction: String,
}

/// Chain-family payload union, auto-detected on deserialization.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ExactPayload {
    /// Account-based chain payload (signature + authorization).
    Evm(ExactEvmPayload),
    /// Fee-delegated chain payload (partially-signed transaction).
    Solana(ExactSolanaPayload),
}

/// Payment payload carried in the `X-PAYMENT` header.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version.
    #[serde(rename = "x402Version")]
    pub x402_version: u32,

    /// Payment scheme used.
    pub scheme: Scheme,

    /// Network identifier.
    pub network: String,

    /// Chain-specific payment data.
    pub payload: ExactPayload,
}

/// Request body for the facilitator's `/verify` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version.
    #[serde(rename = "x402Version", default = "default_version")]
    pub x402_version: u32,

    /// The payment payload to verify.
    pub payment_payload: PaymentPayload,

    /// The requirements the payload claims to satisfy.
    pub payment_requirements: PaymentRequirements,
}

fn default_version() -> u32 {
    X402_VERSION
}

/// Request body for `/settle`. Structurally identical to a verify
/// request; settlement always re-verifies before submitting.
pub type SettleRequest = VerifyRequest;

/// Why a payment payload was rejected, or why settlement did not
/// complete. Reported as a reason code so callers can branch on the
/// outcome without parsing error messages.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Payload scheme or network disagrees with the requirement.
    SchemeOrNetworkMismatch,
    /// Payload moves a different asset than the requirement names.
    AssetMismatch,
    /// Payload pays someone other than `payTo`.
    RecipientMismatch,
    /// Authorized value exceeds `maxAmountRequired`.
    AmountExceedsMaximum,
    /// Exact scheme requires the full amount; the payload authorizes less.
    AmountInsufficient,
    /// `validBefore` has passed.
    AuthorizationExpired,
    /// `validAfter` has not been reached yet.
    AuthorizationNotYetValid,
    /// Signature is malformed or does not verify.
    SignatureInvalid,
    /// Signature is valid but recovers to someone other than the
    /// declared payer, or a required signer slot names the wrong key.
    SignerMismatch,
    /// The chain reports the authorization nonce already spent.
    NonceAlreadyConsumed,
    /// RPC transport failure after retries were exhausted.
    ChainTransportError,
    /// The chain executed the settlement and reverted it.
    ChainRejected,
    /// Broadcast was accepted but finality was not observed in time.
    /// Callers must re-query rather than resubmit.
    ConfirmationTimeout,
    /// Payload could not be decoded into the scheme's expected shape.
    MalformedPayload,
    /// The requirement names a network this facilitator does not serve.
    UnsupportedNetwork,
    /// The requirement names an asset not in the facilitator's registry.
    UnsupportedAsset,
}

impl InvalidReason {
    /// Wire-format string for this reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::SchemeOrNetworkMismatch => "scheme_or_network_mismatch",
            InvalidReason::AssetMismatch => "asset_mismatch",
            InvalidReason::RecipientMismatch => "recipient_mismatch",
            InvalidReason::AmountExceedsMaximum => "amount_exceeds_maximum",
            InvalidReason::AmountInsufficient => "amount_insufficient",
            InvalidReason::AuthorizationExpired => "authorization_expired",
            InvalidReason::AuthorizationNotYetValid => "authorization_not_yet_valid",
            InvalidReason::SignatureInvalid => "signature_invalid",
            InvalidReason::SignerMismatch => "signer_mismatch",
            InvalidReason::NonceAlreadyConsumed => "nonce_already_consumed",
            InvalidReason::ChainTransportError => "chain_transport_error",
            InvalidReason::ChainRejected => "chain_rejected",
            InvalidReason::ConfirmationTimeout => "confirmation_timeout",
            InvalidReason::MalformedPayload => "malformed_payload",
            InvalidReason::UnsupportedNetwork => "unsupported_network",
            InvalidReason::UnsupportedAsset => "unsupported_asset",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response from `/verify`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payload satisfies the requirement.
    pub is_valid: bool,

    /// Single-cause rejection reason when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<InvalidReason>,

    /// The payer identified from the payload, when extractable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// A passing verification for the given payer.
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    /// A failing verification with a single reason code.
    pub fn invalid(payer: Option<String>, reason: InvalidReason) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer,
        }
    }
}

/// Response from `/settle`.
///
/// Three outcomes are encoded:
/// - `success: true` — settled. A missing `transaction` marks the
///   idempotent case where the chain already held this authorization as
///   consumed and no new transaction was submitted.
/// - `success: false` with `transaction` present and `errorReason` of
///   [`InvalidReason::ConfirmationTimeout`] — broadcast accepted,
///   finality unknown; re-query the chain, do not resubmit.
/// - `success: false` otherwise — settlement was refused or reverted.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether the transfer is known to have settled.
    pub success: bool,

    /// Chain-native transaction reference (hash or signature).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,

    /// Network the settlement ran on.
    pub network: String,

    /// The payer, when extractable from the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,

    /// Reason settlement did not (or may not have) completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<InvalidReason>,
}

impl SettleResponse {
    /// A failed settlement that never reached the chain.
    pub fn refused(
        network: impl Into<String>,
        payer: Option<String>,
        reason: InvalidReason,
    ) -> Self {
        Self {
            success: false,
            transaction: None,
            network: network.into(),
            payer,
            error_reason: Some(reason),
        }
    }
}

/// Settlement proof carried back to the buyer in the
/// `X-PAYMENT-RESPONSE` header.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// Whether settlement succeeded.
    pub success: bool,

    /// Transaction reference, when one was submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,

    /// Network the settlement ran on.
    pub network: String,

    /// The payer the transfer was executed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,

    /// UTC timestamp the facilitator observed settlement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<String>,
}

/// One supported (scheme, network, asset) capability.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version.
    #[serde(rename = "x402Version")]
    pub x402_version: u32,

    /// Payment scheme.
    pub scheme: Scheme,

    /// Network identifier.
    pub network: String,

    /// Asset address on that network.
    pub asset: String,

    /// Signing material clients need for this kind: EIP-712 domain
    /// fields on EVM networks, the designated fee payer on Solana.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Response from `/supported`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SupportedResponse {
    /// Every capability this facilitator will verify and settle.
    pub kinds: Vec<SupportedKind>,
}

/// Response from `/health`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthResponse {
    /// Liveness status, always "ok" when the process can respond.
    pub status: String,
}

/// Per-network connectivity report from the deep health probe.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NetworkHealth {
    /// Network identifier.
    pub network: String,

    /// Whether one read RPC round-trip succeeded.
    pub reachable: bool,

    /// Probe failure detail, if unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
