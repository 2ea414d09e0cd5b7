//! Integration tests for the facilitator.
//!
//! Exercises the full verify pipeline through [`Facilitator`] for both
//! chain families with honestly constructed payloads, plus the rejection
//! paths a seller relies on. Everything runs offline: signatures are
//! created and checked locally, and settlement paths that would touch a
//! chain are exercised only up to the point where the facilitator must
//! refuse them.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::SigningKey;
use serde_json::json;
use std::sync::Arc;
use x402_facilitator::chain::evm::{eip712_extra, sign_transfer_authorization, EvmChain};
use x402_facilitator::chain::solana::{build_transfer_transaction, SolanaChain};
use x402_facilitator::chain::AdapterMap;
use x402_facilitator::facilitator::{Facilitator, FacilitatorOptions};
use x402_facilitator::registry::{AssetEntry, ChainFamily, Eip712Domain, NetworkEntry, NetworkRegistry};
use x402_facilitator::types::{
    ExactPayload, ExactSolanaPayload, InvalidReason, PaymentPayload, PaymentRequirements, Scheme,
    VerifyRequest, X402_VERSION,
};
use x402_facilitator::utils::{
    current_timestamp, decode_payment_header, encode_payment_header,
};

// Well-known Anvil development keys. Test-only material.
const PAYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const PAYER_ADDR: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
const FACILITATOR_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

const EVM_NETWORK: &str = "base-sepolia";
const EVM_CHAIN_ID: u64 = 84532;
const USDC: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";
const PAY_TO: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb";

const SOLANA_NETWORK: &str = "solana-devnet";

fn solana_payer() -> SigningKey {
    SigningKey::from_bytes(&[11u8; 32])
}

fn solana_fee_payer() -> SigningKey {
    SigningKey::from_bytes(&[12u8; 32])
}

fn solana_payee() -> String {
    bs58::encode(SigningKey::from_bytes(&[13u8; 32]).verifying_key().to_bytes()).into_string()
}

fn solana_mint() -> String {
    bs58::encode([21u8; 32]).into_string()
}

fn test_registry() -> NetworkRegistry {
    let mut registry = NetworkRegistry::new();
    registry.insert(
        EVM_NETWORK,
        NetworkEntry {
            family: ChainFamily::Evm {
                chain_id: EVM_CHAIN_ID,
            },
            rpc_url: "http://localhost:8545".to_string(),
            assets: vec![AssetEntry {
                address: USDC.to_string(),
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
        SOLANA_NETWORK,
        NetworkEntry {
            family: ChainFamily::Solana,
            rpc_url: "http://localhost:8899".to_string(),
            assets: vec![AssetEntry {
                address: solana_mint(),
                decimals: 6,
                eip712: None,
            }],
            schemes: vec![Scheme::Exact],
            fee_payer: None,
        },
    );
    registry
}

fn facilitator() -> Facilitator {
    let registry = test_registry();
    let mut adapters = AdapterMap::new();
    adapters.insert(
        EVM_NETWORK.to_string(),
        Arc::new(
            EvmChain::new(
                EVM_NETWORK,
                registry.network(EVM_NETWORK).unwrap().clone(),
                FACILITATOR_KEY,
            )
            .unwrap(),
        ),
    );
    adapters.insert(
        SOLANA_NETWORK.to_string(),
        Arc::new(
            SolanaChain::new(
                SOLANA_NETWORK,
                registry.network(SOLANA_NETWORK).unwrap().clone(),
                &bs58::encode(solana_fee_payer().to_keypair_bytes()).into_string(),
            )
            .unwrap(),
        ),
    );
    Facilitator::new(registry, adapters, FacilitatorOptions::default())
}

fn evm_requirements(max_amount: &str) -> PaymentRequirements {
    PaymentRequirements {
        scheme: Scheme::Exact,
        network: EVM_NETWORK.to_string(),
        asset: USDC.to_string(),
        pay_to: PAY_TO.to_string(),
        max_amount_required: max_amount.to_string(),
        valid_duration_seconds: 300,
        resource: Some("/api/weather".to_string()),
        description: Some("Weather API access".to_string()),
        extra: Some(eip712_extra("USDC", "2")),
    }
}

fn evm_payload(requirements: &PaymentRequirements, chain_id: u64, nonce: [u8; 32]) -> PaymentPayload {
    let now = current_timestamp();
    sign_transfer_authorization(PAYER_KEY, requirements, chain_id, now - 10, now + 60, nonce)
        .unwrap()
}

fn solana_requirements() -> PaymentRequirements {
    PaymentRequirements {
        scheme: Scheme::Exact,
        network: SOLANA_NETWORK.to_string(),
        asset: solana_mint(),
        pay_to: solana_payee(),
        max_amount_required: "10000".to_string(),
        valid_duration_seconds: 60,
        resource: None,
        description: None,
        extra: Some(json!({
            "feePayer": bs58::encode(solana_fee_payer().verifying_key().to_bytes()).into_string()
        })),
    }
}

fn solana_payload(amount: u64) -> PaymentPayload {
    let tx = build_transfer_transaction(
        &solana_payer(),
        &solana_payee(),
        &solana_mint(),
        amount,
        6,
        &bs58::encode(solana_fee_payer().verifying_key().to_bytes()).into_string(),
        [30u8; 32],
    )
    .unwrap();
    PaymentPayload {
        x402_version: X402_VERSION,
        scheme: Scheme::Exact,
        network: SOLANA_NETWORK.to_string(),
        payload: ExactPayload::Solana(ExactSolanaPayload {
            transaction: BASE64.encode(tx),
        }),
    }
}

fn request(payload: PaymentPayload, requirements: PaymentRequirements) -> VerifyRequest {
    VerifyRequest {
        x402_version: X402_VERSION,
        payment_payload: payload,
        payment_requirements: requirements,
    }
}

#[tokio::test]
async fn test_honest_evm_payload_verifies() {
    let facilitator = facilitator();
    let requirements = evm_requirements("100");
    let payload = evm_payload(&requirements, EVM_CHAIN_ID, [1u8; 32]);

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(response.is_valid, "reason: {:?}", response.invalid_reason);
    assert_eq!(response.payer.as_deref(), Some(PAYER_ADDR));
}

#[tokio::test]
async fn test_honest_solana_payload_verifies() {
    let facilitator = facilitator();
    let response = facilitator
        .verify(&request(solana_payload(10_000), solana_requirements()))
        .await;
    assert!(response.is_valid, "reason: {:?}", response.invalid_reason);
    assert_eq!(
        response.payer,
        Some(bs58::encode(solana_payer().verifying_key().to_bytes()).into_string())
    );
}

#[tokio::test]
async fn test_amount_over_maximum_rejected_and_never_settled() {
    let facilitator = facilitator();
    // Requirement caps at 100; the payload authorizes 150.
    let signing_requirements = evm_requirements("150");
    let payload = evm_payload(&signing_requirements, EVM_CHAIN_ID, [2u8; 32]);
    let requirements = evm_requirements("100");

    let verify = facilitator
        .verify(&request(payload.clone(), requirements.clone()))
        .await;
    assert!(!verify.is_valid);
    assert_eq!(
        verify.invalid_reason,
        Some(InvalidReason::AmountExceedsMaximum)
    );

    // Settlement must refuse before any chain access.
    let settle = facilitator.settle(&request(payload, requirements)).await;
    assert!(!settle.success);
    assert!(settle.transaction.is_none());
    assert_eq!(
        settle.error_reason,
        Some(InvalidReason::AmountExceedsMaximum)
    );
}

#[tokio::test]
async fn test_expired_authorization_rejected() {
    let facilitator = facilitator();
    let requirements = evm_requirements("100");
    let now = current_timestamp();
    let payload = sign_transfer_authorization(
        PAYER_KEY,
        &requirements,
        EVM_CHAIN_ID,
        now - 600,
        now - 300,
        [3u8; 32],
    )
    .unwrap();

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::AuthorizationExpired)
    );
}

#[tokio::test]
async fn test_not_yet_valid_authorization_rejected() {
    let facilitator = facilitator();
    let requirements = evm_requirements("100");
    let now = current_timestamp();
    let payload = sign_transfer_authorization(
        PAYER_KEY,
        &requirements,
        EVM_CHAIN_ID,
        now + 300,
        now + 600,
        [4u8; 32],
    )
    .unwrap();

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::AuthorizationNotYetValid)
    );
}

#[tokio::test]
async fn test_tampered_value_never_silently_accepted() {
    let facilitator = facilitator();
    let requirements = evm_requirements("100");
    let mut payload = evm_payload(&requirements, EVM_CHAIN_ID, [5u8; 32]);

    if let ExactPayload::Evm(evm) = &mut payload.payload {
        evm.authorization.value = "99".to_string();
    }

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(!response.is_valid);
    // 99 < 100 under the exact scheme fails the amount check before the
    // (also broken) signature is consulted.
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::AmountInsufficient)
    );
}

#[tokio::test]
async fn test_tampered_value_fails_signature_when_amounts_align() {
    let facilitator = facilitator();
    // Signed for 100 against a requirement of 150, then the value field
    // is bumped to match the requirement: amount checks pass, signature
    // recovery must catch it.
    let signing_requirements = evm_requirements("100");
    let mut payload = evm_payload(&signing_requirements, EVM_CHAIN_ID, [6u8; 32]);
    if let ExactPayload::Evm(evm) = &mut payload.payload {
        evm.authorization.value = "150".to_string();
    }
    let requirements = evm_requirements("150");

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(!response.is_valid);
    assert_eq!(response.invalid_reason, Some(InvalidReason::SignerMismatch));
}

#[tokio::test]
async fn test_wrong_chain_signature_rejected() {
    let facilitator = facilitator();
    let requirements = evm_requirements("100");
    // Signed against mainnet's chain id, presented on base-sepolia.
    let payload = evm_payload(&requirements, 1, [7u8; 32]);

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(!response.is_valid);
    assert_eq!(response.invalid_reason, Some(InvalidReason::SignerMismatch));
}

#[tokio::test]
async fn test_recipient_mismatch_rejected() {
    let facilitator = facilitator();
    let mut signing_requirements = evm_requirements("100");
    signing_requirements.pay_to = "0x1111111111111111111111111111111111111111".to_string();
    let payload = evm_payload(&signing_requirements, EVM_CHAIN_ID, [8u8; 32]);

    let response = facilitator
        .verify(&request(payload, evm_requirements("100")))
        .await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::RecipientMismatch)
    );
}

#[tokio::test]
async fn test_network_mismatch_between_payload_and_requirement() {
    let facilitator = facilitator();
    let requirements = evm_requirements("100");
    let mut payload = evm_payload(&requirements, EVM_CHAIN_ID, [9u8; 32]);
    payload.network = "base".to_string();

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::SchemeOrNetworkMismatch)
    );
}

#[tokio::test]
async fn test_unsupported_network_rejected() {
    let facilitator = facilitator();
    let mut requirements = evm_requirements("100");
    let payload = evm_payload(&requirements, EVM_CHAIN_ID, [10u8; 32]);
    requirements.network = "polygon".to_string();

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::UnsupportedNetwork)
    );
}

#[tokio::test]
async fn test_unsupported_asset_rejected() {
    let facilitator = facilitator();
    let mut requirements = evm_requirements("100");
    let payload = evm_payload(&requirements, EVM_CHAIN_ID, [11u8; 32]);
    requirements.asset = "0xdAC17F958D2ee523a2206206994597C13D831ec7".to_string();

    let response = facilitator.verify(&request(payload, requirements)).await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::UnsupportedAsset)
    );
}

#[tokio::test]
async fn test_solana_amount_mismatch_rejected() {
    let facilitator = facilitator();
    let response = facilitator
        .verify(&request(solana_payload(20_000), solana_requirements()))
        .await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::AmountExceedsMaximum)
    );
}

#[tokio::test]
async fn test_solana_wrong_destination_rejected() {
    let facilitator = facilitator();
    let mut requirements = solana_requirements();
    // Demand payment to a wallet the transaction does not pay.
    requirements.pay_to =
        bs58::encode(SigningKey::from_bytes(&[14u8; 32]).verifying_key().to_bytes()).into_string();

    let response = facilitator
        .verify(&request(solana_payload(10_000), requirements))
        .await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::RecipientMismatch)
    );
}

#[tokio::test]
async fn test_solana_garbage_transaction_is_malformed() {
    let facilitator = facilitator();
    let payload = PaymentPayload {
        x402_version: X402_VERSION,
        scheme: Scheme::Exact,
        network: SOLANA_NETWORK.to_string(),
        payload: ExactPayload::Solana(ExactSolanaPayload {
            transaction: BASE64.encode([0u8, 1, 2, 3]),
        }),
    };

    let response = facilitator
        .verify(&request(payload, solana_requirements()))
        .await;
    assert!(!response.is_valid);
    assert_eq!(
        response.invalid_reason,
        Some(InvalidReason::MalformedPayload)
    );
}

#[tokio::test]
async fn test_settle_refuses_expired_payload_independently() {
    // A payload that once verified can still expire before settlement;
    // settle re-checks the window itself.
    let facilitator = facilitator();
    let requirements = evm_requirements("100");
    let now = current_timestamp();
    let payload = sign_transfer_authorization(
        PAYER_KEY,
        &requirements,
        EVM_CHAIN_ID,
        now - 120,
        now - 1,
        [15u8; 32],
    )
    .unwrap();

    let settle = facilitator.settle(&request(payload, requirements)).await;
    assert!(!settle.success);
    assert!(settle.transaction.is_none());
    assert_eq!(
        settle.error_reason,
        Some(InvalidReason::AuthorizationExpired)
    );
}

#[test]
fn test_payment_header_round_trip() {
    let requirements = evm_requirements("100");
    let now = current_timestamp();
    let payload = sign_transfer_authorization(
        PAYER_KEY,
        &requirements,
        EVM_CHAIN_ID,
        now - 10,
        now + 60,
        [16u8; 32],
    )
    .unwrap();

    let header = encode_payment_header(&payload).unwrap();
    let decoded = decode_payment_header(&header).unwrap();
    assert_eq!(decoded.network, payload.network);
    assert_eq!(decoded.payload, payload.payload);
}

#[test]
fn test_supported_kinds_advertise_both_families() {
    let facilitator = facilitator();
    let supported = facilitator.supported();
    assert_eq!(supported.kinds.len(), 2);

    let evm = supported
        .kinds
        .iter()
        .find(|k| k.network == EVM_NETWORK)
        .unwrap();
    assert_eq!(evm.scheme, Scheme::Exact);
    assert_eq!(evm.asset, USDC);
    assert_eq!(evm.extra.as_ref().unwrap()["name"], "USDC");

    assert!(supported.kinds.iter().any(|k| k.network == SOLANA_NETWORK));
}

#[test]
fn test_health_is_static() {
    let facilitator = facilitator();
    assert_eq!(facilitator.health().status, "ok");
}
