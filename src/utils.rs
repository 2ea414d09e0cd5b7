//! Helper functions shared across the crate.
//!
//! Header codecs for the opaque payment blobs, timestamp access, and
//! parsing helpers for addresses and uint256 amounts.

use crate::errors::{FacilitatorError, Result};
use crate::types::{PaymentPayload, PaymentReceipt, SettleResponse};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ethers::types::{Address, U256};
use std::str::FromStr;

/// Encodes a PaymentPayload as Base64 JSON for the `X-PAYMENT` header.
pub fn encode_payment_header(payload: &PaymentPayload) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    Ok(BASE64.encode(json.as_bytes()))
}

/// Decodes a Base64 JSON PaymentPayload from the `X-PAYMENT` header.
pub fn decode_payment_header(encoded: &str) -> Result<PaymentPayload> {
    let decoded = BASE64.decode(encoded.as_bytes())?;
    let json_str = String::from_utf8(decoded)
        .map_err(|e| FacilitatorError::Config(format!("invalid UTF-8 in payment header: {}", e)))?;
    let payload: PaymentPayload = serde_json::from_str(&json_str)?;
    Ok(payload)
}

/// Encodes a settlement outcome as the `X-PAYMENT-RESPONSE` header a
/// seller attaches to the paid response.
pub fn encode_settlement_header(settlement: &SettleResponse) -> Result<String> {
    let receipt = PaymentReceipt {
        success: settlement.success,
        transaction: settlement.transaction.clone(),
        network: settlement.network.clone(),
        payer: settlement.payer.clone(),
        settled_at: settlement
            .success
            .then(|| chrono::Utc::now().to_rfc3339()),
    };
    let json = serde_json::to_string(&receipt)?;
    Ok(BASE64.encode(json.as_bytes()))
}

/// Decodes an `X-PAYMENT-RESPONSE` header back into a receipt.
pub fn decode_settlement_header(encoded: &str) -> Result<PaymentReceipt> {
    let decoded = BASE64.decode(encoded.as_bytes())?;
    let json_str = String::from_utf8(decoded).map_err(|e| {
        FacilitatorError::Config(format!("invalid UTF-8 in settlement header: {}", e))
    })?;
    Ok(serde_json::from_str(&json_str)?)
}

/// Converts a string representation of a uint256 to U256.
///
/// Accepts decimal, or hex with a 0x prefix.
pub fn string_to_u256(s: &str) -> Result<U256> {
    if let Ok(value) = U256::from_dec_str(s) {
        return Ok(value);
    }
    if s.starts_with("0x") || s.starts_with("0X") {
        if let Ok(value) = U256::from_str(s) {
            return Ok(value);
        }
    }
    Err(FacilitatorError::InvalidAmount(format!(
        "cannot parse '{}' as uint256",
        s
    )))
}

/// Validates and parses an EVM address (with or without 0x prefix).
pub fn parse_address(addr: &str) -> Result<Address> {
    Address::from_str(addr)
        .map_err(|e| FacilitatorError::InvalidAddress(format!("{}: {}", addr, e)))
}

/// Compares two addresses for equality in their native convention:
/// case-insensitive for 0x-prefixed hex, exact for base58.
pub fn addresses_equal(a: &str, b: &str) -> bool {
    let a_hex = a.starts_with("0x") || a.starts_with("0X");
    let b_hex = b.starts_with("0x") || b.starts_with("0X");
    if a_hex && b_hex {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// Generates a random 32-byte authorization nonce as 0x-prefixed hex.
pub fn generate_nonce() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let nonce: [u8; 32] = rng.gen();
    format!("0x{}", hex::encode(nonce))
}

/// Current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExactPayload, ExactSolanaPayload, InvalidReason, X402_VERSION};
    use crate::types::Scheme;

    fn sample_payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: X402_VERSION,
            scheme: Scheme::Exact,
            network: "solana".to_string(),
            payload: ExactPayload::Solana(ExactSolanaPayload {
                transaction: "AQID".to_string(),
            }),
        }
    }

    #[test]
    fn test_encode_decode_payment_header() {
        let payload = sample_payload();
        let encoded = encode_payment_header(&payload).unwrap();
        let decoded = decode_payment_header(&encoded).unwrap();

        assert_eq!(decoded.scheme, payload.scheme);
        assert_eq!(decoded.network, payload.network);
        assert_eq!(decoded.payload, payload.payload);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_payment_header("not base64 at all!!").is_err());

        let not_json = BASE64.encode(b"plainly not json");
        assert!(decode_payment_header(&not_json).is_err());
    }

    #[test]
    fn test_settlement_header_round_trip() {
        let settlement = SettleResponse {
            success: true,
            transaction: Some("0xabc".to_string()),
            network: "base".to_string(),
            payer: Some("0xpayer".to_string()),
            error_reason: None,
        };
        let encoded = encode_settlement_header(&settlement).unwrap();
        let receipt = decode_settlement_header(&encoded).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.transaction.as_deref(), Some("0xabc"));
        assert!(receipt.settled_at.is_some());

        let failed = SettleResponse::refused("base", None, InvalidReason::ChainRejected);
        let encoded = encode_settlement_header(&failed).unwrap();
        let receipt = decode_settlement_header(&encoded).unwrap();
        assert!(!receipt.success);
        assert!(receipt.settled_at.is_none());
    }

    #[test]
    fn test_string_to_u256() {
        assert_eq!(string_to_u256("1000000").unwrap(), U256::from(1000000u64));
        assert_eq!(string_to_u256("0").unwrap(), U256::zero());
        assert_eq!(string_to_u256("0x0f4240").unwrap(), U256::from(1000000u64));
        assert!(string_to_u256("not a number").is_err());
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb").unwrap();
        let addr2 = parse_address("742d35Cc6634C0532925a3b844Bc9e7595f0bEbb").unwrap();
        assert_eq!(addr, addr2);
        assert!(parse_address("invalid").is_err());
    }

    #[test]
    fn test_addresses_equal() {
        assert!(addresses_equal(
            "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb",
            "0x742D35CC6634C0532925A3B844BC9E7595F0BEBB"
        ));
        assert!(!addresses_equal(
            "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb",
            "0x1111111111111111111111111111111111111111"
        ));
        // base58 is case-sensitive
        assert!(!addresses_equal(
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "epjfwdd5aufqssqem2qn1xzybapc8g4weggkzwytdt1v"
        ));
        assert!(addresses_equal(
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
        ));
    }

    #[test]
    fn test_generate_nonce() {
        let nonce1 = generate_nonce();
        let nonce2 = generate_nonce();
        assert_eq!(nonce1.len(), 66); // 0x + 64 hex chars
        assert!(nonce1.starts_with("0x"));
        assert_ne!(nonce1, nonce2);
    }

    #[test]
    fn test_current_timestamp() {
        let ts = current_timestamp();
        assert!(ts > 1_600_000_000);
    }
}
