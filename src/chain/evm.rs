//! Adapter for account-based EVM networks.
//!
//! Settlement uses EIP-3009 `transferWithAuthorization`: the payer signs
//! an EIP-712 typed-data digest off-chain, and the facilitator submits
//! the transfer under its own key, paying the gas. Verification
//! reconstructs the exact digest from the chain id, token contract, and
//! domain fields, then recovers the signer and compares it to the
//! declared payer.

use crate::chain::{ChainAdapter, ConfirmOutcome, SubmitError, TransferIntent};
use crate::errors::{FacilitatorError, Result};
use crate::registry::{ChainFamily, NetworkEntry};
use crate::types::{
    ExactEvmPayload, ExactPayload, InvalidReason, PaymentPayload, PaymentRequirements,
    TransferAuthorization, X402_VERSION,
};
use crate::utils::{parse_address, string_to_u256};
use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::contract::{abigen, ContractError};
use ethers::core::utils::keccak256;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256, U256};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Fallbacks when neither the registry nor the requirement carries the
// token's EIP-712 domain fields.
const EIP712_DOMAIN_NAME: &str = "USD Coin";
const EIP712_DOMAIN_VERSION: &str = "2";

// Revert reason emitted by FiatToken-style EIP-3009 contracts when an
// authorization nonce is replayed.
const AUTHORIZATION_REUSE_MARKER: &str = "authorization is used";

abigen!(
    EIP3009Token,
    r#"[
        function transferWithAuthorization(address from, address to, uint256 value, uint256 validAfter, uint256 validBefore, bytes32 nonce, uint8 v, bytes32 r, bytes32 s) external
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool)
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
    ]"#
);

/// Adapter for one EVM network, holding its pooled RPC client and the
/// facilitator's gas-paying wallet for process lifetime.
pub struct EvmChain {
    network: String,
    chain_id: u64,
    entry: NetworkEntry,
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
    /// When set, verification also performs a read-only balance check.
    preflight_enabled: bool,
    confirm_interval: Duration,
}

impl EvmChain {
    /// Builds the adapter for `network` from its registry entry and the
    /// facilitator's private key.
    pub fn new(network: impl Into<String>, entry: NetworkEntry, private_key: &str) -> Result<Self> {
        let network = network.into();
        let chain_id = match entry.family {
            ChainFamily::Evm { chain_id } => chain_id,
            ChainFamily::Solana => {
                return Err(FacilitatorError::Config(format!(
                    "network {} is not an EVM network",
                    network
                )))
            }
        };

        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| FacilitatorError::Config(format!("invalid facilitator key: {}", e)))?
            .with_chain_id(chain_id);

        let provider = Provider::<Http>::try_from(entry.rpc_url.as_str())
            .map_err(|e| FacilitatorError::Config(format!("invalid RPC URL: {}", e)))?;

        Ok(Self {
            network,
            chain_id,
            entry,
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            preflight_enabled: true,
            confirm_interval: Duration::from_secs(1),
        })
    }

    /// Disables the read-only balance preflight during verification.
    pub fn without_preflight(mut self) -> Self {
        self.preflight_enabled = false;
        self
    }

    /// Address the facilitator pays gas from.
    pub fn signer_address(&self) -> Address {
        self.client.signer().address()
    }

    fn token(&self, asset: Address) -> EIP3009Token<SignerMiddleware<Provider<Http>, LocalWallet>> {
        EIP3009Token::new(asset, self.client.clone())
    }

    /// EIP-712 domain separator for the token contract.
    fn create_domain_separator(
        token_address: Address,
        chain_id: U256,
        name: &str,
        version: &str,
    ) -> H256 {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );

        H256::from(keccak256(abi::encode(&[
            Token::FixedBytes(type_hash.to_vec()),
            Token::FixedBytes(keccak256(name.as_bytes()).to_vec()),
            Token::FixedBytes(keccak256(version.as_bytes()).to_vec()),
            Token::Uint(chain_id),
            Token::Address(token_address),
        ])))
    }

    /// EIP-712 digest the payer must have signed.
    #[allow(clippy::too_many_arguments)]
    fn create_authorization_hash(
        from: Address,
        to: Address,
        value: U256,
        valid_after: U256,
        valid_before: U256,
        nonce: H256,
        domain_separator: H256,
    ) -> H256 {
        let type_hash = keccak256(
            b"TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)"
        );

        let struct_hash = keccak256(abi::encode(&[
            Token::FixedBytes(type_hash.to_vec()),
            Token::Address(from),
            Token::Address(to),
            Token::Uint(value),
            Token::Uint(valid_after),
            Token::Uint(valid_before),
            Token::FixedBytes(nonce.as_bytes().to_vec()),
        ]));

        // "\x19\x01" ‖ domainSeparator ‖ hashStruct(message)
        let mut message = Vec::with_capacity(2 + 32 + 32);
        message.extend_from_slice(b"\x19\x01");
        message.extend_from_slice(domain_separator.as_bytes());
        message.extend_from_slice(&struct_hash);

        H256::from(keccak256(&message))
    }

    /// Domain fields for the asset: registry entry first, then the
    /// requirement's `extra`, then FiatToken defaults.
    fn domain_fields(&self, requirements: &PaymentRequirements) -> (String, String) {
        if let Some(asset) = self
            .entry
            .assets
            .iter()
            .find(|a| crate::utils::addresses_equal(&a.address, &requirements.asset))
        {
            if let Some(domain) = &asset.eip712 {
                return (domain.name.clone(), domain.version.clone());
            }
        }
        if let Some(extra) = &requirements.extra {
            let name = extra
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(EIP712_DOMAIN_NAME);
            let version = extra
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or(EIP712_DOMAIN_VERSION);
            return (name.to_string(), version.to_string());
        }
        (
            EIP712_DOMAIN_NAME.to_string(),
            EIP712_DOMAIN_VERSION.to_string(),
        )
    }

    fn evm_payload<'a>(
        payload: &'a PaymentPayload,
    ) -> std::result::Result<&'a ExactEvmPayload, InvalidReason> {
        match &payload.payload {
            ExactPayload::Evm(evm) => Ok(evm),
            ExactPayload::Solana(_) => Err(InvalidReason::MalformedPayload),
        }
    }

    fn digest_for(
        &self,
        auth: &ParsedAuthorization,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<H256, InvalidReason> {
        let asset = parse_address(&requirements.asset)
            .map_err(|_| InvalidReason::MalformedPayload)?;
        let (name, version) = self.domain_fields(requirements);
        let domain_separator =
            Self::create_domain_separator(asset, U256::from(self.chain_id), &name, &version);
        Ok(Self::create_authorization_hash(
            auth.from,
            auth.to,
            auth.value,
            auth.valid_after,
            auth.valid_before,
            auth.nonce,
            domain_separator,
        ))
    }
}

/// Authorization fields parsed out of their wire-string encodings.
struct ParsedAuthorization {
    from: Address,
    to: Address,
    value: U256,
    valid_after: U256,
    valid_before: U256,
    nonce: H256,
}

fn parse_authorization(
    auth: &TransferAuthorization,
) -> std::result::Result<ParsedAuthorization, InvalidReason> {
    let from = parse_address(&auth.from).map_err(|_| InvalidReason::MalformedPayload)?;
    let to = parse_address(&auth.to).map_err(|_| InvalidReason::MalformedPayload)?;
    let value = string_to_u256(&auth.value).map_err(|_| InvalidReason::MalformedPayload)?;
    let valid_after =
        string_to_u256(&auth.valid_after).map_err(|_| InvalidReason::MalformedPayload)?;
    let valid_before =
        string_to_u256(&auth.valid_before).map_err(|_| InvalidReason::MalformedPayload)?;

    let nonce_hex = auth.nonce.trim_start_matches("0x");
    let mut nonce_bytes = [0u8; 32];
    if nonce_hex.len() != 64 || hex::decode_to_slice(nonce_hex, &mut nonce_bytes).is_err() {
        return Err(InvalidReason::MalformedPayload);
    }

    Ok(ParsedAuthorization {
        from,
        to,
        value,
        valid_after,
        valid_before,
        nonce: H256::from(nonce_bytes),
    })
}

fn parse_signature(signature: &str) -> std::result::Result<Signature, InvalidReason> {
    let sig_hex = signature.trim_start_matches("0x");
    if sig_hex.len() != 130 {
        return Err(InvalidReason::SignatureInvalid);
    }
    let sig_bytes = hex::decode(sig_hex).map_err(|_| InvalidReason::SignatureInvalid)?;
    Signature::try_from(sig_bytes.as_slice()).map_err(|_| InvalidReason::SignatureInvalid)
}

fn window_bound(value: U256) -> std::result::Result<u64, InvalidReason> {
    if value > U256::from(u64::MAX) {
        return Err(InvalidReason::MalformedPayload);
    }
    Ok(value.as_u64())
}

/// Extracts a human-readable reason from `Error(string)` revert data.
fn decode_revert_string(data: &[u8]) -> Option<String> {
    // 0x08c379a0 = keccak("Error(string)")[..4]
    if data.len() < 4 || data[..4] != [0x08, 0xc3, 0x79, 0xa0] {
        return None;
    }
    let tokens = abi::decode(&[abi::ParamType::String], &data[4..]).ok()?;
    match tokens.into_iter().next() {
        Some(Token::String(s)) => Some(s),
        _ => None,
    }
}

fn classify_contract_error<M: Middleware>(err: ContractError<M>) -> SubmitError {
    if let ContractError::Revert(data) = &err {
        let reason = decode_revert_string(data).unwrap_or_else(|| err.to_string());
        let replayed = reason.contains(AUTHORIZATION_REUSE_MARKER);
        return SubmitError::Rejected { reason, replayed };
    }

    let msg = err.to_string();
    if msg.contains("execution reverted") || msg.contains("revert") {
        let replayed = msg.contains(AUTHORIZATION_REUSE_MARKER);
        SubmitError::Rejected {
            reason: msg,
            replayed,
        }
    } else {
        SubmitError::Transport(msg)
    }
}

#[async_trait]
impl ChainAdapter for EvmChain {
    fn network(&self) -> &str {
        &self.network
    }

    fn extract_intent(
        &self,
        payload: &PaymentPayload,
        _requirements: &PaymentRequirements,
    ) -> std::result::Result<TransferIntent, InvalidReason> {
        let evm = Self::evm_payload(payload)?;
        let auth = parse_authorization(&evm.authorization)?;

        Ok(TransferIntent {
            payer: format!("{:?}", auth.from),
            pay_to: format!("{:?}", auth.to),
            // The asset is bound through the signature's domain
            // separator, not named in the payload.
            asset: None,
            amount: auth.value,
            valid_after: Some(window_bound(auth.valid_after)?),
            valid_before: Some(window_bound(auth.valid_before)?),
            nonce: Some(evm.authorization.nonce.clone()),
        })
    }

    async fn verify_signature(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<(), InvalidReason> {
        let evm = Self::evm_payload(payload)?;
        let auth = parse_authorization(&evm.authorization)?;
        let digest = self.digest_for(&auth, requirements)?;
        let signature = parse_signature(&evm.signature)?;

        let recovered = signature
            .recover(digest)
            .map_err(|_| InvalidReason::SignatureInvalid)?;

        if recovered != auth.from {
            return Err(InvalidReason::SignerMismatch);
        }
        Ok(())
    }

    async fn preflight(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<(), InvalidReason> {
        if !self.preflight_enabled {
            return Ok(());
        }
        let evm = Self::evm_payload(payload)?;
        let auth = parse_authorization(&evm.authorization)?;
        let asset =
            parse_address(&requirements.asset).map_err(|_| InvalidReason::MalformedPayload)?;

        let balance = self
            .token(asset)
            .balance_of(auth.from)
            .call()
            .await
            .map_err(|_| InvalidReason::ChainTransportError)?;

        if balance < auth.value {
            // The transfer would revert on-chain for lack of funds.
            return Err(InvalidReason::ChainRejected);
        }
        Ok(())
    }

    async fn nonce_consumed(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<bool> {
        let evm = Self::evm_payload(payload)
            .map_err(|r| FacilitatorError::Config(r.to_string()))?;
        let auth = parse_authorization(&evm.authorization)
            .map_err(|r| FacilitatorError::Config(r.to_string()))?;
        let asset = parse_address(&requirements.asset)?;

        let consumed = self
            .token(asset)
            .authorization_state(auth.from, auth.nonce.into())
            .call()
            .await
            .map_err(|e| FacilitatorError::Transport(e.to_string()))?;
        Ok(consumed)
    }

    async fn submit(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<String, SubmitError> {
        let evm = Self::evm_payload(payload)
            .map_err(|r| SubmitError::Rejected {
                reason: r.to_string(),
                replayed: false,
            })?;
        let auth = parse_authorization(&evm.authorization).map_err(|r| SubmitError::Rejected {
            reason: r.to_string(),
            replayed: false,
        })?;
        let asset = parse_address(&requirements.asset).map_err(|e| SubmitError::Rejected {
            reason: e.to_string(),
            replayed: false,
        })?;

        let sig_bytes = hex::decode(evm.signature.trim_start_matches("0x")).map_err(|e| {
            SubmitError::Rejected {
                reason: e.to_string(),
                replayed: false,
            }
        })?;
        let r = H256::from_slice(&sig_bytes[0..32]);
        let s = H256::from_slice(&sig_bytes[32..64]);
        let v = sig_bytes[64];

        let call = self.token(asset).transfer_with_authorization(
            auth.from,
            auth.to,
            auth.value,
            auth.valid_after,
            auth.valid_before,
            auth.nonce.into(),
            v,
            r.into(),
            s.into(),
        );

        let pending = call.send().await.map_err(classify_contract_error)?;
        let tx_hash: H256 = *pending;
        tracing::info!(network = %self.network, tx = ?tx_hash, "settlement broadcast");
        Ok(format!("{:?}", tx_hash))
    }

    async fn confirm(&self, tx_ref: &str, deadline: Instant) -> ConfirmOutcome {
        let tx_hash: H256 = match tx_ref.parse() {
            Ok(hash) => hash,
            Err(_) => return ConfirmOutcome::Reverted("unparseable transaction hash".to_string()),
        };

        loop {
            match self.client.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    let succeeded = receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false);
                    if succeeded {
                        return ConfirmOutcome::Confirmed;
                    }
                    return ConfirmOutcome::Reverted("transaction reverted".to_string());
                }
                // Not yet mined, or a transient read failure; keep
                // polling until the deadline either way.
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(network = %self.network, error = %e, "receipt poll failed");
                }
            }

            if Instant::now() >= deadline {
                return ConfirmOutcome::Pending;
            }
            tokio::time::sleep(self.confirm_interval).await;
        }
    }

    async fn probe(&self) -> Result<()> {
        self.client
            .get_chainid()
            .await
            .map_err(|e| FacilitatorError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Builds and signs an EIP-3009 payment payload for the given
/// requirement: the buyer-side counterpart of this adapter's
/// verification. The nonce must be freshly random per authorization
/// (see [`crate::utils::generate_nonce`]).
pub fn sign_transfer_authorization(
    private_key: &str,
    requirements: &PaymentRequirements,
    chain_id: u64,
    valid_after: u64,
    valid_before: u64,
    nonce: [u8; 32],
) -> Result<PaymentPayload> {
    let wallet = private_key
        .parse::<LocalWallet>()
        .map_err(|e| FacilitatorError::Config(format!("invalid private key: {}", e)))?;
    let from = wallet.address();
    let to = parse_address(&requirements.pay_to)?;
    let value = string_to_u256(&requirements.max_amount_required)?;
    let asset = parse_address(&requirements.asset)?;

    let (name, version) = match &requirements.extra {
        Some(extra) => (
            extra
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(EIP712_DOMAIN_NAME)
                .to_string(),
            extra
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or(EIP712_DOMAIN_VERSION)
                .to_string(),
        ),
        None => (
            EIP712_DOMAIN_NAME.to_string(),
            EIP712_DOMAIN_VERSION.to_string(),
        ),
    };

    let domain_separator =
        EvmChain::create_domain_separator(asset, U256::from(chain_id), &name, &version);
    let digest = EvmChain::create_authorization_hash(
        from,
        to,
        value,
        U256::from(valid_after),
        U256::from(valid_before),
        H256::from(nonce),
        domain_separator,
    );

    let signature = wallet
        .sign_hash(digest)
        .map_err(|e| FacilitatorError::Config(format!("signing failed: {}", e)))?;

    let mut r_bytes = [0u8; 32];
    signature.r.to_big_endian(&mut r_bytes);
    let mut s_bytes = [0u8; 32];
    signature.s.to_big_endian(&mut s_bytes);

    let mut sig_bytes = Vec::with_capacity(65);
    sig_bytes.extend_from_slice(&r_bytes);
    sig_bytes.extend_from_slice(&s_bytes);
    sig_bytes.push(signature.v as u8);

    let authorization = TransferAuthorization {
        from: format!("{:?}", from),
        to: format!("{:?}", to),
        value: value.to_string(),
        valid_after: valid_after.to_string(),
        valid_before: valid_before.to_string(),
        nonce: format!("0x{}", hex::encode(nonce)),
    };

    Ok(PaymentPayload {
        x402_version: X402_VERSION,
        scheme: requirements.scheme,
        network: requirements.network.clone(),
        payload: ExactPayload::Evm(ExactEvmPayload {
            signature: format!("0x{}", hex::encode(sig_bytes)),
            authorization,
        }),
    })
}

/// Convenience for seller-issued requirements on EVM networks: the
/// `extra` blob clients need for EIP-712 signing.
pub fn eip712_extra(name: &str, version: &str) -> serde_json::Value {
    json!({ "name": name, "version": version })
}
