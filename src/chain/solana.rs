//! Adapter for the fee-delegated Solana family.
//!
//! The payload carries a serialized SPL-token `TransferChecked`
//! transaction signed by the payer in every required slot except the
//! fee-payer slot. Verification checks the transaction's structure and
//! the payer's ed25519 signature over the message bytes; settlement adds
//! the facilitator's fee-payer signature and broadcasts the completed
//! transaction. Because ed25519 signing is deterministic, the fee-payer
//! signature doubles as the transaction id, which makes the
//! already-settled read-check possible without local state.

use crate::chain::{ChainAdapter, ConfirmOutcome, SubmitError, TransferIntent};
use crate::errors::{FacilitatorError, Result};
use crate::registry::NetworkEntry;
use crate::types::{
    ExactPayload, ExactSolanaPayload, InvalidReason, PaymentPayload, PaymentRequirements,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, VerifyingKey};
use ethers::types::U256;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

/// SPL Token program.
const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
/// Token-2022 program.
const TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1pHnBqCXEpPxuEb";
/// Associated token account program.
const ATA_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";
/// Compute budget program; its instructions are tolerated but ignored.
const COMPUTE_BUDGET_PROGRAM: &str = "ComputeBudget111111111111111111111111111111";

/// SPL Token `TransferChecked` instruction discriminant.
const TRANSFER_CHECKED: u8 = 12;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

fn decode_pubkey(s: &str) -> Option<[u8; 32]> {
    let bytes = bs58::decode(s).into_vec().ok()?;
    bytes.try_into().ok()
}

fn encode_pubkey(key: &[u8; 32]) -> String {
    bs58::encode(key).into_string()
}

/// A 32-byte hash is a valid program-derived address only when it does
/// not decompress to a curve point.
fn is_off_curve(bytes: &[u8; 32]) -> bool {
    VerifyingKey::from_bytes(bytes).is_err()
}

/// Derives the associated token account of `wallet` for `mint` under
/// the given token program.
pub fn derive_associated_token_account(
    wallet: &[u8; 32],
    token_program: &[u8; 32],
    mint: &[u8; 32],
) -> Option<[u8; 32]> {
    let ata_program = decode_pubkey(ATA_PROGRAM)?;
    for bump in (0u8..=255).rev() {
        let mut hasher = Sha256::new();
        hasher.update(wallet);
        hasher.update(token_program);
        hasher.update(mint);
        hasher.update([bump]);
        hasher.update(ata_program);
        hasher.update(PDA_MARKER);
        let candidate: [u8; 32] = hasher.finalize().into();
        if is_off_curve(&candidate) {
            return Some(candidate);
        }
    }
    None
}

// --- wire format -------------------------------------------------------

fn read_shortvec_len(data: &[u8], pos: &mut usize) -> Option<usize> {
    let mut len = 0usize;
    let mut shift = 0u32;
    loop {
        let byte = *data.get(*pos)?;
        *pos += 1;
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return Some(len);
        }
        shift += 7;
        if shift > 14 {
            return None;
        }
    }
}

fn write_shortvec_len(out: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len & 0x7f) as u8;
        len >>= 7;
        if len != 0 {
            byte |= 0x80;
            out.push(byte);
        } else {
            out.push(byte);
            break;
        }
    }
}

fn take<'a>(data: &'a [u8], pos: &mut usize, n: usize) -> Option<&'a [u8]> {
    let slice = data.get(*pos..*pos + n)?;
    *pos += n;
    Some(slice)
}

/// One compiled instruction: indices into the message's account table
/// plus opaque program data.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CompiledInstruction {
    program_id_index: u8,
    accounts: Vec<u8>,
    data: Vec<u8>,
}

/// Parsed transaction message. `bytes` holds the exact serialized form,
/// which is what every signer signs.
#[derive(Debug, Clone)]
struct SolanaMessage {
    num_required_signatures: u8,
    #[allow(dead_code)]
    num_readonly_signed: u8,
    #[allow(dead_code)]
    num_readonly_unsigned: u8,
    account_keys: Vec<[u8; 32]>,
    recent_blockhash: [u8; 32],
    instructions: Vec<CompiledInstruction>,
    bytes: Vec<u8>,
}

impl SolanaMessage {
    /// Parses a legacy or v0 message. v0 messages with address-table
    /// lookups are rejected: payment transfers use static keys only.
    fn parse(bytes: &[u8]) -> Option<Self> {
        let mut pos = 0usize;
        let first = *bytes.first()?;
        let versioned = first & 0x80 != 0;
        if versioned {
            if first & 0x7f != 0 {
                return None;
            }
            pos = 1;
        }

        let header = take(bytes, &mut pos, 3)?;
        let (num_required_signatures, num_readonly_signed, num_readonly_unsigned) =
            (header[0], header[1], header[2]);

        let key_count = read_shortvec_len(bytes, &mut pos)?;
        if key_count == 0 || key_count > 64 {
            return None;
        }
        let mut account_keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let key: [u8; 32] = take(bytes, &mut pos, 32)?.try_into().ok()?;
            account_keys.push(key);
        }

        let recent_blockhash: [u8; 32] = take(bytes, &mut pos, 32)?.try_into().ok()?;

        let ix_count = read_shortvec_len(bytes, &mut pos)?;
        let mut instructions = Vec::with_capacity(ix_count);
        for _ in 0..ix_count {
            let program_id_index = *take(bytes, &mut pos, 1)?.first()?;
            let account_count = read_shortvec_len(bytes, &mut pos)?;
            let accounts = take(bytes, &mut pos, account_count)?.to_vec();
            let data_len = read_shortvec_len(bytes, &mut pos)?;
            let data = take(bytes, &mut pos, data_len)?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        if versioned {
            let lookup_count = read_shortvec_len(bytes, &mut pos)?;
            if lookup_count != 0 {
                return None;
            }
        }

        if pos != bytes.len() || (num_required_signatures as usize) > account_keys.len() {
            return None;
        }

        Some(Self {
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            account_keys,
            recent_blockhash,
            instructions,
            bytes: bytes.to_vec(),
        })
    }

    fn key(&self, index: u8) -> Option<&[u8; 32]> {
        self.account_keys.get(index as usize)
    }
}

fn serialize_legacy_message(
    header: (u8, u8, u8),
    account_keys: &[[u8; 32]],
    recent_blockhash: &[u8; 32],
    instructions: &[CompiledInstruction],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(header.0);
    out.push(header.1);
    out.push(header.2);
    write_shortvec_len(&mut out, account_keys.len());
    for key in account_keys {
        out.extend_from_slice(key);
    }
    out.extend_from_slice(recent_blockhash);
    write_shortvec_len(&mut out, instructions.len());
    for ix in instructions {
        out.push(ix.program_id_index);
        write_shortvec_len(&mut out, ix.accounts.len());
        out.extend_from_slice(&ix.accounts);
        write_shortvec_len(&mut out, ix.data.len());
        out.extend_from_slice(&ix.data);
    }
    out
}

/// Parsed transaction: signature table plus message.
#[derive(Debug, Clone)]
struct SolanaTransaction {
    signatures: Vec<[u8; 64]>,
    message: SolanaMessage,
}

impl SolanaTransaction {
    fn parse(data: &[u8]) -> Option<Self> {
        let mut pos = 0usize;
        let sig_count = read_shortvec_len(data, &mut pos)?;
        if sig_count == 0 || sig_count > 16 {
            return None;
        }
        let mut signatures = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            let sig: [u8; 64] = take(data, &mut pos, 64)?.try_into().ok()?;
            signatures.push(sig);
        }
        let message = SolanaMessage::parse(data.get(pos..)?)?;
        if signatures.len() != message.num_required_signatures as usize {
            return None;
        }
        Some(Self {
            signatures,
            message,
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_shortvec_len(&mut out, self.signatures.len());
        for sig in &self.signatures {
            out.extend_from_slice(sig);
        }
        out.extend_from_slice(&self.message.bytes);
        out
    }
}

/// The token transfer a payment transaction performs.
struct TokenTransfer {
    source_index: u8,
    mint_index: u8,
    destination_index: u8,
    authority_index: u8,
    amount: u64,
    decimals: u8,
    token_program: [u8; 32],
}

fn find_token_transfer(
    message: &SolanaMessage,
) -> std::result::Result<TokenTransfer, InvalidReason> {
    let token_program = decode_pubkey(TOKEN_PROGRAM).expect("static pubkey");
    let token_2022 = decode_pubkey(TOKEN_2022_PROGRAM).expect("static pubkey");
    let compute_budget = decode_pubkey(COMPUTE_BUDGET_PROGRAM).expect("static pubkey");

    let mut transfer = None;
    for ix in &message.instructions {
        let program = message
            .key(ix.program_id_index)
            .ok_or(InvalidReason::MalformedPayload)?;

        if *program == compute_budget {
            continue;
        }
        if *program != token_program && *program != token_2022 {
            // No other program may touch state in a payment transaction.
            return Err(InvalidReason::MalformedPayload);
        }
        if transfer.is_some() {
            return Err(InvalidReason::MalformedPayload);
        }
        if ix.data.len() < 10 || ix.data[0] != TRANSFER_CHECKED || ix.accounts.len() < 4 {
            return Err(InvalidReason::MalformedPayload);
        }

        let amount = u64::from_le_bytes(
            ix.data[1..9]
                .try_into()
                .map_err(|_| InvalidReason::MalformedPayload)?,
        );
        transfer = Some(TokenTransfer {
            source_index: ix.accounts[0],
            mint_index: ix.accounts[1],
            destination_index: ix.accounts[2],
            authority_index: ix.accounts[3],
            amount,
            decimals: ix.data[9],
            token_program: *program,
        });
    }
    transfer.ok_or(InvalidReason::MalformedPayload)
}

// --- RPC ---------------------------------------------------------------

enum RpcFailure {
    /// HTTP-level failure: the node never answered.
    Transport(String),
    /// The node answered with a JSON-RPC error object.
    Node(String),
}

/// Adapter for one Solana network. Holds the shared HTTP client and the
/// fee-payer keypair for process lifetime; the keypair is only ever read
/// during request handling.
pub struct SolanaChain {
    network: String,
    entry: NetworkEntry,
    rpc_url: String,
    http: reqwest::Client,
    keypair: SigningKey,
    fee_payer: [u8; 32],
    confirm_interval: Duration,
}

impl SolanaChain {
    /// Builds the adapter from its registry entry and the facilitator's
    /// fee-payer keypair, given as base58 of either the 64-byte keypair
    /// or the 32-byte seed.
    pub fn new(network: impl Into<String>, entry: NetworkEntry, keypair_b58: &str) -> Result<Self> {
        let network = network.into();
        let secret = bs58::decode(keypair_b58)
            .into_vec()
            .map_err(|e| FacilitatorError::Config(format!("invalid fee payer keypair: {}", e)))?;

        let keypair = match secret.len() {
            64 => {
                let bytes: [u8; 64] = secret.try_into().expect("length checked");
                SigningKey::from_keypair_bytes(&bytes).map_err(|e| {
                    FacilitatorError::Config(format!("invalid fee payer keypair: {}", e))
                })?
            }
            32 => {
                let bytes: [u8; 32] = secret.try_into().expect("length checked");
                SigningKey::from_bytes(&bytes)
            }
            n => {
                return Err(FacilitatorError::Config(format!(
                    "fee payer keypair must be 32 or 64 bytes, got {}",
                    n
                )))
            }
        };

        let fee_payer = keypair.verifying_key().to_bytes();
        if let Some(declared) = &entry.fee_payer {
            if *declared != encode_pubkey(&fee_payer) {
                return Err(FacilitatorError::Config(format!(
                    "registry fee payer {} does not match loaded keypair",
                    declared
                )));
            }
        }

        Ok(Self {
            network,
            rpc_url: entry.rpc_url.clone(),
            entry,
            http: reqwest::Client::new(),
            keypair,
            fee_payer,
            confirm_interval: Duration::from_millis(500),
        })
    }

    /// The fee-payer public key this adapter settles with, base58.
    pub fn fee_payer_pubkey(&self) -> String {
        encode_pubkey(&self.fee_payer)
    }

    fn solana_payload<'a>(
        payload: &'a PaymentPayload,
    ) -> std::result::Result<&'a ExactSolanaPayload, InvalidReason> {
        match &payload.payload {
            ExactPayload::Solana(solana) => Ok(solana),
            ExactPayload::Evm(_) => Err(InvalidReason::MalformedPayload),
        }
    }

    fn decode_transaction(
        payload: &PaymentPayload,
    ) -> std::result::Result<SolanaTransaction, InvalidReason> {
        let solana = Self::solana_payload(payload)?;
        let bytes = BASE64
            .decode(solana.transaction.as_bytes())
            .map_err(|_| InvalidReason::MalformedPayload)?;
        SolanaTransaction::parse(&bytes).ok_or(InvalidReason::MalformedPayload)
    }

    /// Fee-payer signature over the message bytes. Deterministic, so it
    /// also serves as the settled transaction's id.
    fn fee_payer_signature(&self, tx: &SolanaTransaction) -> [u8; 64] {
        self.keypair.sign(&tx.message.bytes).to_bytes()
    }

    async fn rpc_call(&self, method: &str, params: Value) -> std::result::Result<Value, RpcFailure> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error")
                .to_string();
            return Err(RpcFailure::Node(message));
        }
        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Looks up a signature's status; `Some(Ok(()))` means confirmed
    /// without error, `Some(Err(detail))` means recorded but failed.
    async fn signature_status(
        &self,
        signature: &str,
    ) -> std::result::Result<Option<std::result::Result<(), String>>, RpcFailure> {
        let result = self
            .rpc_call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;

        let status = match result.get("value").and_then(|v| v.get(0)) {
            Some(Value::Null) | None => return Ok(None),
            Some(status) => status,
        };

        if let Some(err) = status.get("err") {
            if !err.is_null() {
                return Ok(Some(Err(err.to_string())));
            }
        }

        let confirmed = status
            .get("confirmationStatus")
            .and_then(|s| s.as_str())
            .map(|s| s == "confirmed" || s == "finalized")
            .unwrap_or(false);
        if confirmed {
            Ok(Some(Ok(())))
        } else {
            // Only "processed": treat as not yet settled.
            Ok(None)
        }
    }
}

#[async_trait]
impl ChainAdapter for SolanaChain {
    fn network(&self) -> &str {
        &self.network
    }

    fn extract_intent(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<TransferIntent, InvalidReason> {
        let tx = Self::decode_transaction(payload)?;
        let transfer = find_token_transfer(&tx.message)?;

        let mint = tx
            .message
            .key(transfer.mint_index)
            .ok_or(InvalidReason::MalformedPayload)?;
        let destination = tx
            .message
            .key(transfer.destination_index)
            .ok_or(InvalidReason::MalformedPayload)?;
        let authority = tx
            .message
            .key(transfer.authority_index)
            .ok_or(InvalidReason::MalformedPayload)?;

        if let Some(asset) = self
            .entry
            .assets
            .iter()
            .find(|a| a.address == encode_pubkey(mint))
        {
            if asset.decimals != transfer.decimals {
                return Err(InvalidReason::MalformedPayload);
            }
        }

        // Resolve the destination token account back to the wallet the
        // requirement names, when it is that wallet's associated account.
        let pay_to_wallet =
            decode_pubkey(&requirements.pay_to).ok_or(InvalidReason::MalformedPayload)?;
        let expected_destination =
            derive_associated_token_account(&pay_to_wallet, &transfer.token_program, mint)
                .ok_or(InvalidReason::MalformedPayload)?;
        let pay_to = if *destination == expected_destination {
            requirements.pay_to.clone()
        } else {
            encode_pubkey(destination)
        };

        Ok(TransferIntent {
            payer: encode_pubkey(authority),
            pay_to,
            asset: Some(encode_pubkey(mint)),
            amount: U256::from(transfer.amount),
            // The recent-blockhash expiry bounds validity on this family.
            valid_after: None,
            valid_before: None,
            nonce: None,
        })
    }

    async fn verify_signature(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<(), InvalidReason> {
        let tx = Self::decode_transaction(payload)?;
        let transfer = find_token_transfer(&tx.message)?;

        let declared_fee_payer = requirements
            .extra
            .as_ref()
            .and_then(|extra| extra.get("feePayer"))
            .and_then(|v| v.as_str())
            .ok_or(InvalidReason::MalformedPayload)?;
        if declared_fee_payer != self.fee_payer_pubkey() {
            return Err(InvalidReason::SignerMismatch);
        }

        let tx_fee_payer = tx.message.key(0).ok_or(InvalidReason::MalformedPayload)?;
        if encode_pubkey(tx_fee_payer) != declared_fee_payer {
            return Err(InvalidReason::SignerMismatch);
        }

        let required = tx.message.num_required_signatures as usize;
        // The payer must occupy a signer slot other than the fee payer's.
        let authority_index = transfer.authority_index as usize;
        if authority_index == 0 || authority_index >= required {
            return Err(InvalidReason::SignatureInvalid);
        }

        for slot in 1..required {
            let key = tx
                .message
                .key(slot as u8)
                .ok_or(InvalidReason::MalformedPayload)?;
            let sig_bytes = tx.signatures[slot];
            if sig_bytes == [0u8; 64] {
                return Err(InvalidReason::SignatureInvalid);
            }
            let verifying_key =
                VerifyingKey::from_bytes(key).map_err(|_| InvalidReason::SignatureInvalid)?;
            let signature = Ed25519Signature::from_bytes(&sig_bytes);
            verifying_key
                .verify_strict(&tx.message.bytes, &signature)
                .map_err(|_| InvalidReason::SignatureInvalid)?;
        }

        // A pre-filled fee-payer slot must at least be our signature.
        if tx.signatures[0] != [0u8; 64] && tx.signatures[0] != self.fee_payer_signature(&tx) {
            return Err(InvalidReason::SignatureInvalid);
        }

        Ok(())
    }

    async fn nonce_consumed(
        &self,
        payload: &PaymentPayload,
        _requirements: &PaymentRequirements,
    ) -> Result<bool> {
        let tx = Self::decode_transaction(payload)
            .map_err(|r| FacilitatorError::Config(r.to_string()))?;
        let signature = bs58::encode(self.fee_payer_signature(&tx)).into_string();

        match self.signature_status(&signature).await {
            Ok(Some(Ok(()))) => Ok(true),
            // A recorded-but-failed transaction moved no funds.
            Ok(Some(Err(_))) | Ok(None) => Ok(false),
            Err(RpcFailure::Transport(m)) | Err(RpcFailure::Node(m)) => {
                Err(FacilitatorError::Transport(m))
            }
        }
    }

    async fn submit(
        &self,
        payload: &PaymentPayload,
        _requirements: &PaymentRequirements,
    ) -> std::result::Result<String, SubmitError> {
        let mut tx = Self::decode_transaction(payload).map_err(|r| SubmitError::Rejected {
            reason: r.to_string(),
            replayed: false,
        })?;

        let signature = self.fee_payer_signature(&tx);
        tx.signatures[0] = signature;
        let encoded = BASE64.encode(tx.to_bytes());
        let tx_ref = bs58::encode(signature).into_string();

        match self
            .rpc_call("sendTransaction", json!([encoded, {"encoding": "base64"}]))
            .await
        {
            Ok(_) => {
                tracing::info!(network = %self.network, tx = %tx_ref, "settlement broadcast");
                Ok(tx_ref)
            }
            Err(RpcFailure::Node(message)) => {
                let replayed = message.contains("already been processed");
                Err(SubmitError::Rejected {
                    reason: message,
                    replayed,
                })
            }
            Err(RpcFailure::Transport(message)) => Err(SubmitError::Transport(message)),
        }
    }

    async fn confirm(&self, tx_ref: &str, deadline: Instant) -> ConfirmOutcome {
        loop {
            match self.signature_status(tx_ref).await {
                Ok(Some(Ok(()))) => return ConfirmOutcome::Confirmed,
                Ok(Some(Err(detail))) => return ConfirmOutcome::Reverted(detail),
                Ok(None) => {}
                Err(RpcFailure::Transport(m)) | Err(RpcFailure::Node(m)) => {
                    tracing::debug!(network = %self.network, error = %m, "status poll failed");
                }
            }

            if Instant::now() >= deadline {
                return ConfirmOutcome::Pending;
            }
            tokio::time::sleep(self.confirm_interval).await;
        }
    }

    async fn probe(&self) -> Result<()> {
        match self.rpc_call("getHealth", json!([])).await {
            Ok(_) => Ok(()),
            Err(RpcFailure::Transport(m)) | Err(RpcFailure::Node(m)) => {
                Err(FacilitatorError::Transport(m))
            }
        }
    }
}

/// Builds a partially-signed SPL `TransferChecked` payment transaction:
/// the buyer-side counterpart of this adapter's verification. The
/// fee-payer slot is left zeroed for the facilitator to fill.
pub fn build_transfer_transaction(
    payer: &SigningKey,
    pay_to: &str,
    mint: &str,
    amount: u64,
    decimals: u8,
    fee_payer: &str,
    recent_blockhash: [u8; 32],
) -> Result<Vec<u8>> {
    let fee_payer = decode_pubkey(fee_payer)
        .ok_or_else(|| FacilitatorError::InvalidAddress(format!("bad fee payer: {}", fee_payer)))?;
    let pay_to_wallet = decode_pubkey(pay_to)
        .ok_or_else(|| FacilitatorError::InvalidAddress(format!("bad payTo: {}", pay_to)))?;
    let mint = decode_pubkey(mint)
        .ok_or_else(|| FacilitatorError::InvalidAddress(format!("bad mint: {}", mint)))?;
    let token_program = decode_pubkey(TOKEN_PROGRAM).expect("static pubkey");

    let payer_wallet = payer.verifying_key().to_bytes();
    let source = derive_associated_token_account(&payer_wallet, &token_program, &mint)
        .ok_or_else(|| FacilitatorError::Config("no source token account".to_string()))?;
    let destination = derive_associated_token_account(&pay_to_wallet, &token_program, &mint)
        .ok_or_else(|| FacilitatorError::Config("no destination token account".to_string()))?;

    // fee payer, payer (signers); source, destination (writable);
    // mint, token program (readonly).
    let account_keys = [
        fee_payer,
        payer_wallet,
        source,
        destination,
        mint,
        token_program,
    ];

    let mut data = Vec::with_capacity(10);
    data.push(TRANSFER_CHECKED);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);

    let instruction = CompiledInstruction {
        program_id_index: 5,
        accounts: vec![2, 4, 3, 1],
        data,
    };

    let message_bytes = serialize_legacy_message(
        (2, 0, 2),
        &account_keys,
        &recent_blockhash,
        std::slice::from_ref(&instruction),
    );

    let payer_signature = payer.sign(&message_bytes).to_bytes();

    let mut out = Vec::new();
    write_shortvec_len(&mut out, 2);
    out.extend_from_slice(&[0u8; 64]);
    out.extend_from_slice(&payer_signature);
    out.extend_from_slice(&message_bytes);
    Ok(out)
}
