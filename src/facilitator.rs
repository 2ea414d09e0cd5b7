//! The facilitator: the protocol surface over verification and
//! settlement.
//!
//! Sequences payload decoding, constraint verification, signature
//! verification, and the settlement executor, mapping every outcome to
//! the wire types. Stateless across requests: each verify or settle call
//! is independent, and correctness under concurrency is delegated to the
//! underlying chain's atomic nonce consumption.
//!
//! Caller obligation: sellers should call [`Facilitator::verify`] first,
//! serve their paid resource, and only then call
//! [`Facilitator::settle`]. Settlement is the seller's proof-of-payment
//! step, not a precondition for serving; the facilitator cannot enforce
//! that ordering.

use crate::chain::AdapterMap;
use crate::registry::NetworkRegistry;
use crate::settlement::{SettleOutcome, SettlementConfig, SettlementExecutor};
use crate::types::{
    HealthResponse, InvalidReason, NetworkHealth, SettleRequest, SettleResponse,
    SupportedResponse, VerifyRequest, VerifyResponse,
};
use std::time::Duration;

/// Behavior knobs for the facilitator.
#[derive(Debug, Clone)]
pub struct FacilitatorOptions {
    /// Whether verification runs the adapters' read-only preflight
    /// checks. Off, verification is fully offline.
    pub preflight: bool,
    /// Budget for the preflight's chain round-trips.
    pub verify_timeout: Duration,
    /// Settlement executor tuning.
    pub settlement: SettlementConfig,
}

impl Default for FacilitatorOptions {
    fn default() -> Self {
        Self {
            preflight: false,
            verify_timeout: Duration::from_secs(5),
            settlement: SettlementConfig::default(),
        }
    }
}

/// A payment facilitator instance: registry, adapter lookup table, and
/// settlement executor, all built once at startup and shared across
/// concurrent requests.
pub struct Facilitator {
    registry: NetworkRegistry,
    adapters: AdapterMap,
    options: FacilitatorOptions,
    executor: SettlementExecutor,
}

impl Facilitator {
    /// Assembles a facilitator from its injected dependencies.
    pub fn new(registry: NetworkRegistry, adapters: AdapterMap, options: FacilitatorOptions) -> Self {
        let executor = SettlementExecutor::new(options.settlement.clone());
        Self {
            registry,
            adapters,
            options,
            executor,
        }
    }

    /// The registry this facilitator serves from.
    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// Checks a payment payload against its requirement without touching
    /// chain state. Business-rule violations come back as structured
    /// invalid reasons, never as errors.
    pub async fn verify(&self, request: &VerifyRequest) -> VerifyResponse {
        let payload = &request.payment_payload;
        let requirements = &request.payment_requirements;

        let adapter = match self.adapters.get(&requirements.network) {
            Some(adapter) => adapter,
            None => return VerifyResponse::invalid(None, InvalidReason::UnsupportedNetwork),
        };
        if self
            .registry
            .asset(&requirements.network, &requirements.asset)
            .is_none()
        {
            return VerifyResponse::invalid(None, InvalidReason::UnsupportedAsset);
        }

        let intent = match adapter.extract_intent(payload, requirements) {
            Ok(intent) => intent,
            Err(reason) => return VerifyResponse::invalid(None, reason),
        };
        let payer = Some(intent.payer.clone());

        if let Err(reason) = crate::verify::check_constraints(payload, requirements, &intent) {
            return VerifyResponse::invalid(payer, reason);
        }

        if let Err(reason) = adapter.verify_signature(payload, requirements).await {
            return VerifyResponse::invalid(payer, reason);
        }

        if self.options.preflight {
            let preflight = adapter.preflight(payload, requirements);
            match tokio::time::timeout(self.options.verify_timeout, preflight).await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => return VerifyResponse::invalid(payer, reason),
                Err(_) => {
                    return VerifyResponse::invalid(payer, InvalidReason::ChainTransportError)
                }
            }
        }

        VerifyResponse::valid(intent.payer)
    }

    /// Re-verifies the payload and drives settlement. Never submits a
    /// transaction for a payload that fails verification; the validity
    /// window is re-checked here independently of any earlier verify.
    pub async fn settle(&self, request: &SettleRequest) -> SettleResponse {
        let network = request.payment_requirements.network.clone();

        let verification = self.verify(request).await;
        if !verification.is_valid {
            let reason = verification
                .invalid_reason
                .unwrap_or(InvalidReason::MalformedPayload);
            return SettleResponse::refused(network, verification.payer, reason);
        }
        let payer = verification.payer;

        // Verification just resolved this adapter; re-resolve instead of
        // assuming.
        let adapter = match self.adapters.get(&network) {
            Some(adapter) => adapter,
            None => {
                return SettleResponse::refused(network, payer, InvalidReason::UnsupportedNetwork)
            }
        };

        let outcome = self
            .executor
            .execute(
                adapter.as_ref(),
                &request.payment_payload,
                &request.payment_requirements,
            )
            .await;

        match outcome {
            SettleOutcome::Settled { transaction } => SettleResponse {
                success: true,
                transaction: Some(transaction),
                network,
                payer,
                error_reason: None,
            },
            SettleOutcome::AlreadySettled => SettleResponse {
                success: true,
                transaction: None,
                network,
                payer,
                error_reason: None,
            },
            SettleOutcome::Unconfirmed { transaction } => SettleResponse {
                success: false,
                transaction: Some(transaction),
                network,
                payer,
                error_reason: Some(InvalidReason::ConfirmationTimeout),
            },
            SettleOutcome::Failed { reason } => SettleResponse::refused(network, payer, reason),
        }
    }

    /// Static capability advertisement.
    pub fn supported(&self) -> SupportedResponse {
        self.registry.supported_kinds()
    }

    /// Liveness only; no chain round-trips.
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
        }
    }

    /// One read RPC per network, for operators who want connectivity
    /// confirmed rather than inferred.
    pub async fn deep_health(&self) -> Vec<NetworkHealth> {
        let mut report = Vec::with_capacity(self.adapters.len());
        for (network, adapter) in &self.adapters {
            let result = tokio::time::timeout(self.options.verify_timeout, adapter.probe()).await;
            let (reachable, error) = match result {
                Ok(Ok(())) => (true, None),
                Ok(Err(e)) => (false, Some(e.to_string())),
                Err(_) => (false, Some("probe timed out".to_string())),
            };
            report.push(NetworkHealth {
                network: network.clone(),
                reachable,
                error,
            });
        }
        report.sort_by(|a, b| a.network.cmp(&b.network));
        report
    }
}
