//! Settlement executor.
//!
//! Drives a verified payload onto the chain exactly once. The
//! facilitator holds no settlement state of its own: idempotency rests
//! entirely on the chain's atomic nonce consumption, read back through
//! the adapter before and after submission. Transport failures before
//! broadcast are retried with bounded exponential backoff; once a
//! transaction has been broadcast it is never resubmitted, and an
//! ambiguous outcome is reported as such rather than guessed at.

use crate::chain::{ChainAdapter, ConfirmOutcome, SubmitError};
use crate::types::{InvalidReason, PaymentPayload, PaymentRequirements};
use std::time::Duration;
use tokio::time::Instant;

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Submission attempts for transport-level failures.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base: Duration,
    /// Total budget for confirmation polling after broadcast.
    pub settle_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
            settle_timeout: Duration::from_secs(60),
        }
    }
}

/// What settlement concluded. Mapped onto the wire
/// [`crate::types::SettleResponse`] by the facilitator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Transfer confirmed in this call.
    Settled { transaction: String },
    /// The chain already held this authorization as consumed; no new
    /// transaction was submitted.
    AlreadySettled,
    /// Broadcast accepted but finality unknown within the timeout.
    Unconfirmed { transaction: String },
    /// Settlement did not happen.
    Failed { reason: InvalidReason },
}

/// Stateless executor; safe to share across concurrent settlements.
#[derive(Debug, Clone, Default)]
pub struct SettlementExecutor {
    config: SettlementConfig,
}

impl SettlementExecutor {
    /// Creates an executor with the given tuning.
    pub fn new(config: SettlementConfig) -> Self {
        Self { config }
    }

    /// Executes one settlement for a payload that has just re-passed
    /// verification.
    pub async fn execute(
        &self,
        adapter: &dyn ChainAdapter,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleOutcome {
        // Idempotency read: a consumed nonce means this authorization
        // already settled, possibly through a concurrent or earlier
        // call. Report that success instead of resubmitting.
        match self.nonce_consumed_with_retry(adapter, payload, requirements).await {
            Ok(true) => {
                tracing::info!(network = %adapter.network(), "authorization already consumed, settle is idempotent");
                return SettleOutcome::AlreadySettled;
            }
            Ok(false) => {}
            Err(reason) => return SettleOutcome::Failed { reason },
        }

        let transaction = match self.submit_with_retry(adapter, payload, requirements).await {
            Ok(tx) => tx,
            Err(outcome) => return outcome,
        };

        let deadline = Instant::now() + self.config.settle_timeout;
        match adapter.confirm(&transaction, deadline).await {
            ConfirmOutcome::Confirmed => SettleOutcome::Settled { transaction },
            ConfirmOutcome::Pending => {
                tracing::warn!(
                    network = %adapter.network(),
                    tx = %transaction,
                    "confirmation window elapsed, transaction still in flight"
                );
                SettleOutcome::Unconfirmed { transaction }
            }
            ConfirmOutcome::Reverted(detail) => {
                // A revert after broadcast can still be a concurrent
                // settlement of the same authorization winning the
                // race; the nonce read is authoritative.
                tracing::warn!(network = %adapter.network(), tx = %transaction, %detail, "settlement reverted");
                match adapter.nonce_consumed(payload, requirements).await {
                    Ok(true) => SettleOutcome::AlreadySettled,
                    _ => SettleOutcome::Failed {
                        reason: InvalidReason::ChainRejected,
                    },
                }
            }
        }
    }

    async fn nonce_consumed_with_retry(
        &self,
        adapter: &dyn ChainAdapter,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<bool, InvalidReason> {
        let mut attempt = 0u32;
        loop {
            match adapter.nonce_consumed(payload, requirements).await {
                Ok(consumed) => return Ok(consumed),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        tracing::warn!(network = %adapter.network(), error = %err, "nonce read failed after retries");
                        return Err(InvalidReason::ChainTransportError);
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
            }
        }
    }

    async fn submit_with_retry(
        &self,
        adapter: &dyn ChainAdapter,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<String, SettleOutcome> {
        let mut attempt = 0u32;
        loop {
            match adapter.submit(payload, requirements).await {
                Ok(transaction) => return Ok(transaction),
                Err(SubmitError::Transport(detail)) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        tracing::warn!(network = %adapter.network(), %detail, "submission failed after retries");
                        return Err(SettleOutcome::Failed {
                            reason: InvalidReason::ChainTransportError,
                        });
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
                Err(SubmitError::Rejected { reason, replayed }) => {
                    if replayed {
                        // The chain says this authorization was spent.
                        // Confirm against state before calling it a
                        // success; a lying or confused node must not
                        // turn a failure into one.
                        if let Ok(true) = adapter.nonce_consumed(payload, requirements).await {
                            return Err(SettleOutcome::AlreadySettled);
                        }
                        return Err(SettleOutcome::Failed {
                            reason: InvalidReason::NonceAlreadyConsumed,
                        });
                    }
                    tracing::warn!(network = %adapter.network(), %reason, "chain rejected settlement");
                    return Err(SettleOutcome::Failed {
                        reason: InvalidReason::ChainRejected,
                    });
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TransferIntent;
    use crate::errors::{FacilitatorError, Result as FacResult};
    use crate::types::{ExactPayload, ExactSolanaPayload, Scheme, X402_VERSION};
    use async_trait::async_trait;
    use ethers::types::U256;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted adapter for exercising executor policy without a chain.
    struct ScriptedAdapter {
        nonce_results: Mutex<Vec<FacResult<bool>>>,
        submit_results: Mutex<Vec<std::result::Result<String, SubmitError>>>,
        confirm_result: ConfirmOutcome,
        submits: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(
            nonce_results: Vec<FacResult<bool>>,
            submit_results: Vec<std::result::Result<String, SubmitError>>,
            confirm_result: ConfirmOutcome,
        ) -> Self {
            Self {
                nonce_results: Mutex::new(nonce_results),
                submit_results: Mutex::new(submit_results),
                confirm_result,
                submits: AtomicU32::new(0),
            }
        }

        fn submit_count(&self) -> u32 {
            self.submits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainAdapter for ScriptedAdapter {
        fn network(&self) -> &str {
            "scripted"
        }

        fn extract_intent(
            &self,
            _payload: &PaymentPayload,
            _requirements: &PaymentRequirements,
        ) -> std::result::Result<TransferIntent, InvalidReason> {
            Ok(TransferIntent {
                payer: "payer".to_string(),
                pay_to: "payee".to_string(),
                asset: None,
                amount: U256::from(1u64),
                valid_after: None,
                valid_before: None,
                nonce: None,
            })
        }

        async fn verify_signature(
            &self,
            _payload: &PaymentPayload,
            _requirements: &PaymentRequirements,
        ) -> std::result::Result<(), InvalidReason> {
            Ok(())
        }

        async fn nonce_consumed(
            &self,
            _payload: &PaymentPayload,
            _requirements: &PaymentRequirements,
        ) -> FacResult<bool> {
            let mut results = self.nonce_results.lock().unwrap();
            if results.is_empty() {
                return Ok(false);
            }
            results.remove(0)
        }

        async fn submit(
            &self,
            _payload: &PaymentPayload,
            _requirements: &PaymentRequirements,
        ) -> std::result::Result<String, SubmitError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            let mut results = self.submit_results.lock().unwrap();
            if results.is_empty() {
                panic!("unexpected submit");
            }
            results.remove(0)
        }

        async fn confirm(&self, _tx_ref: &str, _deadline: Instant) -> ConfirmOutcome {
            self.confirm_result.clone()
        }

        async fn probe(&self) -> FacResult<()> {
            Ok(())
        }
    }

    fn payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: X402_VERSION,
            scheme: Scheme::Exact,
            network: "scripted".to_string(),
            payload: ExactPayload::Solana(ExactSolanaPayload {
                transaction: String::new(),
            }),
        }
    }

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: "scripted".to_string(),
            asset: "asset".to_string(),
            pay_to: "payee".to_string(),
            max_amount_required: "1".to_string(),
            valid_duration_seconds: 60,
            resource: None,
            description: None,
            extra: None,
        }
    }

    fn executor() -> SettlementExecutor {
        SettlementExecutor::new(SettlementConfig {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            settle_timeout: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn test_clean_settlement() {
        let adapter = ScriptedAdapter::new(
            vec![Ok(false)],
            vec![Ok("tx1".to_string())],
            ConfirmOutcome::Confirmed,
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(
            outcome,
            SettleOutcome::Settled {
                transaction: "tx1".to_string()
            }
        );
        assert_eq!(adapter.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_consumed_nonce_short_circuits_submission() {
        let adapter = ScriptedAdapter::new(vec![Ok(true)], vec![], ConfirmOutcome::Confirmed);
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(outcome, SettleOutcome::AlreadySettled);
        assert_eq!(adapter.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_errors_retry_then_succeed() {
        let adapter = ScriptedAdapter::new(
            vec![Ok(false)],
            vec![
                Err(SubmitError::Transport("timeout".to_string())),
                Err(SubmitError::Transport("reset".to_string())),
                Ok("tx2".to_string()),
            ],
            ConfirmOutcome::Confirmed,
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(
            outcome,
            SettleOutcome::Settled {
                transaction: "tx2".to_string()
            }
        );
        assert_eq!(adapter.submit_count(), 3);
    }

    #[tokio::test]
    async fn test_transport_errors_exhaust_retries() {
        let adapter = ScriptedAdapter::new(
            vec![Ok(false)],
            vec![
                Err(SubmitError::Transport("a".to_string())),
                Err(SubmitError::Transport("b".to_string())),
                Err(SubmitError::Transport("c".to_string())),
            ],
            ConfirmOutcome::Confirmed,
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(
            outcome,
            SettleOutcome::Failed {
                reason: InvalidReason::ChainTransportError
            }
        );
        assert_eq!(adapter.submit_count(), 3);
    }

    #[tokio::test]
    async fn test_replay_rejection_confirms_against_state() {
        // Chain says the nonce was reused; a fresh read confirms it.
        let adapter = ScriptedAdapter::new(
            vec![Ok(false), Ok(true)],
            vec![Err(SubmitError::Rejected {
                reason: "authorization is used".to_string(),
                replayed: true,
            })],
            ConfirmOutcome::Confirmed,
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(outcome, SettleOutcome::AlreadySettled);
        // Never resubmitted after the rejection.
        assert_eq!(adapter.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_replay_claim_unsupported_by_state_is_an_error() {
        let adapter = ScriptedAdapter::new(
            vec![Ok(false), Ok(false)],
            vec![Err(SubmitError::Rejected {
                reason: "already been processed".to_string(),
                replayed: true,
            })],
            ConfirmOutcome::Confirmed,
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(
            outcome,
            SettleOutcome::Failed {
                reason: InvalidReason::NonceAlreadyConsumed
            }
        );
    }

    #[tokio::test]
    async fn test_plain_rejection_is_not_retried() {
        let adapter = ScriptedAdapter::new(
            vec![Ok(false)],
            vec![Err(SubmitError::Rejected {
                reason: "insufficient balance".to_string(),
                replayed: false,
            })],
            ConfirmOutcome::Confirmed,
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(
            outcome,
            SettleOutcome::Failed {
                reason: InvalidReason::ChainRejected
            }
        );
        assert_eq!(adapter.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_is_distinct_from_failure() {
        let adapter = ScriptedAdapter::new(
            vec![Ok(false)],
            vec![Ok("tx3".to_string())],
            ConfirmOutcome::Pending,
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(
            outcome,
            SettleOutcome::Unconfirmed {
                transaction: "tx3".to_string()
            }
        );
        // Broadcast once, never resubmitted despite the ambiguity.
        assert_eq!(adapter.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_revert_rechecks_nonce_before_failing() {
        // The revert was a concurrent settlement winning the race.
        let adapter = ScriptedAdapter::new(
            vec![Ok(false), Ok(true)],
            vec![Ok("tx4".to_string())],
            ConfirmOutcome::Reverted("nonce used".to_string()),
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(outcome, SettleOutcome::AlreadySettled);

        let adapter = ScriptedAdapter::new(
            vec![Ok(false), Ok(false)],
            vec![Ok("tx5".to_string())],
            ConfirmOutcome::Reverted("insufficient funds".to_string()),
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(
            outcome,
            SettleOutcome::Failed {
                reason: InvalidReason::ChainRejected
            }
        );
    }

    #[tokio::test]
    async fn test_nonce_read_failure_surfaces_transport_error() {
        let adapter = ScriptedAdapter::new(
            vec![
                Err(FacilitatorError::Transport("down".to_string())),
                Err(FacilitatorError::Transport("down".to_string())),
                Err(FacilitatorError::Transport("down".to_string())),
            ],
            vec![],
            ConfirmOutcome::Confirmed,
        );
        let outcome = executor().execute(&adapter, &payload(), &requirements()).await;
        assert_eq!(
            outcome,
            SettleOutcome::Failed {
                reason: InvalidReason::ChainTransportError
            }
        );
        assert_eq!(adapter.submit_count(), 0);
    }

    #[test]
    fn test_backoff_doubles() {
        let executor = SettlementExecutor::new(SettlementConfig {
            max_attempts: 4,
            backoff_base: Duration::from_millis(250),
            settle_timeout: Duration::from_secs(60),
        });
        assert_eq!(executor.backoff_delay(1), Duration::from_millis(250));
        assert_eq!(executor.backoff_delay(2), Duration::from_millis(500));
        assert_eq!(executor.backoff_delay(3), Duration::from_millis(1000));
    }
}
