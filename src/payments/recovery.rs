//! Best-effort recovery of failed transactions.
//!
//! Failed `payment_intent_create` operations inside the lookback window are
//! resubmitted with the request recorded in their start entry. A replay runs
//! as a new transaction whose start entry names the root transaction in
//! `replay_of` and whose idempotency key is the root's id, so every failure
//! in a chain resolves to one root and the root is replayed at most once per
//! sweep. A successful replay leaves a `payment_intent_create_recovered`
//! marker on the root so later sweeps skip the whole chain. Other failures
//! have no replay and are reported as still failed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::json;

use super::error::PaymentError;
use super::service::{ResilientPaymentService, PAYMENT_INTENT_CREATE};
use super::transaction_log::TransactionLogEntry;
use super::types::{PaymentRequest, RecoverySummary};

pub const RECOVERED_SUFFIX: &str = "_recovered";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecoveryStrategy {
    ReplayPaymentIntent,
}

impl RecoveryStrategy {
    fn for_action(action: &str) -> Option<Self> {
        match action.strip_suffix("_failed") {
            Some(PAYMENT_INTENT_CREATE) => Some(RecoveryStrategy::ReplayPaymentIntent),
            _ => None,
        }
    }
}

impl ResilientPaymentService {
    /// Sweep recent failures and replay the ones that can be replayed.
    pub async fn recover_failed_transactions(&self) -> RecoverySummary {
        let cutoff = Utc::now()
            .checked_sub_signed(self.recovery_lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let failures = self.log.failures_since(cutoff);
        tracing::info!(candidates = failures.len(), "Starting transaction recovery");

        let mut summary = RecoverySummary::default();
        let mut seen = HashSet::new();

        for entry in failures {
            let root = self.root_transaction(&entry);
            if !seen.insert(root.clone()) {
                continue;
            }
            let marker = recovered_action(&entry.action);
            if self.log.find(&root, &marker).is_some() {
                continue;
            }

            match RecoveryStrategy::for_action(&entry.action) {
                Some(RecoveryStrategy::ReplayPaymentIntent) => match self.replay_payment_intent(&entry, &root).await {
                    Ok((payment_intent_id, replay_txn)) => {
                        self.log.record(
                            &root,
                            &marker,
                            json!({
                                "payment_intent_id": payment_intent_id,
                                "replayed_as": replay_txn,
                            }),
                        );
                        tracing::info!(
                            transaction_id = %root,
                            payment_intent_id = %payment_intent_id,
                            "Recovered failed transaction"
                        );
                        summary.recovered += 1;
                    }
                    Err(e) => {
                        tracing::warn!(transaction_id = %root, error = %e, "Recovery attempt failed");
                        summary.failed += 1;
                    }
                },
                None => {
                    tracing::debug!(
                        transaction_id = %entry.transaction_id,
                        action = %entry.action,
                        "No recovery strategy for action"
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(recovered = summary.recovered, failed = summary.failed, "Transaction recovery completed");
        summary
    }

    /// The transaction a failure ultimately belongs to: the `replay_of` of
    /// its start entry, or the failure's own transaction.
    fn root_transaction(&self, failed: &TransactionLogEntry) -> String {
        self.log
            .find(&failed.transaction_id, &start_action(&failed.action))
            .and_then(|start| start.data.get("replay_of")?.as_str().map(str::to_string))
            .unwrap_or_else(|| failed.transaction_id.clone())
    }

    /// Resubmit the request of `failed` on behalf of `root`. Returns the new
    /// intent id and the replay's transaction id.
    async fn replay_payment_intent(
        &self,
        failed: &TransactionLogEntry,
        root: &str,
    ) -> Result<(String, String), PaymentError> {
        if failed.data.get("kind").and_then(|k| k.as_str()) == Some("validation") {
            return Err(PaymentError::Validation("original request was invalid".into()));
        }

        let start = self
            .log
            .find(&failed.transaction_id, &format!("{PAYMENT_INTENT_CREATE}_start"))
            .ok_or_else(|| PaymentError::Decode("start entry no longer in the log".into()))?;
        let request: PaymentRequest = serde_json::from_value(start.data["request"].clone())
            .map_err(|e| PaymentError::Decode(format!("recorded request: {e}")))?;

        let response = self.submit_payment_intent(request, Some(root)).await;
        match (response.success, response.payment_intent_id, response.transaction_id) {
            (true, Some(id), Some(txn)) => Ok((id, txn)),
            _ => Err(PaymentError::untyped(
                response.error.unwrap_or_else(|| "replay failed".to_string()),
            )),
        }
    }
}

fn base_action(action: &str) -> &str {
    action.strip_suffix("_failed").unwrap_or(action)
}

fn start_action(failed_action: &str) -> String {
    format!("{}_start", base_action(failed_action))
}

fn recovered_action(failed_action: &str) -> String {
    format!("{}{RECOVERED_SUFFIX}", base_action(failed_action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            RecoveryStrategy::for_action("payment_intent_create_failed"),
            Some(RecoveryStrategy::ReplayPaymentIntent)
        );
        assert_eq!(RecoveryStrategy::for_action("refund_create_failed"), None);
        assert_eq!(RecoveryStrategy::for_action("payment_intent_create_start"), None);
    }

    #[test]
    fn test_recovered_marker_name() {
        assert_eq!(
            recovered_action("payment_intent_create_failed"),
            "payment_intent_create_recovered"
        );
        assert_eq!(start_action("refund_create_failed"), "refund_create_start");
    }
}
