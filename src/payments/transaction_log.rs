//! Bounded in-memory audit log of payment operations.
//!
//! Every operation appends a `<action>_start` entry and exactly one terminal
//! entry (`_success` or `_failed`) under the same transaction id. When an
//! insert takes the log above `max_entries`, the oldest entries are dropped
//! until `retain_entries` remain.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TransactionLogConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    pub transaction_id: String,
    pub action: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl TransactionLogEntry {
    pub fn is_failure(&self) -> bool {
        self.action.contains("failed")
    }
}

#[derive(Debug)]
pub struct TransactionLog {
    max_entries: usize,
    retain_entries: usize,
    entries: Mutex<VecDeque<TransactionLogEntry>>,
}

impl TransactionLog {
    pub fn new(config: &TransactionLogConfig) -> Self {
        Self {
            max_entries: config.max_entries.max(1),
            retain_entries: config.retain_entries.min(config.max_entries).max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TransactionLogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry stamped with the current time.
    pub fn record(&self, transaction_id: &str, action: &str, data: Value) {
        self.push(TransactionLogEntry {
            transaction_id: transaction_id.to_string(),
            action: action.to_string(),
            data,
            timestamp: Utc::now(),
        });
    }

    pub fn push(&self, entry: TransactionLogEntry) {
        let size = {
            let mut entries = self.lock();
            entries.push_back(entry);
            if entries.len() > self.max_entries {
                let excess = entries.len() - self.retain_entries;
                entries.drain(..excess);
                tracing::debug!(
                    evicted = excess,
                    retained = entries.len(),
                    "Transaction log trimmed"
                );
            }
            entries.len()
        };
        metrics::record_transaction_log_size(size);
    }

    /// All entries, oldest first, optionally restricted to one transaction.
    pub fn entries(&self, transaction_id: Option<&str>) -> Vec<TransactionLogEntry> {
        let entries = self.lock();
        match transaction_id {
            Some(id) => entries.iter().filter(|e| e.transaction_id == id).cloned().collect(),
            None => entries.iter().cloned().collect(),
        }
    }

    /// First entry for `transaction_id` with exactly `action`.
    pub fn find(&self, transaction_id: &str, action: &str) -> Option<TransactionLogEntry> {
        self.lock()
            .iter()
            .find(|e| e.transaction_id == transaction_id && e.action == action)
            .cloned()
    }

    /// Failure entries newer than `cutoff`, oldest first.
    pub fn failures_since(&self, cutoff: DateTime<Utc>) -> Vec<TransactionLogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.timestamp > cutoff && e.is_failure())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn log() -> TransactionLog {
        TransactionLog::new(&TransactionLogConfig::default())
    }

    #[test]
    fn test_overflow_keeps_newest_retained_entries() {
        let log = log();
        for i in 0..10_000 {
            log.record(&format!("txn_{i}"), "payment_intent_create_start", json!({}));
        }
        assert_eq!(log.len(), 10_000);

        log.record("txn_10000", "payment_intent_create_start", json!({}));
        assert_eq!(log.len(), 5_000);

        let entries = log.entries(None);
        assert_eq!(entries.first().unwrap().transaction_id, "txn_5001");
        assert_eq!(entries.last().unwrap().transaction_id, "txn_10000");
    }

    #[test]
    fn test_filter_by_transaction() {
        let log = log();
        log.record("txn_a", "customer_create_start", json!({"email": "a@b.co"}));
        log.record("txn_b", "customer_create_start", json!({}));
        log.record("txn_a", "customer_create_success", json!({"customer_id": "cus_1"}));

        let a = log.entries(Some("txn_a"));
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].action, "customer_create_start");
        assert_eq!(a[1].action, "customer_create_success");
        assert!(log.entries(Some("txn_missing")).is_empty());
        assert_eq!(log.find("txn_a", "customer_create_success").unwrap().data["customer_id"], "cus_1");
    }

    #[test]
    fn test_failures_since_respects_cutoff() {
        let log = log();
        log.push(TransactionLogEntry {
            transaction_id: "txn_old".into(),
            action: "refund_create_failed".into(),
            data: json!({}),
            timestamp: Utc::now() - Duration::hours(30),
        });
        log.record("txn_new", "refund_create_failed", json!({}));
        log.record("txn_ok", "refund_create_success", json!({}));

        let failures = log.failures_since(Utc::now() - Duration::hours(24));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].transaction_id, "txn_new");
    }
}
