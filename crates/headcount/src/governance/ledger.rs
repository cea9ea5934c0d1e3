use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{ActorId, Approval, ApprovalId, ApprovalOutcome, RequestNo};
use super::storage::StoreError;

/// Append-only persistence port for approval decisions. There is no update or delete.
pub trait ApprovalStore: Send + Sync {
    fn append(&self, approval: Approval) -> Result<Approval, StoreError>;
    fn for_request(&self, request_no: &RequestNo) -> Result<Vec<Approval>, StoreError>;
}

/// Audit trail of every approval and rejection.
pub struct ApprovalLedger {
    store: Arc<dyn ApprovalStore>,
    sequence: AtomicU64,
}

impl ApprovalLedger {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self {
            store,
            sequence: AtomicU64::new(1),
        }
    }

    /// Append a decision. Storage failures are returned as-is; the ledger never retries.
    pub fn record(
        &self,
        request_no: &RequestNo,
        approver: &ActorId,
        outcome: ApprovalOutcome,
        level: u8,
        comment: &str,
        decided_at: DateTime<Utc>,
    ) -> Result<Approval, StoreError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let approval = Approval {
            id: ApprovalId(format!("APV-{sequence:06}")),
            request_no: request_no.clone(),
            approver: approver.clone(),
            outcome,
            level,
            comment: comment.to_string(),
            decided_at,
            sequence,
        };

        let stored = self.store.append(approval)?;
        debug!(request = %stored.request_no, approval = %stored.id, ?outcome, level, "approval recorded");
        Ok(stored)
    }

    pub fn history(&self, request_no: &RequestNo) -> Result<ApprovalHistory, StoreError> {
        let rows = self.store.for_request(request_no)?;
        Ok(ApprovalHistory::new(rows))
    }
}

/// Chronological decisions for one request. Iterating twice yields the same rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalHistory {
    rows: Vec<Approval>,
}

impl ApprovalHistory {
    fn new(mut rows: Vec<Approval>) -> Self {
        rows.sort_by(|a, b| {
            a.decided_at
                .cmp(&b.decided_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        Self { rows }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Approval> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest(&self) -> Option<&Approval> {
        self.rows.last()
    }

    pub fn into_vec(self) -> Vec<Approval> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a ApprovalHistory {
    type Item = &'a Approval;
    type IntoIter = std::slice::Iter<'a, Approval>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::memory::InMemoryApprovalStore;
    use chrono::Duration;

    #[test]
    fn history_orders_by_decision_time_then_append_order() {
        let ledger = ApprovalLedger::new(Arc::new(InMemoryApprovalStore::default()));
        let request = RequestNo::new("MR-000001");
        let approver = ActorId::new("mgr-1");
        let now = Utc::now();

        ledger
            .record(&request, &approver, ApprovalOutcome::Approved, 2, "second", now)
            .expect("append succeeds");
        ledger
            .record(
                &request,
                &approver,
                ApprovalOutcome::Approved,
                1,
                "first",
                now - Duration::minutes(5),
            )
            .expect("append succeeds");
        ledger
            .record(&request, &approver, ApprovalOutcome::Rejected, 99, "third", now)
            .expect("append succeeds");
        ledger
            .record(
                &RequestNo::new("MR-000002"),
                &approver,
                ApprovalOutcome::Approved,
                1,
                "other request",
                now,
            )
            .expect("append succeeds");

        let history = ledger.history(&request).expect("history loads");
        let comments = history
            .iter()
            .map(|row| row.comment.as_str())
            .collect::<Vec<_>>();
        assert_eq!(comments, vec!["first", "second", "third"]);

        let replayed = (&history).into_iter().count();
        assert_eq!(replayed, 3, "history can be iterated again");
        assert_eq!(
            history.latest().map(|row| row.outcome),
            Some(ApprovalOutcome::Rejected)
        );
    }

    #[test]
    fn record_assigns_distinct_identifiers() {
        let ledger = ApprovalLedger::new(Arc::new(InMemoryApprovalStore::default()));
        let request = RequestNo::new("MR-000010");
        let approver = ActorId::new("hr-lead");
        let first = ledger
            .record(&request, &approver, ApprovalOutcome::Approved, 1, "ok", Utc::now())
            .expect("append succeeds");
        let second = ledger
            .record(&request, &approver, ApprovalOutcome::Approved, 2, "ok", Utc::now())
            .expect("append succeeds");
        assert_ne!(first.id, second.id);
        assert!(second.sequence > first.sequence);
    }
}
