//! Retry policies for failed deliveries.

use crate::error::ReplError;
use metasync_protocol::{ChangeRecord, NodeId};

/// Advises the delivery worker after a failed attempt.
///
/// The policy never retries anything itself: it returns a total-attempt
/// budget for the record (the attempt that just failed counts against it),
/// or `-1` to abandon immediately. The `-1` return is the single
/// authoritative give-up signal; the worker then commits the record as
/// abandoned.
pub trait RetryPolicy: Send + Sync {
    /// Returns the total-attempt budget for this record, or `-1`.
    fn retry(&self, dest: &NodeId, record: &ChangeRecord, error: &ReplError) -> i32;
}

/// Never retries: every failure abandons the record after one attempt.
pub struct FailFast;

impl RetryPolicy for FailFast {
    fn retry(&self, _dest: &NodeId, _record: &ChangeRecord, _error: &ReplError) -> i32 {
        -1
    }
}

/// Allows a fixed number of attempts for retryable failures.
///
/// Non-retryable failures (an encode error, a fatal transport fault)
/// abandon immediately regardless of the budget.
pub struct BoundedRetry {
    budget: u32,
}

impl BoundedRetry {
    /// Creates a policy with the given total-attempt budget.
    pub fn new(budget: u32) -> Self {
        Self { budget }
    }
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy for BoundedRetry {
    fn retry(&self, _dest: &NodeId, _record: &ChangeRecord, error: &ReplError) -> i32 {
        if error.is_retryable() {
            self.budget as i32
        } else {
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metasync_protocol::{ChangeAction, EntityBody, NodeId, Route};

    fn record() -> ChangeRecord {
        ChangeRecord::new(
            ChangeAction::Update,
            EntityBody::Route(Route {
                route_id: "r-1".into(),
                project_id: None,
                node_id: NodeId::new("node-b"),
                endpoint: "10.0.0.2:50050".into(),
                last_update_time: 1,
            }),
        )
    }

    #[test]
    fn fail_fast_always_abandons() {
        let policy = FailFast;
        let err = ReplError::transport_retryable("timeout");
        assert_eq!(policy.retry(&NodeId::new("node-b"), &record(), &err), -1);
    }

    #[test]
    fn bounded_retry_returns_budget_for_retryable() {
        let policy = BoundedRetry::new(3);
        let err = ReplError::transport_retryable("connection refused");
        assert_eq!(policy.retry(&NodeId::new("node-b"), &record(), &err), 3);
    }

    #[test]
    fn bounded_retry_abandons_fatal_failures() {
        let policy = BoundedRetry::new(3);
        let err = ReplError::transport_fatal("certificate rejected");
        assert_eq!(policy.retry(&NodeId::new("node-b"), &record(), &err), -1);
    }

    #[test]
    fn remote_rejection_is_retried() {
        let policy = BoundedRetry::default();
        let err = ReplError::Rejected {
            code: 2,
            msg: "apply failed".into(),
        };
        assert_eq!(policy.retry(&NodeId::new("node-b"), &record(), &err), 3);
    }
}
