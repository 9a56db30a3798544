//! Resolves request completions once a cycle knows their fate.

use std::sync::Arc;

use tracing::trace;

use super::completion::{Completion, Outcome};
use super::intake::WriteRequest;
use super::metrics::EngineMetrics;
use super::validator::{PendingCommit, Rejected};

pub struct CommitNotifier {
    metrics: Arc<EngineMetrics>,
}

impl CommitNotifier {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self { metrics }
    }

    /// Resolve rejected requests with `VersionConflict`. Does not depend on
    /// the log writer.
    pub fn reject(&self, rejected: Vec<Rejected>) {
        self.metrics.record_conflicts(rejected.len());
        for r in rejected {
            self.deliver(
                r.completion,
                Outcome::VersionConflict {
                    current_version: r.current_version,
                },
            );
        }
    }

    /// Resolve every accepted request of a durable record.
    pub fn commit(&self, lsn: u64, pending: Vec<PendingCommit>) {
        for p in pending {
            self.deliver(p.completion, Outcome::Committed { lsn, version: p.version });
        }
    }

    /// Resolve every accepted request of a record that never became durable.
    pub fn fail(&self, pending: Vec<PendingCommit>) {
        for p in pending {
            self.deliver(p.completion, Outcome::IoFailure);
        }
    }

    /// Resolve requests that were dequeued but never validated.
    pub fn abort(&self, requests: Vec<WriteRequest>, outcome: Outcome) {
        for request in requests {
            self.deliver(request.completion(), outcome);
        }
    }

    fn deliver(&self, completion: Completion, outcome: Outcome) {
        if !completion.resolve(outcome) {
            self.metrics.record_discarded();
            trace!(%outcome, "producer stopped waiting; outcome discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_shares_lsn() {
        let metrics = Arc::new(EngineMetrics::new());
        let notifier = CommitNotifier::new(Arc::clone(&metrics));

        let (c1, t1) = Completion::new();
        let (c2, t2) = Completion::new();
        notifier.commit(
            9,
            vec![
                PendingCommit { completion: c1, version: 1 },
                PendingCommit { completion: c2, version: 4 },
            ],
        );

        assert_eq!(t1.wait().await, Outcome::Committed { lsn: 9, version: 1 });
        assert_eq!(t2.wait().await, Outcome::Committed { lsn: 9, version: 4 });
    }

    #[tokio::test]
    async fn test_reject_reports_current_version() {
        let metrics = Arc::new(EngineMetrics::new());
        let notifier = CommitNotifier::new(Arc::clone(&metrics));

        let (c, t) = Completion::new();
        notifier.reject(vec![Rejected { completion: c, current_version: 3 }]);

        assert_eq!(t.wait().await, Outcome::VersionConflict { current_version: 3 });
        assert_eq!(metrics.snapshot().requests_conflicted, 1);
    }

    #[test]
    fn test_abandoned_outcome_is_counted() {
        let metrics = Arc::new(EngineMetrics::new());
        let notifier = CommitNotifier::new(Arc::clone(&metrics));

        let (c, t) = Completion::new();
        drop(t);
        notifier.fail(vec![PendingCommit { completion: c, version: 1 }]);

        assert_eq!(metrics.snapshot().outcomes_discarded, 1);
    }
}
