//! Optimistic version checks over a drained batch.
//!
//! Requests are checked strictly in enqueue order against the version
//! table as already updated by earlier requests of the same batch, so a
//! chain of writes to one key (base 0, then 1, then 2, ...) is accepted
//! even when the whole chain lands in a single batch.

use super::completion::Completion;
use super::intake::WriteRequest;
use super::record::LogOperation;
use super::versions::VersionTable;

/// An accepted request waiting for its record to become durable.
#[derive(Debug)]
pub struct PendingCommit {
    pub completion: Completion,
    /// Version the key moves to once the record is durable
    pub version: u64,
}

/// A request whose base version did not match.
#[derive(Debug)]
pub struct Rejected {
    pub completion: Completion,
    pub current_version: u64,
}

/// Result of validating one batch.
#[derive(Debug, Default)]
pub struct Validation {
    /// Operations to serialize, in enqueue order
    pub operations: Vec<LogOperation>,
    /// Result slots of the accepted requests, parallel to `operations`
    pub pending: Vec<PendingCommit>,
    pub rejected: Vec<Rejected>,
    /// Prior version of every advance, in the order the advances happened
    undo: Vec<(Vec<u8>, u64)>,
}

impl Validation {
    pub fn accepted_count(&self) -> usize {
        self.pending.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    /// Put every key advanced by this batch back to its pre-batch version.
    pub fn rollback(&mut self, table: &mut VersionTable) {
        while let Some((key, prior)) = self.undo.pop() {
            table.restore(&key, prior);
        }
    }
}

/// Partition `batch` into accepted and rejected requests, advancing
/// `table` for every accepted one.
pub fn validate(batch: Vec<WriteRequest>, table: &mut VersionTable) -> Validation {
    let mut validation = Validation::default();

    for request in batch {
        let (key, value, base_version, completion) = request.into_parts();
        match table.advance(&key, base_version) {
            Ok(version) => {
                validation.undo.push((key.clone(), base_version));
                validation.operations.push(LogOperation::new(key, value, version));
                validation.pending.push(PendingCommit {
                    completion,
                    version,
                });
            }
            Err(current_version) => validation.rejected.push(Rejected {
                completion,
                current_version,
            }),
        }
    }

    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::completion::CommitTicket;

    fn request(key: &str, base: u64) -> (WriteRequest, CommitTicket) {
        WriteRequest::new(key.as_bytes().to_vec(), format!("{}@{}", key, base).into_bytes(), base)
    }

    fn batch(items: &[(&str, u64)]) -> (Vec<WriteRequest>, Vec<CommitTicket>) {
        items.iter().map(|(k, b)| request(k, *b)).unzip()
    }

    #[test]
    fn test_first_write_to_new_key_accepted() {
        let mut table = VersionTable::new();
        let (requests, _tickets) = batch(&[("a", 0)]);

        let validation = validate(requests, &mut table);

        assert_eq!(validation.accepted_count(), 1);
        assert_eq!(validation.operations[0].version, 1);
        assert_eq!(table.get(b"a"), 1);
    }

    #[test]
    fn test_same_base_version_twice_second_rejected() {
        let mut table = VersionTable::new();
        let (requests, _tickets) = batch(&[("a", 0), ("a", 0)]);

        let validation = validate(requests, &mut table);

        assert_eq!(validation.accepted_count(), 1);
        assert_eq!(validation.rejected_count(), 1);
        assert_eq!(validation.rejected[0].current_version, 1);
        assert_eq!(table.get(b"a"), 1);
    }

    #[test]
    fn test_chained_versions_within_one_batch() {
        let mut table = VersionTable::new();
        let (requests, _tickets) = batch(&[("a", 0), ("a", 1), ("a", 2)]);

        let validation = validate(requests, &mut table);

        let versions: Vec<u64> = validation.operations.iter().map(|op| op.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert!(validation.rejected.is_empty());
        assert_eq!(table.get(b"a"), 3);
    }

    #[test]
    fn test_rejected_request_contributes_no_operation() {
        let mut table = VersionTable::from_entries(vec![(b"b".to_vec(), 2)]);
        let (requests, _tickets) = batch(&[("a", 0), ("b", 1), ("c", 0)]);

        let validation = validate(requests, &mut table);

        let keys: Vec<&[u8]> = validation.operations.iter().map(|op| op.key.as_slice()).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"c".as_slice()]);
        assert_eq!(validation.rejected[0].current_version, 2);
    }

    #[test]
    fn test_rollback_restores_pre_batch_versions() {
        let mut table = VersionTable::from_entries(vec![(b"a".to_vec(), 5)]);
        let before = table.clone();
        let (requests, _tickets) = batch(&[("a", 5), ("a", 6), ("b", 0)]);

        let mut validation = validate(requests, &mut table);
        assert_eq!(table.get(b"a"), 7);

        validation.rollback(&mut table);
        assert_eq!(table, before);
    }
}
