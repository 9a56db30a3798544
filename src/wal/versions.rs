//! Key → current version map used for optimistic concurrency control.
//!
//! Owned by the writer loop; nothing else reads or mutates it while the
//! engine runs, so it carries no locking.

use std::collections::HashMap;

/// Current version of every key written so far. Absent keys are at 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionTable {
    entries: HashMap<Vec<u8>, u64>,
}

impl VersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table, e.g. from a recovery pass over an existing log.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<Vec<u8>>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .filter(|(_, v)| *v > 0)
                .collect(),
        }
    }

    /// Current version of `key`, 0 if never written.
    pub fn get(&self, key: &[u8]) -> u64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    /// Compare-and-advance: if `key` is at `expected`, move it to
    /// `expected + 1` and return the new version. Otherwise return the
    /// current version as the error; a key already at `u64::MAX` cannot
    /// advance and is refused the same way.
    pub fn advance(&mut self, key: &[u8], expected: u64) -> Result<u64, u64> {
        let current = self.get(key);
        if current != expected {
            return Err(current);
        }
        let next = current.checked_add(1).ok_or(current)?;
        self.entries.insert(key.to_vec(), next);
        Ok(next)
    }

    /// Put `key` back to `version`. Used only to undo advances of a batch
    /// whose record never became durable.
    pub(crate) fn restore(&mut self, key: &[u8], version: u64) {
        if version == 0 {
            self.entries.remove(key);
        } else {
            self.entries.insert(key.to_vec(), version);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_version_is_refused() {
        let mut table = VersionTable::new();
        table.restore(b"k", u64::MAX);

        assert_eq!(table.advance(b"k", u64::MAX), Err(u64::MAX));
        assert_eq!(table.get(b"k"), u64::MAX);
    }

    #[test]
    fn test_absent_key_is_version_zero() {
        let table = VersionTable::new();
        assert_eq!(table.get(b"missing"), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_advance_chains_versions() {
        let mut table = VersionTable::new();
        assert_eq!(table.advance(b"a", 0), Ok(1));
        assert_eq!(table.advance(b"a", 1), Ok(2));
        assert_eq!(table.advance(b"a", 2), Ok(3));
        assert_eq!(table.get(b"a"), 3);
    }

    #[test]
    fn test_stale_expected_version_is_rejected() {
        let mut table = VersionTable::new();
        table.advance(b"a", 0).unwrap();

        assert_eq!(table.advance(b"a", 0), Err(1));
        assert_eq!(table.advance(b"a", 5), Err(1));
        assert_eq!(table.get(b"a"), 1);
    }

    #[test]
    fn test_restore_to_zero_removes_entry() {
        let mut table = VersionTable::new();
        table.advance(b"a", 0).unwrap();
        table.restore(b"a", 0);

        assert_eq!(table.get(b"a"), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_from_entries_drops_zero_versions() {
        let table = VersionTable::from_entries(vec![(b"a".to_vec(), 4), (b"b".to_vec(), 0)]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(b"a"), 4);
    }
}
