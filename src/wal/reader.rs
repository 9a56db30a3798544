//! Sequential log reader with strict corruption detection
//!
//! Records are read strictly in file order. Any structural problem, a
//! checksum mismatch, or a break in the LSN sequence is reported as
//! `WAL_CORRUPTION` at the offending byte offset; nothing is skipped or
//! repaired.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use super::errors::{WalError, WalResult};
use super::record::{LogRecord, MIN_RECORD_SIZE};

/// Reads [`LogRecord`]s from a log file in order.
pub struct LogReader {
    path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    last_lsn: u64,
}

impl LogReader {
    /// Opens a log file for reading.
    pub fn open(path: &Path) -> WalResult<Self> {
        let file = File::open(path).map_err(|e| {
            WalError::corruption(format!("Failed to open log file: {}: {}", path.display(), e))
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| WalError::corruption(format!("Failed to read log metadata: {}", e)))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            last_lsn: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next record
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// LSN of the last record read, or 0 before the first one
    pub fn last_lsn(&self) -> u64 {
        self.last_lsn
    }

    /// Reads the next record.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` if a record was read and validated
    /// - `Ok(None)` at a clean end of file
    /// - `Err(WalError)` on any corruption or read error
    pub fn read_next(&mut self) -> WalResult<Option<LogRecord>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < MIN_RECORD_SIZE as u64 {
            return Err(WalError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Truncated log: {} bytes remaining, minimum record size is {}",
                    remaining, MIN_RECORD_SIZE
                ),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            WalError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record length: {}", e),
            )
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < MIN_RECORD_SIZE as u64 {
            return Err(WalError::corruption_at_offset(
                self.current_offset,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if record_length > remaining {
            return Err(WalError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Record length {} exceeds remaining file size {}",
                    record_length, remaining
                ),
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            WalError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record body: {}", e),
            )
        })?;

        let (record, consumed) = LogRecord::deserialize(&record_buf)
            .map_err(|e| WalError::corruption_at_offset(self.current_offset, e.to_string()))?;

        if self.last_lsn > 0 && record.lsn != self.last_lsn + 1 {
            return Err(WalError::corruption_at_lsn(
                record.lsn,
                format!(
                    "Non-sequential LSN: expected {}, got {}",
                    self.last_lsn + 1,
                    record.lsn
                ),
            ));
        }

        self.current_offset += consumed as u64;
        self.last_lsn = record.lsn;

        Ok(Some(record))
    }

    /// Reads every remaining record.
    pub fn read_all(&mut self) -> WalResult<Vec<LogRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_next()? {
            records.push(record);
        }
        Ok(records)
    }
}

impl Iterator for LogReader {
    type Item = WalResult<LogRecord>;

    /// Stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        let next = self.read_next();
        if next.is_err() {
            self.current_offset = self.file_size;
        }
        next.transpose()
    }
}

/// Scans a log and returns the LSN of its last record (0 for an empty or
/// missing file).
pub fn last_lsn_in(path: &Path) -> WalResult<u64> {
    match std::fs::metadata(path) {
        Ok(m) if m.len() == 0 => return Ok(0),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(WalError::corruption(format!(
                "Failed to read log metadata: {}: {}",
                path.display(),
                e
            )))
        }
    }

    let mut reader = LogReader::open(path)?;
    while reader.read_next()?.is_some() {}
    Ok(reader.last_lsn())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::record::LogOperation;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_records(path: &Path, records: &[LogRecord]) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for record in records {
            file.write_all(&record.serialize()).unwrap();
        }
        file.sync_all().unwrap();
    }

    fn record(lsn: u64, key: &str, version: u64) -> LogRecord {
        LogRecord::new(
            lsn,
            vec![LogOperation::new(key.as_bytes().to_vec(), b"v".to_vec(), version)],
        )
    }

    #[test]
    fn test_reads_records_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.wal");
        write_records(&path, &[record(1, "a", 1), record(2, "a", 2), record(3, "b", 1)]);

        let mut reader = LogReader::open(&path).unwrap();
        let lsns: Vec<u64> = reader.read_all().unwrap().iter().map(|r| r.lsn).collect();

        assert_eq!(lsns, vec![1, 2, 3]);
        assert_eq!(reader.last_lsn(), 3);
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_lsn_gap_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.wal");
        write_records(&path, &[record(1, "a", 1), record(3, "a", 2)]);

        let mut reader = LogReader::open(&path).unwrap();
        assert!(reader.read_next().unwrap().is_some());
        let err = reader.read_next().unwrap_err();
        assert!(err.message().contains("Non-sequential LSN"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_torn_tail_is_corruption_at_offset() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.wal");
        write_records(&path, &[record(1, "a", 1), record(2, "b", 1)]);

        let first_len = record(1, "a", 1).serialize().len() as u64;
        let full = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(full - 5)
            .unwrap();

        let mut reader = LogReader::open(&path).unwrap();
        assert!(reader.read_next().unwrap().is_some());
        let err = reader.read_next().unwrap_err();
        assert_eq!(err.details(), Some(format!("byte_offset: {}", first_len).as_str()));
    }

    #[test]
    fn test_last_lsn_of_missing_file_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(last_lsn_in(&temp_dir.path().join("absent.wal")).unwrap(), 0);
    }

    #[test]
    fn test_iterator_yields_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.wal");
        write_records(&path, &[record(1, "a", 1), record(2, "b", 1)]);

        let reader = LogReader::open(&path).unwrap();
        let records: Vec<LogRecord> = reader.collect::<WalResult<_>>().unwrap();
        assert_eq!(records.len(), 2);
    }
}
