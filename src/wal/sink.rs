//! Append-only byte sinks the log writer targets.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::errors::{WalError, WalResult};

/// Storage underneath the log writer.
///
/// Implementations must append bytes in call order and make every
/// previously appended byte durable when `sync` returns `Ok`.
pub trait LogSink: Send + 'static {
    /// Append `bytes` at the current end of the log.
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Durability barrier over everything appended so far.
    fn sync(&mut self) -> io::Result<()>;

    /// Current length of the log in bytes.
    fn len(&self) -> u64;

    /// Cut the log back to `len` bytes, dropping a failed tail.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

/// Log file opened in append mode.
pub struct FileSink {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileSink {
    /// Opens or creates the log file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns `WAL_APPEND_FAILED` if a directory or the file cannot be created.
    pub fn open(path: &Path) -> WalResult<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    WalError::append_failed(
                        format!("Failed to create log directory: {}", dir.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                WalError::append_failed(format!("Failed to open log file: {}", path.display()), e)
            })?;

        let len = file
            .metadata()
            .map_err(|e| {
                WalError::append_failed(
                    format!("Failed to read log metadata: {}", path.display()),
                    e,
                )
            })?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        // A short write may have moved the file past our own count.
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.len = len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("wal").join("log.wal");

        let sink = FileSink::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(sink.len(), 0);
        assert_eq!(sink.path(), path.as_path());
    }

    #[test]
    fn test_append_tracks_length_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.wal");

        {
            let mut sink = FileSink::open(&path).unwrap();
            sink.append(b"hello").unwrap();
            sink.append(b" world").unwrap();
            sink.sync().unwrap();
            assert_eq!(sink.len(), 11);
        }

        let sink = FileSink::open(&path).unwrap();
        assert_eq!(sink.len(), 11);
    }

    #[test]
    fn test_truncate_then_append() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.wal");

        let mut sink = FileSink::open(&path).unwrap();
        sink.append(b"keep").unwrap();
        sink.append(b"drop-me").unwrap();
        sink.truncate(4).unwrap();
        sink.append(b"!").unwrap();
        sink.sync().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"keep!");
    }
}
