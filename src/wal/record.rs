//! Log record layout
//!
//! Each record is self-delimiting (all integers little-endian):
//! - Record Length (u32): total bytes including this field and the checksum
//! - Format Tag (u8): `FORMAT_BATCH`
//! - LSN (u64)
//! - Operation Count (u32)
//! - Operations, each:
//!   - Op Tag (u8): `OP_PUT`
//!   - Key Length (u32) + key bytes
//!   - Value Length (u32) + value bytes
//!   - New Version (u64)
//! - Checksum (u32): CRC32 over every preceding byte of the record

use std::io::{self, Cursor, Read};

use crc32fast::Hasher;

/// Format tag of a key-value batch record
pub const FORMAT_BATCH: u8 = 0x01;

/// Operation tag for a put
pub const OP_PUT: u8 = 0x01;

/// length + format tag + lsn + op count
pub const HEADER_SIZE: usize = 4 + 1 + 8 + 4;

/// Size of the trailing checksum
pub const CHECKSUM_SIZE: usize = 4;

/// Smallest well-formed record: a header, zero operations, and a checksum
pub const MIN_RECORD_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Fixed bytes of one operation: tag, two length fields, version
pub const OP_OVERHEAD: usize = 1 + 4 + 4 + 8;

/// Largest record the u32 length field can describe
pub const MAX_RECORD_SIZE: u64 = u32::MAX as u64;

/// Serialized size of a record carrying a single operation with these
/// key and value lengths.
pub fn single_op_record_len(key_len: usize, value_len: usize) -> u64 {
    (MIN_RECORD_SIZE + OP_OVERHEAD) as u64 + key_len as u64 + value_len as u64
}

/// Whether a record of `len` bytes can be written without its length
/// field wrapping.
pub fn fits_length_field(len: u64) -> bool {
    len <= MAX_RECORD_SIZE
}

/// One accepted write inside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOperation {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Version the key holds once this record is durable
    pub version: u64,
}

impl LogOperation {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, version: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            version,
        }
    }

    fn encoded_len(&self) -> usize {
        OP_OVERHEAD + self.key.len() + self.value.len()
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(OP_PUT);
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value);
        buf.extend_from_slice(&self.version.to_le_bytes());
    }

    fn read_from(reader: &mut Cursor<&[u8]>) -> io::Result<Self> {
        fn read_bytes(reader: &mut Cursor<&[u8]>) -> io::Result<Vec<u8>> {
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf) as usize;

            let remaining = reader.get_ref().len() - reader.position() as usize;
            if len > remaining {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Field length {} exceeds record bounds", len),
                ));
            }

            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            Ok(buf)
        }

        let mut tag = [0u8; 1];
        reader.read_exact(&mut tag)?;
        if tag[0] != OP_PUT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid operation tag: {:#04x}", tag[0]),
            ));
        }

        let key = read_bytes(reader)?;
        let value = read_bytes(reader)?;

        let mut version_buf = [0u8; 8];
        reader.read_exact(&mut version_buf)?;

        Ok(Self {
            key,
            value,
            version: u64::from_le_bytes(version_buf),
        })
    }
}

/// A group-committed batch of operations sharing one LSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub lsn: u64,
    pub operations: Vec<LogOperation>,
}

impl LogRecord {
    pub fn new(lsn: u64, operations: Vec<LogOperation>) -> Self {
        Self { lsn, operations }
    }

    /// Exact serialized size of this record
    pub fn encoded_len(&self) -> usize {
        MIN_RECORD_SIZE
            + self
                .operations
                .iter()
                .map(LogOperation::encoded_len)
                .sum::<usize>()
    }

    /// Serialize the complete record, checksum included.
    ///
    /// Callers check [`fits_length_field`] first; the length fields are
    /// written as u32.
    pub fn serialize(&self) -> Vec<u8> {
        let record_length = self.encoded_len();
        debug_assert!(fits_length_field(record_length as u64));
        let mut buf = Vec::with_capacity(record_length);

        buf.extend_from_slice(&(record_length as u32).to_le_bytes());
        buf.push(FORMAT_BATCH);
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&(self.operations.len() as u32).to_le_bytes());
        for op in &self.operations {
            op.write_to(&mut buf);
        }

        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        debug_assert_eq!(buf.len(), record_length);

        buf
    }

    /// Deserialize one record from the front of `data`, verifying its checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Record too short",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - CHECKSUM_SIZE;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[..checksum_offset]);
        if computed != stored {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
            ));
        }

        if data[4] != FORMAT_BATCH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid format tag: {:#04x}", data[4]),
            ));
        }

        let mut cursor = Cursor::new(&data[5..checksum_offset]);
        let mut lsn_buf = [0u8; 8];
        cursor.read_exact(&mut lsn_buf)?;
        let lsn = u64::from_le_bytes(lsn_buf);

        let mut count_buf = [0u8; 4];
        cursor.read_exact(&mut count_buf)?;
        let op_count = u32::from_le_bytes(count_buf) as usize;

        // Each operation takes at least 17 bytes, so a bogus count cannot
        // drive a huge allocation.
        let mut operations = Vec::with_capacity(op_count.min(record_length / 17));
        for _ in 0..op_count {
            operations.push(LogOperation::read_from(&mut cursor)?);
        }

        if cursor.position() as usize != checksum_offset - 5 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes after last operation",
            ));
        }

        Ok((Self { lsn, operations }, record_length))
    }
}

/// CRC32 (IEEE) over `data`
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> LogRecord {
        LogRecord::new(
            7,
            vec![
                LogOperation::new(b"a".to_vec(), b"one".to_vec(), 1),
                LogOperation::new(b"b".to_vec(), Vec::new(), 3),
            ],
        )
    }

    #[test]
    fn test_serialized_layout_is_bit_exact() {
        let record = LogRecord::new(1, vec![LogOperation::new(b"k".to_vec(), b"v".to_vec(), 1)]);
        let bytes = record.serialize();

        let mut expected = Vec::new();
        expected.extend_from_slice(&40u32.to_le_bytes());
        expected.push(FORMAT_BATCH);
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.push(OP_PUT);
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.push(b'k');
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.push(b'v');
        expected.extend_from_slice(&1u64.to_le_bytes());
        let crc = compute_checksum(&expected);
        expected.extend_from_slice(&crc.to_le_bytes());

        assert_eq!(bytes, expected);
        assert_eq!(bytes.len(), record.encoded_len());
    }

    #[test]
    fn test_deserialize_reports_consumed_bytes() {
        let record = sample_record();
        let mut bytes = record.serialize();
        let len = bytes.len();
        bytes.extend_from_slice(&[0xAA; 10]);

        let (decoded, consumed) = LogRecord::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, len);
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let mut bytes = sample_record().serialize();
        bytes[20] ^= 0x01;

        let err = LogRecord::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_record_is_unexpected_eof() {
        let bytes = sample_record().serialize();
        let err = LogRecord::deserialize(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_unknown_op_tag_rejected() {
        let mut bytes = LogRecord::new(2, vec![LogOperation::new(b"x".to_vec(), b"y".to_vec(), 1)])
            .serialize();
        bytes[HEADER_SIZE] = 0x7F;
        let checksum_offset = bytes.len() - CHECKSUM_SIZE;
        let crc = compute_checksum(&bytes[..checksum_offset]);
        bytes[checksum_offset..].copy_from_slice(&crc.to_le_bytes());

        let err = LogRecord::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("Invalid operation tag"));
    }

    #[test]
    fn test_empty_record_is_minimum_size() {
        let bytes = LogRecord::new(9, Vec::new()).serialize();
        assert_eq!(bytes.len(), MIN_RECORD_SIZE);
    }

    #[test]
    fn test_single_op_record_len_matches_serialized_size() {
        let record = LogRecord::new(1, vec![LogOperation::new(b"abc".to_vec(), b"hello".to_vec(), 4)]);
        assert_eq!(single_op_record_len(3, 5), record.serialize().len() as u64);
    }

    #[test]
    fn test_length_field_boundary() {
        let fixed = (MIN_RECORD_SIZE + OP_OVERHEAD) as u64;
        let largest_value = (MAX_RECORD_SIZE - fixed) as usize;

        assert!(fits_length_field(single_op_record_len(0, largest_value)));
        assert!(!fits_length_field(single_op_record_len(0, largest_value + 1)));
        assert!(!fits_length_field(single_op_record_len(1, largest_value)));
        assert!(fits_length_field(MAX_RECORD_SIZE));
        assert!(!fits_length_field(MAX_RECORD_SIZE + 1));
    }
}
