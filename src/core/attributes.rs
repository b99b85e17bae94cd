//! `(attributes)`: per-file integrity record
//!
//! Holds a CRC32, a FILETIME and an MD5 for every block table entry, in block
//! order. The special files themselves get zeroed records.

use crate::core::error::{ArchiveError, Result};
use chrono::{DateTime, Utc};

pub const ATTRIBUTES_VERSION: u32 = 100;

/// Which columns an attributes file carries
pub mod attr_flags {
    pub const CRC32: u32 = 0x01;
    pub const FILETIME: u32 = 0x02;
    pub const MD5: u32 = 0x04;
    pub const ALL: u32 = CRC32 | FILETIME | MD5;
}

/// Seconds between 1601-01-01 and 1970-01-01
const FILETIME_UNIX_EPOCH_SECS: i64 = 11_644_473_600;

/// Convert a timestamp to Windows FILETIME (100 ns ticks since 1601)
pub fn filetime_from(time: DateTime<Utc>) -> u64 {
    let secs = time.timestamp() + FILETIME_UNIX_EPOCH_SECS;
    (secs.max(0) as u64) * 10_000_000 + u64::from(time.timestamp_subsec_nanos() / 100)
}

/// Integrity record of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttributes {
    pub crc32: u32,
    pub filetime: u64,
    pub md5: [u8; 16],
}

impl FileAttributes {
    /// Compute the record for file contents added at `time`
    pub fn compute(data: &[u8], time: DateTime<Utc>) -> Self {
        FileAttributes {
            crc32: crc32fast::hash(data),
            filetime: filetime_from(time),
            md5: md5::compute(data).0,
        }
    }
}

/// Decoded `(attributes)` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub flags: u32,
    pub entries: Vec<FileAttributes>,
}

impl Attributes {
    pub fn new(entries: Vec<FileAttributes>) -> Self {
        Attributes {
            flags: attr_flags::ALL,
            entries,
        }
    }

    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.entries.len() * 28);
        out.extend_from_slice(&ATTRIBUTES_VERSION.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());

        if self.has(attr_flags::CRC32) {
            for entry in &self.entries {
                out.extend_from_slice(&entry.crc32.to_le_bytes());
            }
        }
        if self.has(attr_flags::FILETIME) {
            for entry in &self.entries {
                out.extend_from_slice(&entry.filetime.to_le_bytes());
            }
        }
        if self.has(attr_flags::MD5) {
            for entry in &self.entries {
                out.extend_from_slice(&entry.md5);
            }
        }

        out
    }

    /// Decode an attributes file written for `block_count` blocks
    pub fn from_bytes(bytes: &[u8], block_count: usize) -> Result<Self> {
        let mut reader = Reader { bytes, pos: 0 };

        let version = reader.u32()?;
        if version != ATTRIBUTES_VERSION {
            return Err(ArchiveError::Corrupt(format!(
                "unsupported attributes version {}",
                version
            )));
        }
        let flags = reader.u32()?;

        let mut entries = vec![FileAttributes::default(); block_count];
        if flags & attr_flags::CRC32 != 0 {
            for entry in entries.iter_mut() {
                entry.crc32 = reader.u32()?;
            }
        }
        if flags & attr_flags::FILETIME != 0 {
            for entry in entries.iter_mut() {
                entry.filetime = reader.u64()?;
            }
        }
        if flags & attr_flags::MD5 != 0 {
            for entry in entries.iter_mut() {
                entry.md5.copy_from_slice(reader.take(16)?);
            }
        }

        Ok(Attributes { flags, entries })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + len)
            .ok_or_else(|| ArchiveError::Corrupt("attributes file is truncated".to_string()))?;
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_filetime_conversion() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(filetime_from(epoch), 116_444_736_000_000_000);

        let later = Utc.timestamp_opt(1, 500).unwrap();
        assert_eq!(filetime_from(later), 116_444_736_010_000_005);
    }

    #[test]
    fn test_compute_record() {
        let record = FileAttributes::compute(b"hello", Utc::now());
        assert_eq!(record.crc32, 0x3610_A686);
        assert_eq!(
            record.md5,
            [
                0x5d, 0x41, 0x40, 0x2a, 0xbc, 0x4b, 0x2a, 0x76, 0xb9, 0x71, 0x9d, 0x91, 0x10,
                0x17, 0xc5, 0x92
            ]
        );
    }

    #[test]
    fn test_encode_decode() {
        let attributes = Attributes::new(vec![
            FileAttributes::compute(b"report", Utc::now()),
            FileAttributes::default(),
        ]);

        let bytes = attributes.to_bytes();
        assert_eq!(bytes.len(), 8 + 2 * 28);
        assert_eq!(Attributes::from_bytes(&bytes, 2).unwrap(), attributes);
    }

    #[test]
    fn test_partial_columns() {
        let attributes = Attributes {
            flags: attr_flags::CRC32,
            entries: vec![FileAttributes {
                crc32: 7,
                ..Default::default()
            }],
        };

        let decoded = Attributes::from_bytes(&attributes.to_bytes(), 1).unwrap();
        assert!(!decoded.has(attr_flags::MD5));
        assert_eq!(decoded.entries[0].crc32, 7);
    }

    #[test]
    fn test_truncated_attributes() {
        let bytes = Attributes::new(vec![FileAttributes::default(); 3]).to_bytes();
        assert!(matches!(
            Attributes::from_bytes(&bytes[..bytes.len() - 1], 3),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[test]
    fn test_wrong_version() {
        let mut bytes = Attributes::new(Vec::new()).to_bytes();
        bytes[0] = 99;
        assert!(Attributes::from_bytes(&bytes, 0).is_err());
    }
}
