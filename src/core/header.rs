//! Archive header
//!
//! The fixed 32-byte block at offset 0 that locates the hash and block tables.

use crate::core::error::{ArchiveError, Result};

pub const MAGIC: [u8; 4] = *b"MPQ\x1A";
pub const HEADER_SIZE: u32 = 32;

/// On-disk value of the version 1 format (the 32-byte header)
pub const FORMAT_VERSION_1: u16 = 0;

pub const DEFAULT_SECTOR_SIZE: u32 = 0x1000;
pub const MAX_SECTOR_SHIFT: u16 = 15;
pub const MIN_HASH_TABLE_SIZE: u32 = 0x10;
pub const TABLE_ENTRY_SIZE: u32 = 16;

/// Archive header
///
/// Occupies the first 32 bytes of the archive and locates the hash and
/// block tables. All offsets are relative to the start of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number: "MPQ\x1A"
    pub magic: [u8; 4],

    /// Size of this header in bytes (always 32 for version 1)
    pub header_size: u32,

    /// Size of the archive, header through the end of the block table
    pub archive_size: u32,

    /// Format version (0 = version 1)
    pub format_version: u16,

    /// Sector size as a power of two: `512 << sector_shift`
    pub sector_shift: u16,

    /// Offset of the encrypted hash table
    pub hash_table_pos: u32,

    /// Offset of the encrypted block table
    pub block_table_pos: u32,

    /// Number of hash table entries (power of two)
    pub hash_table_size: u32,

    /// Number of block table entries
    pub block_table_size: u32,
}

impl Header {
    /// Create a header for an empty archive
    pub fn new(sector_shift: u16, hash_table_size: u32) -> Self {
        Header {
            magic: MAGIC,
            header_size: HEADER_SIZE,
            archive_size: HEADER_SIZE,
            format_version: FORMAT_VERSION_1,
            sector_shift,
            hash_table_pos: HEADER_SIZE,
            block_table_pos: HEADER_SIZE,
            hash_table_size,
            block_table_size: 0,
        }
    }

    /// Sector size in bytes
    pub fn sector_size(&self) -> usize {
        512usize << self.sector_shift
    }

    /// Validate the header magic, version and table placement
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ArchiveError::InvalidMagic);
        }

        if self.format_version != FORMAT_VERSION_1 {
            return Err(ArchiveError::UnsupportedVersion(self.format_version));
        }

        if self.header_size != HEADER_SIZE {
            return Err(ArchiveError::InvalidHeaderSize(self.header_size));
        }

        if self.sector_shift > MAX_SECTOR_SHIFT {
            return Err(ArchiveError::InvalidSectorSize(
                512u32.checked_shl(self.sector_shift as u32).unwrap_or(0),
            ));
        }

        if !self.hash_table_size.is_power_of_two() {
            return Err(ArchiveError::InvalidHashTableSize(self.hash_table_size));
        }

        let hash_end = self.hash_table_pos as u64
            + self.hash_table_size as u64 * TABLE_ENTRY_SIZE as u64;
        let block_end = self.block_table_pos as u64
            + self.block_table_size as u64 * TABLE_ENTRY_SIZE as u64;

        if hash_end > self.archive_size as u64 || block_end > self.archive_size as u64 {
            return Err(ArchiveError::Corrupt(format!(
                "tables extend past archive end ({} bytes)",
                self.archive_size
            )));
        }

        Ok(())
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut bytes = [0u8; HEADER_SIZE as usize];

        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.header_size.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.archive_size.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[14..16].copy_from_slice(&self.sector_shift.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.hash_table_pos.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.block_table_pos.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.hash_table_size.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.block_table_size.to_le_bytes());

        bytes
    }

    /// Deserialize and validate header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for header",
            )));
        }

        let u32_at = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        let u16_at = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);

        let header = Header {
            magic,
            header_size: u32_at(4),
            archive_size: u32_at(8),
            format_version: u16_at(12),
            sector_shift: u16_at(14),
            hash_table_pos: u32_at(16),
            block_table_pos: u32_at(20),
            hash_table_size: u32_at(24),
            block_table_size: u32_at(28),
        };

        header.validate()?;

        Ok(header)
    }
}

/// Convert a sector size in bytes to the header's shift encoding
pub fn sector_shift_for(sector_size: u32) -> Result<u16> {
    (0..=MAX_SECTOR_SHIFT)
        .find(|&shift| 512u32 << shift == sector_size)
        .ok_or(ArchiveError::InvalidSectorSize(sector_size))
}
