//! Hash and block tables
//!
//! The hash table maps entry names to block indices through open addressing;
//! the block table records where each entry's stored bytes live and how they
//! are encoded. Both are stored encrypted; decoding goes through the
//! `wow_mpq` table readers.

use crate::core::crypto::{bytes_from_words, encrypt_block, hash_string, HashType};
use crate::core::error::{ArchiveError, Result};
use crate::core::header::TABLE_ENTRY_SIZE;

pub const HASH_TABLE_KEY_NAME: &str = "(hash table)";
pub const BLOCK_TABLE_KEY_NAME: &str = "(block table)";

pub const BLOCK_INDEX_EMPTY: u32 = 0xFFFF_FFFF;
pub const BLOCK_INDEX_DELETED: u32 = 0xFFFF_FFFE;

/// Block flags
pub mod flags {
    /// Stored as compressed sectors
    pub const COMPRESS: u32 = 0x0000_0200;
    /// Stored as one unit rather than sectors
    pub const SINGLE_UNIT: u32 = 0x0100_0000;
    /// A CRC follows the stored sectors
    pub const SECTOR_CRC: u32 = 0x0400_0000;
    /// Entry holds a live file
    pub const EXISTS: u32 = 0x8000_0000;
}

/// Hash table entry (16 bytes on disk)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEntry {
    pub name_a: u32,
    pub name_b: u32,
    pub locale: u16,
    pub platform: u16,
    pub block_index: u32,
}

impl HashEntry {
    pub const EMPTY: HashEntry = HashEntry {
        name_a: 0xFFFF_FFFF,
        name_b: 0xFFFF_FFFF,
        locale: 0xFFFF,
        platform: 0xFFFF,
        block_index: BLOCK_INDEX_EMPTY,
    };

    pub fn is_empty(&self) -> bool {
        self.block_index == BLOCK_INDEX_EMPTY
    }

    pub fn is_deleted(&self) -> bool {
        self.block_index == BLOCK_INDEX_DELETED
    }

    fn to_words(self) -> [u32; 4] {
        [
            self.name_a,
            self.name_b,
            self.locale as u32 | ((self.platform as u32) << 16),
            self.block_index,
        ]
    }
}

/// Block table entry (16 bytes on disk)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockEntry {
    /// Offset of the stored bytes from the start of the archive
    pub file_pos: u32,
    /// Number of stored bytes
    pub compressed_size: u32,
    /// Size of the file once decoded
    pub file_size: u32,
    pub flags: u32,
}

impl BlockEntry {
    pub fn exists(&self) -> bool {
        self.flags & flags::EXISTS != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & flags::COMPRESS != 0
    }

    pub fn has_sector_crc(&self) -> bool {
        self.flags & flags::SECTOR_CRC != 0
    }

    /// End offset of the stored bytes
    pub fn end(&self) -> u64 {
        self.file_pos as u64 + self.compressed_size as u64
    }

    fn to_words(self) -> [u32; 4] {
        [self.file_pos, self.compressed_size, self.file_size, self.flags]
    }
}

/// Open-addressed name → block index map
#[derive(Debug, Clone)]
pub struct HashTable {
    entries: Vec<HashEntry>,
}

impl HashTable {
    /// Create an empty table; `size` must be a power of two
    pub fn new(size: u32) -> Result<Self> {
        if !size.is_power_of_two() {
            return Err(ArchiveError::InvalidHashTableSize(size));
        }
        Ok(HashTable {
            entries: vec![HashEntry::EMPTY; size as usize],
        })
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(HashEntry::is_empty)
    }

    pub fn entries(&self) -> &[HashEntry] {
        &self.entries
    }

    /// Probe order for a name: starting slot, then each following slot once
    fn probe(&self, name: &str) -> impl Iterator<Item = usize> {
        let mask = self.entries.len() - 1;
        let start = hash_string(name, HashType::TableOffset) as usize & mask;
        (0..self.entries.len()).map(move |step| (start + step) & mask)
    }

    /// Find the slot and block index of a name
    pub fn find(&self, name: &str) -> Option<(usize, u32)> {
        let name_a = hash_string(name, HashType::NameA);
        let name_b = hash_string(name, HashType::NameB);

        for slot in self.probe(name) {
            let entry = &self.entries[slot];
            if entry.is_empty() {
                return None;
            }
            if !entry.is_deleted() && entry.name_a == name_a && entry.name_b == name_b {
                return Some((slot, entry.block_index));
            }
        }

        None
    }

    /// Map a name to a block index, replacing any existing mapping
    pub fn insert(&mut self, name: &str, block_index: u32) -> Result<usize> {
        if let Some((slot, _)) = self.find(name) {
            self.entries[slot].block_index = block_index;
            return Ok(slot);
        }

        let slot = self
            .probe(name)
            .find(|&slot| self.entries[slot].is_empty() || self.entries[slot].is_deleted())
            .ok_or(ArchiveError::HashTableFull(self.len()))?;

        self.entries[slot] = HashEntry {
            name_a: hash_string(name, HashType::NameA),
            name_b: hash_string(name, HashType::NameB),
            locale: 0,
            platform: 0,
            block_index,
        };

        Ok(slot)
    }

    /// Point every slot at a new block index through `remap`
    pub fn remap_blocks(&mut self, remap: impl Fn(u32) -> Option<u32>) {
        for entry in &mut self.entries {
            if entry.is_empty() || entry.is_deleted() {
                continue;
            }
            entry.block_index = remap(entry.block_index).unwrap_or(BLOCK_INDEX_DELETED);
        }
    }

    /// Encrypted on-disk form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut words: Vec<u32> = self.entries.iter().flat_map(|e| e.to_words()).collect();
        encrypt_block(&mut words, hash_string(HASH_TABLE_KEY_NAME, HashType::FileKey));
        bytes_from_words(&words)
    }

    /// Decrypt and parse the on-disk form
    pub fn from_bytes(bytes: &[u8], size: u32) -> Result<Self> {
        if !size.is_power_of_two() {
            return Err(ArchiveError::InvalidHashTableSize(size));
        }
        check_table_len(bytes, size, "hash")?;

        let table = wow_mpq::HashTable::from_bytes(bytes, size)?;
        Ok(HashTable {
            entries: table
                .entries()
                .iter()
                .map(|entry| HashEntry {
                    name_a: entry.name_1,
                    name_b: entry.name_2,
                    locale: entry.locale,
                    platform: entry.platform,
                    block_index: entry.block_index,
                })
                .collect(),
        })
    }
}

/// Encrypted on-disk form of the block table
pub fn encode_block_table(blocks: &[BlockEntry]) -> Vec<u8> {
    let mut words: Vec<u32> = blocks.iter().flat_map(|b| b.to_words()).collect();
    encrypt_block(&mut words, hash_string(BLOCK_TABLE_KEY_NAME, HashType::FileKey));
    bytes_from_words(&words)
}

pub fn decode_block_table(bytes: &[u8], count: u32) -> Result<Vec<BlockEntry>> {
    check_table_len(bytes, count, "block")?;

    let table = wow_mpq::BlockTable::from_bytes(bytes, count)?;
    Ok(table
        .entries()
        .iter()
        .map(|entry| BlockEntry {
            file_pos: entry.file_pos,
            compressed_size: entry.compressed_size,
            file_size: entry.file_size,
            flags: entry.flags,
        })
        .collect())
}

fn check_table_len(bytes: &[u8], count: u32, table: &str) -> Result<()> {
    let expected = count as usize * TABLE_ENTRY_SIZE as usize;
    if bytes.len() != expected {
        return Err(ArchiveError::Corrupt(format!(
            "{} table is {} bytes, expected {}",
            table,
            bytes.len(),
            expected
        )));
    }
    Ok(())
}
