//! Sector storage for file data
//!
//! A compressed file is stored as a sector offset table followed by the
//! sectors themselves. The table has one entry per sector plus an end
//! marker; when sector CRCs are enabled a further entry marks the end of the
//! CRC block that trails the sectors. All offsets are relative to the start
//! of the stored file.
//!
//! Uncompressed files are stored as their raw bytes.

use crate::core::compression::{compress_sector, decompress_sector};
use crate::core::crypto::{bytes_from_words, words_from_bytes};
use crate::core::error::{ArchiveError, Result};
use crate::core::tables::{flags, BlockEntry};

/// How a file's data should be stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub sector_size: usize,
    pub compress: bool,
    /// Only honoured for compressed files
    pub sector_crc: bool,
}

/// A file encoded for storage, with the block flags describing it
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub bytes: Vec<u8>,
    pub flags: u32,
}

fn sector_count(file_size: usize, sector_size: usize) -> usize {
    file_size.div_ceil(sector_size)
}

/// Encode file contents into their stored form
pub fn encode(data: &[u8], options: StoreOptions) -> Result<StoredFile> {
    if !options.compress {
        return Ok(StoredFile {
            bytes: data.to_vec(),
            flags: flags::EXISTS,
        });
    }

    let sectors: Vec<Vec<u8>> = data
        .chunks(options.sector_size)
        .map(compress_sector)
        .collect::<Result<_>>()?;

    let table_entries = sectors.len() + 1 + usize::from(options.sector_crc);
    let mut offsets = Vec::with_capacity(table_entries);
    let mut position = table_entries * 4;

    for sector in &sectors {
        offsets.push(to_u32(position)?);
        position += sector.len();
    }
    offsets.push(to_u32(position)?);

    let crcs: Vec<u32> = sectors.iter().map(|s| crc32fast::hash(s)).collect();
    if options.sector_crc {
        position += crcs.len() * 4;
        offsets.push(to_u32(position)?);
    }

    let mut bytes = bytes_from_words(&offsets);
    bytes.reserve(position - bytes.len());
    for sector in &sectors {
        bytes.extend_from_slice(sector);
    }

    let mut block_flags = flags::EXISTS | flags::COMPRESS;
    if options.sector_crc {
        bytes.extend_from_slice(&bytes_from_words(&crcs));
        block_flags |= flags::SECTOR_CRC;
    }

    Ok(StoredFile {
        bytes,
        flags: block_flags,
    })
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| ArchiveError::TooLarge)
}

/// Parsed sector offset table of a stored compressed file
struct SectorLayout {
    offsets: Vec<u32>,
    sectors: usize,
}

impl SectorLayout {
    fn parse(stored: &[u8], block: &BlockEntry, sector_size: usize) -> Result<Self> {
        let sectors = sector_count(block.file_size as usize, sector_size);
        let entries = sectors + 1 + usize::from(block.has_sector_crc());
        let table_len = entries * 4;

        if stored.len() < table_len {
            return Err(ArchiveError::Corrupt(
                "sector offset table is truncated".to_string(),
            ));
        }

        let offsets = words_from_bytes(&stored[..table_len]);
        let ordered = offsets.windows(2).all(|pair| pair[0] <= pair[1]);
        let in_bounds = offsets
            .last()
            .is_some_and(|&end| end as usize <= stored.len());

        if offsets[0] as usize != table_len || !ordered || !in_bounds {
            return Err(ArchiveError::Corrupt(
                "sector offset table is inconsistent".to_string(),
            ));
        }

        Ok(SectorLayout { offsets, sectors })
    }

    fn sector<'a>(&self, stored: &'a [u8], index: usize) -> &'a [u8] {
        &stored[self.offsets[index] as usize..self.offsets[index + 1] as usize]
    }
}

/// Decode a stored file back into its contents
pub fn decode(stored: &[u8], block: &BlockEntry, sector_size: usize) -> Result<Vec<u8>> {
    let file_size = block.file_size as usize;

    if !block.is_compressed() {
        if stored.len() != file_size {
            return Err(ArchiveError::Corrupt(format!(
                "stored size {} does not match file size {}",
                stored.len(),
                file_size
            )));
        }
        return Ok(stored.to_vec());
    }

    let layout = SectorLayout::parse(stored, block, sector_size)?;
    let mut data = Vec::new();

    for index in 0..layout.sectors {
        let sector_len = sector_size.min(file_size - index * sector_size);
        data.extend(decompress_sector(layout.sector(stored, index), sector_len)?);
    }

    Ok(data)
}

/// Check every stored sector against its recorded CRC
///
/// Returns `Ok(false)` on the first mismatch. The block must carry
/// `SECTOR_CRC`.
pub fn sector_crcs_match(stored: &[u8], block: &BlockEntry, sector_size: usize) -> Result<bool> {
    if !block.has_sector_crc() {
        return Err(ArchiveError::Corrupt(
            "file has no sector checksums".to_string(),
        ));
    }

    let layout = SectorLayout::parse(stored, block, sector_size)?;
    let crc_block = layout.sector(stored, layout.sectors);
    if crc_block.len() != layout.sectors * 4 {
        return Err(ArchiveError::Corrupt(
            "sector checksum block has the wrong size".to_string(),
        ));
    }

    let recorded = words_from_bytes(crc_block);
    Ok((0..layout.sectors)
        .all(|index| crc32fast::hash(layout.sector(stored, index)) == recorded[index]))
}
