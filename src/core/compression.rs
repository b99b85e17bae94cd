//! Sector compression
//!
//! Each stored sector is either raw or a one-byte method mask followed by the
//! compressed payload. A sector whose stored length equals its decoded length
//! is always raw, so compression is kept only when it saves at least one byte
//! after the mask.
//!
//! **Format**: `[method: u8][compressed_data]` or `[raw_data]`

use crate::core::error::{ArchiveError, Result};
use wow_mpq::compression::flags;

/// Compression method mask byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionMethod {
    /// zlib/deflate
    Zlib = flags::ZLIB,
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            flags::ZLIB => Some(CompressionMethod::Zlib),
            _ => None,
        }
    }
}

/// Encode one sector, compressing only if that makes it smaller
pub fn compress_sector(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    wow_mpq::compress(data, CompressionMethod::Zlib as u8)
        .map_err(|e| ArchiveError::Compression(format!("zlib compression failed: {}", e)))
}

/// Decode one stored sector back to `sector_len` bytes
pub fn decompress_sector(stored: &[u8], sector_len: usize) -> Result<Vec<u8>> {
    if stored.len() == sector_len {
        return Ok(stored.to_vec());
    }

    let (&mask, payload) = stored
        .split_first()
        .ok_or_else(|| ArchiveError::Compression("empty compressed sector".to_string()))?;

    let method = CompressionMethod::from_u8(mask).ok_or_else(|| {
        ArchiveError::Compression(format!("unsupported compression mask 0x{:02X}", mask))
    })?;

    let out = wow_mpq::decompress(payload, method as u8, sector_len)
        .map_err(|e| ArchiveError::Compression(format!("zlib decompression failed: {}", e)))?;

    if out.len() != sector_len {
        return Err(ArchiveError::Compression(format!(
            "sector decoded to {} bytes, expected {}",
            out.len(),
            sector_len
        )));
    }
    Ok(out)
}
