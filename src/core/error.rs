use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid magic number in header")]
    InvalidMagic,

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u16),

    #[error("Invalid header size: {0}")]
    InvalidHeaderSize(u32),

    #[error("Invalid sector size: {0} (must be 512 shifted left by 0-15)")]
    InvalidSectorSize(u32),

    #[error("Invalid hash table size: {0} (must be a power of two)")]
    InvalidHashTableSize(u32),

    #[error("Archive is corrupt: {0}")]
    Corrupt(String),

    #[error("File not found in archive: {0}")]
    FileNotFound(String),

    #[error("Reserved file name cannot be used for content: {0}")]
    ReservedName(String),

    #[error("Hash table is full ({0} entries)")]
    HashTableFull(u32),

    #[error("Archive exceeds the 4 GiB limit of the format")]
    TooLarge,

    #[error("Archive was opened read-only")]
    ReadOnly,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Archive carries a strong signature; rewriting it would invalidate the signature")]
    StrongSignaturePresent,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MPQ error: {0}")]
    Mpq(#[from] wow_mpq::Error),

    #[error("Archive already exists: {0}")]
    AlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
