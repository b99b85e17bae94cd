//! Native archive engine
//!
//! A single-file archive with encrypted hash and block tables, zlib-compressed
//! sectors with per-sector CRCs, and three special files maintained by the
//! archive itself.
//!
//! ## Layers
//!
//! - [`header`] - 32-byte header locating the tables
//! - [`crypto`] - name hashing and table encryption
//! - [`tables`] - hash table (name lookup) and block table (data placement)
//! - [`compression`] / [`sector`] - stored form of file data
//! - [`listfile`] / [`attributes`] / [`signature`] - special files
//! - [`io`] - positioned file access
//! - [`archive`] - the [`Archive`] API tying it all together

pub mod archive;
pub mod attributes;
pub mod compression;
pub mod crypto;
pub mod error;
pub mod header;
pub mod io;
pub mod listfile;
pub mod sector;
pub mod signature;
pub mod tables;
pub mod validation;

pub use archive::{
    AccessMode, AddFlags, Archive, ArchiveStats, ChecksumKind, ChecksumOutcome, CreateParams,
    EntryInfo, SignatureKind, SignatureStatus,
};
pub use error::{ArchiveError, Result};
