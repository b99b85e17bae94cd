//! Main Archive API
//!
//! Ties the header, tables, sector storage and special files together into a
//! single-file archive that can be created, extended, verified, signed and
//! compacted in place.
//!
//! **Write model**:
//! - File data is appended at the end of the data region as soon as it is
//!   added; a replaced file's old bytes become slack
//! - `(listfile)` and `(attributes)` are rewritten on flush when the set of
//!   files changed, and the hash and block tables are written after the data
//! - A weakly signed archive is re-signed whenever it is rewritten
//! - `compact` packs live data and drops slack

use crate::core::attributes::{attr_flags, Attributes, FileAttributes};
use crate::core::error::{ArchiveError, Result};
use crate::core::header::{sector_shift_for, Header, HEADER_SIZE, TABLE_ENTRY_SIZE};
use crate::core::io::ArchiveFile;
use crate::core::listfile::{self, ATTRIBUTES_NAME, LISTFILE_NAME, SIGNATURE_NAME};
use crate::core::sector::{self, StoreOptions};
use crate::core::signature::{
    self, StrongVerdict, WEAK_SIGNATURE_FILE_SIZE, WEAK_SIGNATURE_OFFSET, WEAK_SIGNATURE_SIZE,
};
use crate::core::tables::{decode_block_table, encode_block_table, BlockEntry, HashTable};
use crate::core::validation::validate_entry_name;
use chrono::Utc;
use rsa::RsaPublicKey;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, warn};

/// Creation parameters of a new archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateParams {
    /// Sector size in bytes (512 shifted left by 0-15)
    pub sector_size: u32,
    /// Minimum number of hash table entries (rounded up to a power of two)
    pub hash_table_size: u32,
    /// Maintain a `(listfile)`
    pub listfile: bool,
    /// Maintain an `(attributes)` file with CRC32, FILETIME and MD5
    pub attributes: bool,
    /// Reserve a `(signature)` slot for a weak signature
    pub signature_slot: bool,
}

impl Default for CreateParams {
    fn default() -> Self {
        CreateParams {
            sector_size: crate::core::header::DEFAULT_SECTOR_SIZE,
            hash_table_size: crate::core::header::MIN_HASH_TABLE_SIZE,
            listfile: true,
            attributes: true,
            signature_slot: true,
        }
    }
}

/// How an existing archive is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Storage options for an added file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddFlags {
    pub compress: bool,
    /// Record a CRC per stored sector (compressed files only)
    pub sector_crc: bool,
}

impl Default for AddFlags {
    fn default() -> Self {
        AddFlags {
            compress: true,
            sector_crc: true,
        }
    }
}

/// Checksum kinds tracked for every added file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    SectorCrc,
    FileCrc32,
    FileMd5,
}

impl ChecksumKind {
    pub const ALL: [ChecksumKind; 3] = [
        ChecksumKind::SectorCrc,
        ChecksumKind::FileCrc32,
        ChecksumKind::FileMd5,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ChecksumKind::SectorCrc => "sector CRC",
            ChecksumKind::FileCrc32 => "CRC32",
            ChecksumKind::FileMd5 => "MD5",
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of verifying one checksum of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumOutcome {
    /// The entry could not be located
    OpenError,
    /// The entry's data could not be read or decoded
    ReadError,
    /// The checksum is recorded and matches
    Present,
    /// The checksum is recorded and does not match
    Mismatch,
    /// The integrity record holds no checksum of this kind
    NotRecorded,
}

/// Signature schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    Weak,
    Strong,
}

impl SignatureKind {
    pub fn label(&self) -> &'static str {
        match self {
            SignatureKind::Weak => "weak digital signature",
            SignatureKind::Strong => "strong digital signature",
        }
    }
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Signature state of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    /// No signature, or only an empty signature slot
    NoSignature,
    /// The signature metadata is inconsistent and could not be checked
    VerifyFailed,
    WeakValid,
    WeakInvalid,
    StrongValid,
    StrongInvalid,
    /// A signature was found that cannot be evaluated
    Unknown,
}

impl SignatureStatus {
    /// Whether the archive carries a signature that verifies
    pub fn is_valid(&self) -> bool {
        matches!(self, SignatureStatus::WeakValid | SignatureStatus::StrongValid)
    }
}

/// Information about one stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    /// Size of the file contents
    pub size: u64,
    /// Bytes the file occupies in the archive
    pub stored_size: u64,
    pub compressed: bool,
    pub sector_crc: bool,
}

/// Archive statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Header through the end of the block table
    pub archive_size: u64,
    /// Live blocks, special files included
    pub block_count: usize,
    /// Bytes held by live blocks
    pub live_bytes: u64,
    /// Bytes in the data region not held by any live block
    pub slack_bytes: u64,
}

/// Storage options for the special files
const INDEX_STORE: AddFlags = AddFlags {
    compress: true,
    sector_crc: false,
};
const SIGNATURE_STORE: AddFlags = AddFlags {
    compress: false,
    sector_crc: false,
};

/// Single-file archive
pub struct Archive {
    file: ArchiveFile,
    header: Header,
    hash_table: HashTable,
    blocks: Vec<BlockEntry>,

    /// Names of user files, in listfile order
    names: Vec<String>,

    /// Integrity record, present when the archive keeps `(attributes)`
    attributes: Option<Attributes>,

    keep_listfile: bool,

    /// End of the data region; new data and the tables go here
    data_end: u64,

    /// In-memory state differs from disk
    dirty: bool,

    /// `(listfile)`/`(attributes)` must be rewritten on flush
    index_dirty: bool,

    /// Re-apply the weak signature on flush
    weak_signed: bool,

    /// Content changed since the last flush; an unsigned slot is zeroed
    clear_signature: bool,

    /// A strong signature follows the archive on disk
    strong_signed: bool,

    /// Public keys for strong signature verification
    strong_keys: Vec<RsaPublicKey>,
}

impl Archive {
    /// Create a new archive at `path`
    ///
    /// Fails with [`ArchiveError::AlreadyExists`] if anything is already
    /// stored at `path`; an existing archive is never replaced.
    pub fn create<P: AsRef<Path>>(path: P, params: &CreateParams) -> Result<Self> {
        let sector_shift = sector_shift_for(params.sector_size)?;
        let hash_table_size = params
            .hash_table_size
            .max(crate::core::header::MIN_HASH_TABLE_SIZE)
            .checked_next_power_of_two()
            .ok_or(ArchiveError::InvalidHashTableSize(params.hash_table_size))?;

        let file = ArchiveFile::create(&path)?;

        let mut archive = Archive {
            file,
            header: Header::new(sector_shift, hash_table_size),
            hash_table: HashTable::new(hash_table_size)?,
            blocks: Vec::new(),
            names: Vec::new(),
            attributes: params.attributes.then(|| Attributes::new(Vec::new())),
            keep_listfile: params.listfile,
            data_end: HEADER_SIZE as u64,
            dirty: true,
            index_dirty: params.listfile || params.attributes,
            weak_signed: false,
            clear_signature: false,
            strong_signed: false,
            strong_keys: Vec::new(),
        };

        if params.signature_slot {
            archive.ensure_signature_slot()?;
        }

        archive.flush()?;

        info!(
            "Created archive {} (sector size {}, {} hash entries)",
            path.as_ref().display(),
            params.sector_size,
            hash_table_size
        );

        Ok(archive)
    }

    /// Open an existing archive
    pub fn open<P: AsRef<Path>>(path: P, mode: AccessMode) -> Result<Self> {
        let mut file = ArchiveFile::open(&path, mode == AccessMode::ReadWrite)?;
        let file_len = file.len()?;

        if file_len < HEADER_SIZE as u64 {
            return Err(ArchiveError::Corrupt(format!(
                "file is {} bytes, too short for an archive header",
                file_len
            )));
        }

        let header = Header::from_bytes(&file.read_at(0, HEADER_SIZE as usize)?)?;
        if header.archive_size as u64 > file_len {
            return Err(ArchiveError::Corrupt(format!(
                "archive size {} exceeds file size {}",
                header.archive_size, file_len
            )));
        }

        let hash_bytes = file.read_at(
            header.hash_table_pos as u64,
            (header.hash_table_size * TABLE_ENTRY_SIZE) as usize,
        )?;
        let hash_table = HashTable::from_bytes(&hash_bytes, header.hash_table_size)?;

        let block_bytes = file.read_at(
            header.block_table_pos as u64,
            header.block_table_size as usize * TABLE_ENTRY_SIZE as usize,
        )?;
        let blocks = decode_block_table(&block_bytes, header.block_table_size)?;

        if let Some(block) = blocks
            .iter()
            .find(|b| b.exists() && b.end() > header.archive_size as u64)
        {
            return Err(ArchiveError::Corrupt(format!(
                "block at {} extends past the archive end",
                block.file_pos
            )));
        }

        let data_end = blocks
            .iter()
            .filter(|b| b.exists())
            .map(BlockEntry::end)
            .fold(HEADER_SIZE as u64, u64::max);

        let mut archive = Archive {
            file,
            header,
            hash_table,
            blocks,
            names: Vec::new(),
            attributes: None,
            keep_listfile: false,
            data_end,
            dirty: false,
            index_dirty: false,
            weak_signed: false,
            clear_signature: false,
            strong_signed: false,
            strong_keys: Vec::new(),
        };

        archive.strong_signed = archive.has_strong_tail()?;
        archive.load_listfile();
        archive.load_attributes();

        debug!(
            "Opened archive {} ({} blocks, {} named files)",
            path.as_ref().display(),
            archive.blocks.len(),
            archive.names.len()
        );

        Ok(archive)
    }

    fn load_listfile(&mut self) {
        if self.lookup(LISTFILE_NAME).is_none() {
            return;
        }
        self.keep_listfile = true;

        match self.read_entry(LISTFILE_NAME) {
            Ok(bytes) => {
                let mut names: Vec<String> = Vec::new();
                for name in listfile::decode(&bytes) {
                    let known = self.lookup(&name).is_some();
                    if known && !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                        names.push(name);
                    }
                }
                self.names = names;
            }
            Err(e) => warn!("Ignoring unreadable (listfile): {}", e),
        }
    }

    fn load_attributes(&mut self) {
        if self.lookup(ATTRIBUTES_NAME).is_none() {
            return;
        }

        let decoded = self
            .read_entry(ATTRIBUTES_NAME)
            .and_then(|bytes| Attributes::from_bytes(&bytes, self.blocks.len()));

        self.attributes = Some(match decoded {
            Ok(attributes) => attributes,
            Err(e) => {
                warn!("Ignoring unreadable (attributes): {}", e);
                Attributes {
                    flags: 0,
                    entries: vec![FileAttributes::default(); self.blocks.len()],
                }
            }
        });
    }

    /// Use these public keys when checking a strong signature
    pub fn set_strong_keys(&mut self, keys: Vec<RsaPublicKey>) {
        self.strong_keys = keys;
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Block index of a live entry
    fn lookup(&self, name: &str) -> Option<usize> {
        let (_, index) = self.hash_table.find(name)?;
        let index = index as usize;
        self.blocks
            .get(index)
            .filter(|block| block.exists())
            .map(|_| index)
    }

    fn store_options(&self, flags: AddFlags) -> StoreOptions {
        StoreOptions {
            sector_size: self.header.sector_size(),
            compress: flags.compress,
            sector_crc: flags.sector_crc,
        }
    }

    /// Block index for `name`, adding an empty block if it has none
    fn reserve(&mut self, name: &str) -> Result<usize> {
        if let Some((_, index)) = self.hash_table.find(name) {
            if (index as usize) < self.blocks.len() {
                return Ok(index as usize);
            }
        }

        let index = self.blocks.len();
        self.hash_table.insert(name, index as u32)?;
        self.blocks.push(BlockEntry::default());
        Ok(index)
    }

    /// Encode `data`, append it to the data region and point `name` at it
    fn store(&mut self, name: &str, data: &[u8], flags: AddFlags) -> Result<usize> {
        if !self.file.is_writable() {
            return Err(ArchiveError::ReadOnly);
        }

        let file_size = u32::try_from(data.len()).map_err(|_| ArchiveError::TooLarge)?;
        let stored = sector::encode(data, self.store_options(flags))?;
        let stored_size = u32::try_from(stored.bytes.len()).map_err(|_| ArchiveError::TooLarge)?;
        let file_pos = u32::try_from(self.data_end).map_err(|_| ArchiveError::TooLarge)?;

        let index = self.reserve(name)?;

        self.file.write_at(self.data_end, &stored.bytes)?;
        self.data_end += stored.bytes.len() as u64;

        self.blocks[index] = BlockEntry {
            file_pos,
            compressed_size: stored_size,
            file_size,
            flags: stored.flags,
        };
        self.dirty = true;

        Ok(index)
    }

    /// Read a file from disk and add it under `name`
    pub fn add_file(&mut self, source: &Path, name: &str, flags: AddFlags) -> Result<()> {
        let data = std::fs::read(source)?;
        self.add_bytes(name, &data, flags)
    }

    /// Add `data` under `name`, replacing any file of the same name
    pub fn add_bytes(&mut self, name: &str, data: &[u8], flags: AddFlags) -> Result<()> {
        validate_entry_name(name)?;

        let index = self.store(name, data, flags)?;

        if let Some(attributes) = self.attributes.as_mut() {
            attributes
                .entries
                .resize(self.blocks.len(), FileAttributes::default());
            attributes.entries[index] = FileAttributes::compute(data, Utc::now());
        }

        if !self.names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            self.names.push(name.to_string());
        }

        self.index_dirty = self.keep_listfile || self.attributes.is_some();
        self.weak_signed = false;
        self.clear_signature = true;

        debug!(
            "Added {} ({} bytes, stored {} bytes)",
            name, data.len(), self.blocks[index].compressed_size
        );

        Ok(())
    }

    /// Read and decode a file's contents
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let index = self
            .lookup(name)
            .ok_or_else(|| ArchiveError::FileNotFound(name.to_string()))?;
        let block = self.blocks[index];
        let stored = self.read_stored(&block)?;
        sector::decode(&stored, &block, self.header.sector_size())
    }

    fn read_stored(&mut self, block: &BlockEntry) -> Result<Vec<u8>> {
        self.file
            .read_at(block.file_pos as u64, block.compressed_size as usize)
    }

    fn entry_info(&self, name: &str, block: &BlockEntry) -> EntryInfo {
        EntryInfo {
            name: name.to_string(),
            size: block.file_size as u64,
            stored_size: block.compressed_size as u64,
            compressed: block.is_compressed(),
            sector_crc: block.has_sector_crc(),
        }
    }

    /// Look up a file
    pub fn open_entry(&self, name: &str) -> Result<EntryInfo> {
        let index = self
            .lookup(name)
            .ok_or_else(|| ArchiveError::FileNotFound(name.to_string()))?;
        Ok(self.entry_info(name, &self.blocks[index]))
    }

    /// Named user files
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.names
            .iter()
            .filter_map(|name| {
                self.lookup(name)
                    .map(|index| self.entry_info(name, &self.blocks[index]))
            })
            .collect()
    }

    /// Whether the archive holds a file of this name (special files included)
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Verify one checksum of a file against its integrity record
    pub fn verify_entry(&mut self, name: &str, kind: ChecksumKind) -> ChecksumOutcome {
        let Some(index) = self.lookup(name) else {
            return ChecksumOutcome::OpenError;
        };
        let block = self.blocks[index];
        let sector_size = self.header.sector_size();

        let stored = match self.read_stored(&block) {
            Ok(stored) => stored,
            Err(e) => {
                debug!("Could not read {}: {}", name, e);
                return ChecksumOutcome::ReadError;
            }
        };

        // Special files carry no integrity record of their own
        let user_block = !listfile::SPECIAL_NAMES
            .iter()
            .any(|special| self.lookup(special) == Some(index));
        let record = self
            .attributes
            .as_ref()
            .filter(|_| user_block)
            .and_then(|attributes| attributes.entries.get(index).map(|e| (attributes.flags, *e)));

        let decoded = || match sector::decode(&stored, &block, sector_size) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("Could not decode {}: {}", name, e);
                None
            }
        };

        let outcome = |ok: bool| {
            if ok {
                ChecksumOutcome::Present
            } else {
                ChecksumOutcome::Mismatch
            }
        };

        match kind {
            ChecksumKind::SectorCrc => {
                if !block.has_sector_crc() {
                    return ChecksumOutcome::NotRecorded;
                }
                match sector::sector_crcs_match(&stored, &block, sector_size) {
                    Ok(ok) => outcome(ok),
                    Err(_) => ChecksumOutcome::ReadError,
                }
            }
            ChecksumKind::FileCrc32 => match record {
                Some((flags, entry)) if flags & attr_flags::CRC32 != 0 => {
                    match decoded() {
                        Some(data) => outcome(crc32fast::hash(&data) == entry.crc32),
                        None => ChecksumOutcome::ReadError,
                    }
                }
                _ => ChecksumOutcome::NotRecorded,
            },
            ChecksumKind::FileMd5 => match record {
                Some((flags, entry)) if flags & attr_flags::MD5 != 0 => {
                    match decoded() {
                        Some(data) => outcome(md5::compute(&data).0 == entry.md5),
                        None => ChecksumOutcome::ReadError,
                    }
                }
                _ => ChecksumOutcome::NotRecorded,
            },
        }
    }

    /// Reserve the `(signature)` file if the archive has none
    fn ensure_signature_slot(&mut self) -> Result<usize> {
        if let Some(index) = self.lookup(SIGNATURE_NAME) {
            return Ok(index);
        }

        let index = self.store(SIGNATURE_NAME, &[0u8; WEAK_SIGNATURE_FILE_SIZE], SIGNATURE_STORE)?;
        if self.attributes.is_some() {
            self.index_dirty = true;
        }
        Ok(index)
    }

    /// Byte range of a usable `(signature)` file, if there is one
    ///
    /// Errors when the file exists but cannot hold a weak signature.
    fn signature_slot(&self) -> Result<Option<Range<usize>>> {
        let Some(index) = self.lookup(SIGNATURE_NAME) else {
            return Ok(None);
        };
        let block = self.blocks[index];

        let well_formed = !block.is_compressed()
            && block.compressed_size as usize == WEAK_SIGNATURE_FILE_SIZE
            && block.file_size as usize == WEAK_SIGNATURE_FILE_SIZE
            && block.end() <= self.header.archive_size as u64;

        if !well_formed {
            return Err(ArchiveError::Signature(
                "(signature) file has an unexpected layout".to_string(),
            ));
        }

        let start = block.file_pos as usize;
        Ok(Some(start..start + WEAK_SIGNATURE_FILE_SIZE))
    }

    /// Check the archive's signatures
    ///
    /// Flushes pending changes first so the answer describes the bytes on
    /// disk. A weak signature takes precedence over a strong one.
    pub fn signature_status(&mut self) -> Result<SignatureStatus> {
        self.flush()?;

        let archive_size = self.header.archive_size as u64;
        let image = self.file.read_at(0, archive_size as usize)?;
        let tail = self.file.read_to_end_from(archive_size)?;

        let slot = match self.signature_slot() {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Cannot check weak signature: {}", e);
                return Ok(SignatureStatus::VerifyFailed);
            }
        };

        if let Some(slot) = slot {
            let sig_start = slot.start + WEAK_SIGNATURE_OFFSET;
            let stored = &image[sig_start..sig_start + WEAK_SIGNATURE_SIZE];

            if stored.iter().any(|&b| b != 0) {
                let valid = signature::verify_weak(&image, slot, stored)?;
                self.weak_signed = valid;
                return Ok(if valid {
                    SignatureStatus::WeakValid
                } else {
                    SignatureStatus::WeakInvalid
                });
            }
        }

        if tail.is_empty() {
            return Ok(SignatureStatus::NoSignature);
        }

        match signature::strong_signature_in(&tail) {
            Some(stored) => Ok(
                match signature::verify_strong(&image, stored, &self.strong_keys) {
                    StrongVerdict::Valid => SignatureStatus::StrongValid,
                    StrongVerdict::Invalid => SignatureStatus::StrongInvalid,
                    StrongVerdict::NoKey => {
                        warn!("Archive has a strong signature but no public key is configured");
                        SignatureStatus::Unknown
                    }
                },
            ),
            None => {
                debug!("Ignoring {} trailing bytes after the archive", tail.len());
                Ok(SignatureStatus::NoSignature)
            }
        }
    }

    fn has_strong_tail(&mut self) -> Result<bool> {
        let tail = self
            .file
            .read_to_end_from(self.header.archive_size as u64)?;
        Ok(signature::strong_signature_in(&tail).is_some())
    }

    /// Sign the archive
    ///
    /// Only weak signatures can be produced. The signature is re-applied
    /// whenever the archive is rewritten, until its content changes.
    pub fn sign(&mut self, kind: SignatureKind) -> Result<()> {
        if !self.file.is_writable() {
            return Err(ArchiveError::ReadOnly);
        }
        if kind == SignatureKind::Strong {
            return Err(ArchiveError::Signature(
                "strong signatures can only be verified, not produced".to_string(),
            ));
        }

        self.ensure_signature_slot()?;
        self.weak_signed = true;
        self.dirty = true;
        self.flush()?;

        info!("Signed {} with a weak signature", self.path().display());
        Ok(())
    }

    /// Write pending changes: special files, tables, header and signature
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty || !self.file.is_writable() {
            return Ok(());
        }

        if self.index_dirty {
            self.write_index_files()?;
        }

        let hash_bytes = self.hash_table.to_bytes();
        let block_bytes = encode_block_table(&self.blocks);

        let hash_pos = self.data_end;
        let block_pos = hash_pos + hash_bytes.len() as u64;
        let archive_size = block_pos + block_bytes.len() as u64;
        if archive_size > u32::MAX as u64 {
            return Err(ArchiveError::TooLarge);
        }

        self.header.hash_table_pos = hash_pos as u32;
        self.header.block_table_pos = block_pos as u32;
        self.header.hash_table_size = self.hash_table.len();
        self.header.block_table_size = self.blocks.len() as u32;
        self.header.archive_size = archive_size as u32;

        self.file.write_at(hash_pos, &hash_bytes)?;
        self.file.write_at(block_pos, &block_bytes)?;
        self.file.write_at(0, &self.header.to_bytes())?;

        if self.strong_signed {
            warn!(
                "Rewriting {} drops its strong signature",
                self.path().display()
            );
            self.strong_signed = false;
        }
        if self.file.len()? > archive_size {
            self.file.set_len(archive_size)?;
        }

        self.write_weak_signature()?;

        self.file.sync()?;
        self.dirty = false;
        self.index_dirty = false;
        self.clear_signature = false;

        Ok(())
    }

    fn write_index_files(&mut self) -> Result<()> {
        if self.keep_listfile {
            let names = listfile::encode(self.names.iter().map(String::as_str));
            self.store(LISTFILE_NAME, &names, INDEX_STORE)?;
        }

        if self.attributes.is_some() {
            // The attributes file describes every block, itself included
            let own_index = self.reserve(ATTRIBUTES_NAME)?;

            let special: Vec<usize> = listfile::SPECIAL_NAMES
                .iter()
                .filter_map(|name| self.lookup(name))
                .chain(std::iter::once(own_index))
                .collect();

            let block_count = self.blocks.len();
            let bytes = match self.attributes.as_mut() {
                Some(attributes) => {
                    attributes
                        .entries
                        .resize(block_count, FileAttributes::default());
                    for index in special {
                        attributes.entries[index] = FileAttributes::default();
                    }
                    attributes.to_bytes()
                }
                None => Vec::new(),
            };

            self.store(ATTRIBUTES_NAME, &bytes, INDEX_STORE)?;
        }

        Ok(())
    }

    /// Fill the signature slot with a fresh weak signature, or clear it
    /// after a content change
    fn write_weak_signature(&mut self) -> Result<()> {
        if !self.weak_signed && !self.clear_signature {
            return Ok(());
        }

        let slot = match self.signature_slot() {
            Ok(Some(slot)) => slot,
            Ok(None) if self.weak_signed => {
                return Err(ArchiveError::Signature(
                    "archive has no (signature) file".to_string(),
                ))
            }
            Ok(None) => return Ok(()),
            Err(e) if self.weak_signed => return Err(e),
            Err(e) => {
                warn!("Leaving malformed (signature) file untouched: {}", e);
                return Ok(());
            }
        };

        let sig_pos = (slot.start + WEAK_SIGNATURE_OFFSET) as u64;
        let signature_bytes = if self.weak_signed {
            let image = self
                .file
                .read_at(0, self.header.archive_size as usize)?;
            signature::sign_weak(&image, slot)?
        } else {
            [0u8; WEAK_SIGNATURE_SIZE]
        };

        self.file.write_at(sig_pos, &signature_bytes)
    }

    /// Bytes of the data region not held by live blocks
    fn slack_bytes(&self) -> u64 {
        let live: u64 = self
            .blocks
            .iter()
            .filter(|b| b.exists())
            .map(|b| b.compressed_size as u64)
            .sum();
        (self.data_end - HEADER_SIZE as u64).saturating_sub(live)
    }

    /// Archive statistics
    pub fn stats(&self) -> ArchiveStats {
        let live = self.blocks.iter().filter(|b| b.exists());
        ArchiveStats {
            archive_size: self.header.archive_size as u64,
            block_count: live.clone().count(),
            live_bytes: live.map(|b| b.compressed_size as u64).sum(),
            slack_bytes: self.slack_bytes(),
        }
    }

    /// Drop slack from the archive, packing live data after the header
    ///
    /// A weakly signed archive is re-signed afterwards. Archives carrying a
    /// strong signature are refused, since it cannot be re-applied.
    pub fn compact(&mut self) -> Result<()> {
        if !self.file.is_writable() {
            return Err(ArchiveError::ReadOnly);
        }
        if self.strong_signed {
            return Err(ArchiveError::StrongSignaturePresent);
        }

        self.flush()?;

        // Keep a valid weak signature valid across the rewrite
        if !self.weak_signed {
            self.signature_status()?;
        }

        if self.drop_dead_blocks() {
            self.index_dirty = self.keep_listfile || self.attributes.is_some();
            self.flush()?;
        }

        let before = self.slack_bytes();
        if before == 0 {
            debug!("Nothing to compact in {}", self.path().display());
            return Ok(());
        }

        let mut order: Vec<usize> = (0..self.blocks.len())
            .filter(|&i| self.blocks[i].exists())
            .collect();
        order.sort_by_key(|&i| self.blocks[i].file_pos);

        let mut contents = Vec::with_capacity(order.len());
        for &index in &order {
            let block = self.blocks[index];
            contents.push(self.read_stored(&block)?);
        }

        let mut position = HEADER_SIZE as u64;
        for (&index, data) in order.iter().zip(&contents) {
            self.file.write_at(position, data)?;
            self.blocks[index].file_pos = position as u32;
            position += data.len() as u64;
        }

        self.data_end = position;
        self.dirty = true;
        self.flush()?;

        info!(
            "Compacted {}: reclaimed {} bytes",
            self.path().display(),
            before
        );
        Ok(())
    }

    /// Remove blocks that hold no file, remapping the hash table
    ///
    /// Returns whether anything was removed.
    fn drop_dead_blocks(&mut self) -> bool {
        if self.blocks.iter().all(BlockEntry::exists) {
            return false;
        }

        let mut remap = vec![None; self.blocks.len()];
        let mut kept_blocks = Vec::new();
        let mut kept_attributes = Vec::new();

        for (index, block) in self.blocks.iter().enumerate() {
            if block.exists() {
                remap[index] = Some(kept_blocks.len() as u32);
                kept_blocks.push(*block);
                if let Some(attributes) = &self.attributes {
                    kept_attributes.push(attributes.entries.get(index).copied().unwrap_or_default());
                }
            }
        }

        self.hash_table
            .remap_blocks(|index| remap.get(index as usize).copied().flatten());
        self.blocks = kept_blocks;
        if let Some(attributes) = self.attributes.as_mut() {
            attributes.entries = kept_attributes;
        }
        self.dirty = true;
        true
    }

    /// Flush pending changes and close the archive
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.file.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_archive(dir: &TempDir) -> Archive {
        Archive::create(dir.path().join("test.mpq"), &CreateParams::default()).unwrap()
    }

    #[test]
    fn test_create_empty_archive() {
        let dir = TempDir::new().unwrap();
        let archive = create_test_archive(&dir);

        assert!(archive.contains(SIGNATURE_NAME));
        assert!(archive.contains(LISTFILE_NAME));
        assert!(archive.contains(ATTRIBUTES_NAME));
        assert!(archive.entries().is_empty());
        assert!(!archive.is_dirty());
        archive.close().unwrap();

        let bytes = std::fs::read(dir.path().join("test.mpq")).unwrap();
        assert_eq!(&bytes[0..4], b"MPQ\x1A");
    }

    #[test]
    fn test_add_and_read() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);

        let data = b"Hello, archive! ".repeat(600);
        archive.add_bytes("docs/hello.txt", &data, AddFlags::default()).unwrap();

        let info = archive.open_entry("docs/hello.txt").unwrap();
        assert_eq!(info.size, data.len() as u64);
        assert!(info.compressed);
        assert!(info.sector_crc);
        assert!(info.stored_size < info.size);

        assert_eq!(archive.read_entry("DOCS\\HELLO.TXT").unwrap(), data);
    }

    #[test]
    fn test_reopen_preserves_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mpq");
        {
            let mut archive = Archive::create(&path, &CreateParams::default()).unwrap();
            archive.add_bytes("a.txt", b"alpha", AddFlags::default()).unwrap();
            archive.add_bytes("b.bin", &[9u8; 5000], AddFlags::default()).unwrap();
            archive.close().unwrap();
        }

        let mut archive = Archive::open(&path, AccessMode::ReadOnly).unwrap();
        let names: Vec<String> = archive.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a.txt", "b.bin"]);
        assert_eq!(archive.read_entry("a.txt").unwrap(), b"alpha");
        assert_eq!(archive.read_entry("b.bin").unwrap(), vec![9u8; 5000]);
    }

    #[test]
    fn test_replace_keeps_one_entry() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);

        archive.add_bytes("a.txt", b"first", AddFlags::default()).unwrap();
        archive.add_bytes("A.TXT", b"second", AddFlags::default()).unwrap();

        assert_eq!(archive.entries().len(), 1);
        assert_eq!(archive.read_entry("a.txt").unwrap(), b"second");
        assert!(archive.stats().slack_bytes > 0);
    }

    #[test]
    fn test_reserved_names_rejected() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);

        assert!(matches!(
            archive.add_bytes("(signature)", b"x", AddFlags::default()),
            Err(ArchiveError::ReservedName(_))
        ));
    }

    #[test]
    fn test_verify_all_checksums() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);
        archive
            .add_bytes("report.txt", b"0123456789", AddFlags::default())
            .unwrap();

        for kind in ChecksumKind::ALL {
            assert_eq!(
                archive.verify_entry("report.txt", kind),
                ChecksumOutcome::Present
            );
        }
        assert_eq!(
            archive.verify_entry("missing.txt", ChecksumKind::FileMd5),
            ChecksumOutcome::OpenError
        );
    }

    #[test]
    fn test_empty_file_checksums_are_recorded() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);
        archive.add_bytes("empty.txt", b"", AddFlags::default()).unwrap();

        // The CRC32 of no bytes is zero and still counts as recorded
        for kind in ChecksumKind::ALL {
            assert_eq!(
                archive.verify_entry("empty.txt", kind),
                ChecksumOutcome::Present
            );
        }
    }

    #[test]
    fn test_special_files_have_no_integrity_record() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);

        assert_eq!(
            archive.verify_entry(LISTFILE_NAME, ChecksumKind::FileCrc32),
            ChecksumOutcome::NotRecorded
        );
        assert_eq!(
            archive.verify_entry(SIGNATURE_NAME, ChecksumKind::FileMd5),
            ChecksumOutcome::NotRecorded
        );
    }

    #[test]
    fn test_create_refuses_existing_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mpq");
        {
            let mut archive = create_test_archive(&dir);
            archive.add_bytes("a.txt", b"keep", AddFlags::default()).unwrap();
            archive.sign(SignatureKind::Weak).unwrap();
            archive.close().unwrap();
        }
        let before = std::fs::read(&path).unwrap();

        assert!(matches!(
            Archive::create(&path, &CreateParams::default()),
            Err(ArchiveError::AlreadyExists(_))
        ));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_uncompressed_file_has_no_sector_crc() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);
        let flags = AddFlags {
            compress: false,
            sector_crc: true,
        };
        archive.add_bytes("raw.bin", b"raw", flags).unwrap();

        assert_eq!(
            archive.verify_entry("raw.bin", ChecksumKind::SectorCrc),
            ChecksumOutcome::NotRecorded
        );
        assert_eq!(
            archive.verify_entry("raw.bin", ChecksumKind::FileCrc32),
            ChecksumOutcome::Present
        );
    }

    #[test]
    fn test_without_attributes_checksums_not_recorded() {
        let dir = TempDir::new().unwrap();
        let params = CreateParams {
            attributes: false,
            ..CreateParams::default()
        };
        let mut archive = Archive::create(dir.path().join("plain.mpq"), &params).unwrap();
        archive.add_bytes("a.txt", b"data", AddFlags::default()).unwrap();

        assert!(!archive.contains(ATTRIBUTES_NAME));
        assert_eq!(
            archive.verify_entry("a.txt", ChecksumKind::FileMd5),
            ChecksumOutcome::NotRecorded
        );
        assert_eq!(
            archive.verify_entry("a.txt", ChecksumKind::SectorCrc),
            ChecksumOutcome::Present
        );
    }

    #[test]
    fn test_sign_and_status() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);
        archive.add_bytes("a.txt", b"data", AddFlags::default()).unwrap();

        assert_eq!(archive.signature_status().unwrap(), SignatureStatus::NoSignature);
        archive.sign(SignatureKind::Weak).unwrap();
        assert_eq!(archive.signature_status().unwrap(), SignatureStatus::WeakValid);
    }

    #[test]
    fn test_strong_signing_refused() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);
        assert!(matches!(
            archive.sign(SignatureKind::Strong),
            Err(ArchiveError::Signature(_))
        ));
    }

    #[test]
    fn test_adding_after_signing_clears_signature() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);
        archive.add_bytes("a.txt", b"one", AddFlags::default()).unwrap();
        archive.sign(SignatureKind::Weak).unwrap();

        archive.add_bytes("b.txt", b"two", AddFlags::default()).unwrap();
        assert_eq!(archive.signature_status().unwrap(), SignatureStatus::NoSignature);
    }

    #[test]
    fn test_sign_creates_missing_slot() {
        let dir = TempDir::new().unwrap();
        let params = CreateParams {
            signature_slot: false,
            ..CreateParams::default()
        };
        let mut archive = Archive::create(dir.path().join("noslot.mpq"), &params).unwrap();
        assert!(!archive.contains(SIGNATURE_NAME));

        archive.sign(SignatureKind::Weak).unwrap();
        assert!(archive.contains(SIGNATURE_NAME));
        assert_eq!(archive.signature_status().unwrap(), SignatureStatus::WeakValid);
    }

    #[test]
    fn test_compact_removes_slack_and_keeps_signature() {
        let dir = TempDir::new().unwrap();
        let mut archive = create_test_archive(&dir);
        archive
            .add_bytes("a.txt", &b"payload ".repeat(300), AddFlags::default())
            .unwrap();
        archive.sign(SignatureKind::Weak).unwrap();

        let before = archive.stats();
        assert!(before.slack_bytes > 0);

        archive.compact().unwrap();
        let after = archive.stats();
        assert_eq!(after.slack_bytes, 0);
        assert!(after.archive_size < before.archive_size);
        assert_eq!(archive.signature_status().unwrap(), SignatureStatus::WeakValid);
        assert_eq!(archive.read_entry("a.txt").unwrap(), b"payload ".repeat(300));
    }

    #[test]
    fn test_compact_without_slack_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mpq");
        let mut archive = Archive::create(&path, &CreateParams::default()).unwrap();
        archive.add_bytes("a.txt", b"abc", AddFlags::default()).unwrap();
        archive.sign(SignatureKind::Weak).unwrap();
        archive.compact().unwrap();
        archive.close().unwrap();

        let first = std::fs::read(&path).unwrap();
        let mut archive = Archive::open(&path, AccessMode::ReadWrite).unwrap();
        archive.compact().unwrap();
        archive.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_read_only_archive_rejects_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mpq");
        create_test_archive(&dir).close().unwrap();

        let mut archive = Archive::open(&path, AccessMode::ReadOnly).unwrap();
        assert!(matches!(
            archive.add_bytes("a.txt", b"x", AddFlags::default()),
            Err(ArchiveError::ReadOnly)
        ));
        assert!(matches!(
            archive.sign(SignatureKind::Weak),
            Err(ArchiveError::ReadOnly)
        ));
        assert!(matches!(archive.compact(), Err(ArchiveError::ReadOnly)));
    }

    #[test]
    fn test_open_rejects_non_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.mpq");

        std::fs::write(&path, b"short").unwrap();
        assert!(matches!(
            Archive::open(&path, AccessMode::ReadOnly),
            Err(ArchiveError::Corrupt(_))
        ));

        std::fs::write(&path, [0x41u8; 64]).unwrap();
        assert!(matches!(
            Archive::open(&path, AccessMode::ReadOnly),
            Err(ArchiveError::InvalidMagic)
        ));
    }

    #[test]
    fn test_invalid_create_params() {
        let dir = TempDir::new().unwrap();
        let params = CreateParams {
            sector_size: 1000,
            ..CreateParams::default()
        };
        assert!(matches!(
            Archive::create(dir.path().join("bad.mpq"), &params),
            Err(ArchiveError::InvalidSectorSize(1000))
        ));
    }

    #[test]
    fn test_hash_table_size_rounded_up() {
        let dir = TempDir::new().unwrap();
        let params = CreateParams {
            hash_table_size: 40,
            ..CreateParams::default()
        };
        let archive = Archive::create(dir.path().join("big.mpq"), &params).unwrap();
        assert_eq!(archive.header().hash_table_size, 64);
    }
}
