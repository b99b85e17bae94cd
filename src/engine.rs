//! Container engine seam
//!
//! The signing pipeline drives a container only through these two traits.
//! [`NativeEngine`] implements them over [`Archive`]; tests substitute
//! scripted engines to reach failure paths a real archive rarely produces.

use crate::core::{
    AccessMode, AddFlags, Archive, ChecksumKind, ChecksumOutcome, CreateParams, EntryInfo, Result,
    SignatureKind, SignatureStatus,
};
use rsa::RsaPublicKey;
use std::path::Path;
use tracing::warn;

/// An open container, exclusively owned by one pipeline run
///
/// # Examples
///
/// ```rust,no_run
/// use mpq_signer::engine::{Container, ContainerEngine, NativeEngine};
/// use mpq_signer::core::AccessMode;
/// use std::path::Path;
///
/// fn is_signed<C: Container>(container: &mut C) -> bool {
///     container.signature_status().is_valid()
/// }
///
/// let engine = NativeEngine::new();
/// let mut archive = engine.open(Path::new("archive.mpq"), AccessMode::ReadOnly)?;
/// println!("signed: {}", is_signed(&mut archive));
/// archive.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub trait Container {
    /// Location of the container on disk
    fn path(&self) -> &Path;

    /// Insert a file from disk under a logical name
    fn add_file(&mut self, source: &Path, name: &str, flags: AddFlags) -> Result<()>;

    /// Look up an entry
    fn open_entry(&mut self, name: &str) -> Result<EntryInfo>;

    /// Verify one checksum of an entry against its integrity record
    fn verify_entry(&mut self, name: &str, kind: ChecksumKind) -> ChecksumOutcome;

    /// Query and verify the container's signature
    ///
    /// Failures to evaluate the signature are reported as
    /// [`SignatureStatus::VerifyFailed`].
    fn signature_status(&mut self) -> SignatureStatus;

    /// Sign the container
    fn sign(&mut self, kind: SignatureKind) -> Result<()>;

    /// Reclaim slack space
    fn compact(&mut self) -> Result<()>;

    /// Flush and release the container
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Creates and opens containers
pub trait ContainerEngine {
    type Container: Container;

    /// Create a new container at `path`
    fn create(&self, path: &Path, params: &CreateParams) -> Result<Self::Container>;

    /// Open an existing container
    fn open(&self, path: &Path, mode: AccessMode) -> Result<Self::Container>;
}

/// Engine backed by the native [`Archive`] format
#[derive(Debug, Clone, Default)]
pub struct NativeEngine {
    strong_keys: Vec<RsaPublicKey>,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify strong signatures against these public keys
    pub fn with_strong_keys(mut self, keys: Vec<RsaPublicKey>) -> Self {
        self.strong_keys = keys;
        self
    }

    pub fn strong_keys(&self) -> &[RsaPublicKey] {
        &self.strong_keys
    }
}

impl ContainerEngine for NativeEngine {
    type Container = Archive;

    fn create(&self, path: &Path, params: &CreateParams) -> Result<Archive> {
        let mut archive = Archive::create(path, params)?;
        archive.set_strong_keys(self.strong_keys.clone());
        Ok(archive)
    }

    fn open(&self, path: &Path, mode: AccessMode) -> Result<Archive> {
        let mut archive = Archive::open(path, mode)?;
        archive.set_strong_keys(self.strong_keys.clone());
        Ok(archive)
    }
}

/// Implement Container for the native Archive
impl Container for Archive {
    fn path(&self) -> &Path {
        Archive::path(self)
    }

    fn add_file(&mut self, source: &Path, name: &str, flags: AddFlags) -> Result<()> {
        Archive::add_file(self, source, name, flags)
    }

    fn open_entry(&mut self, name: &str) -> Result<EntryInfo> {
        Archive::open_entry(self, name)
    }

    fn verify_entry(&mut self, name: &str, kind: ChecksumKind) -> ChecksumOutcome {
        Archive::verify_entry(self, name, kind)
    }

    fn signature_status(&mut self) -> SignatureStatus {
        match Archive::signature_status(self) {
            Ok(status) => status,
            Err(e) => {
                warn!("Signature check of {} failed: {}", Archive::path(self).display(), e);
                SignatureStatus::VerifyFailed
            }
        }
    }

    fn sign(&mut self, kind: SignatureKind) -> Result<()> {
        Archive::sign(self, kind)
    }

    fn compact(&mut self) -> Result<()> {
        Archive::compact(self)
    }

    fn close(self) -> Result<()> {
        Archive::close(self)
    }
}
