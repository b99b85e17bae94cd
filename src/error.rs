//! Error types for the signing pipeline

use crate::core::{ArchiveError, SignatureKind, SignatureStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline result type
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Problems with the input, found before any container is touched
#[derive(Error, Debug)]
pub enum InputError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("{} is not a regular file", .0.display())]
    NotRegularFile(PathBuf),

    #[error("{} cannot be stored in an archive: {source}", .path.display())]
    InvalidName {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
}

/// Fatal pipeline failures
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    /// The container could not be created
    #[error("Could not create archive {}: {source}", .path.display())]
    ContainerCreate {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// The existing container could not be opened
    #[error("Could not open archive {}: {source}", .path.display())]
    ContainerOpen {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// The target file could not be inserted
    #[error("Could not add file {name} to archive: {source}")]
    Insert {
        name: String,
        #[source]
        source: ArchiveError,
    },

    /// Producing the signature failed
    #[error("Could not sign archive {}: {source}", .path.display())]
    Sign {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// The signature metadata is inconsistent
    #[error("An error has occurred during signature verification of {}", .path.display())]
    VerifyFailed { path: PathBuf },

    /// An existing signature does not match the archive
    #[error("An invalid {kind} was found in {}", .path.display())]
    SignatureInvalid { path: PathBuf, kind: SignatureKind },

    /// A signature that cannot be evaluated
    #[error("An error has occurred: the signature of {} could not be evaluated", .path.display())]
    UnknownSignature { path: PathBuf },

    /// Compaction left the archive without a valid signature
    #[error("Signature of {} no longer verifies after compaction ({status:?})", .path.display())]
    SignatureInvalidatedByCompaction {
        path: PathBuf,
        status: SignatureStatus,
    },

    /// Closing (flushing) the container failed
    #[error("Could not close archive {}: {source}", .path.display())]
    ContainerClose {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
}
