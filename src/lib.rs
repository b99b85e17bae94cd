//! # mpq-signer - Package and sign files as MPQ archives
//!
//! `mpq-signer` packs a single file into an MPQ-style archive, records
//! per-sector and whole-file checksums for it, and authenticates the archive
//! with a weak digital signature. An archive that is already signed is
//! verified and left alone.
//!
//! - [`core`] - the native archive engine (tables, sectors, special files,
//!   signatures)
//! - [`engine`] - the `ContainerEngine`/`Container` seam the pipeline drives
//! - [`pipeline`] - resolve → insert → verify → sign → compact → close
//! - [`config`] - TOML configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mpq_signer::{NativeEngine, Pipeline, PipelineOptions};
//! use mpq_signer::pipeline::ConsoleSink;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::new(NativeEngine::new(), PipelineOptions::default());
//!
//! // Creates report.mpq holding report.txt, signed
//! let outcome = pipeline.run(Path::new("report.txt"), &mut ConsoleSink)?;
//! println!("{} -> {:?}", outcome.container.display(), outcome.signature);
//! # Ok(())
//! # }
//! ```
//!
//! ## Working with archives directly
//!
//! ```rust,no_run
//! use mpq_signer::{AccessMode, AddFlags, Archive, CreateParams, SignatureKind};
//!
//! # fn main() -> mpq_signer::Result<()> {
//! let mut archive = Archive::create("data.mpq", &CreateParams::default())?;
//! archive.add_bytes("notes.txt", b"hello", AddFlags::default())?;
//! archive.sign(SignatureKind::Weak)?;
//! archive.close()?;
//!
//! let mut archive = Archive::open("data.mpq", AccessMode::ReadOnly)?;
//! assert_eq!(archive.read_entry("notes.txt")?, b"hello");
//! assert!(archive.signature_status()?.is_valid());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use crate::config::{ConfigError, SignerConfig};
pub use crate::core::{
    AccessMode, AddFlags, Archive, ArchiveError, ArchiveStats, ChecksumKind, ChecksumOutcome,
    CreateParams, EntryInfo, Result, SignatureKind, SignatureStatus,
};
pub use crate::engine::{Container, ContainerEngine, NativeEngine};
pub use crate::error::{InputError, PipelineError, PipelineResult};
pub use crate::pipeline::{Outcome, Pipeline, PipelineOptions, Route};

/// Version banner printed by `mpqsigner --about`
pub const BANNER: &str = concat!(
    "MPQSigner v",
    env!("CARGO_PKG_VERSION"),
    " - packages a file into an MPQ archive and signs it"
);
