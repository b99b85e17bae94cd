//! Signer configuration
//!
//! Loaded from a TOML file. Every field is optional; an empty file gives
//! the same result as no file at all.
//!
//! ```toml
//! output_dir = "signed"
//! strong_keys = ["keys/release.pem"]
//!
//! [archive]
//! sector_size = 4096
//! hash_table_size = 16
//! compress = true
//! sector_crc = true
//! ```

use crate::core::header::{DEFAULT_SECTOR_SIZE, MIN_HASH_TABLE_SIZE};
use crate::core::{AddFlags, CreateParams};
use crate::pipeline::PipelineOptions;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid strong signature key {}: {reason}", .path.display())]
    Key { path: PathBuf, reason: String },
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignerConfig {
    /// Directory new archives are written to
    pub output_dir: PathBuf,

    pub archive: ArchiveConfig,

    /// PEM-encoded public keys (SubjectPublicKeyInfo) for strong signatures
    pub strong_keys: Vec<PathBuf>,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            archive: ArchiveConfig::default(),
            strong_keys: Vec::new(),
        }
    }
}

/// Parameters of newly created archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub sector_size: u32,
    pub hash_table_size: u32,
    pub compress: bool,
    pub sector_crc: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            hash_table_size: MIN_HASH_TABLE_SIZE,
            compress: true,
            sector_crc: true,
        }
    }
}

impl SignerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Pipeline settings described by this configuration
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            output_dir: self.output_dir.clone(),
            create_params: CreateParams {
                sector_size: self.archive.sector_size,
                hash_table_size: self.archive.hash_table_size,
                ..CreateParams::default()
            },
            add_flags: AddFlags {
                compress: self.archive.compress,
                sector_crc: self.archive.sector_crc,
            },
        }
    }

    /// Read the configured strong signature public keys
    pub fn load_strong_keys(&self) -> Result<Vec<RsaPublicKey>, ConfigError> {
        self.strong_keys
            .iter()
            .map(|path| {
                let pem = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                RsaPublicKey::from_public_key_pem(&pem).map_err(|e| ConfigError::Key {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
