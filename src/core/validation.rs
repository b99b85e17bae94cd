//! Container naming and entry-name validation
//!
//! A target file is packed into a container named after its stem with the
//! native `.mpq` extension. A target that already carries that extension is
//! the container itself.

use crate::core::error::{ArchiveError, Result};
use crate::core::listfile::is_special_name;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Native container extension (without the dot)
pub const CONTAINER_EXTENSION: &str = "mpq";

/// Whether `path` already names a container (`.mpq`, any case)
///
/// # Examples
///
/// ```
/// use mpq_signer::core::validation::has_container_extension;
/// use std::path::Path;
///
/// assert!(has_container_extension(Path::new("archive.mpq")));
/// assert!(has_container_extension(Path::new("ARCHIVE.MPQ")));
/// assert!(!has_container_extension(Path::new("report.txt")));
/// assert!(!has_container_extension(Path::new("mpq")));
/// ```
pub fn has_container_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CONTAINER_EXTENSION))
}

/// Path of the container a target file is packed into
///
/// Takes the target's stem, appends `.mpq` and places it in `output_dir`.
/// Only the last extension is dropped, so `data.tar.gz` becomes
/// `data.tar.mpq`.
///
/// # Examples
///
/// ```
/// use mpq_signer::core::validation::container_path_for;
/// use std::path::Path;
///
/// let path = container_path_for(Path::new("docs/report.txt"), Path::new("out")).unwrap();
/// assert_eq!(path, Path::new("out/report.mpq"));
///
/// let path = container_path_for(Path::new("README"), Path::new(".")).unwrap();
/// assert_eq!(path, Path::new("./README.mpq"));
/// ```
pub fn container_path_for(target: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = target
        .file_stem()
        .ok_or_else(|| ArchiveError::InvalidPath(target.display().to_string()))?;

    let mut name = OsString::from(stem);
    name.push(".");
    name.push(CONTAINER_EXTENSION);

    Ok(output_dir.join(name))
}

/// Logical entry name for a target file: its path string as given
///
/// Rejects names that are not valid UTF-8, are empty, or collide with the
/// archive's own special files.
pub fn entry_name_for(target: &Path) -> Result<String> {
    let name = target
        .to_str()
        .ok_or_else(|| ArchiveError::InvalidPath(target.display().to_string()))?;

    validate_entry_name(name)?;
    Ok(name.to_string())
}

/// Validate a logical entry name
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ArchiveError::InvalidPath("entry name cannot be empty".to_string()));
    }

    if name.contains(['\0', '\r', '\n', ';']) {
        return Err(ArchiveError::InvalidPath(format!(
            "entry name '{}' contains a listfile separator",
            name.escape_default()
        )));
    }

    if is_special_name(name) {
        return Err(ArchiveError::ReservedName(name.to_string()));
    }

    Ok(())
}
