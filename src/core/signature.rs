//! Archive signatures
//!
//! **Weak signature**: stored in the `(signature)` file as 8 reserved bytes
//! followed by a 512-bit RSA signature (PKCS#1 v1.5 over MD5). The digest
//! covers the archive from its first byte to `archive_size` with the whole
//! signature file treated as zeros. The signing key is public; anyone can
//! produce a weak signature, so it only guards against accidental damage and
//! naive tampering. Signing and verification use `wow_mpq`.
//!
//! **Strong signature**: appended directly after `archive_size` as the magic
//! `NGIS` followed by an RSA signature (PKCS#1 v1.5 over SHA-256 of the
//! archive). Only verification is supported, against configured public keys.
//!
//! Both signatures are stored byte-reversed (little-endian big integers).

use crate::core::error::{ArchiveError, Result};
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::ops::Range;
use tracing::debug;
use wow_mpq::crypto::{self as mpq_crypto, SignatureInfo};

/// Size of the `(signature)` file
pub const WEAK_SIGNATURE_FILE_SIZE: usize = mpq_crypto::WEAK_SIGNATURE_FILE_SIZE;
/// Reserved bytes before the signature inside `(signature)`
pub const WEAK_SIGNATURE_OFFSET: usize = WEAK_SIGNATURE_FILE_SIZE - WEAK_SIGNATURE_SIZE;
pub const WEAK_SIGNATURE_SIZE: usize = mpq_crypto::WEAK_SIGNATURE_SIZE;

pub const STRONG_SIGNATURE_MAGIC: [u8; 4] = mpq_crypto::STRONG_SIGNATURE_HEADER;

/// DER prefix of a DigestInfo holding a SHA-256 hash
const SHA256_DIGEST_INFO_PREFIX: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];

/// Result of checking a strong signature tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrongVerdict {
    Valid,
    Invalid,
    /// No public key is configured to check it with
    NoKey,
}

/// Digest range of a weak signature over `archive`
fn weak_signature_info(
    archive: &[u8],
    slot: Range<usize>,
    stored: Vec<u8>,
) -> Result<SignatureInfo> {
    if slot.end > archive.len() || slot.len() != WEAK_SIGNATURE_FILE_SIZE {
        return Err(ArchiveError::Signature(
            "signature slot lies outside the archive".into(),
        ));
    }

    Ok(SignatureInfo::new_weak(
        0,
        archive.len() as u64,
        slot.start as u64,
        slot.len() as u64,
        stored,
    ))
}

/// Produce a weak signature over `archive` (bytes `[0, archive_size)`)
///
/// `slot` is the byte range of the `(signature)` file within the archive.
/// The returned bytes are in stored (reversed) order.
pub fn sign_weak(archive: &[u8], slot: Range<usize>) -> Result<[u8; WEAK_SIGNATURE_SIZE]> {
    let info = weak_signature_info(archive, slot, Vec::new())?;
    let file = mpq_crypto::generate_weak_signature(Cursor::new(archive), &info)?;

    let signature = file
        .get(WEAK_SIGNATURE_OFFSET..WEAK_SIGNATURE_FILE_SIZE)
        .ok_or_else(|| {
            ArchiveError::Signature(format!(
                "weak signature file is {} bytes, expected {}",
                file.len(),
                WEAK_SIGNATURE_FILE_SIZE
            ))
        })?;

    let mut stored = [0u8; WEAK_SIGNATURE_SIZE];
    stored.copy_from_slice(signature);
    Ok(stored)
}

/// Check a stored weak signature against the archive bytes
pub fn verify_weak(archive: &[u8], slot: Range<usize>, stored: &[u8]) -> Result<bool> {
    let info = weak_signature_info(archive, slot, stored.to_vec())?;

    match mpq_crypto::verify_weak_signature_stormlib(Cursor::new(archive), stored, &info) {
        Ok(valid) => Ok(valid),
        Err(e) => {
            debug!("Weak signature does not decode: {}", e);
            Ok(false)
        }
    }
}

/// DigestInfo a strong signature signs: SHA-256 of the archive bytes
pub fn strong_digest_info(archive: &[u8]) -> Vec<u8> {
    let mut info = SHA256_DIGEST_INFO_PREFIX.to_vec();
    info.extend_from_slice(&Sha256::digest(archive));
    info
}

/// Split a strong signature tail into its signature bytes
///
/// Returns `None` when `tail` does not start with the strong signature magic.
pub fn strong_signature_in(tail: &[u8]) -> Option<&[u8]> {
    tail.strip_prefix(&STRONG_SIGNATURE_MAGIC[..])
        .filter(|signature| !signature.is_empty())
}

/// Check a stored strong signature against every configured key
pub fn verify_strong(archive: &[u8], stored: &[u8], keys: &[RsaPublicKey]) -> StrongVerdict {
    if keys.is_empty() {
        return StrongVerdict::NoKey;
    }

    let digest_info = strong_digest_info(archive);
    let mut signature = stored.to_vec();
    signature.reverse();

    let valid = keys.iter().any(|key| {
        key.verify(Pkcs1v15Sign::new_unprefixed(), &digest_info, &signature)
            .is_ok()
    });

    if valid {
        StrongVerdict::Valid
    } else {
        StrongVerdict::Invalid
    }
}
