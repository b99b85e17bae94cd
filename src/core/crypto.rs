//! Name hashing and table encryption
//!
//! Archive tables are located by hashing entry names, and are stored
//! encrypted with a key derived from a fixed name (`"(hash table)"` /
//! `"(block table)"`). The hash and cipher come from `wow_mpq`.

use wow_mpq::crypto::hash_type;

/// Which slice of the crypt table a hash is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// Starting slot in the hash table
    TableOffset,
    /// First name verification hash
    NameA,
    /// Second name verification hash
    NameB,
    /// Encryption key
    FileKey,
}

impl HashType {
    fn offset(self) -> u32 {
        match self {
            HashType::TableOffset => hash_type::TABLE_OFFSET,
            HashType::NameA => hash_type::NAME_A,
            HashType::NameB => hash_type::NAME_B,
            HashType::FileKey => hash_type::FILE_KEY,
        }
    }
}

/// Hash an entry name
///
/// Names are case-insensitive and `/` hashes like `\`.
pub fn hash_string(name: &str, hash_type: HashType) -> u32 {
    wow_mpq::crypto::hash_string(name, hash_type.offset())
}

/// Encrypt a block of little-endian words in place
pub fn encrypt_block(data: &mut [u32], key: u32) {
    wow_mpq::crypto::encrypt_block(data, key);
}

/// Decrypt a block of little-endian words in place
pub fn decrypt_block(data: &mut [u32], key: u32) {
    wow_mpq::crypto::decrypt_block(data, key);
}

/// Split bytes into little-endian words (trailing partial word is dropped)
pub fn words_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub fn bytes_from_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}
