//! `(listfile)`: the file-name index
//!
//! Name hashes cannot be reversed, so the archive keeps a plain list of the
//! names it holds. Special files are not listed.

pub const LISTFILE_NAME: &str = "(listfile)";
pub const ATTRIBUTES_NAME: &str = "(attributes)";
pub const SIGNATURE_NAME: &str = "(signature)";

/// Names the archive maintains itself
pub const SPECIAL_NAMES: [&str; 3] = [LISTFILE_NAME, ATTRIBUTES_NAME, SIGNATURE_NAME];

pub fn is_special_name(name: &str) -> bool {
    SPECIAL_NAMES
        .iter()
        .any(|special| special.eq_ignore_ascii_case(name))
}

/// Encode names, one per CRLF-terminated line
pub fn encode<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<u8> {
    let mut out = Vec::new();
    for name in names.into_iter().filter(|name| !is_special_name(name)) {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Decode a listfile, accepting CRLF, LF or `;` separators
pub fn decode(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split(['\r', '\n', ';'])
        .map(str::trim)
        .filter(|name| !name.is_empty() && !is_special_name(name))
        .map(str::to_string)
        .collect()
}
