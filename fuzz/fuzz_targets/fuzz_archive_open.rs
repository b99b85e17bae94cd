#![no_main]
use libfuzzer_sys::fuzz_target;
use mpq_signer::core::header::HEADER_SIZE;
use mpq_signer::{AccessMode, Archive, ChecksumKind};

// Malformed archives must produce errors, never panics
fuzz_target!(|data: &[u8]| {
    if data.len() < HEADER_SIZE as usize {
        return;
    }

    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let path = dir.path().join("fuzz.mpq");
    if std::fs::write(&path, data).is_err() {
        return;
    }

    let mut archive = match Archive::open(&path, AccessMode::ReadOnly) {
        Ok(archive) => archive,
        Err(_) => return,
    };

    let _ = archive.signature_status();
    for entry in archive.entries() {
        let _ = archive.read_entry(&entry.name);
        for kind in ChecksumKind::ALL {
            let _ = archive.verify_entry(&entry.name, kind);
        }
    }
});
