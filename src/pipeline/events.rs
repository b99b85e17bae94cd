//! User-facing status lines
//!
//! Every stage reports what it did as an [`Event`]. The binary prints them
//! to stdout through [`ConsoleSink`]; tests collect them in a `Vec<Event>`.

use crate::core::{ChecksumKind, ChecksumOutcome, SignatureKind};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;

/// Something the pipeline reports to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created(PathBuf),
    Opened(PathBuf),
    Added(String),
    EntrySize(u64),
    Checksum {
        entry: String,
        kind: ChecksumKind,
        outcome: ChecksumOutcome,
    },
    Signed,
    SignatureConfirmed(SignatureKind),
    Compacted,
    CompactFailed(String),
    Closed,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Created(path) => write!(f, "Created archive {}", path.display()),
            Event::Opened(path) => write!(f, "Opened archive {}", path.display()),
            Event::Added(name) => write!(f, "Added file {} to archive", name),
            Event::EntrySize(size) => write!(f, "File size: {} bytes", size),
            Event::Checksum {
                entry,
                kind,
                outcome,
            } => match outcome {
                ChecksumOutcome::OpenError => write!(f, "Could not open file {}", entry),
                ChecksumOutcome::ReadError => write!(f, "Could not read file {}", entry),
                ChecksumOutcome::Present => write!(f, "Verified {} of file {}", kind, entry),
                ChecksumOutcome::Mismatch => {
                    write!(f, "Verification of {} of file {} failed", kind, entry)
                }
                ChecksumOutcome::NotRecorded => write!(
                    f,
                    "An error has occurred: no {} recorded for file {}",
                    kind, entry
                ),
            },
            Event::Signed => f.write_str("Signed archive"),
            Event::SignatureConfirmed(kind) => write!(f, "Signature: {}", kind),
            Event::Compacted => f.write_str("Compacted archive"),
            Event::CompactFailed(reason) => write!(f, "Could not compact archive: {}", reason),
            Event::Closed => f.write_str("Closed archive"),
        }
    }
}

/// Receives pipeline events
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

/// Prints events to stdout, one per line
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: Event) {
        // A closed stdout must not abort the run
        let _ = writeln!(std::io::stdout().lock(), "{}", event);
    }
}
