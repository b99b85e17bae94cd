//! Integrity verification
//!
//! Checks every checksum kind of the inserted entry. Outcomes are advisory:
//! all of them are reported and none stops the pipeline.

use crate::core::{ChecksumKind, ChecksumOutcome};
use crate::engine::Container;
use crate::pipeline::events::{Event, EventSink};
use tracing::warn;

/// Per-checksum outcomes for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub entry: String,
    pub checks: Vec<(ChecksumKind, ChecksumOutcome)>,
}

impl IntegrityReport {
    /// Every checksum kind was recorded and matched
    pub fn all_present(&self) -> bool {
        self.checks
            .iter()
            .all(|(_, outcome)| *outcome == ChecksumOutcome::Present)
    }

    pub fn outcome(&self, kind: ChecksumKind) -> Option<ChecksumOutcome> {
        self.checks
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| *outcome)
    }
}

/// Verify sector CRC, CRC32 and MD5 of `entry`
pub fn verify<C: Container>(
    container: &mut C,
    entry: &str,
    sink: &mut dyn EventSink,
) -> IntegrityReport {
    let checks = ChecksumKind::ALL
        .iter()
        .map(|&kind| {
            let outcome = container.verify_entry(entry, kind);
            if outcome != ChecksumOutcome::Present {
                warn!("{} check of {}: {:?}", kind, entry, outcome);
            }
            sink.emit(Event::Checksum {
                entry: entry.to_string(),
                kind,
                outcome,
            });
            (kind, outcome)
        })
        .collect();

    IntegrityReport {
        entry: entry.to_string(),
        checks,
    }
}
