//! Compaction and close

use crate::core::SignatureStatus;
use crate::engine::Container;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::events::{Event, EventSink};
use tracing::warn;

/// Compact the container; failure is reported and otherwise ignored
pub fn compact<C: Container>(container: &mut C, sink: &mut dyn EventSink) -> bool {
    match container.compact() {
        Ok(()) => {
            sink.emit(Event::Compacted);
            true
        }
        Err(e) => {
            warn!("Compaction of {} failed: {}", container.path().display(), e);
            sink.emit(Event::CompactFailed(e.to_string()));
            false
        }
    }
}

/// Fail unless the container still carries a valid signature
pub fn confirm_signature<C: Container>(container: &mut C) -> PipelineResult<SignatureStatus> {
    let status = container.signature_status();
    if status.is_valid() {
        Ok(status)
    } else {
        Err(PipelineError::SignatureInvalidatedByCompaction {
            path: container.path().to_path_buf(),
            status,
        })
    }
}

/// Close the container; failure is fatal
pub fn close<C: Container>(container: C, sink: &mut dyn EventSink) -> PipelineResult<()> {
    let path = container.path().to_path_buf();
    container
        .close()
        .map_err(|source| PipelineError::ContainerClose { path, source })?;
    sink.emit(Event::Closed);
    Ok(())
}
