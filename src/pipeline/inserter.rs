//! Content insertion

use crate::core::AddFlags;
use crate::engine::Container;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::events::{Event, EventSink};
use std::path::Path;
use tracing::debug;

/// Insert the target under `name`
///
/// Returns the entry's size when it can be read back. The size is
/// informational only; failing to look it up does not fail the insert.
pub fn insert<C: Container>(
    container: &mut C,
    source: &Path,
    name: &str,
    flags: AddFlags,
    sink: &mut dyn EventSink,
) -> PipelineResult<Option<u64>> {
    container
        .add_file(source, name, flags)
        .map_err(|source| PipelineError::Insert {
            name: name.to_string(),
            source,
        })?;
    sink.emit(Event::Added(name.to_string()));

    match container.open_entry(name) {
        Ok(info) => {
            sink.emit(Event::EntrySize(info.size));
            Ok(Some(info.size))
        }
        Err(e) => {
            debug!("Could not reopen {} for its size: {}", name, e);
            Ok(None)
        }
    }
}
