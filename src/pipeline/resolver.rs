//! Container resolution
//!
//! Decides once, up front, whether the target is packed into a new
//! container or is itself the container to sign.

use crate::core::validation::{container_path_for, entry_name_for, has_container_extension};
use crate::core::{AccessMode, CreateParams};
use crate::engine::ContainerEngine;
use crate::error::{InputError, PipelineError, PipelineResult};
use crate::pipeline::events::{Event, EventSink};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which stages a run goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Create a container, insert the target, verify it, then sign
    CreateAndInsert,
    /// The target is a container; go straight to the signature stage
    SignExisting,
}

/// Resolved plan for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub route: Route,
    pub container_path: PathBuf,
    /// Logical name of the inserted entry, on the create route
    pub entry_name: Option<String>,
}

/// Check the target and work out the route
///
/// Nothing is created or opened here.
pub fn resolve(target: &Path, output_dir: &Path) -> PipelineResult<Plan> {
    let metadata = std::fs::metadata(target)
        .map_err(|_| InputError::NotFound(target.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(InputError::NotRegularFile(target.to_path_buf()).into());
    }

    if has_container_extension(target) {
        return Ok(Plan {
            route: Route::SignExisting,
            container_path: target.to_path_buf(),
            entry_name: None,
        });
    }

    let invalid = |source| InputError::InvalidName {
        path: target.to_path_buf(),
        source,
    };
    let entry_name = entry_name_for(target).map_err(invalid)?;
    let container_path = container_path_for(target, output_dir).map_err(invalid)?;

    debug!(
        "{} will be packed into {}",
        target.display(),
        container_path.display()
    );

    Ok(Plan {
        route: Route::CreateAndInsert,
        container_path,
        entry_name: Some(entry_name),
    })
}

/// Create or open the plan's container
pub fn acquire<E: ContainerEngine>(
    engine: &E,
    plan: &Plan,
    params: &CreateParams,
    sink: &mut dyn EventSink,
) -> PipelineResult<E::Container> {
    let path = &plan.container_path;

    match plan.route {
        Route::CreateAndInsert => {
            let container =
                engine
                    .create(path, params)
                    .map_err(|source| PipelineError::ContainerCreate {
                        path: path.clone(),
                        source,
                    })?;
            sink.emit(Event::Created(path.clone()));
            Ok(container)
        }
        Route::SignExisting => {
            let container = engine.open(path, AccessMode::ReadWrite).map_err(|source| {
                PipelineError::ContainerOpen {
                    path: path.clone(),
                    source,
                }
            })?;
            sink.emit(Event::Opened(path.clone()));
            Ok(container)
        }
    }
}
