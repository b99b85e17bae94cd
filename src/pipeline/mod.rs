//! Archive signing pipeline
//!
//! One run takes a target file through
//! resolve → acquire → insert → verify → sign → compact → close.
//! A target that is already a container skips insertion and verification.
//!
//! Once a container has been acquired it is closed before [`Pipeline::run`]
//! returns, whether the run succeeds or not.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mpq_signer::engine::NativeEngine;
//! use mpq_signer::pipeline::{ConsoleSink, Pipeline, PipelineOptions};
//! use std::path::Path;
//!
//! let pipeline = Pipeline::new(NativeEngine::new(), PipelineOptions::default());
//! let outcome = pipeline.run(Path::new("report.txt"), &mut ConsoleSink)?;
//! assert!(outcome.signature.is_valid());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod events;
pub mod finalizer;
pub mod inserter;
pub mod resolver;
pub mod signature;
pub mod verifier;

#[cfg(test)]
mod tests;

pub use events::{ConsoleSink, Event, EventSink};
pub use resolver::{Plan, Route};
pub use signature::Settlement;
pub use verifier::IntegrityReport;

use crate::core::{AddFlags, CreateParams, SignatureStatus};
use crate::engine::{Container, ContainerEngine};
use crate::error::PipelineResult;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Settings for a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Directory new containers are created in
    pub output_dir: PathBuf,
    pub create_params: CreateParams,
    pub add_flags: AddFlags,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            create_params: CreateParams::default(),
            add_flags: AddFlags::default(),
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub container: PathBuf,
    pub route: Route,
    /// Inserted entry, on the create route
    pub entry: Option<String>,
    pub entry_size: Option<u64>,
    pub integrity: Option<IntegrityReport>,
    /// Signature status after compaction
    pub signature: SignatureStatus,
    pub signed_now: bool,
    pub compacted: bool,
}

/// Drives one container through the signing stages
pub struct Pipeline<E: ContainerEngine> {
    engine: E,
    options: PipelineOptions,
}

impl<E: ContainerEngine> Pipeline<E> {
    pub fn new(engine: E, options: PipelineOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the pipeline on `target`
    pub fn run(&self, target: &Path, sink: &mut dyn EventSink) -> PipelineResult<Outcome> {
        let plan = resolver::resolve(target, &self.options.output_dir)?;
        let mut container =
            resolver::acquire(&self.engine, &plan, &self.options.create_params, sink)?;

        match self.process(target, &plan, &mut container, sink) {
            Ok(outcome) => {
                finalizer::close(container, sink)?;
                info!(
                    "{} finished with {:?}",
                    outcome.container.display(),
                    outcome.signature
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Err(close_err) = container.close() {
                    warn!(
                        "Could not close {} after a failed run: {}",
                        plan.container_path.display(),
                        close_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Every stage between acquisition and close
    fn process(
        &self,
        target: &Path,
        plan: &Plan,
        container: &mut E::Container,
        sink: &mut dyn EventSink,
    ) -> PipelineResult<Outcome> {
        let mut entry_size = None;
        let mut integrity = None;

        if let (Route::CreateAndInsert, Some(name)) = (plan.route, plan.entry_name.as_deref()) {
            entry_size =
                inserter::insert(container, target, name, self.options.add_flags, sink)?;
            integrity = Some(verifier::verify(container, name, sink));
        }

        let settlement = signature::settle(container, sink)?;
        let compacted = finalizer::compact(container, sink);
        let status = finalizer::confirm_signature(container)?;

        Ok(Outcome {
            container: plan.container_path.clone(),
            route: plan.route,
            entry: plan.entry_name.clone(),
            entry_size,
            integrity,
            signature: status,
            signed_now: settlement.signed_now,
            compacted,
        })
    }
}
