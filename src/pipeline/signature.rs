//! Signature state machine
//!
//! | Status         | Action                          |
//! |----------------|---------------------------------|
//! | `NoSignature`  | sign weak, report               |
//! | `WeakValid`    | confirm, no re-signing          |
//! | `StrongValid`  | confirm                         |
//! | `VerifyFailed` | fatal                           |
//! | `WeakInvalid`  | fatal                           |
//! | `StrongInvalid`| fatal                           |
//! | `Unknown`      | fatal                           |

use crate::core::{SignatureKind, SignatureStatus};
use crate::engine::Container;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::events::{Event, EventSink};
use tracing::info;

/// Result of the signature stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Status the container ended the stage with
    pub status: SignatureStatus,
    /// Whether this run produced the signature
    pub signed_now: bool,
}

/// Bring the container to a valid signature, or fail
pub fn settle<C: Container>(
    container: &mut C,
    sink: &mut dyn EventSink,
) -> PipelineResult<Settlement> {
    let path = container.path().to_path_buf();
    let status = container.signature_status();
    info!("Signature status of {}: {:?}", path.display(), status);

    match status {
        SignatureStatus::NoSignature => {
            container
                .sign(SignatureKind::Weak)
                .map_err(|source| PipelineError::Sign {
                    path: path.clone(),
                    source,
                })?;
            sink.emit(Event::Signed);
            sink.emit(Event::SignatureConfirmed(SignatureKind::Weak));
            Ok(Settlement {
                status: SignatureStatus::WeakValid,
                signed_now: true,
            })
        }
        SignatureStatus::WeakValid | SignatureStatus::StrongValid => {
            sink.emit(Event::SignatureConfirmed(kind_of(status)));
            Ok(Settlement {
                status,
                signed_now: false,
            })
        }
        SignatureStatus::VerifyFailed => Err(PipelineError::VerifyFailed { path }),
        SignatureStatus::WeakInvalid => Err(PipelineError::SignatureInvalid {
            path,
            kind: SignatureKind::Weak,
        }),
        SignatureStatus::StrongInvalid => Err(PipelineError::SignatureInvalid {
            path,
            kind: SignatureKind::Strong,
        }),
        SignatureStatus::Unknown => Err(PipelineError::UnknownSignature { path }),
    }
}

fn kind_of(status: SignatureStatus) -> SignatureKind {
    match status {
        SignatureStatus::StrongValid | SignatureStatus::StrongInvalid => SignatureKind::Strong,
        _ => SignatureKind::Weak,
    }
}
