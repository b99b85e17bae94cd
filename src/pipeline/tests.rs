//! Pipeline tests against a scripted engine
//!
//! The scripted engine records every call in a shared log so the tests can
//! assert on stage order and on close-on-all-paths.

use super::*;
use crate::core::{
    AccessMode, ArchiveError, ChecksumKind, ChecksumOutcome, EntryInfo, Result, SignatureKind,
};
use crate::error::{InputError, PipelineError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tempfile::TempDir;

type CallLog = Rc<RefCell<Vec<&'static str>>>;

#[derive(Debug, Clone)]
struct Script {
    create_fails: bool,
    open_fails: bool,
    add_fails: bool,
    open_entry_fails: bool,
    checksum: ChecksumOutcome,
    /// Answers to successive status queries; once exhausted the container
    /// reports `WeakValid` if it was signed and `NoSignature` otherwise
    statuses: Vec<SignatureStatus>,
    sign_fails: bool,
    compact_fails: bool,
    close_fails: bool,
}

impl Default for Script {
    fn default() -> Self {
        Script {
            create_fails: false,
            open_fails: false,
            add_fails: false,
            open_entry_fails: false,
            checksum: ChecksumOutcome::Present,
            statuses: Vec::new(),
            sign_fails: false,
            compact_fails: false,
            close_fails: false,
        }
    }
}

struct ScriptedEngine {
    script: Script,
    log: CallLog,
}

struct ScriptedContainer {
    path: PathBuf,
    script: Script,
    statuses: VecDeque<SignatureStatus>,
    signed: bool,
    log: CallLog,
}

impl ScriptedEngine {
    fn new(script: Script) -> (Self, CallLog) {
        let log = CallLog::default();
        (
            ScriptedEngine {
                script,
                log: log.clone(),
            },
            log,
        )
    }

    fn container(&self, path: &Path) -> ScriptedContainer {
        ScriptedContainer {
            path: path.to_path_buf(),
            script: self.script.clone(),
            statuses: self.script.statuses.iter().copied().collect(),
            signed: false,
            log: self.log.clone(),
        }
    }
}

fn scripted_failure() -> ArchiveError {
    ArchiveError::Corrupt("scripted failure".to_string())
}

impl ContainerEngine for ScriptedEngine {
    type Container = ScriptedContainer;

    fn create(&self, path: &Path, _params: &CreateParams) -> Result<ScriptedContainer> {
        self.log.borrow_mut().push("create");
        if self.script.create_fails {
            return Err(scripted_failure());
        }
        Ok(self.container(path))
    }

    fn open(&self, path: &Path, mode: AccessMode) -> Result<ScriptedContainer> {
        assert_eq!(mode, AccessMode::ReadWrite);
        self.log.borrow_mut().push("open");
        if self.script.open_fails {
            return Err(scripted_failure());
        }
        Ok(self.container(path))
    }
}

impl Container for ScriptedContainer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn add_file(&mut self, _source: &Path, _name: &str, _flags: AddFlags) -> Result<()> {
        self.log.borrow_mut().push("add");
        if self.script.add_fails {
            return Err(scripted_failure());
        }
        Ok(())
    }

    fn open_entry(&mut self, name: &str) -> Result<EntryInfo> {
        self.log.borrow_mut().push("open_entry");
        if self.script.open_entry_fails {
            return Err(ArchiveError::FileNotFound(name.to_string()));
        }
        Ok(EntryInfo {
            name: name.to_string(),
            size: 10,
            stored_size: 32,
            compressed: true,
            sector_crc: true,
        })
    }

    fn verify_entry(&mut self, _name: &str, _kind: ChecksumKind) -> ChecksumOutcome {
        self.log.borrow_mut().push("verify");
        self.script.checksum
    }

    fn signature_status(&mut self) -> SignatureStatus {
        self.log.borrow_mut().push("status");
        self.statuses.pop_front().unwrap_or(if self.signed {
            SignatureStatus::WeakValid
        } else {
            SignatureStatus::NoSignature
        })
    }

    fn sign(&mut self, kind: SignatureKind) -> Result<()> {
        assert_eq!(kind, SignatureKind::Weak);
        self.log.borrow_mut().push("sign");
        if self.script.sign_fails {
            return Err(scripted_failure());
        }
        self.signed = true;
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        self.log.borrow_mut().push("compact");
        if self.script.compact_fails {
            return Err(scripted_failure());
        }
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.log.borrow_mut().push("close");
        if self.script.close_fails {
            return Err(scripted_failure());
        }
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    target: PathBuf,
}

impl Fixture {
    fn with_target(name: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join(name);
        std::fs::write(&target, b"0123456789").unwrap();
        Fixture { dir, target }
    }

    fn run(&self, script: Script) -> (PipelineResult<Outcome>, Vec<Event>, Vec<&'static str>) {
        let (engine, log) = ScriptedEngine::new(script);
        let options = PipelineOptions {
            output_dir: self.dir.path().to_path_buf(),
            ..PipelineOptions::default()
        };
        let pipeline = Pipeline::new(engine, options);

        let mut events = Vec::new();
        let result = pipeline.run(&self.target, &mut events);
        let calls = log.borrow().clone();
        (result, events, calls)
    }
}

fn existing_with(statuses: Vec<SignatureStatus>) -> Script {
    Script {
        statuses,
        ..Script::default()
    }
}

#[test]
fn test_create_route_signs_new_container() {
    let fixture = Fixture::with_target("report.txt");
    let (result, events, calls) = fixture.run(Script::default());
    let outcome = result.unwrap();

    assert_eq!(
        calls,
        vec![
            "create",
            "add",
            "open_entry",
            "verify",
            "verify",
            "verify",
            "status",
            "sign",
            "compact",
            "status",
            "close"
        ]
    );

    let container = fixture.dir.path().join("report.mpq");
    let entry = fixture.target.to_str().unwrap().to_string();
    assert_eq!(outcome.container, container);
    assert_eq!(outcome.route, Route::CreateAndInsert);
    assert_eq!(outcome.entry.as_deref(), Some(entry.as_str()));
    assert_eq!(outcome.entry_size, Some(10));
    assert!(outcome.integrity.as_ref().unwrap().all_present());
    assert_eq!(outcome.signature, SignatureStatus::WeakValid);
    assert!(outcome.signed_now);
    assert!(outcome.compacted);

    assert_eq!(events.first(), Some(&Event::Created(container)));
    assert_eq!(events[1], Event::Added(entry));
    assert_eq!(events[2], Event::EntrySize(10));
    assert!(events.contains(&Event::Signed));
    assert!(events.contains(&Event::SignatureConfirmed(SignatureKind::Weak)));
    assert!(events.contains(&Event::Compacted));
    assert_eq!(events.last(), Some(&Event::Closed));
}

#[test]
fn test_existing_weak_signature_is_not_resigned() {
    let fixture = Fixture::with_target("archive.mpq");
    let (result, events, calls) = fixture.run(existing_with(vec![
        SignatureStatus::WeakValid,
        SignatureStatus::WeakValid,
    ]));
    let outcome = result.unwrap();

    assert_eq!(calls, vec!["open", "status", "compact", "status", "close"]);
    assert_eq!(outcome.route, Route::SignExisting);
    assert_eq!(outcome.container, fixture.target);
    assert!(outcome.entry.is_none());
    assert!(outcome.integrity.is_none());
    assert!(!outcome.signed_now);
    assert_eq!(events[0], Event::Opened(fixture.target.clone()));
    assert!(!events.contains(&Event::Signed));
}

#[test]
fn test_existing_unsigned_container_is_signed() {
    let fixture = Fixture::with_target("archive.mpq");
    let (result, _, calls) = fixture.run(Script::default());

    assert!(result.unwrap().signed_now);
    assert_eq!(
        calls,
        vec!["open", "status", "sign", "compact", "status", "close"]
    );
}

#[test]
fn test_strong_signature_is_confirmed() {
    let fixture = Fixture::with_target("archive.mpq");
    let (result, events, calls) = fixture.run(existing_with(vec![
        SignatureStatus::StrongValid,
        SignatureStatus::StrongValid,
    ]));

    assert_eq!(result.unwrap().signature, SignatureStatus::StrongValid);
    assert!(!calls.contains(&"sign"));
    assert!(events.contains(&Event::SignatureConfirmed(SignatureKind::Strong)));
}

#[test]
fn test_bad_signature_states_are_fatal_and_close() {
    let cases = [
        SignatureStatus::VerifyFailed,
        SignatureStatus::WeakInvalid,
        SignatureStatus::StrongInvalid,
        SignatureStatus::Unknown,
    ];

    for status in cases {
        let fixture = Fixture::with_target("archive.mpq");
        let (result, events, calls) = fixture.run(existing_with(vec![status]));
        let err = result.unwrap_err();

        match status {
            SignatureStatus::VerifyFailed => {
                assert!(matches!(err, PipelineError::VerifyFailed { .. }))
            }
            SignatureStatus::WeakInvalid => assert!(matches!(
                err,
                PipelineError::SignatureInvalid {
                    kind: SignatureKind::Weak,
                    ..
                }
            )),
            SignatureStatus::StrongInvalid => assert!(matches!(
                err,
                PipelineError::SignatureInvalid {
                    kind: SignatureKind::Strong,
                    ..
                }
            )),
            _ => assert!(matches!(err, PipelineError::UnknownSignature { .. })),
        }

        assert_eq!(calls, vec!["open", "status", "close"], "{:?}", status);
        assert!(!events.contains(&Event::Closed));
    }
}

#[test]
fn test_sign_failure_is_fatal() {
    let fixture = Fixture::with_target("report.txt");
    let (result, _, calls) = fixture.run(Script {
        sign_fails: true,
        ..Script::default()
    });

    assert!(matches!(result.unwrap_err(), PipelineError::Sign { .. }));
    assert!(!calls.contains(&"compact"));
    assert_eq!(calls.last(), Some(&"close"));
}

#[test]
fn test_insert_failure_is_fatal() {
    let fixture = Fixture::with_target("report.txt");
    let (result, events, calls) = fixture.run(Script {
        add_fails: true,
        ..Script::default()
    });

    assert!(matches!(result.unwrap_err(), PipelineError::Insert { .. }));
    assert_eq!(calls, vec!["create", "add", "close"]);
    assert_eq!(events.len(), 1);
}

#[test]
fn test_create_failure_touches_nothing_else() {
    let fixture = Fixture::with_target("report.txt");
    let (result, events, calls) = fixture.run(Script {
        create_fails: true,
        ..Script::default()
    });

    assert!(matches!(
        result.unwrap_err(),
        PipelineError::ContainerCreate { .. }
    ));
    assert_eq!(calls, vec!["create"]);
    assert!(events.is_empty());
}

#[test]
fn test_open_failure_is_fatal() {
    let fixture = Fixture::with_target("archive.mpq");
    let (result, _, calls) = fixture.run(Script {
        open_fails: true,
        ..Script::default()
    });

    assert!(matches!(
        result.unwrap_err(),
        PipelineError::ContainerOpen { .. }
    ));
    assert_eq!(calls, vec!["open"]);
}

#[test]
fn test_compaction_failure_is_not_fatal() {
    let fixture = Fixture::with_target("report.txt");
    let (result, events, calls) = fixture.run(Script {
        compact_fails: true,
        ..Script::default()
    });
    let outcome = result.unwrap();

    assert!(!outcome.compacted);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::CompactFailed(_))));
    assert_eq!(calls.last(), Some(&"close"));
}

#[test]
fn test_close_failure_is_fatal() {
    let fixture = Fixture::with_target("report.txt");
    let (result, events, _) = fixture.run(Script {
        close_fails: true,
        ..Script::default()
    });

    assert!(matches!(
        result.unwrap_err(),
        PipelineError::ContainerClose { .. }
    ));
    assert!(events.contains(&Event::Compacted));
    assert!(!events.contains(&Event::Closed));
}

#[test]
fn test_stage_error_wins_over_close_error() {
    let fixture = Fixture::with_target("archive.mpq");
    let (result, _, calls) = fixture.run(Script {
        statuses: vec![SignatureStatus::WeakInvalid],
        close_fails: true,
        ..Script::default()
    });

    assert!(matches!(
        result.unwrap_err(),
        PipelineError::SignatureInvalid { .. }
    ));
    assert_eq!(calls.last(), Some(&"close"));
}

#[test]
fn test_signature_lost_in_compaction_is_fatal() {
    let fixture = Fixture::with_target("report.txt");
    let (result, _, calls) = fixture.run(existing_with(vec![
        SignatureStatus::NoSignature,
        SignatureStatus::WeakInvalid,
    ]));

    assert!(matches!(
        result.unwrap_err(),
        PipelineError::SignatureInvalidatedByCompaction {
            status: SignatureStatus::WeakInvalid,
            ..
        }
    ));
    assert_eq!(&calls[calls.len() - 3..], &["compact", "status", "close"]);
}

#[test]
fn test_checksum_mismatch_is_advisory() {
    let fixture = Fixture::with_target("report.txt");
    let (result, events, _) = fixture.run(Script {
        checksum: ChecksumOutcome::Mismatch,
        ..Script::default()
    });
    let outcome = result.unwrap();

    let report = outcome.integrity.unwrap();
    assert!(!report.all_present());
    assert_eq!(
        report.outcome(ChecksumKind::FileMd5),
        Some(ChecksumOutcome::Mismatch)
    );
    let mismatches = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                Event::Checksum {
                    outcome: ChecksumOutcome::Mismatch,
                    ..
                }
            )
        })
        .count();
    assert_eq!(mismatches, 3);
}

#[test]
fn test_entry_size_lookup_failure_is_ignored() {
    let fixture = Fixture::with_target("report.txt");
    let (result, events, _) = fixture.run(Script {
        open_entry_fails: true,
        ..Script::default()
    });

    assert_eq!(result.unwrap().entry_size, None);
    assert!(!events.iter().any(|e| matches!(e, Event::EntrySize(_))));
}

#[test]
fn test_missing_target_touches_no_container() {
    let dir = TempDir::new().unwrap();
    let (engine, log) = ScriptedEngine::new(Script::default());
    let pipeline = Pipeline::new(engine, PipelineOptions::default());

    let mut events = Vec::new();
    let err = pipeline
        .run(&dir.path().join("missing.txt"), &mut events)
        .unwrap_err();

    assert!(matches!(err, PipelineError::Input(InputError::NotFound(_))));
    assert!(log.borrow().is_empty());
    assert!(events.is_empty());
}
