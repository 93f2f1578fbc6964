//! Reconciler for a single filesystem node.
//!
//! This module is the invocation contract: it takes a desired state and a
//! mode, drives validation, probing, planning and execution, and folds
//! every result into an `Outcome` carrying an HTTP-style status.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigValidator, DesiredState, Settings};
use crate::error::{NodeStateError, Result};
use crate::planner::{ExecutionResult, Plan, PlanExecutor, Planner};
use crate::state::{Prober, TransactionLog};

/// Status class of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Changes were applied.
    Done,
    /// The node already matched.
    NoOp,
    /// A replace policy forbade the change.
    Rejected,
    /// A plan was computed but not applied.
    DryRun,
    /// The caller supplied invalid input.
    BadInput,
    /// The filesystem or environment failed.
    SystemError,
}

/// What a reconcile call does.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Plan and apply.
    Apply,
    /// Plan only.
    DryRun,
    /// Replay a log returned as `undo_data`.
    Undo(TransactionLog),
    /// Replay a log returned as `redo_data`.
    Redo(TransactionLog),
}

/// Compensating steps returned with a successful outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Steps that undo a forward or redo transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_data: Option<TransactionLog>,
    /// Steps that redo an undone transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redo_data: Option<TransactionLog>,
}

/// Result of a reconcile call.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// Status class.
    pub status: Status,
    /// Numeric status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Compensating steps, if any.
    pub metadata: Metadata,
}

/// Reconciler for a single node.
#[derive(Debug)]
pub struct Reconciler<'a> {
    /// Engine settings.
    settings: &'a Settings,
    /// Desired state validator.
    validator: ConfigValidator,
    /// Observed state prober.
    prober: Prober,
    /// Step planner.
    planner: Planner,
}

impl Status {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Done | Self::DryRun => 200,
            Self::NoOp => 304,
            Self::BadInput => 400,
            Self::Rejected => 412,
            Self::SystemError => 500,
        }
    }

    /// Returns true for 2xx and 3xx statuses.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.code() < 400
    }
}

impl Mode {
    /// Returns true if the call mutates nothing.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl Outcome {
    /// Creates an outcome with empty metadata.
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            code: status.code(),
            message: message.into(),
            metadata: Metadata::default(),
        }
    }

    /// Creates a failed outcome from an error.
    #[must_use]
    pub fn from_error(error: &NodeStateError) -> Self {
        Self::new(error.status(), error.to_string())
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns true for 2xx and 3xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            validator: ConfigValidator::new(),
            prober: Prober::new(),
            planner: Planner::new(),
        }
    }

    /// Reconciles a node and reports the outcome.
    ///
    /// Undo and redo replay the supplied log without probing or planning.
    #[must_use]
    pub fn reconcile(&self, desired: &DesiredState, mode: &Mode) -> Outcome {
        info!("Reconciling {}", desired.path.display());

        let plan = match mode {
            Mode::Apply | Mode::DryRun => self.plan(desired),
            Mode::Undo(log) | Mode::Redo(log) => self.replay(desired, log),
        };

        match plan {
            Ok(plan) => self.execute(&plan, mode),
            Err(e) => {
                warn!("Reconcile of {} failed before execution: {}", desired.path.display(), e);
                Outcome::from_error(&e)
            }
        }
    }

    /// Validates, probes and plans without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid input, a forbidden replacement, or a
    /// failed probe.
    pub fn plan(&self, desired: &DesiredState) -> Result<Plan> {
        let validation = self.validator.validate(desired)?;
        for warning in &validation.warnings {
            warn!("{}", warning);
        }

        let observed = self.prober.probe(&desired.path, desired.allow_symlink)?;
        debug!("Observed {}: {}", desired.path.display(), observed);

        let plan = self.planner.plan(desired, &observed)?;
        debug!("Planned {} steps for {}", plan.step_count(), desired.path.display());
        Ok(plan)
    }

    /// Executes a plan under `mode` and reports the outcome.
    #[must_use]
    pub fn execute(&self, plan: &Plan, mode: &Mode) -> Outcome {
        let path = plan.path.display();
        let executor = PlanExecutor::new(self.settings).with_dry_run(mode.is_dry_run());

        match executor.execute(plan) {
            ExecutionResult::NoOp => Outcome::new(Status::NoOp, format!("{path} is already in the desired state")),
            ExecutionResult::DryRun { steps } => {
                Outcome::new(Status::DryRun, format!("{steps} steps planned for {path}"))
            }
            ExecutionResult::Completed {
                undo,
                applied,
                skipped,
            } => {
                let message = if skipped > 0 {
                    format!("Applied {applied} steps to {path}, {skipped} skipped because content changed")
                } else {
                    format!("Applied {applied} steps to {path}")
                };
                let metadata = if matches!(mode, Mode::Undo(_)) {
                    Metadata {
                        undo_data: None,
                        redo_data: Some(undo),
                    }
                } else {
                    Metadata {
                        undo_data: Some(undo),
                        redo_data: None,
                    }
                };
                Outcome::new(Status::Done, message).with_metadata(metadata)
            }
            ExecutionResult::RolledBack {
                error,
                failed_step,
                reverted,
            } => {
                warn!("Step {failed_step} on {path} failed; reverted {reverted} steps");
                Outcome::new(error.status(), format!("{error}; changes rolled back"))
            }
        }
    }

    fn replay(&self, desired: &DesiredState, log: &TransactionLog) -> Result<Plan> {
        self.validator.validate_path(desired)?;
        debug!("Replaying {} logged steps on {}", log.len(), desired.path.display());
        Ok(Plan::new(desired.path.clone(), log.steps().to_vec()))
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Done => "done",
            Self::NoOp => "no-op",
            Self::Rejected => "rejected",
            Self::DryRun => "dry-run",
            Self::BadInput => "bad input",
            Self::SystemError => "system error",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentPolicy, NodeKind, Presence};
    use crate::planner::Step;
    use crate::state::ContentHasher;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().expect("Failed to create temp dir");
            let settings = Settings::new(temp.path().join("scratch"));
            Self { temp, settings }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.temp.path().join(name)
        }

        fn reconcile(&self, desired: &DesiredState, mode: &Mode) -> Outcome {
            Reconciler::new(&self.settings).reconcile(desired, mode)
        }
    }

    fn mode_of(path: &std::path::Path) -> u32 {
        use std::os::unix::fs::MetadataExt;
        fs::metadata(path).expect("stat failed").mode() & 0o7777
    }

    fn abc() -> ContentPolicy {
        ContentPolicy::generated(|_: Option<&[u8]>| b"abc".to_vec())
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Done.code(), 200);
        assert_eq!(Status::NoOp.code(), 304);
        assert_eq!(Status::Rejected.code(), 412);
        assert_eq!(Status::DryRun.code(), 200);
        assert_eq!(Status::BadInput.code(), 400);
        assert_eq!(Status::SystemError.code(), 500);
        assert!(Status::NoOp.is_success());
        assert!(!Status::Rejected.is_success());
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = Outcome::new(Status::NoOp, "nothing");
        let json = serde_json::to_value(&outcome).expect("serialize failed");
        assert_eq!(json["status"], "no_op");
        assert_eq!(json["code"], 304);
        assert_eq!(json["metadata"], serde_json::json!({}));
    }

    #[test]
    fn test_create_then_undo_then_redo() {
        let fx = Fixture::new();
        let path = fx.path("x");
        let desired = DesiredState::file(&path).with_content(abc());

        let done = fx.reconcile(&desired, &Mode::Apply);
        assert_eq!(done.status, Status::Done, "{}", done.message);
        assert_eq!(done.code, 200);
        assert_eq!(fs::read(&path).expect("read failed"), b"abc");
        let undo = done.metadata.undo_data.expect("missing undo data");
        assert_eq!(
            undo.steps(),
            [Step::RemoveFile {
                expected_hash: ContentHasher::new().hash_bytes(b"abc")
            }]
        );

        let undone = fx.reconcile(&desired, &Mode::Undo(undo));
        assert_eq!(undone.status, Status::Done, "{}", undone.message);
        assert!(fs::symlink_metadata(&path).is_err());
        assert!(undone.metadata.undo_data.is_none());
        let redo = undone.metadata.redo_data.expect("missing redo data");

        let redone = fx.reconcile(&desired, &Mode::Redo(redo));
        assert_eq!(redone.status, Status::Done, "{}", redone.message);
        assert_eq!(fs::read(&path).expect("read failed"), b"abc");
        assert!(redone.metadata.undo_data.is_some());
    }

    #[test]
    fn test_second_run_is_noop() {
        let fx = Fixture::new();
        let desired = DesiredState::file(fx.path("x")).with_content(abc()).with_mode("0640");

        assert_eq!(fx.reconcile(&desired, &Mode::Apply).status, Status::Done);
        let again = fx.reconcile(&desired, &Mode::Apply);
        assert_eq!(again.status, Status::NoOp);
        assert_eq!(again.code, 304);
        assert_eq!(again.metadata, Metadata::default());
    }

    #[test]
    fn test_undo_restores_content_and_mode() {
        let fx = Fixture::new();
        let path = fx.path("x");
        fs::write(&path, b"old").expect("write failed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod failed");

        let desired = DesiredState::file(&path)
            .with_content(ContentPolicy::exact("new"))
            .with_mode("0600");
        let done = fx.reconcile(&desired, &Mode::Apply);
        assert_eq!(done.status, Status::Done, "{}", done.message);
        assert_eq!(fs::read(&path).expect("read failed"), b"new");
        assert_eq!(mode_of(&path), 0o600);

        let undo = done.metadata.undo_data.expect("missing undo data");
        assert_eq!(fx.reconcile(&desired, &Mode::Undo(undo)).status, Status::Done);
        assert_eq!(fs::read(&path).expect("read failed"), b"old");
        assert_eq!(mode_of(&path), 0o644);
    }

    #[test]
    fn test_undo_refuses_to_delete_changed_file() {
        let fx = Fixture::new();
        let path = fx.path("x");
        let desired = DesiredState::file(&path).with_content(abc());

        let done = fx.reconcile(&desired, &Mode::Apply);
        let undo = done.metadata.undo_data.expect("missing undo data");
        fs::write(&path, b"edited by someone else").expect("write failed");

        let undone = fx.reconcile(&desired, &Mode::Undo(undo));
        assert_eq!(undone.status, Status::Done);
        assert!(undone.message.contains("skipped"));
        assert_eq!(fs::read(&path).expect("read failed"), b"edited by someone else");
    }

    #[test]
    fn test_directory_blocks_file_without_replace() {
        let fx = Fixture::new();
        let path = fx.path("node");
        fs::create_dir(&path).expect("mkdir failed");
        fs::write(path.join("inner"), b"inner").expect("write failed");

        let outcome = fx.reconcile(&DesiredState::file(&path), &Mode::Apply);
        assert_eq!(outcome.status, Status::Rejected);
        assert_eq!(outcome.code, 412);
        assert!(path.is_dir());
        assert_eq!(fs::read(path.join("inner")).expect("read failed"), b"inner");
    }

    #[test]
    fn test_replace_directory_and_undo() {
        let fx = Fixture::new();
        let path = fx.path("node");
        fs::create_dir(&path).expect("mkdir failed");
        fs::write(path.join("inner"), b"inner").expect("write failed");

        let mut desired = DesiredState::file(&path).with_content(abc());
        desired.replace.directory = true;

        let done = fx.reconcile(&desired, &Mode::Apply);
        assert_eq!(done.status, Status::Done, "{}", done.message);
        assert!(path.is_file());

        let undo = done.metadata.undo_data.expect("missing undo data");
        assert_eq!(fx.reconcile(&desired, &Mode::Undo(undo)).status, Status::Done);
        assert!(path.is_dir());
        assert_eq!(fs::read(path.join("inner")).expect("read failed"), b"inner");
    }

    #[test]
    fn test_dry_run_mutates_nothing() {
        let fx = Fixture::new();
        let path = fx.path("dir");
        let desired = DesiredState::directory(&path);

        let outcome = fx.reconcile(&desired, &Mode::DryRun);
        assert_eq!(outcome.status, Status::DryRun);
        assert_eq!(outcome.code, 200);
        assert!(!path.exists());
        assert!(!fx.settings.scratch_dir.exists());
    }

    #[test]
    fn test_absent_directory_is_retained() {
        let fx = Fixture::new();
        let path = fx.path("tree");
        fs::create_dir(&path).expect("mkdir failed");
        fs::write(path.join("leaf"), b"leaf").expect("write failed");

        let desired = DesiredState::new(&path).with_presence(Presence::Absent);
        let done = fx.reconcile(&desired, &Mode::Apply);
        assert_eq!(done.status, Status::Done, "{}", done.message);
        assert!(!path.exists());

        assert_eq!(fx.reconcile(&desired, &Mode::Apply).status, Status::NoOp);

        let undo = done.metadata.undo_data.expect("missing undo data");
        assert_eq!(fx.reconcile(&desired, &Mode::Undo(undo)).status, Status::Done);
        assert_eq!(fs::read(path.join("leaf")).expect("read failed"), b"leaf");
    }

    #[test]
    fn test_absent_clears_dangling_symlink_when_following() {
        let fx = Fixture::new();
        let link = fx.path("link");
        std::os::unix::fs::symlink(fx.path("gone"), &link).expect("symlink failed");

        let desired = DesiredState::new(&link)
            .with_presence(Presence::Absent)
            .with_allow_symlink(true);
        let done = fx.reconcile(&desired, &Mode::Apply);
        assert_eq!(done.status, Status::Done, "{}", done.message);
        assert!(fs::symlink_metadata(&link).is_err());
        assert_eq!(fx.reconcile(&desired, &Mode::Apply).status, Status::NoOp);

        let undo = done.metadata.undo_data.expect("missing undo data");
        assert_eq!(fx.reconcile(&desired, &Mode::Undo(undo)).status, Status::Done);
        assert_eq!(fs::read_link(&link).expect("readlink failed"), fx.path("gone"));
    }

    #[test]
    fn test_relative_path_is_bad_input() {
        let fx = Fixture::new();
        let outcome = fx.reconcile(&DesiredState::new("relative/path"), &Mode::Apply);
        assert_eq!(outcome.status, Status::BadInput);
        assert_eq!(outcome.code, 400);

        let replay = fx.reconcile(
            &DesiredState::new("relative/path"),
            &Mode::Undo(TransactionLog::new(vec![Step::RemoveDir])),
        );
        assert_eq!(replay.status, Status::BadInput);
    }

    #[test]
    fn test_bad_mode_is_bad_input() {
        let fx = Fixture::new();
        let desired = DesiredState::new(fx.path("x")).with_mode("u+q");
        assert_eq!(fx.reconcile(&desired, &Mode::Apply).status, Status::BadInput);
    }

    #[test]
    fn test_create_directory_with_mode() {
        let fx = Fixture::new();
        let path = fx.path("dir");
        let desired = DesiredState::directory(&path).with_mode("u=rwx,go=");

        let done = fx.reconcile(&desired, &Mode::Apply);
        assert_eq!(done.status, Status::Done, "{}", done.message);
        assert!(path.is_dir());
        assert_eq!(mode_of(&path), 0o700);
        assert_eq!(
            done.metadata.undo_data.expect("missing undo data").steps(),
            [Step::RemoveDir]
        );
        assert_eq!(desired.kind, NodeKind::Directory);
    }

    #[test]
    fn test_failed_step_rolls_back_and_reports() {
        let fx = Fixture::new();
        let path = fx.path("x");
        fs::write(&path, b"keep").expect("write failed");
        let plan = Plan::new(
            &path,
            vec![
                Step::SetContent { content: b"lost".to_vec() },
                Step::create(NodeKind::File),
            ],
        );

        let outcome = Reconciler::new(&fx.settings).execute(&plan, &Mode::Apply);
        assert_eq!(outcome.status, Status::SystemError);
        assert!(outcome.message.ends_with("changes rolled back"));
        assert_eq!(fs::read(&path).expect("read failed"), b"keep");
    }
}
