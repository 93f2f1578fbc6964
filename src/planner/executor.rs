//! Plan executor for applying steps to the filesystem.
//!
//! Every step is applied by one interpreter that returns the step's
//! compensator. Forward execution folds over the plan and prepends each
//! compensator, so the collected list is already in undo order. When a
//! step fails, that list replaces the plan and is folded by the same
//! interpreter. A failure during that pass aborts the process: the node
//! then matches neither the target nor the original state.

use std::fs::{self, Metadata, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::unistd::{chown, Gid, Uid};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{NodeKind, Settings};
use crate::error::{FsError, NodeStateError, Result};
use crate::state::{sync_parent_dir, ContentHasher, ScratchDir, TransactionLog};

use super::plan::{Plan, Step};

/// Executor for plans.
#[derive(Debug)]
pub struct PlanExecutor<'a> {
    /// Engine settings.
    settings: &'a Settings,
    /// Retention directory.
    scratch: ScratchDir,
    /// Hasher for guarded deletes.
    hasher: ContentHasher,
    /// Stop before any mutation.
    dry_run: bool,
}

/// Result of executing a plan.
#[derive(Debug)]
pub enum ExecutionResult {
    /// The plan had no steps.
    NoOp,
    /// Dry run: nothing was applied.
    DryRun {
        /// Number of steps that would run.
        steps: usize,
    },
    /// Every step ran.
    Completed {
        /// Steps that undo this run, most recent first.
        undo: TransactionLog,
        /// Number of steps applied.
        applied: usize,
        /// Number of guarded deletes refused.
        skipped: usize,
    },
    /// A step failed and all earlier steps were reverted.
    RolledBack {
        /// The original failure.
        error: NodeStateError,
        /// Index of the failed step.
        failed_step: usize,
        /// Number of compensating steps applied.
        reverted: usize,
    },
}

/// Effect of a single step.
enum StepEffect {
    /// Applied, with its compensator if the step is reversible.
    Applied(Option<Step>),
    /// Refused by the content guard; nothing changed.
    Refused,
}

/// Summary of a successful fold over a step list.
struct RunReport {
    compensators: Vec<Step>,
    applied: usize,
    skipped: usize,
}

/// A step failure with the compensators collected before it.
struct RunFailure {
    index: usize,
    error: NodeStateError,
    compensators: Vec<Step>,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            scratch: ScratchDir::new(settings.scratch_dir.clone()),
            hasher: ContentHasher::new(),
            dry_run: false,
        }
    }

    /// Sets whether to stop before applying anything.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Executes a plan.
    ///
    /// Never returns if a rollback fails; the process is aborted instead.
    #[must_use]
    pub fn execute(&self, plan: &Plan) -> ExecutionResult {
        if plan.is_empty() {
            debug!("Nothing to do for {}", plan.path.display());
            return ExecutionResult::NoOp;
        }

        if self.dry_run {
            info!("Dry run: {} steps planned for {}", plan.step_count(), plan.path.display());
            return ExecutionResult::DryRun {
                steps: plan.step_count(),
            };
        }

        info!("Executing plan with {} steps on {}", plan.step_count(), plan.path.display());

        match self.run(&plan.path, &plan.steps) {
            Ok(report) => ExecutionResult::Completed {
                undo: TransactionLog::new(report.compensators),
                applied: report.applied,
                skipped: report.skipped,
            },
            Err(failure) => {
                warn!(
                    "Step {} failed: {}; rolling back {} steps",
                    failure.index,
                    failure.error,
                    failure.compensators.len()
                );
                let rollback = Plan::new(plan.path.clone(), failure.compensators);
                match self.run(&rollback.path, &rollback.steps) {
                    Ok(report) => {
                        info!("Rollback of {} complete", plan.path.display());
                        ExecutionResult::RolledBack {
                            error: failure.error,
                            failed_step: failure.index,
                            reverted: report.applied,
                        }
                    }
                    Err(rollback_failure) => {
                        abort_after_failed_rollback(&plan.path, &failure.error, &rollback_failure.error)
                    }
                }
            }
        }
    }

    /// Folds over `steps`, collecting compensators most recent first.
    fn run(&self, path: &Path, steps: &[Step]) -> std::result::Result<RunReport, RunFailure> {
        let mut compensators = Vec::with_capacity(steps.len());
        let mut applied = 0;
        let mut skipped = 0;

        for (index, step) in steps.iter().enumerate() {
            info!("Applying step {index}: {step}");
            match self.apply_step(path, step) {
                Ok(StepEffect::Applied(compensator)) => {
                    applied += 1;
                    if let Some(compensator) = compensator {
                        compensators.insert(0, compensator);
                    }
                }
                Ok(StepEffect::Refused) => skipped += 1,
                Err(error) => {
                    return Err(RunFailure {
                        index,
                        error,
                        compensators,
                    });
                }
            }
        }

        Ok(RunReport {
            compensators,
            applied,
            skipped,
        })
    }

    /// Applies one step, returning its effect.
    fn apply_step(&self, path: &Path, step: &Step) -> Result<StepEffect> {
        let name = step.name();
        match step {
            Step::RemoveSymlink => Self::remove_symlink(path, name),
            Step::CreateSymlink { target } => {
                symlink(target, path).map_err(|e| FsError::step(name, path, e))?;
                Ok(StepEffect::Applied(Some(Step::RemoveSymlink)))
            }
            Step::RemoveRecursive => self.remove_recursive(path, name),
            Step::RemoveFile { expected_hash } => self.remove_file(path, expected_hash, name),
            Step::RemoveDir => Self::remove_dir(path, name),
            Step::Restore { retained } => Self::restore(path, retained, name),
            Step::Create {
                kind,
                content,
                mode,
                uid,
                gid,
            } => self.create(path, *kind, content.as_deref(), *mode, *uid, *gid, name),
            Step::SetContent { content } => Self::set_content(path, content, name),
            Step::Chmod { mode } => {
                let meta = fs::metadata(path).map_err(|e| FsError::step(name, path, e))?;
                fs::set_permissions(path, fs::Permissions::from_mode(*mode))
                    .map_err(|e| FsError::step(name, path, e))?;
                Ok(StepEffect::Applied(Some(Step::Chmod {
                    mode: meta.mode() & 0o7777,
                })))
            }
            Step::Chown { uid, gid } => {
                let meta = fs::metadata(path).map_err(|e| FsError::step(name, path, e))?;
                chown_if_needed(path, *uid, *gid).map_err(|e| FsError::step(name, path, e))?;
                Ok(StepEffect::Applied(Some(Step::Chown {
                    uid: uid.map(|_| meta.uid()),
                    gid: gid.map(|_| meta.gid()),
                })))
            }
        }
    }

    fn remove_symlink(path: &Path, name: &str) -> Result<StepEffect> {
        let target = fs::read_link(path).map_err(|e| FsError::step(name, path, e))?;
        fs::remove_file(path).map_err(|e| FsError::step(name, path, e))?;
        Ok(StepEffect::Applied(Some(Step::CreateSymlink { target })))
    }

    fn remove_recursive(&self, path: &Path, name: &str) -> Result<StepEffect> {
        let meta = existing(path, name)?;

        if self.settings.retain_removed {
            let retained = self.scratch.allocate()?;
            fs::rename(path, &retained).map_err(|e| FsError::step(name, path, e))?;
            info!("Retained {} at {}", path.display(), retained.display());
            return Ok(StepEffect::Applied(Some(Step::Restore { retained })));
        }

        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
        .map_err(|e| FsError::step(name, path, e))?;
        warn!("Permanently removed {}; this cannot be undone", path.display());
        Ok(StepEffect::Applied(None))
    }

    fn remove_file(&self, path: &Path, expected_hash: &str, name: &str) -> Result<StepEffect> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("{} is already gone; nothing to remove", path.display());
                return Ok(StepEffect::Refused);
            }
            Err(e) => return Err(FsError::step(name, path, e).into()),
        };

        let content = fs::read(path).map_err(|e| FsError::step(name, path, e))?;
        if !self.hasher.content_matches(&content, expected_hash) {
            let actual = self.hasher.hash_bytes(&content);
            warn!(
                "Content of {} changed since it was recorded (expected {}, found {}); leaving it in place",
                path.display(),
                ContentHasher::abbrev(expected_hash),
                ContentHasher::abbrev(&actual)
            );
            return Ok(StepEffect::Refused);
        }

        fs::remove_file(path).map_err(|e| FsError::step(name, path, e))?;
        Ok(StepEffect::Applied(Some(Step::Create {
            kind: NodeKind::File,
            content: Some(content),
            mode: Some(meta.mode() & 0o7777),
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        })))
    }

    fn remove_dir(path: &Path, name: &str) -> Result<StepEffect> {
        let meta = existing(path, name)?;
        fs::remove_dir(path).map_err(|e| FsError::step(name, path, e))?;
        Ok(StepEffect::Applied(Some(Step::Create {
            kind: NodeKind::Directory,
            content: None,
            mode: Some(meta.mode() & 0o7777),
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        })))
    }

    fn restore(path: &Path, retained: &Path, name: &str) -> Result<StepEffect> {
        if fs::symlink_metadata(path).is_ok() {
            return Err(FsError::AlreadyExists {
                path: path.to_path_buf(),
            }
            .into());
        }
        fs::rename(retained, path).map_err(|e| FsError::step(name, path, e))?;
        info!("Restored {} from {}", path.display(), retained.display());
        Ok(StepEffect::Applied(Some(Step::RemoveRecursive)))
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        path: &Path,
        kind: NodeKind,
        content: Option<&[u8]>,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        name: &str,
    ) -> Result<StepEffect> {
        if fs::symlink_metadata(path).is_ok() {
            return Err(FsError::AlreadyExists {
                path: path.to_path_buf(),
            }
            .into());
        }

        match kind {
            NodeKind::File => {
                let content = content.unwrap_or_default();
                write_atomic(path, content, mode, uid, gid)
                    .map_err(|e| FsError::step(name, path, e))?;
                Ok(StepEffect::Applied(Some(Step::RemoveFile {
                    expected_hash: self.hasher.hash_bytes(content),
                })))
            }
            NodeKind::Directory => {
                fs::create_dir(path).map_err(|e| FsError::step(name, path, e))?;
                if let Err(e) = apply_attributes(path, mode, uid, gid) {
                    let _ = fs::remove_dir(path);
                    return Err(FsError::step(name, path, e).into());
                }
                Ok(StepEffect::Applied(Some(Step::RemoveDir)))
            }
        }
    }

    fn set_content(path: &Path, content: &[u8], name: &str) -> Result<StepEffect> {
        let link_meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FsError::Missing {
                    step: name.to_string(),
                    path: path.to_path_buf(),
                }
                .into());
            }
            Err(e) => return Err(FsError::step(name, path, e).into()),
        };

        // Rewrite a followed symlink's target, never the link itself.
        let target: PathBuf = if link_meta.file_type().is_symlink() {
            fs::canonicalize(path).map_err(|e| FsError::step(name, path, e))?
        } else {
            path.to_path_buf()
        };

        let meta = fs::metadata(&target).map_err(|e| FsError::step(name, &target, e))?;
        let previous = fs::read(&target).map_err(|e| FsError::step(name, &target, e))?;
        write_atomic(
            &target,
            content,
            Some(meta.mode() & 0o7777),
            Some(meta.uid()),
            Some(meta.gid()),
        )
        .map_err(|e| FsError::step(name, &target, e))?;

        Ok(StepEffect::Applied(Some(Step::SetContent { content: previous })))
    }
}

/// Link-stats a node that a step requires to exist.
fn existing(path: &Path, name: &str) -> Result<Metadata> {
    fs::symlink_metadata(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            NodeStateError::Fs(FsError::Missing {
                step: name.to_string(),
                path: path.to_path_buf(),
            })
        } else {
            NodeStateError::Fs(FsError::step(name, path, e))
        }
    })
}

/// Writes `content` to a temp file beside `path`, then renames it into place.
///
/// A crash never leaves a partial file at `path`.
fn write_atomic(
    path: &Path,
    content: &[u8],
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "path has no parent directory"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "path has no file name"))?
        .to_string_lossy();
    let temp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let result = write_new_file(&temp_path, content)
        .and_then(|()| apply_attributes(&temp_path, mode, uid, gid))
        .and_then(|()| fs::rename(&temp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
        return result;
    }

    // Past the rename, sync failures are logged, not returned.
    if let Err(e) = sync_parent_dir(path) {
        warn!("Could not sync {} after writing {}: {e}", parent.display(), path.display());
    }
    Ok(())
}

fn write_new_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

fn apply_attributes(path: &Path, mode: Option<u32>, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    chown_if_needed(path, uid, gid)?;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

/// Changes ownership, skipping ids the node already has.
fn chown_if_needed(path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    let meta = fs::metadata(path)?;
    let uid = uid.filter(|&u| u != meta.uid());
    let gid = gid.filter(|&g| g != meta.gid());
    if uid.is_none() && gid.is_none() {
        return Ok(());
    }
    debug!("chown {} to {:?}:{:?}", path.display(), uid, gid);
    chown(path, uid.map(Uid::from_raw), gid.map(Gid::from_raw)).map_err(io::Error::from)
}

fn abort_after_failed_rollback(path: &Path, original: &NodeStateError, rollback: &NodeStateError) -> ! {
    error!(
        "Rollback of {} failed ({rollback}) after '{original}'; node state is indeterminate, aborting",
        path.display()
    );
    std::process::abort()
}
