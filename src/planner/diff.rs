//! Planner diffing desired against observed state.
//!
//! Decisions are taken in a fixed order and the first structural match
//! wins, which keeps destructive steps to a minimum and makes plans
//! deterministic:
//!
//! 1. must be absent and exists: remove it
//! 2. must exist and is absent: clear a stale symlink, then create
//! 3. symlink not allowed and present: replace it or reject
//! 4. absent and existence not enforced: nothing to do
//! 5. wrong node type: replace it or reject
//! 6. to 9. mode, owner, group and content, appended in that order

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::config::{DesiredState, NodeKind, Presence};
use crate::error::{FsError, InputError, PolicyError, Result};
use crate::permissions::{resolve_group, resolve_owner, ModeSpec};
use crate::state::{ContentHasher, NodeType, ObservedState};

use super::plan::{Plan, Step};

/// Mode symbolic specs resolve against when creating a file.
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Mode symbolic specs resolve against when creating a directory.
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Computes plans from desired and observed state.
#[derive(Debug, Default)]
pub struct Planner {
    /// Content hasher for guarded deletes.
    hasher: ContentHasher,
}

impl Planner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ContentHasher::new(),
        }
    }

    /// Computes the plan bridging `observed` to `desired`.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` when a required replacement is disallowed,
    /// `PermissionError` when mode or ownership cannot be resolved, and
    /// `FsError` when the node's content cannot be read. No mutation
    /// happens in any case.
    pub fn plan(&self, desired: &DesiredState, observed: &ObservedState) -> Result<Plan> {
        let path = desired.path();
        let steps = self.compute_steps(desired, observed)?;
        debug!("Planned {} steps for {}", steps.len(), path.display());
        Ok(Plan::new(path, steps))
    }

    fn compute_steps(&self, desired: &DesiredState, observed: &ObservedState) -> Result<Vec<Step>> {
        let path = desired.path();

        if desired.presence == Presence::Absent {
            if observed.is_dangling_symlink() {
                debug!("{} holds a dangling symlink", path.display());
                return Ok(vec![Step::RemoveSymlink]);
            }
            if !observed.exists {
                debug!("{} is already absent", path.display());
                return Ok(vec![]);
            }
            return Ok(vec![self.removal_step(path, observed)?]);
        }

        if desired.presence == Presence::Present && !observed.exists {
            let mut steps = Vec::with_capacity(2);
            if observed.is_dangling_symlink() {
                debug!("{} holds a dangling symlink", path.display());
                steps.push(Step::RemoveSymlink);
            }
            steps.push(Self::create_step(desired)?);
            return Ok(steps);
        }

        if !desired.allow_symlink && observed.is_symlink {
            if !desired.replace.symlink {
                return Err(PolicyError::SymlinkNotReplaceable {
                    path: path.to_path_buf(),
                }
                .into());
            }
            debug!("Replacing symlink at {}", path.display());
            return Ok(vec![Step::RemoveSymlink, Self::create_step(desired)?]);
        }

        if !observed.exists {
            return Ok(vec![]);
        }

        if !observed.matches_kind(desired.kind) {
            let allowed = match observed.node_type {
                NodeType::Directory => desired.replace.directory,
                _ => desired.replace.file,
            };
            if !allowed {
                return Err(PolicyError::ReplaceDisallowed {
                    path: path.to_path_buf(),
                    found: observed.node_type.to_string(),
                    wanted: desired.kind.to_string(),
                }
                .into());
            }
            debug!(
                "Replacing {} at {} with a {}",
                observed.node_type,
                path.display(),
                desired.kind
            );
            return Ok(vec![Step::RemoveRecursive, Self::create_step(desired)?]);
        }

        self.attribute_steps(desired, observed)
    }

    /// Picks the removal step for an existing node.
    fn removal_step(&self, path: &Path, observed: &ObservedState) -> Result<Step> {
        if observed.is_symlink {
            return Ok(Step::RemoveSymlink);
        }
        match observed.node_type {
            NodeType::File => {
                let expected_hash = self.hasher.hash_file(path).map_err(|source| FsError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(Step::RemoveFile { expected_hash })
            }
            _ => Ok(Step::RemoveRecursive),
        }
    }

    /// Builds the create step, resolving attributes up front.
    fn create_step(desired: &DesiredState) -> Result<Step> {
        let is_dir = desired.kind == NodeKind::Directory;
        let base_mode = if is_dir {
            DEFAULT_DIR_MODE
        } else {
            DEFAULT_FILE_MODE
        };

        let mode = desired
            .mode
            .as_deref()
            .map(|spec| ModeSpec::parse(spec).map(|m| m.resolve(base_mode, is_dir)))
            .transpose()?;
        let uid = desired.owner.as_deref().map(resolve_owner).transpose()?;
        let gid = desired.group.as_deref().map(resolve_group).transpose()?;
        let content = if is_dir {
            None
        } else {
            desired.content.generate(None)
        };

        Ok(Step::Create {
            kind: desired.kind,
            content,
            mode,
            uid,
            gid,
        })
    }

    /// Appends mode, owner, group and content corrections.
    fn attribute_steps(&self, desired: &DesiredState, observed: &ObservedState) -> Result<Vec<Step>> {
        let path = desired.path();
        let is_dir = observed.node_type == NodeType::Directory;
        let mut steps = Vec::new();

        if let Some(spec) = &desired.mode {
            let current = observed.mode.unwrap_or(0);
            let target = ModeSpec::parse(spec)?.resolve(current, is_dir);
            if observed.mode != Some(target) {
                debug!("Mode of {} drifts: {current:04o} -> {target:04o}", path.display());
                steps.push(Step::Chmod { mode: target });
            }
        }

        if let Some(owner) = &desired.owner {
            let uid = resolve_owner(owner)?;
            if observed.uid != Some(uid) {
                steps.push(Step::Chown {
                    uid: Some(uid),
                    gid: None,
                });
            }
        }

        // Group changes are their own step.
        if let Some(group) = &desired.group {
            let gid = resolve_group(group)?;
            if observed.gid != Some(gid) {
                steps.push(Step::Chown {
                    uid: None,
                    gid: Some(gid),
                });
            }
        }

        if !desired.content.is_empty() {
            if observed.node_type == NodeType::File {
                if let Some(step) = self.content_step(desired)? {
                    steps.push(step);
                }
            } else {
                debug!("Ignoring content policy for {} {}", observed.node_type, path.display());
            }
        }

        Ok(steps)
    }

    fn content_step(&self, desired: &DesiredState) -> Result<Option<Step>> {
        let path = desired.path();
        let current = fs::read(path).map_err(|source| FsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if desired.content.accepts(&current) {
            return Ok(None);
        }

        let Some(content) = desired.content.generate(Some(current.as_slice())) else {
            return Err(InputError::CheckerWithoutGenerator {
                path: path.to_path_buf(),
            }
            .into());
        };
        debug!(
            "Content of {} rejected (sha256 {}), regenerating",
            path.display(),
            ContentHasher::abbrev(&self.hasher.hash_bytes(&current))
        );
        Ok(Some(Step::SetContent { content }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentPolicy, ReplacePolicy};
    use crate::error::NodeStateError;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn file_state(mode: u32, uid: u32, gid: u32) -> ObservedState {
        ObservedState {
            exists: true,
            is_symlink: false,
            symlink_target: None,
            node_type: NodeType::File,
            mode: Some(mode),
            uid: Some(uid),
            gid: Some(gid),
        }
    }

    fn dir_state() -> ObservedState {
        ObservedState {
            node_type: NodeType::Directory,
            ..file_state(0o755, 0, 0)
        }
    }

    fn symlink_state() -> ObservedState {
        ObservedState {
            is_symlink: true,
            symlink_target: Some(PathBuf::from("/elsewhere")),
            node_type: NodeType::Symlink,
            ..file_state(0o777, 0, 0)
        }
    }

    fn steps(desired: &DesiredState, observed: &ObservedState) -> Vec<Step> {
        Planner::new()
            .plan(desired, observed)
            .expect("planning should succeed")
            .steps
    }

    #[test]
    fn test_create_absent_file_with_generated_content() {
        let desired = DesiredState::new("/tmp/x").with_content(ContentPolicy::generated(|_| b"abc".to_vec()));
        let plan = steps(&desired, &ObservedState::absent());
        assert_eq!(
            plan,
            vec![Step::Create {
                kind: NodeKind::File,
                content: Some(b"abc".to_vec()),
                mode: None,
                uid: None,
                gid: None,
            }]
        );
    }

    #[test]
    fn test_create_resolves_symbolic_mode_against_default() {
        let desired = DesiredState::directory("/tmp/d").with_mode("g+w");
        let plan = steps(&desired, &ObservedState::absent());
        assert!(matches!(
            plan.as_slice(),
            [Step::Create { kind: NodeKind::Directory, mode: Some(0o775), content: None, .. }]
        ));
    }

    #[test]
    fn test_stale_symlink_cleared_before_create() {
        let observed = ObservedState {
            is_symlink: true,
            symlink_target: Some(PathBuf::from("/gone")),
            ..ObservedState::absent()
        };
        let desired = DesiredState::new("/tmp/x").with_allow_symlink(true);
        let plan = steps(&desired, &observed);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0], Step::RemoveSymlink);
        assert!(matches!(plan[1], Step::Create { .. }));
    }

    #[test]
    fn test_dangling_symlink_removed_when_absent() {
        let observed = ObservedState {
            is_symlink: true,
            symlink_target: Some(PathBuf::from("/gone")),
            ..ObservedState::absent()
        };
        let desired = DesiredState::new("/tmp/x")
            .with_presence(Presence::Absent)
            .with_allow_symlink(true);
        assert_eq!(steps(&desired, &observed), vec![Step::RemoveSymlink]);
    }

    #[test]
    fn test_remove_directory_recursively() {
        let desired = DesiredState::directory("/tmp/d").with_presence(Presence::Absent);
        assert_eq!(steps(&desired, &dir_state()), vec![Step::RemoveRecursive]);
    }

    #[test]
    fn test_remove_file_records_hash_at_plan_time() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("victim");
        fs::write(&path, b"abc").expect("write failed");

        let desired = DesiredState::new(&path).with_presence(Presence::Absent);
        let plan = steps(&desired, &file_state(0o644, 0, 0));
        assert_eq!(
            plan,
            vec![Step::RemoveFile {
                expected_hash: ContentHasher::new().hash_bytes(b"abc"),
            }]
        );
    }

    #[test]
    fn test_remove_symlink_never_touches_target() {
        let desired = DesiredState::new("/tmp/link").with_presence(Presence::Absent);
        assert_eq!(steps(&desired, &symlink_state()), vec![Step::RemoveSymlink]);
    }

    #[test]
    fn test_absent_stays_absent() {
        let desired = DesiredState::new("/tmp/x").with_presence(Presence::Absent);
        assert!(steps(&desired, &ObservedState::absent()).is_empty());

        let any = DesiredState::new("/tmp/x").with_presence(Presence::Any).with_mode("0600");
        assert!(steps(&any, &ObservedState::absent()).is_empty());
    }

    #[test]
    fn test_symlink_rejected_without_replace_flag() {
        let desired = DesiredState::new("/tmp/link");
        let result = Planner::new().plan(&desired, &symlink_state());
        assert!(matches!(
            result,
            Err(NodeStateError::Policy(PolicyError::SymlinkNotReplaceable { .. }))
        ));
    }

    #[test]
    fn test_symlink_replaced_with_flag() {
        let desired = DesiredState::new("/tmp/link").with_replace(ReplacePolicy {
            symlink: true,
            ..ReplacePolicy::default()
        });
        let plan = steps(&desired, &symlink_state());
        assert_eq!(plan[0], Step::RemoveSymlink);
        assert!(matches!(plan[1], Step::Create { kind: NodeKind::File, .. }));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let desired = DesiredState::new("/tmp/d");
        let result = Planner::new().plan(&desired, &dir_state());
        assert!(matches!(
            result,
            Err(NodeStateError::Policy(PolicyError::ReplaceDisallowed { .. }))
        ));
    }

    #[test]
    fn test_type_mismatch_uses_relevant_flag() {
        // replace.file does not cover an existing directory
        let wrong_flag = DesiredState::new("/tmp/d").with_replace(ReplacePolicy {
            file: true,
            ..ReplacePolicy::default()
        });
        assert!(Planner::new().plan(&wrong_flag, &dir_state()).is_err());

        let desired = DesiredState::directory("/tmp/f").with_replace(ReplacePolicy {
            file: true,
            ..ReplacePolicy::default()
        });
        let plan = steps(&desired, &file_state(0o644, 0, 0));
        assert_eq!(plan[0], Step::RemoveRecursive);
        assert!(matches!(plan[1], Step::Create { kind: NodeKind::Directory, .. }));
    }

    #[test]
    fn test_mode_mismatch_appends_chmod() {
        let desired = DesiredState::new("/tmp/x").with_mode("+x");
        assert_eq!(
            steps(&desired, &file_state(0o644, 0, 0)),
            vec![Step::Chmod { mode: 0o755 }]
        );

        let satisfied = DesiredState::new("/tmp/x").with_mode("u=rw,go=r");
        assert!(steps(&satisfied, &file_state(0o644, 0, 0)).is_empty());
    }

    #[test]
    fn test_owner_and_group_never_coalesced() {
        let desired = DesiredState::new("/tmp/x")
            .with_mode("0600")
            .with_owner("1001")
            .with_group("1002");
        assert_eq!(
            steps(&desired, &file_state(0o644, 0, 0)),
            vec![
                Step::Chmod { mode: 0o600 },
                Step::Chown {
                    uid: Some(1001),
                    gid: None
                },
                Step::Chown {
                    uid: None,
                    gid: Some(1002)
                },
            ]
        );
    }

    #[test]
    fn test_matching_ownership_is_noop() {
        let desired = DesiredState::new("/tmp/x").with_owner("7").with_group("8");
        assert!(steps(&desired, &file_state(0o644, 7, 8)).is_empty());
    }

    #[test]
    fn test_unknown_owner_is_bad_input() {
        let desired = DesiredState::new("/tmp/x").with_owner("no-such-user-7f3a");
        let result = Planner::new().plan(&desired, &file_state(0o644, 0, 0));
        assert!(matches!(result, Err(NodeStateError::Permission(_))));
    }

    #[test]
    fn test_content_rejected_appends_set_content() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("motd");
        fs::write(&path, b"old").expect("write failed");

        let desired = DesiredState::new(&path).with_content(ContentPolicy::exact("new"));
        assert_eq!(
            steps(&desired, &file_state(0o644, 0, 0)),
            vec![Step::SetContent {
                content: b"new".to_vec()
            }]
        );

        fs::write(&path, b"new").expect("write failed");
        assert!(steps(&desired, &file_state(0o644, 0, 0)).is_empty());
    }

    #[test]
    fn test_generator_receives_prior_content() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("conf");
        fs::write(&path, b"a=1").expect("write failed");

        let policy = ContentPolicy::new(
            |current| current.ends_with(b"\n"),
            |prior| {
                let mut out = prior.unwrap_or_default().to_vec();
                out.push(b'\n');
                out
            },
        );
        let desired = DesiredState::new(&path).with_content(policy);
        assert_eq!(
            steps(&desired, &file_state(0o644, 0, 0)),
            vec![Step::SetContent {
                content: b"a=1\n".to_vec()
            }]
        );
    }
}
