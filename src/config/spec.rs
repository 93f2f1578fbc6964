//! Desired-state types for a single filesystem node.
//!
//! These types fully describe what a node should look like once a
//! transaction completes: existence, type, permission bits, ownership
//! and content. They are call-scoped and never persisted by the core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory name of the per-user state root.
const STATE_DIR: &str = ".nodestate";

/// Scratch subdirectory holding retained nodes.
const SCRATCH_DIR: &str = "scratch";

/// Predicate deciding whether current content is acceptable.
pub type ContentChecker = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Produces the desired content from the prior content, if any.
pub type ContentGenerator = Arc<dyn Fn(Option<&[u8]>) -> Vec<u8> + Send + Sync>;

/// Whether the node must exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// The node must not exist.
    Absent,
    /// The node must exist.
    #[default]
    Present,
    /// Existence is not enforced; attributes are, when the node exists.
    Any,
}

/// Kind of node to create or enforce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A regular file.
    #[default]
    File,
    /// A directory.
    Directory,
}

/// Which existing node types may be destroyed to reach the desired state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReplacePolicy {
    /// Replace a symlink occupying the path.
    #[serde(default)]
    pub symlink: bool,
    /// Replace a file (or other non-directory node) occupying the path.
    #[serde(default)]
    pub file: bool,
    /// Replace a directory occupying the path.
    #[serde(default)]
    pub directory: bool,
}

/// Injected pair of pure content functions.
///
/// Neither function may have side effects.
#[derive(Clone, Default)]
pub struct ContentPolicy {
    /// Accepts or rejects the current content.
    pub checker: Option<ContentChecker>,
    /// Produces new content from the prior content.
    pub generator: Option<ContentGenerator>,
}

/// The caller's declared target configuration for a path.
#[derive(Debug, Clone)]
pub struct DesiredState {
    /// Absolute path of the node.
    pub path: PathBuf,
    /// Whether the node should exist.
    pub presence: Presence,
    /// Target node kind.
    pub kind: NodeKind,
    /// Octal or symbolic mode expression.
    pub mode: Option<String>,
    /// Owner as a user name or numeric uid.
    pub owner: Option<String>,
    /// Group as a group name or numeric gid.
    pub group: Option<String>,
    /// Content policy for files.
    pub content: ContentPolicy,
    /// Follow a symlink at the path instead of treating it as the node.
    pub allow_symlink: bool,
    /// Destructive replacement permissions.
    pub replace: ReplacePolicy,
}

/// Explicit engine configuration, resolved once per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Where replaced nodes are retained.
    pub scratch_dir: PathBuf,
    /// Move removed nodes into the scratch directory instead of deleting them.
    pub retain_removed: bool,
}

impl DesiredState {
    /// Creates a desired state requiring a file to exist at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            presence: Presence::Present,
            kind: NodeKind::File,
            mode: None,
            owner: None,
            group: None,
            content: ContentPolicy::default(),
            allow_symlink: false,
            replace: ReplacePolicy::default(),
        }
    }

    /// Creates a desired state for a file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(path)
    }

    /// Creates a desired state for a directory.
    #[must_use]
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(path).with_kind(NodeKind::Directory)
    }

    /// Sets whether the node should exist.
    #[must_use]
    pub const fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    /// Sets the node kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the mode expression.
    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets the group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets the content policy.
    #[must_use]
    pub fn with_content(mut self, content: ContentPolicy) -> Self {
        self.content = content;
        self
    }

    /// Allows following a symlink at the path.
    #[must_use]
    pub const fn with_allow_symlink(mut self, allow: bool) -> Self {
        self.allow_symlink = allow;
        self
    }

    /// Sets the replacement policy.
    #[must_use]
    pub const fn with_replace(mut self, replace: ReplacePolicy) -> Self {
        self.replace = replace;
        self
    }

    /// Returns the node path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentPolicy {
    /// Creates a policy from a checker and a generator.
    #[must_use]
    pub fn new<C, G>(checker: C, generator: G) -> Self
    where
        C: Fn(&[u8]) -> bool + Send + Sync + 'static,
        G: Fn(Option<&[u8]>) -> Vec<u8> + Send + Sync + 'static,
    {
        Self {
            checker: Some(Arc::new(checker)),
            generator: Some(Arc::new(generator)),
        }
    }

    /// Creates a policy with only a generator.
    ///
    /// Existing content is accepted when regenerating it yields the same bytes.
    #[must_use]
    pub fn generated<G>(generator: G) -> Self
    where
        G: Fn(Option<&[u8]>) -> Vec<u8> + Send + Sync + 'static,
    {
        Self {
            checker: None,
            generator: Some(Arc::new(generator)),
        }
    }

    /// Creates a policy requiring exactly `content`.
    #[must_use]
    pub fn exact(content: impl Into<Vec<u8>>) -> Self {
        let wanted: Vec<u8> = content.into();
        let expected = wanted.clone();
        Self::new(move |current| current == expected.as_slice(), move |_| wanted.clone())
    }

    /// Returns true if neither function is configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.checker.is_none() && self.generator.is_none()
    }

    /// Produces content for a node, given its prior content.
    #[must_use]
    pub fn generate(&self, prior: Option<&[u8]>) -> Option<Vec<u8>> {
        self.generator.as_ref().map(|g| g(prior))
    }

    /// Returns true if `current` satisfies the policy.
    #[must_use]
    pub fn accepts(&self, current: &[u8]) -> bool {
        match (&self.checker, &self.generator) {
            (Some(check), _) => check(current),
            (None, Some(generate)) => generate(Some(current)) == current,
            (None, None) => true,
        }
    }
}

impl fmt::Debug for ContentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentPolicy")
            .field("checker", &self.checker.is_some())
            .field("generator", &self.generator.is_some())
            .finish()
    }
}

impl Settings {
    /// Creates settings with an explicit scratch directory.
    #[must_use]
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            retain_removed: true,
        }
    }

    /// Sets whether removed nodes are retained.
    #[must_use]
    pub const fn with_retain_removed(mut self, retain: bool) -> Self {
        self.retain_removed = retain;
        self
    }

    /// Returns the default per-user scratch directory.
    #[must_use]
    pub fn default_scratch_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(STATE_DIR)
            .join(SCRATCH_DIR)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Self::default_scratch_dir())
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Directory => "directory",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Present => "present",
            Self::Any => "any",
        };
        write!(f, "{s}")
    }
}
