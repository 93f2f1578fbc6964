//! Observed-state types.
//!
//! These types record the on-disk facts about a path at probe time.
//! They are call-scoped and only feed the planner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::config::NodeKind;

/// Type of the effective node at a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Nothing at the path.
    #[default]
    Absent,
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symlink that is not being followed.
    Symlink,
    /// Any other node (fifo, socket, device).
    Other,
}

/// Current on-disk facts about a path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ObservedState {
    /// Whether the effective node exists.
    pub exists: bool,
    /// Whether the path itself is a symlink.
    pub is_symlink: bool,
    /// Target of the symlink at the path, if any.
    pub symlink_target: Option<PathBuf>,
    /// Type of the effective node.
    pub node_type: NodeType,
    /// Permission bits of the effective node.
    pub mode: Option<u32>,
    /// Owner uid of the effective node.
    pub uid: Option<u32>,
    /// Group gid of the effective node.
    pub gid: Option<u32>,
}

impl ObservedState {
    /// Creates the state of an empty path.
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    /// Returns true if a symlink occupies the path but its target is missing.
    #[must_use]
    pub const fn is_dangling_symlink(&self) -> bool {
        self.is_symlink && !self.exists
    }

    /// Returns true if the effective node matches the requested kind.
    #[must_use]
    pub const fn matches_kind(&self, kind: NodeKind) -> bool {
        matches!(
            (self.node_type, kind),
            (NodeType::File, NodeKind::File) | (NodeType::Directory, NodeKind::Directory)
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other => "special file",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_type)?;
        if let Some(target) = &self.symlink_target {
            write!(f, " via symlink -> {}", target.display())?;
        }
        if let Some(mode) = self.mode {
            write!(f, " mode={mode:04o}")?;
        }
        if let (Some(uid), Some(gid)) = (self.uid, self.gid) {
            write!(f, " owner={uid}:{gid}")?;
        }
        Ok(())
    }
}
