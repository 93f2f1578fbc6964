//! Step and plan types.
//!
//! A `Step` is a single reversible filesystem effect on the node path.
//! Every step's compensator is itself a `Step`, so one interpreter serves
//! forward execution, rollback, undo and redo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::NodeKind;

/// A single reversible filesystem effect.
///
/// Steps never carry the node path; it is supplied by the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Remove the symlink at the path.
    RemoveSymlink,
    /// Create a symlink at the path.
    CreateSymlink {
        /// Link target.
        target: PathBuf,
    },
    /// Remove the node and everything below it, retaining it if configured.
    RemoveRecursive,
    /// Remove a file, only if its content still hashes to `expected_hash`.
    RemoveFile {
        /// Hex SHA-256 of the content expected at execution time.
        expected_hash: String,
    },
    /// Remove an empty directory.
    RemoveDir,
    /// Move a retained node back to the path.
    Restore {
        /// Where the node was retained.
        retained: PathBuf,
    },
    /// Create the node.
    Create {
        /// Kind of node to create.
        kind: NodeKind,
        /// File content.
        #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex_bytes")]
        content: Option<Vec<u8>>,
        /// Permission bits to apply after creation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<u32>,
        /// Owner to apply after creation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uid: Option<u32>,
        /// Group to apply after creation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gid: Option<u32>,
    },
    /// Atomically replace the content of an existing file.
    SetContent {
        /// New content.
        #[serde(with = "hex_bytes")]
        content: Vec<u8>,
    },
    /// Change permission bits.
    Chmod {
        /// Target permission bits.
        mode: u32,
    },
    /// Change owner and/or group.
    Chown {
        /// Target uid, if the owner changes.
        #[serde(default)]
        uid: Option<u32>,
        /// Target gid, if the group changes.
        #[serde(default)]
        gid: Option<u32>,
    },
}

/// Ordered step sequence produced once per call.
#[derive(Debug, Clone)]
pub struct Plan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Node the plan applies to.
    pub path: PathBuf,
    /// Steps in execution order.
    pub steps: Vec<Step>,
}

impl Step {
    /// Returns the short name of the step.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RemoveSymlink => "remove_symlink",
            Self::CreateSymlink { .. } => "create_symlink",
            Self::RemoveRecursive => "remove_recursive",
            Self::RemoveFile { .. } => "remove_file",
            Self::RemoveDir => "remove_dir",
            Self::Restore { .. } => "restore",
            Self::Create { .. } => "create",
            Self::SetContent { .. } => "set_content",
            Self::Chmod { .. } => "chmod",
            Self::Chown { .. } => "chown",
        }
    }

    /// Returns true if the step destroys a node.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::RemoveSymlink | Self::RemoveRecursive | Self::RemoveFile { .. } | Self::RemoveDir
        )
    }

    /// Creates a step creating an empty node with no explicit attributes.
    #[must_use]
    pub const fn create(kind: NodeKind) -> Self {
        Self::Create {
            kind,
            content: None,
            mode: None,
            uid: None,
            gid: None,
        }
    }
}

impl Plan {
    /// Creates a plan from a step sequence.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, steps: Vec<Step>) -> Self {
        Self {
            created_at: Utc::now(),
            path: path.into(),
            steps,
        }
    }

    /// Creates an empty plan (no changes needed).
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::new(path, vec![])
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of steps.
    #[must_use]
    pub const fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the number of destructive steps.
    #[must_use]
    pub fn destructive_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_destructive()).count()
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoveSymlink => write!(f, "remove symlink"),
            Self::CreateSymlink { target } => write!(f, "create symlink -> {}", target.display()),
            Self::RemoveRecursive => write!(f, "remove recursively"),
            Self::RemoveFile { expected_hash } => {
                let short: String = expected_hash.chars().take(8).collect();
                write!(f, "remove file (sha256 {short})")
            }
            Self::RemoveDir => write!(f, "remove directory"),
            Self::Restore { retained } => write!(f, "restore from {}", retained.display()),
            Self::Create {
                kind,
                content,
                mode,
                uid,
                gid,
            } => {
                write!(f, "create {kind}")?;
                if let Some(content) = content {
                    write!(f, " ({} bytes)", content.len())?;
                }
                if let Some(mode) = mode {
                    write!(f, " mode={mode:04o}")?;
                }
                if let Some(uid) = uid {
                    write!(f, " uid={uid}")?;
                }
                if let Some(gid) = gid {
                    write!(f, " gid={gid}")?;
                }
                Ok(())
            }
            Self::SetContent { content } => write!(f, "set content ({} bytes)", content.len()),
            Self::Chmod { mode } => write!(f, "chmod {mode:04o}"),
            Self::Chown { uid, gid } => match (uid, gid) {
                (Some(uid), Some(gid)) => write!(f, "chown {uid}:{gid}"),
                (Some(uid), None) => write!(f, "chown {uid}"),
                (None, Some(gid)) => write!(f, "chgrp {gid}"),
                (None, None) => write!(f, "chown (no change)"),
            },
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan for {} ({} steps):", self.path.display(), self.steps.len())?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "  {i}. {step}")?;
        }
        Ok(())
    }
}

/// Hex encoding for byte payloads in serialized steps.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

mod opt_hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
