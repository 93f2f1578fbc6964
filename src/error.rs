//! Error types for the nodestate system.
//!
//! This module provides the error hierarchy for every phase of a
//! transaction: input validation, permission resolution, policy checks,
//! and filesystem effects. Each error maps onto an HTTP-style status so
//! callers can branch on the status class.

use std::path::PathBuf;
use thiserror::Error;

use crate::reconciler::Status;

/// The main error type for the nodestate system.
#[derive(Debug, Error)]
pub enum NodeStateError {
    /// Malformed or missing input.
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    /// Mode, owner or group could not be resolved.
    #[error("Permission spec error: {0}")]
    Permission(#[from] PermissionError),

    /// A required replacement is disallowed by policy.
    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyError),

    /// A filesystem call failed.
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InputError {
    /// The node path is not absolute.
    #[error("Path must be absolute: {path}")]
    RelativePath {
        /// The offending path.
        path: PathBuf,
    },

    /// A content checker was configured without a generator.
    #[error("Content checker configured without a generator for {path}")]
    CheckerWithoutGenerator {
        /// Path of the node.
        path: PathBuf,
    },

    /// The manifest file was not found.
    #[error("Manifest not found: {path}")]
    ManifestNotFound {
        /// Path to the missing manifest.
        path: PathBuf,
    },

    /// A manifest or log file could not be parsed.
    #[error("Failed to parse {what}: {message}")]
    Parse {
        /// What was being parsed.
        what: String,
        /// Description of the parse error.
        message: String,
    },

    /// A transaction log was submitted in the wrong direction.
    #[error("Expected a {expected} log, found a {found} log")]
    WrongLogDirection {
        /// Direction the command needs.
        expected: String,
        /// Direction stored in the log.
        found: String,
    },
}

/// Permission spec resolution errors.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// The mode expression is malformed.
    #[error("Invalid mode spec '{spec}': {reason}")]
    InvalidSpec {
        /// The mode expression.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No user with this name exists.
    #[error("Unknown owner: {name}")]
    UnknownOwner {
        /// The user name.
        name: String,
    },

    /// No group with this name exists.
    #[error("Unknown group: {name}")]
    UnknownGroup {
        /// The group name.
        name: String,
    },

    /// The identity database could not be queried.
    #[error("Identity lookup for '{name}' failed: {message}")]
    LookupFailed {
        /// The name being looked up.
        name: String,
        /// Description of the failure.
        message: String,
    },
}

/// Policy violations, detected before any mutation.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The path is a symlink, symlinks are not allowed and may not be replaced.
    #[error("{path} is a symlink and replacing symlinks is not allowed")]
    SymlinkNotReplaceable {
        /// Path of the node.
        path: PathBuf,
    },

    /// The node has the wrong type and may not be replaced.
    #[error("{path} is a {found} but a {wanted} is required, and replacing a {found} is not allowed")]
    ReplaceDisallowed {
        /// Path of the node.
        path: PathBuf,
        /// Type found on disk.
        found: String,
        /// Type required.
        wanted: String,
    },
}

/// Filesystem failures.
#[derive(Debug, Error)]
pub enum FsError {
    /// Stat of the node failed for a reason other than not-found.
    #[error("Failed to stat {path}: {source}")]
    Stat {
        /// Path that was probed.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Reading node content failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A step failed while being applied.
    #[error("Step '{step}' failed on {path}: {source}")]
    Step {
        /// Name of the step.
        step: String,
        /// Path of the node.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Create found the node already present.
    #[error("Cannot create {path}: node already exists")]
    AlreadyExists {
        /// Path of the node.
        path: PathBuf,
    },

    /// A step required the node to exist.
    #[error("Cannot apply '{step}' on {path}: node does not exist")]
    Missing {
        /// Name of the step.
        step: String,
        /// Path of the node.
        path: PathBuf,
    },

    /// The scratch directory could not be prepared.
    #[error("Scratch directory {path} unavailable: {source}")]
    Scratch {
        /// Scratch directory path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// Result type alias for nodestate operations.
pub type Result<T> = std::result::Result<T, NodeStateError>;

impl NodeStateError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the status class this error is reported under.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Input(_) | Self::Permission(_) => Status::BadInput,
            Self::Policy(_) => Status::Rejected,
            Self::Fs(_) | Self::Io(_) | Self::Internal(_) => Status::SystemError,
        }
    }
}

impl InputError {
    /// Creates a parse error.
    #[must_use]
    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }
}

impl PermissionError {
    /// Creates an invalid spec error.
    #[must_use]
    pub fn invalid(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

impl FsError {
    /// Creates a step failure.
    #[must_use]
    pub fn step(step: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Step {
            step: step.to_string(),
            path: path.into(),
            source,
        }
    }
}
