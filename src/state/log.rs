//! Transaction logs.
//!
//! A `TransactionLog` is the compensator sequence returned after a
//! successful run. The core never stores it; callers persist it and hand
//! it back verbatim as undo or redo input. `LogFile` is the on-disk
//! envelope used by the command-line tool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{InputError, NodeStateError, Result};
use crate::planner::Step;

/// Current version of the log file format.
pub const LOG_VERSION: &str = "1.0";

/// Ordered steps that reverse a completed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionLog {
    steps: Vec<Step>,
}

/// Whether a log undoes a forward transaction or redoes an undone one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogDirection {
    /// Applying the log undoes a forward transaction.
    Undo,
    /// Applying the log redoes an undone transaction.
    Redo,
}

/// Persisted transaction log for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFile {
    /// Log format version.
    pub version: String,
    /// Node the log applies to.
    pub path: PathBuf,
    /// What applying the log does.
    pub direction: LogDirection,
    /// When the log was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The compensating steps.
    pub steps: TransactionLog,
}

impl TransactionLog {
    /// Creates a log from compensating steps, most recent first.
    #[must_use]
    pub const fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Returns the steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Consumes the log, returning its steps.
    #[must_use]
    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// Returns true if the log has no steps.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of steps.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.steps.len()
    }
}

impl LogFile {
    /// Creates a log file record stamped with the current time.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, direction: LogDirection, steps: TransactionLog) -> Self {
        Self {
            version: LOG_VERSION.to_string(),
            path: path.into(),
            direction,
            recorded_at: Utc::now(),
            steps,
        }
    }

    /// Loads a log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid log.
    pub fn load(file: &Path) -> Result<Self> {
        info!("Loading transaction log from: {}", file.display());

        let content = fs::read_to_string(file).map_err(|e| {
            NodeStateError::Input(InputError::parse(
                "transaction log",
                format!("Failed to read {}: {e}", file.display()),
            ))
        })?;

        let log: Self = serde_json::from_str(&content).map_err(|e| {
            NodeStateError::Input(InputError::parse(
                "transaction log",
                format!("Failed to parse {}: {e}", file.display()),
            ))
        })?;

        if log.version != LOG_VERSION {
            return Err(InputError::parse(
                "transaction log",
                format!("unsupported version {} (expected {LOG_VERSION})", log.version),
            )
            .into());
        }

        Ok(log)
    }

    /// Loads a log file and checks its direction.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be loaded or has the wrong direction.
    pub fn load_expecting(file: &Path, direction: LogDirection) -> Result<Self> {
        let log = Self::load(file)?;
        if log.direction != direction {
            return Err(InputError::WrongLogDirection {
                expected: direction.to_string(),
                found: log.direction.to_string(),
            }
            .into());
        }
        Ok(log)
    }

    /// Saves the log, writing a temporary file first and renaming it into place.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be serialized or written.
    pub fn save(&self, file: &Path) -> Result<()> {
        info!("Saving transaction log to: {}", file.display());

        let content = serde_json::to_string_pretty(self).map_err(|e| {
            NodeStateError::internal(format!("Failed to serialize transaction log: {e}"))
        })?;

        let temp_path = file.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        let mut handle = fs::File::create(&temp_path)?;
        handle.write_all(content.as_bytes())?;
        handle.sync_all()?;

        if let Err(e) = fs::rename(&temp_path, file) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        sync_parent_dir(file)?;

        debug!("Transaction log saved successfully");
        Ok(())
    }
}

/// Flushes the directory entry of `path` so a completed rename survives a crash.
pub(crate) fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::File::open(parent)?.sync_all()
}

impl std::fmt::Display for LogDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        };
        write!(f, "{s}")
    }
}
