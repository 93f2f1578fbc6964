//! Validation of desired states.
//!
//! Validation is pure: it runs before any probe or mutation and only
//! reports caller misuse.

use tracing::debug;

use crate::error::{InputError, Result};
use crate::permissions::ModeSpec;

use super::spec::{DesiredState, NodeKind};

/// Validator for desired states.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing non-fatal findings.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a desired state for planning.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is relative, the mode spec is
    /// malformed, or a content checker has no generator.
    pub fn validate(&self, desired: &DesiredState) -> Result<ValidationResult> {
        let mut result = self.validate_path(desired)?;

        if let Some(mode) = &desired.mode {
            ModeSpec::parse(mode)?;
        }

        if desired.content.checker.is_some() && desired.content.generator.is_none() {
            return Err(InputError::CheckerWithoutGenerator {
                path: desired.path.clone(),
            }
            .into());
        }

        if desired.kind == NodeKind::Directory && !desired.content.is_empty() {
            result
                .warnings
                .push(String::from("Content policy is ignored for directories"));
        }

        debug!("Desired state for {} is valid", desired.path.display());
        Ok(result)
    }

    /// Validates only the path, for replaying a recorded transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    pub fn validate_path(&self, desired: &DesiredState) -> Result<ValidationResult> {
        if !desired.path.is_absolute() {
            return Err(InputError::RelativePath {
                path: desired.path.clone(),
            }
            .into());
        }
        Ok(ValidationResult::default())
    }
}
