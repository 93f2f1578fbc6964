//! Configuration module for nodestate.
//!
//! This module handles all configuration-related functionality:
//! - The desired-state description for a single node
//! - Parsing YAML manifests into that description
//! - Validation before anything touches the filesystem
//! - Engine settings from flags and environment

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, ENV_RETAIN, ENV_SCRATCH_DIR};
pub use spec::{
    ContentChecker, ContentGenerator, ContentPolicy, DesiredState, NodeKind, Presence,
    ReplacePolicy, Settings,
};
pub use validator::{ConfigValidator, ValidationResult};
