// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # nodestate
//!
//! Desired-state enforcement for a single filesystem node, with dry-run
//! planning and transactional undo/redo.
//!
//! ## Overview
//!
//! Given a declared target for one path (existence, type, permission bits,
//! ownership and content), nodestate:
//!
//! - Probes the node without following symlinks unless asked to
//! - Plans the minimal ordered list of steps to reach the target
//! - Applies the steps, rolling back automatically if one fails
//! - Returns the compensating steps so the change can be undone later
//!
//! ## Architecture
//!
//! 1. **Desired State**: a [`DesiredState`] built in code or loaded from YAML
//! 2. **Observed State**: an [`ObservedState`] read from the filesystem
//! 3. **Planner**: diffs the two into a [`Plan`] of [`Step`]s
//! 4. **Executor**: applies steps and collects their compensators
//! 5. **Reconciler**: drives the above and reports an [`Outcome`]
//!
//! Destructive steps are guarded: files are only deleted if their content
//! still hashes to the recorded value, and replaced nodes are moved into a
//! scratch directory rather than deleted so they can be restored.
//!
//! ## Modules
//!
//! - [`config`]: Desired state, manifests and settings
//! - [`permissions`]: Mode, owner and group resolution
//! - [`state`]: Probing, hashing, retention and transaction logs
//! - [`planner`]: Step planning and execution
//! - [`reconciler`]: Invocation contract and status mapping
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! path: /etc/motd
//! state: present
//! type: file
//! mode: "u=rw,go=r"
//! content: "Authorized use only\n"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod permissions;
pub mod planner;
pub mod reconciler;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, ContentPolicy, DesiredState, NodeKind, Presence, Settings};
pub use error::{NodeStateError, Result};
pub use planner::{Plan, PlanExecutor, Planner, Step};
pub use reconciler::{Metadata, Mode, Outcome, Reconciler, Status};
pub use state::{LogDirection, LogFile, ObservedState, Prober, TransactionLog};
