//! Permission spec resolution.
//!
//! This module turns mode expressions and owner/group identifiers into
//! the numeric targets the planner compares against observed state.

mod identity;
mod mode;

pub use identity::{resolve_group, resolve_owner};
pub use mode::{resolve_mode, ModeSpec};
