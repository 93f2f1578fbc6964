//! Planning and execution.
//!
//! The planner compares desired and observed state and produces an ordered
//! list of steps. The executor applies them, collecting compensators so a
//! failure can be rolled back and a success can be undone later.

mod diff;
mod executor;
mod plan;

pub use diff::Planner;
pub use executor::{ExecutionResult, PlanExecutor};
pub use plan::{Plan, Step};
