//! Observed state, content hashing, retention and transaction logs.
//!
//! This module covers everything the core reads from or keeps on disk
//! besides the node itself.

mod hash;
mod log;
mod probe;
mod scratch;
mod types;

pub use hash::ContentHasher;
pub use log::{LogDirection, LogFile, TransactionLog, LOG_VERSION};
pub(crate) use log::sync_parent_dir;
pub use probe::Prober;
pub use scratch::ScratchDir;
pub use types::{NodeType, ObservedState};
