//! Restore engine for SQL dump playback.
//!
//! A dump is replayed one statement at a time: [`classify`] sorts each
//! statement into a [`StatementCategory`], a [`RestoreExecutor`] applies the
//! operator's [`RestoreOptions`] policy for that category, and a
//! [`RestoreLog`] keeps a bounded account of everything that was executed,
//! skipped, queued, deferred, blocked, or failed. Ownership transfers,
//! privilege grants, and statements that would alter the acting role are
//! held back and replayed by [`RestoreExecutor::finalize`] once the objects
//! they refer to exist. [`DependencyGraph`] orders object creation so that
//! dependencies come first and reports any cycles it had to break.

mod classify;
mod dependencies;
mod execute;
mod log;
mod options;

pub use classify::{classify, StatementCategory};
pub use dependencies::{DependencyGraph, DependencyNode, NodeId, ObjectKind, SortResult};
pub use execute::{ExecuteError, ExecutionState, RestoreExecutor};
pub use log::{Disposition, LogEntry, RestoreLog, RunSummary};
pub use options::{ErrorMode, RestoreOptions};
