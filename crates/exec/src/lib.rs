//! Deduplicating, timeout-bounded external-CLI execution.
//!
//! The credential resolver drives Salesforce CLI invocations through this
//! crate: identical concurrent invocations share one process, combined
//! output is capped, timeouts reap the child, and each caller can cancel
//! its own wait without disturbing the others.

pub mod executor;
pub mod login_path;
pub mod runner;
pub mod testing;

pub use executor::{CommandExecutor, CommandOutput, CommandRequest, ExecutionKey};
pub use login_path::LoginPathRecovery;
pub use runner::{CommandSpec, ProcessRunner, RawOutput, TokioProcessRunner};
