//! Gateway Error Taxonomy
//!
//! Every way a command can fail maps to exactly one variant here. Gates 1-3
//! (validation, allow-list, admission) reject synchronously before any
//! process exists; the remaining variants describe what happened to a
//! spawned (or unspawnable) process. The public `execute` surface never
//! returns these directly; they are folded into an `ExecutionResult` so
//! callers only branch on `success`.

use super::validator::ValidationError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Gate 1: the command string itself is unacceptable.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Gate 2: syntactically valid, but no allow-list entry covers it.
    #[error("command is not permitted: no allow-list entry matches '{0}'")]
    Authorization(String),

    /// Gate 3: the concurrent-execution cap is already reached.
    #[error("too many concurrent commands (limit {0}); try again shortly")]
    ConcurrencyLimit(usize),

    /// The external tool could not be located. Kept distinct from every
    /// other category so the UI can offer install instructions instead of a
    /// generic error.
    #[error("{0} tool not found; install it and make sure it is on PATH")]
    ToolNotFound(String),

    /// The tool was found but the process could not be started.
    #[error("execution error: {0}")]
    Execution(String),

    /// The configured deadline elapsed; the process was forcibly terminated.
    #[error("operation timed out after {0}s")]
    Timeout(u64),

    /// The process ran to completion and reported failure.
    #[error("command exited with code {0}")]
    NonZeroExit(i32),

    /// Force-completed by a bulk cancel.
    #[error("command was cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Whether this rejection is a security event (gates 1-2) rather than an
    /// operational failure. Security events are logged under a dedicated
    /// target so an audit collaborator can filter them.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            GatewayError::Validation(_) | GatewayError::Authorization(_)
        )
    }
}
