//! Error types for the resource pool, queue, and executor.

use thiserror::Error;

use crate::core::job::JobId;

/// Errors produced by [`crate::core::resource_pool::ResourcePool`] operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A requested resource type does not exist in the pool.
    #[error("resource(s) unavailable: {0}")]
    Unavailable(String),
    /// A requested resource type exists but not enough total slots exist to
    /// ever satisfy the request.
    #[error("insufficient slots of {0}")]
    InsufficientSlots(String),
    /// `checkout` could not be satisfied right now, though it may succeed
    /// later once other jobs check resources back in.
    #[error("resource unavailable for checkout")]
    ResourceUnavailable,
    /// The pool has no instances of any type.
    #[error("resource pool is empty")]
    EmptyResourcePool,
    /// `checkin` referenced an id that was never checked out.
    #[error("unknown resource id `{0}` for type `{1}`")]
    UnknownResourceId(String, String),
}

/// Errors produced by [`crate::core::queue::ResourceQueue`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// `put` was called with a job whose status is not `ready`/`pending`.
    #[error("job `{0}` is not in a runnable state")]
    NotRunnable(JobId),
    /// `put` was called with a job whose resource request is empty.
    #[error("job `{0}` has an empty resource request")]
    EmptyRequest(JobId),
    /// `put` was called with a job the pool can never accommodate.
    #[error("job `{0}` can never be accommodated: {1}")]
    NeverAccommodated(JobId, String),
    /// Pool-level error surfaced while dispatching.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors produced by the executor run loop.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The session-wide timeout elapsed before the queue drained.
    #[error("test execution exceeded session timeout of {0:?}")]
    SessionTimeout(std::time::Duration),
    /// Fail-fast triggered: carries the jobs whose terminal status caused
    /// the shutdown.
    #[error("fail-fast triggered by {} job(s)", .0.len())]
    FailFast(Vec<JobId>),
    /// The run was interrupted (Ctrl-C / `q` at the interactive prompt).
    #[error("execution interrupted")]
    Interrupted,
    /// `run()` was called before entering the executor context.
    #[error("executor must be entered before run()")]
    NotEntered,
}

/// Application-facing result using anyhow for CLI-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
