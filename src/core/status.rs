//! Job status state machine.
//!
//! `created -> pending -> ready -> running -> {terminal}`. Every terminal
//! state carries a [`StatusCategory`] used for aggregation and exit-code
//! precedence.

use serde::{Deserialize, Serialize};

/// A single state in the job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Freshly constructed, dependencies not yet evaluated.
    Created,
    /// At least one dependency has not reached a terminal state.
    Pending,
    /// Every dependency is terminal; eligible for dispatch.
    Ready,
    /// Dispatched to a worker and holding resources.
    Running,
    /// Completed successfully.
    Success,
    /// Completed, ran to conclusion, but did not pass.
    Failed,
    /// Completed, output differed from the expected baseline.
    Diffed,
    /// Killed after exceeding its timeout.
    Timeout,
    /// Never dispatched; a precondition (e.g. a skip directive) held.
    Skipped,
    /// Cancelled before or during execution.
    Cancelled,
    /// Never started (e.g. fail-fast shutdown, or a required dependency was
    /// itself cancelled or not run).
    NotRun,
    /// Became unrunnable for a structural reason (state corruption).
    Invalid,
    /// An internal error occurred while driving the job.
    Error,
}

impl JobState {
    /// States outside `{created, pending, ready, running}` are terminal.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Created | Self::Pending | Self::Ready | Self::Running)
    }

    /// The aggregation category for a terminal state; `None` otherwise.
    pub const fn category(self) -> Option<StatusCategory> {
        match self {
            Self::Success => Some(StatusCategory::Pass),
            Self::Failed | Self::Diffed | Self::Timeout | Self::Invalid | Self::Error => {
                Some(StatusCategory::Fail)
            }
            Self::Skipped => Some(StatusCategory::Skip),
            Self::Cancelled | Self::NotRun => Some(StatusCategory::Cancel),
            Self::Created | Self::Pending | Self::Ready | Self::Running => None,
        }
    }
}

/// Coarse aggregation bucket for a terminal [`JobState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    /// The job ran and met its success criteria.
    Pass,
    /// The job ran but did not meet its success criteria.
    Fail,
    /// The job was intentionally not run.
    Skip,
    /// The job was cancelled or never started due to an external decision.
    Cancel,
}

/// A job's current state plus an optional human-readable reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    state: JobState,
    reason: Option<String>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self { state: JobState::Created, reason: None }
    }
}

impl JobStatus {
    /// Construct a status in the `created` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Current reason, if any was recorded.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Aggregation category of the current state, if terminal.
    pub const fn category(&self) -> Option<StatusCategory> {
        self.state.category()
    }

    /// Transition to `state`, recording an optional reason.
    pub fn set(&mut self, state: JobState, reason: Option<String>) {
        self.state = state;
        self.reason = reason;
    }
}
