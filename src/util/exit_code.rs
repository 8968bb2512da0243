//! Aggregate exit-code computation from a set of finished jobs.

use std::sync::Arc;

use crate::core::job::Job;
use crate::core::status::JobState;

/// Process exit code, in the precedence order the aggregator applies:
/// internal errors and interruption/timeout are reported by the executor
/// directly (see [`crate::core::error::ExecutorError`]); this type covers
/// the steady-state outcome once the queue has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Every job passed (or there were no terminal failures).
    Ok,
    /// At least one job failed, diffed, or reached an invalid/error state.
    Failed,
    /// Execution was interrupted (Ctrl-C or the interactive `q` command).
    Interrupted,
    /// The session-wide timeout elapsed.
    Timeout,
    /// No jobs were ever primed into the queue.
    NoTests,
}

impl ExitCode {
    /// Numeric process exit code.
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Failed => 1,
            Self::Interrupted => 3,
            Self::Timeout => 5,
            Self::NoTests => 7,
        }
    }
}

/// Fold a set of (terminal) job statuses into a single [`ExitCode`].
/// Precedence: timeout > failed/diffed/invalid/error > ok. `NoTests` is
/// returned only when `jobs` is empty.
pub fn compute_exit_code(jobs: &[Arc<dyn Job>]) -> ExitCode {
    if jobs.is_empty() {
        return ExitCode::NoTests;
    }
    let mut any_timeout = false;
    let mut any_fail = false;
    for job in jobs {
        match job.status().state() {
            JobState::Timeout => any_timeout = true,
            JobState::Failed | JobState::Diffed | JobState::Invalid | JobState::Error => {
                any_fail = true;
            }
            _ => {}
        }
    }
    if any_timeout {
        ExitCode::Timeout
    } else if any_fail {
        ExitCode::Failed
    } else {
        ExitCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::TestCase;
    use crate::core::resource::ResourceNeed;
    use std::time::Duration;

    fn job_with(state: JobState) -> Arc<dyn Job> {
        let req = vec![vec![ResourceNeed { kind: "cpus".into(), slots: 1 }]];
        let job = TestCase::new("x", "x", vec![], false, 1, Duration::from_secs(1), req, Duration::from_secs(1));
        job.set_status(state, None);
        Arc::new(job)
    }

    #[test]
    fn empty_is_no_tests() {
        assert_eq!(compute_exit_code(&[]), ExitCode::NoTests);
    }

    #[test]
    fn all_success_is_ok() {
        let jobs = vec![job_with(JobState::Success), job_with(JobState::Skipped)];
        assert_eq!(compute_exit_code(&jobs), ExitCode::Ok);
    }

    #[test]
    fn timeout_outranks_failure() {
        let jobs = vec![job_with(JobState::Failed), job_with(JobState::Timeout)];
        assert_eq!(compute_exit_code(&jobs), ExitCode::Timeout);
    }

    #[test]
    fn failure_outranks_ok() {
        let jobs = vec![job_with(JobState::Success), job_with(JobState::Diffed)];
        assert_eq!(compute_exit_code(&jobs), ExitCode::Failed);
    }
}
