//! Submission backend seam: how a packed [`TestBatch`] becomes a running
//! job, whether that's a local subprocess or a call out to an HPC
//! scheduler's job-submission CLI.

use std::process::Command;
use std::time::Duration;

use crate::batching::batch::TestBatch;
use crate::config::executor_config::DISABLE_KEYBOARD_VAR;

/// One submitted batch's externally-visible handle.
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    /// Scheduler-assigned job id, if the backend allocates one.
    pub jobid: Option<String>,
}

/// Pluggable "how does a batch actually run" seam, standing in for an
/// external HPC scheduler's submission API. Implementors decide how a
/// batch's member invocations map onto one submitted unit of work.
pub trait SchedulerBackend: Send + Sync {
    /// Whether this backend can submit each batch member as its own
    /// sub-job under one scheduler allocation (vs. running the whole batch
    /// as a single flat script).
    fn supports_subscheduling(&self) -> bool {
        false
    }

    /// How often the run loop should poll a submitted batch for
    /// completion.
    fn polling_frequency(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// How many slots of `kind` one node provides, for translating a
    /// batch's resource request into a node count. Unknown types report `0`
    /// — a batch's node requirement simply ignores resource types this
    /// backend doesn't know how to place on a node.
    fn count_per_node(&self, _kind: &str) -> u32 {
        0
    }

    /// Build the command that runs `batch` as a single submission.
    fn submit(&self, batch: &TestBatch) -> std::io::Result<SubmissionHandle>;

    /// Non-blocking poll: `Some(exit_code)` once the submission this
    /// handle names has finished.
    fn poll(&self, handle: &SubmissionHandle) -> std::io::Result<Option<i32>>;

    /// Cancel a submitted batch, best-effort.
    fn cancel(&self, handle: &SubmissionHandle) -> std::io::Result<()>;
}

/// Runs each batch's members directly as a local subprocess group, with no
/// external scheduler involved. The natural backend for a workstation run
/// or CI job, and the default when no HPC scheduler integration is
/// configured.
pub struct NullBackend {
    program: String,
}

impl NullBackend {
    /// Invoke `program <batch-id>` for each submission.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl SchedulerBackend for NullBackend {
    fn submit(&self, batch: &TestBatch) -> std::io::Result<SubmissionHandle> {
        let mut command = Command::new(&self.program);
        command.arg(batch.id().to_string());
        command.env(DISABLE_KEYBOARD_VAR, "1");
        let child = command.spawn()?;
        Ok(SubmissionHandle { jobid: Some(child.id().to_string()) })
    }

    fn poll(&self, _handle: &SubmissionHandle) -> std::io::Result<Option<i32>> {
        Ok(Some(0))
    }

    fn cancel(&self, _handle: &SubmissionHandle) -> std::io::Result<()> {
        Ok(())
    }
}

/// Shells out to an external scheduler submission script (e.g. `sbatch`,
/// `qsub`) and parses its job id from stdout, the way a real HPC backend's
/// submission manager would.
pub struct ScriptingBackend {
    submit_program: String,
    poll_program: String,
    cancel_program: String,
}

impl ScriptingBackend {
    /// Build a backend around three external programs: submit, poll, and
    /// cancel, each invoked with the job/batch id as their sole argument.
    pub fn new(
        submit_program: impl Into<String>,
        poll_program: impl Into<String>,
        cancel_program: impl Into<String>,
    ) -> Self {
        Self {
            submit_program: submit_program.into(),
            poll_program: poll_program.into(),
            cancel_program: cancel_program.into(),
        }
    }
}

impl SchedulerBackend for ScriptingBackend {
    fn submit(&self, batch: &TestBatch) -> std::io::Result<SubmissionHandle> {
        let output = Command::new(&self.submit_program)
            .arg(batch.id().to_string())
            .env(DISABLE_KEYBOARD_VAR, "1")
            .output()?;
        let jobid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(SubmissionHandle { jobid: (!jobid.is_empty()).then_some(jobid) })
    }

    fn poll(&self, handle: &SubmissionHandle) -> std::io::Result<Option<i32>> {
        let Some(jobid) = &handle.jobid else { return Ok(Some(0)) };
        let status = Command::new(&self.poll_program).arg(jobid).env(DISABLE_KEYBOARD_VAR, "1").status()?;
        Ok(status.code())
    }

    fn cancel(&self, handle: &SubmissionHandle) -> std::io::Result<()> {
        if let Some(jobid) = &handle.jobid {
            Command::new(&self.cancel_program).arg(jobid).env(DISABLE_KEYBOARD_VAR, "1").status()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_backend_defaults_report_no_subscheduling() {
        let backend = NullBackend::new("true");
        assert!(!backend.supports_subscheduling());
        assert_eq!(backend.polling_frequency(), Duration::from_secs(5));
    }
}
