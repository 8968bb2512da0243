//! Drives a [`TestBatch`] through a [`SchedulerBackend`]: submit, poll to
//! completion, then reconcile member statuses against what the batch
//! process actually managed to finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::batching::backend::SchedulerBackend;
use crate::batching::batch::TestBatch;
use crate::core::job::Job;
use crate::core::status::JobState;

/// Submits `batch` via `backend` and blocks until it completes (or
/// `deadline` elapses), then reconciles every member's status.
///
/// Mirrors the cleanup a batch invocation performs once its process exits:
/// any case still `running` or started-but-never-stopped is `cancelled`;
/// any case that never left `ready` is `not_run`.
pub fn run_batch(batch: &TestBatch, backend: &dyn SchedulerBackend, deadline: Option<Duration>) -> std::io::Result<i32> {
    let start = Instant::now();
    debug!(batch = %batch.id(), "submitting batch");
    let handle = backend.submit(batch)?;

    let exit_code = loop {
        if let Some(limit) = deadline {
            if start.elapsed() > limit {
                warn!(batch = %batch.id(), "batch exceeded its submission deadline, cancelling");
                backend.cancel(&handle)?;
                break 1;
            }
        }
        match backend.poll(&handle)? {
            Some(code) => break code,
            None => std::thread::sleep(backend.polling_frequency()),
        }
    };

    batch.refresh();
    reconcile(batch);
    debug!(batch = %batch.id(), exit_code, "batch finished");
    Ok(exit_code)
}

/// Bring every member's status to a terminal state once the batch process
/// has exited, regardless of whether it managed to run every case.
fn reconcile(batch: &TestBatch) {
    for member in batch.members() {
        match member.status().state() {
            JobState::Running => {
                member.set_status(JobState::Cancelled, Some("case failed to stop".to_string()));
                member.save();
            }
            JobState::Ready | JobState::Pending => {
                member.set_status(JobState::NotRun, Some(format!("case failed to start (batch: {})", batch.id())));
                member.save();
            }
            _ => {}
        }
    }
}

/// Build a [`TestBatch`] from already-packed member jobs, assigning it a
/// fresh id.
pub fn batch_from_members(members: Vec<Arc<dyn Job>>) -> TestBatch {
    let id = crate::batching::batch::next_batch_id(&members);
    TestBatch::new(id, members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::backend::{NullBackend, SchedulerBackend, SubmissionHandle};
    use crate::core::job::TestCase;
    use crate::core::resource::ResourceNeed;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        polls_before_done: usize,
        polled: AtomicUsize,
    }

    impl SchedulerBackend for CountingBackend {
        fn submit(&self, _batch: &TestBatch) -> std::io::Result<SubmissionHandle> {
            Ok(SubmissionHandle { jobid: Some("1".to_string()) })
        }

        fn poll(&self, _handle: &SubmissionHandle) -> std::io::Result<Option<i32>> {
            let n = self.polled.fetch_add(1, Ordering::SeqCst);
            Ok((n >= self.polls_before_done).then_some(0))
        }

        fn cancel(&self, _handle: &SubmissionHandle) -> std::io::Result<()> {
            Ok(())
        }

        fn polling_frequency(&self) -> Duration {
            Duration::from_millis(1)
        }
    }

    fn leaf(id: &str) -> Arc<dyn Job> {
        let req = vec![vec![ResourceNeed { kind: "cpus".into(), slots: 1 }]];
        Arc::new(TestCase::new(id, id, vec![], false, 1, Duration::from_secs(1), req, Duration::from_secs(10)))
    }

    #[test]
    fn run_batch_reconciles_unstarted_members_as_not_run() {
        let batch = TestBatch::new("b0", vec![leaf("a"), leaf("b")]);
        let backend = CountingBackend { polls_before_done: 2, polled: AtomicUsize::new(0) };
        let code = run_batch(&batch, &backend, None).unwrap();
        assert_eq!(code, 0);
        assert_eq!(batch.members()[0].status().state(), JobState::NotRun);
    }

    #[test]
    fn run_batch_reconciles_running_member_as_cancelled() {
        let batch = TestBatch::new("b0", vec![leaf("a")]);
        batch.members()[0].set_status(JobState::Running, None);
        let backend = NullBackend::new("true");
        let code = run_batch(&batch, &backend, None).unwrap();
        assert_eq!(code, 0);
        assert_eq!(batch.members()[0].status().state(), JobState::Cancelled);
    }
}
