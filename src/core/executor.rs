//! Bounded worker-process loop: dispatches ready jobs from a
//! [`ResourceQueue`] into subprocesses, samples them while running, reaps
//! them on completion or timeout, and enforces fail-fast / session-timeout
//! policy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::executor_config::{keyboard_disabled_by_env, ExecutorConfigFile};
use crate::core::error::ExecutorError;
use crate::core::job::Job;
use crate::core::queue::{DispatchOutcome, ResourceQueue};
use crate::core::status::{JobState, StatusCategory};
use crate::core::worker::{apply_worker_message, new_sampling_system, record_sample, JobRunner, MeasuredChild};
use crate::util::exit_code::{compute_exit_code, ExitCode};
use crate::util::keyboard::{Key, KeyboardWatcher};

/// Tuning knobs for a [`QueueExecutor`] run.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of jobs with live subprocesses at once.
    pub max_workers: usize,
    /// How long the main loop sleeps when the queue is temporarily busy.
    pub busy_wait: Duration,
    /// Wall-clock budget for the whole run; `None` means no session limit.
    pub session_timeout: Option<Duration>,
    /// Multiplier applied to each job's own timeout before it is enforced,
    /// giving slow machines slack without changing authored timeouts.
    pub timeout_multiplier: f64,
    /// Stop dispatching new jobs as soon as any job fails.
    pub fail_fast: bool,
    /// Poll stdin for `s`/`q` interactive commands.
    pub interactive: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
            busy_wait: Duration::from_millis(100),
            session_timeout: None,
            timeout_multiplier: 1.0,
            fail_fast: false,
            interactive: false,
        }
    }
}

struct InFlight {
    child: MeasuredChild,
    job: Arc<dyn Job>,
    effective_timeout: Duration,
}

/// Drives a [`ResourceQueue`] to completion by spawning each dispatched job
/// as a subprocess via `R` and reaping the results.
pub struct QueueExecutor<R: JobRunner> {
    queue: Arc<ResourceQueue>,
    runner: R,
    config: ExecutorConfig,
    inflight: Mutex<HashMap<u32, InFlight>>,
    entered: AtomicBool,
    config_snapshot_path: Mutex<Option<PathBuf>>,
}

impl<R: JobRunner> QueueExecutor<R> {
    /// Build an executor over `queue`, dispatching via `runner`.
    pub fn new(queue: Arc<ResourceQueue>, runner: R, config: ExecutorConfig) -> Self {
        Self {
            queue,
            runner,
            config,
            inflight: Mutex::new(HashMap::new()),
            entered: AtomicBool::new(false),
            config_snapshot_path: Mutex::new(None),
        }
    }

    /// Mark the executor entered, and persist the current configuration to
    /// a temp file. Each spawned worker gets that path as
    /// [`CONFIG_FILE_VAR`](crate::config::executor_config::CONFIG_FILE_VAR)
    /// in its own environment (see [`Self::spawn`]), so this never touches
    /// the parent process's environment. Must be called before [`Self::run`].
    pub fn enter(&self) {
        let snapshot = ExecutorConfigFile::from_config(&self.config);
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                let path = std::env::temp_dir().join(format!("testrig-config-{}.json", std::process::id()));
                match std::fs::write(&path, json) {
                    Ok(()) => *self.config_snapshot_path.lock() = Some(path),
                    Err(err) => warn!(error = %err, "failed to persist executor config snapshot"),
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize executor config snapshot"),
        }
        self.entered.store(true, Ordering::SeqCst);
    }

    /// Mark the executor exited, deleting the config snapshot written by
    /// [`Self::enter`].
    pub fn exit(&self) {
        if let Some(path) = self.config_snapshot_path.lock().take() {
            let _ = std::fs::remove_file(path);
        }
        self.entered.store(false, Ordering::SeqCst);
    }

    /// Run the dispatch loop to completion, returning the aggregate
    /// [`ExitCode`] once the queue drains, or an [`ExecutorError`] if the
    /// run was cut short by a session timeout, fail-fast trip, or
    /// interactive cancellation.
    pub fn run(&self) -> Result<ExitCode, ExecutorError> {
        if !self.entered.load(Ordering::SeqCst) {
            return Err(ExecutorError::NotEntered);
        }
        let start = Instant::now();
        let keyboard = (self.config.interactive && !keyboard_disabled_by_env()).then(KeyboardWatcher::spawn);

        loop {
            if let Some(limit) = self.config.session_timeout {
                if start.elapsed() > limit {
                    warn!(elapsed = ?start.elapsed(), limit = ?limit, "session timeout reached");
                    self.terminate_all();
                    self.queue.clear(JobState::Cancelled);
                    return Err(ExecutorError::SessionTimeout(limit));
                }
            }

            if let Some(watcher) = &keyboard {
                match watcher.poll() {
                    Some(Key::Status) => info!("{}", self.queue.status(start)),
                    Some(Key::Quit) => {
                        warn!("interactive cancellation requested");
                        self.terminate_all();
                        self.queue.clear(JobState::Cancelled);
                        return Err(ExecutorError::Interrupted);
                    }
                    None => {}
                }
            }

            self.reap_finished();

            if self.config.fail_fast {
                let failed = self.first_fail();
                if !failed.is_empty() {
                    warn!(?failed, "fail-fast triggered");
                    self.terminate_all();
                    self.queue.clear(JobState::NotRun);
                    return Err(ExecutorError::FailFast(failed));
                }
            }

            let at_capacity = self.inflight.lock().len() >= self.config.max_workers;
            if at_capacity {
                std::thread::sleep(self.config.busy_wait);
                continue;
            }

            match self.queue.next() {
                DispatchOutcome::Dispatched(job) => {
                    self.spawn(job);
                }
                DispatchOutcome::Busy => {
                    std::thread::sleep(self.config.busy_wait);
                }
                DispatchOutcome::Empty => {
                    if self.inflight.lock().is_empty() {
                        break;
                    }
                    std::thread::sleep(self.config.busy_wait);
                }
            }
        }

        self.wait_all();
        Ok(compute_exit_code(&self.queue.cases()))
    }

    fn spawn(&self, job: Arc<dyn Job>) {
        let config_path = self.config_snapshot_path.lock().clone();
        match MeasuredChild::spawn(&self.runner, job.as_ref(), config_path.as_deref()) {
            Ok(child) => {
                let base = job.timeout();
                let effective_timeout =
                    Duration::from_secs_f64(base.as_secs_f64() * self.config.timeout_multiplier);
                let pid = child.pid();
                debug!(job = %job.id(), pid, "spawned worker");
                self.inflight.lock().insert(pid, InFlight { child, job, effective_timeout });
            }
            Err(err) => {
                warn!(job = %job.id(), error = %err, "failed to spawn worker process");
                job.set_status(JobState::Error, Some(err.to_string()));
                self.queue.done(job);
            }
        }
    }

    /// Sweep timed-out jobs, then harvest anything that finished naturally.
    fn reap_finished(&self) {
        self.sweep_timeouts();

        let mut system = new_sampling_system();
        let mut done = Vec::new();
        {
            let mut inflight = self.inflight.lock();
            for (pid, entry) in inflight.iter_mut() {
                if let Some(sample) = entry.child.sample(&mut system) {
                    record_sample(entry.job.as_ref(), sample);
                }
                if let Some(message) = entry.child.try_result() {
                    apply_worker_message(entry.job.as_ref(), &message);
                    done.push(*pid);
                    continue;
                }
                match entry.child.try_wait() {
                    Ok(Some(_)) => done.push(*pid),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(job = %entry.job.id(), error = %err, "error polling worker process");
                        done.push(*pid);
                    }
                }
            }
        }

        let mut finished = Vec::new();
        {
            let mut inflight = self.inflight.lock();
            for pid in &done {
                if let Some(mut entry) = inflight.remove(pid) {
                    if entry.job.status().state() == JobState::Running {
                        entry.job.set_status(JobState::Error, Some("worker exited without a result".into()));
                    }
                    let _ = entry.child.wait();
                    finished.push(entry.job);
                }
            }
        }
        for job in finished {
            job.save();
            self.queue.done(job);
        }
    }

    fn sweep_timeouts(&self) {
        let mut system = new_sampling_system();
        let mut timed_out = Vec::new();
        {
            let mut inflight = self.inflight.lock();
            for (pid, entry) in inflight.iter_mut() {
                if entry.child.elapsed() > entry.effective_timeout {
                    if let Some(sample) = entry.child.sample(&mut system) {
                        record_sample(entry.job.as_ref(), sample);
                    }
                    timed_out.push(*pid);
                }
            }
            for pid in &timed_out {
                if let Some(mut entry) = inflight.remove(pid) {
                    warn!(job = %entry.job.id(), timeout = ?entry.effective_timeout, "job timed out");
                    entry.child.terminate();
                    std::thread::sleep(Duration::from_millis(500));
                    let _ = entry.child.kill();
                    let _ = entry.child.wait();
                    entry.job.set_status(JobState::Timeout, Some(format!("exceeded {:?}", entry.effective_timeout)));
                    self.queue.done(Arc::clone(&entry.job));
                }
            }
        }
    }

    /// Drain `inflight` by repeatedly reaping until every spawned job has a
    /// terminal result.
    fn wait_all(&self) {
        while !self.inflight.lock().is_empty() {
            self.reap_finished();
            std::thread::sleep(self.config.busy_wait);
        }
    }

    /// Terminate every in-flight worker process, marking each job cancelled.
    fn terminate_all(&self) {
        let mut inflight = self.inflight.lock();
        for (_, entry) in inflight.iter() {
            entry.child.terminate();
        }
        drop(inflight);
        std::thread::sleep(Duration::from_secs(1));
        let mut inflight = self.inflight.lock();
        let mut entries: Vec<_> = inflight.drain().collect();
        drop(inflight);
        for (_, mut entry) in entries.drain(..) {
            let _ = entry.child.kill();
            let _ = entry.child.wait();
            entry.job.set_status(JobState::Cancelled, Some("run terminated".into()));
            self.queue.done(entry.job);
        }
    }

    /// Jobs whose terminal state falls into [`StatusCategory::Fail`].
    fn first_fail(&self) -> Vec<crate::core::job::JobId> {
        self.queue
            .cases()
            .into_iter()
            .filter(|job| job.status().category() == Some(StatusCategory::Fail))
            .map(|job| job.id().clone())
            .collect()
    }
}
