//! The abstract job surface the queue and executor operate on, and a
//! concrete in-memory implementation (`TestCase`) for driving it.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::resource::{AcquiredResources, ResourceRequest};
use crate::core::status::{JobState, JobStatus, StatusCategory};

/// A stable job identity. Callers are expected to derive this from job
/// content (e.g. a hash of name + parameters) so it is reproducible across
/// runs; this crate does not enforce how it is computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One resource-usage sample taken while a job is running.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    /// CPU usage at sample time, as a percentage (100.0 = one full core).
    pub cpu_percent: f32,
    /// Resident set size, in megabytes.
    pub rss_mb: f64,
    /// Virtual memory size, in megabytes.
    pub vms_mb: f64,
    /// Thread count, if the sampler could determine it.
    pub threads: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct MetricAccum {
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl MetricAccum {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }

    fn stats(&self) -> Option<MetricStats> {
        (self.count > 0).then(|| MetricStats { min: self.min, max: self.max, ave: self.sum / self.count as f64 })
    }
}

/// Summary statistics for one sampled metric over a job's lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    /// Minimum observed value.
    pub min: f64,
    /// Maximum observed value.
    pub max: f64,
    /// Arithmetic mean of observed values.
    pub ave: f64,
}

/// An accumulating bag of resource-usage samples for a single job.
#[derive(Debug, Clone, Default)]
pub struct MeasurementBag {
    cpu: MetricAccum,
    rss: MetricAccum,
    vms: MetricAccum,
    duration: Option<Duration>,
    sample_count: u64,
}

impl MeasurementBag {
    /// Empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample.
    pub fn add_measurement(&mut self, sample: Measurement) {
        self.cpu.add(f64::from(sample.cpu_percent));
        self.rss.add(sample.rss_mb);
        self.vms.add(sample.vms_mb);
        self.sample_count += 1;
    }

    /// Record the wall-clock duration of the job's run.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    /// Merge another bag's samples into this one. Used when a timeout sweep
    /// harvests a partial set of samples before the natural reaper later
    /// collects the rest.
    pub fn update(&mut self, other: &Self) {
        self.cpu.merge(&other.cpu);
        self.rss.merge(&other.rss);
        self.vms.merge(&other.vms);
        self.sample_count += other.sample_count;
        if let Some(d) = other.duration {
            self.duration = Some(d);
        }
    }

    /// CPU-percent statistics across all recorded samples.
    pub fn cpu_stats(&self) -> Option<MetricStats> {
        self.cpu.stats()
    }

    /// Resident-set-size statistics across all recorded samples.
    pub fn rss_stats(&self) -> Option<MetricStats> {
        self.rss.stats()
    }

    /// Virtual-memory-size statistics across all recorded samples.
    pub fn vms_stats(&self) -> Option<MetricStats> {
        self.vms.stats()
    }

    /// Wall-clock runtime, if recorded.
    pub const fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Number of samples recorded.
    pub const fn sample_count(&self) -> u64 {
        self.sample_count
    }
}

/// The abstract surface the queue, pool, and executor manipulate. A job's
/// own state (status, resources, measurements) is interior-mutable so the
/// trait can be shared as `Arc<dyn Job>` across the scheduler thread and the
/// worker that owns it.
pub trait Job: Send + Sync {
    /// Stable identity.
    fn id(&self) -> &JobId;
    /// Human-readable name for logging/reporting.
    fn display_name(&self) -> &str;
    /// Current status.
    fn status(&self) -> JobStatus;
    /// Overwrite the status.
    fn set_status(&self, state: JobState, reason: Option<String>);
    /// Ids of jobs this job depends on.
    fn dependencies(&self) -> Vec<JobId>;
    /// Called by the queue when a dependency reaches a terminal state, so
    /// `pending -> ready` promotion can be recomputed without re-walking the
    /// whole dependency graph.
    fn on_dependency_finished(&self, dep_id: &JobId, dep_state: JobState);
    /// Whether this job precludes any other job from running concurrently.
    fn exclusive(&self) -> bool;
    /// Scalar used to order the queue's heap; larger pops first.
    fn cost(&self) -> f64;
    /// Resources this job needs to run.
    fn required_resources(&self) -> ResourceRequest;
    /// Wall-clock budget before the executor kills this job.
    fn timeout(&self) -> Duration;
    /// Record the resources checked out on this job's behalf.
    fn assign_resources(&self, acquired: AcquiredResources);
    /// Take back the resources previously assigned, for `checkin`.
    fn free_resources(&self) -> AcquiredResources;
    /// Merge a measurement bag into this job's own.
    fn add_measurements(&self, bag: &MeasurementBag);
    /// Snapshot of this job's measurements so far.
    fn measurements(&self) -> MeasurementBag;
    /// Record the measured wall-clock runtime of the job's single run.
    fn set_runtime(&self, runtime: Duration);
    /// The measured wall-clock runtime, if the job has finished at least
    /// once.
    fn runtime(&self) -> Option<Duration>;
    /// Re-read any externally persisted state (workspace, result file). A
    /// no-op for jobs with no external persistence.
    fn refresh(&self) {}
    /// Persist current state externally. A no-op for jobs with no external
    /// persistence.
    fn save(&self) {}
}

struct TestCaseState {
    status: JobStatus,
    dependency_states: HashMap<JobId, JobState>,
    resources: Option<AcquiredResources>,
    measurements: MeasurementBag,
    runtime: Option<Duration>,
}

/// A concrete, in-memory [`Job`] implementation. Stands in for the
/// session/workspace-backed test case an external discovery layer would
/// otherwise supply; `refresh`/`save` are no-ops here.
pub struct TestCase {
    id: JobId,
    display_name: String,
    dependencies: Vec<JobId>,
    exclusive: bool,
    cpus: u32,
    runtime_estimate: Duration,
    required_resources: ResourceRequest,
    timeout: Duration,
    state: Mutex<TestCaseState>,
}

impl TestCase {
    /// Build a new test case. `required_resources` is typically one group
    /// with `cpus` slots matching `cpus`, per
    /// [`crate::core::resource::ResourceNeed`] convention.
    pub fn new(
        id: impl Into<JobId>,
        display_name: impl Into<String>,
        dependencies: Vec<JobId>,
        exclusive: bool,
        cpus: u32,
        runtime_estimate: Duration,
        required_resources: ResourceRequest,
        timeout: Duration,
    ) -> Self {
        let id = id.into();
        let initial_state = if dependencies.is_empty() { JobState::Ready } else { JobState::Pending };
        Self {
            id,
            display_name: display_name.into(),
            dependencies,
            exclusive,
            cpus,
            runtime_estimate,
            required_resources,
            timeout,
            state: Mutex::new(TestCaseState {
                status: {
                    let mut s = JobStatus::new();
                    s.set(initial_state, None);
                    s
                },
                dependency_states: HashMap::new(),
                resources: None,
                measurements: MeasurementBag::new(),
                runtime: None,
            }),
        }
    }

    /// `cpus x runtime_estimate`, the default cost function.
    pub fn default_cost(&self) -> f64 {
        f64::from(self.cpus) * self.runtime_estimate.as_secs_f64()
    }
}

impl Job for TestCase {
    fn id(&self) -> &JobId {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn status(&self) -> JobStatus {
        self.state.lock().status.clone()
    }

    fn set_status(&self, state: JobState, reason: Option<String>) {
        self.state.lock().status.set(state, reason);
    }

    fn dependencies(&self) -> Vec<JobId> {
        self.dependencies.clone()
    }

    fn on_dependency_finished(&self, dep_id: &JobId, dep_state: JobState) {
        let mut guard = self.state.lock();
        guard.dependency_states.insert(dep_id.clone(), dep_state);
        if guard.status.state() != JobState::Pending {
            return;
        }
        let all_terminal = self
            .dependencies
            .iter()
            .all(|d| guard.dependency_states.get(d).is_some_and(|s| s.is_terminal()));
        if all_terminal {
            guard.status.set(JobState::Ready, None);
        }
    }

    fn exclusive(&self) -> bool {
        self.exclusive
    }

    fn cost(&self) -> f64 {
        self.default_cost()
    }

    fn required_resources(&self) -> ResourceRequest {
        self.required_resources.clone()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn assign_resources(&self, acquired: AcquiredResources) {
        self.state.lock().resources = Some(acquired);
    }

    fn free_resources(&self) -> AcquiredResources {
        self.state.lock().resources.take().unwrap_or_default()
    }

    fn add_measurements(&self, bag: &MeasurementBag) {
        self.state.lock().measurements.update(bag);
    }

    fn measurements(&self) -> MeasurementBag {
        self.state.lock().measurements.clone()
    }

    fn set_runtime(&self, runtime: Duration) {
        self.state.lock().runtime = Some(runtime);
    }

    fn runtime(&self) -> Option<Duration> {
        self.state.lock().runtime
    }
}

/// Aggregate a set of jobs' statuses into a single precedence-ordered
/// category count, used for human-readable summaries and exit codes.
pub fn category_counts(statuses: impl IntoIterator<Item = JobStatus>) -> HashMap<StatusCategory, usize> {
    let mut counts = HashMap::new();
    for status in statuses {
        if let Some(category) = status.category() {
            *counts.entry(category).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::ResourceNeed;

    fn cpu_request(n: u32) -> ResourceRequest {
        vec![(0..n).map(|_| ResourceNeed { kind: "cpus".into(), slots: 1 }).collect()]
    }

    #[test]
    fn no_dependencies_starts_ready() {
        let job = TestCase::new("a", "a", vec![], false, 1, Duration::from_secs(1), cpu_request(1), Duration::from_secs(60));
        assert_eq!(job.status().state(), JobState::Ready);
    }

    #[test]
    fn with_dependencies_starts_pending_then_promotes() {
        let job = TestCase::new(
            "b",
            "b",
            vec![JobId::from("a")],
            false,
            1,
            Duration::from_secs(1),
            cpu_request(1),
            Duration::from_secs(60),
        );
        assert_eq!(job.status().state(), JobState::Pending);
        job.on_dependency_finished(&JobId::from("a"), JobState::Success);
        assert_eq!(job.status().state(), JobState::Ready);
    }

    #[test]
    fn measurement_bag_merges() {
        let mut a = MeasurementBag::new();
        a.add_measurement(Measurement { cpu_percent: 10.0, rss_mb: 100.0, vms_mb: 200.0, threads: Some(2) });
        let mut b = MeasurementBag::new();
        b.add_measurement(Measurement { cpu_percent: 20.0, rss_mb: 150.0, vms_mb: 250.0, threads: Some(3) });
        a.update(&b);
        assert_eq!(a.sample_count(), 2);
        let stats = a.cpu_stats().unwrap();
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 20.0);
        assert_eq!(stats.ave, 15.0);
    }
}
