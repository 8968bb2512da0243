//! `TestBatch`: a group of jobs submitted and scheduled together as a
//! single unit of work, implementing [`Job`] so it can flow through the
//! same [`crate::core::queue::ResourceQueue`] as an individual test case.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::batching::backend::SchedulerBackend;
use crate::core::job::{Job, JobId, MeasurementBag};
use crate::core::resource::{slots_needed_by_type, AcquiredResources, ResourceNeed, ResourceRequest};
use crate::core::status::{JobState, JobStatus};

struct BatchState {
    status: JobStatus,
    dependency_states: HashMap<JobId, JobState>,
    resources: Option<AcquiredResources>,
    measurements: MeasurementBag,
    runtime: Option<Duration>,
}

/// A batch of jobs dispatched as one subprocess submission. Its own
/// `cpus` footprint is the peak single-case requirement across its members
/// (one submission slot can run its members serially or via a
/// sub-scheduler, but the batch as a whole never needs more than the
/// largest member needs at once).
pub struct TestBatch {
    id: JobId,
    display_name: String,
    members: Vec<Arc<dyn Job>>,
    external_dependencies: Vec<JobId>,
    cpus: u32,
    runtime_estimate: Duration,
    state: Mutex<BatchState>,
}

impl TestBatch {
    /// Group `members` into a batch. `members` must be non-empty.
    pub fn new(id: impl Into<String>, members: Vec<Arc<dyn Job>>) -> Self {
        assert!(!members.is_empty(), "a batch must contain at least one job");
        let cpus = members
            .iter()
            .map(|m| {
                m.required_resources().iter().flatten().filter(|n| n.kind == "cpus").map(|n| n.slots).sum::<u32>()
            })
            .max()
            .unwrap_or(1)
            .max(1);
        let runtime_estimate = members.iter().map(|m| m.timeout()).sum();

        let member_ids: HashSet<JobId> = members.iter().map(|m| m.id().clone()).collect();
        let external_dependencies: Vec<JobId> = members
            .iter()
            .flat_map(|m| m.dependencies())
            .filter(|d| !member_ids.contains(d))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let display_name = display_name_for(&members);
        let initial = if external_dependencies.is_empty() { JobState::Ready } else { JobState::Pending };
        Self {
            id: JobId(id.into()),
            display_name,
            members,
            external_dependencies,
            cpus,
            runtime_estimate,
            state: Mutex::new(BatchState {
                status: {
                    let mut s = JobStatus::new();
                    s.set(initial, None);
                    s
                },
                dependency_states: HashMap::new(),
                resources: None,
                measurements: MeasurementBag::new(),
                runtime: None,
            }),
        }
    }

    /// The jobs grouped into this batch.
    pub fn members(&self) -> &[Arc<dyn Job>] {
        &self.members
    }

    /// Wall-clock duration estimate the batch was created with: the sum of
    /// each member's own timeout, a conservative stand-in for the
    /// perimeter-based packing estimate an external caller may refine once
    /// the members have actually been tiled by [`crate::batching::packer`].
    pub fn estimated_runtime(&self) -> Duration {
        self.runtime_estimate
    }

    /// Node count `backend` would need to host this batch's peak
    /// per-type resource requirement. A resource type `backend` doesn't
    /// know how to place on a node (`count_per_node` returns `0`)
    /// contributes zero nodes rather than failing the computation.
    pub fn nodes_required(&self, backend: &dyn SchedulerBackend) -> u32 {
        let mut peak: HashMap<String, u32> = HashMap::new();
        for member in &self.members {
            for (kind, slots) in slots_needed_by_type(&member.required_resources()) {
                let entry = peak.entry(kind).or_insert(0);
                *entry = (*entry).max(slots);
            }
        }
        peak.into_iter()
            .filter_map(|(kind, slots)| {
                let per_node = backend.count_per_node(&kind);
                (per_node > 0).then(|| slots.div_ceil(per_node))
            })
            .max()
            .unwrap_or(0)
    }
}

fn display_name_for(members: &[Arc<dyn Job>]) -> String {
    match members.len() {
        1 => members[0].display_name().to_string(),
        n if n <= 3 => members.iter().map(Job::display_name).collect::<Vec<_>>().join(","),
        n => format!("{},...,{} ({n} cases)", members[0].display_name(), members[n - 1].display_name()),
    }
}

impl Job for TestBatch {
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
        self.state.lock().status.set(state, reason.clone());
        if state.is_terminal() {
            for member in &self.members {
                if !member.status().state().is_terminal() {
                    member.set_status(state, reason.clone());
                }
            }
        }
    }

    fn dependencies(&self) -> Vec<JobId> {
        self.external_dependencies.clone()
    }

    fn on_dependency_finished(&self, dep_id: &JobId, dep_state: JobState) {
        for member in &self.members {
            member.on_dependency_finished(dep_id, dep_state);
        }
        let mut guard = self.state.lock();
        guard.dependency_states.insert(dep_id.clone(), dep_state);
        if guard.status.state() != JobState::Pending {
            return;
        }
        let all_terminal = self
            .external_dependencies
            .iter()
            .all(|d| guard.dependency_states.get(d).is_some_and(|s| s.is_terminal()));
        if all_terminal {
            guard.status.set(JobState::Ready, None);
        }
    }

    fn exclusive(&self) -> bool {
        self.members.iter().any(|m| m.exclusive())
    }

    fn cost(&self) -> f64 {
        f64::from(self.cpus) * self.runtime_estimate.as_secs_f64()
    }

    fn required_resources(&self) -> ResourceRequest {
        vec![vec![ResourceNeed { kind: "cpus".to_string(), slots: self.cpus }]]
    }

    fn timeout(&self) -> Duration {
        self.members.iter().map(|m| m.timeout()).max().unwrap_or(Duration::from_secs(60)) + self.runtime_estimate
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

    fn refresh(&self) {
        for member in &self.members {
            member.refresh();
        }
    }

    fn save(&self) {
        for member in &self.members {
            member.save();
        }
    }
}

static BATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Derive a batch id from its members' ids: a monotonic counter plus a
/// content fingerprint, standing in for the original's hash-of-joined-ids
/// scheme without pulling in a hashing crate for one call site.
pub fn next_batch_id(members: &[Arc<dyn Job>]) -> String {
    let n = BATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut fingerprint: u64 = 0xcbf2_9ce4_8422_2325;
    for member in members {
        for byte in member.id().0.bytes() {
            fingerprint ^= u64::from(byte);
            fingerprint = fingerprint.wrapping_mul(0x0000_0100_0000_01B3);
        }
    }
    format!("batch-{n}-{fingerprint:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::TestCase;

    fn leaf(id: &str, deps: Vec<JobId>) -> Arc<dyn Job> {
        let req = vec![vec![ResourceNeed { kind: "cpus".into(), slots: 2 }]];
        Arc::new(TestCase::new(id, id, deps, false, 2, Duration::from_secs(10), req, Duration::from_secs(30)))
    }

    #[test]
    fn batch_cpus_is_peak_member_requirement() {
        let batch = TestBatch::new("b0", vec![leaf("a", vec![]), leaf("b", vec![])]);
        assert_eq!(batch.cpus, 2);
    }

    #[test]
    fn batch_with_only_internal_deps_starts_ready() {
        let a = leaf("a", vec![]);
        let b = leaf("b", vec![JobId::from("a")]);
        let batch = TestBatch::new("b0", vec![a, b]);
        assert_eq!(batch.status().state(), JobState::Ready);
    }

    #[test]
    fn batch_with_external_dep_starts_pending_then_promotes() {
        let a = leaf("a", vec![JobId::from("outside")]);
        let batch = TestBatch::new("b0", vec![a]);
        assert_eq!(batch.status().state(), JobState::Pending);
        batch.on_dependency_finished(&JobId::from("outside"), JobState::Success);
        assert_eq!(batch.status().state(), JobState::Ready);
    }

    #[test]
    fn setting_terminal_status_propagates_to_members() {
        let batch = TestBatch::new("b0", vec![leaf("a", vec![]), leaf("b", vec![])]);
        batch.set_status(JobState::Success, None);
        assert_eq!(batch.members()[0].status().state(), JobState::Success);
        assert_eq!(batch.members()[1].status().state(), JobState::Success);
    }

    struct FixedNodeBackend {
        cpus_per_node: u32,
    }

    impl SchedulerBackend for FixedNodeBackend {
        fn count_per_node(&self, kind: &str) -> u32 {
            if kind == "cpus" { self.cpus_per_node } else { 0 }
        }

        fn submit(&self, _batch: &TestBatch) -> std::io::Result<crate::batching::backend::SubmissionHandle> {
            Ok(crate::batching::backend::SubmissionHandle { jobid: None })
        }

        fn poll(&self, _handle: &crate::batching::backend::SubmissionHandle) -> std::io::Result<Option<i32>> {
            Ok(Some(0))
        }

        fn cancel(&self, _handle: &crate::batching::backend::SubmissionHandle) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn nodes_required_divides_peak_slots_by_backend_capacity() {
        let batch = TestBatch::new("b0", vec![leaf("a", vec![]), leaf("b", vec![])]);
        let backend = FixedNodeBackend { cpus_per_node: 1 };
        // peak cpus requirement across members is 2 (each leaf needs 2 cpus).
        assert_eq!(batch.nodes_required(&backend), 2);
    }

    #[test]
    fn nodes_required_ignores_resource_types_the_backend_does_not_know() {
        let batch = TestBatch::new("b0", vec![leaf("a", vec![])]);
        let backend = FixedNodeBackend { cpus_per_node: 0 };
        assert_eq!(batch.nodes_required(&backend), 0);
    }
}
