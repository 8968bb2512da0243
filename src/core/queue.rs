//! Priority resource queue: cost-ordered dispatch gated on dependencies,
//! exclusivity, and resource availability.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::error::QueueError;
use crate::core::job::{Job, JobId};
use crate::core::resource::request_is_empty;
use crate::core::resource_pool::ResourcePool;
use crate::core::status::{JobState, StatusCategory};

struct HeapEntry {
    cost: f64,
    job: Arc<dyn Job>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is already a max-heap, so the highest-cost job pops
        // first with no sign flip needed.
        self.cost.total_cmp(&other.cost)
    }
}

/// Result of asking the queue for the next job to dispatch.
pub enum DispatchOutcome {
    /// A job was dispatched; its resources are already checked out.
    Dispatched(Arc<dyn Job>),
    /// Nothing is runnable right now (deps pending or resources busy), but
    /// work remains. The caller should back off briefly and retry.
    Busy,
    /// No work remains anywhere in the queue.
    Empty,
}

/// Emits a diagnostic at exponentially increasing intervals while the
/// "reason nothing can run" signature stays the same, resetting on any
/// change. Keeps a busy queue from flooding logs.
pub struct AdaptiveDebugLogger {
    min_interval: Duration,
    max_interval: Duration,
    growth: f64,
    interval: Duration,
    last_emit: Option<Instant>,
    last_signature: Option<String>,
}

impl Default for AdaptiveDebugLogger {
    fn default() -> Self {
        let min_interval = Duration::from_secs_f64(10.0);
        Self {
            min_interval,
            max_interval: Duration::from_secs_f64(120.0),
            growth: 1.6,
            interval: min_interval,
            last_emit: None,
            last_signature: None,
        }
    }
}

impl AdaptiveDebugLogger {
    /// Emit `msg` if `signature` changed since the last emission, or if the
    /// backoff interval has elapsed.
    pub fn emit(&mut self, signature: &str, msg: &str) {
        let now = Instant::now();
        if self.last_signature.as_deref() != Some(signature) {
            self.interval = self.min_interval;
            self.last_signature = Some(signature.to_string());
            tracing::debug!("{msg}");
            self.last_emit = Some(now);
            return;
        }
        let due = self.last_emit.is_none_or(|t| now.duration_since(t) >= self.interval);
        if due {
            tracing::debug!("{msg}");
            self.last_emit = Some(now);
            self.interval = self.interval.mul_f64(self.growth).min(self.max_interval);
        }
    }
}

struct QueueState {
    heap: BinaryHeap<HeapEntry>,
    busy: HashMap<JobId, Arc<dyn Job>>,
    finished: HashMap<JobId, Arc<dyn Job>>,
    dependents: HashMap<JobId, Vec<JobId>>,
    exclusive_holder: Option<JobId>,
    /// Every job ever `put`, regardless of which bucket currently holds it.
    /// Used to notify dependents by id without caring where they live.
    all: HashMap<JobId, Arc<dyn Job>>,
}

/// Dispatches jobs against a [`ResourcePool`] in cost-priority order,
/// respecting dependencies and exclusivity.
pub struct ResourceQueue {
    pool: Arc<ResourcePool>,
    state: Mutex<QueueState>,
    logger: Mutex<AdaptiveDebugLogger>,
}

impl ResourceQueue {
    /// Build an empty queue bound to `pool`.
    pub fn new(pool: Arc<ResourcePool>) -> Self {
        Self {
            pool,
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                busy: HashMap::new(),
                finished: HashMap::new(),
                dependents: HashMap::new(),
                exclusive_holder: None,
                all: HashMap::new(),
            }),
            logger: Mutex::new(AdaptiveDebugLogger::default()),
        }
    }

    /// Prime the queue with a job. The job's status must be `ready` or
    /// `pending`, its resource request must be non-empty, and the pool must
    /// be able to accommodate it eventually.
    pub fn put(&self, job: Arc<dyn Job>) -> Result<(), QueueError> {
        let status = job.status();
        if !matches!(status.state(), JobState::Ready | JobState::Pending) {
            return Err(QueueError::NotRunnable(job.id().clone()));
        }
        let request = job.required_resources();
        if request_is_empty(&request) {
            return Err(QueueError::EmptyRequest(job.id().clone()));
        }
        self.pool
            .accommodates(&request)
            .map_err(|e| QueueError::NeverAccommodated(job.id().clone(), e.to_string()))?;

        let mut state = self.state.lock();
        for dep in job.dependencies() {
            state.dependents.entry(dep).or_default().push(job.id().clone());
        }
        state.all.insert(job.id().clone(), job.clone());
        state.heap.push(HeapEntry { cost: job.cost(), job });
        Ok(())
    }

    /// `true` if no job remains in the heap or busy set.
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.heap.is_empty() && state.busy.is_empty()
    }

    /// Pop and classify jobs from the heap until one dispatches, the heap is
    /// exhausted with deferrals (`Busy`), or the heap is exhausted with none
    /// (`Empty`).
    pub fn next(&self) -> DispatchOutcome {
        let mut state = self.state.lock();
        let mut deferred = Vec::new();
        let mut dispatched = None;

        while let Some(entry) = state.heap.pop() {
            let job = entry.job.clone();

            if let Some(holder) = state.exclusive_holder.clone() {
                if &holder != job.id() {
                    deferred.push(entry);
                    continue;
                }
            }

            let status = job.status();
            if status.category() == Some(StatusCategory::Skip) {
                state.finished.insert(job.id().clone(), job);
                continue;
            }
            if !matches!(status.state(), JobState::Ready | JobState::Pending) {
                job.set_status(JobState::Error, Some("state became unrunnable".to_string()));
                state.finished.insert(job.id().clone(), job);
                continue;
            }
            if status.state() != JobState::Ready {
                deferred.push(entry);
                continue;
            }

            match self.pool.checkout(&job.required_resources()) {
                Ok(acquired) => {
                    job.assign_resources(acquired);
                    job.set_status(JobState::Running, None);
                    if job.exclusive() {
                        state.exclusive_holder = Some(job.id().clone());
                    }
                    state.busy.insert(job.id().clone(), job.clone());
                    dispatched = Some(job);
                    break;
                }
                Err(_) => deferred.push(entry),
            }
        }

        let had_deferred = !deferred.is_empty();
        for entry in deferred {
            state.heap.push(entry);
        }

        if let Some(job) = dispatched {
            return DispatchOutcome::Dispatched(job);
        }
        if had_deferred {
            self.logger.lock().emit("busy", "queue busy: no job currently runnable");
            DispatchOutcome::Busy
        } else {
            DispatchOutcome::Empty
        }
    }

    /// Mark `job` finished: release its resources, clear exclusivity if it
    /// held it, and notify dependents so they can re-evaluate readiness.
    pub fn done(&self, job: Arc<dyn Job>) {
        let mut state = self.state.lock();
        let id = job.id().clone();
        state.busy.remove(&id);
        if state.exclusive_holder.as_ref() == Some(&id) {
            state.exclusive_holder = None;
        }
        let freed = job.free_resources();
        if let Err(err) = self.pool.checkin(&freed) {
            tracing::error!(job = %id, error = %err, "failed to check resources back in");
        }
        let new_state = job.status().state();
        if let Some(dependents) = state.dependents.get(&id).cloned() {
            for dep_id in dependents {
                if let Some(dep_job) = state.all.get(&dep_id).cloned() {
                    dep_job.on_dependency_finished(&id, new_state);
                }
            }
        }
        state.finished.insert(id, job);
    }

    /// Drain the heap, setting each popped job's status (default
    /// `cancelled`) and moving it to `finished`.
    pub fn clear(&self, state_on_clear: JobState) {
        let mut state = self.state.lock();
        while let Some(entry) = state.heap.pop() {
            entry.job.set_status(state_on_clear, Some("queue cleared".to_string()));
            state.finished.insert(entry.job.id().clone(), entry.job);
        }
    }

    /// Every job ever primed into this queue, in no particular order.
    pub fn cases(&self) -> Vec<Arc<dyn Job>> {
        self.state.lock().all.values().cloned().collect()
    }

    /// Human-readable status summary, counts per category.
    pub fn status(&self, start: Instant) -> String {
        let counts = crate::core::job::category_counts(self.cases().iter().map(|j| j.status()));
        let pass = counts.get(&StatusCategory::Pass).copied().unwrap_or(0);
        let fail = counts.get(&StatusCategory::Fail).copied().unwrap_or(0);
        let skip = counts.get(&StatusCategory::Skip).copied().unwrap_or(0);
        let cancel = counts.get(&StatusCategory::Cancel).copied().unwrap_or(0);
        let elapsed = start.elapsed();
        format!(
            "elapsed={elapsed:.1?} pass={pass} fail={fail} skip={skip} cancel={cancel}"
        )
    }
}
