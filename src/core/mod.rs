//! Core scheduling abstractions: resource accounting, job contracts, the
//! dispatch queue, worker-process supervision, and the executor loop tying
//! them together.

pub mod error;
pub mod executor;
pub mod job;
pub mod queue;
pub mod resource;
pub mod resource_pool;
pub mod status;
pub mod worker;

pub use error::{AppResult, ExecutorError, PoolError, QueueError};
pub use executor::{ExecutorConfig, QueueExecutor};
pub use job::{Job, JobId, Measurement, MeasurementBag, MetricStats, TestCase};
pub use queue::{DispatchOutcome, ResourceQueue};
pub use resource::{AcquiredGroup, AcquiredResources, ResourceInstance, ResourceNeed, ResourceRequest};
pub use resource_pool::ResourcePool;
pub use status::{JobState, JobStatus, StatusCategory};
pub use worker::{JobRunner, MeasuredChild, WorkerMessage};
