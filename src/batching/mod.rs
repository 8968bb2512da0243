//! Optional batching layer: groups many small jobs into fewer submission
//! units for sites where per-job dispatch overhead (e.g. an HPC scheduler's
//! queueing delay) dominates runtime.

pub mod backend;
pub mod batch;
pub mod block;
pub mod packer;
pub mod runner;

pub use backend::{NullBackend, ScriptingBackend, SubmissionHandle, SchedulerBackend};
pub use batch::{next_batch_id, TestBatch};
pub use block::{Block, Bucket, Packer};
pub use packer::{groupby_dep, pack_by_count, pack_by_count_atomic, pack_to_height, AUTO, ONE_PER_BUCKET};
pub use runner::{batch_from_members, run_batch};
