//! # testrig
//!
//! A parallel test-execution engine: a typed resource pool, a
//! dependency-and-cost-ordered dispatch queue, and a subprocess-isolated
//! worker pool, wired together by an executor loop.
//!
//! ## Core problem solved
//!
//! Large test suites (HPC application test suites, in particular) have
//! resource constraints an ordinary thread-pool test runner ignores:
//!
//! - **Heterogeneous resources**: cases need varying counts of CPUs, GPUs,
//!   licenses, or whole nodes, not just "a thread".
//! - **Dependency chains**: a case may require another case's output.
//! - **Exclusivity**: some cases cannot run alongside any other case.
//! - **Runaway cases**: a hung case must be killed without taking the rest
//!   of the run down with it.
//!
//! ## Key components
//!
//! - [`core::resource_pool::ResourcePool`] — typed, slot-partitioned
//!   resource accounting with journal-based rollback.
//! - [`core::queue::ResourceQueue`] — cost-ordered dispatch gated on
//!   dependencies, exclusivity, and resource availability.
//! - [`core::worker`] — subprocess supervision and resource sampling.
//! - [`core::executor::QueueExecutor`] — the bounded run loop tying the
//!   above together, with timeout sweeping and fail-fast.
//! - [`batching`] — optional grouping of many small jobs into fewer
//!   submission units for sites where per-job dispatch overhead dominates.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use testrig::core::{ResourcePool, ResourceQueue};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(ResourcePool::uniform([("gpus".to_string(), 2)]));
//! let queue = Arc::new(ResourceQueue::new(pool));
//! // See `tests/` for complete working examples.
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: resource pool, job contract, dispatch
/// queue, worker supervision, and the executor loop.
pub mod core;
/// Configuration models: resource-pool spec files and executor policy.
pub mod config;
/// Optional batching layer for grouping jobs into fewer submission units.
pub mod batching;
/// Shared utilities.
pub mod util;

