//! S6: flat batch packing. Twenty independent jobs with heterogeneous
//! `(cpus, runtime)` pack into height-bounded buckets that cover every job,
//! and running those buckets serially never beats the single longest job
//! nor the fully-serial sum of every job's runtime.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use testrig::batching::block::perimeter;
use testrig::batching::{
    batch_from_members, pack_to_height, run_batch, Block, Packer, SchedulerBackend, SubmissionHandle, TestBatch,
};
use testrig::core::{Job, ResourceNeed, TestCase};

const HEIGHT: u32 = 100;

/// `(cpus, runtime)` for 20 independent jobs, chosen to stay under `HEIGHT`
/// individually so every job fits in some bucket on its own.
const JOBS: [(u32, u32); 20] = [
    (1, 15),
    (2, 30),
    (1, 45),
    (3, 20),
    (2, 60),
    (1, 10),
    (4, 25),
    (2, 35),
    (1, 50),
    (3, 40),
    (2, 15),
    (1, 70),
    (4, 10),
    (2, 20),
    (1, 30),
    (3, 55),
    (2, 45),
    (1, 20),
    (4, 15),
    (2, 25),
];

fn blocks() -> Vec<Block> {
    JOBS.iter().enumerate().map(|(i, &(cpus, runtime))| Block::new(i.to_string(), cpus, runtime, vec![])).collect()
}

fn job_for(i: usize) -> Arc<dyn Job> {
    let (cpus, runtime) = JOBS[i];
    let request = vec![vec![ResourceNeed { kind: "cpus".to_string(), slots: cpus }]];
    Arc::new(TestCase::new(
        i.to_string(),
        i.to_string(),
        vec![],
        false,
        cpus,
        Duration::from_secs(u64::from(runtime)),
        request,
        Duration::from_secs(600),
    ))
}

/// Simulates a batch's submission taking exactly `duration` wall-clock
/// time to run to completion, with no further polling needed afterwards.
struct SimulatedBackend {
    duration: Duration,
}

impl SchedulerBackend for SimulatedBackend {
    fn submit(&self, _batch: &TestBatch) -> std::io::Result<SubmissionHandle> {
        std::thread::sleep(self.duration);
        Ok(SubmissionHandle { jobid: None })
    }

    fn poll(&self, _handle: &SubmissionHandle) -> std::io::Result<Option<i32>> {
        Ok(Some(0))
    }

    fn cancel(&self, _handle: &SubmissionHandle) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn s6_flat_packing_covers_input_and_respects_height() {
    let blocks = blocks();
    let buckets = pack_to_height(&blocks, HEIGHT, false).expect("20 small independent jobs always pack");

    // (b) the union of every bucket's membership is exactly the input set.
    let mut seen = HashSet::new();
    for bucket in &buckets {
        seen.extend(bucket.members.iter().copied());
    }
    assert_eq!(seen, (0..blocks.len()).collect::<HashSet<_>>(), "every job appears in exactly one bucket");

    // (a) re-derive each bucket's own packing and check its height never
    // exceeds the bound the packer grew it to.
    for bucket in &buckets {
        assert!(!bucket.members.is_empty(), "pack_to_height never emits an empty bucket");
        let refs: Vec<&Block> = bucket.members.iter().map(|&i| &blocks[i]).collect();
        let width = refs.iter().map(|b| b.extent).max().expect("bucket is non-empty");
        let target_height = HEIGHT.max(refs.iter().map(|b| b.height).max().expect("bucket is non-empty"));

        let mut packer = Packer::new();
        let fits = packer.pack(&refs, Some(width), Some(target_height));
        assert!(fits.iter().all(Option::is_some), "a bucket's own members must fit inside its own bin dimensions");

        let (_, h) = perimeter(&fits);
        assert!(h <= target_height, "packed bucket height {h} exceeds its grown bound {target_height}");
    }
}

#[test]
fn s6_serial_batch_execution_respects_runtime_bounds() {
    let blocks = blocks();
    let buckets = pack_to_height(&blocks, HEIGHT, false).expect("20 small independent jobs always pack");

    let sum_runtime: u32 = JOBS.iter().map(|&(_, r)| r).sum();
    let max_runtime: u32 = JOBS.iter().map(|&(_, r)| r).max().expect("JOBS is non-empty");

    let start = Instant::now();
    for bucket in &buckets {
        let members: Vec<Arc<dyn Job>> = bucket.members.iter().map(|&i| job_for(i)).collect();
        let batch_max_runtime = bucket.members.iter().map(|&i| JOBS[i].1).max().expect("bucket is non-empty");
        let batch = batch_from_members(members);
        let backend = SimulatedBackend { duration: Duration::from_millis(u64::from(batch_max_runtime)) };
        run_batch(&batch, &backend, None).expect("simulated backend never errors");
    }
    let total_wall = start.elapsed();

    // Each bucket's simulated duration is the max single-job runtime among
    // its members, so the serial total is bounded below by the single
    // longest job overall and above by running every job fully serially.
    assert!(
        total_wall >= Duration::from_millis(u64::from(max_runtime)),
        "serial total {total_wall:?} must be at least the longest single job's runtime ({max_runtime}ms)"
    );
    assert!(
        total_wall <= Duration::from_millis(u64::from(sum_runtime)) + Duration::from_millis(200),
        "serial total {total_wall:?} must not exceed the fully-serial sum of every job's runtime ({sum_runtime}ms, plus scheduling slack)"
    );
}
