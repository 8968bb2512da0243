//! Benchmarks for the resource pool, dispatch queue, and batch packer.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use testrig::batching::{pack_by_count_atomic, Block};
use testrig::core::{JobId, ResourcePool, ResourceQueue, TestCase};

fn build_pool(cpus: u32) -> Arc<ResourcePool> {
    Arc::new(ResourcePool::uniform([("cpus".to_string(), cpus)]))
}

fn build_job(id: u64, cpus: u32, deps: Vec<JobId>) -> Arc<dyn testrig::core::Job> {
    let name = format!("case-{id}");
    let request = vec![(0..cpus)
        .map(|_| testrig::core::ResourceNeed { kind: "cpus".to_string(), slots: 1 })
        .collect()];
    Arc::new(TestCase::new(
        name.clone(),
        name,
        deps,
        false,
        cpus,
        Duration::from_millis(1),
        request,
        Duration::from_secs(30),
    ))
}

fn bench_pool_checkout_checkin(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_checkout_checkin");
    for cpus in [8u32, 64, 256] {
        group.throughput(Throughput::Elements(u64::from(cpus)));
        group.bench_with_input(BenchmarkId::from_parameter(cpus), &cpus, |b, &cpus| {
            let pool = build_pool(cpus);
            let request = vec![vec![testrig::core::ResourceNeed { kind: "cpus".to_string(), slots: 1 }]];
            b.iter(|| {
                let acquired = pool.checkout(&request).unwrap();
                pool.checkin(&acquired).unwrap();
                black_box(());
            });
        });
    }
    group.finish();
}

fn bench_queue_dispatch_independent(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_dispatch_independent");
    for size in [100u64, 1_000, 5_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let queue = ResourceQueue::new(build_pool(1));
                for i in 0..size {
                    queue.put(build_job(i, 1, vec![])).unwrap();
                }
                loop {
                    match queue.next() {
                        testrig::core::DispatchOutcome::Dispatched(job) => {
                            job.set_status(testrig::core::JobState::Success, None);
                            queue.done(job);
                        }
                        testrig::core::DispatchOutcome::Busy => continue,
                        testrig::core::DispatchOutcome::Empty => break,
                    }
                }
            });
        });
    }
    group.finish();
}

fn bench_queue_dispatch_chained(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_dispatch_chained");
    for size in [50u64, 200, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let queue = ResourceQueue::new(build_pool(2));
                let mut prev = None;
                for i in 0..size {
                    let deps = prev.take().into_iter().collect::<Vec<_>>();
                    let job = build_job(i, 1, deps);
                    prev = Some(job.id().clone());
                    queue.put(job).unwrap();
                }
                loop {
                    match queue.next() {
                        testrig::core::DispatchOutcome::Dispatched(job) => {
                            job.set_status(testrig::core::JobState::Success, None);
                            queue.done(job);
                        }
                        testrig::core::DispatchOutcome::Busy => continue,
                        testrig::core::DispatchOutcome::Empty => break,
                    }
                }
            });
        });
    }
    group.finish();
}

fn bench_pack_by_count_atomic(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_by_count_atomic");
    for size in [100usize, 1_000, 5_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let blocks: Vec<Block> =
                (0..size).map(|i| Block::new(format!("b{i}"), 1, (i as u32 % 7) + 1, vec![])).collect();
            b.iter(|| {
                let buckets = pack_by_count_atomic(&blocks, testrig::batching::AUTO).unwrap();
                black_box(buckets);
            });
        });
    }
    group.finish();
}

criterion_group!(pool_benches, bench_pool_checkout_checkin);
criterion_group!(queue_benches, bench_queue_dispatch_independent, bench_queue_dispatch_chained);
criterion_group!(packer_benches, bench_pack_by_count_atomic);

criterion_main!(pool_benches, queue_benches, packer_benches);
