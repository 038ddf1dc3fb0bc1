// Runtime throughput benchmarks.
//
// Covers ledger transfers, allowance-spending transfers, the full grant
// lifecycle through the vault, and snapshot cost at various state sizes.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use grantvault_contracts::{AssetId, ManualClock, Runtime};

const T0: u64 = 1_700_000_000;

fn funded_runtime() -> (Runtime, Arc<ManualClock>, AssetId) {
    let clock = Arc::new(ManualClock::new(T0));
    let rt = Runtime::new("vault", clock.clone());
    let asset = rt.deploy_token("alice", "Bench Token", "BNCH", 18).unwrap();
    rt.mint("alice", &asset, "alice", u128::MAX / 2).unwrap();
    (rt, clock, asset)
}

fn bench_transfer(c: &mut Criterion) {
    let (rt, _, asset) = funded_runtime();

    c.bench_function("ledger/transfer", |b| {
        b.iter(|| rt.transfer("alice", &asset, "bob", black_box(1)).unwrap());
    });
}

fn bench_transfer_from(c: &mut Criterion) {
    let (rt, _, asset) = funded_runtime();
    rt.approve("alice", &asset, "carol", u128::MAX).unwrap();

    c.bench_function("ledger/transfer_from", |b| {
        b.iter(|| {
            rt.transfer_from("carol", &asset, "alice", "bob", black_box(1))
                .unwrap()
        });
    });
}

fn bench_grant_lifecycle(c: &mut Criterion) {
    let (rt, _, asset) = funded_runtime();
    rt.approve("alice", &asset, "vault", u128::MAX).unwrap();

    c.bench_function("vault/add_then_claim", |b| {
        b.iter(|| {
            let unlock = rt.now();
            rt.add_grant("alice", &asset, "bob", 10, unlock).unwrap();
            rt.claim_grant("bob", "alice").unwrap();
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("runtime/snapshot");

    for holders in [10usize, 100, 1_000] {
        let (rt, _, asset) = funded_runtime();
        for i in 0..holders {
            rt.transfer("alice", &asset, &format!("holder-{:05}", i), 1)
                .unwrap();
        }

        group.throughput(Throughput::Elements(holders as u64));
        group.bench_with_input(BenchmarkId::from_parameter(holders), &rt, |b, rt| {
            b.iter(|| rt.snapshot());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_transfer,
    bench_transfer_from,
    bench_grant_lifecycle,
    bench_snapshot,
);
criterion_main!(benches);
