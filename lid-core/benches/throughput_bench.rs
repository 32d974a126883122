use std::sync::Arc;

use chrono::TimeDelta;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use lid_core::client::LidClient;
use lid_core::infrastructure::LockService;
use lid_core::store_in_memory::InMemoryTableStore;
use lid_core::types::*;

fn options() -> ServiceOptions {
    ServiceOptions::new(TimeDelta::seconds(10)).with_table("bench")
}

fn lock_unlock(client: &LidClient, signature: &str) {
    let _ = client.lock(&LockRequest::new(signature, "bench", 0), None);
    let _ = client.unlock(&UnlockRequest::new(signature, "bench"), None);
}

fn bench_lock_unlock_cycle(c: &mut Criterion) {
    let in_memory = LidClient::in_memory(options());
    c.bench_function("in_memory_lock_unlock", |b| b.iter(|| lock_unlock(&in_memory, "a")));

    let Ok(conditional) = LidClient::conditional(Arc::new(InMemoryTableStore::new()), options())
    else {
        return;
    };
    c.bench_function("conditional_lock_unlock", |b| b.iter(|| lock_unlock(&conditional, "a")));
}

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_many_signatures");

    for count in [10, 100, 1000] {
        let signatures: Vec<String> = (0..count).map(|i| format!("sig-{i}")).collect();
        group.bench_with_input(BenchmarkId::new("signatures", count), &signatures, |b, sigs| {
            b.iter(|| {
                let client = LidClient::in_memory(options());
                for sig in sigs {
                    let _ = client.lock(&LockRequest::new(sig.as_str(), "bench", 0), None);
                }
                black_box(client)
            })
        });
    }

    group.finish();
}

fn bench_renewal(c: &mut Criterion) {
    let client = LidClient::in_memory(options());
    let req = LockRequest::new("renewed", "bench", 0);
    let _ = client.lock(&req, None);
    c.bench_function("renew_held_lock", |b| b.iter(|| client.lock(black_box(&req), None)));
}

criterion_group!(benches, bench_lock_unlock_cycle, bench_signatures, bench_renewal);
criterion_main!(benches);
