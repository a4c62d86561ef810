// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Snapshot cycle microbenchmarks.
//!
//! Restore latency against guest size and dirty pages, shared-page link
//! cost, and the CPU/device state checksum.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use vmsnap_benchmark::Fixture;
use vmsnap_core::{NonMemoryBlob, PAGE_SIZE};

/// Guest sizes to benchmark (in megabytes).
const GUEST_SIZES_MB: &[u64] = &[16, 64, 256];

/// Dirty-page counts to benchmark.
const DIRTY_PAGES: &[usize] = &[1, 256, 4096];

/// Benchmark restore with nothing dirtied.
fn bench_restore_clean(c: &mut Criterion) {
    let mut group = c.benchmark_group("restore_clean");
    group.measurement_time(Duration::from_secs(5));

    for &mb in GUEST_SIZES_MB {
        group.throughput(Throughput::Bytes(mb * 1024 * 1024));

        group.bench_with_input(BenchmarkId::from_parameter(mb), &mb, |b, &mb| {
            let mut fixture = Fixture::saved(mb).expect("Failed to create fixture");

            b.iter(|| {
                fixture.controller.restore().expect("Restore failed");
            });
        });
    }

    group.finish();
}

/// Benchmark restore after dirtying pages of a 64 MB guest.
fn bench_restore_dirty(c: &mut Criterion) {
    let mut group = c.benchmark_group("restore_dirty_64mb");
    group.measurement_time(Duration::from_secs(5));

    for &pages in DIRTY_PAGES {
        group.throughput(Throughput::Bytes((pages * PAGE_SIZE) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(pages), &pages, |b, &pages| {
            let mut fixture = Fixture::saved(64).expect("Failed to create fixture");

            b.iter(|| {
                fixture.dirty(black_box(pages)).expect("Dirty failed");
                fixture.controller.restore().expect("Restore failed");
            });
        });
    }

    group.finish();
}

/// Benchmark restore with the shared page linked, which adds a re-link.
fn bench_restore_linked(c: &mut Criterion) {
    let mut group = c.benchmark_group("restore_linked");
    group.measurement_time(Duration::from_secs(5));

    for &mb in GUEST_SIZES_MB {
        group.bench_with_input(BenchmarkId::from_parameter(mb), &mb, |b, &mb| {
            let mut fixture = Fixture::new(mb).expect("Failed to create fixture");
            fixture.controller.link_shared(0).expect("Link failed");
            fixture.controller.save().expect("Save failed");

            b.iter(|| {
                fixture.controller.restore().expect("Restore failed");
            });
        });
    }

    group.finish();
}

/// Benchmark link plus unlink of one page.
fn bench_link_cycle(c: &mut Criterion) {
    let mut fixture = Fixture::new(16).expect("Failed to create fixture");

    c.bench_function("link_unlink", |b| {
        b.iter(|| {
            fixture
                .controller
                .link_shared(black_box(PAGE_SIZE as u64))
                .expect("Link failed");
            fixture.controller.unlink_shared().expect("Unlink failed");
        });
    });
}

/// Benchmark CRC32 cost of capturing and verifying the state blob.
fn bench_state_blob_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_blob_checksum");
    group.measurement_time(Duration::from_secs(3));

    for &size in &[256usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let bytes = vec![0xABu8; size];

            b.iter(|| {
                let blob = NonMemoryBlob::new(black_box(bytes.clone()));
                blob.verify().expect("Checksum mismatch");
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_restore_clean,
    bench_restore_dirty,
    bench_restore_linked,
    bench_link_cycle,
    bench_state_blob_checksum,
);

criterion_main!(benches);
