//! Benchmarks for the allocation hot paths and the construction-time scan.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spacemap::{bitmap, FreeSpaces, SpaceAllocator, BITMAP_SIZE, UNIT_SIZE};

/// An image that is fully used except for one hole of `units` at the front,
/// so the alloc/free cycle always lands in the hole and release scans stop
/// at its edges.
fn nearly_full_image(units: u32) -> SpaceAllocator {
    let mut bm = vec![0xFFu8; BITMAP_SIZE];
    bitmap::clear_range(&mut bm, 0, units);
    SpaceAllocator::from_bitmap(bm).unwrap()
}

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let mut one_unit = nearly_full_image(1);
    c.bench_function("alloc_free_one_unit", |b| {
        b.iter(|| {
            let offset = one_unit.alloc(black_box(UNIT_SIZE)).unwrap();
            one_unit.free(offset, UNIT_SIZE).unwrap();
        })
    });

    let mut one_mib = nearly_full_image(256);
    c.bench_function("alloc_free_one_mib", |b| {
        b.iter(|| {
            let offset = one_mib.alloc(black_box(1024 * 1024)).unwrap();
            one_mib.free(offset, 1024 * 1024).unwrap();
        })
    });
}

fn bench_bitmap_scans(c: &mut Criterion) {
    let mut bm = vec![0u8; BITMAP_SIZE];
    // used units at 0 and 2^20 bound a long free run for both scans
    bitmap::set_range(&mut bm, 0, 1);
    bitmap::set_range(&mut bm, 1 << 20, 1);

    c.bench_function("leading_zeros_across_run", |b| {
        b.iter(|| bitmap::leading_zeros_from(black_box(&bm), 1))
    });

    c.bench_function("trailing_zeros_across_run", |b| {
        b.iter(|| bitmap::trailing_zeros_to(black_box(&bm), 1 << 20))
    });
}

fn bench_index_load(c: &mut Criterion) {
    // a fragmented image: every 64th unit used
    let mut bm = vec![0u8; BITMAP_SIZE];
    let mut unit = 0u32;
    while unit < (BITMAP_SIZE as u32) * 8 {
        bitmap::set_range(&mut bm, unit, 1);
        unit += 64;
    }

    let mut group = c.benchmark_group("index_load");
    group.sample_size(10);
    group.bench_function("fragmented_image", |b| {
        b.iter(|| {
            let mut spaces = FreeSpaces::new();
            spaces.load_from_bitmap(black_box(&bm));
            spaces
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_free_cycle,
    bench_bitmap_scans,
    bench_index_load
);
criterion_main!(benches);
