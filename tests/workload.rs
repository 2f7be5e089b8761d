//! Whole-space workloads: exhaustion, refill, and a long random mix.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spacemap::{
    FreeRun, SpaceAllocator, SpacemapError, ALLOC_LIMIT, BITMAP_SIZE, SPACE_TOTAL, UNIT_SIZE,
    UNIT_TOTAL,
};

const MIB: i64 = 1024 * 1024;

fn fresh() -> SpaceAllocator {
    SpaceAllocator::from_bitmap(vec![0u8; BITMAP_SIZE]).unwrap()
}

#[test]
fn test_exhaustion_by_one_mib_allocs() {
    let mut alloc = fresh();

    let expected = SPACE_TOTAL / MIB;
    for i in 0..expected {
        let offset = alloc
            .alloc(MIB)
            .unwrap_or_else(|e| panic!("alloc {i} failed: {e}"));
        assert_eq!(offset, i * MIB);
    }

    assert!(matches!(
        alloc.alloc(MIB),
        Err(SpacemapError::OutOfSpace { .. })
    ));
    assert_eq!(alloc.stats().free_units, 0);
}

#[test]
fn test_fill_then_free_everything_leaves_one_run() {
    let mut alloc = fresh();

    let chunks = (SPACE_TOTAL / ALLOC_LIMIT) as u64;
    for _ in 0..chunks {
        alloc.alloc(ALLOC_LIMIT).unwrap();
    }
    assert!(matches!(
        alloc.alloc(512),
        Err(SpacemapError::OutOfSpace { .. })
    ));

    // Free the chunks divide-and-conquer: clear each half of a region, then
    // free the separator chunk between them. Merges stay balanced, so no
    // release ever scans more than the two half-runs beside it and the index
    // never holds more than a handful of runs at once.
    fn clear_region(alloc: &mut SpaceAllocator, first: u64, count: u64) {
        match count {
            0 => {}
            1 => alloc.free(first as i64 * ALLOC_LIMIT, ALLOC_LIMIT).unwrap(),
            _ => {
                let separator = first + count / 2;
                clear_region(alloc, first, count / 2);
                clear_region(alloc, separator + 1, count - count / 2 - 1);
                alloc
                    .free(separator as i64 * ALLOC_LIMIT, ALLOC_LIMIT)
                    .unwrap();
            }
        }
    }
    clear_region(&mut alloc, 0, chunks);

    assert_eq!(alloc.free_runs(), vec![FreeRun::new(0, UNIT_TOTAL)]);
    let stats = alloc.stats();
    assert_eq!(stats.free_units, u64::from(UNIT_TOTAL));
    assert_eq!(stats.free_runs, 1);
    assert_eq!(stats.largest_run_units, u64::from(UNIT_TOTAL));
}

#[test]
fn test_random_workload_reaches_high_utilisation() {
    let mut alloc = fresh();
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);

    let mut live: Vec<(i64, i64)> = Vec::new();
    let mut allocated_units: u64 = 0;

    let mut exhausted = false;
    for _ in 0..1_000_000u32 {
        let do_free = !live.is_empty() && rng.gen_ratio(1, 10);
        if do_free {
            let victim = rng.gen_range(0..live.len());
            let (offset, size) = live.swap_remove(victim);
            alloc.free(offset, size).unwrap();
            allocated_units -= units_for(size);
            continue;
        }

        let size = i64::from(rng.gen_range(1u32..=8192)) * 512;
        match alloc.alloc(size) {
            Ok(offset) => {
                live.push((offset, size));
                allocated_units += units_for(size);
            }
            Err(SpacemapError::OutOfSpace { .. }) => {
                exhausted = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert!(exhausted, "the workload never filled the space");
    let utilisation = allocated_units as f64 / f64::from(UNIT_TOTAL);
    assert!(
        utilisation > 0.95,
        "utilisation at first failure was only {utilisation:.3}"
    );

    // the allocator is still consistent and can serve from freed space
    let (offset, size) = live[0];
    alloc.free(offset, size).unwrap();
    let reuse = ((size + UNIT_SIZE - 1) / UNIT_SIZE) * UNIT_SIZE;
    let _ = alloc.alloc(reuse.min(ALLOC_LIMIT));
}

fn units_for(size: i64) -> u64 {
    ((size + UNIT_SIZE - 1) / UNIT_SIZE) as u64
}
