//! Size-bucketed index of free runs.
//!
//! The index partitions free runs by length: lengths 1..=127 each get a
//! dedicated bucket holding offsets only, and longer lengths share 22
//! doubling-range buckets holding `(offset, length)` pairs. Single-length
//! buckets answer a take in O(1); variable-length buckets keep populations
//! small because their ranges grow exponentially, and in practice almost all
//! traffic lands on the bucket holding the one huge run left after loading a
//! mostly-empty image.
//!
//! The index never inspects the bitmap except in [`FreeSpaces::load_from_bitmap`];
//! keeping entries maximal and in sync with the bitmap is the allocator's job.

use serde::{Deserialize, Serialize};

use crate::config::{ONE_LEN_THRESHOLD, ONE_LEN_THRESHOLD_BITS, TOTAL_BUCKETS};

/// Index of the first variable-length bucket.
const FIRST_VAR_BUCKET: usize = ONE_LEN_THRESHOLD as usize - 1;

/// A maximal run of consecutive free units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeRun {
    /// First unit of the run.
    pub offset: u32,
    /// Number of units in the run, at least 1.
    pub length: u32,
}

impl FreeRun {
    pub fn new(offset: u32, length: u32) -> Self {
        FreeRun { offset, length }
    }

    /// One past the last unit of the run.
    pub fn end(&self) -> u32 {
        self.offset + self.length
    }
}

/// Maps a run length to the bucket that stores runs of that length.
///
/// Lengths below [`ONE_LEN_THRESHOLD`] map to the single-length bucket
/// `length - 1`; longer lengths map by the position of their highest set bit,
/// so a variable-length bucket with lower bound `L` covers `[L, 2L)`.
pub fn bucket_index(length: u32) -> usize {
    assert!(length > 0, "free run length must be positive");
    if length < ONE_LEN_THRESHOLD {
        return (length - 1) as usize;
    }
    let highest_one = 31 - length.leading_zeros();
    FIRST_VAR_BUCKET + (highest_one - ONE_LEN_THRESHOLD_BITS) as usize
}

/// One size class of free runs. The set of shapes is closed, so the two
/// layouts are a tagged enum rather than trait objects.
#[derive(Debug)]
enum Bucket {
    /// Every member has the same length, so only offsets are stored.
    OneLength { length: u32, offsets: Vec<u32> },
    /// Members have lengths in `[lower_bound, 2 * lower_bound)`; the last
    /// bucket is saturated upward.
    VarLength { lower_bound: u32, runs: Vec<FreeRun> },
}

impl Bucket {
    fn put(&mut self, offset: u32, length: u32) {
        match self {
            Bucket::OneLength {
                length: class,
                offsets,
            } => {
                debug_assert_eq!(length, *class);
                offsets.push(offset);
            }
            Bucket::VarLength { runs, .. } => runs.push(FreeRun::new(offset, length)),
        }
    }

    /// Removes and returns a run with `length >= need`, or `None`.
    ///
    /// In a single-length bucket any member qualifies, because the search
    /// only visits buckets whose class is at least `need`. In a
    /// variable-length bucket the members are scanned first-fit.
    fn take_at_least(&mut self, need: u32) -> Option<FreeRun> {
        match self {
            Bucket::OneLength { length, offsets } => {
                debug_assert!(need <= *length);
                let offset = offsets.pop()?;
                Some(FreeRun::new(offset, *length))
            }
            Bucket::VarLength { runs, .. } => {
                let idx = runs.iter().position(|r| r.length >= need)?;
                Some(runs.swap_remove(idx))
            }
        }
    }

    /// Removes the run starting at `offset`. Offsets are unique across the
    /// whole index (runs are maximal, hence disjoint), so swap-with-last
    /// deletion is safe. A missing offset means the index and the bitmap
    /// have diverged, which is unrecoverable.
    fn remove(&mut self, offset: u32) {
        match self {
            Bucket::OneLength { offsets, .. } => {
                let idx = offsets
                    .iter()
                    .position(|&o| o == offset)
                    .unwrap_or_else(|| panic!("free run at unit {offset} missing from its bucket"));
                offsets.swap_remove(idx);
            }
            Bucket::VarLength { runs, .. } => {
                let idx = runs
                    .iter()
                    .position(|r| r.offset == offset)
                    .unwrap_or_else(|| panic!("free run at unit {offset} missing from its bucket"));
                runs.swap_remove(idx);
            }
        }
    }
}

/// Cached reference to the longest run held in the variable-length buckets.
///
/// The cache is stored by value rather than by position: buckets move
/// entries with swap-with-last deletion, so a positional reference would
/// dangle. `Valid` guarantees the run is present in its bucket and that no
/// variable-length bucket holds a longer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LargestRun {
    Valid(FreeRun),
    NeedRebuild,
    Exhausted,
}

/// The free-space index: 149 buckets plus the largest-run cache.
#[derive(Debug)]
pub struct FreeSpaces {
    buckets: Vec<Bucket>,
    largest: LargestRun,
}

impl FreeSpaces {
    /// Creates an empty index. Call [`FreeSpaces::load_from_bitmap`] to
    /// populate it before serving takes.
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(TOTAL_BUCKETS);
        for i in 0..TOTAL_BUCKETS as u32 {
            if i + 1 < ONE_LEN_THRESHOLD {
                buckets.push(Bucket::OneLength {
                    length: i + 1,
                    offsets: Vec::new(),
                });
            } else {
                let extra_exponent = i + 1 - ONE_LEN_THRESHOLD;
                buckets.push(Bucket::VarLength {
                    lower_bound: ONE_LEN_THRESHOLD << extra_exponent,
                    runs: Vec::new(),
                });
            }
        }
        FreeSpaces {
            buckets,
            largest: LargestRun::Exhausted,
        }
    }

    /// Scans a bitmap byte-by-byte and inserts every maximal zero run.
    ///
    /// Whole `0xFF` and `0x00` bytes close or extend the current run without
    /// touching individual bits; mixed bytes are walked LSB-first.
    pub fn load_from_bitmap(&mut self, bitmap: &[u8]) {
        let mut run_start = 0u32;
        let mut run_len = 0u32;

        for (byte_idx, &b) in bitmap.iter().enumerate() {
            if b == 0xFF {
                if run_len > 0 {
                    self.insert(run_start, run_len);
                    run_len = 0;
                }
                continue;
            }
            if b == 0x00 {
                if run_len == 0 {
                    run_start = byte_idx as u32 * 8;
                }
                run_len += 8;
                continue;
            }

            for bit in 0..8u32 {
                if b & (1 << bit) != 0 {
                    if run_len > 0 {
                        self.insert(run_start, run_len);
                        run_len = 0;
                    }
                } else {
                    if run_len == 0 {
                        run_start = byte_idx as u32 * 8 + bit;
                    }
                    run_len += 1;
                }
            }
        }
        if run_len > 0 {
            self.insert(run_start, run_len);
        }
    }

    /// Files the run under its size class. Maximality is the caller's
    /// responsibility.
    pub fn insert(&mut self, offset: u32, length: u32) {
        let idx = bucket_index(length);
        self.buckets[idx].put(offset, length);

        if idx >= FIRST_VAR_BUCKET {
            self.largest = match self.largest {
                LargestRun::Valid(best) if length > best.length => {
                    LargestRun::Valid(FreeRun::new(offset, length))
                }
                LargestRun::Valid(best) => LargestRun::Valid(best),
                // the cache said "no variable runs exist"; that is no longer
                // true, so force a rescan on the next take
                LargestRun::Exhausted => LargestRun::NeedRebuild,
                LargestRun::NeedRebuild => LargestRun::NeedRebuild,
            };
        }
    }

    /// Removes the run `(offset, length)`. The length selects the bucket;
    /// the run must be present.
    pub fn remove(&mut self, offset: u32, length: u32) {
        let idx = bucket_index(length);
        self.buckets[idx].remove(offset);

        if idx >= FIRST_VAR_BUCKET {
            if let LargestRun::Valid(best) = self.largest {
                if best.offset == offset {
                    self.largest = LargestRun::NeedRebuild;
                }
            }
        }
    }

    /// Removes and returns a free run of at least `need` units, or `None`
    /// when no bucket holds one.
    ///
    /// The search starts at the bucket for `need` and moves toward larger
    /// classes. Single-length buckets answer in O(1). The variable-length
    /// portion is answered from the largest-run cache: if even the longest
    /// variable run is too short, nothing qualifies.
    ///
    /// The returned run is not split here; callers carve what they need and
    /// re-insert the remainder.
    pub fn take_at_least(&mut self, need: u32) -> Option<FreeRun> {
        let start = bucket_index(need);
        if start < FIRST_VAR_BUCKET {
            for idx in start..FIRST_VAR_BUCKET {
                if let Some(run) = self.buckets[idx].take_at_least(need) {
                    return Some(run);
                }
            }
        }
        self.take_from_var_buckets(need)
    }

    fn take_from_var_buckets(&mut self, need: u32) -> Option<FreeRun> {
        if self.largest == LargestRun::NeedRebuild {
            self.largest = self.rebuild_largest();
        }
        match self.largest {
            LargestRun::Exhausted => None,
            LargestRun::Valid(best) if best.length < need => None,
            LargestRun::Valid(best) => {
                self.buckets[bucket_index(best.length)].remove(best.offset);
                self.largest = LargestRun::NeedRebuild;
                Some(best)
            }
            LargestRun::NeedRebuild => unreachable!("cache was just rebuilt"),
        }
    }

    /// Variable-length classes are disjoint and increasing, so the longest
    /// run overall lives in the highest non-empty bucket.
    fn rebuild_largest(&self) -> LargestRun {
        for bucket in self.buckets[FIRST_VAR_BUCKET..].iter().rev() {
            if let Bucket::VarLength { runs, .. } = bucket {
                if let Some(best) = runs.iter().copied().max_by_key(|r| r.length) {
                    return LargestRun::Valid(best);
                }
            }
        }
        LargestRun::Exhausted
    }

    /// Total number of runs currently stored.
    pub fn run_count(&self) -> usize {
        self.buckets
            .iter()
            .map(|b| match b {
                Bucket::OneLength { offsets, .. } => offsets.len(),
                Bucket::VarLength { runs, .. } => runs.len(),
            })
            .sum()
    }

    /// Total number of free units across all stored runs.
    pub fn free_units(&self) -> u64 {
        self.buckets
            .iter()
            .map(|b| match b {
                Bucket::OneLength { length, offsets } => {
                    offsets.len() as u64 * u64::from(*length)
                }
                Bucket::VarLength { runs, .. } => {
                    runs.iter().map(|r| u64::from(r.length)).sum()
                }
            })
            .sum()
    }

    /// Every stored run, in no particular order.
    pub fn runs(&self) -> Vec<FreeRun> {
        let mut out = Vec::with_capacity(self.run_count());
        for bucket in &self.buckets {
            match bucket {
                Bucket::OneLength { length, offsets } => {
                    out.extend(offsets.iter().map(|&o| FreeRun::new(o, *length)));
                }
                Bucket::VarLength { runs, .. } => out.extend_from_slice(runs),
            }
        }
        out
    }

    /// The longest run currently stored, across all buckets. Does not touch
    /// the cache; intended for stats and diagnostics.
    pub fn largest_run(&self) -> Option<FreeRun> {
        for bucket in self.buckets.iter().rev() {
            match bucket {
                Bucket::VarLength { runs, .. } => {
                    if let Some(best) = runs.iter().copied().max_by_key(|r| r.length) {
                        return Some(best);
                    }
                }
                Bucket::OneLength { length, offsets } => {
                    if let Some(&offset) = offsets.last() {
                        return Some(FreeRun::new(offset, *length));
                    }
                }
            }
        }
        None
    }
}

impl Default for FreeSpaces {
    fn default() -> Self {
        Self::new()
    }
}
