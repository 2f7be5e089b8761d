//! Compile-time geometry of the managed space.
//!
//! One bitmap bit tracks one 4KB unit across a 1TB address space, giving a
//! 32MB bitmap. All other constants derive from these two choices.

/// Allocation granularity in bytes.
pub const UNIT_SIZE: i64 = 4096;

/// Managed address space in bytes (1TB).
pub const SPACE_TOTAL: i64 = 1 << 40;

/// Number of allocation units in the managed space (2^28).
pub const UNIT_TOTAL: u32 = (SPACE_TOTAL / UNIT_SIZE) as u32;

/// Bit width of [`UNIT_TOTAL`].
pub const UNIT_TOTAL_BITS: u32 = 28;

/// Bitmap length in bytes (32MB). Bit `i` of the bitmap tracks unit `i`,
/// LSB-first within each byte.
pub const BITMAP_SIZE: usize = (UNIT_TOTAL / 8) as usize;

/// Largest size a single allocation may request, in bytes (4MB).
pub const ALLOC_LIMIT: i64 = 4 * 1024 * 1024;

/// Requested allocation sizes must be a multiple of this many bytes.
pub const ALLOC_ALIGN: i64 = 512;

/// Free runs shorter than this many units get a dedicated single-length
/// bucket in the free index; longer runs share doubling-range buckets.
pub const ONE_LEN_THRESHOLD: u32 = 128;

/// Bit width of [`ONE_LEN_THRESHOLD`].
pub const ONE_LEN_THRESHOLD_BITS: u32 = 7;

/// Number of variable-length (doubling-range) buckets in the free index.
pub const VAR_LEN_BUCKETS: usize = (UNIT_TOTAL_BITS - ONE_LEN_THRESHOLD_BITS + 1) as usize;

/// Total bucket count in the free index.
pub const TOTAL_BUCKETS: usize = VAR_LEN_BUCKETS + ONE_LEN_THRESHOLD as usize - 1;
