//! The allocation engine: a bitmap plus a free-space index, kept mutually
//! consistent across every operation.
//!
//! The bitmap is the authoritative free/used record; the index only
//! accelerates allocation. Releases find already-free neighbours by
//! rescanning the bitmap around the released range, which keeps the index
//! free of any offset-to-run map.

use serde::{Deserialize, Serialize};

use crate::bitmap;
use crate::config::{ALLOC_ALIGN, ALLOC_LIMIT, BITMAP_SIZE, SPACE_TOTAL, UNIT_SIZE, UNIT_TOTAL};
use crate::error::{Result, SpacemapError};
use crate::freespace::{FreeRun, FreeSpaces};

/// Converts a byte size to the number of units covering it, rounding up.
fn byte_size_to_units(bytes: i64) -> u32 {
    ((bytes + UNIT_SIZE - 1) / UNIT_SIZE) as u32
}

/// A point-in-time summary of the allocator state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceStats {
    pub total_units: u64,
    pub free_units: u64,
    pub free_runs: usize,
    pub largest_run_units: u64,
}

/// First-fit-within-a-size-class allocator over a fixed 1TB space.
///
/// Not thread-safe; callers serialise access externally (see
/// [`SharedSpaceManager`](crate::manager::SharedSpaceManager)).
#[derive(Debug)]
pub struct SpaceAllocator {
    bitmap: Vec<u8>,
    free: FreeSpaces,
}

impl SpaceAllocator {
    /// Builds an allocator from a loaded bitmap image, scanning it once to
    /// populate the free index.
    pub fn from_bitmap(bitmap: Vec<u8>) -> Result<Self> {
        if bitmap.len() != BITMAP_SIZE {
            return Err(SpacemapError::ImageSizeMismatch {
                expected: BITMAP_SIZE as u64,
                actual: bitmap.len() as u64,
            });
        }

        let mut free = FreeSpaces::new();
        free.load_from_bitmap(&bitmap);
        Ok(SpaceAllocator { bitmap, free })
    }

    /// Reserves a contiguous range of `size` bytes and returns its byte
    /// offset within the managed space.
    ///
    /// `size` must be positive, a multiple of 512, and at most
    /// [`ALLOC_LIMIT`]; the reservation itself is rounded up to whole 4KB
    /// units.
    pub fn alloc(&mut self, size: i64) -> Result<i64> {
        if size <= 0 {
            return Err(SpacemapError::InvalidArgument(format!(
                "alloc size must be positive, got {size}"
            )));
        }
        if size > ALLOC_LIMIT {
            return Err(SpacemapError::InvalidArgument(format!(
                "alloc size {size} exceeds the {ALLOC_LIMIT}-byte limit"
            )));
        }
        if size % ALLOC_ALIGN != 0 {
            return Err(SpacemapError::InvalidArgument(format!(
                "alloc size {size} is not a multiple of {ALLOC_ALIGN}"
            )));
        }

        let need = byte_size_to_units(size);
        let run = self
            .free
            .take_at_least(need)
            .ok_or(SpacemapError::OutOfSpace { requested: size })?;

        bitmap::set_range(&mut self.bitmap, run.offset, need);
        if run.length > need {
            // the remainder is still maximal: its left neighbour is the range
            // just marked used, and its right boundary is unchanged
            self.free.insert(run.offset + need, run.length - need);
        }

        Ok(i64::from(run.offset) * UNIT_SIZE)
    }

    /// Releases the range `[offset, offset + size)` and merges it with any
    /// adjacent free runs.
    ///
    /// `offset` must be unit-aligned and previously returned by
    /// [`SpaceAllocator::alloc`] with the same size. Releasing a range that
    /// is not fully allocated corrupts the index and aborts the process.
    pub fn free(&mut self, offset: i64, size: i64) -> Result<()> {
        if offset < 0 {
            return Err(SpacemapError::InvalidArgument(format!(
                "free offset must be non-negative, got {offset}"
            )));
        }
        if size <= 0 {
            return Err(SpacemapError::InvalidArgument(format!(
                "free size must be positive, got {size}"
            )));
        }
        let end = offset.checked_add(size).ok_or_else(|| {
            SpacemapError::InvalidArgument(format!(
                "free range {offset}+{size} overflows"
            ))
        })?;
        if end > SPACE_TOTAL {
            return Err(SpacemapError::InvalidArgument(format!(
                "free range {offset}+{size} ends past the managed space"
            )));
        }
        if offset % UNIT_SIZE != 0 {
            return Err(SpacemapError::InvalidArgument(format!(
                "free offset {offset} is not aligned to {UNIT_SIZE}"
            )));
        }

        let unit_offset = (offset / UNIT_SIZE) as u32;
        let units = byte_size_to_units(size);

        bitmap::clear_range(&mut self.bitmap, unit_offset, units);

        // the released bits are clear now, so the scans stop exactly at the
        // far ends of the (already-free) neighbouring runs
        let right = bitmap::leading_zeros_from(&self.bitmap, unit_offset + units);
        if right > 0 {
            self.free.remove(unit_offset + units, right);
        }
        let left = bitmap::trailing_zeros_to(&self.bitmap, unit_offset);
        if left > 0 {
            self.free.remove(unit_offset - left, left);
        }

        self.free.insert(unit_offset - left, left + units + right);
        Ok(())
    }

    pub fn stats(&self) -> SpaceStats {
        SpaceStats {
            total_units: u64::from(UNIT_TOTAL),
            free_units: self.free.free_units(),
            free_runs: self.free.run_count(),
            largest_run_units: self
                .free
                .largest_run()
                .map_or(0, |r| u64::from(r.length)),
        }
    }

    /// The raw bitmap bytes, for persistence and inspection.
    pub fn bitmap(&self) -> &[u8] {
        &self.bitmap
    }

    /// Every free run currently indexed, in no particular order.
    pub fn free_runs(&self) -> Vec<FreeRun> {
        self.free.runs()
    }
}
