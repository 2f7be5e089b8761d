//! Spacemap
//!
//! A persistent disk-space allocator for a single backing image file. The
//! managed space is 1TB, carved into 4KB units; a 32MB bitmap records which
//! units are in use and is the only thing persisted.
//!
//! ## Features
//!
//! - **Fixed 4KB units** over a 1TB address space (2^28 units)
//! - **Size-bucketed free index** for O(small) allocation: 127 single-length
//!   buckets plus 22 doubling-range buckets
//! - **Immediate coalescing** on release, driven by bitmap scans around the
//!   released range
//! - **Atomic persistence**: the bitmap is written to a temp file and
//!   renamed over the image on close
//!
//! ## Example
//!
//! ```no_run
//! use spacemap::{Result, SpaceManager};
//!
//! fn main() -> Result<()> {
//!     let mut manager = SpaceManager::open("space.img")?;
//!
//!     let offset = manager.alloc(64 * 1024)?;
//!     manager.free(offset, 64 * 1024)?;
//!
//!     manager.close()
//! }
//! ```
//!
//! ## Image format
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Image file (exactly 32MB, no header)         │
//! ├──────────────────────────────────────────────┤
//! │ byte 0: bits for units 0..8, LSB-first       │
//! │ byte 1: bits for units 8..16                 │
//! │ ...                                          │
//! │ byte 2^25 - 1: bits for the last 8 units     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A set bit means the unit is allocated; a freshly-truncated all-zero file
//! is an empty image. The format has no endianness: it is a byte array, and
//! bit `i` is `(bitmap[i / 8] >> (i % 8)) & 1`.
//!
//! ## Concurrency
//!
//! The engine ([`SpaceAllocator`]) is not thread-safe. [`SharedSpaceManager`]
//! serialises calls with a single mutex held for each whole operation, which
//! is the intended deployment; no call blocks on anything but that lock.

pub mod allocator;
pub mod bitmap;
pub mod config;
pub mod error;
pub mod freespace;
pub mod image;
pub mod manager;

pub use allocator::{SpaceAllocator, SpaceStats};
pub use config::{ALLOC_ALIGN, ALLOC_LIMIT, BITMAP_SIZE, SPACE_TOTAL, UNIT_SIZE, UNIT_TOTAL};
pub use error::{Result, SpacemapError};
pub use freespace::{FreeRun, FreeSpaces};
pub use manager::{SharedSpaceManager, SpaceManager};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
