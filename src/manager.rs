//! The public façade: construct from an image file, serve alloc/free, and
//! persist on close.
//!
//! [`SpaceManager`] is single-threaded like the engine underneath it.
//! [`SharedSpaceManager`] wraps it in a mutex held for the whole duration of
//! each call, which makes operations serialisable without the engine itself
//! knowing about threads.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::allocator::{SpaceAllocator, SpaceStats};
use crate::error::Result;
use crate::image;

/// Owns the allocation engine and remembers where its image lives.
///
/// No file handle is held between [`SpaceManager::open`] and
/// [`SpaceManager::close`]; the image is read once at construction and
/// written once, atomically, at close.
pub struct SpaceManager {
    allocator: SpaceAllocator,
    path: PathBuf,
}

impl SpaceManager {
    /// Loads the bitmap image at `path` and builds the free index from it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bitmap = image::load(&path)?;
        let allocator = SpaceAllocator::from_bitmap(bitmap)?;

        tracing::info!(
            path = %path.display(),
            free_units = allocator.stats().free_units,
            "opened space image"
        );
        Ok(SpaceManager { allocator, path })
    }

    /// Reserves `size` bytes; returns the byte offset of the reservation.
    pub fn alloc(&mut self, size: i64) -> Result<i64> {
        self.allocator.alloc(size)
    }

    /// Releases a range previously returned by [`SpaceManager::alloc`].
    pub fn free(&mut self, offset: i64, size: i64) -> Result<()> {
        self.allocator.free(offset, size)
    }

    pub fn stats(&self) -> SpaceStats {
        self.allocator.stats()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists the bitmap back to the image file and releases the manager.
    /// In-memory state is not recoverable after a failed close.
    pub fn close(self) -> Result<()> {
        image::save(&self.path, self.allocator.bitmap())?;
        tracing::debug!(path = %self.path.display(), "persisted space image");
        Ok(())
    }
}

/// A [`SpaceManager`] behind a mutex, for callers that share the manager
/// across threads. Each operation holds the lock for its full duration, so
/// observers see operations in a total order.
pub struct SharedSpaceManager {
    inner: Mutex<SpaceManager>,
}

impl SharedSpaceManager {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(SharedSpaceManager {
            inner: Mutex::new(SpaceManager::open(path)?),
        })
    }

    pub fn alloc(&self, size: i64) -> Result<i64> {
        self.inner.lock().alloc(size)
    }

    pub fn free(&self, offset: i64, size: i64) -> Result<()> {
        self.inner.lock().free(offset, size)
    }

    pub fn stats(&self) -> SpaceStats {
        self.inner.lock().stats()
    }

    pub fn close(self) -> Result<()> {
        self.inner.into_inner().close()
    }
}
