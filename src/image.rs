//! Image file load and save.
//!
//! The image is the raw bitmap: a flat file of exactly
//! [`BITMAP_SIZE`](crate::config::BITMAP_SIZE) bytes with no header, magic,
//! or versioning. Byte `i` holds the bits for units `[8i, 8i + 8)`,
//! LSB-first, so a freshly-truncated all-zero file means "everything free".

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::config::BITMAP_SIZE;
use crate::error::{Result, SpacemapError};

/// Reads the full bitmap from `path`. Any size other than exactly
/// [`BITMAP_SIZE`](crate::config::BITMAP_SIZE) is rejected before reading.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let mut file = File::open(path.as_ref())?;

    let actual = file.metadata()?.len();
    if actual != BITMAP_SIZE as u64 {
        return Err(SpacemapError::ImageSizeMismatch {
            expected: BITMAP_SIZE as u64,
            actual,
        });
    }

    let mut bitmap = vec![0u8; BITMAP_SIZE];
    file.read_exact(&mut bitmap)?;
    Ok(bitmap)
}

/// Writes the bitmap to a temporary file next to `path`, syncs it, then
/// renames it over `path`. A crash mid-write leaves the previous image
/// intact.
pub fn save<P: AsRef<Path>>(path: P, bitmap: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bitmap)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SpacemapError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_first_byte(dir: &Path, value: u8) -> std::path::PathBuf {
        let path = dir.join("image");
        let file = File::create(&path).unwrap();
        file.set_len(BITMAP_SIZE as u64).unwrap();
        drop(file);
        if value != 0 {
            let mut bitmap = vec![0u8; BITMAP_SIZE];
            bitmap[0] = value;
            save(&path, &bitmap).unwrap();
        }
        path
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(dir.path().join("nope"));
        assert!(matches!(result, Err(SpacemapError::Io(_))));
    }

    #[test]
    fn test_load_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        let file = File::create(&path).unwrap();
        file.set_len(1024).unwrap();
        drop(file);

        assert!(matches!(
            load(&path),
            Err(SpacemapError::ImageSizeMismatch {
                expected: _,
                actual: 1024,
            })
        ));
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = image_with_first_byte(dir.path(), 0b0101_0101);

        let bitmap = load(&path).unwrap();
        assert_eq!(bitmap[0], 0b0101_0101);
        assert!(bitmap[1..].iter().all(|&b| b == 0));

        // an untouched load-save-load must be byte-identical
        save(&path, &bitmap).unwrap();
        assert_eq!(load(&path).unwrap(), bitmap);
    }

    #[test]
    fn test_save_replaces_previous_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = image_with_first_byte(dir.path(), 0xFF);

        let mut bitmap = load(&path).unwrap();
        bitmap[0] = 0x0F;
        save(&path, &bitmap).unwrap();
        assert_eq!(load(&path).unwrap()[0], 0x0F);
    }
}
