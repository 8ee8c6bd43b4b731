//! Fractured Key - Filesystem Helpers
//!
//! The engine does not lock files and never assumes exclusive access:
//! every read and write may fail, and writes go through a temp file plus
//! rename so a crash never leaves a half-written carrier or descriptor.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{FractureError, FractureResult};

/// Write `data` to `path` atomically.
///
/// Each call gets its own randomly named temp file beside `path`, so
/// concurrent writers to one output never share a temp file.
pub fn write_atomic(path: &Path, data: &[u8]) -> FractureResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| FractureError::from(e.error))?;
    Ok(())
}

/// Read a whole file, mapping a missing file to `FileNotFound`
pub fn read_file(path: &Path) -> FractureResult<Vec<u8>> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FractureError::FileNotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
