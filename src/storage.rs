//! Index files on disk.
//!
//! An index file holds one JSON [`IndexBundle`](doc_qa_core::index::IndexBundle).
//! Writes are atomic: the bundle is written to a temporary file in the
//! destination directory, fsynced, then renamed over the destination. A
//! reader therefore sees either the old index or the new one, never a
//! partial write, and a failed save leaves the old file untouched.

use std::io::Write;
use std::path::Path;

use doc_qa_core::index::{read_info, IndexInfo, VectorIndex};
use doc_qa_core::{EmbeddingSpec, Error, Result};
use tempfile::NamedTempFile;

/// Atomically write `index` to `path`, creating parent directories.
pub fn save_index(index: &VectorIndex, path: &Path) -> Result<()> {
    let bytes = index.to_json_bytes()?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!(
        path = %path.display(),
        entries = index.len(),
        bytes = bytes.len(),
        "saved index"
    );
    Ok(())
}

/// Load the index at `path` and check it was built for `expected`.
///
/// # Errors
///
/// - [`Error::NotFound`] if nothing exists at `path`.
/// - [`Error::CorruptIndex`] if the file is not a valid bundle.
/// - [`Error::DimensionMismatch`] / [`Error::InvalidConfiguration`] if the
///   stored embedding spec differs from `expected`.
pub fn load_index(path: &Path, expected: &EmbeddingSpec) -> Result<VectorIndex> {
    let bytes = read_existing(path)?;
    let index = VectorIndex::from_json_bytes(&bytes)?;
    index.check_spec(expected)?;

    tracing::info!(
        path = %path.display(),
        entries = index.len(),
        model = %index.spec().model,
        "loaded index"
    );
    Ok(index)
}

/// Read only the bundle metadata at `path`.
pub fn index_info(path: &Path) -> Result<IndexInfo> {
    read_info(&read_existing(path)?)
}

fn read_existing(path: &Path) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(Error::Io(e)),
    }
}
