//! Test harness for the toscafy binary.
//!
//! Provides fixture lookup and archive inspection helpers; the CLI
//! regression tests live in the `cli` module.

#[cfg(test)]
pub mod cli;

use std::path::{Path, PathBuf};

use toscafy_compiler::{read_archive_entries, ArchiveFormat, CompileError};

/// Absolute path to the shared test fixtures directory.
pub fn fixtures() -> PathBuf {
    // CARGO_MANIFEST_DIR = .../crates/toscafy-test
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .unwrap_or(manifest_dir)
        .join("tests/fixtures")
}

/// Entry names of a produced archive, sorted.
pub fn archive_names(path: &Path, format: ArchiveFormat) -> Result<Vec<String>, CompileError> {
    Ok(read_archive_entries(path, format)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

/// Content of one archive entry, if present.
pub fn archive_entry(
    path: &Path,
    format: ArchiveFormat,
    name: &str,
) -> Result<Option<Vec<u8>>, CompileError> {
    Ok(read_archive_entries(path, format)?
        .into_iter()
        .find(|(entry, _)| entry == name)
        .map(|(_, content)| content))
}
