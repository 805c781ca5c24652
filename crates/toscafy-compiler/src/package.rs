//! Archive codecs: streams a directory tree into zip, tar or gzip-tar and
//! reads produced archives back.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tar::Builder;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::context::list_files;
use crate::error::CompileError;

/// Archive format of a packaged CSAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Tar,
    #[serde(rename = "tgz")]
    TarGz,
}

impl ArchiveFormat {
    /// Parse a format name: `zip`, `tar`, `tgz`, `targz` or `tar.gz`.
    pub fn parse(s: &str) -> Result<Self, CompileError> {
        match s.trim().to_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar" => Ok(Self::Tar),
            "tgz" | "targz" | "tar.gz" => Ok(Self::TarGz),
            _ => Err(CompileError::InvalidEnumValue {
                kind: "archive format",
                value: s.to_string(),
            }),
        }
    }

    /// Guess the format from a file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") || name.ends_with(".csar") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tgz",
        })
    }
}

/// Stream every file below `root` into `sink`, returning the sink once the
/// archive is finalized and flushed.
///
/// Entries are written in sorted path order with zeroed timestamps so equal
/// trees produce equal archives. Directory entries are not written.
pub fn write_archive<W: Write>(
    root: &Path,
    format: ArchiveFormat,
    sink: W,
) -> Result<W, CompileError> {
    let files = list_files(root)?;
    match format {
        ArchiveFormat::Tar => {
            let mut sink = write_tar(root, &files, sink)?;
            sink.flush()?;
            Ok(sink)
        }
        ArchiveFormat::TarGz => {
            let encoder = write_tar(root, &files, GzEncoder::new(sink, Compression::default()))?;
            let mut sink = encoder.finish()?;
            sink.flush()?;
            Ok(sink)
        }
        ArchiveFormat::Zip => {
            // Zip needs a seekable writer; stage through an anonymous temp file.
            let staging = tempfile::tempfile()?;
            let mut staging = write_zip(root, &files, staging)?;
            staging.seek(SeekFrom::Start(0))?;
            let mut sink = sink;
            std::io::copy(&mut staging, &mut sink)?;
            sink.flush()?;
            Ok(sink)
        }
    }
}

/// Archive `root` into memory.
pub fn archive_to_vec(root: &Path, format: ArchiveFormat) -> Result<Vec<u8>, CompileError> {
    write_archive(root, format, Vec::new())
}

fn write_tar<W: Write>(root: &Path, files: &[String], sink: W) -> Result<W, CompileError> {
    let mut archive = Builder::new(sink);
    for rel in files {
        let path = root.join(rel);
        let file = File::open(&path).map_err(|e| CompileError::io_at(&path, e))?;
        let metadata = file.metadata().map_err(|e| CompileError::io_at(&path, e))?;

        let mut header = tar::Header::new_gnu();
        header.set_size(metadata.len());
        header.set_mode(file_mode(&metadata));
        header.set_mtime(0); // Reproducible builds
        header.set_cksum();
        archive
            .append_data(&mut header, rel, file)
            .map_err(|e| CompileError::io_at(&path, e))?;
    }
    Ok(archive.into_inner()?)
}

fn write_zip<W: Write + Seek>(root: &Path, files: &[String], sink: W) -> Result<W, CompileError> {
    let mut zip = ZipWriter::new(sink);
    for rel in files {
        let path = root.join(rel);
        let mut file = File::open(&path).map_err(|e| CompileError::io_at(&path, e))?;
        let metadata = file.metadata().map_err(|e| CompileError::io_at(&path, e))?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(file_mode(&metadata));
        zip.start_file(rel.as_str(), options)?;
        std::io::copy(&mut file, &mut zip).map_err(|e| CompileError::io_at(&path, e))?;
    }
    Ok(zip.finish()?)
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

/// Read every file entry of an archive as `(path, bytes)`, sorted by path.
pub fn read_archive_entries(
    archive_path: &Path,
    format: ArchiveFormat,
) -> Result<Vec<(String, Vec<u8>)>, CompileError> {
    let file = File::open(archive_path).map_err(|e| CompileError::io_at(archive_path, e))?;
    let mut entries = match format {
        ArchiveFormat::Tar => read_tar_entries(file)?,
        ArchiveFormat::TarGz => read_tar_entries(GzDecoder::new(file))?,
        ArchiveFormat::Zip => {
            let mut archive = ZipArchive::new(file)?;
            let mut entries = Vec::new();
            for i in 0..archive.len() {
                let mut entry = archive.by_index(i)?;
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_string();
                let mut content = Vec::new();
                entry.read_to_end(&mut content)?;
                entries.push((name, content));
            }
            entries
        }
    };
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn read_tar_entries<R: Read>(reader: R) -> Result<Vec<(String, Vec<u8>)>, CompileError> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().replace('\\', "/");
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        entries.push((name, content));
    }
    Ok(entries)
}

/// Unpack an archive into `dest`. Entries escaping `dest` are rejected.
pub fn extract_archive(
    archive_path: &Path,
    format: ArchiveFormat,
    dest: &Path,
) -> Result<(), CompileError> {
    let file = File::open(archive_path).map_err(|e| CompileError::io_at(archive_path, e))?;
    match format {
        ArchiveFormat::Tar => tar::Archive::new(file)
            .unpack(dest)
            .map_err(|e| CompileError::io_at(archive_path, e)),
        ArchiveFormat::TarGz => tar::Archive::new(GzDecoder::new(file))
            .unpack(dest)
            .map_err(|e| CompileError::io_at(archive_path, e)),
        ArchiveFormat::Zip => Ok(ZipArchive::new(file)?.extract(dest)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("TOSCA-Metadata")).unwrap();
        fs::create_dir_all(dir.path().join("scripts/nested")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("TOSCA-Metadata/TOSCA.meta"), "meta").unwrap();
        fs::write(dir.path().join("scripts/install.sh"), "#!/bin/sh\necho hi\n").unwrap();
        fs::write(dir.path().join("scripts/nested/blob.bin"), [0u8, 255, 7, 42]).unwrap();
        dir
    }

    fn expected_entries(root: &Path) -> Vec<(String, Vec<u8>)> {
        list_files(root)
            .unwrap()
            .into_iter()
            .map(|rel| {
                let bytes = fs::read(root.join(&rel)).unwrap();
                (rel, bytes)
            })
            .collect()
    }

    #[test]
    fn parses_formats() {
        assert_eq!(ArchiveFormat::parse("zip").unwrap(), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::parse(" TGZ ").unwrap(), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::parse("targz").unwrap(), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::parse("tar.gz").unwrap(), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::parse("tar").unwrap(), ArchiveFormat::Tar);

        let err = ArchiveFormat::parse("rar").unwrap_err();
        assert!(matches!(err, CompileError::InvalidEnumValue { .. }));
    }

    #[test]
    fn zip_round_trip_reproduces_tree() {
        let tree = sample_tree();
        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("app.zip");

        let file = File::create(&archive_path).unwrap();
        write_archive(tree.path(), ArchiveFormat::Zip, file).unwrap();

        let entries = read_archive_entries(&archive_path, ArchiveFormat::Zip).unwrap();
        assert_eq!(entries, expected_entries(tree.path()));
    }

    #[test]
    fn tgz_round_trip_reproduces_tree() {
        let tree = sample_tree();
        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("app.tar.gz");

        let file = File::create(&archive_path).unwrap();
        write_archive(tree.path(), ArchiveFormat::TarGz, file).unwrap();

        let entries = read_archive_entries(&archive_path, ArchiveFormat::TarGz).unwrap();
        assert_eq!(entries, expected_entries(tree.path()));
    }

    #[test]
    fn archives_are_reproducible() {
        let tree = sample_tree();
        let a = archive_to_vec(tree.path(), ArchiveFormat::TarGz).unwrap();
        let b = archive_to_vec(tree.path(), ArchiveFormat::TarGz).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn extract_restores_files() {
        let tree = sample_tree();
        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("files.tgz");
        fs::write(
            &archive_path,
            archive_to_vec(tree.path(), ArchiveFormat::TarGz).unwrap(),
        )
        .unwrap();

        let dest = out.path().join("unpacked");
        extract_archive(&archive_path, ArchiveFormat::TarGz, &dest).unwrap();
        assert_eq!(
            fs::read_to_string(dest.join("scripts/install.sh")).unwrap(),
            "#!/bin/sh\necho hi\n"
        );
    }

    #[test]
    fn guesses_format_from_name() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("a/any2api-generated-x.tar.gz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(ArchiveFormat::from_path(Path::new("x.zip")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_path(Path::new("x.txt")), None);
    }
}
