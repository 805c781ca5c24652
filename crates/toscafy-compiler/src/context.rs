//! Per-run compilation context.
//!
//! Owned by exactly one pipeline run. Holds the working/output directories,
//! the file listings used to validate references, the chosen filenames for
//! generated documents and the run-scoped caches (name counter, generator
//! invocation mode).

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::CompileError;
use crate::ignore::IgnoreRules;
use crate::names::{NameGenerator, SuffixStyle};
use crate::wrap::{GeneratorConfig, GeneratorInvocation};

/// Metadata directory of the CSAR.
pub const META_DIR: &str = "TOSCA-Metadata";
/// Reserved manifest path.
pub const META_FILE: &str = "TOSCA-Metadata/TOSCA.meta";
/// Directory holding the definitions document and the spec side-car.
pub const DEFINITIONS_DIR: &str = "Definitions";
/// Directory holding the property schema.
pub const SCHEMAS_DIR: &str = "Schemas";

const DEFINITIONS_STEM: &str = "definitions";
const SCHEMA_STEM: &str = "properties";
const SIDECAR_STEM: &str = "csarspec";

/// State of one compilation run.
#[derive(Debug)]
pub struct Context {
    pub working_dir: PathBuf,
    pub output_dir: PathBuf,
    pub camelize: bool,
    pub refs_only: bool,
    /// Working-directory files after ignore filtering, relative with `/` separators.
    pub working_files: BTreeSet<String>,
    /// Files present in or written to the output directory.
    pub output_files: BTreeSet<String>,
    /// Relative path of the definitions document.
    pub definitions_file: String,
    /// Relative path of the property schema.
    pub schema_file: String,
    /// Relative path of the normalized spec side-car.
    pub sidecar_file: String,
    /// Single source of collision suffixes for the run.
    pub names: NameGenerator,
    pub generator: GeneratorConfig,
    /// Generator invocation mode, probed once per run.
    pub generator_invocation: Option<GeneratorInvocation>,
    /// Parent directory for scratch directories.
    pub temp_root: PathBuf,
}

impl Context {
    /// Scan both directories and choose collision-free document filenames.
    ///
    /// Fails with E1017 if the reserved manifest path already exists in
    /// either tree.
    pub fn new(
        working_dir: &Path,
        output_dir: &Path,
        generator: GeneratorConfig,
        temp_root: PathBuf,
    ) -> Result<Self, CompileError> {
        let rules = IgnoreRules::load(working_dir)?;
        let working_files = list_files(working_dir)?
            .into_iter()
            .filter(|f| !rules.is_ignored(f))
            .collect::<BTreeSet<_>>();
        let output_files = if output_dir.exists() {
            list_files(output_dir)?.into_iter().collect()
        } else {
            BTreeSet::new()
        };

        for (tree, files) in [("working", &working_files), ("output", &output_files)] {
            if files.contains(META_FILE) {
                return Err(CompileError::ReservedPath(format!(
                    "'{}' already exists in {} directory",
                    META_FILE, tree
                )));
            }
        }

        let mut ctx = Self {
            working_dir: working_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            camelize: false,
            refs_only: false,
            working_files,
            output_files,
            definitions_file: String::new(),
            schema_file: String::new(),
            sidecar_file: String::new(),
            names: NameGenerator::new(),
            generator,
            generator_invocation: None,
            temp_root,
        };

        ctx.definitions_file = ctx.free_document_path(DEFINITIONS_DIR, DEFINITIONS_STEM, "xml");
        ctx.schema_file = ctx.free_document_path(SCHEMAS_DIR, SCHEMA_STEM, "xsd");
        ctx.sidecar_file = ctx.free_document_path(DEFINITIONS_DIR, SIDECAR_STEM, "json");

        Ok(ctx)
    }

    fn free_document_path(&mut self, dir: &str, stem: &str, ext: &str) -> String {
        let taken = |candidate: &str| self.exists(&format!("{}/{}.{}", dir, candidate, ext));
        let stem = if taken(stem) {
            let mut names = std::mem::take(&mut self.names);
            let taken = |candidate: &str| self.exists(&format!("{}/{}.{}", dir, candidate, ext));
            let stem = names.suffixed(stem, SuffixStyle::Underscore, taken);
            self.names = names;
            stem
        } else {
            stem.to_string()
        };
        format!("{}/{}.{}", dir, stem, ext)
    }

    /// Whether a relative file exists in either tree.
    pub fn exists(&self, relative: &str) -> bool {
        self.working_files.contains(relative) || self.output_files.contains(relative)
    }

    /// Whether a relative path names a file, or a directory containing
    /// files, of the final output tree.
    pub fn contains_path(&self, relative: &str) -> bool {
        if self.exists(relative) {
            return true;
        }
        let prefix = format!("{}/", relative);
        self.working_files
            .iter()
            .chain(self.output_files.iter())
            .any(|f| f.starts_with(&prefix))
    }

    /// Record a file written into the output directory.
    pub fn record_output(&mut self, relative: impl Into<String>) {
        self.output_files.insert(relative.into());
    }

    /// Fails with E1017 if `relative` is the manifest or a document the
    /// compiler writes during assembly.
    pub fn check_not_reserved(&self, relative: &str) -> Result<(), CompileError> {
        let reserved = [
            META_FILE,
            self.definitions_file.as_str(),
            self.schema_file.as_str(),
            self.sidecar_file.as_str(),
        ];
        if reserved.contains(&relative) {
            return Err(CompileError::ReservedPath(format!(
                "'{}' is generated by the compiler",
                relative
            )));
        }
        Ok(())
    }

    /// Record every file under an output subdirectory.
    pub fn record_output_dir(&mut self, relative: &str) -> Result<(), CompileError> {
        let dir = self.output_dir.join(relative);
        for file in list_files(&dir)? {
            self.output_files.insert(format!("{}/{}", relative, file));
        }
        Ok(())
    }

    /// Pick a relative output path that is free in both trees.
    pub fn free_output_path(&mut self, base: &str, ext: &str) -> String {
        let mut names = std::mem::take(&mut self.names);
        let name = names.unique(base, SuffixStyle::Underscore, |candidate| {
            self.exists(&format!("{}{}", candidate, ext))
        });
        self.names = names;
        format!("{}{}", name, ext)
    }
}

/// List regular files below `root` as sorted relative `/`-separated paths.
pub fn list_files(root: &Path) -> Result<Vec<String>, CompileError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(relative_key(rel));
    }
    Ok(files)
}

/// `/`-joined normal components of a relative path.
pub fn relative_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a target path relative to the output directory.
///
/// Returns `None` for absolute paths, paths escaping the root via `..` and
/// empty paths.
pub fn normalize_relative(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn context(working: &Path, output: &Path) -> Result<Context, CompileError> {
        Context::new(working, output, GeneratorConfig::default(), std::env::temp_dir())
    }

    #[test]
    fn lists_working_files_without_ignored_ones() {
        let work = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::create_dir_all(work.path().join("scripts")).unwrap();
        fs::write(work.path().join("scripts/install.sh"), "echo").unwrap();
        fs::write(work.path().join("notes.log"), "x").unwrap();
        fs::write(work.path().join(".csarignore"), "*.log\n").unwrap();

        let ctx = context(work.path(), out.path()).unwrap();
        assert_eq!(
            ctx.working_files.iter().cloned().collect::<Vec<_>>(),
            vec!["scripts/install.sh"]
        );
        assert!(ctx.contains_path("scripts"));
        assert!(ctx.contains_path("scripts/install.sh"));
        assert!(!ctx.contains_path("script"));
    }

    #[test]
    fn reserved_manifest_in_working_dir_is_rejected() {
        let work = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::create_dir_all(work.path().join(META_DIR)).unwrap();
        fs::write(work.path().join(META_FILE), "x").unwrap();

        let err = context(work.path(), out.path()).unwrap_err();
        assert!(matches!(err, CompileError::ReservedPath(_)));
    }

    #[test]
    fn document_names_avoid_existing_files() {
        let work = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::create_dir_all(work.path().join(DEFINITIONS_DIR)).unwrap();
        fs::write(work.path().join("Definitions/definitions.xml"), "<x/>").unwrap();

        let ctx = context(work.path(), out.path()).unwrap();
        assert_eq!(ctx.definitions_file, "Definitions/definitions_1.xml");
        assert_eq!(ctx.schema_file, "Schemas/properties.xsd");
        assert_eq!(ctx.sidecar_file, "Definitions/csarspec.json");
    }

    #[test]
    fn normalizes_relative_targets() {
        assert_eq!(normalize_relative("./a/b.txt").as_deref(), Some("a/b.txt"));
        assert_eq!(normalize_relative("a\\b").as_deref(), Some("a/b"));
        assert!(normalize_relative("../escape").is_none());
        assert!(normalize_relative("/etc/passwd").is_none());
        assert!(normalize_relative("").is_none());
    }
}
