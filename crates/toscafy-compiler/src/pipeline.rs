//! Pipeline entry points: generate, validate and package.
//!
//! A run owns its [`Context`] and every directory it creates. Directories
//! created by the run are removed on failure; a caller-supplied directory
//! that already existed is left as is.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::assemble::{assemble, file_sha256, Assembled};
use crate::context::Context;
use crate::directive::DirectiveResolver;
use crate::error::CompileError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::model::CsarSpec;
use crate::normalize::normalize;
use crate::package::{write_archive, ArchiveFormat};
use crate::template;
use crate::wrap::{wrap_artifacts, CommandRunner, GeneratorConfig, SystemCommandRunner};

/// Compiler version (from Cargo.toml).
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Options for one compilation run.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Source of referenceable files. Defaults to a fresh empty directory.
    pub working_dir: Option<PathBuf>,
    /// Destination tree. Defaults to a fresh directory under `temp_root`.
    /// Must not be inside `working_dir`.
    pub output_dir: Option<PathBuf>,
    /// Canonicalize every identifier to camel case.
    pub camelize: bool,
    /// Copy only files reached by artifact references.
    pub refs_only: bool,
    /// Template variables substituted into the spec text before parsing.
    pub variables: Option<Value>,
    /// Parent of scratch directories. Defaults to the system temp dir.
    pub temp_root: Option<PathBuf>,
    /// External API generator used for artifacts marked `wrap`.
    pub generator: GeneratorConfig,
}

impl CompileOptions {
    fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Options for packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageOptions {
    pub format: ArchiveFormat,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            format: ArchiveFormat::Zip,
        }
    }
}

/// Result of a `generate` run.
#[derive(Debug, Clone, Serialize)]
pub struct CompileResult {
    pub csar_name: String,
    pub csar_namespace: String,
    pub compiled_at: String,
    pub compiler_version: String,
    pub output_dir: PathBuf,
    pub definitions_file: String,
    pub schema_file: String,
    pub sidecar_file: String,
    pub files: Vec<String>,
    /// Checksums use BTreeMap for deterministic JSON serialization order.
    pub checksums: BTreeMap<String, String>,
}

/// Result of a `package` run.
#[derive(Debug, Clone, Serialize)]
pub struct PackageResult {
    pub csar_name: String,
    pub format: ArchiveFormat,
    /// Archive file, when packaged to a path.
    pub archive: Option<PathBuf>,
    /// `sha256:<hex>` of the archive file, when packaged to a path.
    pub archive_sha256: Option<String>,
    pub bytes: u64,
    pub files: Vec<String>,
    pub checksums: BTreeMap<String, String>,
}

/// A directory the run created. Removed on drop unless kept.
struct ScopedDir {
    path: PathBuf,
    keep: bool,
}

impl ScopedDir {
    fn create(path: PathBuf) -> Result<Self, CompileError> {
        fs::create_dir_all(&path).map_err(|e| CompileError::io_at(&path, e))?;
        Ok(Self { path, keep: false })
    }

    fn fresh(parent: &Path, prefix: &str) -> Result<Self, CompileError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::create(parent.join(format!("{}{}", prefix, &id[..12])))
    }

    fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        if self.keep || !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            toscafy_telemetry::log_cleanup_failed!(
                path = %self.path.display(),
                error = %e,
                "failed to remove temporary directory"
            );
        }
    }
}

/// A directory the run reads or writes: either supplied by the caller
/// or owned by the run.
enum RunDir {
    Existing(PathBuf),
    Owned(ScopedDir),
}

impl RunDir {
    fn path(&self) -> &Path {
        match self {
            Self::Existing(path) => path,
            Self::Owned(dir) => &dir.path,
        }
    }

    /// A caller-supplied working directory must exist.
    fn working(requested: Option<&Path>, temp_root: &Path) -> Result<Self, CompileError> {
        match requested {
            Some(path) if path.is_dir() => Ok(Self::Existing(path.to_path_buf())),
            Some(path) => Err(CompileError::InvalidInput(format!(
                "working directory '{}' does not exist",
                path.display()
            ))),
            None => Ok(Self::Owned(ScopedDir::fresh(temp_root, "toscafy-working-")?)),
        }
    }

    fn open(requested: Option<&Path>, temp_root: &Path, prefix: &str) -> Result<Self, CompileError> {
        match requested {
            Some(path) if path.exists() => Ok(Self::Existing(path.to_path_buf())),
            Some(path) => Ok(Self::Owned(ScopedDir::create(path.to_path_buf())?)),
            None => Ok(Self::Owned(ScopedDir::fresh(temp_root, prefix)?)),
        }
    }

    fn keep(self) -> PathBuf {
        match self {
            Self::Existing(path) => path,
            Self::Owned(dir) => dir.keep(),
        }
    }
}

/// How far a run goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Normalize,
    Assemble,
}

/// Runs the compilation pipeline with injected fetch and process capabilities.
pub struct Compiler {
    fetcher: Box<dyn Fetcher>,
    runner: Box<dyn CommandRunner>,
}

impl Compiler {
    /// Compiler with the HTTP fetcher and the system command runner.
    pub fn new() -> Result<Self, CompileError> {
        Ok(Self::with_capabilities(
            Box::new(HttpFetcher::new()?),
            Box::new(SystemCommandRunner),
        ))
    }

    pub fn with_capabilities(fetcher: Box<dyn Fetcher>, runner: Box<dyn CommandRunner>) -> Self {
        Self { fetcher, runner }
    }

    /// Compile `input` into an output directory.
    pub fn generate(&self, input: &str, options: &CompileOptions) -> Result<CompileResult, CompileError> {
        let temp_root = options.temp_root();
        let working = RunDir::working(options.working_dir.as_deref(), &temp_root)?;
        let output = RunDir::open(options.output_dir.as_deref(), &temp_root, "toscafy-output-")?;

        let (spec, assembled) = self.run(input, options, working.path(), output.path(), Stage::Assemble)?;
        let assembled = assembled.ok_or_else(|| CompileError::InvalidInput("nothing assembled".into()))?;

        Ok(CompileResult {
            csar_name: spec.name().to_string(),
            csar_namespace: spec.namespace().to_string(),
            compiled_at: chrono::Utc::now().to_rfc3339(),
            compiler_version: COMPILER_VERSION.to_string(),
            output_dir: output.keep(),
            definitions_file: assembled.definitions_file,
            schema_file: assembled.schema_file,
            sidecar_file: assembled.sidecar_file,
            files: assembled.files,
            checksums: assembled.checksums,
        })
    }

    /// Parse, resolve directives and normalize `input`, returning the
    /// normalized spec. Directive side effects land in a throw-away directory.
    pub fn validate(&self, input: &str, options: &CompileOptions) -> Result<CsarSpec, CompileError> {
        let temp_root = options.temp_root();
        let working = RunDir::working(options.working_dir.as_deref(), &temp_root)?;
        let scratch = ScopedDir::fresh(&temp_root, "toscafy-validate-")?;

        let (spec, _) = self.run(input, options, working.path(), &scratch.path, Stage::Normalize)?;
        Ok(spec)
    }

    /// Compile `input` and write the archive to `path`.
    ///
    /// The output tree is built in a run-owned temporary directory which is
    /// always removed; `options.output_dir` is not used. A partially written
    /// archive is removed on failure.
    pub fn package_to_file(
        &self,
        input: &str,
        options: &CompileOptions,
        package: &PackageOptions,
        path: &Path,
    ) -> Result<PackageResult, CompileError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CompileError::io_at(parent, e))?;
        }
        let file = File::create(path).map_err(|e| CompileError::io_at(path, e))?;

        let written = self
            .package_to_writer(input, options, package, BufWriter::new(file))
            .and_then(|(result, sink)| {
                let file = sink
                    .into_inner()
                    .map_err(|e| CompileError::io_at(path, e.into_error()))?;
                file.sync_all().map_err(|e| CompileError::io_at(path, e))?;
                Ok(result)
            });

        match written {
            Ok(mut result) => {
                result.archive_sha256 = Some(format!("sha256:{}", file_sha256(path)?));
                result.archive = Some(path.to_path_buf());
                Ok(result)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(path) {
                    toscafy_telemetry::log_cleanup_failed!(
                        path = %path.display(),
                        error = %cleanup,
                        "failed to remove partial archive"
                    );
                }
                Err(e)
            }
        }
    }

    /// Compile `input` and stream the archive into `sink`, returning the
    /// sink once the archive is finalized and flushed.
    pub fn package_to_writer<W: Write>(
        &self,
        input: &str,
        options: &CompileOptions,
        package: &PackageOptions,
        sink: W,
    ) -> Result<(PackageResult, W), CompileError> {
        let temp_root = options.temp_root();
        let working = RunDir::working(options.working_dir.as_deref(), &temp_root)?;
        let output = ScopedDir::fresh(&temp_root, "toscafy-package-")?;

        let (spec, assembled) = self.run(input, options, working.path(), &output.path, Stage::Assemble)?;
        let assembled = assembled.ok_or_else(|| CompileError::InvalidInput("nothing assembled".into()))?;

        let started = Instant::now();
        toscafy_telemetry::log_stage_started!(stage = "package", format = %package.format);
        let counted = write_archive(&output.path, package.format, CountingWriter::new(sink))?;
        toscafy_telemetry::log_archive_written!(
            format = %package.format,
            bytes = counted.count,
            files = assembled.files.len(),
            duration_ms = elapsed_ms(started),
            "archive written"
        );

        let result = PackageResult {
            csar_name: spec.name().to_string(),
            format: package.format,
            archive: None,
            archive_sha256: None,
            bytes: counted.count,
            files: assembled.files,
            checksums: assembled.checksums,
        };
        Ok((result, counted.inner))
    }

    fn run(
        &self,
        input: &str,
        options: &CompileOptions,
        working_dir: &Path,
        output_dir: &Path,
        until: Stage,
    ) -> Result<(CsarSpec, Option<Assembled>), CompileError> {
        check_dirs(working_dir, output_dir)?;

        let mut document = staged("parse", || parse_document(input, options.variables.as_ref()))?;

        let mut ctx = Context::new(
            working_dir,
            output_dir,
            options.generator.clone(),
            options.temp_root(),
        )?;
        ctx.camelize = options.camelize;
        ctx.refs_only = options.refs_only;

        staged("directives", || {
            DirectiveResolver::new(&mut ctx, self.fetcher.as_ref()).resolve(&mut document, working_dir)
        })?;
        let mut spec = staged("normalize", || normalize(document, &mut ctx))?;

        if until < Stage::Assemble {
            return Ok((spec, None));
        }

        staged("wrap", || wrap_artifacts(&mut spec, &mut ctx, self.runner.as_ref()))?;
        let assembled = staged("assemble", || assemble(&spec, &mut ctx))?;
        Ok((spec, Some(assembled)))
    }
}

/// Run one stage between start/completion log events.
fn staged<T>(
    stage: &'static str,
    f: impl FnOnce() -> Result<T, CompileError>,
) -> Result<T, CompileError> {
    let started = Instant::now();
    toscafy_telemetry::log_stage_started!(stage);
    let out = f()?;
    toscafy_telemetry::log_stage_completed!(
        stage,
        duration_ms = elapsed_ms(started)
    );
    Ok(out)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// The output directory must not be the working directory or below it.
fn check_dirs(working_dir: &Path, output_dir: &Path) -> Result<(), CompileError> {
    let working = working_dir.canonicalize().map_err(|e| {
        CompileError::InvalidInput(format!(
            "working directory '{}': {}",
            working_dir.display(),
            e
        ))
    })?;
    let output = output_dir
        .canonicalize()
        .map_err(|e| CompileError::io_at(output_dir, e))?;
    if output.starts_with(&working) {
        return Err(CompileError::InvalidInput(format!(
            "output directory '{}' must not be inside working directory '{}'",
            output_dir.display(),
            working_dir.display()
        )));
    }
    Ok(())
}

/// Apply template variables, then parse JSON or YAML.
pub fn parse_document(input: &str, variables: Option<&Value>) -> Result<Value, CompileError> {
    let text = match variables {
        Some(vars) => template::render(input, vars)?,
        None => input.to_string(),
    };
    // JSON is valid YAML, so one parser covers both.
    let document: Value = serde_yaml::from_str(&text).map_err(|e| CompileError::Parse(e.to_string()))?;
    if !document.is_object() {
        return Err(CompileError::Parse("spec root must be an object".into()));
    }
    Ok(document)
}

/// Counts bytes on their way to the sink.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
