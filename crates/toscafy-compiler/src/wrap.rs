//! Artifact wrapping: fronting an artifact with a generated API service.
//!
//! Wrapping runs the external `any2api` generator over the artifact's files
//! plus an `apispec.json`, packs the generated service into the output tree
//! and rewrites the artifact to an `ApiServiceArtifact` pointing at it.
//! The generator is reached through a [`CommandRunner`], so the local or
//! containerized invocation is probed once per run and cached in the
//! [`Context`].

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use crate::context::Context;
use crate::directive::copy_dir;
use crate::error::CompileError;
use crate::model::{Artifact, CsarSpec};
use crate::names::kebab;
use crate::package::{extract_archive, write_archive, ArchiveFormat};
use crate::types::{property_wrapper, API_SERVICE_ARTIFACT, TOSCAFY_ARTIFACT_TYPES_NS};

/// Reference name marker of a previously produced API specification.
const ARTIFACT_SPEC_MARKER: &str = "artifact-spec";
/// Reference name marker of an archive holding the artifact's files.
const ARTIFACT_FILES_MARKER: &str = "artifact-files";
const API_SPEC_FILE: &str = "apispec.json";
const PARAMETERS_SCHEMA: &str = "parameters_schema";
const RESULTS_SCHEMA: &str = "results_schema";
const CONTAINER_PORT: &str = "3000";
const ENDPOINT_PATH: &str = "/";

/// Endpoint style of a wrapped artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapType {
    Rest,
    Soap,
}

impl WrapType {
    /// Parse `rest-api` or `soap-api`, case-insensitively.
    pub fn parse(s: &str) -> Result<Self, CompileError> {
        match s.trim().to_lowercase().as_str() {
            "rest-api" => Ok(Self::Rest),
            "soap-api" => Ok(Self::Soap),
            _ => Err(CompileError::InvalidEnumValue {
                kind: "wrap type",
                value: s.to_string(),
            }),
        }
    }

    /// Value passed to the generator's `-i` flag.
    pub fn interface_style(&self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Soap => "soap",
        }
    }
}

/// How to reach the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Locally installed generator executable.
    pub program: String,
    /// Container runtime used when the local executable is unavailable.
    pub container_runtime: String,
    /// Image providing the generator.
    pub container_image: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            program: "any2api".into(),
            container_runtime: "docker".into(),
            container_image: "any2api/cli".into(),
        }
    }
}

/// The generator invocation that answered the capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorInvocation {
    Local,
    /// Run inside a container with the scratch root mounted at the same path.
    Container,
}

impl GeneratorInvocation {
    /// Program and leading arguments for this invocation.
    pub fn command(&self, config: &GeneratorConfig, scratch_root: &Path) -> (String, Vec<String>) {
        match self {
            Self::Local => (config.program.clone(), Vec::new()),
            Self::Container => {
                let root = scratch_root.display().to_string();
                (
                    config.container_runtime.clone(),
                    vec![
                        "run".into(),
                        "-v".into(),
                        format!("{}:{}", root, root),
                        config.container_image.clone(),
                    ],
                )
            }
        }
    }
}

/// Captured result of an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Capability to run external commands.
pub trait CommandRunner {
    /// Run `program` to completion. Failing to start it is an error;
    /// a non-zero exit is not.
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CompileError>;
}

/// Runs commands as child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CompileError> {
        let output = Command::new(program).args(args).output().map_err(|e| {
            CompileError::GeneratorUnavailable(format!("cannot run '{}': {}", program, e))
        })?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Stage 4: wrap or describe every artifact, in declaration order.
///
/// Artifacts with a `wrap` type are replaced by generated API services.
/// Artifacts without one that declare parameter/result schemas get those
/// schemas written to an `artifact-spec` file added to their references.
pub fn wrap_artifacts(
    spec: &mut CsarSpec,
    ctx: &mut Context,
    runner: &dyn CommandRunner,
) -> Result<(), CompileError> {
    for (name, artifact) in spec.artifacts.iter_mut() {
        let wrap = artifact.wrap.as_deref().map(WrapType::parse).transpose()?;
        let declared = take_api_spec(artifact);
        match wrap {
            None => {
                if let Some(api_spec) = declared {
                    write_artifact_spec(name, artifact, &api_spec, ctx)?;
                }
            }
            Some(wrap) => {
                let api_spec = match declared {
                    Some(api_spec) => api_spec,
                    None => read_artifact_spec(name, artifact, ctx)?,
                };
                wrap_artifact(name, artifact, &api_spec, wrap, ctx, runner)?;
            }
        }
    }
    Ok(())
}

/// Properties map with the type wrapper element stripped, for mutation.
fn plain_properties_mut(artifact: &mut Artifact) -> Option<&mut Map<String, Value>> {
    let wrapper = property_wrapper(artifact.type_name());
    let props = artifact.properties.as_mut()?.as_object_mut()?;
    let nested = matches!(
        &wrapper,
        Some(w) if props.len() == 1 && props.get(w).is_some_and(Value::is_object)
    );
    if nested {
        props.values_mut().next()?.as_object_mut()
    } else {
        Some(props)
    }
}

/// Move declared parameter/result schemas out of the properties.
fn take_api_spec(artifact: &mut Artifact) -> Option<Value> {
    let props = plain_properties_mut(artifact)?;
    let mut api_spec = Map::new();
    for key in [PARAMETERS_SCHEMA, RESULTS_SCHEMA] {
        if let Some(schema) = props.shift_remove(key) {
            api_spec.insert(key.to_string(), schema);
        }
    }
    (!api_spec.is_empty()).then_some(Value::Object(api_spec))
}

fn write_artifact_spec(
    name: &str,
    artifact: &mut Artifact,
    api_spec: &Value,
    ctx: &mut Context,
) -> Result<(), CompileError> {
    let rel = ctx.free_output_path(&format!("{}/{}", name, ARTIFACT_SPEC_MARKER), ".json");
    let dest = ctx.output_dir.join(&rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| CompileError::io_at(parent, e))?;
    }
    fs::write(&dest, serde_json::to_vec_pretty(api_spec)?)
        .map_err(|e| CompileError::io_at(&dest, e))?;
    ctx.record_output(rel.clone());
    artifact.references.push(Value::String(rel));
    Ok(())
}

/// Where a referenced path currently lives: output tree first, then working tree.
fn source_path(ctx: &Context, rel: &str) -> PathBuf {
    let output = ctx.output_dir.join(rel);
    if output.exists() {
        output
    } else {
        ctx.working_dir.join(rel)
    }
}

fn read_artifact_spec(name: &str, artifact: &Artifact, ctx: &Context) -> Result<Value, CompileError> {
    let rel = artifact
        .reference_paths()
        .filter(|r| r.contains(ARTIFACT_SPEC_MARKER))
        .last()
        .ok_or_else(|| {
            CompileError::Wrap(format!(
                "cannot determine parameters of artifact '{}': no {} or {} property and no {} reference",
                name, PARAMETERS_SCHEMA, RESULTS_SCHEMA, ARTIFACT_SPEC_MARKER
            ))
        })?;
    let path = source_path(ctx, rel);
    let content = fs::read(&path).map_err(|e| CompileError::io_at(&path, e))?;
    serde_json::from_slice(&content).map_err(|e| {
        CompileError::Wrap(format!(
            "cannot parse '{}' of artifact '{}': {}",
            rel, name, e
        ))
    })
}

/// Probe the local generator, then the container, once per run.
fn generator_invocation(
    ctx: &mut Context,
    runner: &dyn CommandRunner,
) -> Result<GeneratorInvocation, CompileError> {
    if let Some(invocation) = ctx.generator_invocation {
        return Ok(invocation);
    }
    for candidate in [GeneratorInvocation::Local, GeneratorInvocation::Container] {
        let (program, mut args) = candidate.command(&ctx.generator, &ctx.temp_root);
        args.push("--help".into());
        let answered = runner.run(&program, &args).is_ok_and(|out| out.success());
        tracing::debug!(program = %program, ?candidate, answered, "Probed generator");
        if answered {
            ctx.generator_invocation = Some(candidate);
            return Ok(candidate);
        }
    }
    Err(CompileError::GeneratorUnavailable(format!(
        "neither '{}' nor '{} run {}' can be run",
        ctx.generator.program, ctx.generator.container_runtime, ctx.generator.container_image
    )))
}

fn scratch_dir(ctx: &Context, prefix: &str) -> Result<TempDir, CompileError> {
    fs::create_dir_all(&ctx.temp_root).map_err(|e| CompileError::io_at(&ctx.temp_root, e))?;
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(&ctx.temp_root)
        .map_err(|e| CompileError::io_at(&ctx.temp_root, e))
}

fn wrap_artifact(
    name: &str,
    artifact: &mut Artifact,
    api_spec: &Value,
    wrap: WrapType,
    ctx: &mut Context,
    runner: &dyn CommandRunner,
) -> Result<(), CompileError> {
    let invocation = generator_invocation(ctx, runner)?;
    let files_dir = scratch_dir(ctx, "toscafy-artifact-files-")?;
    let generated_dir = scratch_dir(ctx, "toscafy-any2api-generated-")?;

    let result = generate_service(
        name,
        artifact,
        api_spec,
        wrap,
        invocation,
        files_dir.path(),
        generated_dir.path(),
        ctx,
        runner,
    );

    for dir in [files_dir, generated_dir] {
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            toscafy_telemetry::log_cleanup_failed!(
                path = %path.display(),
                error = %e,
                "Failed to remove scratch directory"
            );
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn generate_service(
    name: &str,
    artifact: &mut Artifact,
    api_spec: &Value,
    wrap: WrapType,
    invocation: GeneratorInvocation,
    files_dir: &Path,
    generated_dir: &Path,
    ctx: &mut Context,
    runner: &dyn CommandRunner,
) -> Result<(), CompileError> {
    for rel in artifact.reference_paths() {
        if rel.contains(ARTIFACT_SPEC_MARKER) {
            continue;
        }
        let src = source_path(ctx, rel);
        let unpack = rel
            .contains(ARTIFACT_FILES_MARKER)
            .then(|| ArchiveFormat::from_path(&src))
            .flatten();
        if let (Some(format), true) = (unpack, src.is_file()) {
            extract_archive(&src, format, files_dir)?;
        } else if src.is_dir() {
            copy_dir(&src, &files_dir.join(rel))?;
        } else {
            let dest = files_dir.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| CompileError::io_at(parent, e))?;
            }
            fs::copy(&src, &dest).map_err(|e| CompileError::io_at(&src, e))?;
        }
    }

    let mut executable = api_spec.as_object().cloned().unwrap_or_default();
    executable.insert("path".into(), json!("."));
    let apispec = json!({
        "executables": { name: executable },
        "implementation": {
            "title": name,
            "description": artifact.description.clone().unwrap_or_default(),
        }
    });
    let apispec_path = files_dir.join(API_SPEC_FILE);
    fs::write(&apispec_path, serde_json::to_vec_pretty(&apispec)?)
        .map_err(|e| CompileError::io_at(&apispec_path, e))?;

    let (program, mut args) = invocation.command(&ctx.generator, &ctx.temp_root);
    args.extend([
        "-i".to_string(),
        wrap.interface_style().to_string(),
        "-c".to_string(),
        "-o".to_string(),
        generated_dir.display().to_string(),
        "gen".to_string(),
        files_dir.display().to_string(),
    ]);
    let output = runner.run(&program, &args)?;
    if !output.success() {
        return Err(CompileError::GeneratorFailed {
            artifact: name.to_string(),
            status: output
                .status
                .map_or_else(|| "terminated".to_string(), |code| format!("exit code {}", code)),
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    let archive = ctx.free_output_path(&format!("any2api-generated-{}", name), ".tar.gz");
    let dest = ctx.output_dir.join(&archive);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| CompileError::io_at(parent, e))?;
    }
    let file = File::create(&dest).map_err(|e| CompileError::io_at(&dest, e))?;
    write_archive(generated_dir, ArchiveFormat::TarGz, BufWriter::new(file))?;
    ctx.record_output(archive.clone());

    artifact.artifact_type = Some(API_SERVICE_ARTIFACT.to_string());
    artifact.namespace = Some(TOSCAFY_ARTIFACT_TYPES_NS.to_string());
    artifact.properties = Some(json!({
        format!("{}Properties", API_SERVICE_ARTIFACT): {
            "context": archive,
            "interfaceStyle": wrap.interface_style(),
            "serviceName": kebab(name),
            "containerPort": CONTAINER_PORT,
            "endpointPath": ENDPOINT_PATH,
        }
    }));
    artifact.references = vec![Value::String(archive.clone())];
    artifact.wrap = None;

    toscafy_telemetry::log_artifact_wrapped!(
        artifact = %name,
        interface_style = wrap.interface_style(),
        archive = %archive,
        "Artifact wrapped"
    );
    Ok(())
}
