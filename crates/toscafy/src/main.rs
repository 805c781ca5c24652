//! toscafy: compile topology specs into TOSCA CSAR archives.
//!
//! `generate` writes the CSAR tree into a directory, `package` streams it
//! into a zip or tar archive and `validate` only checks the spec.

mod vars;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use toscafy_compiler::{
    ArchiveFormat, CompileError, CompileOptions, Compiler, GeneratorConfig, PackageOptions,
};
use toscafy_telemetry::{init_logging, LogFormat, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "toscafy", about = "TOSCA CSAR compiler and packager", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (RUST_LOG takes precedence).
    #[arg(long, global = true, env = "TOSCAFY_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Log format (json or pretty).
    #[arg(long, global = true, env = "TOSCAFY_LOG_FORMAT", default_value = "pretty")]
    log_format: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a spec into a CSAR directory tree.
    Generate {
        #[command(flatten)]
        input: InputArgs,

        /// Output directory. Created if missing; must not be inside the
        /// working directory.
        #[arg(short, long)]
        output: PathBuf,

        /// Result format (text or json).
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Compile a spec and pack the CSAR into an archive.
    Package {
        #[command(flatten)]
        input: InputArgs,

        /// Archive path, or `-` for stdout.
        #[arg(short, long)]
        output: String,

        /// Archive format (zip, tar, tgz). Defaults to the output extension,
        /// then zip.
        #[arg(long)]
        archive_format: Option<String>,
    },

    /// Validate and normalize a spec without producing a CSAR.
    ///
    /// Directives are still resolved, so fetch errors (E1030) surface here.
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Output format (text or json). `json` prints the normalized spec.
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Spec input and compilation flags shared by every command.
#[derive(Args, Debug)]
struct InputArgs {
    /// Spec file (JSON or YAML), or `-` for stdin.
    #[arg(short, long)]
    spec: String,

    /// Directory of referenceable files. Defaults to the spec's directory.
    #[arg(short, long)]
    working_dir: Option<PathBuf>,

    /// Rewrite every identifier to camel case.
    #[arg(long)]
    camelize: bool,

    /// Copy only files reached by artifact references.
    #[arg(long)]
    refs_only: bool,

    /// Template variable, `key=value`; dotted keys nest. Repeatable.
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// JSON or YAML file of template variables.
    #[arg(long)]
    vars_file: Option<PathBuf>,

    /// Parent directory of temporary directories.
    #[arg(long, env = "TOSCAFY_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Local artifact API generator executable.
    #[arg(long, env = "TOSCAFY_GENERATOR", default_value = "any2api")]
    generator: String,

    /// Container image used when the local generator is unavailable.
    #[arg(long, env = "TOSCAFY_GENERATOR_IMAGE", default_value = "any2api/cli")]
    generator_image: String,
}

impl InputArgs {
    /// Read the spec text and build compile options.
    fn load(&self) -> anyhow::Result<(String, CompileOptions)> {
        let (text, spec_dir) = if self.spec == "-" {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read spec from stdin")?;
            (text, None)
        } else {
            let path = Path::new(&self.spec);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("spec file not found: {}", path.display()))?;
            let dir = path
                .parent()
                .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
                .map(Path::to_path_buf);
            (text, dir)
        };

        let options = CompileOptions {
            working_dir: self.working_dir.clone().or(spec_dir),
            output_dir: None,
            camelize: self.camelize,
            refs_only: self.refs_only,
            variables: vars::load(self.vars_file.as_deref(), &self.vars)?,
            temp_root: self.temp_dir.clone(),
            generator: GeneratorConfig {
                program: self.generator.clone(),
                container_image: self.generator_image.clone(),
                ..GeneratorConfig::default()
            },
        };
        Ok((text, options))
    }
}

/// Run the generate command.
fn run_generate(input: &InputArgs, output: PathBuf, format: &str) -> anyhow::Result<()> {
    let (text, options) = input.load()?;
    let options = CompileOptions {
        output_dir: Some(output),
        ..options
    };

    let result = Compiler::new()?.generate(&text, &options)?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!(
            "generated CSAR '{}' in {} ({} files)",
            result.csar_name,
            result.output_dir.display(),
            result.files.len()
        );
    }
    Ok(())
}

/// Run the package command.
fn run_package(
    input: &InputArgs,
    output: &str,
    archive_format: Option<&str>,
) -> anyhow::Result<()> {
    let (text, options) = input.load()?;
    let format = match archive_format {
        Some(name) => ArchiveFormat::parse(name)?,
        None => ArchiveFormat::from_path(Path::new(output)).unwrap_or(ArchiveFormat::Zip),
    };
    let package = PackageOptions { format };
    let compiler = Compiler::new()?;

    if output == "-" {
        let stdout = std::io::stdout().lock();
        let (result, _) = compiler.package_to_writer(&text, &options, &package, stdout)?;
        eprintln!(
            "packaged CSAR '{}' to stdout ({}, {} bytes)",
            result.csar_name, result.format, result.bytes
        );
    } else {
        let result = compiler.package_to_file(&text, &options, &package, Path::new(output))?;
        eprintln!(
            "packaged CSAR '{}' to {} ({}, {} bytes)",
            result.csar_name, output, result.format, result.bytes
        );
    }
    Ok(())
}

/// Run the validate command.
fn run_validate(input: &InputArgs, format: &str) -> anyhow::Result<()> {
    let (text, options) = input.load()?;
    let spec = Compiler::new()?.validate(&text, &options)?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&spec)?);
    } else {
        eprintln!(
            "✓ {} is valid ({} node type(s), {} artifact(s), {} topology(ies))",
            input.spec,
            spec.node_types.len(),
            spec.artifacts.len(),
            spec.topologies.len()
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_format = cli.log_format.parse::<LogFormat>().unwrap_or_else(|e| {
        eprintln!("warning: {}", e);
        LogFormat::Pretty
    });
    let telemetry = TelemetryConfig::new()
        .with_log_level(&cli.log_level)
        .with_log_format(log_format);
    if let Err(e) = init_logging(&telemetry) {
        eprintln!("warning: {}", e);
    }

    let outcome = match cli.command {
        Commands::Generate {
            input,
            output,
            format,
        } => run_generate(&input, output, &format),
        Commands::Package {
            input,
            output,
            archive_format,
        } => run_package(&input, &output, archive_format.as_deref()),
        Commands::Validate { input, format } => run_validate(&input, &format),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e
                .downcast_ref::<CompileError>()
                .map_or(1, CompileError::exit_code);
            ExitCode::from(code)
        }
    }
}
