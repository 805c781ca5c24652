//! Compiles declarative topology specs into TOSCA CSAR packages.
//!
//! Resolves embedded directives, validates and normalizes the spec,
//! optionally wraps artifacts as API services, renders the TOSCA
//! definitions, schema and manifest, and streams the tree into an archive.

pub mod assemble;
pub mod context;
pub mod directive;
pub mod error;
pub mod fetch;
pub mod ignore;
pub mod model;
pub mod names;
pub mod normalize;
pub mod package;
pub mod pipeline;
pub mod render;
pub mod template;
pub mod types;
pub mod wrap;

pub use context::Context;
pub use error::CompileError;
pub use fetch::{Fetcher, HttpFetcher};
pub use model::CsarSpec;
pub use package::{read_archive_entries, ArchiveFormat};
pub use pipeline::{
    parse_document, CompileOptions, CompileResult, Compiler, PackageOptions, PackageResult,
    COMPILER_VERSION,
};
pub use wrap::{CommandOutput, CommandRunner, GeneratorConfig, SystemCommandRunner};
