use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while compiling or packaging a CSAR.
#[derive(Debug, Error)]
pub enum CompileError {
    /// E1001: Missing or contradictory invocation context.
    #[error("E1001: invalid input: {0}")]
    InvalidInput(String),

    /// E1002: Spec text is neither valid JSON nor valid YAML.
    #[error("E1002: parse error: {0}")]
    Parse(String),

    /// E1003: Template placeholder with no matching variable.
    #[error("E1003: unresolved template variable: {0}")]
    UnresolvedVariable(String),

    /// E1004: Unknown archive format or wrap type.
    #[error("E1004: invalid {kind}: '{value}'")]
    InvalidEnumValue { kind: &'static str, value: String },

    /// E1010: Entity is not a structured object or has the wrong shape.
    #[error("E1010: malformed entity: {0}")]
    MalformedEntity(String),

    /// E1011: Property binding names an operation the node type lacks.
    #[error("E1011: unknown operation: {0}")]
    UnknownOperation(String),

    /// E1012: Artifact reference does not resolve.
    #[error("E1012: dangling artifact reference: {0}")]
    DanglingArtifact(String),

    /// E1013: Artifact type missing or not resolvable.
    #[error("E1013: invalid artifact type: {0}")]
    InvalidArtifactType(String),

    /// E1014: File referenced by an artifact is not part of the output tree.
    #[error("E1014: missing referenced file: {0}")]
    MissingFile(String),

    /// E1015: Node refers to an unknown node type.
    #[error("E1015: invalid node type: {0}")]
    InvalidNodeType(String),

    /// E1016: Relationship type, source or target is invalid.
    #[error("E1016: invalid relationship: {0}")]
    InvalidRelationship(String),

    /// E1017: A reserved output path already exists.
    #[error("E1017: reserved path collision: {0}")]
    ReservedPath(String),

    /// E1020: Directive map is malformed.
    #[error("E1020: invalid directive: {0}")]
    InvalidDirective(String),

    /// E1021: Directive failed while executing.
    #[error("E1021: directive '{directive}' failed for '{target}': {reason}")]
    DirectiveFailed {
        directive: &'static str,
        target: String,
        reason: String,
    },

    /// E1030: Remote fetch failed.
    #[error("E1030: fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// E1040: Artifact cannot be wrapped.
    #[error("E1040: wrap error: {0}")]
    Wrap(String),

    /// E1041: Generator exited with a non-zero status.
    #[error("E1041: generator failed for artifact '{artifact}' ({status})\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    GeneratorFailed {
        artifact: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    /// E1042: Generator not runnable locally or in a container.
    #[error("E1042: generator unavailable: {0}")]
    GeneratorUnavailable(String),

    /// E1050: I/O error bound to a path.
    #[error("E1050: I/O error at {}: {source}", path.display())]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive codec error.
    #[error("archive error: {0}")]
    Archive(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompileError {
    /// Attach a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompileError::PathIo {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error.
    ///
    /// 1 = input or validation error, 2 = network or external process error,
    /// 3 = I/O error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CompileError::InvalidInput(_)
            | CompileError::Parse(_)
            | CompileError::UnresolvedVariable(_)
            | CompileError::InvalidEnumValue { .. }
            | CompileError::MalformedEntity(_)
            | CompileError::UnknownOperation(_)
            | CompileError::DanglingArtifact(_)
            | CompileError::InvalidArtifactType(_)
            | CompileError::MissingFile(_)
            | CompileError::InvalidNodeType(_)
            | CompileError::InvalidRelationship(_)
            | CompileError::ReservedPath(_)
            | CompileError::InvalidDirective(_)
            | CompileError::DirectiveFailed { .. }
            | CompileError::Wrap(_)
            | CompileError::Json(_) => 1,
            CompileError::Fetch { .. }
            | CompileError::GeneratorFailed { .. }
            | CompileError::GeneratorUnavailable(_) => 2,
            CompileError::PathIo { .. } | CompileError::Archive(_) | CompileError::Io(_) => 3,
        }
    }
}

impl From<zip::result::ZipError> for CompileError {
    fn from(err: zip::result::ZipError) -> Self {
        CompileError::Archive(err.to_string())
    }
}

impl From<walkdir::Error> for CompileError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
        match err.into_io_error() {
            Some(source) => CompileError::PathIo { path, source },
            None => CompileError::Archive(format!("filesystem loop at {}", path.display())),
        }
    }
}
