//! Output assembly: directory skeleton, working file copy and the generated
//! documents.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::context::{normalize_relative, Context, DEFINITIONS_DIR, META_DIR, META_FILE, SCHEMAS_DIR};
use crate::error::CompileError;
use crate::model::CsarSpec;
use crate::render::{self, relative_location};
use crate::types::reference_properties;

/// Paths and checksums of an assembled output tree.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub definitions_file: String,
    pub schema_file: String,
    pub sidecar_file: String,
    /// Every file of the final tree, sorted, manifest included.
    pub files: Vec<String>,
    /// `sha256:<hex>` of each generated document, keyed by path.
    pub checksums: BTreeMap<String, String>,
}

/// Stage 5: lay out the output directory for a normalized spec.
pub fn assemble(spec: &CsarSpec, ctx: &mut Context) -> Result<Assembled, CompileError> {
    for dir in [META_DIR, DEFINITIONS_DIR, SCHEMAS_DIR] {
        let path = ctx.output_dir.join(dir);
        fs::create_dir_all(&path).map_err(|e| CompileError::io_at(&path, e))?;
    }

    copy_working_files(spec, ctx)?;

    let mut checksums = BTreeMap::new();

    let schema_file = ctx.schema_file.clone();
    let schema = render::schema::render(spec);
    checksums.insert(schema_file.clone(), write_document(ctx, &schema_file, &schema)?);

    let definitions_file = ctx.definitions_file.clone();
    let definitions = render::definitions::render(
        spec,
        &relative_location(&definitions_file, &schema_file),
    );
    checksums.insert(
        definitions_file.clone(),
        write_document(ctx, &definitions_file, &definitions)?,
    );

    let sidecar_file = ctx.sidecar_file.clone();
    let sidecar = serde_json::to_string_pretty(spec)?;
    checksums.insert(sidecar_file.clone(), write_document(ctx, &sidecar_file, &sidecar)?);

    // The manifest lists the finished tree, so it is written last.
    let listed: Vec<String> = ctx.output_files.iter().cloned().collect();
    let meta = render::meta::render(&definitions_file, &listed);
    checksums.insert(META_FILE.to_string(), write_document(ctx, META_FILE, &meta)?);

    Ok(Assembled {
        definitions_file,
        schema_file,
        sidecar_file,
        files: ctx.output_files.iter().cloned().collect(),
        checksums,
    })
}

/// Copy working files into the output tree.
///
/// Files already in the output tree were produced by directives and win.
/// With `refs_only`, only files reached by an artifact reference are copied.
fn copy_working_files(spec: &CsarSpec, ctx: &mut Context) -> Result<(), CompileError> {
    let referenced = ctx.refs_only.then(|| referenced_paths(spec));
    let candidates: Vec<String> = ctx
        .working_files
        .iter()
        .filter(|f| !ctx.output_files.contains(*f))
        .filter(|f| referenced.as_ref().map_or(true, |refs| is_referenced(refs, f)))
        .cloned()
        .collect();

    for rel in candidates {
        let src = ctx.working_dir.join(&rel);
        if !src.is_file() {
            continue;
        }
        let dest = ctx.output_dir.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CompileError::io_at(parent, e))?;
        }
        fs::copy(&src, &dest).map_err(|e| CompileError::io_at(&src, e))?;
        ctx.record_output(rel);
    }
    Ok(())
}

/// Normalized paths named by artifact references and reference properties.
fn referenced_paths(spec: &CsarSpec) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    for artifact in spec.artifacts.values() {
        paths.extend(artifact.reference_paths().filter_map(normalize_relative));
        if let Some(props) = artifact.plain_properties() {
            for prop in reference_properties(artifact.type_name()) {
                if let Some(path) = props.get(*prop).and_then(Value::as_str) {
                    paths.extend(normalize_relative(path));
                }
            }
        }
    }
    paths
}

/// A file is referenced by its own path or by any ancestor directory.
fn is_referenced(refs: &BTreeSet<String>, file: &str) -> bool {
    refs.contains(file)
        || file
            .match_indices('/')
            .any(|(i, _)| refs.contains(&file[..i]))
}

fn write_document(ctx: &mut Context, rel: &str, content: &str) -> Result<String, CompileError> {
    let dest = ctx.output_dir.join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| CompileError::io_at(parent, e))?;
    }
    fs::write(&dest, content).map_err(|e| CompileError::io_at(&dest, e))?;
    ctx.record_output(rel);
    Ok(format!("sha256:{}", sha256_hex(content.as_bytes())))
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of a file.
pub fn file_sha256(path: &Path) -> Result<String, CompileError> {
    let content = fs::read(path).map_err(|e| CompileError::io_at(path, e))?;
    Ok(sha256_hex(&content))
}
