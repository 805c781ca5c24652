//! Spec validation and normalization.
//!
//! Passes run in a fixed order and each visits every entity of its domain
//! before the next starts, so the first reported error is deterministic:
//!
//! 1. shape checks on the raw document
//! 2. property value types and operation parameter bindings
//! 3. artifact slot promotion and reference resolution
//! 4. artifact type resolution and property wrapping
//! 5. artifact file reference validity
//! 6. topology checks, inline relationship hoisting
//! 7. default propagation to nodes
//! 8. identifier canonicalization (optional)
//! 9. interface derivation and artifact hoisting

mod artifacts;
mod interfaces;
mod properties;
mod rename;
mod shape;
mod topology;

use serde_json::Value;

use crate::context::Context;
use crate::error::CompileError;
use crate::model::CsarSpec;
use crate::names::SuffixStyle;

pub use rename::RenameTable;

/// Namespace prefix of generated CSARs.
pub const GENERATED_NAMESPACE_BASE: &str = "http://toscafy.github.io/generated/";

/// Validate and normalize a directive-free spec document.
pub fn normalize(document: Value, ctx: &mut Context) -> Result<CsarSpec, CompileError> {
    shape::check(&document)?;
    let mut spec: CsarSpec = serde_json::from_value(document)
        .map_err(|e| CompileError::MalformedEntity(format!("specification: {}", e)))?;

    apply_identity(&mut spec, ctx);

    properties::resolve_value_types(&mut spec)?;
    artifacts::promote_inline(&mut spec, ctx)?;
    artifacts::resolve_types(&mut spec)?;
    artifacts::check_references(&mut spec, ctx)?;
    topology::check(&mut spec, ctx)?;
    properties::propagate_defaults(&mut spec);
    if ctx.camelize {
        let table = RenameTable::build(&spec, ctx);
        table.apply(&mut spec);
    }
    interfaces::derive(&mut spec);

    Ok(spec)
}

/// Default the CSAR name and namespace, and hoist the single-topology shorthand.
fn apply_identity(spec: &mut CsarSpec, ctx: &mut Context) {
    let name = match spec.csar_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            let id = uuid::Uuid::new_v4().simple().to_string();
            format!("csar-{}", &id[..8])
        }
    };
    if spec.csar_namespace.as_deref().map_or(true, str::is_empty) {
        spec.csar_namespace = Some(format!("{}{}", GENERATED_NAMESPACE_BASE, name));
    }
    spec.csar_name = Some(name);

    if let Some(mut topology) = spec.topology.take() {
        let base = topology
            .name
            .take()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{}_Topology", spec.name()));
        let topologies = &spec.topologies;
        let name = ctx
            .names
            .unique(&base, SuffixStyle::Underscore, |n| topologies.contains_key(n));
        spec.topologies.insert(name, topology);
    }
    for topology in spec.topologies.values_mut() {
        topology.name = None;
    }
}
