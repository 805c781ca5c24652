//! Pass 6: node types, relationship types and endpoints of every topology.

use crate::context::Context;
use crate::error::CompileError;
use crate::model::{CsarSpec, InlineRelationship, Relationship, Topology};
use crate::names::SuffixStyle;
use crate::types::resolve_relationship_type;

/// Relationship type given to inline relationships without one.
const DEFAULT_RELATIONSHIP_TYPE: &str = "DependsOn";

pub(super) fn check(spec: &mut CsarSpec, ctx: &mut Context) -> Result<(), CompileError> {
    for topology in spec.topologies.values_mut() {
        hoist_inline_relationships(topology, ctx);
    }

    for (topo_name, topology) in spec.topologies.iter_mut() {
        for (node_name, node) in &topology.nodes {
            let owner = || format!("node '{}' of topology '{}'", node_name, topo_name);
            match node.node_type.as_deref() {
                None | Some("") => {
                    return Err(CompileError::InvalidNodeType(format!(
                        "type of {} is not specified",
                        owner()
                    )))
                }
                Some(t) if !spec.node_types.contains_key(t) => {
                    return Err(CompileError::InvalidNodeType(format!(
                        "type '{}' of {} is invalid",
                        t,
                        owner()
                    )))
                }
                Some(_) => {}
            }
        }

        for (rel_name, rel) in topology.relationships.iter_mut() {
            let owner = || format!("relationship '{}' of topology '{}'", rel_name, topo_name);
            let candidate = match rel.relationship_type.as_deref().map(str::trim) {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => {
                    return Err(CompileError::InvalidRelationship(format!(
                        "type of {} is not specified",
                        owner()
                    )))
                }
            };
            if rel.namespace.as_deref().is_some_and(|ns| !ns.is_empty()) {
                rel.relationship_type = Some(candidate);
            } else {
                let resolved = resolve_relationship_type(&candidate).ok_or_else(|| {
                    CompileError::InvalidRelationship(format!(
                        "type '{}' of {} is invalid",
                        candidate,
                        owner()
                    ))
                })?;
                rel.relationship_type = Some(resolved.name);
                rel.namespace = Some(resolved.namespace);
            }
        }

        for (rel_name, rel) in &topology.relationships {
            for (end, node) in [("source", &rel.source), ("target", &rel.target)] {
                let valid = node
                    .as_deref()
                    .is_some_and(|n| topology.nodes.contains_key(n));
                if !valid {
                    return Err(CompileError::InvalidRelationship(format!(
                        "{} of relationship '{}' of topology '{}' is not specified or invalid",
                        end, rel_name, topo_name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Move each node's inline relationships into the topology mapping.
fn hoist_inline_relationships(topology: &mut Topology, ctx: &mut Context) {
    for (node_name, node) in topology.nodes.iter_mut() {
        for inline in std::mem::take(&mut node.relationships) {
            let (name, rel) = match inline {
                InlineRelationship::Target(target) => (
                    None,
                    Relationship {
                        relationship_type: Some(DEFAULT_RELATIONSHIP_TYPE.to_string()),
                        namespace: None,
                        source: Some(node_name.clone()),
                        target: Some(target),
                    },
                ),
                InlineRelationship::Detailed(spec) => (
                    spec.name,
                    Relationship {
                        relationship_type: Some(
                            spec.relationship_type
                                .filter(|t| !t.trim().is_empty())
                                .unwrap_or_else(|| DEFAULT_RELATIONSHIP_TYPE.to_string()),
                        ),
                        namespace: spec.namespace,
                        source: Some(node_name.clone()),
                        target: Some(spec.target),
                    },
                ),
            };

            let base = name.filter(|n| !n.is_empty()).unwrap_or_else(|| {
                format!("{}_{}", node_name, rel.target.as_deref().unwrap_or_default())
            });
            let relationships = &topology.relationships;
            let name = ctx
                .names
                .unique(&base, SuffixStyle::Underscore, |n| relationships.contains_key(n));
            topology.relationships.insert(name, rel);
        }
    }
}
