//! Passes 3-5: artifact slot promotion, type resolution, reference validity.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::context::{normalize_relative, Context};
use crate::error::CompileError;
use crate::model::{Artifact, ArtifactSlot, CsarSpec};
use crate::names::{NameGenerator, SuffixStyle};
use crate::types::{property_wrapper, reference_properties, resolve_artifact_type};

/// Pass 3: promote inline artifacts to named entries, then require every
/// slot to name an existing artifact.
pub(super) fn promote_inline(spec: &mut CsarSpec, ctx: &mut Context) -> Result<(), CompileError> {
    let artifacts = &mut spec.artifacts;

    for (nt_name, node_type) in spec.node_types.iter_mut() {
        for (op_name, slots) in node_type.operations.iter_mut() {
            promote_slots(slots, &format!("{}_{}", nt_name, op_name), artifacts, &mut ctx.names);
        }
        if let Some(slots) = node_type.deployment_artifacts.as_mut() {
            promote_slots(slots, &format!("{}_deployment", nt_name), artifacts, &mut ctx.names);
        }
    }
    for (topo_name, topology) in spec.topologies.iter_mut() {
        for (node_name, node) in topology.nodes.iter_mut() {
            if let Some(slots) = node.deployment_artifacts.as_mut() {
                let base = format!("{}_{}_deployment", topo_name, node_name);
                promote_slots(slots, &base, artifacts, &mut ctx.names);
            }
        }
    }

    let dangling = |kind: &str, name: &str, owner: String| {
        CompileError::DanglingArtifact(format!(
            "{} artifact '{}' of {} is not specified",
            kind, name, owner
        ))
    };
    for (nt_name, node_type) in &spec.node_types {
        for (op_name, slots) in &node_type.operations {
            for name in slots.iter().filter_map(ArtifactSlot::name) {
                if !spec.artifacts.contains_key(name) {
                    return Err(dangling(
                        "implementation",
                        name,
                        format!("operation '{}' of node type '{}'", op_name, nt_name),
                    ));
                }
            }
        }
        for name in node_type.deployment_artifacts.iter().flatten().filter_map(ArtifactSlot::name) {
            if !spec.artifacts.contains_key(name) {
                return Err(dangling("deployment", name, format!("node type '{}'", nt_name)));
            }
        }
    }
    for (topo_name, topology) in &spec.topologies {
        for (node_name, node) in &topology.nodes {
            for name in node.deployment_artifacts.iter().flatten().filter_map(ArtifactSlot::name) {
                if !spec.artifacts.contains_key(name) {
                    return Err(dangling(
                        "deployment",
                        name,
                        format!("node '{}' of topology '{}'", node_name, topo_name),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn promote_slots(
    slots: &mut [ArtifactSlot],
    base: &str,
    artifacts: &mut IndexMap<String, Artifact>,
    names: &mut NameGenerator,
) {
    for slot in slots.iter_mut() {
        if let ArtifactSlot::Inline(artifact) = slot {
            let name = names.unique(base, SuffixStyle::Underscore, |n| artifacts.contains_key(n));
            tracing::debug!(artifact = %name, "Promoted inline artifact");
            artifacts.insert(name.clone(), (**artifact).clone());
            *slot = ArtifactSlot::Name(name);
        }
    }
}

/// Pass 4: resolve artifact types and nest properties under the type's
/// wrapper element where one is required.
pub(super) fn resolve_types(spec: &mut CsarSpec) -> Result<(), CompileError> {
    for (name, artifact) in spec.artifacts.iter_mut() {
        let candidate = match artifact.artifact_type.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                return Err(CompileError::InvalidArtifactType(format!(
                    "type of artifact '{}' is not specified",
                    name
                )))
            }
        };

        if artifact.namespace.as_deref().is_some_and(|ns| !ns.is_empty()) {
            artifact.artifact_type = Some(candidate);
        } else {
            let resolved = resolve_artifact_type(&candidate).ok_or_else(|| {
                CompileError::InvalidArtifactType(format!(
                    "type '{}' of artifact '{}' is invalid",
                    candidate, name
                ))
            })?;
            artifact.artifact_type = Some(resolved.name);
            artifact.namespace = Some(resolved.namespace);
        }

        wrap_properties(artifact);
    }
    Ok(())
}

/// Nest properties one level under `<Type>Properties` unless already nested.
pub(crate) fn wrap_properties(artifact: &mut Artifact) {
    let Some(wrapper) = property_wrapper(artifact.type_name()) else {
        return;
    };
    let Some(Value::Object(props)) = artifact.properties.take() else {
        return;
    };
    let already_wrapped = props.len() == 1 && props.get(&wrapper).is_some_and(Value::is_object);
    artifact.properties = Some(if already_wrapped {
        Value::Object(props)
    } else {
        let mut outer = Map::new();
        outer.insert(wrapper, Value::Object(props));
        Value::Object(outer)
    });
}

/// Pass 5: every reference must name a path of the final output tree.
pub(super) fn check_references(spec: &mut CsarSpec, ctx: &Context) -> Result<(), CompileError> {
    let missing = |path: &str, name: &str| {
        CompileError::MissingFile(format!(
            "file '{}' of artifact '{}' does not exist or is not part of working directory '{}'",
            path,
            name,
            ctx.working_dir.display()
        ))
    };

    for (name, artifact) in spec.artifacts.iter_mut() {
        for (i, reference) in artifact.references.iter_mut().enumerate() {
            let Value::String(path) = reference else {
                return Err(CompileError::MalformedEntity(format!(
                    "reference #{} of artifact '{}' is not a path string",
                    i, name
                )));
            };
            let normalized = normalize_relative(path).ok_or_else(|| missing(path, name))?;
            if !ctx.contains_path(&normalized) {
                return Err(missing(path, name));
            }
            *path = normalized;
        }

        let type_name = artifact.type_name().to_string();
        if let Some(props) = artifact.plain_properties() {
            for prop in reference_properties(&type_name) {
                if let Some(path) = props.get(*prop).and_then(Value::as_str) {
                    let found = normalize_relative(path).is_some_and(|p| ctx.contains_path(&p));
                    if !found {
                        return Err(missing(path, name));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::tests::context_with_files;
    use crate::types::TOSCAFY_ARTIFACT_TYPES_NS;
    use serde_json::json;

    fn spec(doc: Value) -> CsarSpec {
        serde_json::from_value(doc).unwrap()
    }

    #[test]
    fn promotes_inline_artifacts_with_owner_names() {
        let (_w, _o, mut ctx) = context_with_files(&[]);
        let mut s = spec(json!({
            "node_types": { "web": {
                "operations": { "install": [{ "type": "script" }, { "type": "script" }] },
                "deployment_artifacts": [{ "type": "war" }]
            }},
            "topologies": { "t": { "nodes": { "n": {
                "type": "web", "deployment_artifacts": [{ "type": "zip" }]
            }}}}
        }));
        promote_inline(&mut s, &mut ctx).unwrap();

        let slots = &s.node_types["web"].operations["install"];
        assert_eq!(slots[0].name(), Some("web_install"));
        assert_eq!(slots[1].name(), Some("web_install_1"));
        assert!(s.artifacts.contains_key("web_deployment"));
        assert!(s.artifacts.contains_key("t_n_deployment"));
    }

    #[test]
    fn colliding_generated_names_keep_owners_apart() {
        // "a_b" + "c" and "a" + "b_c" both produce "a_b_c".
        let (_w, _o, mut ctx) = context_with_files(&[]);
        let mut s = spec(json!({
            "node_types": {
                "a_b": { "operations": { "c": [{ "type": "script", "description": "first" }] } },
                "a": { "operations": { "b_c": [{ "type": "chef", "description": "second" }] } }
            }
        }));
        promote_inline(&mut s, &mut ctx).unwrap();

        let first = s.node_types["a_b"].operations["c"][0].name().unwrap().to_string();
        let second = s.node_types["a"].operations["b_c"][0].name().unwrap().to_string();
        assert_ne!(first, second);
        assert_eq!(s.artifacts[&first].description.as_deref(), Some("first"));
        assert_eq!(s.artifacts[&second].description.as_deref(), Some("second"));
    }

    #[test]
    fn dangling_references_name_their_owner() {
        let (_w, _o, mut ctx) = context_with_files(&[]);
        let mut s = spec(json!({ "node_types": { "web": { "operations": { "start": ["nope"] } } } }));
        let err = promote_inline(&mut s, &mut ctx).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("E1012"));
        assert!(msg.contains("'nope'") && msg.contains("node type 'web'"));
    }

    #[test]
    fn resolves_types_and_keeps_explicit_namespaces() {
        let mut s = spec(json!({ "artifacts": {
            "a": { "type": "docker-compose", "properties": { "dockerComposeYml": "dc.yml" } },
            "b": { "type": "MyType", "namespace": "http://example.org/custom" },
            "c": { "type": "chef", "properties": { "ChefArtifactProperties": { "x": 1 } } }
        }}));
        resolve_types(&mut s).unwrap();

        let a = &s.artifacts["a"];
        assert_eq!(a.type_name(), "DockerComposeArtifact");
        assert_eq!(a.type_namespace(), TOSCAFY_ARTIFACT_TYPES_NS);
        assert_eq!(
            a.properties,
            Some(json!({ "DockerComposeArtifactProperties": { "dockerComposeYml": "dc.yml" } }))
        );

        let b = &s.artifacts["b"];
        assert_eq!(b.type_name(), "MyType");
        assert_eq!(b.type_namespace(), "http://example.org/custom");

        assert_eq!(
            s.artifacts["c"].properties,
            Some(json!({ "ChefArtifactProperties": { "x": 1 } }))
        );
    }

    #[test]
    fn missing_or_unknown_types_fail() {
        let mut s = spec(json!({ "artifacts": { "a": {} } }));
        assert!(matches!(
            resolve_types(&mut s).unwrap_err(),
            CompileError::InvalidArtifactType(_)
        ));

        let mut s = spec(json!({ "artifacts": { "a": { "type": "banana" } } }));
        let err = resolve_types(&mut s).unwrap_err();
        assert!(err.to_string().contains("'banana'"));
    }

    #[test]
    fn references_must_exist_in_tree() {
        let (_w, _o, ctx) = context_with_files(&["scripts/install.sh", "dc.yml"]);
        let mut s = spec(json!({ "artifacts": {
            "a": { "type": "ScriptArtifact", "references": ["./scripts/install.sh", "scripts"] }
        }}));
        check_references(&mut s, &ctx).unwrap();
        assert_eq!(
            s.artifacts["a"].references,
            vec![json!("scripts/install.sh"), json!("scripts")]
        );

        let mut s = spec(json!({ "artifacts": { "a": { "references": ["missing.sh"] } } }));
        assert!(matches!(
            check_references(&mut s, &ctx).unwrap_err(),
            CompileError::MissingFile(_)
        ));

        let mut s = spec(json!({ "artifacts": { "a": { "references": [{ "x": 1 }] } } }));
        assert!(matches!(
            check_references(&mut s, &ctx).unwrap_err(),
            CompileError::MalformedEntity(_)
        ));
    }

    #[test]
    fn reference_properties_are_validated() {
        let (_w, _o, ctx) = context_with_files(&["dc.yml"]);
        let mut s = spec(json!({ "artifacts": { "a": {
            "type": "DockerComposeArtifact",
            "properties": { "DockerComposeArtifactProperties": { "dockerComposeYml": "dc.yml", "context": "ctx.tar.gz" } }
        }}}));
        let err = check_references(&mut s, &ctx).unwrap_err();
        assert!(err.to_string().contains("ctx.tar.gz"));
    }
}
