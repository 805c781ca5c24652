//! Pass 1: every entity must be a structured object of the expected shape.

use serde_json::{Map, Value};

use crate::error::CompileError;
use crate::render::xml::is_ncname;
use crate::wrap::WrapType;

fn malformed(what: String) -> CompileError {
    CompileError::MalformedEntity(what)
}

/// Check the raw document before typed deserialization.
pub(super) fn check(doc: &Value) -> Result<(), CompileError> {
    let root = doc
        .as_object()
        .ok_or_else(|| malformed("specification root is not an object".into()))?;

    for key in ["csar_name", "csar_namespace"] {
        if let Some(value) = root.get(key) {
            if !value.is_string() && !value.is_null() {
                return Err(malformed(format!("'{}' is not a string", key)));
            }
        }
    }

    for (name, node_type) in entities(root, "node_types", "node type", None)? {
        check_node_type(name, node_type)?;
    }
    for (name, artifact) in entities(root, "artifacts", "artifact", None)? {
        check_artifact(&format!("artifact '{}'", name), artifact)?;
    }
    for (name, topology) in entities(root, "topologies", "topology", None)? {
        check_topology(name, topology)?;
    }
    if let Some(shorthand) = root.get("topology").filter(|v| !v.is_null()) {
        let topology = shorthand
            .as_object()
            .ok_or_else(|| malformed("'topology' is not an object".into()))?;
        check_topology("topology", topology)?;
    }
    for key in ["artifact_types_xml", "relationship_types_xml", "xsd_types_xml"] {
        if let Some(value) = root.get(key) {
            let ok = match value {
                Value::Null | Value::String(_) => true,
                Value::Array(items) => items.iter().all(Value::is_string),
                _ => false,
            };
            if !ok {
                return Err(malformed(format!(
                    "'{}' must be a string or a list of strings",
                    key
                )));
            }
        }
    }
    Ok(())
}

/// Entries of an optional mapping whose values must all be objects.
///
/// `owner` names the enclosing entity in error messages, e.g. `topology 't'`.
fn entities<'a>(
    parent: &'a Map<String, Value>,
    key: &str,
    kind: &str,
    owner: Option<&str>,
) -> Result<Vec<(&'a str, &'a Map<String, Value>)>, CompileError> {
    let of_owner = owner.map(|o| format!(" of {}", o)).unwrap_or_default();
    let map = match parent.get(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(malformed(format!("'{}'{} is not a mapping", key, of_owner)))
        }
    };
    map.iter()
        .map(|(name, value)| {
            if name.trim().is_empty() {
                return Err(malformed(format!("{} with an empty name{}", kind, of_owner)));
            }
            value.as_object().map(|obj| (name.as_str(), obj)).ok_or_else(|| {
                malformed(format!("{} '{}'{} is not an object", kind, name, of_owner))
            })
        })
        .collect()
}

/// Property keys become element names in the rendered documents, at every
/// nesting level.
fn check_element_names(owner: &str, value: &Value) -> Result<(), CompileError> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if !is_ncname(key) {
                    return Err(malformed(format!(
                        "property name '{}' of {} is not a valid XML element name",
                        key, owner
                    )));
                }
                check_element_names(owner, child)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| check_element_names(owner, item)),
        _ => Ok(()),
    }
}

fn check_node_type(name: &str, node_type: &Map<String, Value>) -> Result<(), CompileError> {
    let owner = format!("node type '{}'", name);

    for (prop, definition) in entities(node_type, "properties_schema", "property", Some(&owner))? {
        if !is_ncname(prop) {
            return Err(malformed(format!(
                "property name '{}' of {} is not a valid XML element name",
                prop, owner
            )));
        }
        if let Some(t) = definition.get("type") {
            if !t.is_string() && !t.is_null() {
                return Err(malformed(format!(
                    "type of property '{}' of {} is not a string",
                    prop, owner
                )));
            }
        }
        for binding in ["input", "output"] {
            let ok = match definition.get(binding) {
                None | Some(Value::Null) | Some(Value::Bool(_)) => true,
                Some(Value::Array(ops)) => ops.iter().all(Value::is_string),
                Some(_) => false,
            };
            if !ok {
                return Err(malformed(format!(
                    "'{}' of property '{}' of {} must be true, false or a list of operation names",
                    binding, prop, owner
                )));
            }
        }
    }

    match node_type.get("operations") {
        None | Some(Value::Null) => {}
        Some(Value::Object(ops)) => {
            for (op, slots) in ops {
                check_slots(&format!("operation '{}' of {}", op, owner), Some(slots))?;
            }
        }
        Some(_) => return Err(malformed(format!("operations of {} are not a mapping", owner))),
    }

    check_slots(
        &format!("deployment artifacts of {}", owner),
        node_type.get("deployment_artifacts"),
    )
}

fn check_slots(owner: &str, slots: Option<&Value>) -> Result<(), CompileError> {
    let items = match slots {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(malformed(format!("{} are not a list", owner))),
    };
    for (i, slot) in items.iter().enumerate() {
        match slot {
            Value::String(s) if !s.is_empty() => {}
            Value::Object(artifact) => {
                check_artifact(&format!("inline artifact #{} of {}", i, owner), artifact)?
            }
            _ => {
                return Err(malformed(format!(
                    "entry #{} of {} is neither an artifact name nor an artifact object",
                    i, owner
                )))
            }
        }
    }
    Ok(())
}

fn check_artifact(owner: &str, artifact: &Map<String, Value>) -> Result<(), CompileError> {
    for key in ["type", "namespace", "description"] {
        if let Some(value) = artifact.get(key) {
            if !value.is_string() && !value.is_null() {
                return Err(malformed(format!("'{}' of {} is not a string", key, owner)));
            }
        }
    }
    if let Some(props) = artifact.get("properties") {
        if !props.is_object() && !props.is_null() {
            return Err(malformed(format!("properties of {} are not an object", owner)));
        }
        check_element_names(owner, props)?;
    }
    if let Some(refs) = artifact.get("references") {
        if !refs.is_array() && !refs.is_null() {
            return Err(malformed(format!("references of {} are not a list", owner)));
        }
    }
    match artifact.get("wrap") {
        None | Some(Value::Null) => {}
        Some(Value::String(wrap)) => {
            WrapType::parse(wrap)?;
        }
        Some(_) => return Err(malformed(format!("'wrap' of {} is not a string", owner))),
    }
    Ok(())
}

fn check_topology(name: &str, topology: &Map<String, Value>) -> Result<(), CompileError> {
    let owner = format!("topology '{}'", name);

    for (node_name, node) in entities(topology, "nodes", "node", Some(&owner))? {
        let node_owner = format!("node '{}' of {}", node_name, owner);
        if let Some(t) = node.get("type") {
            if !t.is_string() && !t.is_null() {
                return Err(malformed(format!("type of {} is not a string", node_owner)));
            }
        }
        if let Some(props) = node.get("properties") {
            if !props.is_object() && !props.is_null() {
                return Err(malformed(format!("properties of {} are not an object", node_owner)));
            }
            check_element_names(&node_owner, props)?;
        }
        check_slots(
            &format!("deployment artifacts of {}", node_owner),
            node.get("deployment_artifacts"),
        )?;

        match node.get("relationships") {
            None | Some(Value::Null) => {}
            Some(Value::Array(rels)) => {
                for (i, rel) in rels.iter().enumerate() {
                    let ok = match rel {
                        Value::String(target) => !target.is_empty(),
                        Value::Object(r) => r.get("target").is_some_and(Value::is_string),
                        _ => false,
                    };
                    if !ok {
                        return Err(malformed(format!(
                            "relationship #{} of {} needs a target node",
                            i, node_owner
                        )));
                    }
                }
            }
            Some(_) => {
                return Err(malformed(format!(
                    "relationships of {} are not a list",
                    node_owner
                )))
            }
        }
    }

    for (rel_name, rel) in entities(topology, "relationships", "relationship", Some(&owner))? {
        for key in ["type", "namespace", "source", "target"] {
            if let Some(value) = rel.get(key) {
                if !value.is_string() && !value.is_null() {
                    return Err(malformed(format!(
                        "'{}' of relationship '{}' of {} is not a string",
                        key, rel_name, owner
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn err_of(doc: Value) -> String {
        check(&doc).unwrap_err().to_string()
    }

    #[test]
    fn accepts_well_formed_documents() {
        check(&json!({
            "node_types": { "web": {
                "properties_schema": { "port": { "type": "int", "input": true } },
                "operations": { "install": ["a", { "type": "script" }] }
            }},
            "artifacts": { "a": { "type": "script", "references": ["x.sh"], "wrap": "rest-api" } },
            "topologies": { "t": { "nodes": { "n": { "type": "web", "relationships": ["m"] } } } },
            "xsd_types_xml": ["<a/>", "<b/>"]
        }))
        .unwrap();
    }

    #[test]
    fn names_the_offending_entity() {
        assert!(err_of(json!({ "node_types": { "web": 5 } })).contains("node type 'web'"));
        assert!(err_of(json!({ "artifacts": { "a": null } })).contains("artifact 'a'"));
        assert!(err_of(json!({ "topologies": { "t": { "nodes": { "n": [] } } } }))
            .contains("node 'n' of topology 't'"));
        assert!(err_of(json!({ "topologies": { "t": { "relationships": { "r": "x" } } } }))
            .contains("relationship 'r' of topology 't'"));
        assert!(err_of(json!({ "node_types": { "web": { "properties_schema": { "port": 8080 } } } }))
            .contains("property 'port' of node type 'web'"));
        assert!(err_of(json!({ "topologies": { "t": { "nodes": [] } } }))
            .contains("'nodes' of topology 't' is not a mapping"));
        assert!(err_of(json!([])).starts_with("E1010"));
    }

    #[test]
    fn rejects_bad_slots_and_bindings() {
        let err = err_of(json!({ "node_types": { "web": { "operations": { "install": [1] } } } }));
        assert!(err.contains("operation 'install' of node type 'web'"));

        let err = err_of(json!({ "node_types": { "web": {
            "properties_schema": { "p": { "input": "install" } }
        }}}));
        assert!(err.contains("'input' of property 'p'"));
    }

    #[test]
    fn property_names_must_be_element_names() {
        let err = err_of(json!({ "node_types": { "web": {
            "properties_schema": { "my port": { "type": "int" } }
        }}}));
        assert!(err.starts_with("E1010"));
        assert!(err.contains("'my port' of node type 'web'"));

        let err = err_of(json!({ "topologies": { "t": { "nodes": { "n": {
            "type": "web", "properties": { "1x": "v" }
        }}}}}));
        assert!(err.contains("'1x' of node 'n' of topology 't'"));

        let err = err_of(json!({ "artifacts": { "a": {
            "properties": { "ChefArtifactProperties": { "run list": [] } }
        }}}));
        assert!(err.contains("'run list' of artifact 'a'"));

        check(&json!({ "artifacts": { "a": {
            "properties": { "DockerComposeArtifactProperties": { "dockerComposeYml": "dc.yml" } }
        }}}))
        .unwrap();
    }

    #[test]
    fn unknown_wrap_type_is_an_enum_error() {
        let err = check(&json!({ "artifacts": { "a": { "wrap": "grpc-api" } } })).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEnumValue { .. }));
    }
}
