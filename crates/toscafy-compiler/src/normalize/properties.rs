//! Pass 2 (value types, parameter bindings) and pass 7 (default propagation).

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::CompileError;
use crate::model::{CsarSpec, OperationBinding, OperationParameters, Parameter};
use crate::types::{custom_value_type, resolve_value_type, ANY_VALUE_TYPE};

/// Resolve every property's value type and derive per-operation
/// input/output parameter lists.
pub(super) fn resolve_value_types(spec: &mut CsarSpec) -> Result<(), CompileError> {
    for (nt_name, node_type) in spec.node_types.iter_mut() {
        let mut parameters: IndexMap<String, OperationParameters> = node_type
            .operations
            .keys()
            .map(|op| (op.clone(), OperationParameters::default()))
            .collect();

        for (prop_name, definition) in node_type.properties_schema.iter_mut() {
            let resolved = match definition.value_type.as_deref().map(str::trim) {
                None | Some("") => ANY_VALUE_TYPE.to_string(),
                Some(candidate) => {
                    resolve_value_type(candidate).unwrap_or_else(|| custom_value_type(candidate))
                }
            };
            definition.value_type = Some(resolved.clone());

            let bindings = [
                (definition.input.as_ref(), true),
                (definition.output.as_ref(), false),
            ];
            for (binding, is_input) in bindings {
                let ops: Vec<String> = match binding {
                    None | Some(OperationBinding::All(false)) => continue,
                    Some(OperationBinding::All(true)) => parameters.keys().cloned().collect(),
                    Some(OperationBinding::Operations(ops)) => ops.clone(),
                };
                for op in ops {
                    let entry = parameters.get_mut(&op).ok_or_else(|| {
                        CompileError::UnknownOperation(format!(
                            "{} parameter '{}' of node type '{}' refers to operation '{}', which is not defined",
                            if is_input { "input" } else { "output" },
                            prop_name,
                            nt_name,
                            op
                        ))
                    })?;
                    let list = if is_input {
                        &mut entry.input
                    } else {
                        &mut entry.output
                    };
                    if !list.iter().any(|p| &p.name == prop_name) {
                        list.push(Parameter {
                            name: prop_name.clone(),
                            value_type: resolved.clone(),
                        });
                    }
                }
            }
        }

        parameters.retain(|_, p| !p.input.is_empty() || !p.output.is_empty());
        node_type.parameters = parameters;
    }
    Ok(())
}

/// Copy schema defaults into nodes lacking a value for the property.
pub(super) fn propagate_defaults(spec: &mut CsarSpec) {
    for topology in spec.topologies.values_mut() {
        for node in topology.nodes.values_mut() {
            let Some(node_type) = node
                .node_type
                .as_ref()
                .and_then(|t| spec.node_types.get(t))
            else {
                continue;
            };
            for (prop_name, definition) in &node_type.properties_schema {
                let Some(default) = definition.default.as_ref().filter(|d| !d.is_null()) else {
                    continue;
                };
                let missing = node.properties.get(prop_name).map_or(true, Value::is_null);
                if missing {
                    node.properties.insert(prop_name.clone(), default.clone());
                }
            }
        }
    }
}
