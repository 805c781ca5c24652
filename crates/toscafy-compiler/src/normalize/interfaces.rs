//! Pass 9: group operations into interfaces and hoist shared artifacts.

use indexmap::IndexMap;

use crate::model::{CsarSpec, Interface, InterfaceOperation, NodeType};

pub(crate) const LIFECYCLE_INTERFACE: &str = "http://www.example.com/interfaces/lifecycle";
pub(crate) const CLOUD_PROVIDER_INTERFACE: &str = "CloudProviderInterface";
pub(crate) const OPERATING_SYSTEM_INTERFACE: &str = "OperatingSystemInterface";
pub(crate) const CUSTOM_INTERFACE: &str = "CustomInterface";

/// Operation name to interface convention.
const CONVENTIONS: &[(&str, &[&str])] = &[
    (
        LIFECYCLE_INTERFACE,
        &["install", "configure", "start", "stop", "uninstall"],
    ),
    (CLOUD_PROVIDER_INTERFACE, &["createVM", "terminateVM"]),
    (
        OPERATING_SYSTEM_INTERFACE,
        &["installPackage", "transferFile", "runScript", "waitForAvailability"],
    ),
];

fn interface_of(operation: &str) -> &'static str {
    CONVENTIONS
        .iter()
        .find(|(_, ops)| ops.contains(&operation))
        .map(|(iface, _)| *iface)
        .unwrap_or(CUSTOM_INTERFACE)
}

pub(super) fn derive(spec: &mut CsarSpec) {
    for node_type in spec.node_types.values_mut() {
        node_type.interfaces = interfaces_of(node_type);
    }
}

fn interfaces_of(node_type: &NodeType) -> IndexMap<String, Interface> {
    let mut interfaces: IndexMap<String, Interface> = IndexMap::new();

    for (op_name, slots) in &node_type.operations {
        let mut artifacts: Vec<String> = Vec::new();
        for name in slots.iter().filter_map(|s| s.name()) {
            if !artifacts.iter().any(|a| a == name) {
                artifacts.push(name.to_string());
            }
        }
        let operation = InterfaceOperation {
            implementation_artifacts: artifacts,
            parameters: node_type.parameters.get(op_name).cloned().unwrap_or_default(),
        };
        interfaces
            .entry(interface_of(op_name).to_string())
            .or_default()
            .operations
            .insert(op_name.clone(), operation);
    }

    for interface in interfaces.values_mut() {
        hoist_shared_artifacts(interface);
    }
    interfaces
}

/// Move artifacts used by every operation of the interface up to the interface.
fn hoist_shared_artifacts(interface: &mut Interface) {
    if interface.operations.len() < 2 {
        return;
    }
    let Some(first) = interface.operations.values().next() else {
        return;
    };
    let shared: Vec<String> = first
        .implementation_artifacts
        .iter()
        .filter(|name| {
            interface
                .operations
                .values()
                .all(|op| op.implementation_artifacts.contains(name))
        })
        .cloned()
        .collect();
    if shared.is_empty() {
        return;
    }

    for operation in interface.operations.values_mut() {
        operation
            .implementation_artifacts
            .retain(|name| !shared.contains(name));
    }
    interface.implementation_artifacts = shared;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn derived(doc: serde_json::Value) -> CsarSpec {
        let mut spec: CsarSpec = serde_json::from_value(doc).unwrap();
        derive(&mut spec);
        spec
    }

    #[test]
    fn assigns_operations_by_convention() {
        let spec = derived(json!({ "node_types": { "vm": { "operations": {
            "install": ["a"], "createVM": ["b"], "runScript": ["c"], "backup": ["d"]
        }}}}));
        let interfaces = &spec.node_types["vm"].interfaces;
        let names: Vec<_> = interfaces.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                LIFECYCLE_INTERFACE,
                CLOUD_PROVIDER_INTERFACE,
                OPERATING_SYSTEM_INTERFACE,
                CUSTOM_INTERFACE
            ]
        );
        assert_eq!(
            interfaces[CUSTOM_INTERFACE].operations["backup"].implementation_artifacts,
            vec!["d"]
        );
    }

    #[test]
    fn hoists_artifacts_shared_by_all_operations() {
        let spec = derived(json!({ "node_types": { "web": { "operations": {
            "install": ["common", "inst", "common"],
            "start": ["start", "common"],
            "stop": ["common"]
        }}}}));
        let lifecycle = &spec.node_types["web"].interfaces[LIFECYCLE_INTERFACE];
        assert_eq!(lifecycle.implementation_artifacts, vec!["common"]);
        assert_eq!(lifecycle.operations["install"].implementation_artifacts, vec!["inst"]);
        assert_eq!(lifecycle.operations["start"].implementation_artifacts, vec!["start"]);
        assert!(lifecycle.operations["stop"].implementation_artifacts.is_empty());
    }

    #[test]
    fn single_operation_interfaces_keep_their_artifacts() {
        let spec = derived(json!({ "node_types": { "web": { "operations": { "install": ["a"] } } } }));
        let lifecycle = &spec.node_types["web"].interfaces[LIFECYCLE_INTERFACE];
        assert!(lifecycle.implementation_artifacts.is_empty());
        assert_eq!(lifecycle.operations["install"].implementation_artifacts, vec!["a"]);
    }

    #[test]
    fn operations_carry_their_parameters() {
        let spec = derived(json!({ "node_types": { "web": {
            "operations": { "start": [] },
            "parameters": { "start": { "input": [{ "name": "port", "type": "xsd:int" }] } }
        }}}));
        let op = &spec.node_types["web"].interfaces[LIFECYCLE_INTERFACE].operations["start"];
        assert_eq!(op.parameters.input[0].name, "port");
    }
}
