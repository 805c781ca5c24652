//! TOSCA 1.0 definitions document.

use indexmap::IndexMap;
use serde_json::Value;

use super::xml::XmlWriter;
use super::{properties_element, TOSCA_NS, XSD_NS};
use crate::model::{Artifact, ArtifactSlot, CsarSpec, NodeType, OperationParameters};
use crate::types::property_wrapper;

/// Namespace prefixes of referenced types, assigned in order of first use.
struct Prefixes {
    target: String,
    assigned: IndexMap<String, String>,
}

impl Prefixes {
    fn collect(spec: &CsarSpec) -> Self {
        let mut prefixes = Prefixes {
            target: spec.namespace().to_string(),
            assigned: IndexMap::new(),
        };
        let namespaces = spec
            .artifacts
            .values()
            .map(Artifact::type_namespace)
            .chain(
                spec.topologies
                    .values()
                    .flat_map(|t| t.relationships.values())
                    .map(|r| r.type_namespace()),
            );
        for ns in namespaces {
            if ns.is_empty() || ns == prefixes.target || prefixes.assigned.contains_key(ns) {
                continue;
            }
            let prefix = format!("ns{}", prefixes.assigned.len());
            prefixes.assigned.insert(ns.to_string(), prefix);
        }
        prefixes
    }

    fn qname(&self, name: &str, namespace: &str) -> String {
        match self.assigned.get(namespace) {
            Some(prefix) => format!("{}:{}", prefix, name),
            None => format!("tns:{}", name),
        }
    }
}

/// Render the definitions document. `schema_location` is the property
/// schema's path relative to the definitions document.
pub fn render(spec: &CsarSpec, schema_location: &str) -> String {
    let prefixes = Prefixes::collect(spec);
    let name = spec.name();
    let id = format!("{}-definitions", name);

    let mut root_attrs: Vec<(String, String)> = vec![
        ("xmlns".into(), TOSCA_NS.into()),
        ("xmlns:xsd".into(), XSD_NS.into()),
        ("xmlns:tns".into(), prefixes.target.clone()),
    ];
    for (ns, prefix) in &prefixes.assigned {
        root_attrs.push((format!("xmlns:{}", prefix), ns.clone()));
    }
    root_attrs.push(("id".to_string(), id));
    root_attrs.push(("name".to_string(), name.to_string()));
    root_attrs.push(("targetNamespace".to_string(), prefixes.target.clone()));
    let root_attrs: Vec<(&str, &str)> = root_attrs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let mut w = XmlWriter::new();
    w.open("Definitions", &root_attrs);
    w.empty(
        "Import",
        &[
            ("namespace", prefixes.target.as_str()),
            ("location", schema_location),
            ("importType", XSD_NS),
        ],
    );

    if let Some(xml) = &spec.artifact_types_xml {
        w.raw(&xml.joined());
    }
    if let Some(xml) = &spec.relationship_types_xml {
        w.raw(&xml.joined());
    }

    for (nt_name, node_type) in &spec.node_types {
        node_type_element(&mut w, nt_name, node_type);
        node_type_implementation(&mut w, spec, &prefixes, nt_name, node_type);
    }

    for (artifact_name, artifact) in &spec.artifacts {
        artifact_template(&mut w, &prefixes, artifact_name, artifact);
    }

    for (topo_name, topology) in &spec.topologies {
        w.open(
            "ServiceTemplate",
            &[("id", topo_name.as_str()), ("name", topo_name.as_str())],
        );
        w.open("TopologyTemplate", &[]);
        for (node_name, node) in &topology.nodes {
            let node_type = node.node_type.as_deref().unwrap_or_default();
            let type_ref = format!("tns:{}", node_type);
            w.open(
                "NodeTemplate",
                &[
                    ("id", node_name.as_str()),
                    ("name", node_name.as_str()),
                    ("type", type_ref.as_str()),
                ],
            );
            if !node.properties.is_empty() {
                // Property elements are qualified by the CSAR namespace.
                let element = properties_element(node_type);
                w.open("Properties", &[]);
                w.open(&element, &[("xmlns", prefixes.target.as_str())]);
                for (prop, value) in &node.properties {
                    w.json(prop, value);
                }
                w.close(&element);
                w.close("Properties");
            }
            if let Some(slots) = &node.deployment_artifacts {
                deployment_artifacts(&mut w, spec, &prefixes, slots);
            }
            w.close("NodeTemplate");
        }
        for (rel_name, rel) in &topology.relationships {
            let type_ref = prefixes.qname(rel.type_name(), rel.type_namespace());
            w.open(
                "RelationshipTemplate",
                &[
                    ("id", rel_name.as_str()),
                    ("name", rel_name.as_str()),
                    ("type", type_ref.as_str()),
                ],
            );
            w.empty("SourceElement", &[("ref", rel.source.as_deref().unwrap_or_default())]);
            w.empty("TargetElement", &[("ref", rel.target.as_deref().unwrap_or_default())]);
            w.close("RelationshipTemplate");
        }
        w.close("TopologyTemplate");
        w.close("ServiceTemplate");
    }

    w.close("Definitions");
    w.finish()
}

fn node_type_element(w: &mut XmlWriter, nt_name: &str, node_type: &NodeType) {
    w.open("NodeType", &[("name", nt_name)]);
    if !node_type.properties_schema.is_empty() {
        let element = format!("tns:{}", properties_element(nt_name));
        w.empty("PropertiesDefinition", &[("element", element.as_str())]);
    }
    if !node_type.interfaces.is_empty() {
        w.open("Interfaces", &[]);
        for (iface_name, interface) in &node_type.interfaces {
            w.open("Interface", &[("name", iface_name.as_str())]);
            for (op_name, operation) in &interface.operations {
                operation_element(w, op_name, &operation.parameters);
            }
            w.close("Interface");
        }
        w.close("Interfaces");
    }
    w.close("NodeType");
}

fn operation_element(w: &mut XmlWriter, op_name: &str, parameters: &OperationParameters) {
    if parameters.input.is_empty() && parameters.output.is_empty() {
        w.empty("Operation", &[("name", op_name)]);
        return;
    }
    w.open("Operation", &[("name", op_name)]);
    for (list, outer, inner) in [
        (&parameters.input, "InputParameters", "InputParameter"),
        (&parameters.output, "OutputParameters", "OutputParameter"),
    ] {
        if list.is_empty() {
            continue;
        }
        w.open(outer, &[]);
        for param in list {
            w.empty(
                inner,
                &[
                    ("name", param.name.as_str()),
                    ("type", param.value_type.as_str()),
                    ("required", "no"),
                ],
            );
        }
        w.close(outer);
    }
    w.close("Operation");
}

fn node_type_implementation(
    w: &mut XmlWriter,
    spec: &CsarSpec,
    prefixes: &Prefixes,
    nt_name: &str,
    node_type: &NodeType,
) {
    let has_impl = node_type.interfaces.values().any(|i| {
        !i.implementation_artifacts.is_empty()
            || i.operations.values().any(|o| !o.implementation_artifacts.is_empty())
    });
    let deployment = node_type.deployment_artifacts.as_deref().unwrap_or_default();
    if !has_impl && deployment.is_empty() {
        return;
    }

    let impl_name = format!("{}Implementation", nt_name);
    let type_ref = format!("tns:{}", nt_name);
    w.open(
        "NodeTypeImplementation",
        &[("name", impl_name.as_str()), ("nodeType", type_ref.as_str())],
    );
    if has_impl {
        w.open("ImplementationArtifacts", &[]);
        for (iface_name, interface) in &node_type.interfaces {
            for artifact_name in &interface.implementation_artifacts {
                implementation_artifact(w, spec, prefixes, iface_name, None, artifact_name);
            }
            for (op_name, operation) in &interface.operations {
                for artifact_name in &operation.implementation_artifacts {
                    implementation_artifact(
                        w,
                        spec,
                        prefixes,
                        iface_name,
                        Some(op_name),
                        artifact_name,
                    );
                }
            }
        }
        w.close("ImplementationArtifacts");
    }
    if !deployment.is_empty() {
        deployment_artifacts(w, spec, prefixes, deployment);
    }
    w.close("NodeTypeImplementation");
}

fn artifact_type_ref(spec: &CsarSpec, prefixes: &Prefixes, artifact_name: &str) -> String {
    spec.artifacts
        .get(artifact_name)
        .map(|a| prefixes.qname(a.type_name(), a.type_namespace()))
        .unwrap_or_default()
}

fn implementation_artifact(
    w: &mut XmlWriter,
    spec: &CsarSpec,
    prefixes: &Prefixes,
    iface_name: &str,
    op_name: Option<&String>,
    artifact_name: &str,
) {
    let type_ref = artifact_type_ref(spec, prefixes, artifact_name);
    let artifact_ref = format!("tns:{}", artifact_name);
    let mut attrs = vec![("interfaceName", iface_name)];
    if let Some(op) = op_name {
        attrs.push(("operationName", op.as_str()));
    }
    attrs.push(("artifactType", type_ref.as_str()));
    attrs.push(("artifactRef", artifact_ref.as_str()));
    w.empty("ImplementationArtifact", &attrs);
}

fn deployment_artifacts(
    w: &mut XmlWriter,
    spec: &CsarSpec,
    prefixes: &Prefixes,
    slots: &[ArtifactSlot],
) {
    w.open("DeploymentArtifacts", &[]);
    for name in slots.iter().filter_map(ArtifactSlot::name) {
        let type_ref = artifact_type_ref(spec, prefixes, name);
        let artifact_ref = format!("tns:{}", name);
        w.empty(
            "DeploymentArtifact",
            &[
                ("name", name),
                ("artifactType", type_ref.as_str()),
                ("artifactRef", artifact_ref.as_str()),
            ],
        );
    }
    w.close("DeploymentArtifacts");
}

fn artifact_template(w: &mut XmlWriter, prefixes: &Prefixes, name: &str, artifact: &Artifact) {
    let type_ref = prefixes.qname(artifact.type_name(), artifact.type_namespace());
    w.open("ArtifactTemplate", &[("id", name), ("type", type_ref.as_str())]);

    if let Some(Value::Object(props)) = &artifact.properties {
        if !props.is_empty() {
            let wrapper = property_wrapper(artifact.type_name());
            w.open("Properties", &[]);
            for (key, value) in props {
                if wrapper.as_deref() == Some(key.as_str()) {
                    w.json_with(key, &[("xmlns", artifact.type_namespace())], value);
                } else {
                    w.json(key, value);
                }
            }
            w.close("Properties");
        }
    }

    let references: Vec<&str> = artifact.reference_paths().collect();
    if !references.is_empty() {
        w.open("ArtifactReferences", &[]);
        for reference in references {
            w.empty("ArtifactReference", &[("reference", reference)]);
        }
        w.close("ArtifactReferences");
    }
    w.close("ArtifactTemplate");
}
