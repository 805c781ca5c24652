//! XSD property schema: one `<NodeType>Properties` element per node type.

use serde_json::Value;

use super::xml::XmlWriter;
use super::{properties_element, XSD_NS};
use crate::model::CsarSpec;
use crate::types::ANY_VALUE_TYPE;

pub fn render(spec: &CsarSpec) -> String {
    let namespace = spec.namespace();
    let mut w = XmlWriter::new();
    w.open(
        "xsd:schema",
        &[
            ("xmlns:xsd", XSD_NS),
            ("xmlns:tns", namespace),
            ("targetNamespace", namespace),
            ("elementFormDefault", "qualified"),
            ("attributeFormDefault", "unqualified"),
        ],
    );

    if let Some(xml) = &spec.xsd_types_xml {
        w.raw(&xml.joined());
    }

    for (nt_name, node_type) in &spec.node_types {
        if node_type.properties_schema.is_empty() {
            continue;
        }
        let element = properties_element(nt_name);
        w.open("xsd:element", &[("name", element.as_str())]);
        w.open("xsd:complexType", &[]);
        w.open("xsd:sequence", &[]);
        for (prop, definition) in &node_type.properties_schema {
            let value_type = definition.value_type.as_deref().unwrap_or(ANY_VALUE_TYPE);
            let default = match &definition.default {
                Some(Value::String(s)) => Some(s.clone()),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
                _ => None,
            };
            let mut attrs = vec![("name", prop.as_str()), ("type", value_type)];
            if let Some(default) = default.as_deref() {
                attrs.push(("default", default));
            }
            attrs.push(("minOccurs", "0"));
            w.empty("xsd:element", &attrs);
        }
        w.close("xsd:sequence");
        w.close("xsd:complexType");
        w.close("xsd:element");
    }

    w.close("xsd:schema");
    w.finish()
}
