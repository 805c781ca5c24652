//! Rendering of the generated CSAR documents from a normalized spec.
//!
//! Every renderer is a pure function of its input; mapping order of the spec
//! decides element order.

pub mod definitions;
pub mod meta;
pub mod schema;
pub mod xml;

/// TOSCA 1.0 namespace.
pub const TOSCA_NS: &str = "http://docs.oasis-open.org/tosca/ns/2011/12";
/// XML Schema namespace.
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Name of the schema element holding a node type's properties.
pub fn properties_element(node_type: &str) -> String {
    format!("{}Properties", node_type)
}

/// Path of `target` relative to the directory containing `from`.
///
/// Both are `/`-separated paths relative to the output root.
pub fn relative_location(from: &str, target: &str) -> String {
    let depth = from.matches('/').count();
    format!("{}{}", "../".repeat(depth), target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_locations() {
        assert_eq!(
            relative_location("Definitions/definitions.xml", "Schemas/properties.xsd"),
            "../Schemas/properties.xsd"
        );
        assert_eq!(relative_location("definitions.xml", "properties.xsd"), "properties.xsd");
    }
}
