//! The CSAR specification document.
//!
//! All mappings keep declaration order; every compiler pass and every rendered
//! document iterates them in that order.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types;

/// Treat an explicit `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Operations map whose artifact lists may be `null`.
fn operations<'de, D>(deserializer: D) -> Result<IndexMap<String, Vec<ArtifactSlot>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, Option<Vec<ArtifactSlot>>>> =
        Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(op, slots)| (op, slots.unwrap_or_default()))
        .collect())
}

/// Root specification document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CsarSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csar_namespace: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub node_types: IndexMap<String, NodeType>,
    #[serde(default, deserialize_with = "nullable")]
    pub artifacts: IndexMap<String, Artifact>,
    #[serde(default, deserialize_with = "nullable")]
    pub topologies: IndexMap<String, Topology>,
    /// Single-topology shorthand, hoisted into `topologies`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
    /// Raw XML spliced into the definitions document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_types_xml: Option<XmlSnippets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_types_xml: Option<XmlSnippets>,
    /// Raw XML spliced into the property schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xsd_types_xml: Option<XmlSnippets>,
}

impl CsarSpec {
    /// CSAR name; set by normalization.
    pub fn name(&self) -> &str {
        self.csar_name.as_deref().unwrap_or_default()
    }

    /// Target namespace; set by normalization.
    pub fn namespace(&self) -> &str {
        self.csar_namespace.as_deref().unwrap_or_default()
    }
}

/// Raw XML given as one string or a list of lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum XmlSnippets {
    One(String),
    Many(Vec<String>),
}

impl XmlSnippets {
    pub fn joined(&self) -> String {
        match self {
            XmlSnippets::One(s) => s.clone(),
            XmlSnippets::Many(lines) => lines.join("\n"),
        }
    }
}

/// A reusable component template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeType {
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub properties_schema: IndexMap<String, PropertyDefinition>,
    #[serde(
        default,
        deserialize_with = "operations",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub operations: IndexMap<String, Vec<ArtifactSlot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_artifacts: Option<Vec<ArtifactSlot>>,
    /// Derived: parameter bindings per operation.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, OperationParameters>,
    /// Derived: operations grouped into interfaces.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub interfaces: IndexMap<String, Interface>,
}

/// One entry of a node type's properties schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<OperationBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OperationBinding>,
}

/// Operations a property is bound to as input or output parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationBinding {
    /// `true` binds to every operation, `false` to none.
    All(bool),
    Operations(Vec<String>),
}

/// Input/output parameters derived for one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationParameters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: String,
}

/// A named grouping of operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    /// Artifacts shared by every operation, hoisted from the operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implementation_artifacts: Vec<String>,
    pub operations: IndexMap<String, InterfaceOperation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceOperation {
    #[serde(default)]
    pub implementation_artifacts: Vec<String>,
    #[serde(default, flatten)]
    pub parameters: OperationParameters,
}

/// An artifact slot: a reference by name or an inline artifact awaiting promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactSlot {
    Name(String),
    Inline(Box<Artifact>),
}

impl ArtifactSlot {
    pub fn name(&self) -> Option<&str> {
        match self {
            ArtifactSlot::Name(name) => Some(name),
            ArtifactSlot::Inline(_) => None,
        }
    }
}

/// A file or bundle implementing an operation or deployed with a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub references: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<String>,
}

impl Artifact {
    pub fn type_name(&self) -> &str {
        self.artifact_type.as_deref().unwrap_or_default()
    }

    pub fn type_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    /// String references; only valid after normalization.
    pub fn reference_paths(&self) -> impl Iterator<Item = &str> {
        self.references.iter().filter_map(Value::as_str)
    }

    /// Properties without their type-specific wrapper element.
    pub fn plain_properties(&self) -> Option<&serde_json::Map<String, Value>> {
        let props = self.properties.as_ref()?.as_object()?;
        match types::property_wrapper(self.type_name()) {
            Some(wrapper) if props.len() == 1 => match props.get(&wrapper) {
                Some(Value::Object(inner)) => Some(inner),
                _ => Some(props),
            },
            _ => Some(props),
        }
    }
}

/// A concrete graph of nodes and relationships.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    /// Only meaningful on the single-topology shorthand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub nodes: IndexMap<String, Node>,
    #[serde(default, deserialize_with = "nullable")]
    pub relationships: IndexMap<String, Relationship>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub properties: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_artifacts: Option<Vec<ArtifactSlot>>,
    /// Shorthand for relationships sourced at this node.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub relationships: Vec<InlineRelationship>,
}

/// Relationship declared on its source node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InlineRelationship {
    Target(String),
    Detailed(InlineRelationshipSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineRelationshipSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub target: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Relationship {
    pub fn type_name(&self) -> &str {
        self.relationship_type.as_deref().unwrap_or_default()
    }

    pub fn type_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}
