//! Type resolution for artifact, relationship and property value types.
//!
//! Short aliases are case-folded and word-normalized (`docker-compose`,
//! `DockerCompose` and `docker compose` are the same candidate), then matched
//! against fixed tables. Tables are scanned in declaration order and the
//! **last** matching entry wins: `"chef docker"` resolves to `DockerArtifact`
//! because the `docker` row is declared after the `chef` row.

use serde::{Deserialize, Serialize};

use crate::names::normalize_words;

/// TOSCA base types namespace.
pub const TOSCA_BASE_TYPES_NS: &str = "http://docs.oasis-open.org/tosca/ns/2011/12/ToscaBaseTypes";

/// Namespace of the artifact types shipped with toscafy.
pub const TOSCAFY_ARTIFACT_TYPES_NS: &str = "http://toscafy.github.io/artifacttypes";

/// Namespace of the sample WAR type.
pub const EXAMPLE_TYPES_NS: &str = "http://www.example.com/ToscaTypes";

/// Artifact type produced by the artifact wrapper.
pub const API_SERVICE_ARTIFACT: &str = "ApiServiceArtifact";

/// A type name qualified by its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedType {
    pub name: String,
    pub namespace: String,
}

impl QualifiedType {
    fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

/// Artifact alias table: (alias, type name, namespace). Order is significant.
const ARTIFACT_TYPES: &[(&str, &str, &str)] = &[
    ("script", "ScriptArtifact", TOSCA_BASE_TYPES_NS),
    ("archive", "ArchiveArtifact", TOSCA_BASE_TYPES_NS),
    ("zip", "ArchiveArtifact", TOSCA_BASE_TYPES_NS),
    ("war", "WAR", EXAMPLE_TYPES_NS),
    ("ansible", "AnsibleArtifact", TOSCAFY_ARTIFACT_TYPES_NS),
    ("chef", "ChefArtifact", TOSCAFY_ARTIFACT_TYPES_NS),
    ("docker", "DockerArtifact", TOSCAFY_ARTIFACT_TYPES_NS),
    ("docker compose", "DockerComposeArtifact", TOSCAFY_ARTIFACT_TYPES_NS),
    ("any2api", API_SERVICE_ARTIFACT, TOSCAFY_ARTIFACT_TYPES_NS),
    ("api service", API_SERVICE_ARTIFACT, TOSCAFY_ARTIFACT_TYPES_NS),
];

/// Relationship alias table. Order is significant.
const RELATIONSHIP_TYPES: &[(&str, &str, &str)] = &[
    ("depend", "DependsOn", TOSCA_BASE_TYPES_NS),
    ("host", "HostedOn", TOSCA_BASE_TYPES_NS),
    ("connect", "ConnectsTo", TOSCA_BASE_TYPES_NS),
    ("peer", "ConnectsTo", TOSCA_BASE_TYPES_NS),
];

/// XSD value type table: (alias prefix, XSD type). Order is significant.
const VALUE_TYPES: &[(&str, &str)] = &[
    ("anytype", "anyType"),
    ("uri", "anyURI"),
    ("url", "anyURI"),
    ("base64", "base64Binary"),
    ("bin", "base64Binary"),
    ("bool", "boolean"),
    ("byte", "byte"),
    ("date", "date"),
    ("dateTime", "dateTime"),
    ("decimal", "decimal"),
    ("num", "decimal"),
    ("double", "double"),
    ("duration", "duration"),
    ("entities", "ENTITIES"),
    ("entity", "ENTITY"),
    ("float", "float"),
    ("day", "gDay"),
    ("month", "gMonth"),
    ("monthday", "gMonthDay"),
    ("year", "gYear"),
    ("yearmonth", "gYearMonth"),
    ("hex", "hexBinary"),
    ("id", "ID"),
    ("idref", "IDREF"),
    ("idrefs", "IDREFS"),
    ("int", "int"),
    ("integer", "integer"),
    ("lang", "language"),
    ("long", "long"),
    ("name", "Name"),
    ("ncname", "NCName"),
    ("negativeinteger", "negativeInteger"),
    ("nmtoken", "NMTOKEN"),
    ("nmtokens", "NMTOKENS"),
    ("nonnegativeinteger", "nonNegativeInteger"),
    ("nonpositiveinteger", "nonPositiveInteger"),
    ("normalizedstring", "normalizedString"),
    ("notation", "NOTATION"),
    ("positiveinteger", "positiveInteger"),
    ("qname", "QName"),
    ("short", "short"),
    ("str", "string"),
    ("time", "time"),
    ("token", "token"),
    ("unsignedbyte", "unsignedByte"),
    ("unsignedint", "unsignedInt"),
    ("unsignedlong", "unsignedLong"),
    ("unsignedshort", "unsignedShort"),
];

/// Default value type for properties without a declared type.
pub const ANY_VALUE_TYPE: &str = "xsd:anyType";

/// Properties of these artifact types are nested under `<TypeName>Properties`.
const WRAPPED_PROPERTY_TYPES: &[&str] = &[
    "AnsibleArtifact",
    "ChefArtifact",
    "DockerComposeArtifact",
    API_SERVICE_ARTIFACT,
];

/// Properties whose values name files of the output tree, per artifact type.
const REFERENCE_PROPERTIES: &[(&str, &[&str])] = &[
    ("DockerComposeArtifact", &["dockerComposeYml", "context"]),
    (API_SERVICE_ARTIFACT, &["context"]),
];

/// Split Clark notation `{namespace}Name`.
fn split_clark(candidate: &str) -> Option<QualifiedType> {
    let rest = candidate.strip_prefix('{')?;
    let (namespace, name) = rest.split_once('}')?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some(QualifiedType::new(name, namespace))
}

fn resolve_qualified(candidate: &str, table: &[(&str, &str, &str)]) -> Option<QualifiedType> {
    if let Some(qualified) = split_clark(candidate) {
        return Some(qualified);
    }

    let normalized = normalize_words(candidate);
    if normalized.is_empty() {
        return None;
    }

    let mut found = None;
    for (alias, name, namespace) in table {
        if normalized.contains(&normalize_words(alias)) {
            found = Some(QualifiedType::new(name, namespace));
        }
    }
    found
}

/// Resolve an artifact type alias to its qualified type.
pub fn resolve_artifact_type(candidate: &str) -> Option<QualifiedType> {
    resolve_qualified(candidate, ARTIFACT_TYPES)
}

/// Resolve a relationship type alias to its qualified type.
pub fn resolve_relationship_type(candidate: &str) -> Option<QualifiedType> {
    resolve_qualified(candidate, RELATIONSHIP_TYPES)
}

/// Resolve a property value type alias to a prefixed XSD type name.
///
/// Candidates that already carry a prefix (`xsd:int`, `tns:Custom`) are kept verbatim.
pub fn resolve_value_type(candidate: &str) -> Option<String> {
    if candidate.contains(':') {
        return Some(candidate.to_string());
    }

    // Word breaks are dropped so `monthDay` and `unsigned_int` reach the
    // single-word aliases.
    let compact = normalize_words(candidate).replace(' ', "");
    if compact.is_empty() {
        return None;
    }

    let mut found = None;
    for (alias, xsd) in VALUE_TYPES {
        if compact.starts_with(&alias.to_ascii_lowercase()) {
            found = Some(format!("xsd:{}", xsd));
        }
    }
    found
}

/// Value type used when a property's declared type is not an XSD alias:
/// a type defined in the target namespace.
pub fn custom_value_type(candidate: &str) -> String {
    format!("tns:{}", candidate)
}

/// The wrapper element required around properties of `type_name`, if any.
pub fn property_wrapper(type_name: &str) -> Option<String> {
    WRAPPED_PROPERTY_TYPES
        .contains(&type_name)
        .then(|| format!("{}Properties", type_name))
}

/// Property names whose values must name files of the output tree.
pub fn reference_properties(type_name: &str) -> &'static [&'static str] {
    REFERENCE_PROPERTIES
        .iter()
        .find(|(name, _)| *name == type_name)
        .map(|(_, props)| *props)
        .unwrap_or(&[])
}
