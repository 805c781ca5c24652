//! `TOSCA-Metadata/TOSCA.meta` manifest.

/// Content type of the entry definitions document.
pub const DEFINITIONS_CONTENT_TYPE: &str = "application/vnd.oasis.tosca.definitions";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Extension to content type. Multi-part extensions come first.
const CONTENT_TYPES: &[(&str, &str)] = &[
    (".tar.gz", "application/gzip"),
    (".tgz", "application/gzip"),
    (".tar", "application/x-tar"),
    (".zip", "application/zip"),
    (".war", "application/java-archive"),
    (".jar", "application/java-archive"),
    (".xml", "application/xml"),
    (".xsd", "application/xml"),
    (".json", "application/json"),
    (".yml", "application/x-yaml"),
    (".yaml", "application/x-yaml"),
    (".sh", "application/x-sh"),
    (".js", "application/javascript"),
    (".py", "text/x-python"),
    (".rb", "text/x-ruby"),
    (".html", "text/html"),
    (".txt", "text/plain"),
    (".md", "text/markdown"),
];

/// Content type by file extension, case-insensitive.
pub fn content_type(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| lower.ends_with(ext))
        .map(|(_, ct)| *ct)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Render the manifest listing every file of the final tree.
pub fn render(definitions_file: &str, files: &[String]) -> String {
    let mut out = String::new();
    out.push_str("TOSCA-Meta-File-Version: 1.0\n");
    out.push_str("CSAR-Version: 1.0\n");
    out.push_str(&format!("Created-By: toscafy {}\n", env!("CARGO_PKG_VERSION")));
    out.push_str(&format!("Entry-Definitions: {}\n", definitions_file));

    for file in files {
        let ct = if file == definitions_file {
            DEFINITIONS_CONTENT_TYPE
        } else {
            content_type(file)
        };
        out.push_str(&format!("\nName: {}\nContent-Type: {}\n", file, ct));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type("bundle.TAR.GZ"), "application/gzip");
        assert_eq!(content_type("scripts/install.sh"), "application/x-sh");
        assert_eq!(content_type("payload.bin"), "application/octet-stream");
        assert_eq!(content_type("Makefile"), "application/octet-stream");
    }

    #[test]
    fn lists_header_and_files() {
        let files = vec![
            "Definitions/definitions.xml".to_string(),
            "install.sh".to_string(),
        ];
        let meta = render("Definitions/definitions.xml", &files);
        let mut lines = meta.lines();
        assert_eq!(lines.next(), Some("TOSCA-Meta-File-Version: 1.0"));
        assert_eq!(lines.next(), Some("CSAR-Version: 1.0"));
        assert!(lines.next().unwrap().starts_with("Created-By: toscafy "));
        assert_eq!(lines.next(), Some("Entry-Definitions: Definitions/definitions.xml"));
        assert!(meta.contains(
            "Name: Definitions/definitions.xml\nContent-Type: application/vnd.oasis.tosca.definitions\n"
        ));
        assert!(meta.contains("Name: install.sh\nContent-Type: application/x-sh\n"));
    }
}
