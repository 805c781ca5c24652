//! Minimal indenting XML writer.

use std::borrow::Cow;

use serde_json::Value;

const INDENT: &str = "  ";

/// Escape text for use in element content or attribute values.
pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Whether `name` can be written as an unprefixed element name (an XML
/// NCName): a letter or `_`, then letters, digits, `_`, `-` or `.`.
pub fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Builds an XML document line by line.
#[derive(Debug)]
pub struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    /// Start a document with the XML declaration.
    pub fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            depth: 0,
        }
    }

    fn line(&mut self, content: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(content);
        self.out.push('\n');
    }

    fn tag(name: &str, attrs: &[(&str, &str)]) -> String {
        let mut tag = format!("<{}", name);
        for (key, value) in attrs {
            tag.push_str(&format!(" {}=\"{}\"", key, escape(value)));
        }
        tag
    }

    pub fn open(&mut self, name: &str, attrs: &[(&str, &str)]) {
        let tag = Self::tag(name, attrs);
        self.line(&format!("{}>", tag));
        self.depth += 1;
    }

    pub fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{}>", name));
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) {
        let tag = Self::tag(name, attrs);
        self.line(&format!("{}/>", tag));
    }

    pub fn text(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) {
        let tag = Self::tag(name, attrs);
        self.line(&format!("{}>{}</{}>", tag, escape(text), name));
    }

    /// Splice caller-provided XML, each line indented to the current depth.
    pub fn raw(&mut self, xml: &str) {
        for line in xml.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
            self.line(line);
        }
    }

    /// Write a JSON value as an element tree named `name`.
    ///
    /// Objects become child elements, arrays repeat the element, scalars
    /// become text content and `null` an empty element.
    pub fn json(&mut self, name: &str, value: &Value) {
        self.json_with(name, &[], value);
    }

    /// Like [`XmlWriter::json`], with attributes on the outermost element(s).
    pub fn json_with(&mut self, name: &str, attrs: &[(&str, &str)], value: &Value) {
        match value {
            Value::Object(map) if map.is_empty() => self.empty(name, attrs),
            Value::Object(map) => {
                self.open(name, attrs);
                for (key, child) in map {
                    self.json(key, child);
                }
                self.close(name);
            }
            Value::Array(items) => {
                for item in items {
                    self.json_with(name, attrs, item);
                }
            }
            Value::Null => self.empty(name, attrs),
            Value::String(s) => self.text(name, attrs, s),
            other => self.text(name, attrs, &other.to_string()),
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ncnames() {
        for ok in ["port", "_x", "db-host", "v1.2", "größe"] {
            assert!(is_ncname(ok), "{}", ok);
        }
        for bad in ["", "1x", "my port", "-a", "ns:name", ".a", "a<b"] {
            assert!(!is_ncname(bad), "{}", bad);
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert!(matches!(escape("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn writes_nested_elements() {
        let mut w = XmlWriter::new();
        w.open("Root", &[("id", "r&1")]);
        w.text("Name", &[], "x<y");
        w.empty("Leaf", &[("ref", "a")]);
        w.close("Root");
        let xml = w.finish();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Root id=\"r&amp;1\">\n  <Name>x&lt;y</Name>\n  <Leaf ref=\"a\"/>\n</Root>\n"
        );
    }

    #[test]
    fn converts_json_values() {
        let mut w = XmlWriter::new();
        w.json(
            "Props",
            &json!({ "port": 8080, "tags": ["a", "b"], "empty": null, "nested": { "on": true } }),
        );
        let xml = w.finish();
        assert!(xml.contains("  <port>8080</port>"));
        assert!(xml.contains("  <tags>a</tags>\n  <tags>b</tags>"));
        assert!(xml.contains("  <empty/>"));
        assert!(xml.contains("    <on>true</on>"));
    }

    #[test]
    fn raw_xml_is_reindented() {
        let mut w = XmlWriter::new();
        w.open("Root", &[]);
        w.raw("<a/>\n\n<b/>\n");
        w.close("Root");
        assert!(w.finish().contains("  <a/>\n  <b/>\n</Root>"));
    }
}
