//! Variable substitution applied to the spec text before parsing.
//!
//! Placeholders: `${variables.a.b}`, `${vars.a.b}`, `<%= variables.a.b %>`
//! and `<%= vars.a.b %>`. String values are inserted raw, every other value
//! as JSON text.

use regex_lite::Regex;
use serde_json::Value;

use crate::error::CompileError;

const PLACEHOLDER: &str = r"\$\{\s*(?:variables|vars)\.([A-Za-z0-9_.\-]+)\s*\}|<%=\s*(?:variables|vars)\.([A-Za-z0-9_.\-]+)\s*%>";

/// Substitute every placeholder in `text` with its value from `variables`.
pub fn render(text: &str, variables: &Value) -> Result<String, CompileError> {
    let pattern = Regex::new(PLACEHOLDER)
        .map_err(|e| CompileError::InvalidInput(format!("template pattern: {}", e)))?;

    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in pattern.captures_iter(text) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        let value = lookup(variables, path.as_str())
            .ok_or_else(|| CompileError::UnresolvedVariable(path.as_str().to_string()))?;

        out.push_str(&text[last..whole.start()]);
        match value {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Look up a dotted path; numeric segments index into arrays.
fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
