//! Template variables from `--vars-file` and repeated `--var key=value`.

use std::path::Path;

use anyhow::{anyhow, bail, Context as _};
use serde_json::{Map, Value};

/// Merge the variables file (if any) with `--var` pairs; pairs win.
///
/// Returns `None` when neither source is given, so the spec text is parsed
/// without template substitution.
pub fn load(vars_file: Option<&Path>, pairs: &[String]) -> anyhow::Result<Option<Value>> {
    if vars_file.is_none() && pairs.is_empty() {
        return Ok(None);
    }

    let mut vars = match vars_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read variables file {}", path.display()))?;
            let value: Value = serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse variables file {}", path.display()))?;
            if !value.is_object() {
                bail!("variables file {} must hold a mapping", path.display());
            }
            value
        }
        None => Value::Object(Map::new()),
    };

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --var '{}': expected key=value", pair))?;
        set_path(&mut vars, key.trim(), Value::String(value.to_string()))?;
    }
    Ok(Some(vars))
}

/// Set a dotted `a.b.c` path, creating intermediate mappings.
fn set_path(root: &mut Value, key: &str, value: Value) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        bail!("invalid variable name '{}'", key);
    }

    let mut node = root;
    for part in &parts[..parts.len() - 1] {
        let map = node
            .as_object_mut()
            .ok_or_else(|| anyhow!("variable '{}' overrides a non-mapping value", key))?;
        node = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = node
        .as_object_mut()
        .ok_or_else(|| anyhow!("variable '{}' overrides a non-mapping value", key))?;
    map.insert(parts[parts.len() - 1].to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_sources_means_no_templating() {
        assert!(load(None, &[]).unwrap().is_none());
    }

    #[test]
    fn pairs_build_nested_values() {
        let vars = load(None, &["db.host=localhost".into(), "port=5432".into()])
            .unwrap()
            .unwrap();
        assert_eq!(vars, json!({ "db": { "host": "localhost" }, "port": "5432" }));
    }

    #[test]
    fn pairs_override_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("vars.yml");
        std::fs::write(&file, "name: from-file\nregion: eu\n").unwrap();

        let vars = load(Some(&file), &["name=from-flag".into()]).unwrap().unwrap();
        assert_eq!(vars, json!({ "name": "from-flag", "region": "eu" }));
    }

    #[test]
    fn malformed_pairs_are_rejected() {
        assert!(load(None, &["novalue".into()]).is_err());
        assert!(load(None, &["a..b=x".into()]).is_err());
        assert!(load(None, &["a=x".into(), "a.b=y".into()]).is_err());
    }
}
