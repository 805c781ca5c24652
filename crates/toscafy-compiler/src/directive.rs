//! Embedded directive interpreter.
//!
//! A directive is a JSON object holding exactly one `$toscafy.<op>` key,
//! plus the companion keys its operation allows. Resolution walks the tree
//! depth-first and replaces every directive object with its result value.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::context::{list_files, normalize_relative, relative_key, Context};
use crate::error::CompileError;
use crate::fetch::Fetcher;
use crate::package::{archive_to_vec, ArchiveFormat};

/// Reserved key prefix marking a directive.
pub const DIRECTIVE_PREFIX: &str = "$toscafy.";

/// Decoded form of fetched or embedded content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Text,
    Json,
    Base64,
}

/// A parsed directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    AddFile { source: String, target: String },
    AddDir { source: String, target: String },
    FetchAsFile { url: String, target: String },
    Fetch { url: String, repr: Representation },
    EmbedFile { source: String, repr: Representation },
    EmbedDir { source: String, format: ArchiveFormat },
}

/// Companion keys naming the output target.
const TARGET_KEYS: &[&str] = &["filename", "to"];

impl Directive {
    /// Parse a JSON object as a directive.
    ///
    /// Returns `Ok(None)` when the object holds no reserved key.
    pub fn parse(map: &Map<String, Value>) -> Result<Option<Self>, CompileError> {
        let mut reserved = map.keys().filter(|k| k.starts_with(DIRECTIVE_PREFIX));
        let Some(key) = reserved.next() else {
            return Ok(None);
        };
        if let Some(other) = reserved.next() {
            return Err(CompileError::InvalidDirective(format!(
                "'{}' and '{}' in the same object",
                key, other
            )));
        }

        let op = &key[DIRECTIVE_PREFIX.len()..];
        let arg = map
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CompileError::InvalidDirective(format!("'{}' requires a non-empty string", key))
            })?
            .to_string();

        let takes_target = matches!(op, "addFile" | "addDir" | "fetchAsFile");
        for extra in map.keys().filter(|k| *k != key) {
            if !(takes_target && TARGET_KEYS.contains(&extra.as_str())) {
                return Err(CompileError::InvalidDirective(format!(
                    "unexpected key '{}' next to '{}'",
                    extra, key
                )));
            }
        }

        let directive = match op {
            "addFile" => Directive::AddFile {
                source: arg,
                target: parse_target(map, key)?,
            },
            "addDir" => Directive::AddDir {
                source: arg,
                target: parse_target(map, key)?,
            },
            "fetchAsFile" => Directive::FetchAsFile {
                url: arg,
                target: parse_target(map, key)?,
            },
            "fetchAsText" => Directive::Fetch {
                url: arg,
                repr: Representation::Text,
            },
            "fetchAsJson" => Directive::Fetch {
                url: arg,
                repr: Representation::Json,
            },
            "fetchAsBase64" => Directive::Fetch {
                url: arg,
                repr: Representation::Base64,
            },
            "embedFileAsText" => Directive::EmbedFile {
                source: arg,
                repr: Representation::Text,
            },
            "embedFileAsJson" => Directive::EmbedFile {
                source: arg,
                repr: Representation::Json,
            },
            "embedFileAsBase64" => Directive::EmbedFile {
                source: arg,
                repr: Representation::Base64,
            },
            "embedDirAsZipBase64" => Directive::EmbedDir {
                source: arg,
                format: ArchiveFormat::Zip,
            },
            "embedDirAsTgzBase64" => Directive::EmbedDir {
                source: arg,
                format: ArchiveFormat::TarGz,
            },
            _ => {
                return Err(CompileError::InvalidDirective(format!(
                    "unknown directive '{}'",
                    key
                )))
            }
        };
        Ok(Some(directive))
    }

    /// Operation name, as written after the prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            Directive::AddFile { .. } => "addFile",
            Directive::AddDir { .. } => "addDir",
            Directive::FetchAsFile { .. } => "fetchAsFile",
            Directive::Fetch { repr, .. } => match repr {
                Representation::Text => "fetchAsText",
                Representation::Json => "fetchAsJson",
                Representation::Base64 => "fetchAsBase64",
            },
            Directive::EmbedFile { repr, .. } => match repr {
                Representation::Text => "embedFileAsText",
                Representation::Json => "embedFileAsJson",
                Representation::Base64 => "embedFileAsBase64",
            },
            Directive::EmbedDir { format, .. } => match format {
                ArchiveFormat::Zip => "embedDirAsZipBase64",
                _ => "embedDirAsTgzBase64",
            },
        }
    }

    fn subject(&self) -> &str {
        match self {
            Directive::AddFile { source, .. }
            | Directive::AddDir { source, .. }
            | Directive::EmbedFile { source, .. }
            | Directive::EmbedDir { source, .. } => source,
            Directive::FetchAsFile { url, .. } | Directive::Fetch { url, .. } => url,
        }
    }
}

fn parse_target(map: &Map<String, Value>, key: &str) -> Result<String, CompileError> {
    let mut given = TARGET_KEYS.iter().filter_map(|k| map.get(*k));
    let raw = match (given.next(), given.next()) {
        (Some(_), Some(_)) => {
            return Err(CompileError::InvalidDirective(format!(
                "'{}' accepts either 'filename' or 'to', not both",
                key
            )))
        }
        (Some(value), None) => value.as_str().ok_or_else(|| {
            CompileError::InvalidDirective(format!("target of '{}' must be a string", key))
        })?,
        _ => {
            return Err(CompileError::InvalidDirective(format!(
                "'{}' requires a 'filename'",
                key
            )))
        }
    };
    normalize_relative(raw).ok_or_else(|| {
        CompileError::InvalidDirective(format!(
            "target '{}' of '{}' must be a relative path inside the output directory",
            raw, key
        ))
    })
}

/// Resolves directives in place, writing side effects into the context's
/// output directory.
pub struct DirectiveResolver<'a> {
    ctx: &'a mut Context,
    fetcher: &'a dyn Fetcher,
}

impl<'a> DirectiveResolver<'a> {
    pub fn new(ctx: &'a mut Context, fetcher: &'a dyn Fetcher) -> Self {
        Self { ctx, fetcher }
    }

    /// Replace every directive below `node` with its result.
    ///
    /// Relative source paths resolve against `base_dir`. Side effects already
    /// performed when a later directive fails are left in place.
    pub fn resolve(&mut self, node: &mut Value, base_dir: &Path) -> Result<(), CompileError> {
        match node {
            Value::Object(map) => {
                if let Some(directive) = Directive::parse(map)? {
                    *node = self.execute(&directive, base_dir)?;
                    return Ok(());
                }
                for child in map.values_mut() {
                    self.resolve(child, base_dir)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for child in items {
                    self.resolve(child, base_dir)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn execute(&mut self, directive: &Directive, base_dir: &Path) -> Result<Value, CompileError> {
        let failed = |reason: String| CompileError::DirectiveFailed {
            directive: directive.kind(),
            target: directive.subject().to_string(),
            reason,
        };

        let value = match directive {
            Directive::AddFile { source, target } => {
                let src = base_dir.join(source);
                if !src.is_file() {
                    return Err(failed(format!("no file at {}", src.display())));
                }
                let dest = self.prepare_target(target)?;
                fs::copy(&src, &dest).map_err(|e| CompileError::io_at(&dest, e))?;
                self.ctx.record_output(target.clone());
                Value::String(target.clone())
            }
            Directive::AddDir { source, target } => {
                let src = base_dir.join(source);
                if !src.is_dir() {
                    return Err(failed(format!("no directory at {}", src.display())));
                }
                for file in list_files(&src)? {
                    self.ctx.check_not_reserved(&format!("{}/{}", target, file))?;
                }
                let dest = self.ctx.output_dir.join(target);
                copy_dir(&src, &dest)?;
                self.ctx.record_output_dir(target)?;
                Value::String(target.clone())
            }
            Directive::FetchAsFile { url, target } => {
                let dest = self.prepare_target(target)?;
                self.fetcher.fetch_to(url, &dest)?;
                self.ctx.record_output(target.clone());
                Value::String(target.clone())
            }
            Directive::Fetch { url, repr } => {
                let body = self.fetcher.fetch(url)?;
                let mut value = decode(body, *repr).map_err(failed)?;
                if *repr == Representation::Json {
                    self.resolve(&mut value, base_dir)?;
                }
                value
            }
            Directive::EmbedFile { source, repr } => {
                let src = base_dir.join(source);
                if !src.is_file() {
                    return Err(failed(format!("no file at {}", src.display())));
                }
                let body = fs::read(&src).map_err(|e| CompileError::io_at(&src, e))?;
                let mut value = decode(body, *repr).map_err(failed)?;
                if *repr == Representation::Json {
                    let nested_base = src.parent().map(Path::to_path_buf).unwrap_or_default();
                    self.resolve(&mut value, &nested_base)?;
                }
                value
            }
            Directive::EmbedDir { source, format } => {
                let src = base_dir.join(source);
                if !src.is_dir() {
                    return Err(failed(format!("no directory at {}", src.display())));
                }
                Value::String(BASE64.encode(archive_to_vec(&src, *format)?))
            }
        };

        toscafy_telemetry::log_directive_resolved!(
            directive = directive.kind(),
            target = %directive.subject(),
            "Directive resolved"
        );
        Ok(value)
    }

    fn prepare_target(&self, target: &str) -> Result<PathBuf, CompileError> {
        self.ctx.check_not_reserved(target)?;
        let dest = self.ctx.output_dir.join(target);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CompileError::io_at(parent, e))?;
        }
        Ok(dest)
    }
}

fn decode(body: Vec<u8>, repr: Representation) -> Result<Value, String> {
    match repr {
        Representation::Text => String::from_utf8(body)
            .map(Value::String)
            .map_err(|e| format!("content is not UTF-8: {}", e)),
        Representation::Json => {
            serde_json::from_slice(&body).map_err(|e| format!("malformed JSON: {}", e))
        }
        Representation::Base64 => Ok(Value::String(BASE64.encode(body))),
    }
}

/// Recursively copy a directory.
pub(crate) fn copy_dir(src: &Path, dest: &Path) -> Result<(), CompileError> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(relative_key(rel));
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| CompileError::io_at(&target, e))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| CompileError::io_at(parent, e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| CompileError::io_at(&target, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::start_test_server;
    use crate::fetch::HttpFetcher;
    use crate::wrap::GeneratorConfig;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Fetcher serving canned bodies.
    struct MapFetcher(HashMap<String, Vec<u8>>);

    impl Fetcher for MapFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, CompileError> {
            self.0.get(url).cloned().ok_or_else(|| CompileError::Fetch {
                url: url.to_string(),
                reason: "status 404 Not Found".into(),
            })
        }
    }

    fn setup() -> (TempDir, TempDir, Context) {
        let work = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let ctx = Context::new(
            work.path(),
            out.path(),
            GeneratorConfig::default(),
            std::env::temp_dir(),
        )
        .unwrap();
        (work, out, ctx)
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn parses_closed_directive_set() {
        let d = Directive::parse(&obj(json!({ "$toscafy.addFile": "a.sh", "to": "b/a.sh" })))
            .unwrap()
            .unwrap();
        assert_eq!(
            d,
            Directive::AddFile {
                source: "a.sh".into(),
                target: "b/a.sh".into()
            }
        );

        assert!(Directive::parse(&obj(json!({ "plain": 1 }))).unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_directives() {
        let cases = [
            json!({ "$toscafy.nope": "x" }),
            json!({ "$toscafy.fetchAsText": "u", "$toscafy.fetchAsJson": "v" }),
            json!({ "$toscafy.addFile": "a.sh" }),
            json!({ "$toscafy.addFile": "a.sh", "filename": "../a.sh" }),
            json!({ "$toscafy.addFile": "a.sh", "filename": "/etc/a.sh" }),
            json!({ "$toscafy.addFile": "a.sh", "filename": "x", "to": "y" }),
            json!({ "$toscafy.fetchAsText": "u", "filename": "x" }),
            json!({ "$toscafy.embedFileAsText": 5 }),
        ];
        for case in cases {
            let err = Directive::parse(&obj(case.clone())).unwrap_err();
            assert!(
                matches!(err, CompileError::InvalidDirective(_)),
                "expected E1020 for {case}"
            );
        }
    }

    #[test]
    fn add_file_copies_into_output() {
        let (work, out, mut ctx) = setup();
        std::fs::write(work.path().join("install.sh"), "echo").unwrap();
        let fetcher = MapFetcher(HashMap::new());

        let mut tree = json!({ "references": [
            { "$toscafy.addFile": "install.sh", "filename": "scripts/install.sh" }
        ]});
        DirectiveResolver::new(&mut ctx, &fetcher)
            .resolve(&mut tree, work.path())
            .unwrap();

        assert_eq!(tree, json!({ "references": ["scripts/install.sh"] }));
        assert_eq!(
            std::fs::read_to_string(out.path().join("scripts/install.sh")).unwrap(),
            "echo"
        );
        assert!(ctx.exists("scripts/install.sh"));
    }

    #[test]
    fn add_dir_copies_recursively() {
        let (work, out, mut ctx) = setup();
        std::fs::create_dir_all(work.path().join("cookbook/recipes")).unwrap();
        std::fs::write(work.path().join("cookbook/recipes/default.rb"), "x").unwrap();
        let fetcher = MapFetcher(HashMap::new());

        let mut tree = json!({ "$toscafy.addDir": "cookbook", "to": "files/cookbook" });
        DirectiveResolver::new(&mut ctx, &fetcher)
            .resolve(&mut tree, work.path())
            .unwrap();

        assert_eq!(tree, json!("files/cookbook"));
        assert!(out.path().join("files/cookbook/recipes/default.rb").is_file());
        assert!(ctx.contains_path("files/cookbook"));
    }

    #[test]
    fn embedded_json_resolves_relative_to_its_own_directory() {
        let (work, _out, mut ctx) = setup();
        std::fs::create_dir_all(work.path().join("conf")).unwrap();
        std::fs::write(work.path().join("conf/inner.txt"), "inner text").unwrap();
        std::fs::write(
            work.path().join("conf/settings.json"),
            r#"{"motd": {"$toscafy.embedFileAsText": "inner.txt"}}"#,
        )
        .unwrap();
        let fetcher = MapFetcher(HashMap::new());

        let mut tree = json!({ "settings": { "$toscafy.embedFileAsJson": "conf/settings.json" } });
        DirectiveResolver::new(&mut ctx, &fetcher)
            .resolve(&mut tree, work.path())
            .unwrap();

        assert_eq!(tree, json!({ "settings": { "motd": "inner text" } }));
    }

    #[test]
    fn fetched_json_is_interpreted_recursively() {
        let (work, _out, mut ctx) = setup();
        let fetcher = MapFetcher(HashMap::from([
            (
                "http://h/outer.json".to_string(),
                br#"{"inner": {"$toscafy.fetchAsBase64": "http://h/bytes"}}"#.to_vec(),
            ),
            ("http://h/bytes".to_string(), vec![1u8, 2, 3]),
        ]));

        let mut tree = json!([{ "$toscafy.fetchAsJson": "http://h/outer.json" }]);
        DirectiveResolver::new(&mut ctx, &fetcher)
            .resolve(&mut tree, work.path())
            .unwrap();

        assert_eq!(tree, json!([{ "inner": "AQID" }]));
    }

    #[test]
    fn fetch_as_file_writes_bytes() {
        let (addr, server) = start_test_server(b"payload-bytes".to_vec(), 200, 1);
        let (work, out, mut ctx) = setup();
        let fetcher = HttpFetcher::new().unwrap();

        let mut tree = json!({ "references": [
            { "$toscafy.fetchAsFile": format!("http://{}/p", addr), "filename": "payload.bin" }
        ]});
        DirectiveResolver::new(&mut ctx, &fetcher)
            .resolve(&mut tree, work.path())
            .unwrap();
        server.join().unwrap();

        assert_eq!(tree["references"][0], "payload.bin");
        assert_eq!(std::fs::read(out.path().join("payload.bin")).unwrap(), b"payload-bytes");
    }

    #[test]
    fn embed_dir_produces_base64_archive() {
        let (work, _out, mut ctx) = setup();
        std::fs::create_dir_all(work.path().join("bundle")).unwrap();
        std::fs::write(work.path().join("bundle/a.txt"), "a").unwrap();
        let fetcher = MapFetcher(HashMap::new());

        let mut tree = json!({ "$toscafy.embedDirAsTgzBase64": "bundle" });
        DirectiveResolver::new(&mut ctx, &fetcher)
            .resolve(&mut tree, work.path())
            .unwrap();

        let bytes = BASE64.decode(tree.as_str().unwrap()).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn failures_name_directive_and_target() {
        let (work, _out, mut ctx) = setup();
        let fetcher = MapFetcher(HashMap::new());

        let mut tree = json!({ "$toscafy.embedFileAsText": "missing.txt" });
        let err = DirectiveResolver::new(&mut ctx, &fetcher)
            .resolve(&mut tree, work.path())
            .unwrap_err();
        match err {
            CompileError::DirectiveFailed {
                directive, target, ..
            } => {
                assert_eq!(directive, "embedFileAsText");
                assert_eq!(target, "missing.txt");
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut tree = json!({ "$toscafy.fetchAsText": "http://h/gone" });
        let err = DirectiveResolver::new(&mut ctx, &fetcher)
            .resolve(&mut tree, work.path())
            .unwrap_err();
        assert!(matches!(err, CompileError::Fetch { .. }));
    }

    #[test]
    fn resolution_is_idempotent_on_resolved_trees() {
        let (work, _out, mut ctx) = setup();
        std::fs::write(work.path().join("a.txt"), "A").unwrap();
        let fetcher = MapFetcher(HashMap::new());

        let mut tree = json!({ "x": [{ "$toscafy.embedFileAsText": "a.txt" }, { "y": 1 }] });
        let mut resolver = DirectiveResolver::new(&mut ctx, &fetcher);
        resolver.resolve(&mut tree, work.path()).unwrap();
        let once = tree.clone();
        resolver.resolve(&mut tree, work.path()).unwrap();
        assert_eq!(tree, once);
    }
}
