//! `.csarignore` handling: gitignore-style exclusion patterns for the
//! working-directory listing.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::CompileError;

/// Name of the ignore file in the working directory root.
pub const IGNORE_FILE: &str = ".csarignore";

#[derive(Debug)]
struct Rule {
    matcher: GlobSet,
    negated: bool,
}

/// Ordered exclusion rules; the last matching rule decides.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Load rules from `<working_dir>/.csarignore`, if present.
    pub fn load(working_dir: &Path) -> Result<Self, CompileError> {
        let path = working_dir.join(IGNORE_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&path).map_err(|e| CompileError::io_at(&path, e))?;
        Self::parse(&content)
    }

    /// Parse ignore file content.
    pub fn parse(content: &str) -> Result<Self, CompileError> {
        let mut rules = Vec::new();

        for line in content.lines() {
            let line = line.trim_end();
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let (negated, pattern) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let pattern = pattern.strip_prefix('\\').unwrap_or(pattern);

            let dir_only = pattern.ends_with('/');
            let pattern = pattern.trim_end_matches('/');
            let anchored = pattern.starts_with('/') || pattern.contains('/');
            let pattern = pattern.trim_start_matches('/');
            if pattern.is_empty() {
                continue;
            }

            let mut variants = Vec::new();
            let bases = if anchored {
                vec![pattern.to_string()]
            } else {
                vec![pattern.to_string(), format!("**/{}", pattern)]
            };
            for base in bases {
                if !dir_only {
                    variants.push(base.clone());
                }
                variants.push(format!("{}/**", base));
            }

            let mut builder = GlobSetBuilder::new();
            for variant in &variants {
                let glob = GlobBuilder::new(variant)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| {
                        CompileError::InvalidInput(format!(
                            "invalid pattern '{}' in {}: {}",
                            line, IGNORE_FILE, e
                        ))
                    })?;
                builder.add(glob);
            }
            let matcher = builder.build().map_err(|e| {
                CompileError::InvalidInput(format!("invalid {}: {}", IGNORE_FILE, e))
            })?;

            rules.push(Rule { matcher, negated });
        }

        Ok(Self { rules })
    }

    /// Whether a forward-slash relative path is excluded.
    pub fn is_ignored(&self, relative: &str) -> bool {
        if relative == IGNORE_FILE {
            return true;
        }
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matcher.is_match(relative))
            .is_some_and(|rule| !rule.negated)
    }
}
