//! Identifier word splitting, canonical casing and collision-free name generation.

/// Split an identifier into words.
///
/// Boundaries are non-alphanumeric characters, lower-to-upper transitions
/// (`dockerCompose`) and the end of an acronym (`HTTPServer` -> `HTTP`, `Server`).
pub fn words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if ch.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }

        current.push(ch);
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// Lowercase words joined by single spaces: `Docker-Compose` -> `docker compose`.
pub fn normalize_words(input: &str) -> String {
    words(input)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical identifier casing: `my-web_server` -> `MyWebServer`.
pub fn camelize(input: &str) -> String {
    words(input)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Kebab-case form used for service names: `MySqlApi` -> `my-sql-api`.
pub fn kebab(input: &str) -> String {
    words(input)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// How a collision suffix is attached to a base name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixStyle {
    /// `base_7`
    Underscore,
    /// `camelize("base_7")`
    Camelized,
}

/// Run-scoped source of collision suffixes.
///
/// Every suffix handed out during a run comes from this single counter, so
/// generated names are deterministic for a given input.
#[derive(Debug, Default)]
pub struct NameGenerator {
    counter: u64,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unique token.
    pub fn token(&mut self) -> String {
        self.counter += 1;
        self.counter.to_string()
    }

    /// Return `base` if free, otherwise the first suffixed variant that is free.
    pub fn unique(
        &mut self,
        base: &str,
        style: SuffixStyle,
        taken: impl Fn(&str) -> bool,
    ) -> String {
        if !taken(base) {
            return base.to_string();
        }
        self.suffixed(base, style, taken)
    }

    /// Always suffix `base`, skipping tokens whose result is taken.
    pub fn suffixed(
        &mut self,
        base: &str,
        style: SuffixStyle,
        taken: impl Fn(&str) -> bool,
    ) -> String {
        loop {
            let token = self.token();
            let candidate = match style {
                SuffixStyle::Underscore => format!("{}_{}", base, token),
                SuffixStyle::Camelized => camelize(&format!("{}_{}", base, token)),
            };
            if !taken(&candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_case_and_separators() {
        assert_eq!(words("dockerCompose"), vec!["docker", "Compose"]);
        assert_eq!(words("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(words("my-web_server"), vec!["my", "web", "server"]);
        assert_eq!(words("  "), Vec::<String>::new());
    }

    #[test]
    fn normalizes_words() {
        assert_eq!(normalize_words("DockerComposeArtifact"), "docker compose artifact");
        assert_eq!(normalize_words("docker-compose"), "docker compose");
        assert_eq!(normalize_words("dateTime"), "date time");
        assert_eq!(normalize_words("WAR"), "war");
    }

    #[test]
    fn camelizes_identifiers() {
        assert_eq!(camelize("my-web_server"), "MyWebServer");
        assert_eq!(camelize("install script"), "InstallScript");
        assert_eq!(camelize("HTTPServer"), "HttpServer");
        assert_eq!(camelize("node1"), "Node1");
        assert_eq!(camelize("AlreadyCamel"), "AlreadyCamel");
    }

    #[test]
    fn kebabs_identifiers() {
        assert_eq!(kebab("MySqlApi"), "my-sql-api");
    }

    #[test]
    fn unique_names_skip_taken_candidates() {
        let mut names = NameGenerator::new();
        let taken = ["web", "web_1"];
        let name = names.unique("web", SuffixStyle::Underscore, |n| taken.contains(&n));
        assert_eq!(name, "web_2");
        assert_eq!(names.unique("free", SuffixStyle::Underscore, |_| false), "free");
    }

    #[test]
    fn camelized_suffixes() {
        let mut names = NameGenerator::new();
        let name = names.suffixed("web_server", SuffixStyle::Camelized, |n| n == "WebServer1");
        assert_eq!(name, "WebServer2");
    }
}
