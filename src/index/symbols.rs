//! Lightweight symbol scanning for index summaries.
//!
//! The summaries only have to be good enough for an oracle to rank files
//! by, so this is line-oriented regex matching over the handful of
//! declaration shapes common to Rust, Python and the JS family, not a
//! parser.

use std::sync::LazyLock;

use regex::Regex;

static FUNCTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|def|function)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("valid regex")
});

static TYPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|class|interface|type)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("valid regex")
});

static IMPORTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(use\s+[^;]+|import\s+\S[^;]*|from\s+\S+\s+import\s+[^;]+)")
        .expect("valid regex")
});

fn captures(re: &Regex, content: &str) -> Vec<String> {
    let mut found = Vec::new();
    for cap in re.captures_iter(content) {
        if let Some(m) = cap.get(1) {
            let text = m.as_str().trim().to_string();
            if !found.contains(&text) {
                found.push(text);
            }
        }
    }
    found
}

/// Summarize the declarations in `content` as a short block of
/// `functions:` / `types:` / `imports:` lines. Empty string when nothing
/// recognizable is declared.
pub fn extract_symbols(content: &str) -> String {
    let functions = captures(&FUNCTIONS, content);
    let types = captures(&TYPES, content);
    let imports = captures(&IMPORTS, content);

    let mut lines = Vec::new();
    if !functions.is_empty() {
        lines.push(format!("functions: {}", functions.join(", ")));
    }
    if !types.is_empty() {
        lines.push(format!("types: {}", types.join(", ")));
    }
    if !imports.is_empty() {
        lines.push(format!("imports: {}", imports.join("; ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_rust_declarations() {
        let content = r#"
use std::collections::HashMap;

pub struct Cache {
    entries: HashMap<String, String>,
}

pub fn lookup(key: &str) -> Option<String> {
    None
}

async fn refresh() {}
"#;
        let symbols = extract_symbols(content);
        assert!(symbols.contains("functions: lookup, refresh"));
        assert!(symbols.contains("types: Cache"));
        assert!(symbols.contains("use std::collections::HashMap"));
    }

    #[test]
    fn test_extracts_python_declarations() {
        let content = "from os import path\n\nclass Walker:\n    def walk(self):\n        pass\n";
        let symbols = extract_symbols(content);
        assert!(symbols.contains("functions: walk"));
        assert!(symbols.contains("types: Walker"));
        assert!(symbols.contains("from os import path"));
    }

    #[test]
    fn test_no_declarations_yields_empty_summary() {
        assert_eq!(extract_symbols("just some prose\nwith two lines"), "");
    }

    #[test]
    fn test_duplicate_names_reported_once() {
        let content = "fn go() {}\nfn go() {}\n";
        assert_eq!(extract_symbols(content), "functions: go");
    }
}
