// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Per-language import specifier extraction (C7).
//!
//! For TS/JS/JSX/TSX/MJS/CJS the file-move orchestrator prefers asking the
//! live LSP server via `workspace/willRenameFiles` (see [`crate::refactor`]);
//! the anchored-regex extraction here is the universal fallback used when a
//! server doesn't advertise that capability, and the only path for every
//! other language.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// A single import/require/use specifier found in a file, with the line it
/// appears on (0-indexed, for building a `TextEdit` range later).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
    /// The raw module path/specifier text as written, e.g. `"./util"` or
    /// `a.b.C` or `a::b::c`.
    pub module: String,
    /// 0-indexed line the specifier occurs on.
    pub line: u32,
    /// Byte offset within the line where `module` starts.
    pub column_start: u32,
    /// Byte offset within the line where `module` ends.
    pub column_end: u32,
}

static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:import\s+(?:[\w*${}\s,]+\s+from\s+)?|export\s+(?:[\w*${}\s,]+\s+from\s+)?|require\(|import\()\s*['"]([^'"]+)['"]"#).unwrap()
});
static PY_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:from\s+(\S+)\s+import|import\s+(\S+))").unwrap());
static GO_IMPORT_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+"([^"]+)""#).unwrap());
static GO_IMPORT_GROUPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*"([^"]+)""#).unwrap());
static RUST_USE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:pub\s+)?use\s+([\w:]+(?:::\{[^}]*\})?)").unwrap());
static RUST_MOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:pub\s+)?mod\s+(\w+)\s*;").unwrap());
static JAVA_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(?:static\s+)?([\w.*]+)\s*;").unwrap());
static CSHARP_USING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*using\s+(?:\w+\s*=\s*)?([\w.]+)\s*;").unwrap());
static RUBY_REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:require_relative|require|load)\s*\(?\s*['"]([^'"]+)['"]"#).unwrap()
});
static PHP_USE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*use\s+([\w\\]+)\s*;").unwrap());
static PHP_REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:require|include)(?:_once)?\s*\(\s*['"]([^'"]+)['"]"#).unwrap()
});

/// Extracts every import/require/use specifier from `content`, dispatching
/// on `path`'s extension per spec §4.6.
#[must_use]
pub fn parse_imports(path: &Path, content: &str) -> Vec<ImportSpecifier> {
    match crate::path_utils::extension_of(path).as_deref() {
        Some("ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs") => extract_with(content, &JS_IMPORT, 1),
        Some("py") => extract_python(content),
        Some("go") => extract_go(content),
        Some("rs") => extract_rust(content),
        Some("java") => extract_with(content, &JAVA_IMPORT, 1),
        Some("cs") => extract_with(content, &CSHARP_USING, 1),
        Some("rb") => extract_with(content, &RUBY_REQUIRE, 1),
        Some("php") => extract_php(content),
        _ => Vec::new(),
    }
}

fn extract_with(content: &str, pattern: &Regex, group: usize) -> Vec<ImportSpecifier> {
    let mut specifiers = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        for caps in pattern.captures_iter(line) {
            if let Some(m) = caps.get(group) {
                specifiers.push(ImportSpecifier {
                    module: m.as_str().to_string(),
                    line: u32::try_from(line_no).unwrap_or(u32::MAX),
                    column_start: u32::try_from(m.start()).unwrap_or(0),
                    column_end: u32::try_from(m.end()).unwrap_or(0),
                });
            }
        }
    }
    specifiers
}

fn extract_python(content: &str) -> Vec<ImportSpecifier> {
    let mut specifiers = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if let Some(caps) = PY_IMPORT.captures(line) {
            let m = caps.get(1).or_else(|| caps.get(2));
            if let Some(m) = m {
                specifiers.push(ImportSpecifier {
                    module: m.as_str().to_string(),
                    line: u32::try_from(line_no).unwrap_or(u32::MAX),
                    column_start: u32::try_from(m.start()).unwrap_or(0),
                    column_end: u32::try_from(m.end()).unwrap_or(0),
                });
            }
        }
    }
    specifiers
}

fn extract_go(content: &str) -> Vec<ImportSpecifier> {
    let mut specifiers = Vec::new();
    let mut in_group = false;
    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("import (") {
            in_group = true;
            continue;
        }
        if in_group {
            if trimmed.starts_with(')') {
                in_group = false;
                continue;
            }
            if let Some(caps) = GO_IMPORT_GROUPED.captures(line)
                && let Some(m) = caps.get(1)
            {
                specifiers.push(ImportSpecifier {
                    module: m.as_str().to_string(),
                    line: u32::try_from(line_no).unwrap_or(u32::MAX),
                    column_start: u32::try_from(m.start()).unwrap_or(0),
                    column_end: u32::try_from(m.end()).unwrap_or(0),
                });
            }
            continue;
        }
        if let Some(caps) = GO_IMPORT_SINGLE.captures(line)
            && let Some(m) = caps.get(1)
        {
            specifiers.push(ImportSpecifier {
                module: m.as_str().to_string(),
                line: u32::try_from(line_no).unwrap_or(u32::MAX),
                column_start: u32::try_from(m.start()).unwrap_or(0),
                column_end: u32::try_from(m.end()).unwrap_or(0),
            });
        }
    }
    specifiers
}

fn extract_rust(content: &str) -> Vec<ImportSpecifier> {
    let mut specifiers = extract_with(content, &RUST_USE, 1);
    specifiers.extend(extract_with(content, &RUST_MOD, 1));
    specifiers
}

fn extract_php(content: &str) -> Vec<ImportSpecifier> {
    let mut specifiers = extract_with(content, &PHP_USE, 1);
    specifiers.extend(extract_with(content, &PHP_REQUIRE, 1));
    specifiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn extracts_ts_relative_import() {
        let specs = parse_imports(Path::new("app.ts"), "import { foo } from \"./util\";\n");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].module, "./util");
    }

    #[test]
    fn extracts_python_from_import() {
        let specs = parse_imports(Path::new("app.py"), "from pkg.sub import thing\n");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].module, "pkg.sub");
    }

    #[test]
    fn extracts_go_grouped_imports() {
        let content = "import (\n\t\"fmt\"\n\t\"pkg/util\"\n)\n";
        let specs = parse_imports(Path::new("main.go"), content);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].module, "pkg/util");
    }

    #[test]
    fn extracts_rust_use_and_mod() {
        let specs = parse_imports(Path::new("lib.rs"), "use crate::util::helper;\nmod sub;\n");
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].module, "crate::util::helper");
        assert_eq!(specs[1].module, "sub");
    }

    #[test]
    fn extracts_java_import() {
        let specs = parse_imports(Path::new("Main.java"), "import a.b.C;\n");
        assert_eq!(specs[0].module, "a.b.C");
    }

    #[test]
    fn extracts_ruby_require_relative() {
        let specs = parse_imports(Path::new("app.rb"), "require_relative \"util\"\n");
        assert_eq!(specs[0].module, "util");
    }
}
