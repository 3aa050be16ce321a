// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Per-language import specifier rewriting (C8).
//!
//! Given a file's content and a set of exact specifier replacements (as
//! produced by the file-move orchestrator from old/new paths), locates each
//! matching specifier via [`crate::import::graph::parse_imports`] and
//! splices in the replacement text in place. TS/JS/JSX/TSX/MJS/CJS prefer
//! the live server's `workspace/willRenameFiles` round-trip (see
//! [`crate::refactor`]) when the server advertises the capability; this
//! regex-anchored rewrite is the fallback for those languages and the only
//! path for every other one.

use std::collections::HashMap;
use std::path::Path;

use super::graph::parse_imports;

/// Outcome of rewriting a single file's imports (spec §4.6).
#[derive(Debug, Clone)]
pub struct RewriteResult {
    /// Whether the rewrite completed without error.
    pub success: bool,
    /// The file's full content after rewriting.
    pub content: String,
    /// Number of specifier occurrences actually replaced.
    pub edits_applied: usize,
}

/// Rewrites every import/require/use specifier in `content` that exactly
/// matches a key in `replacements`, substituting the corresponding value.
///
/// Operates purely on the captured specifier span within its line, so
/// unrelated formatting (quote style, surrounding whitespace) is preserved.
#[must_use]
pub fn rewrite_imports(
    path: &Path,
    content: &str,
    replacements: &HashMap<String, String>,
) -> RewriteResult {
    if replacements.is_empty() {
        return RewriteResult {
            success: true,
            content: content.to_string(),
            edits_applied: 0,
        };
    }

    let specifiers = parse_imports(path, content);
    let mut by_line: HashMap<u32, Vec<(u32, u32, &str)>> = HashMap::new();
    for spec in &specifiers {
        if let Some(new_value) = replacements.get(&spec.module) {
            by_line
                .entry(spec.line)
                .or_default()
                .push((spec.column_start, spec.column_end, new_value.as_str()));
        }
    }

    if by_line.is_empty() {
        return RewriteResult {
            success: true,
            content: content.to_string(),
            edits_applied: 0,
        };
    }

    let ends_with_newline = content.ends_with('\n');
    let mut edits_applied = 0usize;
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    for (line_no, mut spans) in by_line {
        let Some(line) = lines.get_mut(line_no as usize) else {
            continue;
        };
        // Apply back-to-front so earlier spans' byte offsets stay valid.
        spans.sort_by(|a, b| b.0.cmp(&a.0));
        for (start, end, replacement) in spans {
            let start = start as usize;
            let end = end as usize;
            if start > line.len() || end > line.len() || start > end {
                continue;
            }
            line.replace_range(start..end, replacement);
            edits_applied += 1;
        }
    }

    let mut content = lines.join("\n");
    if ends_with_newline {
        content.push('\n');
    }

    RewriteResult {
        success: true,
        content,
        edits_applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn rewrites_ts_relative_import() {
        let content = "import { foo } from \"./util\";\n";
        let mut replacements = HashMap::new();
        replacements.insert("./util".to_string(), "./helpers/util".to_string());

        let result = rewrite_imports(Path::new("app.ts"), content, &replacements);
        assert!(result.success);
        assert_eq!(result.edits_applied, 1);
        assert_eq!(result.content, "import { foo } from \"./helpers/util\";\n");
    }

    #[test]
    fn rewrites_python_dotted_module() {
        let content = "from pkg.sub import thing\n";
        let mut replacements = HashMap::new();
        replacements.insert("pkg.sub".to_string(), "pkg.moved".to_string());

        let result = rewrite_imports(Path::new("app.py"), content, &replacements);
        assert_eq!(result.content, "from pkg.moved import thing\n");
        assert_eq!(result.edits_applied, 1);
    }

    #[test]
    fn rewrites_rust_use_path() {
        let content = "use crate::util::helper;\nmod sub;\n";
        let mut replacements = HashMap::new();
        replacements.insert(
            "crate::util::helper".to_string(),
            "crate::helpers::util::helper".to_string(),
        );

        let result = rewrite_imports(Path::new("lib.rs"), content, &replacements);
        assert_eq!(
            result.content,
            "use crate::helpers::util::helper;\nmod sub;\n"
        );
        assert_eq!(result.edits_applied, 1);
    }

    #[test]
    fn leaves_unmatched_specifiers_untouched() {
        let content = "import { a } from \"./a\";\nimport { b } from \"./b\";\n";
        let mut replacements = HashMap::new();
        replacements.insert("./a".to_string(), "./moved/a".to_string());

        let result = rewrite_imports(Path::new("app.ts"), content, &replacements);
        assert_eq!(
            result.content,
            "import { a } from \"./moved/a\";\nimport { b } from \"./b\";\n"
        );
        assert_eq!(result.edits_applied, 1);
    }

    #[test]
    fn no_matching_replacements_is_a_no_op() {
        let content = "use crate::util::helper;\n";
        let replacements = HashMap::new();

        let result = rewrite_imports(Path::new("lib.rs"), content, &replacements);
        assert_eq!(result.content, content);
        assert_eq!(result.edits_applied, 0);
    }
}
