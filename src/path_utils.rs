// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Canonical path ↔ `file://` URI conversion and human ↔ LSP position mapping (C1).
//!
//! LSP positions are zero-indexed `(line, character)` pairs; the MCP tool
//! surface is one-indexed for humans. All conversion happens at this single
//! seam so the rest of the bridge only ever sees zero-indexed LSP positions
//! internally.

use anyhow::{Context, Result, anyhow};
use lsp_types::{Position, Range, Uri};
use std::path::{Path, PathBuf};

/// A human-facing, one-indexed position as received over MCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanPosition {
    /// One-indexed line number.
    pub line: u32,
    /// One-indexed character/column.
    pub character: u32,
}

impl HumanPosition {
    /// Converts to a zero-indexed LSP `Position`.
    ///
    /// Saturates at zero rather than underflowing for a caller-supplied `0`,
    /// since `0` and `1` both mean "first line" to a lenient caller.
    #[must_use]
    pub const fn to_lsp(self) -> Position {
        Position {
            line: self.line.saturating_sub(1),
            character: self.character.saturating_sub(1),
        }
    }
}

/// Converts a zero-indexed LSP `Position` to a one-indexed `HumanPosition`.
#[must_use]
pub const fn lsp_to_human(pos: Position) -> HumanPosition {
    HumanPosition {
        line: pos.line + 1,
        character: pos.character + 1,
    }
}

/// Converts a filesystem path to a `file://` URI.
///
/// # Errors
///
/// Returns an error if the path cannot be canonicalized or is not a valid
/// base for a `file://` URI (e.g. a relative path with no current directory).
pub fn path_to_uri(path: &Path) -> Result<Uri> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to canonicalize {}", path.display()))?;
    let url = url::Url::from_file_path(&canonical)
        .map_err(|()| anyhow!("not a valid file path: {}", canonical.display()))?;
    url.as_str()
        .parse()
        .map_err(|e| anyhow!("failed to parse URI for {}: {e}", canonical.display()))
}

/// Converts a `file://` URI back to a canonical filesystem path.
///
/// # Errors
///
/// Returns an error if the URI is not a `file://` URI or does not decode to
/// a valid path.
pub fn uri_to_path(uri: &Uri) -> Result<PathBuf> {
    let url = url::Url::parse(uri.as_str()).with_context(|| format!("invalid URI: {uri:?}"))?;
    url.to_file_path()
        .map_err(|()| anyhow!("not a file:// URI: {}", url))
}

/// The authoritative extension → LSP `languageId` table (spec §6).
///
/// Extensions are matched case-insensitively; unknown extensions map to
/// `"plaintext"`.
#[must_use]
pub fn language_id_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "py" => "python",
        "go" => "go",
        "rs" => "rust",
        "java" | "jar" | "class" => "java",
        "cpp" | "hpp" => "cpp",
        "c" | "h" => "c",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "kt" => "kotlin",
        "swift" => "swift",
        _ => "plaintext",
    }
}

/// Returns the lowercased, dot-less extension of a path, if any.
#[must_use]
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Returns the LSP `languageId` for a path, derived from its extension.
#[must_use]
pub fn language_id_for_path(path: &Path) -> &'static str {
    extension_of(path).map_or("plaintext", |ext| language_id_for_extension(&ext))
}

/// Builds a half-open `Range` from two `Position`s.
#[must_use]
pub const fn range(start: Position, end: Position) -> Range {
    Range { start, end }
}

/// Returns `true` if `p` lies within the half-open range `[start, end)`,
/// treating ranges by `(line, character)` lexicographic order.
#[must_use]
pub fn position_in_range(p: Position, r: Range) -> bool {
    (p.line, p.character) >= (r.start.line, r.start.character)
        && (p.line, p.character) < (r.end.line, r.end.character)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_to_lsp_round_trip() {
        let h = HumanPosition {
            line: 5,
            character: 10,
        };
        let lsp = h.to_lsp();
        assert_eq!(lsp, Position::new(4, 9));
        assert_eq!(lsp_to_human(lsp), h);
    }

    #[test]
    fn human_position_saturates_at_zero() {
        let h = HumanPosition {
            line: 0,
            character: 0,
        };
        assert_eq!(h.to_lsp(), Position::new(0, 0));
    }

    #[test]
    fn uri_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("a b.rs");
        std::fs::write(&file, "")?;

        let uri = path_to_uri(&file)?;
        let back = uri_to_path(&uri)?;
        assert_eq!(back, file.canonicalize()?);
        Ok(())
    }

    #[test]
    fn language_id_table() {
        assert_eq!(language_id_for_extension("TS"), "typescript");
        assert_eq!(language_id_for_extension("py"), "python");
        assert_eq!(language_id_for_extension("unknownext"), "plaintext");
    }

    #[test]
    fn position_in_range_is_half_open() {
        let r = range(Position::new(1, 0), Position::new(1, 5));
        assert!(position_in_range(Position::new(1, 0), r));
        assert!(position_in_range(Position::new(1, 4), r));
        assert!(!position_in_range(Position::new(1, 5), r));
    }
}
