// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Cross-language file-move orchestrator and dead-code analysis (C9).
//!
//! `rename_file` moves a file (or recurses leaves-first over a directory),
//! finds every importer of the old path under a computed root directory,
//! and rewrites their specifiers so the move doesn't break the import
//! graph. TS/JS/JSX/TSX/MJS/CJS prefer asking the live server via
//! `workspace/willRenameFiles` when it advertises the capability; every
//! other language (and TS/JS servers that don't advertise it) falls back to
//! [`crate::import::rewriter`]'s anchored-regex rewrite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use lsp_types::{FileRename, PositionEncodingKind, RenameFilesParams, SymbolKind, TextEdit, WorkspaceEdit};
use tracing::{debug, warn};

use crate::edit::{self, NormalizedEdit};
use crate::error::BridgeError;
use crate::import::graph::parse_imports;
use crate::import::rewriter::rewrite_imports;
use crate::lsp::ClientManager;
use crate::path_utils::{lsp_to_human, path_to_uri};
use crate::symbol::SymbolService;

/// Options governing a single `rename_file` call (spec §6 `rename_file`).
#[derive(Debug, Clone, Copy)]
pub struct RenameFileOptions {
    /// Plan the move and edits without touching disk.
    pub dry_run: bool,
    /// Honor `.gitignore` while scanning for importers.
    pub use_gitignore: bool,
}

impl Default for RenameFileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            use_gitignore: true,
        }
    }
}

/// Outcome of a `rename_file` call.
#[derive(Debug, Clone, Default)]
pub struct RenameFileResult {
    /// The aggregate edit across every affected importer (empty if none).
    pub edit: WorkspaceEdit,
    /// Every importer file whose specifiers were (or would be) rewritten.
    pub importers: Vec<PathBuf>,
    /// `(old, new)` pairs actually moved on disk, or planned if `dry_run`.
    pub moved: Vec<(PathBuf, PathBuf)>,
}

/// A symbol [`find_dead_code`] judged unreferenced (spec §4.7 dead-code
/// analysis).
#[derive(Debug, Clone)]
pub struct DeadSymbol {
    /// The symbol's name.
    pub name: String,
    /// The symbol's kind.
    pub kind: SymbolKind,
    /// The file it is declared in.
    pub file: PathBuf,
    /// Its one-indexed declaration position.
    pub line: u32,
    /// Its one-indexed declaration column.
    pub character: u32,
    /// Number of references found (excluding the declaration itself).
    pub reference_count: usize,
}

/// Options for [`find_dead_code`].
#[derive(Debug, Clone, Copy)]
pub struct DeadCodeOptions {
    /// Symbols with a reference count strictly below this are reported.
    pub threshold: usize,
    /// Skip files whose path contains a test-file marker.
    pub exclude_test_files: bool,
}

impl Default for DeadCodeOptions {
    fn default() -> Self {
        Self {
            threshold: 1,
            exclude_test_files: true,
        }
    }
}

const EXPORTABLE_KINDS: [SymbolKind; 4] = [
    SymbolKind::CLASS,
    SymbolKind::METHOD,
    SymbolKind::FUNCTION,
    SymbolKind::VARIABLE,
];

/// Languages whose LSP servers are asked for `workspace/willRenameFiles`
/// before falling back to the regex rewriter.
const SERVER_PREFERRED_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Orchestrates cross-language file/directory renames and reference-count
/// dead-code analysis, built atop [`SymbolService`] and [`ClientManager`].
pub struct RefactorService {
    servers: Arc<ClientManager>,
    symbols: Arc<SymbolService>,
}

impl RefactorService {
    /// Creates a new orchestrator over the shared server fleet and symbol
    /// service.
    #[must_use]
    pub fn new(servers: Arc<ClientManager>, symbols: Arc<SymbolService>) -> Self {
        Self { servers, symbols }
    }

    /// `renameFile(old, new, options)` (spec §4.7 and §6 `rename_file`).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::WouldCreateCycle`] if the move would place
    /// `old` into an ancestor of one of its importers, or a wrapped I/O
    /// error if scanning, moving, or editing fails.
    pub async fn rename_file(
        &self,
        old: &Path,
        new: &Path,
        options: RenameFileOptions,
    ) -> Result<RenameFileResult, BridgeError> {
        if tokio::fs::metadata(old)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            self.rename_directory(old, new, options).await
        } else {
            self.rename_single_file(old, new, options).await
        }
    }

    async fn rename_directory(
        &self,
        old: &Path,
        new: &Path,
        options: RenameFileOptions,
    ) -> Result<RenameFileResult, BridgeError> {
        let mut files = Vec::new();
        collect_files(old, &mut files)
            .await
            .map_err(BridgeError::Internal)?;
        // Leaves first: deepest paths move before their parent directories
        // are implicated in any later step.
        files.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

        let mut combined = RenameFileResult::default();
        let mut file_edits: HashMap<PathBuf, Vec<TextEdit>> = HashMap::new();

        for old_child in files {
            let Ok(suffix) = old_child.strip_prefix(old) else {
                continue;
            };
            let new_child = new.join(suffix);
            let result = Box::pin(self.rename_single_file(&old_child, &new_child, options)).await?;
            combined.importers.extend(result.importers);
            combined.moved.extend(result.moved);
            if let Some(changes) = result.edit.changes {
                for (uri, edits) in changes {
                    let path = crate::path_utils::uri_to_path(&uri).map_err(BridgeError::Internal)?;
                    file_edits.entry(path).or_default().extend(edits);
                }
            }
        }

        combined.edit = build_changes_edit(&file_edits)?;

        if !options.dry_run {
            remove_moved_directory(old).await;
        }

        Ok(combined)
    }

    async fn rename_single_file(
        &self,
        old: &Path,
        new: &Path,
        options: RenameFileOptions,
    ) -> Result<RenameFileResult, BridgeError> {
        let root_dir = compute_root_dir(old, new);
        let extension = crate::path_utils::extension_of(old).unwrap_or_default();

        let (file_edits, importers) = if SERVER_PREFERRED_EXTENSIONS.contains(&extension.as_str())
            && self.server_supports_will_rename(old).await
        {
            self.server_driven_edits(old, new).await?
        } else {
            self.regex_driven_edits(old, new, &root_dir, options.use_gitignore)
                .await?
        };

        let new_dir = new.parent().unwrap_or(Path::new(""));
        let old_dir = old.parent().unwrap_or(Path::new(""));
        if old_dir != new_dir {
            for importer in &importers {
                let importer_dir = importer.parent().unwrap_or(Path::new(""));
                if is_forbidden_relative(new_dir, importer_dir) {
                    return Err(BridgeError::WouldCreateCycle {
                        detail: format!(
                            "moving {} into {} would place it at or above importer {}",
                            old.display(),
                            new_dir.display(),
                            importer.display()
                        ),
                    });
                }
            }
        }

        let edit = build_changes_edit(&file_edits)?;
        let normalized = NormalizedEdit {
            file_edits,
            resource_ops: Vec::new(),
        };

        // Reported even in dry-run mode so callers planning a move (e.g.
        // `batch_execute`'s atomic pre-pass) see the intended rename
        // without this file actually moving yet.
        let moved = vec![(old.to_path_buf(), new.to_path_buf())];
        if !options.dry_run {
            if let Some(parent) = new.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BridgeError::Internal(e.into()))?;
            }
            tokio::fs::rename(old, new)
                .await
                .map_err(|e| BridgeError::Internal(e.into()))?;

            if !normalized.file_edits.is_empty() {
                edit::apply_atomic(&normalized, PositionEncodingKind::UTF16).await?;
            }
        }

        Ok(RenameFileResult {
            edit,
            importers,
            moved,
        })
    }

    async fn server_supports_will_rename(&self, old: &Path) -> bool {
        match self.symbols.client_for(old).await {
            Ok(client) => client.has_capability("workspace.fileOperations.willRename"),
            Err(_) => false,
        }
    }

    async fn server_driven_edits(
        &self,
        old: &Path,
        new: &Path,
    ) -> Result<(HashMap<PathBuf, Vec<TextEdit>>, Vec<PathBuf>), BridgeError> {
        let client = self.symbols.client_for(old).await?;
        let old_uri = path_to_uri(old).map_err(BridgeError::Internal)?;
        // `new` doesn't exist yet; build its URI from `old`'s canonical
        // form rather than canonicalizing a nonexistent path.
        let new_uri = sibling_uri(&old_uri, old, new).map_err(BridgeError::Internal)?;

        let response = client
            .will_rename_files(RenameFilesParams {
                files: vec![FileRename { old_uri, new_uri }],
            })
            .await
            .map_err(BridgeError::Internal)?;

        let Some(workspace_edit) = response else {
            return Ok((HashMap::new(), Vec::new()));
        };

        let normalized = edit::normalize(&workspace_edit).map_err(BridgeError::Internal)?;
        let importers = normalized.file_edits.keys().cloned().collect();
        Ok((normalized.file_edits, importers))
    }

    async fn regex_driven_edits(
        &self,
        old: &Path,
        new: &Path,
        root_dir: &Path,
        use_gitignore: bool,
    ) -> Result<(HashMap<PathBuf, Vec<TextEdit>>, Vec<PathBuf>), BridgeError> {
        let mut file_edits = HashMap::new();
        let mut importers = Vec::new();

        let mut builder = WalkBuilder::new(root_dir);
        builder.git_ignore(use_gitignore).git_exclude(use_gitignore);
        for entry in builder.build() {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) || path == old {
                continue;
            }

            let Ok(content) = tokio::fs::read_to_string(path).await else {
                continue;
            };
            let specifiers = parse_imports(path, &content);
            let importer_dir = path.parent().unwrap_or(Path::new(""));

            let mut replacements = HashMap::new();
            for spec in &specifiers {
                let Some(resolved) = resolve_specifier(importer_dir, root_dir, &spec.module)
                else {
                    continue;
                };
                if !paths_match_ignoring_extension(&resolved, old) {
                    continue;
                }
                let Some(new_specifier) = format_specifier(importer_dir, new, &spec.module) else {
                    continue;
                };
                replacements.insert(spec.module.clone(), new_specifier);
            }

            if replacements.is_empty() {
                continue;
            }

            let result = rewrite_imports(path, &content, &replacements);
            if !result.success || result.edits_applied == 0 {
                continue;
            }

            importers.push(path.to_path_buf());
            file_edits.insert(
                path.to_path_buf(),
                vec![whole_file_replace_edit(&content, result.content)],
            );
        }

        Ok((file_edits, importers))
    }

    /// Scans the workspace for every file whose import graph currently
    /// resolves to `path`, without producing any rewrite edits (spec §6
    /// `delete_file`'s importer conflict check).
    ///
    /// # Errors
    ///
    /// Returns a wrapped I/O error if the workspace cannot be scanned.
    pub async fn find_importers(
        &self,
        path: &Path,
        use_gitignore: bool,
    ) -> Result<Vec<PathBuf>, BridgeError> {
        let root_dir = compute_root_dir(path, path);
        let mut importers = Vec::new();

        let mut builder = WalkBuilder::new(&root_dir);
        builder.git_ignore(use_gitignore).git_exclude(use_gitignore);
        for entry in builder.build() {
            let Ok(entry) = entry else { continue };
            let candidate = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) || candidate == path {
                continue;
            }

            let Ok(content) = tokio::fs::read_to_string(candidate).await else {
                continue;
            };
            let importer_dir = candidate.parent().unwrap_or(Path::new(""));
            let references_path = parse_imports(candidate, &content).iter().any(|spec| {
                resolve_specifier(importer_dir, &root_dir, &spec.module)
                    .is_some_and(|resolved| paths_match_ignoring_extension(&resolved, path))
            });

            if references_path {
                importers.push(candidate.to_path_buf());
            }
        }

        Ok(importers)
    }

    /// For each symbol of an exportable kind in `files`, reports those whose
    /// reference count (excluding the declaration) is below `options.threshold`
    /// (spec §4.7 dead-code analysis).
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be opened or its server's
    /// `documentSymbol`/`references` request fails outright.
    pub async fn find_dead_code(
        &self,
        files: &[PathBuf],
        options: DeadCodeOptions,
    ) -> Result<Vec<DeadSymbol>, BridgeError> {
        let mut dead = Vec::new();

        for file in files {
            if options.exclude_test_files && is_test_file(file) {
                continue;
            }

            let Some(response) = self.symbols.document_symbols(file).await? else {
                continue;
            };

            for (name, kind, position) in flatten_symbols(response) {
                if !EXPORTABLE_KINDS.contains(&kind) {
                    continue;
                }

                let references = self
                    .symbols
                    .find_references(file, position, false)
                    .await?
                    .map(|locs| locs.len())
                    .unwrap_or(0);

                if references < options.threshold {
                    debug!(name = %name, file = %file.display(), references, "dead code candidate");
                    dead.push(DeadSymbol {
                        name,
                        kind,
                        file: file.clone(),
                        line: position.line,
                        character: position.character,
                        reference_count: references,
                    });
                }
            }
        }

        Ok(dead)
    }

    /// Exposes the underlying server fleet so callers (e.g. `restart_server`
    /// handlers) can share the same supervisor this orchestrator routes
    /// through.
    #[must_use]
    pub fn servers(&self) -> &Arc<ClientManager> {
        &self.servers
    }
}

fn flatten_symbols(
    response: lsp_types::DocumentSymbolResponse,
) -> Vec<(String, SymbolKind, crate::path_utils::HumanPosition)> {
    let mut out = Vec::new();
    match response {
        lsp_types::DocumentSymbolResponse::Flat(infos) => {
            for info in infos {
                out.push((info.name, info.kind, lsp_to_human(info.location.range.start)));
            }
        }
        lsp_types::DocumentSymbolResponse::Nested(symbols) => {
            flatten_nested(&symbols, &mut out);
        }
    }
    out
}

fn flatten_nested(
    symbols: &[lsp_types::DocumentSymbol],
    out: &mut Vec<(String, SymbolKind, crate::path_utils::HumanPosition)>,
) {
    for symbol in symbols {
        out.push((
            symbol.name.clone(),
            symbol.kind,
            lsp_to_human(symbol.selection_range.start),
        ));
        if let Some(children) = &symbol.children {
            flatten_nested(children, out);
        }
    }
}

fn is_test_file(path: &Path) -> bool {
    let s = path.to_string_lossy();
    s.contains("/tests/")
        || s.contains("test_")
        || s.ends_with(".test.ts")
        || s.ends_with(".test.js")
        || s.ends_with("_test.go")
        || s.ends_with("_test.py")
}

async fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut subdirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            subdirs.push(path);
        } else {
            out.push(path);
        }
    }
    for subdir in subdirs {
        Box::pin(collect_files(&subdir, out)).await?;
    }
    Ok(())
}

/// Removes the now-empty directory tree a directory rename moved every
/// file out of, mirroring what a plain `mv` of the whole tree would have
/// left on disk. Never touches anything outside `dir` itself — a failure
/// (non-empty subtree, already gone, permissions) is logged and otherwise
/// ignored, since a leftover empty directory is cosmetic, not a
/// correctness issue for the move itself.
async fn remove_moved_directory(dir: &Path) {
    if let Err(e) = remove_empty_dir_tree(dir).await {
        debug!("leaving {} in place: {e}", dir.display());
    }
}

async fn remove_empty_dir_tree(dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            Box::pin(remove_empty_dir_tree(&path)).await?;
        } else {
            return Err(std::io::Error::other(format!(
                "{} is not empty",
                dir.display()
            )));
        }
    }
    tokio::fs::remove_dir(dir).await
}

/// Computes the longest common ancestor of `old` and `new`'s parent
/// directories, stepping one level further up if the two differ, then
/// walking up until an existing directory is found (spec §4.7 step 1).
fn compute_root_dir(old: &Path, new: &Path) -> PathBuf {
    let old_dir = old.parent().unwrap_or(Path::new("."));
    let new_dir = new.parent().unwrap_or(Path::new("."));

    let old_comps: Vec<_> = old_dir.components().collect();
    let new_comps: Vec<_> = new_dir.components().collect();
    let common = old_comps
        .iter()
        .zip(new_comps.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut root: PathBuf = old_comps[..common].iter().collect();
    if old_dir != new_dir && root.parent().is_some() {
        root = root.parent().map_or_else(|| root.clone(), Path::to_path_buf);
    }

    while !root.as_os_str().is_empty() && !root.exists() {
        match root.parent() {
            Some(parent) => root = parent.to_path_buf(),
            None => break,
        }
    }

    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}

/// The relative path from `from` to `to`, computed purely by component
/// comparison (no filesystem access, so this works for paths that don't
/// exist yet).
fn relative_between(from: &Path, to: &Path) -> PathBuf {
    let from_comps: Vec<_> = from.components().collect();
    let to_comps: Vec<_> = to.components().collect();
    let common = from_comps
        .iter()
        .zip(to_comps.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from_comps.len() {
        result.push("..");
    }
    for comp in &to_comps[common..] {
        result.push(comp.as_os_str());
    }
    result
}

/// True when `new_dir` is `importer_dir` itself or an ancestor of it — i.e.
/// the path from `importer_dir` up to `new_dir` is made of nothing but `..`
/// components. That's the one shape that creates a cycle (spec §4.7 step
/// 3): the importer would end up nested under the file it imports. A move
/// into a cousin directory, or into a subdirectory of the importer's own
/// directory, is unrelated and allowed.
fn is_forbidden_relative(new_dir: &Path, importer_dir: &Path) -> bool {
    let rel = relative_between(importer_dir, new_dir);
    rel.as_os_str().is_empty()
        || rel
            .components()
            .all(|c| matches!(c, std::path::Component::ParentDir))
}

/// Best-effort specifier → filesystem path resolution, used only by the
/// regex fallback path. Relative specifiers (`./x`, `../x`) resolve against
/// the importing file's directory; dotted (Python/Java/C#) and
/// slash-separated (Go) specifiers resolve against `root_dir`; a bare Rust
/// `mod` name resolves against the importer's own directory.
fn resolve_specifier(importer_dir: &Path, root_dir: &Path, module: &str) -> Option<PathBuf> {
    let candidate = if let Some(rest) = module.strip_prefix("./") {
        importer_dir.join(rest)
    } else if module.starts_with("../") {
        importer_dir.join(module)
    } else if module.contains("::") {
        root_dir.join(module.replace("::", "/"))
    } else if module.contains('.') && !module.contains('/') {
        root_dir.join(module.replace('.', "/"))
    } else if module.contains('/') {
        root_dir.join(module)
    } else {
        importer_dir.join(module)
    };

    Some(lexically_normalize(&candidate))
}

fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `candidate` and `target` name the same file once known source
/// extensions are stripped from both sides.
fn paths_match_ignoring_extension(candidate: &Path, target: &Path) -> bool {
    strip_known_extension(candidate) == strip_known_extension(target)
}

fn strip_known_extension(path: &Path) -> PathBuf {
    match crate::path_utils::extension_of(path).as_deref() {
        Some("ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "py" | "go" | "rs" | "java" | "cs"
        | "rb" | "php") => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

/// Rewrites the new import specifier an importer at `importer_dir` should
/// use to reach `new_target`, preserving `original`'s relative-vs-dotted
/// style.
fn format_specifier(importer_dir: &Path, new_target: &Path, original: &str) -> Option<String> {
    let new_dir = new_target.parent().unwrap_or(Path::new(""));
    let stem = new_target.file_stem()?.to_str()?;

    if original.starts_with('.') {
        let rel = relative_between(importer_dir, new_dir);
        let mut joined = if rel.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            rel
        };
        joined.push(stem);
        let mut s = joined.to_string_lossy().replace('\\', "/");
        if !s.starts_with('.') {
            s = format!("./{s}");
        }
        Some(s)
    } else if original.contains("::") {
        let rel = new_dir.to_string_lossy().replace(['/', '\\'], "::");
        Some(if rel.is_empty() {
            stem.to_string()
        } else {
            format!("{rel}::{stem}")
        })
    } else if original.contains('.') && !original.contains('/') {
        let rel = new_dir.to_string_lossy().replace(['/', '\\'], ".");
        Some(if rel.is_empty() {
            stem.to_string()
        } else {
            format!("{rel}.{stem}")
        })
    } else {
        Some(stem.to_string())
    }
}

fn whole_file_replace_edit(original: &str, new_content: String) -> TextEdit {
    let last_line = original.lines().last().unwrap_or("");
    let end_line = u32::try_from(original.lines().count().saturating_sub(1)).unwrap_or(0);
    let end_character = u32::try_from(last_line.encode_utf16().count()).unwrap_or(0);

    TextEdit {
        range: lsp_types::Range {
            start: lsp_types::Position::new(0, 0),
            end: lsp_types::Position::new(end_line, end_character),
        },
        new_text: new_content,
    }
}

fn build_changes_edit(file_edits: &HashMap<PathBuf, Vec<TextEdit>>) -> Result<WorkspaceEdit, BridgeError> {
    let mut changes = HashMap::new();
    for (path, edits) in file_edits {
        let uri = path_to_uri(path).map_err(BridgeError::Internal)?;
        changes.insert(uri, edits.clone());
    }
    Ok(WorkspaceEdit {
        changes: if changes.is_empty() { None } else { Some(changes) },
        document_changes: None,
        change_annotations: None,
    })
}

fn sibling_uri(old_uri: &lsp_types::Uri, old: &Path, new: &Path) -> anyhow::Result<lsp_types::Uri> {
    let old_str = old_uri.as_str();
    let old_name = old
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("old path has no file name"))?
        .to_string_lossy();
    let base = old_str
        .strip_suffix(old_name.as_ref())
        .ok_or_else(|| anyhow::anyhow!("old URI does not end in old file name"))?;

    let new_dir_components: Vec<_> = new
        .parent()
        .unwrap_or(Path::new(""))
        .components()
        .collect();
    let old_dir_components: Vec<_> = old
        .parent()
        .unwrap_or(Path::new(""))
        .components()
        .collect();

    let new_name = new
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("new path has no file name"))?
        .to_string_lossy();

    if new_dir_components == old_dir_components {
        let joined = format!("{base}{new_name}");
        return joined
            .parse()
            .map_err(|e| anyhow::anyhow!("failed to build sibling URI: {e}"));
    }

    let rel = relative_between(
        old.parent().unwrap_or(Path::new("")),
        new.parent().unwrap_or(Path::new("")),
    );
    let mut result = base.trim_end_matches('/').to_string();
    for comp in rel.components() {
        match comp {
            std::path::Component::ParentDir => {
                if let Some(idx) = result.rfind('/') {
                    result.truncate(idx);
                }
            }
            other => {
                result.push('/');
                result.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    result.push('/');
    result.push_str(&new_name);
    result
        .parse()
        .map_err(|e| anyhow::anyhow!("failed to build sibling URI: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_dir_is_common_ancestor_one_level_up_when_dirs_differ() {
        let root = compute_root_dir(
            Path::new("/work/src/util.ts"),
            Path::new("/work/src/helpers/util.ts"),
        );
        assert_eq!(root, PathBuf::from("/work"));
    }

    #[test]
    fn root_dir_stays_put_when_only_renaming_in_place() {
        let root = compute_root_dir(
            Path::new("/work/src/util.ts"),
            Path::new("/work/src/helper.ts"),
        );
        assert_eq!(root, PathBuf::from("/work/src"));
    }

    #[test]
    fn forbidden_when_same_directory() {
        assert!(is_forbidden_relative(
            Path::new("/lib/sub"),
            Path::new("/lib/sub")
        ));
    }

    #[test]
    fn allowed_when_new_dir_is_subdirectory_of_importer() {
        // Moving a file one level deeper while its importer stays put
        // (spec §8 scenario 2) must not trip the cycle guard.
        assert!(!is_forbidden_relative(
            Path::new("/lib/sub/deeper"),
            Path::new("/lib/sub")
        ));
    }

    #[test]
    fn forbidden_when_new_dir_is_ancestor_of_importer() {
        // The actual hazard the guard exists for: moving `old` into a
        // directory above one of its importers (spec §8 scenario 3).
        assert!(is_forbidden_relative(
            Path::new("/lib/sub"),
            Path::new("/lib/sub/deeper")
        ));
    }

    #[test]
    fn allowed_when_importer_is_unrelated() {
        assert!(!is_forbidden_relative(
            Path::new("/lib/sub"),
            Path::new("/lib/other")
        ));
    }

    #[test]
    fn resolves_relative_ts_specifier() {
        let resolved = resolve_specifier(Path::new("/work/src"), Path::new("/work"), "./util");
        assert_eq!(resolved, Some(PathBuf::from("/work/src/util")));
    }

    #[test]
    fn resolves_python_dotted_specifier_against_root() {
        let resolved = resolve_specifier(Path::new("/work/pkg"), Path::new("/work"), "pkg.sub");
        assert_eq!(resolved, Some(PathBuf::from("/work/pkg/sub")));
    }

    #[test]
    fn paths_match_ignoring_extension_strips_known_suffixes() {
        assert!(paths_match_ignoring_extension(
            Path::new("/work/src/util.ts"),
            Path::new("/work/src/util")
        ));
    }

    #[test]
    fn formats_relative_specifier_for_new_location() {
        let s = format_specifier(
            Path::new("/work/src"),
            Path::new("/work/src/helpers/util.ts"),
            "./util",
        );
        assert_eq!(s.as_deref(), Some("./helpers/util"));
    }

    #[test]
    fn whole_file_edit_covers_last_line_in_utf16_units() {
        let original = "line one\nline two\n";
        let edit = whole_file_replace_edit(original, "replacement\n".to_string());
        assert_eq!(edit.range.start, lsp_types::Position::new(0, 0));
        assert_eq!(edit.range.end.line, 1);
        assert_eq!(edit.range.end.character, 8);
    }

    #[tokio::test]
    async fn remove_moved_directory_deletes_now_empty_tree() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a").join("b");
        tokio::fs::create_dir_all(&nested).await?;

        remove_moved_directory(dir.path()).await;

        assert!(!dir.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn remove_moved_directory_leaves_nonempty_tree_alone() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("still-here.txt"), "x").await?;

        remove_moved_directory(dir.path()).await;

        assert!(dir.path().exists());
        Ok(())
    }
}
