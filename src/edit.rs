// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Atomic multi-file `WorkspaceEdit` application (C6).
//!
//! Edits are normalized to a per-file `TextEdit` list plus an ordered list
//! of resource operations (create/rename/delete), snapshotted before any
//! write, applied back-to-front within each file, and rolled back as a unit
//! if any file fails.

use crate::error::BridgeError;
use crate::path_utils::uri_to_path;
use lsp_types::{
    DocumentChangeOperation, DocumentChanges, OneOf, PositionEncodingKind, ResourceOp, TextEdit,
    Uri, WorkspaceEdit,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

/// A single filesystem-level operation extracted from `documentChanges`.
#[derive(Debug, Clone)]
pub enum ResourceOperation {
    /// Create a new empty file (or overwrite, depending on options).
    Create(PathBuf),
    /// Rename/move a file.
    Rename(PathBuf, PathBuf),
    /// Delete a file.
    Delete(PathBuf),
}

/// A `WorkspaceEdit` normalized into per-file text edits plus an ordered
/// resource operation list, both forms of the wire protocol (spec's
/// `changes` vs `documentChanges` shapes) unified to this single
/// representation.
#[derive(Debug, Clone, Default)]
pub struct NormalizedEdit {
    /// Text edits to apply, grouped by target file path.
    pub file_edits: HashMap<PathBuf, Vec<TextEdit>>,
    /// Resource operations, in the order they must be applied.
    pub resource_ops: Vec<ResourceOperation>,
}

/// Converts a `WorkspaceEdit` (either `changes` or `documentChanges` shape)
/// into a single normalized form.
///
/// # Errors
///
/// Returns an error if any URI fails to parse to a filesystem path.
pub fn normalize(edit: &WorkspaceEdit) -> anyhow::Result<NormalizedEdit> {
    let mut normalized = NormalizedEdit::default();

    if let Some(changes) = &edit.changes {
        for (uri, edits) in changes {
            let path = uri_to_path(uri)?;
            normalized
                .file_edits
                .entry(path)
                .or_default()
                .extend(edits.iter().cloned());
        }
    }

    if let Some(doc_changes) = &edit.document_changes {
        match doc_changes {
            DocumentChanges::Edits(edits) => {
                for text_doc_edit in edits {
                    let path = uri_to_path(&text_doc_edit.text_document.uri)?;
                    normalized
                        .file_edits
                        .entry(path)
                        .or_default()
                        .extend(text_doc_edit.edits.iter().map(flatten_edit));
                }
            }
            DocumentChanges::Operations(ops) => {
                for op in ops {
                    match op {
                        DocumentChangeOperation::Op(resource_op) => {
                            normalized
                                .resource_ops
                                .push(to_resource_operation(resource_op)?);
                        }
                        DocumentChangeOperation::Edit(text_doc_edit) => {
                            let path = uri_to_path(&text_doc_edit.text_document.uri)?;
                            normalized
                                .file_edits
                                .entry(path)
                                .or_default()
                                .extend(text_doc_edit.edits.iter().map(flatten_edit));
                        }
                    }
                }
            }
        }
    }

    Ok(normalized)
}

fn flatten_edit(e: &OneOf<TextEdit, lsp_types::AnnotatedTextEdit>) -> TextEdit {
    match e {
        OneOf::Left(text_edit) => text_edit.clone(),
        OneOf::Right(annotated) => TextEdit {
            range: annotated.text_edit.range,
            new_text: annotated.text_edit.new_text.clone(),
        },
    }
}

fn to_resource_operation(op: &ResourceOp) -> anyhow::Result<ResourceOperation> {
    Ok(match op {
        ResourceOp::Create(create) => ResourceOperation::Create(uri_to_path(&create.uri)?),
        ResourceOp::Rename(rename) => {
            ResourceOperation::Rename(uri_to_path(&rename.old_uri)?, uri_to_path(&rename.new_uri)?)
        }
        ResourceOp::Delete(delete) => ResourceOperation::Delete(uri_to_path(&delete.uri)?),
    })
}

/// Returns `true` if any two edits within the same file's edit list overlap
/// (spec's `OverlappingEdits` rejection).
#[must_use]
pub fn has_overlapping_edits(edits: &[TextEdit]) -> bool {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by_key(|e| (e.range.start.line, e.range.start.character));
    sorted.windows(2).any(|pair| {
        let (a, b) = (pair[0], pair[1]);
        (a.range.end.line, a.range.end.character) > (b.range.start.line, b.range.start.character)
    })
}

/// A snapshot of every file's original content, taken before any writes, so
/// a failed multi-file apply can be rolled back as a unit.
struct Snapshot {
    contents: HashMap<PathBuf, String>,
}

impl Snapshot {
    async fn capture(paths: impl Iterator<Item = &PathBuf>) -> anyhow::Result<Self> {
        let mut contents = HashMap::new();
        for path in paths {
            if path.exists() {
                let text = fs::read_to_string(path).await?;
                contents.insert(path.clone(), text);
            }
        }
        Ok(Self { contents })
    }

    async fn rollback(&self) {
        for (path, content) in &self.contents {
            if let Err(e) = fs::write(path, content).await {
                warn!(path = %path.display(), "rollback write failed: {e}");
            }
        }
    }
}

/// Applies a normalized edit atomically: validates every file's edit list
/// for overlaps and in-bounds ranges first, snapshots all touched files,
/// then applies back-to-front per file. On any failure, every touched file
/// is restored from its snapshot.
///
/// # Errors
///
/// Returns [`BridgeError::OverlappingEdits`] or
/// [`BridgeError::RangeOutOfBounds`] from pre-validation without touching
/// disk, or [`BridgeError::Internal`] if a write fails mid-apply (after
/// which rollback is attempted automatically).
pub async fn apply_atomic(
    normalized: &NormalizedEdit,
    encoding: PositionEncodingKind,
) -> Result<(), BridgeError> {
    for (path, edits) in &normalized.file_edits {
        if has_overlapping_edits(edits) {
            return Err(BridgeError::OverlappingEdits {
                uri: path.display().to_string(),
            });
        }
    }

    let snapshot = Snapshot::capture(normalized.file_edits.keys())
        .await
        .map_err(BridgeError::Internal)?;

    let result = apply_all(normalized, &encoding).await;

    if let Err(e) = result {
        snapshot.rollback().await;
        for op in normalized.resource_ops.iter().rev() {
            undo_resource_op(op).await;
        }
        return Err(e);
    }

    for op in &normalized.resource_ops {
        if let Err(e) = apply_resource_op(op).await {
            snapshot.rollback().await;
            return Err(e);
        }
    }

    Ok(())
}

async fn apply_all(
    normalized: &NormalizedEdit,
    encoding: &PositionEncodingKind,
) -> Result<(), BridgeError> {
    for (path, edits) in &normalized.file_edits {
        apply_edits_to_file(path, edits.clone(), encoding)
            .await
            .map_err(BridgeError::Internal)?;
    }
    Ok(())
}

async fn apply_resource_op(op: &ResourceOperation) -> Result<(), BridgeError> {
    match op {
        ResourceOperation::Create(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| BridgeError::Internal(e.into()))?;
            }
            fs::write(path, "").await.map_err(|e| BridgeError::Internal(e.into()))?;
        }
        ResourceOperation::Rename(from, to) => {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).await.map_err(|e| BridgeError::Internal(e.into()))?;
            }
            fs::rename(from, to).await.map_err(|e| BridgeError::Internal(e.into()))?;
        }
        ResourceOperation::Delete(path) => {
            fs::remove_file(path).await.map_err(|e| BridgeError::Internal(e.into()))?;
        }
    }
    Ok(())
}

async fn undo_resource_op(op: &ResourceOperation) {
    match op {
        ResourceOperation::Rename(from, to) => {
            let _ = fs::rename(to, from).await;
        }
        ResourceOperation::Create(path) => {
            let _ = fs::remove_file(path).await;
        }
        ResourceOperation::Delete(_) => {}
    }
}

async fn apply_edits_to_file(
    path: &std::path::Path,
    mut edits: Vec<TextEdit>,
    encoding: &PositionEncodingKind,
) -> anyhow::Result<()> {
    let content = fs::read_to_string(path).await?;

    edits.sort_by(|a, b| {
        b.range
            .start
            .line
            .cmp(&a.range.start.line)
            .then(b.range.start.character.cmp(&a.range.start.character))
    });

    let mut result = content.clone();

    for edit in edits {
        let start_offset = position_to_offset(&content, edit.range.start, encoding)?;
        let end_offset = position_to_offset(&content, edit.range.end, encoding)?;

        if start_offset > end_offset {
            anyhow::bail!("invalid range: start {start_offset} > end {end_offset}");
        }

        result.replace_range(start_offset..end_offset, &edit.new_text);
    }

    fs::write(path, result).await?;
    Ok(())
}

fn position_to_offset(
    content: &str,
    position: lsp_types::Position,
    encoding: &PositionEncodingKind,
) -> anyhow::Result<usize> {
    let mut current_line = 0;
    let mut line_start_byte = 0;

    if position.line > 0 {
        let mut lines_found = 0;
        for (i, b) in content.as_bytes().iter().enumerate() {
            if *b == b'\n' {
                lines_found += 1;
                if lines_found == position.line {
                    line_start_byte = i + 1;
                    current_line = lines_found;
                    break;
                }
            }
        }
        if current_line != position.line {
            anyhow::bail!("line {} out of bounds", position.line);
        }
    }

    let line_content = &content[line_start_byte..];
    let line_end_byte = line_content
        .find('\n')
        .map_or(content.len(), |i| line_start_byte + i);
    let line_text = &content[line_start_byte..line_end_byte];

    if *encoding == PositionEncodingKind::UTF8 {
        let char_offset = position.character as usize;
        if char_offset <= line_text.len() {
            Ok(line_start_byte + char_offset)
        } else {
            anyhow::bail!(
                "character offset {} out of bounds for line {}",
                char_offset,
                position.line
            );
        }
    } else {
        let mut utf16_offset = 0;
        let mut byte_offset = 0;

        for c in line_text.chars() {
            if utf16_offset >= position.character as usize {
                break;
            }
            utf16_offset += c.len_utf16();
            byte_offset += c.len_utf8();
        }

        if utf16_offset == position.character as usize {
            Ok(line_start_byte + byte_offset)
        } else {
            anyhow::bail!("position {position:?} lands mid-surrogate-pair or out of bounds");
        }
    }
}

/// Tracks which URIs are currently being touched by an in-flight
/// `apply_atomic` call, so a second concurrent call touching any of the
/// same files is rejected with `ConcurrentEdit` rather than silently racing
/// (spec §4.6).
#[derive(Default)]
pub struct EditLockSet {
    locked: std::sync::Mutex<std::collections::HashSet<Uri>>,
}

impl EditLockSet {
    /// Attempts to lock every URI in `uris` for the duration of an edit.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ConcurrentEdit`] naming the first URI already
    /// locked by another in-flight edit; no URIs are locked in that case.
    pub fn acquire(&self, uris: &[Uri]) -> Result<EditGuard<'_>, BridgeError> {
        let mut locked = self.locked.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for uri in uris {
            if locked.contains(uri) {
                return Err(BridgeError::ConcurrentEdit {
                    uri: uri.as_str().to_string(),
                });
            }
        }
        for uri in uris {
            locked.insert(uri.clone());
        }
        Ok(EditGuard {
            set: self,
            uris: uris.to_vec(),
        })
    }
}

/// RAII guard releasing a set of locked URIs on drop.
pub struct EditGuard<'a> {
    set: &'a EditLockSet,
    uris: Vec<Uri>,
}

impl Drop for EditGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self
            .set
            .locked
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for uri in &self.uris {
            locked.remove(uri);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{Position, Range};
    use std::collections::HashMap as StdHashMap;

    fn te(sl: u32, sc: u32, el: u32, ec: u32, text: &str) -> TextEdit {
        TextEdit {
            range: Range {
                start: Position::new(sl, sc),
                end: Position::new(el, ec),
            },
            new_text: text.to_string(),
        }
    }

    #[test]
    fn detects_overlap() {
        let edits = vec![te(0, 0, 0, 5, "a"), te(0, 3, 0, 8, "b")];
        assert!(has_overlapping_edits(&edits));
    }

    #[test]
    fn non_overlapping_edits_pass() {
        let edits = vec![te(0, 0, 0, 5, "a"), te(0, 5, 0, 8, "b")];
        assert!(!has_overlapping_edits(&edits));
    }

    #[tokio::test]
    async fn apply_atomic_rolls_back_on_bad_range() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello world\n")?;

        let mut file_edits = StdHashMap::new();
        file_edits.insert(
            file.clone(),
            vec![te(99, 0, 99, 1, "x")],
        );
        let normalized = NormalizedEdit {
            file_edits,
            resource_ops: Vec::new(),
        };

        let result = apply_atomic(&normalized, PositionEncodingKind::UTF16).await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&file)?, "hello world\n");
        Ok(())
    }

    #[tokio::test]
    async fn apply_atomic_applies_valid_edit() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello world\n")?;

        let mut file_edits = StdHashMap::new();
        file_edits.insert(file.clone(), vec![te(0, 0, 0, 5, "goodbye")]);
        let normalized = NormalizedEdit {
            file_edits,
            resource_ops: Vec::new(),
        };

        apply_atomic(&normalized, PositionEncodingKind::UTF16).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file)?, "goodbye world\n");
        Ok(())
    }

    #[test]
    fn edit_lock_set_rejects_concurrent() {
        let set = EditLockSet::default();
        let uri: Uri = "file:///a.rs".parse().unwrap();
        let _guard = set.acquire(&[uri.clone()]).unwrap();
        assert!(set.acquire(&[uri]).is_err());
    }
}
