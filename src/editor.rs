//! Applies a `ProjectDiff` to a checked-out tree.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::diff::{BlockDiff, FileDiff, ProjectDiff};

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Path {0} escapes the project tree")]
    PathEscapesTree(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Block {start}..={end} is outside {path} ({len} lines)")]
    OutOfRange {
        path: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Blocks overlap in {path} at line {line}")]
    Overlap { path: String, line: usize },
}

/// Writes patch edits into a working tree.
pub trait ProjectEditor: Send + Sync {
    fn edit(&self, diff: &ProjectDiff, root: &Path) -> Result<(), EditError>;
}

/// Line-range replacement editor.
///
/// Every file is validated in full before it is written, so a bad block never
/// leaves a half-edited file behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineEditor;

impl ProjectEditor for LineEditor {
    fn edit(&self, diff: &ProjectDiff, root: &Path) -> Result<(), EditError> {
        for file in &diff.file_diffs {
            let path = resolve(root, &file.relative_path)?;
            let original = std::fs::read_to_string(&path).map_err(|source| EditError::Read {
                path: path.clone(),
                source,
            })?;
            let edited = apply_blocks(file, &original)?;
            std::fs::write(&path, edited).map_err(|source| EditError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::info!(path = %file.relative_path, blocks = file.block_diffs.len(), "Wrote changes");
        }
        Ok(())
    }
}

fn resolve(root: &Path, relative: &str) -> Result<PathBuf, EditError> {
    let rel = Path::new(relative);
    let clean = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || !clean {
        return Err(EditError::PathEscapesTree(relative.to_string()));
    }
    Ok(root.join(rel))
}

/// Apply every block of `file` to `content`, bottom-up so that line numbers in
/// the patch always refer to the original text.
fn apply_blocks(file: &FileDiff, content: &str) -> Result<String, EditError> {
    let eol = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let body = content.strip_suffix(eol);
    let trailing_newline = body.is_some();
    let body = body.unwrap_or(content);
    let mut lines: Vec<String> = if body.is_empty() && !trailing_newline {
        Vec::new()
    } else {
        body.split(eol).map(str::to_string).collect()
    };
    let len = lines.len();

    // Bottom-up; on a shared start line the replacement goes before the insertion.
    let mut blocks: Vec<&BlockDiff> = file.block_diffs.iter().collect();
    blocks.sort_by(|a, b| {
        b.start_line
            .cmp(&a.start_line)
            .then(b.end_line.cmp(&a.end_line))
    });

    let mut floor = usize::MAX;
    for block in blocks {
        let (start, end) = (block.start_line, block.end_line);
        if start == 0 || end < start - 1 || end > len {
            return Err(EditError::OutOfRange {
                path: file.relative_path.clone(),
                start,
                end,
                len,
            });
        }
        if end >= floor {
            return Err(EditError::Overlap {
                path: file.relative_path.clone(),
                line: end,
            });
        }
        lines.splice(start - 1..end, block.replacement.iter().cloned());
        floor = start;
    }

    let mut out = lines.join(eol);
    if trailing_newline && !lines.is_empty() {
        out.push_str(eol);
    }
    Ok(out)
}
