//! Structured patch produced by the scanner and carried on `VERIFY_RESULTS`.

use serde::{Deserialize, Serialize};

/// Separator between block descriptions in commit messages and PR bodies.
pub const DESCRIPTION_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDiff {
    #[serde(default)]
    pub file_diffs: Vec<FileDiff>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub relative_path: String,
    #[serde(default)]
    pub block_diffs: Vec<BlockDiff>,
}

/// Replace the 1-based inclusive line range `start_line..=end_line` with
/// `replacement`. `end_line == start_line - 1` inserts before `start_line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDiff {
    pub description: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub replacement: Vec<String>,
}

impl ProjectDiff {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Every block description in patch order, joined by a blank line.
    ///
    /// Used verbatim as both the commit message and the pull-request body.
    pub fn describe(&self) -> String {
        self.file_diffs
            .iter()
            .flat_map(|f| f.block_diffs.iter())
            .map(|b| b.description.as_str())
            .collect::<Vec<_>>()
            .join(DESCRIPTION_SEPARATOR)
    }

    pub fn block_count(&self) -> usize {
        self.file_diffs.iter().map(|f| f.block_diffs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.block_count() == 0
    }
}
