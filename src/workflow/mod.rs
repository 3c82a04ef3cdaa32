//! Channel-bound task processors.
//!
//! ```text
//! CLONE_REQUEST ──> clone::CloneWorkflow ──> SCAN_REQUEST ──> (scanner)
//!                                                                 │
//! VERIFY_RESULTS <────────────────────────────────────────────────┘
//!       │
//!       └──> verify::VerifyWorkflow ──> fork / clone / edit / commit / push / PR
//! ```
//!
//! A workflow owns every failure of the task it is given: errors are logged
//! and the task is dropped. Nothing is retried or redelivered.

pub mod clone;
pub mod lock;
pub mod verify;

use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::errors::WorkflowError;
use crate::task::Task;

pub use clone::CloneWorkflow;
pub use lock::{InProcessLocks, ProjectGuard, ProjectLock};
pub use verify::{VerifyOutcome, VerifySettings, VerifyWorkflow};

#[async_trait]
pub trait Workflow: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Process one task to completion. Never panics on task-level failures.
    async fn process(&self, task: Task);
}

/// Allocates per-task temporary working directories.
///
/// Each directory is owned by the task that created it and is removed when the
/// returned `TempDir` is dropped or closed, on success and failure alike.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    root: Option<PathBuf>,
}

impl Scratch {
    /// Directories are created under `root`, or the system temp dir when `None`.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn create(&self) -> Result<TempDir, WorkflowError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("patchwright-");
        let dir = match &self.root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(WorkflowError::TempDir)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };
        dir.map_err(WorkflowError::TempDir)
    }
}

/// Remove a working directory, logging rather than failing if that goes wrong.
pub(crate) fn release(dir: TempDir, guid: &str) {
    let path = dir.path().to_path_buf();
    tracing::debug!(guid, path = %path.display(), "Removing working directory");
    if let Err(e) = dir.close() {
        tracing::warn!(guid, path = %path.display(), error = %e, "Failed to remove working directory");
    }
}
