//! Typed error hierarchy for patchwright.
//!
//! One enum per layer:
//! - `VcsError`: external `git` invocations
//! - `GatewayError`: hosting-platform REST calls
//! - `QueueError`: broker push/pop
//! - `DispatchError`: channel/workflow binding at startup
//! - `WorkflowError`: a workflow step that aborted the rest of its task

use std::path::PathBuf;

use thiserror::Error;

use crate::task::Channel;

/// Errors from running an external version-control command.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {operation} exited with status {code:?}")]
    NonZeroExit {
        operation: &'static str,
        code: Option<i32>,
        output: String,
    },

    #[error("Working directory {path} is not usable: {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the hosting-platform API.
///
/// A 404 on a lookup never reaches this type: it maps to `Ok(None)`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Request to hosting platform failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hosting platform returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,
}

/// Errors raised while binding workflows to channels, before any loop starts.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Channel {0} already has a workflow registered")]
    DuplicateRegistration(Channel),

    #[error("Channel {0} is required but has no workflow registered")]
    Unbound(Channel),

    #[error("No workflows registered; refusing to start")]
    NothingRegistered,
}

/// A workflow step failed and the remainder of the task was skipped.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Failed to create temporary working directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("Clone failed: {0}")]
    CloneFailed(#[source] VcsError),

    #[error("Clone did not produce a usable directory at {0}")]
    CloneProducedNoWorkdir(PathBuf),

    #[error("Failed to package {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to enqueue onto {channel}: {source}")]
    Enqueue {
        channel: Channel,
        #[source]
        source: QueueError,
    },

    #[error("Task content is not a valid patch: {0}")]
    InvalidPatch(#[source] serde_json::Error),

    #[error("Patch contains no edits")]
    EmptyPatch,

    #[error("Origin repository {0} not found")]
    OriginNotFound(String),

    #[error("Fork of {repo} failed: {source}")]
    ForkFailed {
        repo: String,
        #[source]
        source: GatewayError,
    },

    #[error("Rename of {repo} failed: {source}")]
    RenameFailed {
        repo: String,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to apply edits to {path}: {source}")]
    EditFailed {
        path: PathBuf,
        #[source]
        source: crate::editor::EditError,
    },

    #[error("Commit failed: {0}")]
    CommitFailed(#[source] VcsError),

    #[error("Push failed: {0}")]
    PushFailed(#[source] VcsError),

    #[error("Pull request creation on {repo} failed: {source}")]
    PullRequestFailed {
        repo: String,
        #[source]
        source: GatewayError,
    },

    #[error("Blocking {step} step did not complete: {source}")]
    Blocking {
        step: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}
