use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Scratch, Workflow, release};
use crate::archive;
use crate::errors::WorkflowError;
use crate::queue::TaskQueue;
use crate::task::{Channel, Task};
use crate::vcs::{CHECKOUT_DIR, VcsOperations};

const ARCHIVE_NAME: &str = "code.tar.gz";

/// Clones the repository named by a CLONE_REQUEST task and forwards the
/// packaged source on SCAN_REQUEST.
pub struct CloneWorkflow {
    vcs: Arc<dyn VcsOperations>,
    queue: Arc<dyn TaskQueue>,
    scratch: Scratch,
}

impl CloneWorkflow {
    pub fn new(vcs: Arc<dyn VcsOperations>, queue: Arc<dyn TaskQueue>, scratch: Scratch) -> Self {
        Self {
            vcs,
            queue,
            scratch,
        }
    }

    /// Run every step, returning the first failure. The working directory is
    /// removed before this returns, whatever the outcome.
    pub async fn run(&self, task: &Task) -> Result<(), WorkflowError> {
        let dir = self.scratch.create()?;
        let result = self.package_and_forward(task, dir.path()).await;
        release(dir, task.guid());
        result
    }

    async fn package_and_forward(&self, task: &Task, workdir: &Path) -> Result<(), WorkflowError> {
        let meta = &task.project_metadata;
        tracing::info!(guid = %meta.guid, repo = %meta.git_repo_url, "Cloning");

        let checkout = self
            .vcs
            .clone_repo(workdir, &meta.git_repo_url)
            .await
            .map_err(WorkflowError::CloneFailed)?;
        if !checkout.is_dir() {
            return Err(WorkflowError::CloneProducedNoWorkdir(checkout));
        }

        let tarball = workdir.join(ARCHIVE_NAME);
        let (src, dest) = (checkout.clone(), tarball.clone());
        tokio::task::spawn_blocking(move || archive::compress_dir(&src, &dest, CHECKOUT_DIR))
            .await
            .map_err(|source| WorkflowError::Blocking {
                step: "archive",
                source,
            })?
            .map_err(|source| WorkflowError::Archive {
                path: checkout.clone(),
                source,
            })?;

        let bytes = tokio::fs::read(&tarball)
            .await
            .map_err(|source| WorkflowError::Archive {
                path: tarball.clone(),
                source,
            })?;

        let forwarded = Task::new(meta.renew(), bytes);
        tracing::info!(
            guid = %meta.guid,
            next_guid = %forwarded.guid(),
            bytes = forwarded.content.len(),
            channel = %Channel::ScanRequest,
            "Forwarding packaged source"
        );
        self.queue
            .push(Channel::ScanRequest, forwarded)
            .await
            .map_err(|source| WorkflowError::Enqueue {
                channel: Channel::ScanRequest,
                source,
            })
    }
}

#[async_trait]
impl Workflow for CloneWorkflow {
    fn name(&self) -> &'static str {
        "clone"
    }

    async fn process(&self, task: Task) {
        if let Err(e) = self.run(&task).await {
            tracing::error!(guid = %task.guid(), project = %task.project_metadata.project_full_name, error = %e, "Clone workflow failed; task dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::testing::{FakeVcs, VcsCall, metadata};
    use tempfile::TempDir;

    struct Harness {
        root: TempDir,
        queue: Arc<MemoryQueue>,
        vcs: Arc<FakeVcs>,
        workflow: CloneWorkflow,
    }

    fn harness(vcs: FakeVcs) -> Harness {
        let root = TempDir::new().unwrap();
        let queue = Arc::new(MemoryQueue::new());
        let vcs = Arc::new(vcs);
        let workflow = CloneWorkflow::new(
            vcs.clone(),
            queue.clone(),
            Scratch::new(Some(root.path().to_path_buf())),
        );
        Harness {
            root,
            queue,
            vcs,
            workflow,
        }
    }

    fn leftover(root: &TempDir) -> usize {
        std::fs::read_dir(root.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_success_forwards_one_renewed_task_with_archive() {
        let h = harness(FakeVcs::new().with_file("src/App.java", "class App {}\n"));
        let task = Task::new(metadata(), Vec::new());

        h.workflow.process(task.clone()).await;

        let forwarded = h.queue.snapshot(Channel::ScanRequest);
        assert_eq!(forwarded.len(), 1);
        let out = &forwarded[0];
        assert_ne!(out.guid(), task.guid());
        assert_eq!(out.project_metadata.owner_name, "acme");
        assert_eq!(out.project_metadata.project_full_name, "acme/app");
        assert_eq!(&out.content[..2], &[0x1f, 0x8b], "gzip magic");

        let unpacked = TempDir::new().unwrap();
        archive::extract_bytes(&out.content, unpacked.path()).unwrap();
        let body = std::fs::read_to_string(unpacked.path().join("code/src/App.java")).unwrap();
        assert_eq!(body, "class App {}\n");

        assert_eq!(leftover(&h.root), 0, "working directory should be removed");
    }

    #[tokio::test]
    async fn test_clone_uses_task_repo_url() {
        let h = harness(FakeVcs::new().with_file("README", "hi"));
        h.workflow.run(&Task::new(metadata(), Vec::new())).await.unwrap();
        match &h.vcs.calls()[0] {
            VcsCall::Clone { url, .. } => assert_eq!(url, "git@github.com:acme/app.git"),
            other => panic!("Expected clone, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clone_failure_forwards_nothing() {
        let h = harness(FakeVcs::new().failing("clone"));
        let err = h.workflow.run(&Task::new(metadata(), Vec::new())).await.unwrap_err();
        assert!(matches!(err, WorkflowError::CloneFailed(_)));
        assert_eq!(h.queue.len(Channel::ScanRequest).await, 0);
        assert_eq!(leftover(&h.root), 0);
    }

    #[tokio::test]
    async fn test_missing_checkout_is_reported() {
        let h = harness(FakeVcs::new().without_checkout());
        let err = h.workflow.run(&Task::new(metadata(), Vec::new())).await.unwrap_err();
        assert!(matches!(err, WorkflowError::CloneProducedNoWorkdir(_)));
        assert_eq!(h.queue.len(Channel::ScanRequest).await, 0);
    }

    #[tokio::test]
    async fn test_closed_queue_is_an_enqueue_error() {
        let h = harness(FakeVcs::new().with_file("README", "hi"));
        h.queue.close();
        let err = h.workflow.run(&Task::new(metadata(), Vec::new())).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Enqueue {
                channel: Channel::ScanRequest,
                ..
            }
        ));
        assert_eq!(leftover(&h.root), 0);
    }
}
