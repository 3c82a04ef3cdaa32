//! Delivers a scanner patch as a pull request from the bot's fork.
//!
//! Steps run in order and stop at the first hard failure. Side effects that
//! already happened (a fork, a rename, a push) stay in place.
//!
//! 1. Skip everything if the bot already has an open PR on the origin.
//! 2. Delete a stale bot fork named `owner_project`, if any.
//! 3. Fork the origin under the bot.
//! 4. Rename the fork to `owner_project`.
//! 5. Clone the fork into a fresh working directory.
//! 6. Apply the patch.
//! 7. Commit with the block descriptions as the message.
//! 8. Push to the fork's `master`.
//! 9. Open the PR against the origin's `master`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{ProjectLock, Scratch, Workflow, release};
use crate::diff::ProjectDiff;
use crate::editor::ProjectEditor;
use crate::errors::WorkflowError;
use crate::gateway::{NewPullRequest, PullRequestState, Repository, RepositoryEdit, RepositoryGateway};
use crate::task::{ProjectMetadata, Task};
use crate::vcs::{DEFAULT_BRANCH, VcsOperations};

/// Fixed title of every pull request the bot opens.
pub const BANNER: &str = "[patchwright] Automated Security Analysis";

#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub bot_login: String,
    /// SSH private key used to push to the bot's forks.
    pub private_key: PathBuf,
    pub ssh_host: String,
    pub title: String,
}

impl VerifySettings {
    pub fn new(bot_login: impl Into<String>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            bot_login: bot_login.into(),
            private_key: private_key.into(),
            ssh_host: "github.com".to_string(),
            title: BANNER.to_string(),
        }
    }

    pub fn with_ssh_host(mut self, host: impl Into<String>) -> Self {
        self.ssh_host = host.into();
        self
    }

    fn fork_full_name(&self, meta: &ProjectMetadata) -> String {
        format!("{}/{}", self.bot_login, meta.fork_name())
    }

    fn fork_clone_url(&self, meta: &ProjectMetadata) -> String {
        format!("git@{}:{}.git", self.ssh_host, self.fork_full_name(meta))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    PullRequestOpened { number: u64, url: Option<String> },
    /// The bot already had an open PR on the origin; nothing was touched.
    AlreadyOpen,
}

pub struct VerifyWorkflow {
    gateway: Arc<dyn RepositoryGateway>,
    vcs: Arc<dyn VcsOperations>,
    editor: Arc<dyn ProjectEditor>,
    settings: VerifySettings,
    scratch: Scratch,
    lock: Option<Arc<dyn ProjectLock>>,
}

impl VerifyWorkflow {
    pub fn new(
        gateway: Arc<dyn RepositoryGateway>,
        vcs: Arc<dyn VcsOperations>,
        editor: Arc<dyn ProjectEditor>,
        settings: VerifySettings,
        scratch: Scratch,
    ) -> Self {
        Self {
            gateway,
            vcs,
            editor,
            settings,
            scratch,
            lock: None,
        }
    }

    /// Serialize runs for the same `owner/project` through `lock`.
    pub fn with_lock(mut self, lock: Arc<dyn ProjectLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub async fn run(&self, task: &Task) -> Result<VerifyOutcome, WorkflowError> {
        let meta = &task.project_metadata;
        let diff = ProjectDiff::from_json(&task.content).map_err(WorkflowError::InvalidPatch)?;
        if diff.is_empty() {
            return Err(WorkflowError::EmptyPatch);
        }

        let _guard = match &self.lock {
            Some(lock) => Some(lock.acquire(&meta.origin_slug()).await),
            None => None,
        };

        if self.has_open_pull_request(meta).await {
            tracing::info!(guid = %meta.guid, project = %meta.project_full_name, "Bot already has an open pull request; skipping");
            return Ok(VerifyOutcome::AlreadyOpen);
        }

        self.remove_stale_fork(meta).await;
        let forked = self.fork_origin(meta).await?;
        self.rename_fork(meta, forked).await?;

        let dir = self.scratch.create()?;
        let result = self.deliver(meta, &diff, dir.path()).await;
        release(dir, &meta.guid);
        result
    }

    /// A failed listing counts as "no PR"; the check only guards against
    /// duplicates.
    async fn has_open_pull_request(&self, meta: &ProjectMetadata) -> bool {
        let listed = self
            .gateway
            .list_pull_requests(&meta.owner_name, &meta.project_name, PullRequestState::Open)
            .await;
        match listed {
            Ok(prs) => prs.iter().any(|pr| pr.user.login == self.settings.bot_login),
            Err(e) => {
                tracing::warn!(guid = %meta.guid, project = %meta.project_full_name, error = %e, "Could not list pull requests; assuming none are open");
                false
            }
        }
    }

    /// Best effort: failures are logged and the workflow carries on.
    async fn remove_stale_fork(&self, meta: &ProjectMetadata) {
        let existing = match self
            .gateway
            .get_repository(&self.settings.bot_login, &meta.fork_name())
            .await
        {
            Ok(Some(repo)) if repo.fork => repo,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(guid = %meta.guid, fork = %self.settings.fork_full_name(meta), error = %e, "Could not look up existing fork");
                return;
            }
        };
        tracing::info!(guid = %meta.guid, fork = %existing.full_name, "Deleting stale fork");
        if let Err(e) = self.gateway.delete_repository(&existing).await {
            tracing::warn!(guid = %meta.guid, fork = %existing.full_name, error = %e, "Failed to delete stale fork");
        }
    }

    /// Returns the new fork, or `None` when the origin is itself a fork and
    /// was left alone.
    async fn fork_origin(&self, meta: &ProjectMetadata) -> Result<Option<Repository>, WorkflowError> {
        let origin_slug = meta.origin_slug();
        let origin = self
            .gateway
            .get_repository(&meta.owner_name, &meta.project_name)
            .await
            .map_err(|source| WorkflowError::ForkFailed {
                repo: origin_slug.clone(),
                source,
            })?
            .ok_or_else(|| WorkflowError::OriginNotFound(origin_slug.clone()))?;

        if origin.fork {
            tracing::info!(guid = %meta.guid, origin = %origin_slug, "Origin is itself a fork; not forking");
            return Ok(None);
        }

        let fork = self
            .gateway
            .fork_repository(&origin)
            .await
            .map_err(|source| WorkflowError::ForkFailed {
                repo: origin_slug.clone(),
                source,
            })?;
        tracing::info!(guid = %meta.guid, origin = %origin_slug, fork = %fork.full_name, "Forked");
        Ok(Some(fork))
    }

    async fn rename_fork(
        &self,
        meta: &ProjectMetadata,
        forked: Option<Repository>,
    ) -> Result<(), WorkflowError> {
        let bot = &self.settings.bot_login;
        let candidate = match forked {
            Some(repo) => Some(repo),
            None => self
                .gateway
                .get_repository(bot, &meta.project_name)
                .await
                .map_err(|source| WorkflowError::RenameFailed {
                    repo: format!("{}/{}", bot, meta.project_name),
                    source,
                })?,
        };

        let target = meta.fork_name();
        let Some(repo) = candidate.filter(|r| r.fork && &r.owner.login == bot) else {
            tracing::info!(guid = %meta.guid, "No bot fork to rename");
            return Ok(());
        };
        if repo.name == target {
            return Ok(());
        }

        let renamed = self
            .gateway
            .edit_repository(&repo, &RepositoryEdit::rename(&target))
            .await
            .map_err(|source| WorkflowError::RenameFailed {
                repo: repo.full_name.clone(),
                source,
            })?;
        tracing::info!(guid = %meta.guid, from = %repo.full_name, to = %renamed.full_name, "Renamed fork");
        Ok(())
    }

    /// Steps 5 through 9, inside `workdir`.
    async fn deliver(
        &self,
        meta: &ProjectMetadata,
        diff: &ProjectDiff,
        workdir: &Path,
    ) -> Result<VerifyOutcome, WorkflowError> {
        let checkout = self
            .vcs
            .clone_repo(workdir, &self.settings.fork_clone_url(meta))
            .await
            .map_err(WorkflowError::CloneFailed)?;
        if !checkout.is_dir() {
            return Err(WorkflowError::CloneProducedNoWorkdir(checkout));
        }

        let editor = Arc::clone(&self.editor);
        let (patch, root) = (diff.clone(), checkout.clone());
        tokio::task::spawn_blocking(move || editor.edit(&patch, &root))
            .await
            .map_err(|source| WorkflowError::Blocking {
                step: "edit",
                source,
            })?
            .map_err(|source| WorkflowError::EditFailed {
                path: checkout.clone(),
                source,
            })?;

        let message = diff.describe();
        self.vcs
            .commit(workdir, &message)
            .await
            .map_err(WorkflowError::CommitFailed)?;
        self.vcs
            .push(workdir, &self.settings.fork_full_name(meta), &self.settings.private_key)
            .await
            .map_err(WorkflowError::PushFailed)?;

        let request = NewPullRequest {
            title: self.settings.title.clone(),
            head: format!("{}:{}", self.settings.bot_login, DEFAULT_BRANCH),
            base: DEFAULT_BRANCH.to_string(),
            body: message,
        };
        let pr = self
            .gateway
            .create_pull_request(&meta.owner_name, &meta.project_name, &request)
            .await
            .map_err(|source| WorkflowError::PullRequestFailed {
                repo: meta.origin_slug(),
                source,
            })?;
        tracing::info!(guid = %meta.guid, project = %meta.project_full_name, number = pr.number, "Opened pull request");

        Ok(VerifyOutcome::PullRequestOpened {
            number: pr.number,
            url: pr.html_url,
        })
    }
}

#[async_trait]
impl Workflow for VerifyWorkflow {
    fn name(&self) -> &'static str {
        "verify"
    }

    async fn process(&self, task: Task) {
        match self.run(&task).await {
            Ok(outcome) => {
                tracing::debug!(guid = %task.guid(), ?outcome, "Verify workflow finished");
            }
            Err(e) => {
                tracing::error!(guid = %task.guid(), project = %task.project_metadata.project_full_name, error = %e, "Verify workflow failed; task dropped");
            }
        }
    }
}
