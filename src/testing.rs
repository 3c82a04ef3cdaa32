//! In-memory doubles for the gateway and VCS seams, shared by unit tests.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::errors::{GatewayError, VcsError};
use crate::gateway::{
    Account, NewPullRequest, PullRequest, PullRequestState, Repository, RepositoryEdit,
    RepositoryGateway,
};
use crate::task::{ProjectMetadata, Task};
use crate::vcs::{CHECKOUT_DIR, VcsOperations};

pub const BOT: &str = "manna-bot";

pub fn metadata() -> ProjectMetadata {
    ProjectMetadata::new("git@github.com:acme/app.git", "acme", "app", "acme/app")
}

pub fn task_with(content: &[u8]) -> Task {
    Task::new(metadata(), content.to_vec())
}

pub fn repository(owner: &str, name: &str, fork: bool) -> Repository {
    Repository {
        name: name.to_string(),
        full_name: format!("{}/{}", owner, name),
        owner: Account {
            login: owner.to_string(),
        },
        fork,
    }
}

fn key(owner: &str, name: &str) -> (String, String) {
    (owner.to_string(), name.to_string())
}

#[derive(Default)]
struct HostState {
    repos: BTreeMap<(String, String), Repository>,
    /// bot repo -> origin `owner/name` it was forked from
    parents: BTreeMap<(String, String), String>,
    pulls: BTreeMap<(String, String), Vec<PullRequest>>,
    next_number: u64,
}

/// A hosting platform held in memory. Records every call by operation name.
pub struct FakeGateway {
    bot: String,
    state: Mutex<HostState>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    list_barrier: Option<Arc<Barrier>>,
}

pub const MUTATIONS: [&str; 4] = ["fork", "edit", "delete", "create_pull_request"];

impl FakeGateway {
    pub fn new(bot: &str) -> Self {
        Self {
            bot: bot.to_string(),
            state: Mutex::new(HostState {
                next_number: 1,
                ..HostState::default()
            }),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            list_barrier: None,
        }
    }

    /// Every `list_pull_requests` call waits on `barrier` before reading.
    pub fn with_list_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.list_barrier = Some(barrier);
        self
    }

    pub fn add_repo(&self, owner: &str, name: &str, fork: bool) {
        let mut state = self.state.lock().unwrap();
        state.repos.insert(key(owner, name), repository(owner, name, fork));
    }

    /// A bot-owned fork of `origin` named `name`.
    pub fn add_fork(&self, name: &str, origin: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .insert(key(&self.bot, name), repository(&self.bot, name, true));
        state.parents.insert(key(&self.bot, name), origin.to_string());
    }

    pub fn add_open_pr(&self, owner: &str, name: &str, author: &str) {
        let mut state = self.state.lock().unwrap();
        let number = state.next_number;
        state.next_number += 1;
        state.pulls.entry(key(owner, name)).or_default().push(PullRequest {
            number,
            title: "existing".to_string(),
            body: None,
            state: PullRequestState::Open,
            user: Account {
                login: author.to_string(),
            },
            html_url: None,
            head: None,
            base: None,
        });
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATIONS.iter().any(|m| c.starts_with(&format!("{} ", m))))
            .collect()
    }

    pub fn pulls(&self, owner: &str, name: &str) -> Vec<PullRequest> {
        let state = self.state.lock().unwrap();
        state.pulls.get(&key(owner, name)).cloned().unwrap_or_default()
    }

    pub fn repo(&self, owner: &str, name: &str) -> Option<Repository> {
        self.state.lock().unwrap().repos.get(&key(owner, name)).cloned()
    }

    /// Names of bot-owned repositories forked from `origin`.
    pub fn forks_of(&self, origin: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .parents
            .iter()
            .filter(|(k, parent)| parent.as_str() == origin && state.repos.contains_key(*k))
            .map(|((_, name), _)| name.clone())
            .collect()
    }

    fn record(&self, operation: &'static str, target: String) -> Result<(), GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, target));
        if self.failing.lock().unwrap().contains(operation) {
            return Err(GatewayError::Status {
                status: 500,
                message: format!("{} failed", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryGateway for FakeGateway {
    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, GatewayError> {
        self.record("get", format!("{}/{}", owner, name))?;
        Ok(self.repo(owner, name))
    }

    async fn fork_repository(&self, repo: &Repository) -> Result<Repository, GatewayError> {
        self.record("fork", repo.full_name.clone())?;
        let mut state = self.state.lock().unwrap();
        let mut name = repo.name.clone();
        let mut suffix = 1;
        while state.repos.contains_key(&key(&self.bot, &name)) {
            name = format!("{}-{}", repo.name, suffix);
            suffix += 1;
        }
        let fork = repository(&self.bot, &name, true);
        state.repos.insert(key(&self.bot, &name), fork.clone());
        state.parents.insert(key(&self.bot, &name), repo.full_name.clone());
        Ok(fork)
    }

    async fn edit_repository(
        &self,
        repo: &Repository,
        edit: &RepositoryEdit,
    ) -> Result<Repository, GatewayError> {
        self.record("edit", repo.full_name.clone())?;
        let mut state = self.state.lock().unwrap();
        let old = key(&repo.owner.login, &repo.name);
        let mut current = state.repos.remove(&old).ok_or_else(|| GatewayError::Status {
            status: 404,
            message: format!("{} not found", repo.full_name),
        })?;
        if let Some(new_name) = &edit.name {
            current.name = new_name.clone();
            current.full_name = format!("{}/{}", current.owner.login, new_name);
        }
        let new = key(&current.owner.login, &current.name);
        if let Some(parent) = state.parents.remove(&old) {
            state.parents.insert(new.clone(), parent);
        }
        state.repos.insert(new, current.clone());
        Ok(current)
    }

    async fn delete_repository(&self, repo: &Repository) -> Result<(), GatewayError> {
        self.record("delete", repo.full_name.clone())?;
        let mut state = self.state.lock().unwrap();
        let k = key(&repo.owner.login, &repo.name);
        state.repos.remove(&k);
        state.parents.remove(&k);
        Ok(())
    }

    async fn list_pull_requests(
        &self,
        owner: &str,
        name: &str,
        state: PullRequestState,
    ) -> Result<Vec<PullRequest>, GatewayError> {
        self.record("list_pull_requests", format!("{}/{}", owner, name))?;
        if let Some(barrier) = &self.list_barrier {
            barrier.wait().await;
        }
        Ok(self
            .pulls(owner, name)
            .into_iter()
            .filter(|pr| pr.state == state)
            .collect())
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        name: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GatewayError> {
        self.record("create_pull_request", format!("{}/{}", owner, name))?;
        let mut state = self.state.lock().unwrap();
        let number = state.next_number;
        state.next_number += 1;
        let created = PullRequest {
            number,
            title: pr.title.clone(),
            body: Some(pr.body.clone()),
            state: PullRequestState::Open,
            user: Account {
                login: self.bot.clone(),
            },
            html_url: Some(format!("https://example.test/{}/{}/pull/{}", owner, name, number)),
            head: Some(crate::gateway::BranchMarker {
                label: pr.head.clone(),
            }),
            base: Some(crate::gateway::BranchMarker {
                label: pr.base.clone(),
            }),
        };
        state.pulls.entry(key(owner, name)).or_default().push(created.clone());
        Ok(created)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    Clone {
        workdir: PathBuf,
        url: String,
    },
    Commit {
        workdir: PathBuf,
        message: String,
        /// Contents of the seeded files at commit time.
        tree: BTreeMap<String, String>,
    },
    Push {
        workdir: PathBuf,
        remote: String,
        credential: PathBuf,
    },
}

/// Fake `git`: clone materializes `seed` files under `<workdir>/code`.
#[derive(Default)]
pub struct FakeVcs {
    seed: Vec<(String, String)>,
    failing: HashSet<&'static str>,
    clone_without_checkout: bool,
    calls: Mutex<Vec<VcsCall>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.seed.push((path.to_string(), content.to_string()));
        self
    }

    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Clone reports success but leaves no checkout behind.
    pub fn without_checkout(mut self) -> Self {
        self.clone_without_checkout = true;
        self
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, operation: &'static str) -> Result<(), VcsError> {
        if self.failing.contains(operation) {
            return Err(VcsError::NonZeroExit {
                operation,
                code: Some(128),
                output: format!("fatal: {} failed", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VcsOperations for FakeVcs {
    async fn clone_repo(&self, workdir: &Path, remote_url: &str) -> Result<PathBuf, VcsError> {
        self.calls.lock().unwrap().push(VcsCall::Clone {
            workdir: workdir.to_path_buf(),
            url: remote_url.to_string(),
        });
        self.check("clone")?;
        let checkout = workdir.join(CHECKOUT_DIR);
        if self.clone_without_checkout {
            return Ok(checkout);
        }
        for (path, content) in &self.seed {
            let target = checkout.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).expect("create seed dir");
            }
            std::fs::write(&target, content).expect("write seed file");
        }
        std::fs::create_dir_all(&checkout).expect("create checkout");
        Ok(checkout)
    }

    async fn commit(&self, workdir: &Path, message: &str) -> Result<(), VcsError> {
        let checkout = workdir.join(CHECKOUT_DIR);
        let tree = self
            .seed
            .iter()
            .map(|(path, _)| {
                let content = std::fs::read_to_string(checkout.join(path)).unwrap_or_default();
                (path.clone(), content)
            })
            .collect();
        self.calls.lock().unwrap().push(VcsCall::Commit {
            workdir: workdir.to_path_buf(),
            message: message.to_string(),
            tree,
        });
        self.check("commit")
    }

    async fn push(
        &self,
        workdir: &Path,
        remote_full_name: &str,
        credential: &Path,
    ) -> Result<(), VcsError> {
        self.calls.lock().unwrap().push(VcsCall::Push {
            workdir: workdir.to_path_buf(),
            remote: remote_full_name.to_string(),
            credential: credential.to_path_buf(),
        });
        self.check("push")
    }
}
