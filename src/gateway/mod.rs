//! Hosting-platform operations the verify workflow depends on.
//!
//! `RepositoryGateway` is the seam; `GitHubGateway` is the REST
//! implementation. Lookups that hit a 404 return `Ok(None)` rather than an
//! error, since "does not exist" is an expected answer to the idempotency
//! checks.

pub mod github;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

pub use github::GitHubGateway;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
}

/// A repository (subset of fields we care about).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: Account,
    #[serde(default)]
    pub fork: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMarker {
    pub label: String,
}

/// A pull request (subset of fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: PullRequestState,
    pub user: Account,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub head: Option<BranchMarker>,
    #[serde(default)]
    pub base: Option<BranchMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    /// `owner:branch` of the branch holding the changes.
    pub head: String,
    /// Branch on the target repository to merge into.
    pub base: String,
    pub body: String,
}

/// Fields to change on a repository. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RepositoryEdit {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
}

impl PullRequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    async fn get_repository(&self, owner: &str, name: &str)
    -> Result<Option<Repository>, GatewayError>;

    async fn fork_repository(&self, repo: &Repository) -> Result<Repository, GatewayError>;

    async fn edit_repository(
        &self,
        repo: &Repository,
        edit: &RepositoryEdit,
    ) -> Result<Repository, GatewayError>;

    async fn delete_repository(&self, repo: &Repository) -> Result<(), GatewayError>;

    async fn list_pull_requests(
        &self,
        owner: &str,
        name: &str,
        state: PullRequestState,
    ) -> Result<Vec<PullRequest>, GatewayError>;

    async fn create_pull_request(
        &self,
        owner: &str,
        name: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GatewayError>;
}
