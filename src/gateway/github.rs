use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};

use super::{
    NewPullRequest, PullRequest, PullRequestState, Repository, RepositoryEdit, RepositoryGateway,
};
use crate::errors::GatewayError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "patchwright";
const PER_PAGE: usize = 100;

/// GitHub REST v3 client authenticated as the bot identity.
#[derive(Clone)]
pub struct GitHubGateway {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for GitHubGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubGateway")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl GitHubGateway {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn repo_url(&self, owner: &str, name: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, owner, name)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", USER_AGENT)
    }
}

/// Turn a non-2xx response into `GatewayError::Status`, keeping the body's
/// `message` when GitHub sends one.
async fn check(resp: Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(text);
    Err(GatewayError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RepositoryGateway for GitHubGateway {
    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, GatewayError> {
        let resp = self
            .request(Method::GET, &self.repo_url(owner, name))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(resp).await?.json().await?))
    }

    async fn fork_repository(&self, repo: &Repository) -> Result<Repository, GatewayError> {
        let url = format!("{}/forks", self.repo_url(&repo.owner.login, &repo.name));
        let resp = self
            .request(Method::POST, &url)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn edit_repository(
        &self,
        repo: &Repository,
        edit: &RepositoryEdit,
    ) -> Result<Repository, GatewayError> {
        let resp = self
            .request(Method::PATCH, &self.repo_url(&repo.owner.login, &repo.name))
            .json(edit)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn delete_repository(&self, repo: &Repository) -> Result<(), GatewayError> {
        let resp = self
            .request(Method::DELETE, &self.repo_url(&repo.owner.login, &repo.name))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Paginates through all pages automatically.
    async fn list_pull_requests(
        &self,
        owner: &str,
        name: &str,
        state: PullRequestState,
    ) -> Result<Vec<PullRequest>, GatewayError> {
        let url = format!("{}/pulls", self.repo_url(owner, name));
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let resp = self
                .request(Method::GET, &url)
                .query(&[
                    ("state", state.as_str()),
                    ("per_page", &PER_PAGE.to_string()),
                    ("page", &page.to_string()),
                ])
                .send()
                .await?;
            let batch: Vec<PullRequest> = check(resp).await?.json().await?;
            let count = batch.len();
            all.extend(batch);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        name: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GatewayError> {
        let url = format!("{}/pulls", self.repo_url(owner, name));
        let resp = self.request(Method::POST, &url).json(pr).send().await?;
        Ok(check(resp).await?.json().await?)
    }
}
