//! Task envelope and channel routing keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue topics. Purely a routing key: the dispatcher never looks inside a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    CloneRequest,
    ScanRequest,
    VerifyResults,
}

impl Channel {
    pub const ALL: [Channel; 3] = [
        Channel::CloneRequest,
        Channel::ScanRequest,
        Channel::VerifyResults,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CloneRequest => "CLONE_REQUEST",
            Self::ScanRequest => "SCAN_REQUEST",
            Self::VerifyResults => "VERIFY_RESULTS",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLONE_REQUEST" => Ok(Self::CloneRequest),
            "SCAN_REQUEST" => Ok(Self::ScanRequest),
            "VERIFY_RESULTS" => Ok(Self::VerifyResults),
            _ => Err(format!("Invalid channel: {}", s)),
        }
    }
}

/// Identity of one unit of work and the upstream repository it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub guid: String,
    pub git_repo_url: String,
    pub owner_name: String,
    pub project_name: String,
    pub project_full_name: String,
    pub timestamp: DateTime<Utc>,
}

impl ProjectMetadata {
    /// Metadata for a brand-new task with a fresh guid and the current time.
    pub fn new(
        git_repo_url: impl Into<String>,
        owner_name: impl Into<String>,
        project_name: impl Into<String>,
        project_full_name: impl Into<String>,
    ) -> Self {
        Self {
            guid: Uuid::new_v4().to_string(),
            git_repo_url: git_repo_url.into(),
            owner_name: owner_name.into(),
            project_name: project_name.into(),
            project_full_name: project_full_name.into(),
            timestamp: Utc::now(),
        }
    }

    /// A stage transition: same subject repository, new task identity.
    pub fn renew(&self) -> Self {
        Self {
            guid: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    /// Name of the bot-owned fork, `owner_project`. Keeps forks of
    /// same-named projects from different owners apart.
    pub fn fork_name(&self) -> String {
        format!("{}_{}", self.owner_name, self.project_name)
    }

    /// `owner/project` of the upstream repository.
    pub fn origin_slug(&self) -> String {
        format!("{}/{}", self.owner_name, self.project_name)
    }
}

/// A routed unit of work. `content` is opaque here; only the workflow bound to
/// the task's channel knows how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub project_metadata: ProjectMetadata,
    #[serde(default)]
    pub content: Vec<u8>,
}

impl Task {
    pub fn new(project_metadata: ProjectMetadata, content: Vec<u8>) -> Self {
        Self {
            project_metadata,
            content,
        }
    }

    pub fn guid(&self) -> &str {
        &self.project_metadata.guid
    }
}
