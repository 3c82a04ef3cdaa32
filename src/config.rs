//! `patchwright.toml` loading, layered file → environment → CLI.
//!
//! Every section is optional; a missing file yields the defaults. The bot
//! token and private key are normally supplied through the environment (or a
//! `.env` file) rather than written into the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::gateway::github::DEFAULT_API_BASE;
use crate::vcs::GitCli;
use crate::workflow::VerifySettings;

pub const CONFIG_FILE: &str = "patchwright.toml";
pub const ENV_BOT_LOGIN: &str = "PATCHWRIGHT_BOT_LOGIN";
pub const ENV_BOT_TOKEN: &str = "PATCHWRIGHT_BOT_TOKEN";
pub const ENV_PRIVATE_KEY: &str = "PATCHWRIGHT_PRIVATE_KEY";

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub git: GitSection,
    #[serde(default)]
    pub verify: VerifySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// The hosting-platform account that owns forks and authors pull requests.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotSection {
    #[serde(default)]
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_ssh_host")]
    pub ssh_host: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_ssh_host() -> String {
    "github.com".to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            ssh_host: default_ssh_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSection {
    #[serde(default = "default_git_program")]
    pub program: String,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_git_program() -> String {
    "git".to_string()
}

fn default_author_name() -> String {
    "patchwright".to_string()
}

fn default_author_email() -> String {
    "patchwright@localhost".to_string()
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerifySection {
    /// Hold a per-project lock for the whole verify run.
    #[serde(default)]
    pub serialize_per_project: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse patchwright.toml")
    }

    /// Defaults when `path` does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(login) = get(ENV_BOT_LOGIN) {
            self.bot.login = login;
        }
        if let Some(token) = get(ENV_BOT_TOKEN) {
            self.bot.token = Some(token);
        }
        if let Some(key) = get(ENV_PRIVATE_KEY) {
            self.bot.private_key = Some(PathBuf::from(key));
        }
    }

    /// Problems that make `serve` or `verify` unusable. Empty means OK.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.bot.login.trim().is_empty() {
            problems.push(format!(
                "bot.login is empty (set it in {} or {})",
                CONFIG_FILE, ENV_BOT_LOGIN
            ));
        }
        if self.bot.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            problems.push(format!("bot.token is not set (use {})", ENV_BOT_TOKEN));
        }
        match &self.bot.private_key {
            None => problems.push(format!(
                "bot.private_key is not set (use {})",
                ENV_PRIVATE_KEY
            )),
            Some(path) if !expand_home(path).is_file() => problems.push(format!(
                "bot.private_key {} does not exist",
                path.display()
            )),
            Some(_) => {}
        }
        if !self.github.api_base.starts_with("http://")
            && !self.github.api_base.starts_with("https://")
        {
            problems.push(format!(
                "github.api_base '{}' is not an http(s) URL",
                self.github.api_base
            ));
        }

        problems
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn git_cli(&self) -> GitCli {
        GitCli::new(
            &self.git.program,
            &self.git.author_name,
            &self.git.author_email,
            &self.github.ssh_host,
        )
    }

    pub fn verify_settings(&self) -> VerifySettings {
        let key = self
            .bot
            .private_key
            .as_deref()
            .map(expand_home)
            .unwrap_or_default();
        VerifySettings::new(&self.bot.login, key).with_ssh_host(&self.github.ssh_host)
    }

    /// TOML rendering with the token masked.
    pub fn redacted(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.bot.token.is_some() {
            shown.bot.token = Some(REDACTED.to_string());
        }
        toml::to_string_pretty(&shown).context("Failed to serialize configuration")
    }
}

/// Expand a leading `~/` using `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
