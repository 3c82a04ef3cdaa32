//! `patchwright verify`: run the verify workflow once for a local patch file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use patchwright::config::Config;
use patchwright::editor::LineEditor;
use patchwright::gateway::GitHubGateway;
use patchwright::task::{ProjectMetadata, Task};
use patchwright::workflow::{Scratch, VerifyOutcome, VerifyWorkflow};

pub struct VerifyArgs<'a> {
    pub owner: &'a str,
    pub project: &'a str,
    pub patch: &'a Path,
    pub repo_url: Option<&'a str>,
}

pub async fn cmd_verify(config: &Config, args: VerifyArgs<'_>) -> Result<()> {
    let content = std::fs::read(args.patch)
        .with_context(|| format!("Failed to read patch file: {}", args.patch.display()))?;
    super::require_valid(config)?;

    let full_name = format!("{}/{}", args.owner, args.project);
    let repo_url = args
        .repo_url
        .map(str::to_string)
        .unwrap_or_else(|| config.git_cli().ssh_url(&full_name));
    let task = Task::new(
        ProjectMetadata::new(repo_url, args.owner, args.project, &full_name),
        content,
    );

    let token = config.bot.token.clone().unwrap_or_default();
    let workflow = VerifyWorkflow::new(
        Arc::new(GitHubGateway::new(&config.github.api_base, token)),
        Arc::new(config.git_cli()),
        Arc::new(LineEditor),
        config.verify_settings(),
        Scratch::default(),
    );

    match workflow
        .run(&task)
        .await
        .with_context(|| format!("Verify failed for {}", full_name))?
    {
        VerifyOutcome::PullRequestOpened { number, url } => {
            println!(
                "Opened pull request #{} on {}{}",
                number,
                full_name,
                url.map(|u| format!(": {}", u)).unwrap_or_default()
            );
        }
        VerifyOutcome::AlreadyOpen => {
            println!(
                "{} already has an open pull request from {}; nothing to do",
                full_name, config.bot.login
            );
        }
    }
    Ok(())
}
