//! `patchwright serve`: webhook server plus channel consumers.

use std::sync::Arc;

use anyhow::{Context, Result};
use patchwright::config::Config;
use patchwright::dispatcher::Dispatcher;
use patchwright::editor::LineEditor;
use patchwright::gateway::GitHubGateway;
use patchwright::queue::{MemoryQueue, TaskQueue};
use patchwright::server::{self, AppState};
use patchwright::task::Channel;
use patchwright::vcs::VcsOperations;
use patchwright::workflow::{CloneWorkflow, InProcessLocks, Scratch, VerifyWorkflow};

use super::require_valid;

pub async fn cmd_serve(config: &Config) -> Result<()> {
    require_valid(config)?;

    let queue: Arc<dyn TaskQueue> = Arc::new(MemoryQueue::new());
    let vcs: Arc<dyn VcsOperations> = Arc::new(config.git_cli());
    let token = config.bot.token.clone().unwrap_or_default();
    let gateway = Arc::new(GitHubGateway::new(&config.github.api_base, token));
    let scratch = Scratch::default();

    let clone = CloneWorkflow::new(Arc::clone(&vcs), Arc::clone(&queue), scratch.clone());
    let mut verify = VerifyWorkflow::new(
        gateway,
        vcs,
        Arc::new(LineEditor),
        config.verify_settings(),
        scratch,
    );
    if config.verify.serialize_per_project {
        verify = verify.with_lock(Arc::new(InProcessLocks::new()));
    }

    let mut dispatcher = Dispatcher::new(Arc::clone(&queue));
    dispatcher.register(Channel::CloneRequest, Arc::new(clone))?;
    dispatcher.register(Channel::VerifyResults, Arc::new(verify))?;
    dispatcher.require(&[Channel::CloneRequest, Channel::VerifyResults])?;
    let running = dispatcher
        .start()
        .context("Failed to start channel consumers")?;

    let router = server::build_router(Arc::new(AppState {
        queue: Arc::clone(&queue),
    }));
    let served = server::serve(&config.bind_addr(), router, shutdown_signal()).await;

    running.shutdown().await;
    tracing::info!(
        pending_scan = queue.len(Channel::ScanRequest).await,
        "Stopped"
    );
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}
