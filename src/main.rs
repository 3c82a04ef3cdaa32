use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use patchwright::config::{CONFIG_FILE, Config};

mod cmd;

#[derive(Parser)]
#[command(name = "patchwright")]
#[command(version, about = "Deliver security scanner patches as pull requests")]
pub struct Cli {
    /// Path to patchwright.toml
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook server and the CLONE_REQUEST / VERIFY_RESULTS consumers
    Serve {
        /// Port to listen on. Overrides patchwright.toml
        #[arg(long)]
        port: Option<u16>,
        /// Address to bind. Overrides patchwright.toml
        #[arg(long)]
        host: Option<String>,
    },
    /// Open a pull request for a local patch file
    Verify {
        /// Owner of the upstream repository
        #[arg(long)]
        owner: String,
        /// Name of the upstream repository
        #[arg(long)]
        project: String,
        /// Patch file (ProjectDiff JSON)
        #[arg(long)]
        patch: PathBuf,
        /// Clone URL recorded on the task (defaults to the SSH URL of owner/project)
        #[arg(long)]
        repo_url: Option<String>,
    },
    /// Print the effective configuration with secrets redacted
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env();

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            cmd::cmd_serve(&config).await
        }
        Commands::Verify {
            owner,
            project,
            patch,
            repo_url,
        } => {
            cmd::cmd_verify(
                &config,
                cmd::verify::VerifyArgs {
                    owner: &owner,
                    project: &project,
                    patch: &patch,
                    repo_url: repo_url.as_deref(),
                },
            )
            .await
        }
        Commands::Config => cmd::cmd_config(&cli.config, &config),
    }
}
