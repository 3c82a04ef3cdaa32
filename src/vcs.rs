//! Version-control operations executed through the `git` binary.
//!
//! Every operation is a typed [`Invocation`]: program, discrete arguments,
//! working directory and environment. Caller-supplied values (URLs, commit
//! messages, key paths) are passed as separate arguments and never pass
//! through a shell. There is no timeout and no retry.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::VcsError;

/// Subdirectory of a working directory that holds the checkout.
pub const CHECKOUT_DIR: &str = "code";

/// Branch pushed to and targeted by pull requests.
pub const DEFAULT_BRANCH: &str = "master";

#[async_trait]
pub trait VcsOperations: Send + Sync {
    /// Clone `remote_url` into `<workdir>/code`. Returns the checkout path.
    async fn clone_repo(&self, workdir: &Path, remote_url: &str) -> Result<PathBuf, VcsError>;

    /// Stage everything in `<workdir>/code` and commit it with `message`.
    async fn commit(&self, workdir: &Path, message: &str) -> Result<(), VcsError>;

    /// Push `HEAD` of `<workdir>/code` to `master` of `remote_full_name`,
    /// authenticating with the private key at `credential`.
    async fn push(
        &self,
        workdir: &Path,
        remote_full_name: &str,
        credential: &Path,
    ) -> Result<(), VcsError>;
}

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run to completion. Stdout and stderr are captured, logged line by line
    /// under `operation`, and returned together on success.
    pub async fn run(&self, operation: &'static str) -> Result<String, VcsError> {
        tracing::debug!(operation, program = %self.program, cwd = %self.cwd.display(), "Running");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|source| VcsError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        for line in combined.lines().filter(|l| !l.trim().is_empty()) {
            tracing::info!(operation, "{}", line);
        }

        if output.status.success() {
            Ok(combined)
        } else {
            Err(VcsError::NonZeroExit {
                operation,
                code: output.status.code(),
                output: combined,
            })
        }
    }
}

/// `VcsOperations` backed by the `git` command-line client.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    author_name: String,
    author_email: String,
    ssh_host: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git", "patchwright", "patchwright@localhost", "github.com")
    }
}

impl GitCli {
    pub fn new(
        program: impl Into<String>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
        ssh_host: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
            ssh_host: ssh_host.into(),
        }
    }

    /// SSH remote for `owner/name` on the configured host.
    pub fn ssh_url(&self, full_name: &str) -> String {
        format!("git@{}:{}.git", self.ssh_host, full_name)
    }

    fn clone_invocation(&self, workdir: &Path, remote_url: &str) -> Invocation {
        Invocation::new(&self.program, workdir)
            .args(["clone", "--"])
            .arg(remote_url)
            .arg(CHECKOUT_DIR)
    }

    fn commit_invocations(&self, checkout: &Path, message: &str) -> [Invocation; 2] {
        [
            Invocation::new(&self.program, checkout).args(["add", "--all"]),
            Invocation::new(&self.program, checkout)
                .arg("-c")
                .arg(format!("user.name={}", self.author_name))
                .arg("-c")
                .arg(format!("user.email={}", self.author_email))
                .args(["commit", "--message"])
                .arg(message),
        ]
    }

    fn push_invocation(&self, checkout: &Path, remote_full_name: &str, credential: &Path) -> Invocation {
        // GIT_SSH_COMMAND is interpreted by a shell, so the key path is quoted.
        let ssh = format!(
            "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
            shell_quote(&credential.to_string_lossy())
        );
        Invocation::new(&self.program, checkout)
            .arg("push")
            .arg(self.ssh_url(remote_full_name))
            .arg(format!("HEAD:{}", DEFAULT_BRANCH))
            .env("GIT_SSH_COMMAND", ssh)
    }
}

#[async_trait]
impl VcsOperations for GitCli {
    async fn clone_repo(&self, workdir: &Path, remote_url: &str) -> Result<PathBuf, VcsError> {
        if let Err(source) = tokio::fs::metadata(workdir).await {
            return Err(VcsError::Workdir {
                path: workdir.to_path_buf(),
                source,
            });
        }
        self.clone_invocation(workdir, remote_url).run("clone").await?;
        Ok(workdir.join(CHECKOUT_DIR))
    }

    async fn commit(&self, workdir: &Path, message: &str) -> Result<(), VcsError> {
        let checkout = workdir.join(CHECKOUT_DIR);
        for invocation in self.commit_invocations(&checkout, message) {
            invocation.run("commit").await?;
        }
        Ok(())
    }

    async fn push(
        &self,
        workdir: &Path,
        remote_full_name: &str,
        credential: &Path,
    ) -> Result<(), VcsError> {
        let checkout = workdir.join(CHECKOUT_DIR);
        self.push_invocation(&checkout, remote_full_name, credential)
            .run("push")
            .await?;
        Ok(())
    }
}

/// Single-quote `s` for POSIX sh.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
