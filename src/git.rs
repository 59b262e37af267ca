use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::{ConfigError, SourceConfig};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed ({status}){detail}")]
    Command {
        command: String,
        status: ExitStatus,
        detail: String,
    },

    #[error("invalid remote URL: {0}")]
    InvalidRemote(String),

    #[error("invalid git-crypt key: {0}")]
    InvalidKey(#[from] base64::DecodeError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// How the PR head is combined with its base branch in the checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationTool {
    #[default]
    Rebase,
    Merge,
    Checkout,
}

impl std::str::FromStr for IntegrationTool {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rebase" => Ok(IntegrationTool::Rebase),
            "merge" => Ok(IntegrationTool::Merge),
            "checkout" => Ok(IntegrationTool::Checkout),
            other => Err(ConfigError::UnknownIntegrationTool(other.to_string())),
        }
    }
}

/// Local working tree operations used by the `in` step.
#[async_trait]
pub trait Git: Send + Sync {
    /// Create the working tree on `branch` with a CI identity configured.
    async fn init(&self, branch: &str) -> Result<(), GitError>;

    /// Add `uri` as origin (with credentials) and pull `branch`.
    /// A depth of 0 pulls full history.
    async fn pull(
        &self,
        uri: &str,
        branch: &str,
        depth: u32,
        submodules: bool,
        fetch_tags: bool,
    ) -> Result<(), GitError>;

    /// Fetch the synthetic `pull/<n>/head` ref.
    async fn fetch(
        &self,
        uri: &str,
        pr_number: u64,
        depth: u32,
        submodules: bool,
    ) -> Result<(), GitError>;

    async fn checkout(&self, branch: &str, sha: &str, submodules: bool) -> Result<(), GitError>;

    async fn merge(&self, sha: &str, submodules: bool) -> Result<(), GitError>;

    async fn rebase(&self, base_ref: &str, head_sha: &str, submodules: bool)
        -> Result<(), GitError>;

    async fn git_crypt_unlock(&self, key_base64: &str) -> Result<(), GitError>;
}

/// Git CLI driver rooted at one directory.
pub struct GitClient {
    dir: PathBuf,
    credentials: Option<(String, String)>,
    skip_ssl: bool,
    disable_git_lfs: bool,
}

impl GitClient {
    pub fn new(source: &SourceConfig, dir: PathBuf) -> Self {
        Self {
            dir,
            credentials: source.git_credentials(),
            skip_ssl: source.skip_ssl,
            disable_git_lfs: source.disable_git_lfs,
        }
    }

    fn command(&self, program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if self.skip_ssl {
            cmd.env("GIT_SSL_NO_VERIFY", "true");
        }
        if self.disable_git_lfs {
            cmd.env("GIT_LFS_SKIP_SMUDGE", "true");
        }
        cmd
    }

    /// Run a command whose arguments and output are safe to report.
    async fn run(&self, program: &str, args: &[&str]) -> Result<(), GitError> {
        let command = format!("{program} {}", args.join(" "));
        debug!(command = %command, "running");

        let output = self
            .command(program, args)
            .output()
            .await
            .map_err(|source| GitError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitError::Command {
                command,
                status: output.status,
                detail: if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {stderr}")
                },
            });
        }
        Ok(())
    }

    /// Run a command that carries credentials. Neither the arguments nor
    /// the output are logged or included in errors.
    async fn run_secret(&self, label: &str, args: &[&str]) -> Result<(), GitError> {
        debug!(command = %label, "running");
        let status = self
            .command("git", args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| GitError::Spawn {
                program: "git".to_string(),
                source,
            })?;

        if !status.success() {
            return Err(GitError::Command {
                command: label.to_string(),
                status,
                detail: String::new(),
            });
        }
        Ok(())
    }

    /// Bake the configured credentials into `uri` as user-info.
    pub fn endpoint(&self, uri: &str) -> Result<String, GitError> {
        let mut url =
            reqwest::Url::parse(uri).map_err(|_| GitError::InvalidRemote(uri.to_string()))?;
        if let Some((user, password)) = &self.credentials {
            url.set_username(user)
                .and_then(|_| url.set_password(Some(password)))
                .map_err(|_| GitError::InvalidRemote(uri.to_string()))?;
        }
        Ok(url.to_string())
    }

    async fn update_submodules(&self, flavour: Option<&str>) -> Result<(), GitError> {
        let mut args = vec!["submodule", "update", "--init", "--recursive"];
        args.extend(flavour);
        self.run("git", &args).await
    }

    fn dir_display(&self) -> String {
        self.dir.display().to_string()
    }
}

#[async_trait]
impl Git for GitClient {
    #[instrument(skip(self), fields(dir = %self.dir_display()))]
    async fn init(&self, branch: &str) -> Result<(), GitError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| GitError::Io {
                path: self.dir_display(),
                source,
            })?;

        self.run("git", &["init"]).await?;
        self.run("git", &["checkout", "-b", branch]).await?;
        self.run("git", &["config", "user.name", "concourse-ci"]).await?;
        self.run("git", &["config", "user.email", "concourse@local"])
            .await?;
        self.run(
            "git",
            &[
                "config",
                "url.https://x-oauth-basic@github.com/.insteadOf",
                "git@github.com:",
            ],
        )
        .await?;
        self.run("git", &["config", "url.https://.insteadOf", "git://"])
            .await
    }

    #[instrument(skip(self, uri))]
    async fn pull(
        &self,
        uri: &str,
        branch: &str,
        depth: u32,
        submodules: bool,
        fetch_tags: bool,
    ) -> Result<(), GitError> {
        let endpoint = self.endpoint(uri)?;
        self.run_secret("git remote add origin", &["remote", "add", "origin", &endpoint])
            .await?;

        let depth_arg = depth.to_string();
        let mut args = vec!["pull", "origin", branch];
        if depth > 0 {
            args.extend(["--depth", depth_arg.as_str()]);
        }
        if fetch_tags {
            args.push("--tags");
        }
        if submodules {
            args.push("--recurse-submodules");
        }
        self.run_secret("git pull", &args).await?;

        if submodules {
            self.update_submodules(None).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, uri))]
    async fn fetch(
        &self,
        uri: &str,
        pr_number: u64,
        depth: u32,
        submodules: bool,
    ) -> Result<(), GitError> {
        let endpoint = self.endpoint(uri)?;
        let refspec = format!("pull/{pr_number}/head");
        let depth_arg = depth.to_string();

        let mut args = vec!["fetch", endpoint.as_str(), refspec.as_str()];
        if depth > 0 {
            args.extend(["--depth", depth_arg.as_str()]);
        }
        if submodules {
            args.push("--recurse-submodules");
        }
        self.run_secret("git fetch", &args).await
    }

    #[instrument(skip(self))]
    async fn checkout(&self, branch: &str, sha: &str, submodules: bool) -> Result<(), GitError> {
        self.run("git", &["checkout", "-b", branch, sha]).await?;
        if submodules {
            self.update_submodules(Some("--checkout")).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn merge(&self, sha: &str, submodules: bool) -> Result<(), GitError> {
        self.run("git", &["merge", sha, "--no-stat"]).await?;
        if submodules {
            self.update_submodules(Some("--merge")).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rebase(
        &self,
        base_ref: &str,
        head_sha: &str,
        submodules: bool,
    ) -> Result<(), GitError> {
        self.run("git", &["rebase", base_ref, head_sha]).await?;
        if submodules {
            self.update_submodules(Some("--rebase")).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, key_base64))]
    async fn git_crypt_unlock(&self, key_base64: &str) -> Result<(), GitError> {
        let key = BASE64.decode(key_base64.trim())?;

        let key_dir = tempfile::TempDir::new().map_err(|source| GitError::Io {
            path: "temporary key directory".to_string(),
            source,
        })?;
        let key_path = key_dir.path().join("git-crypt-key");
        write_private_file(&key_path, &key)?;

        let key_arg = key_path.display().to_string();
        self.run("git-crypt", &["unlock", &key_arg]).await
    }
}

fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), GitError> {
    let io_err = |source: std::io::Error| GitError::Io {
        path: path.display().to_string(),
        source,
    };
    std::fs::write(path, contents).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }
    Ok(())
}
