use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed repository: {0} (expected owner/name)")]
    MalformedRepository(String),

    #[error("invalid comment pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown selection mode: {0} (expected all, latest or first)")]
    UnknownWhen(String),

    #[error("unknown integration tool: {0} (expected rebase, merge or checkout)")]
    UnknownIntegrationTool(String),

    #[error("unknown state: {0} (expected open or closed)")]
    InvalidState(String),
}

/// Resource configuration passed as `source` on every invocation.
///
/// All fields except `repository` are optional. An empty source watches
/// every comment on open pull requests and ignores reviews.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Repository to watch, as `owner/name`
    pub repository: String,

    /// API token. If None, falls back to GITHUB_TOKEN env var.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// API base override for GitHub Enterprise (e.g. https://ghe.local/api/v3)
    #[serde(default)]
    pub github_endpoint: Option<String>,
    #[serde(default)]
    pub skip_ssl: bool,
    #[serde(default)]
    pub disable_git_lfs: bool,
    /// Base64 encoded git-crypt key used to unlock the checkout
    #[serde(default)]
    pub git_crypt_key: Option<String>,

    #[serde(default)]
    pub only_mergeable: bool,
    #[serde(default = "default_true")]
    pub ignore_drafts: bool,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub ignore_states: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub ignore_labels: Vec<String>,
    /// Regular expressions; a comment must match at least one
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub ignore_comments: Vec<String>,
    #[serde(default)]
    pub commenter_association: Vec<String>,
    /// Reviews are only considered when at least one state is listed here
    #[serde(default)]
    pub review_states: Vec<String>,
    #[serde(default)]
    pub when: Option<String>,
    /// Expose named capture groups of `comments` as extra metadata
    #[serde(default)]
    pub map_comment_meta: bool,
}

fn default_true() -> bool {
    true
}

/// Which matching events of a pull request become versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum When {
    All,
    #[default]
    Latest,
    First,
}

impl std::str::FromStr for When {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(When::All),
            "latest" => Ok(When::Latest),
            "first" => Ok(When::First),
            other => Err(ConfigError::UnknownWhen(other.to_string())),
        }
    }
}

/// Owner and name of the configured repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl SourceConfig {
    /// Split `repository` into owner and name.
    pub fn repo_slug(&self) -> Result<RepoSlug, ConfigError> {
        match self.repository.split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(RepoSlug {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(ConfigError::MalformedRepository(self.repository.clone())),
        }
    }

    /// Selection mode, `latest` when unset.
    pub fn when(&self) -> Result<When, ConfigError> {
        match self.when.as_deref() {
            None | Some("") => Ok(When::default()),
            Some(mode) => mode.parse(),
        }
    }

    /// Resolve the API token: source value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }

    /// Credentials to bake into git remote URLs, as (user, password).
    pub fn git_credentials(&self) -> Option<(String, String)> {
        if let Some(token) = self.github_token() {
            return Some(("x-oauth-basic".to_string(), token));
        }
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        }
    }

    /// REST API base URL without a trailing slash.
    pub fn api_base(&self) -> String {
        match self.github_endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
            _ => "https://api.github.com".to_string(),
        }
    }
}
