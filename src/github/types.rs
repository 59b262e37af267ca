use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// A pull request as returned by the pulls endpoints.
/// Only the fields the resource filters on or materializes are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// "open" or "closed"
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Unset on list responses; only computed when a single PR is fetched
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub draft: bool,
    pub head: GitRef,
    pub base: GitRef,
}

impl PullRequest {
    pub fn label_names(&self) -> Vec<&str> {
        self.labels.iter().map(|label| label.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Head or base of a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    /// Branch name
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: String,
    /// Null when the fork behind a head ref was deleted
    #[serde(default)]
    pub repo: Option<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub clone_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub html_url: String,
}

/// An issue comment on a pull request's conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    pub user: User,
    pub author_association: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// e.g. https://github.com/octocat/hello-world/issues/1347#issuecomment-1
    pub html_url: String,
}

/// A pull request review.
#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    /// APPROVED, CHANGES_REQUESTED, COMMENTED, DISMISSED or PENDING
    pub state: String,
    pub user: User,
    pub author_association: String,
    /// None while the review is still pending
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    pub html_url: String,
    #[serde(default)]
    pub commit_id: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
