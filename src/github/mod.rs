pub mod client;
pub mod types;

pub use client::GitHubClient;
pub use types::{Comment, PullRequest, Review};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status} for {url}: {body}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
        body: String,
    },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything the resource needs from the code-hosting API.
///
/// Pull requests are addressed by number within the single configured
/// repository. Implementations must return comments and reviews in
/// ascending chronological order.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// All pull requests regardless of state; filtering happens locally.
    async fn list_pull_requests(&self) -> Result<Vec<PullRequest>, GitHubError>;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest, GitHubError>;

    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError>;

    async fn get_comment(&self, comment_id: u64) -> Result<Comment, GitHubError>;

    async fn list_reviews(&self, number: u64) -> Result<Vec<Review>, GitHubError>;

    async fn get_review(&self, number: u64, review_id: u64) -> Result<Review, GitHubError>;

    async fn set_state(&self, number: u64, state: &str) -> Result<(), GitHubError>;

    /// Delete the most recent comment written by the authenticated identity.
    /// Does nothing when that identity never commented.
    async fn delete_last_comment(&self, number: u64) -> Result<(), GitHubError>;

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError>;

    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError>;

    async fn replace_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError>;

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), GitHubError>;
}

/// Recover the pull request number from a comment or review HTML URL.
///
/// The number is the last path segment; any fragment is ignored:
///   https://github.com/octocat/hello-world/issues/1347#issuecomment-1
///   https://github.com/octocat/hello-world/pull/42#pullrequestreview-9
pub fn parse_comment_html_url(url: &str) -> Result<u64, GitHubError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .and_then(|segment| segment.parse::<u64>().ok())
        .ok_or_else(|| GitHubError::InvalidUrl(url.to_string()))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use super::types::{GitRef, Label, Repository, User};

    /// In-memory API used by the action tests. Every mutating call is
    /// recorded as a short string in `calls`.
    #[derive(Default)]
    pub struct FakeGitHub {
        pub pulls: Vec<PullRequest>,
        pub comments: HashMap<u64, Vec<Comment>>,
        pub reviews: HashMap<u64, Vec<Review>>,
        pub fail_listing_comments: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeGitHub {
        pub fn with_pull(mut self, pull: PullRequest) -> Self {
            self.pulls.push(pull);
            self
        }

        pub fn with_comments(mut self, number: u64, comments: Vec<Comment>) -> Self {
            self.comments.insert(number, comments);
            self
        }

        pub fn with_reviews(mut self, number: u64, reviews: Vec<Review>) -> Self {
            self.reviews.insert(number, reviews);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn not_found(what: &str) -> GitHubError {
            GitHubError::Status {
                status: reqwest::StatusCode::NOT_FOUND,
                url: what.to_string(),
                body: "Not Found".to_string(),
            }
        }
    }

    #[async_trait]
    impl GitHubApi for FakeGitHub {
        async fn list_pull_requests(&self) -> Result<Vec<PullRequest>, GitHubError> {
            Ok(self
                .pulls
                .iter()
                .cloned()
                .map(|mut pull| {
                    pull.mergeable = None;
                    pull
                })
                .collect())
        }

        async fn get_pull_request(&self, number: u64) -> Result<PullRequest, GitHubError> {
            self.record(format!("get_pull_request {number}"));
            self.pulls
                .iter()
                .find(|pull| pull.number == number)
                .cloned()
                .ok_or_else(|| Self::not_found("pull"))
        }

        async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError> {
            if self.fail_listing_comments {
                return Err(GitHubError::Status {
                    status: reqwest::StatusCode::FORBIDDEN,
                    url: "comments".to_string(),
                    body: "API rate limit exceeded".to_string(),
                });
            }
            Ok(self.comments.get(&number).cloned().unwrap_or_default())
        }

        async fn get_comment(&self, comment_id: u64) -> Result<Comment, GitHubError> {
            self.comments
                .values()
                .flatten()
                .find(|comment| comment.id == comment_id)
                .cloned()
                .ok_or_else(|| Self::not_found("comment"))
        }

        async fn list_reviews(&self, number: u64) -> Result<Vec<Review>, GitHubError> {
            Ok(self.reviews.get(&number).cloned().unwrap_or_default())
        }

        async fn get_review(&self, number: u64, review_id: u64) -> Result<Review, GitHubError> {
            self.reviews
                .get(&number)
                .into_iter()
                .flatten()
                .find(|review| review.id == review_id)
                .cloned()
                .ok_or_else(|| Self::not_found("review"))
        }

        async fn set_state(&self, number: u64, state: &str) -> Result<(), GitHubError> {
            self.record(format!("set_state {number} {state}"));
            Ok(())
        }

        async fn delete_last_comment(&self, number: u64) -> Result<(), GitHubError> {
            self.record(format!("delete_last_comment {number}"));
            Ok(())
        }

        async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError> {
            self.record(format!("add_labels {number} {}", labels.join(",")));
            Ok(())
        }

        async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError> {
            self.record(format!("remove_labels {number} {}", labels.join(",")));
            Ok(())
        }

        async fn replace_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError> {
            self.record(format!("replace_labels {number} {}", labels.join(",")));
            Ok(())
        }

        async fn create_comment(&self, number: u64, body: &str) -> Result<(), GitHubError> {
            self.record(format!("create_comment {number} {body}"));
            Ok(())
        }
    }

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    pub fn test_user() -> User {
        User {
            login: "alice".to_string(),
            id: 1001,
            avatar_url: "https://avatars.example.com/u/1001".to_string(),
            html_url: "https://github.com/alice".to_string(),
        }
    }

    /// Helper to create an open, mergeable, non-draft pull request.
    pub fn test_pull_request(number: u64) -> PullRequest {
        PullRequest {
            number,
            state: "open".to_string(),
            labels: vec![],
            mergeable: Some(true),
            draft: false,
            head: GitRef {
                name: format!("feature-{number}"),
                sha: format!("head{number}"),
                repo: None,
            },
            base: GitRef {
                name: "main".to_string(),
                sha: format!("base{number}"),
                repo: Some(Repository {
                    clone_url: "https://github.com/octocat/hello-world.git".to_string(),
                }),
            },
        }
    }

    pub fn with_labels(mut pull: PullRequest, labels: &[&str]) -> PullRequest {
        pull.labels = labels
            .iter()
            .map(|name| Label {
                name: name.to_string(),
            })
            .collect();
        pull
    }

    /// Helper to create a comment on `pr` posted by a repository member.
    pub fn test_comment(id: u64, pr: u64, body: &str, created_at: i64) -> Comment {
        Comment {
            id,
            body: body.to_string(),
            user: test_user(),
            author_association: "MEMBER".to_string(),
            created_at: at(created_at),
            updated_at: at(created_at + 60),
            html_url: format!(
                "https://github.com/octocat/hello-world/pull/{pr}#issuecomment-{id}"
            ),
        }
    }

    pub fn test_review(id: u64, pr: u64, state: &str, body: &str, submitted_at: i64) -> Review {
        Review {
            id,
            body: body.to_string(),
            state: state.to_string(),
            user: test_user(),
            author_association: "MEMBER".to_string(),
            submitted_at: Some(at(submitted_at)),
            html_url: format!(
                "https://github.com/octocat/hello-world/pull/{pr}#pullrequestreview-{id}"
            ),
            commit_id: Some(format!("head{pr}")),
        }
    }

    #[test]
    fn test_parse_issue_comment_url() {
        let number =
            parse_comment_html_url("https://example.com/owner/repo/issues/42#issuecomment-7")
                .unwrap();
        assert_eq!(number, 42);
    }

    #[test]
    fn test_parse_pull_comment_url() {
        let number = parse_comment_html_url(
            "https://github.com/octocat/hello-world/pull/1347#issuecomment-1",
        )
        .unwrap();
        assert_eq!(number, 1347);
    }

    #[test]
    fn test_parse_invalid_comment_url() {
        assert!(parse_comment_html_url("not-a-url").is_err());
        assert!(parse_comment_html_url("https://github.com/owner/repo/issues").is_err());
        assert!(parse_comment_html_url("https://github.com/").is_err());
    }
}
