use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::ResourceError;
use crate::config::{SourceConfig, When};
use crate::filter::SourceFilter;
use crate::github::{GitHubApi, GitHubError, PullRequest};
use crate::version::Version;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckRequest {
    pub source: SourceConfig,
    /// Last version the orchestrator saw. Accepted but unused: every check
    /// recomputes the full list from scratch.
    #[serde(default)]
    #[allow(dead_code)]
    pub version: Option<Version>,
}

/// List every qualifying comment and review version, oldest first.
///
/// Any API failure aborts the whole check; no partial list is returned.
#[instrument(skip_all, fields(repository = %source.repository))]
pub async fn run(
    source: &SourceConfig,
    github: &dyn GitHubApi,
) -> Result<Vec<Version>, ResourceError> {
    let filter = SourceFilter::new(source)?;
    let when = source.when()?;

    let pulls = github.list_pull_requests().await?;
    debug!(count = pulls.len(), "listed pull requests");

    let mut versions = Vec::new();
    for pull in pulls {
        if !filter.matches_state(&pull.state) || !filter.matches_labels(&pull.label_names()) {
            continue;
        }
        if source.ignore_drafts && pull.draft {
            continue;
        }
        if source.only_mergeable && !is_mergeable(github, &pull).await? {
            debug!(pr = pull.number, "skipping unmergeable pull request");
            continue;
        }

        let comments = github.list_comments(pull.number).await?;
        versions.extend(select(
            when,
            comments.iter().map(|comment| {
                let matched = filter.matches_commenter_association(&comment.author_association)
                    && filter.matches_comment_text(&comment.body);
                matched.then(|| Version::for_comment(pull.number, comment))
            }),
        ));

        if source.review_states.is_empty() {
            continue;
        }
        let reviews = github.list_reviews(pull.number).await?;
        versions.extend(select(
            when,
            reviews
                .iter()
                .filter(|review| review.submitted_at.is_some())
                .map(|review| {
                    let matched = filter.matches_review_state(&review.state)
                        && filter.matches_comment_text(&review.body);
                    if matched {
                        Version::for_review(pull.number, review)
                    } else {
                        None
                    }
                }),
        ));
    }

    versions.sort_by_key(Version::created_at_secs);
    info!(versions = versions.len(), "check complete");
    Ok(versions)
}

/// Apply the selection mode to one chronological track. Each item is the
/// version of a matching event, or None for an event that did not match.
fn select(when: When, track: impl IntoIterator<Item = Option<Version>>) -> Vec<Version> {
    let mut selected = Vec::new();
    let mut last = None;
    for candidate in track {
        match (when, candidate) {
            (When::First, Some(version)) => return vec![version],
            (When::All, Some(version)) => selected.push(version),
            (When::Latest, candidate) => last = candidate,
            (_, None) => {}
        }
    }
    selected.extend(last);
    selected
}

/// The list endpoint leaves `mergeable` unknown; ask for the PR itself.
async fn is_mergeable(github: &dyn GitHubApi, pull: &PullRequest) -> Result<bool, GitHubError> {
    match pull.mergeable {
        Some(mergeable) => Ok(mergeable),
        None => Ok(github
            .get_pull_request(pull.number)
            .await?
            .mergeable
            .unwrap_or(false)),
    }
}
