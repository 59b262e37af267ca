use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::github::{Comment, PullRequest, Review};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata field does not exist: {0}")]
    MissingField(String),
}

/// A single named value describing the matched comment, review or PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

/// Ordered list of metadata fields, serialized as a JSON array of
/// `{"name", "value"}` objects.
///
/// Names are not deduplicated: a capture group may reuse a reserved name,
/// in which case lookups return the first entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Vec<MetadataField>);

impl Metadata {
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(MetadataField {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn get(&self, name: &str) -> Result<&str, MetadataError> {
        self.0
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
            .ok_or_else(|| MetadataError::MissingField(name.to_string()))
    }

    pub fn fields(&self) -> &[MetadataField] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Timestamps are written as RFC 3339 in UTC with second precision.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Metadata for a matched comment, followed by the PR head and base.
pub fn comment_metadata(pr: &PullRequest, comment: &Comment) -> Metadata {
    let mut meta = Metadata::default();
    meta.add("pr_id", pr.number.to_string());
    meta.add("comment_id", comment.id.to_string());
    meta.add("body", comment.body.as_str());
    meta.add("created_at", format_timestamp(&comment.created_at));
    meta.add("updated_at", format_timestamp(&comment.updated_at));
    meta.add("author_association", comment.author_association.as_str());
    meta.add("html_url", comment.html_url.as_str());
    meta.add("user_login", comment.user.login.as_str());
    meta.add("user_id", comment.user.id.to_string());
    meta.add("user_avatar_url", comment.user.avatar_url.as_str());
    meta.add("user_html_url", comment.user.html_url.as_str());
    add_pull_request_refs(&mut meta, pr);
    meta
}

/// Metadata for a matched review, followed by the PR head and base.
pub fn review_metadata(pr: &PullRequest, review: &Review) -> Metadata {
    let mut meta = Metadata::default();
    meta.add("pr_id", pr.number.to_string());
    meta.add("review_id", review.id.to_string());
    meta.add("body", review.body.as_str());
    meta.add("state", review.state.as_str());
    meta.add(
        "submitted_at",
        review
            .submitted_at
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default(),
    );
    meta.add("author_association", review.author_association.as_str());
    meta.add("html_url", review.html_url.as_str());
    meta.add("commit_id", review.commit_id.clone().unwrap_or_default());
    meta.add("user_login", review.user.login.as_str());
    meta.add("user_id", review.user.id.to_string());
    meta.add("user_avatar_url", review.user.avatar_url.as_str());
    meta.add("user_html_url", review.user.html_url.as_str());
    add_pull_request_refs(&mut meta, pr);
    meta
}

fn add_pull_request_refs(meta: &mut Metadata, pr: &PullRequest) {
    meta.add("head_name", pr.head.name.as_str());
    meta.add("head_sha", pr.head.sha.as_str());
    meta.add("base_name", pr.base.name.as_str());
    meta.add("base_sha", pr.base.sha.as_str());
}

/// Append one field per named capture group of each pattern, matched once
/// against `body`. Groups that did not participate yield an empty value;
/// patterns that do not match contribute nothing.
pub fn enrich_from_comment_body(meta: &mut Metadata, patterns: &[regex::Regex], body: &str) {
    for pattern in patterns {
        let Some(captures) = pattern.captures(body) else {
            continue;
        };
        for (index, name) in pattern.capture_names().enumerate().skip(1) {
            if let Some(name) = name {
                let value = captures.get(index).map(|m| m.as_str()).unwrap_or_default();
                meta.add(name, value);
            }
        }
    }
}
