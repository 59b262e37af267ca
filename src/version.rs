use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::github::{Comment, Review};

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("cannot extrapolate version: neither comment_id nor review_id is set")]
    CannotExtrapolate,

    #[error("invalid {field} in version: {value:?}")]
    InvalidId { field: &'static str, value: String },
}

/// One qualifying comment or review, as tracked by the CI orchestrator.
///
/// Exactly one of `comment_id` / `review_id` is set on versions this
/// resource emits. Empty strings from older versions read as unset, and
/// unset ids are omitted on output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Version {
    /// Unix seconds, used only for ordering
    #[serde(default)]
    pub created_at: String,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub pr_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub comment_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub review_id: Option<String>,
}

/// The entity a version points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTarget {
    Comment(u64),
    Review(u64),
}

impl Version {
    pub fn for_comment(pr_number: u64, comment: &Comment) -> Self {
        Self {
            created_at: comment.created_at.timestamp().to_string(),
            pr_id: Some(pr_number.to_string()),
            comment_id: Some(comment.id.to_string()),
            review_id: None,
        }
    }

    /// None for reviews that have not been submitted yet.
    pub fn for_review(pr_number: u64, review: &Review) -> Option<Self> {
        let submitted_at = review.submitted_at?;
        Some(Self {
            created_at: submitted_at.timestamp().to_string(),
            pr_id: Some(pr_number.to_string()),
            comment_id: None,
            review_id: Some(review.id.to_string()),
        })
    }

    /// Comment id wins when, against the invariant, both are present.
    pub fn target(&self) -> Result<VersionTarget, VersionError> {
        if let Some(id) = &self.comment_id {
            return parse_id("comment_id", id).map(VersionTarget::Comment);
        }
        if let Some(id) = &self.review_id {
            return parse_id("review_id", id).map(VersionTarget::Review);
        }
        Err(VersionError::CannotExtrapolate)
    }

    pub fn pr_number(&self) -> Result<Option<u64>, VersionError> {
        self.pr_id
            .as_deref()
            .map(|id| parse_id("pr_id", id))
            .transpose()
    }

    /// Numeric ordering key; unparseable timestamps sort first.
    pub fn created_at_secs(&self) -> i64 {
        self.created_at.parse().unwrap_or(i64::MIN)
    }
}

fn parse_id(field: &'static str, value: &str) -> Result<u64, VersionError> {
    value.parse().map_err(|_| VersionError::InvalidId {
        field,
        value: value.to_string(),
    })
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|value| !value.is_empty()))
}
