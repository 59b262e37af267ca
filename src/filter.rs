use regex::Regex;

use crate::config::{ConfigError, SourceConfig};

/// States accepted when `states` is left empty.
const DEFAULT_STATES: &[&str] = &["open"];

/// Allow-list plus deny-list evaluated with a caller supplied match
/// predicate. The deny-list always wins; an empty allow-list accepts
/// `empty_allows`.
struct AllowDeny<'a, T> {
    allow: &'a [T],
    deny: &'a [T],
    empty_allows: bool,
}

impl<'a, T> AllowDeny<'a, T> {
    fn new(allow: &'a [T], deny: &'a [T], empty_allows: bool) -> Self {
        Self {
            allow,
            deny,
            empty_allows,
        }
    }

    fn accepts(&self, matches: impl Fn(&T) -> bool) -> bool {
        let allowed = if self.allow.is_empty() {
            self.empty_allows
        } else {
            self.allow.iter().any(&matches)
        };
        allowed && !self.deny.iter().any(&matches)
    }
}

/// Source configuration with its comment patterns compiled.
///
/// Every predicate is pure; building the filter is the only fallible step,
/// so a malformed pattern is reported before any pull request is examined.
pub struct SourceFilter<'a> {
    source: &'a SourceConfig,
    comments: Vec<Regex>,
    ignore_comments: Vec<Regex>,
}

impl<'a> SourceFilter<'a> {
    pub fn new(source: &'a SourceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            source,
            comments: compile_patterns(&source.comments)?,
            ignore_comments: compile_patterns(&source.ignore_comments)?,
        })
    }

    /// Empty `states` means only "open". `ignore_states` always wins.
    pub fn matches_state(&self, state: &str) -> bool {
        let defaults: Vec<String> = DEFAULT_STATES.iter().map(|s| s.to_string()).collect();
        let allow = if self.source.states.is_empty() {
            &defaults
        } else {
            &self.source.states
        };
        AllowDeny::new(allow, &self.source.ignore_states, false).accepts(|s| s == state)
    }

    /// Any requested label must be present; any ignored label rejects.
    pub fn matches_labels(&self, labels: &[&str]) -> bool {
        AllowDeny::new(&self.source.labels, &self.source.ignore_labels, true)
            .accepts(|wanted| labels.contains(&wanted.as_str()))
    }

    /// Case-insensitive; empty or `["all"]` accepts every association.
    pub fn matches_commenter_association(&self, association: &str) -> bool {
        let allow = &self.source.commenter_association;
        if allow.len() == 1 && allow[0] == "all" {
            return true;
        }
        AllowDeny::new(allow, &[], true).accepts(|a| a.eq_ignore_ascii_case(association))
    }

    /// Case-insensitive; an empty list accepts nothing.
    pub fn matches_review_state(&self, state: &str) -> bool {
        AllowDeny::new(&self.source.review_states, &[], false)
            .accepts(|s| s.eq_ignore_ascii_case(state))
    }

    /// Unanchored regex search over the comment body.
    pub fn matches_comment_text(&self, body: &str) -> bool {
        AllowDeny::new(&self.comments, &self.ignore_comments, true).accepts(|re| re.is_match(body))
    }
}

/// Compile operator supplied patterns, failing on the first invalid one.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}
