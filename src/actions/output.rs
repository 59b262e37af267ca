use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{info, instrument};

use super::{read_file, read_json, ResourceError, Response};
use crate::config::{ConfigError, SourceConfig};
use crate::github::GitHubApi;
use crate::metadata::Metadata;
use crate::version::{Version, VersionError};

/// Environment variables that may be expanded inside a posted comment.
const BUILD_VARS: &[&str] = &[
    "BUILD_ID",
    "BUILD_NAME",
    "BUILD_JOB_NAME",
    "BUILD_PIPELINE_NAME",
    "BUILD_TEAM_NAME",
    "ATC_EXTERNAL_URL",
];

static VAR_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{(\w+)\}|(\w+))").expect("variable reference pattern is valid")
});

const PR_STATES: &[&str] = &["open", "closed"];

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutParams {
    /// Directory, relative to the input path, written by a previous `in`
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Relative to `path`; ignored when `comment` is set
    #[serde(default)]
    pub comment_file: Option<String>,
    /// Replaces every label; `add_labels` and `remove_labels` are then ignored
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub add_labels: Vec<String>,
    #[serde(default)]
    pub remove_labels: Vec<String>,
    #[serde(default)]
    pub delete_last_comment: bool,
}

impl OutParams {
    /// Lower-cased target state, if one was requested.
    pub fn state(&self) -> Result<Option<String>, ConfigError> {
        match self.state.as_deref().filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(state) => {
                let lowered = state.to_ascii_lowercase();
                if PR_STATES.contains(&lowered.as_str()) {
                    Ok(Some(lowered))
                } else {
                    Err(ConfigError::InvalidState(state.to_string()))
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutRequest {
    pub source: SourceConfig,
    #[serde(default)]
    pub params: OutParams,
}

/// Apply the requested changes to the pull request materialized under
/// `dir/params.path`.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn run(
    request: &OutRequest,
    dir: &Path,
    github: &dyn GitHubApi,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Response, ResourceError> {
    let params = &request.params;
    let state = params.state()?;

    let base = dir.join(&params.path);
    let version: Version = read_json(&base.join("version.json"))?;
    let metadata: Metadata = read_json(&base.join("metadata.json"))?;
    let pr_id = metadata.get("pr_id")?;
    let number: u64 = pr_id.parse().map_err(|_| VersionError::InvalidId {
        field: "pr_id",
        value: pr_id.to_string(),
    })?;

    if let Some(state) = state {
        github.set_state(number, &state).await?;
    }

    if params.delete_last_comment {
        github.delete_last_comment(number).await?;
    }

    if !params.labels.is_empty() {
        github.replace_labels(number, &params.labels).await?;
    } else {
        if !params.add_labels.is_empty() {
            github.add_labels(number, &params.add_labels).await?;
        }
        if !params.remove_labels.is_empty() {
            github.remove_labels(number, &params.remove_labels).await?;
        }
    }

    let comment = match (params.comment.as_deref(), params.comment_file.as_deref()) {
        (Some(comment), _) if !comment.is_empty() => Some(comment.to_string()),
        (_, Some(file)) if !file.is_empty() => Some(read_file(&base.join(file))?),
        _ => None,
    };
    if let Some(comment) = comment.filter(|c| !c.is_empty()) {
        let body = expand_build_vars(&comment, env);
        github.create_comment(number, &body).await?;
    }

    info!(pr = number, "updated pull request");
    Ok(Response { version, metadata })
}

/// Expand `$VAR` and `${VAR}` for the CI build variables only. Any other
/// reference is left exactly as written; an allowed but unset variable
/// expands to nothing.
pub fn expand_build_vars(text: &str, env: &dyn Fn(&str) -> Option<String>) -> String {
    VAR_REFERENCE
        .replace_all(text, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if BUILD_VARS.contains(&name) {
                env(name).unwrap_or_default()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::{strings, test_source};
    use crate::actions::write_json;
    use crate::github::tests::FakeGitHub;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn build_env(name: &str) -> Option<String> {
        let vars: HashMap<&str, &str> = [
            ("BUILD_ID", "1234"),
            ("BUILD_PIPELINE_NAME", "deploy"),
            ("GITHUB_TOKEN", "s3cret"),
        ]
        .into_iter()
        .collect();
        vars.get(name).map(|v| v.to_string())
    }

    fn version() -> Version {
        Version {
            created_at: "1588593600".to_string(),
            pr_id: Some("42".to_string()),
            comment_id: Some("7".to_string()),
            review_id: None,
        }
    }

    /// Lay out the files `in` would have written under `dir/pr`.
    fn materialized() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("pr");
        std::fs::create_dir_all(&base).unwrap();
        let mut metadata = Metadata::default();
        metadata.add("pr_id", "42");
        metadata.add("comment_id", "7");
        write_json(&base.join("version.json"), &version()).unwrap();
        write_json(&base.join("metadata.json"), &metadata).unwrap();
        std::fs::write(base.join("reply.md"), "Build $BUILD_ID finished").unwrap();
        tmp
    }

    fn request(params: OutParams) -> OutRequest {
        OutRequest {
            source: test_source(),
            params: OutParams {
                path: "pr".to_string(),
                ..params
            },
        }
    }

    #[tokio::test]
    async fn test_labels_replace_wins_over_add_and_remove() {
        let tmp = materialized();
        let github = FakeGitHub::default();
        let request = request(OutParams {
            labels: strings(&["x"]),
            add_labels: strings(&["y"]),
            remove_labels: strings(&["z"]),
            ..Default::default()
        });

        let response = run(&request, tmp.path(), &github, &build_env).await.unwrap();
        assert_eq!(github.calls(), vec!["replace_labels 42 x"]);
        assert_eq!(response.version, version());
        assert_eq!(response.metadata.get("comment_id").unwrap(), "7");
    }

    #[tokio::test]
    async fn test_all_updates_in_order() {
        let tmp = materialized();
        let github = FakeGitHub::default();
        let request = request(OutParams {
            state: Some("Closed".to_string()),
            delete_last_comment: true,
            add_labels: strings(&["deployed", "prod"]),
            remove_labels: strings(&["pending"]),
            comment: Some("Pipeline ${BUILD_PIPELINE_NAME} done".to_string()),
            comment_file: Some("reply.md".to_string()),
            ..Default::default()
        });

        run(&request, tmp.path(), &github, &build_env).await.unwrap();
        assert_eq!(
            github.calls(),
            vec![
                "set_state 42 closed",
                "delete_last_comment 42",
                "add_labels 42 deployed,prod",
                "remove_labels 42 pending",
                "create_comment 42 Pipeline deploy done",
            ]
        );
    }

    #[tokio::test]
    async fn test_comment_from_file() {
        let tmp = materialized();
        let github = FakeGitHub::default();
        let request = request(OutParams {
            comment_file: Some("reply.md".to_string()),
            ..Default::default()
        });

        run(&request, tmp.path(), &github, &build_env).await.unwrap();
        assert_eq!(github.calls(), vec!["create_comment 42 Build 1234 finished"]);
    }

    #[tokio::test]
    async fn test_empty_comment_file_posts_nothing() {
        let tmp = materialized();
        std::fs::write(tmp.path().join("pr").join("empty.md"), "").unwrap();
        let github = FakeGitHub::default();
        let request = request(OutParams {
            comment: Some(String::new()),
            comment_file: Some("empty.md".to_string()),
            ..Default::default()
        });

        run(&request, tmp.path(), &github, &build_env).await.unwrap();
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_state_is_rejected_before_any_call() {
        let tmp = materialized();
        let github = FakeGitHub::default();
        let request = request(OutParams {
            state: Some("merged".to_string()),
            add_labels: strings(&["y"]),
            ..Default::default()
        });

        let result = run(&request, tmp.path(), &github, &build_env).await;
        assert!(matches!(
            result,
            Err(ResourceError::Config(ConfigError::InvalidState(state))) if state == "merged"
        ));
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_materialization_fails() {
        let tmp = TempDir::new().unwrap();
        let github = FakeGitHub::default();
        let result = run(&request(OutParams::default()), tmp.path(), &github, &build_env).await;
        assert!(matches!(result, Err(ResourceError::Io { .. })));
    }

    #[tokio::test]
    async fn test_metadata_without_pr_id_fails() {
        let tmp = materialized();
        let base = tmp.path().join("pr");
        let mut metadata = Metadata::default();
        metadata.add("comment_id", "7");
        write_json(&base.join("metadata.json"), &metadata).unwrap();

        let github = FakeGitHub::default();
        let result = run(&request(OutParams::default()), tmp.path(), &github, &build_env).await;
        assert!(matches!(result, Err(ResourceError::Metadata(_))));
    }

    #[test]
    fn test_expand_build_vars() {
        let expanded = expand_build_vars(
            "build ${BUILD_ID} of $BUILD_PIPELINE_NAME by $USER with $GITHUB_TOKEN ${HOME}, $BUILD_NAME.",
            &build_env,
        );
        assert_eq!(
            expanded,
            "build 1234 of deploy by $USER with $GITHUB_TOKEN ${HOME}, ."
        );
    }

    #[test]
    fn test_out_request_rejects_unknown_params() {
        let result: Result<OutRequest, _> = serde_json::from_str(
            r#"{"source": {"repository": "octocat/hello-world"}, "params": {"path": "pr", "colour": "red"}}"#,
        );
        assert!(result.is_err());
    }
}
