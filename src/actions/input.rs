use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::{write_file, write_json, ResourceError, Response};
use crate::config::{ConfigError, SourceConfig};
use crate::filter::compile_patterns;
use crate::git::{Git, IntegrationTool};
use crate::github::{parse_comment_html_url, GitHubApi, PullRequest};
use crate::metadata::{comment_metadata, enrich_from_comment_body, review_metadata};
use crate::version::{Version, VersionError, VersionTarget};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InParams {
    /// File the comment or review body is written to
    #[serde(default)]
    pub comment_file: Option<String>,
    /// Subdirectory receiving the checkout
    #[serde(default)]
    pub source_path: Option<String>,
    /// 0 pulls full history
    #[serde(default)]
    pub git_depth: u32,
    #[serde(default)]
    pub submodules: bool,
    #[serde(default)]
    pub fetch_tags: bool,
    #[serde(default)]
    pub skip_download: bool,
    #[serde(default)]
    pub integration_tool: Option<String>,
}

impl InParams {
    pub fn comment_file(&self) -> &str {
        non_empty(&self.comment_file).unwrap_or("comment.txt")
    }

    pub fn source_path(&self) -> &str {
        non_empty(&self.source_path).unwrap_or("source")
    }

    pub fn integration_tool(&self) -> Result<IntegrationTool, ConfigError> {
        match non_empty(&self.integration_tool) {
            Some(tool) => tool.parse(),
            None => Ok(IntegrationTool::default()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InRequest {
    pub source: SourceConfig,
    pub version: Version,
    #[serde(default)]
    pub params: InParams,
}

/// Materialize one version into `dir`: body, version and metadata files,
/// then (unless skipped) a checkout of the PR integrated with its base.
///
/// Nothing is cleaned up on failure.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn run(
    request: &InRequest,
    dir: &Path,
    github: &dyn GitHubApi,
    git: &dyn Git,
) -> Result<Response, ResourceError> {
    let source = &request.source;
    let params = &request.params;
    let tool = params.integration_tool()?;
    let version = &request.version;

    let (pull, body, mut metadata) = match version.target()? {
        VersionTarget::Comment(comment_id) => {
            let comment = github.get_comment(comment_id).await?;
            let number = match version.pr_number()? {
                Some(number) => number,
                None => parse_comment_html_url(&comment.html_url)?,
            };
            let pull = github.get_pull_request(number).await?;
            let metadata = comment_metadata(&pull, &comment);
            (pull, comment.body, metadata)
        }
        VersionTarget::Review(review_id) => {
            let number = version
                .pr_number()?
                .ok_or(VersionError::CannotExtrapolate)?;
            let pull = github.get_pull_request(number).await?;
            let review = github.get_review(number, review_id).await?;
            let metadata = review_metadata(&pull, &review);
            (pull, review.body, metadata)
        }
    };
    debug!(pr = pull.number, "resolved version");

    if source.map_comment_meta {
        let patterns = compile_patterns(&source.comments)?;
        enrich_from_comment_body(&mut metadata, &patterns, &body);
    }

    std::fs::create_dir_all(dir).map_err(|source| ResourceError::Io {
        context: format!("failed to create {}", dir.display()),
        source,
    })?;
    write_file(&dir.join(params.comment_file()), &body)?;
    write_json(&dir.join("version.json"), version)?;
    write_json(&dir.join("metadata.json"), &metadata)?;
    for field in metadata.fields() {
        if field.name == params.comment_file() || field.name == params.source_path() {
            debug!(field = %field.name, "not writing field file over a reserved path");
            continue;
        }
        write_file(&dir.join(&field.name), &field.value)?;
    }

    if params.skip_download {
        debug!("skipping source download");
    } else {
        download(source, params, tool, &pull, git).await?;
    }

    info!(pr = pull.number, fields = metadata.len(), "materialized version");
    Ok(Response {
        version: version.clone(),
        metadata,
    })
}

async fn download(
    source: &SourceConfig,
    params: &InParams,
    tool: IntegrationTool,
    pull: &PullRequest,
    git: &dyn Git,
) -> Result<(), ResourceError> {
    let uri = match &pull.base.repo {
        Some(repo) => repo.clone_url.clone(),
        None => {
            let slug = source.repo_slug()?;
            format!("https://github.com/{}/{}.git", slug.owner, slug.name)
        }
    };
    let depth = params.git_depth;
    let submodules = params.submodules;

    git.init(&pull.base.name).await?;
    git.pull(&uri, &pull.base.name, depth, submodules, params.fetch_tags)
        .await?;
    git.fetch(&uri, pull.number, depth, submodules).await?;

    match tool {
        IntegrationTool::Rebase => {
            git.rebase(&pull.base.name, &pull.head.sha, submodules)
                .await?
        }
        IntegrationTool::Merge => git.merge(&pull.head.sha, submodules).await?,
        IntegrationTool::Checkout => {
            git.checkout(&pull.head.name, &pull.head.sha, submodules)
                .await?
        }
    }

    if let Some(key) = non_empty(&source.git_crypt_key) {
        git.git_crypt_unlock(key).await?;
    }
    Ok(())
}
