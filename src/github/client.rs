use reqwest::header::{HeaderMap, ACCEPT, LINK, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::types::{Comment, PullRequest, Review};
use super::{GitHubApi, GitHubError};
use crate::config::{RepoSlug, SourceConfig};

const AGENT: &str = "pr-comment-resource";

#[derive(Clone)]
enum Auth {
    Token(String),
    Basic { username: String, password: String },
    Anonymous,
}

/// reqwest-backed GitHub REST client scoped to one repository.
pub struct GitHubClient {
    client: Client,
    api_base: String,
    repo: RepoSlug,
    auth: Auth,
}

#[derive(Deserialize)]
struct AuthenticatedUser {
    id: u64,
}

impl GitHubClient {
    /// Build a client from the resource source: repository, credentials,
    /// endpoint override and TLS verification flag.
    pub fn from_source(source: &SourceConfig) -> Result<Self, GitHubError> {
        let auth = match (source.github_token(), &source.username, &source.password) {
            (Some(token), _, _) => Auth::Token(token),
            (None, Some(username), Some(password)) => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Auth::Anonymous,
        };

        let client = Client::builder()
            .danger_accept_invalid_certs(source.skip_ssl)
            .build()?;

        Ok(Self {
            client,
            api_base: source.api_base(),
            repo: source.repo_slug()?,
            auth,
        })
    }

    fn repo_url(&self, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_base, self.repo.owner, self.repo.name, rest
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, url)
            .header(USER_AGENT, AGENT)
            .header(ACCEPT, "application/vnd.github+json");

        match &self.auth {
            Auth::Token(token) => req.bearer_auth(token),
            Auth::Basic { username, password } => req.basic_auth(username, Some(password)),
            Auth::Anonymous => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, GitHubError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(GitHubError::Status { status, url, body });
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, GitHubError> {
        let url = resp.url().to_string();
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|source| GitHubError::Decode { url, source })
    }

    async fn get_one<T: DeserializeOwned>(&self, url: &str) -> Result<T, GitHubError> {
        let resp = self.send(self.request(Method::GET, url)).await?;
        Self::decode(resp).await
    }

    /// GET every page of a list endpoint by following `Link: rel="next"`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, GitHubError> {
        let mut items = Vec::new();
        let mut req = self
            .request(Method::GET, url)
            .query(query)
            .query(&[("per_page", "100")]);

        loop {
            let resp = self.send(req).await?;
            let next = next_page_url(resp.headers());
            let page: Vec<T> = Self::decode(resp).await?;
            debug!(count = page.len(), "received page");
            items.extend(page);

            match next {
                Some(next) => req = self.request(Method::GET, &next),
                None => break,
            }
        }

        Ok(items)
    }

    async fn authenticated_user_id(&self) -> Result<u64, GitHubError> {
        let user: AuthenticatedUser = self
            .get_one(&format!("{}/user", self.api_base))
            .await?;
        Ok(user.id)
    }
}

/// Extract the `rel="next"` target from a Link header.
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|param| param.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

#[async_trait::async_trait]
impl GitHubApi for GitHubClient {
    #[instrument(skip(self), fields(repo = %self.repo.name))]
    async fn list_pull_requests(&self) -> Result<Vec<PullRequest>, GitHubError> {
        self.get_all(&self.repo_url("/pulls"), &[("state", "all")])
            .await
    }

    #[instrument(skip(self))]
    async fn get_pull_request(&self, number: u64) -> Result<PullRequest, GitHubError> {
        self.get_one(&self.repo_url(&format!("/pulls/{number}")))
            .await
    }

    #[instrument(skip(self))]
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError> {
        self.get_all(&self.repo_url(&format!("/issues/{number}/comments")), &[])
            .await
    }

    #[instrument(skip(self))]
    async fn get_comment(&self, comment_id: u64) -> Result<Comment, GitHubError> {
        self.get_one(&self.repo_url(&format!("/issues/comments/{comment_id}")))
            .await
    }

    #[instrument(skip(self))]
    async fn list_reviews(&self, number: u64) -> Result<Vec<Review>, GitHubError> {
        self.get_all(&self.repo_url(&format!("/pulls/{number}/reviews")), &[])
            .await
    }

    #[instrument(skip(self))]
    async fn get_review(&self, number: u64, review_id: u64) -> Result<Review, GitHubError> {
        self.get_one(&self.repo_url(&format!("/pulls/{number}/reviews/{review_id}")))
            .await
    }

    #[instrument(skip(self))]
    async fn set_state(&self, number: u64, state: &str) -> Result<(), GitHubError> {
        let req = self
            .request(Method::PATCH, &self.repo_url(&format!("/issues/{number}")))
            .json(&json!({ "state": state }));
        self.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_last_comment(&self, number: u64) -> Result<(), GitHubError> {
        let me = self.authenticated_user_id().await?;
        let comments = self.list_comments(number).await?;

        let Some(last) = comments.iter().rev().find(|comment| comment.user.id == me) else {
            debug!(user_id = me, "no comment by the authenticated user; nothing to delete");
            return Ok(());
        };

        debug!(comment_id = last.id, "deleting comment");
        let req = self.request(
            Method::DELETE,
            &self.repo_url(&format!("/issues/comments/{}", last.id)),
        );
        self.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError> {
        let req = self
            .request(Method::POST, &self.repo_url(&format!("/issues/{number}/labels")))
            .json(&json!({ "labels": labels }));
        self.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError> {
        for label in labels {
            let base = self.repo_url(&format!("/issues/{number}/labels"));
            let mut url =
                reqwest::Url::parse(&base).map_err(|_| GitHubError::InvalidUrl(base.clone()))?;
            url.path_segments_mut()
                .map_err(|_| GitHubError::InvalidUrl(base.clone()))?
                .push(label);

            self.send(self.request(Method::DELETE, url.as_str())).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn replace_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError> {
        let req = self
            .request(Method::PUT, &self.repo_url(&format!("/issues/{number}/labels")))
            .json(&json!({ "labels": labels }));
        self.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self, body), fields(body_len = body.len()))]
    async fn create_comment(&self, number: u64, body: &str) -> Result<(), GitHubError> {
        let req = self
            .request(Method::POST, &self.repo_url(&format!("/issues/{number}/comments")))
            .json(&json!({ "body": body }));
        self.send(req).await?;
        Ok(())
    }
}
