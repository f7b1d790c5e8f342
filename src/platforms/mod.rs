pub mod bitbucket;
pub mod github;
pub mod gitlab;

pub use bitbucket::BitbucketFetcher;
pub use github::GitHubFetcher;
pub use gitlab::GitLabFetcher;

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A pull/merge request as fetched from its hosting platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestDetails {
    pub diff: String,
    pub title: String,
    pub number: u64,
    pub repository: String,
}

#[async_trait]
pub trait PullRequestFetcher: Send + Sync {
    async fn fetch_pull_request(&self, url: &str) -> Result<PullRequestDetails, FetchError>;
}

/// Tokens and API endpoints per hosting platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub bitbucket_token: Option<String>,
    pub github_api: Option<String>,
    pub gitlab_api: Option<String>,
    pub bitbucket_api: Option<String>,
}

impl PlatformConfig {
    /// Fills missing tokens from `GITHUB_TOKEN`, `GITLAB_TOKEN` and `BITBUCKET_TOKEN`.
    pub fn with_env_tokens(mut self) -> Self {
        let from_env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        self.github_token = self.github_token.or_else(|| from_env("GITHUB_TOKEN"));
        self.gitlab_token = self.gitlab_token.or_else(|| from_env("GITLAB_TOKEN"));
        self.bitbucket_token = self.bitbucket_token.or_else(|| from_env("BITBUCKET_TOKEN"));
        self
    }
}

/// Picks the fetcher for the URL's host.
pub fn fetcher_for_url(
    url: &str,
    config: &PlatformConfig,
) -> Result<Box<dyn PullRequestFetcher>, FetchError> {
    let parsed = parse_url(url)?;
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

    match host.as_str() {
        "github.com" | "www.github.com" => Ok(Box::new(GitHubFetcher::new(
            config.github_token.clone(),
            config.github_api.clone(),
        )?)),
        "bitbucket.org" | "www.bitbucket.org" => Ok(Box::new(BitbucketFetcher::new(
            config.bitbucket_token.clone(),
            config.bitbucket_api.clone(),
        )?)),
        // Self-hosted GitLab instances usually carry the name in the host
        h if h.contains("gitlab") => {
            let api = config
                .gitlab_api
                .clone()
                .unwrap_or_else(|| format!("{}://{}", parsed.scheme(), h));
            Ok(Box::new(GitLabFetcher::new(config.gitlab_token.clone(), Some(api))?))
        }
        _ => Err(FetchError::UnsupportedHost(host)),
    }
}

pub(crate) fn parse_url(url: &str) -> Result<Url, FetchError> {
    Url::parse(url.trim()).map_err(|err| FetchError::InvalidUrl(format!("{}: {}", url, err)))
}

/// Non-empty path segments of a URL.
pub(crate) fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn build_client() -> Result<Client, FetchError> {
    Ok(Client::builder()
        .user_agent(concat!("prreview/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .build()?)
}

/// Sends the request and turns a non-success status into `FetchError::Status`.
pub(crate) async fn send_checked(
    platform: &'static str,
    request: RequestBuilder,
) -> Result<Response, FetchError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            platform,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// A 401/403 answer to a request sent without a token means one is required.
pub(crate) fn require_token(
    err: FetchError,
    authenticated: bool,
    env_var: &'static str,
) -> FetchError {
    match err {
        FetchError::Status {
            platform,
            status: 401 | 403,
            ..
        } if !authenticated => FetchError::MissingToken { platform, env_var },
        other => other,
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    platform: &'static str,
    response: Response,
) -> Result<T, FetchError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|err| FetchError::Payload {
        platform,
        message: err.to_string(),
    })
}
