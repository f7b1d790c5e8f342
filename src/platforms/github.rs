use crate::error::FetchError;
use crate::platforms::{
    build_client, parse_url, path_segments, read_json, require_token, send_checked,
    PullRequestDetails, PullRequestFetcher,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const PLATFORM: &str = "GitHub";
const TOKEN_ENV: &str = "GITHUB_TOKEN";
const DEFAULT_API: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

pub struct GitHubFetcher {
    client: Client,
    token: Option<String>,
    api_base: String,
}

#[derive(Deserialize)]
struct PullRequest {
    title: String,
    number: u64,
}

#[derive(Debug, PartialEq)]
struct PullTarget {
    owner: String,
    repo: String,
    number: u64,
}

impl GitHubFetcher {
    pub fn new(token: Option<String>, api_base: Option<String>) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client()?,
            token,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// `https://github.com/{owner}/{repo}/pull/{number}[/files|/commits]`
    fn parse_pull_url(url: &str) -> Result<PullTarget, FetchError> {
        let parsed = parse_url(url)?;
        let segments = path_segments(&parsed);
        if segments.len() < 4 || segments[2] != "pull" {
            return Err(FetchError::InvalidUrl(format!(
                "{} (expected https://github.com/owner/repo/pull/123)",
                url
            )));
        }
        let number = segments[3]
            .parse()
            .map_err(|_| FetchError::InvalidUrl(format!("{} (PR number is not an integer)", url)))?;

        Ok(PullTarget {
            owner: segments[0].clone(),
            repo: segments[1].clone(),
            number,
        })
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, FetchError> {
        send_checked(PLATFORM, request)
            .await
            .map_err(|err| require_token(err, self.token.is_some(), TOKEN_ENV))
    }
}

#[async_trait]
impl PullRequestFetcher for GitHubFetcher {
    async fn fetch_pull_request(&self, url: &str) -> Result<PullRequestDetails, FetchError> {
        let target = Self::parse_pull_url(url)?;
        let api_url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base, target.owner, target.repo, target.number
        );

        debug!("Fetching GitHub pull request {}", api_url);
        let response = self.send(self.get(&api_url, "application/vnd.github+json")).await?;
        let pull: PullRequest = read_json(PLATFORM, response).await?;

        let response = self.send(self.get(&api_url, "application/vnd.github.v3.diff")).await?;
        let diff = response.text().await?;

        Ok(PullRequestDetails {
            diff,
            title: pull.title,
            number: pull.number,
            repository: format!("{}/{}", target.owner, target.repo),
        })
    }
}
