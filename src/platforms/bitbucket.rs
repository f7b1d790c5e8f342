use crate::error::FetchError;
use crate::platforms::{
    build_client, parse_url, path_segments, read_json, require_token, send_checked,
    PullRequestDetails, PullRequestFetcher,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const PLATFORM: &str = "Bitbucket";
const TOKEN_ENV: &str = "BITBUCKET_TOKEN";
const DEFAULT_API: &str = "https://api.bitbucket.org/2.0";

pub struct BitbucketFetcher {
    client: Client,
    token: Option<String>,
    api_base: String,
}

#[derive(Deserialize)]
struct PullRequest {
    title: String,
    id: u64,
}

impl BitbucketFetcher {
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

    /// `https://bitbucket.org/{workspace}/{repo}/pull-requests/{id}` → (workspace, repo, id)
    fn parse_pull_url(url: &str) -> Result<(String, String, u64), FetchError> {
        let parsed = parse_url(url)?;
        let segments = path_segments(&parsed);
        if segments.len() < 4 || segments[2] != "pull-requests" {
            return Err(FetchError::InvalidUrl(format!(
                "{} (expected https://bitbucket.org/workspace/repo/pull-requests/123)",
                url
            )));
        }
        let id = segments[3]
            .parse()
            .map_err(|_| FetchError::InvalidUrl(format!("{} (PR id is not an integer)", url)))?;
        Ok((segments[0].clone(), segments[1].clone(), id))
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
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
impl PullRequestFetcher for BitbucketFetcher {
    async fn fetch_pull_request(&self, url: &str) -> Result<PullRequestDetails, FetchError> {
        let (workspace, repo, id) = Self::parse_pull_url(url)?;
        let api_url = format!(
            "{}/repositories/{}/{}/pullrequests/{}",
            self.api_base, workspace, repo, id
        );

        debug!("Fetching Bitbucket pull request {}", api_url);
        let response = self.send(self.get(&api_url)).await?;
        let pull: PullRequest = read_json(PLATFORM, response).await?;

        // The diff endpoint redirects; reqwest follows it
        let response = self.send(self.get(&format!("{}/diff", api_url))).await?;
        let diff = response.text().await?;

        Ok(PullRequestDetails {
            diff,
            title: pull.title,
            number: pull.id,
            repository: format!("{}/{}", workspace, repo),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pull_urls() {
        assert_eq!(
            BitbucketFetcher::parse_pull_url("https://bitbucket.org/acme/api/pull-requests/9/overview")
                .unwrap(),
            ("acme".to_string(), "api".to_string(), 9)
        );
        assert!(BitbucketFetcher::parse_pull_url("https://bitbucket.org/acme/api/pull/9").is_err());
    }

    #[tokio::test]
    async fn fetches_pull_request_and_diff() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/acme/api/pullrequests/9")
            .match_header("authorization", "Bearer bb-token")
            .with_status(200)
            .with_body(r#"{"title":"Add cache","id":9}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/repositories/acme/api/pullrequests/9/diff")
            .with_status(200)
            .with_body("diff --git a/cache.go b/cache.go\n")
            .create_async()
            .await;

        let fetcher = BitbucketFetcher::new(Some("bb-token".to_string()), Some(server.url())).unwrap();
        let details = fetcher
            .fetch_pull_request("https://bitbucket.org/acme/api/pull-requests/9")
            .await
            .unwrap();

        assert_eq!(details.title, "Add cache");
        assert_eq!(details.number, 9);
        assert_eq!(details.repository, "acme/api");
        assert_eq!(details.diff, "diff --git a/cache.go b/cache.go\n");
    }

    #[tokio::test]
    async fn server_error_on_diff_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/acme/api/pullrequests/9")
            .with_status(200)
            .with_body(r#"{"title":"Add cache","id":9}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/repositories/acme/api/pullrequests/9/diff")
            .with_status(502)
            .create_async()
            .await;

        let fetcher = BitbucketFetcher::new(None, Some(server.url())).unwrap();
        let err = fetcher
            .fetch_pull_request("https://bitbucket.org/acme/api/pull-requests/9")
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn unauthorized_without_token_is_missing_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/acme/private/pullrequests/4")
            .with_status(401)
            .with_body(r#"{"type":"error"}"#)
            .create_async()
            .await;

        let fetcher = BitbucketFetcher::new(None, Some(server.url())).unwrap();
        let err = fetcher
            .fetch_pull_request("https://bitbucket.org/acme/private/pull-requests/4")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::MissingToken { platform: "Bitbucket", env_var: "BITBUCKET_TOKEN" }
        ));
    }
}
