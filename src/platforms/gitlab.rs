use crate::error::FetchError;
use crate::platforms::{
    build_client, parse_url, path_segments, read_json, require_token, send_checked,
    PullRequestDetails, PullRequestFetcher,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const PLATFORM: &str = "GitLab";
const TOKEN_ENV: &str = "GITLAB_TOKEN";
const DEFAULT_API: &str = "https://gitlab.com";

pub struct GitLabFetcher {
    client: Client,
    token: Option<String>,
    api_base: String,
}

#[derive(Deserialize)]
struct MergeRequest {
    title: String,
    iid: u64,
}

#[derive(Deserialize)]
struct MergeRequestChanges {
    changes: Vec<FileChange>,
}

#[derive(Deserialize)]
struct FileChange {
    old_path: String,
    new_path: String,
    #[serde(default)]
    diff: String,
    #[serde(default)]
    new_file: bool,
    #[serde(default)]
    deleted_file: bool,
}

#[derive(Debug, PartialEq)]
struct MergeTarget {
    project: String,
    iid: u64,
}

impl GitLabFetcher {
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

    /// `https://{host}/{group}/{subgroup...}/{project}/-/merge_requests/{iid}`
    fn parse_merge_url(url: &str) -> Result<MergeTarget, FetchError> {
        let parsed = parse_url(url)?;
        let segments = path_segments(&parsed);
        let invalid = || {
            FetchError::InvalidUrl(format!(
                "{} (expected https://gitlab.com/group/project/-/merge_requests/123)",
                url
            ))
        };

        let marker = segments
            .windows(2)
            .position(|pair| pair[0] == "-" && pair[1] == "merge_requests")
            .ok_or_else(invalid)?;
        if marker == 0 {
            return Err(invalid());
        }
        let iid = segments
            .get(marker + 2)
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)?;

        Ok(MergeTarget {
            project: segments[..marker].join("/"),
            iid,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header("PRIVATE-TOKEN", token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, FetchError> {
        send_checked(PLATFORM, request)
            .await
            .map_err(|err| require_token(err, self.token.is_some(), TOKEN_ENV))
    }
}

/// Rebuilds unified diff text from the per-file hunks GitLab returns.
fn assemble_diff(changes: &[FileChange]) -> String {
    let mut out = String::new();
    for change in changes {
        out.push_str(&format!(
            "diff --git a/{} b/{}\n",
            change.old_path, change.new_path
        ));
        if change.new_file {
            out.push_str("new file mode 100644\n--- /dev/null\n");
        } else {
            out.push_str(&format!("--- a/{}\n", change.old_path));
        }
        if change.deleted_file {
            out.push_str("deleted file mode 100644\n+++ /dev/null\n");
        } else {
            out.push_str(&format!("+++ b/{}\n", change.new_path));
        }
        out.push_str(&change.diff);
        if !change.diff.is_empty() && !change.diff.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[async_trait]
impl PullRequestFetcher for GitLabFetcher {
    async fn fetch_pull_request(&self, url: &str) -> Result<PullRequestDetails, FetchError> {
        let target = Self::parse_merge_url(url)?;
        let api_url = format!(
            "{}/api/v4/projects/{}/merge_requests/{}",
            self.api_base,
            target.project.replace('/', "%2F"),
            target.iid
        );

        debug!("Fetching GitLab merge request {}", api_url);
        let response = self.send(self.get(&api_url)).await?;
        let merge_request: MergeRequest = read_json(PLATFORM, response).await?;

        let response = self.send(self.get(&format!("{}/changes", api_url))).await?;
        let changes: MergeRequestChanges = read_json(PLATFORM, response).await?;

        Ok(PullRequestDetails {
            diff: assemble_diff(&changes.changes),
            title: merge_request.title,
            number: merge_request.iid,
            repository: target.project,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff_parser::DiffParser;
    use mockito::Matcher;

    #[test]
    fn parses_nested_group_urls() {
        assert_eq!(
            GitLabFetcher::parse_merge_url("https://gitlab.com/acme/platform/web/-/merge_requests/15/diffs")
                .unwrap(),
            MergeTarget {
                project: "acme/platform/web".to_string(),
                iid: 15,
            }
        );
        assert!(GitLabFetcher::parse_merge_url("https://gitlab.com/acme/web/merge_requests/15").is_err());
        assert!(GitLabFetcher::parse_merge_url("https://gitlab.com/-/merge_requests/15").is_err());
        assert!(GitLabFetcher::parse_merge_url("https://gitlab.com/acme/web/-/merge_requests/").is_err());
    }

    #[test]
    fn assembled_diff_parses_back_into_files() {
        let changes = vec![
            FileChange {
                old_path: "src/a.rs".to_string(),
                new_path: "src/a.rs".to_string(),
                diff: "@@ -1 +1 @@\n-old\n+new".to_string(),
                new_file: false,
                deleted_file: false,
            },
            FileChange {
                old_path: "src/b.rs".to_string(),
                new_path: "src/b.rs".to_string(),
                diff: "@@ -0,0 +1 @@\n+fresh\n".to_string(),
                new_file: true,
                deleted_file: false,
            },
        ];

        let diffs = DiffParser::parse_unified_diff(&assemble_diff(&changes)).unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].file_name(), "src/a.rs");
        assert_eq!(diffs[0].hunks[0].changes.len(), 2);
        assert!(diffs[1].is_new);
        assert_eq!(diffs[1].old_path, None);
    }

    #[tokio::test]
    async fn fetches_merge_request_and_changes() {
        let mut server = mockito::Server::new_async().await;
        let meta = server
            .mock(
                "GET",
                Matcher::Regex(r"^/api/v4/projects/acme(%2F|/)web/merge_requests/3$".to_string()),
            )
            .match_header("private-token", "gl-token")
            .with_status(200)
            .with_body(r#"{"title":"Fix login","iid":3}"#)
            .create_async()
            .await;
        let changes = server
            .mock(
                "GET",
                Matcher::Regex(r"^/api/v4/projects/acme(%2F|/)web/merge_requests/3/changes$".to_string()),
            )
            .with_status(200)
            .with_body(
                r#"{"changes":[{"old_path":"app.py","new_path":"app.py","diff":"@@ -1 +1 @@\n-a\n+b\n","new_file":false,"deleted_file":false}]}"#,
            )
            .create_async()
            .await;

        let fetcher = GitLabFetcher::new(Some("gl-token".to_string()), Some(server.url())).unwrap();
        let details = fetcher
            .fetch_pull_request("https://gitlab.com/acme/web/-/merge_requests/3")
            .await
            .unwrap();

        meta.assert_async().await;
        changes.assert_async().await;
        assert_eq!(details.title, "Fix login");
        assert_eq!(details.number, 3);
        assert_eq!(details.repository, "acme/web");
        assert!(details.diff.starts_with("diff --git a/app.py b/app.py\n--- a/app.py\n+++ b/app.py\n@@"));
    }
}
