use crate::core::budget::{OversizedPatch, TokenBudget};
use crate::core::diff_parser::DiffParser;
use crate::core::patch::{build_file_patches, FilePatch};
use crate::core::response::{parse_review, ReviewComment};
use crate::core::reviewer::{FileFailure, Reviewer};
use crate::platforms::{PullRequestDetails, PullRequestFetcher};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct PullRequestSummary {
    pub title: String,
    pub number: u64,
    pub repository: String,
}

/// Everything one review run produced.
#[derive(Debug, Default, Serialize)]
pub struct ReviewReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestSummary>,
    pub comments: Vec<ReviewComment>,
    pub failures: Vec<FileFailure>,
    pub skipped: Vec<OversizedPatch>,
}

/// Diff text in, parsed comments out.
pub struct ReviewRun {
    reviewer: Reviewer,
    budget: TokenBudget,
    max_concurrency: usize,
}

impl ReviewRun {
    pub fn new(reviewer: Reviewer, budget: TokenBudget, max_concurrency: usize) -> Self {
        Self {
            reviewer,
            budget,
            max_concurrency,
        }
    }

    pub async fn review_pull_request(
        &self,
        fetcher: &dyn PullRequestFetcher,
        url: &str,
    ) -> Result<ReviewReport> {
        let details: PullRequestDetails = fetcher
            .fetch_pull_request(url)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        info!(
            "Reviewing {}#{}: {}",
            details.repository, details.number, details.title
        );

        let mut report = self.review_diff(&details.diff).await?;
        report.pull_request = Some(PullRequestSummary {
            title: details.title,
            number: details.number,
            repository: details.repository,
        });
        Ok(report)
    }

    pub async fn review_diff(&self, diff_text: &str) -> Result<ReviewReport> {
        let diffs = DiffParser::parse_unified_diff(diff_text)?;
        info!("Parsed {} file diffs", diffs.len());

        let (patches, skipped) = self.partition_by_budget(build_file_patches(&diffs));
        let batch = self.reviewer.review_all(patches, self.max_concurrency).await;

        let mut comments = Vec::new();
        for result in &batch.results {
            if result.is_lgtm() {
                info!("{}: LGTM", result.file_name);
                continue;
            }
            comments.extend(parse_review(&result.response, &result.file_name));
        }

        info!(
            "Review finished: {} comment(s), {} failure(s), {} skipped",
            comments.len(),
            batch.failures.len(),
            skipped.len()
        );

        Ok(ReviewReport {
            pull_request: None,
            comments,
            failures: batch.failures,
            skipped,
        })
    }

    fn partition_by_budget(&self, patches: Vec<FilePatch>) -> (Vec<FilePatch>, Vec<OversizedPatch>) {
        let mut accepted = Vec::with_capacity(patches.len());
        let mut skipped = Vec::new();

        for patch in patches {
            match self.budget.check(&patch.file_name, &patch.patch) {
                Ok(_) => accepted.push(patch),
                Err(oversized) => {
                    warn!(
                        "Skipping {}: {} tokens exceeds limit of {}",
                        oversized.file_name, oversized.tokens, oversized.limit
                    );
                    skipped.push(oversized);
                }
            }
        }

        (accepted, skipped)
    }
}
