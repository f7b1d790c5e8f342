use crate::adapters::llm::{LLMAdapter, LLMRequest};
use crate::core::patch::FilePatch;
use crate::core::prompt::PromptTemplate;
use crate::core::response::ReviewResult;
use crate::error::CompletionError;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// A file whose review request failed.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file_name: String,
    pub error: String,
}

/// Outcome of reviewing several files: successes and failures side by side.
#[derive(Debug, Default)]
pub struct ReviewBatch {
    pub results: Vec<ReviewResult>,
    pub failures: Vec<FileFailure>,
}

/// Sends normalized patches through the prompt template to the completion
/// collaborator, one request per file, with deterministic sampling.
pub struct Reviewer {
    adapter: Arc<dyn LLMAdapter>,
    template: PromptTemplate,
    timeout: Duration,
}

impl Reviewer {
    pub fn new(adapter: Arc<dyn LLMAdapter>, template: PromptTemplate) -> Self {
        Self {
            adapter,
            template,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        self.adapter.model_name()
    }

    pub async fn request_review(
        &self,
        patch: &str,
        filename: &str,
    ) -> Result<ReviewResult, CompletionError> {
        let request = LLMRequest {
            system_prompt: None,
            user_prompt: self.template.render(patch, filename),
            temperature: Some(0.0),
            max_tokens: None,
        };

        debug!("Requesting review of {} from {}", filename, self.model_name());
        let response = tokio::time::timeout(self.timeout, self.adapter.complete(request))
            .await
            .map_err(|_| CompletionError::Timeout(self.timeout))??;

        Ok(ReviewResult {
            file_name: filename.to_string(),
            response: response.content,
        })
    }

    /// Reviews every patch with at most `max_concurrency` requests in flight.
    /// Results keep the input order; a failed file never aborts the others.
    pub async fn review_all(&self, patches: Vec<FilePatch>, max_concurrency: usize) -> ReviewBatch {
        info!(
            "Reviewing {} file(s) with up to {} concurrent request(s)",
            patches.len(),
            max_concurrency.max(1)
        );

        let outcomes: Vec<(String, Result<ReviewResult, CompletionError>)> = stream::iter(patches)
            .map(|file| async move {
                let outcome = self.request_review(&file.patch, &file.file_name).await;
                (file.file_name, outcome)
            })
            .buffered(max_concurrency.max(1))
            .collect()
            .await;

        let mut batch = ReviewBatch::default();
        for (file_name, outcome) in outcomes {
            match outcome {
                Ok(result) => batch.results.push(result),
                Err(err) => {
                    warn!("Review of {} failed: {}", file_name, err);
                    batch.failures.push(FileFailure {
                        file_name,
                        error: err.to_string(),
                    });
                }
            }
        }
        batch
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::llm::{LLMResponse, ModelConfig};
    use crate::adapters::openai::OpenAIAdapter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers by file name found in the prompt; unknown files fail.
    #[derive(Default)]
    pub(crate) struct ScriptedAdapter {
        pub responses: HashMap<String, String>,
        pub delay: Option<Duration>,
        pub requests: Mutex<Vec<LLMRequest>>,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl ScriptedAdapter {
        pub(crate) fn with_responses(responses: &[(&str, &str)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(file, text)| (file.to_string(), text.to_string()))
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LLMAdapter for ScriptedAdapter {
        async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, CompletionError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let answer = self
                .responses
                .iter()
                .find(|(file, _)| request.user_prompt.contains(&format!("`{}`", file)))
                .map(|(_, text)| text.clone());
            self.requests.lock().unwrap().push(request);

            match answer {
                Some(content) => Ok(LLMResponse {
                    content,
                    model: "scripted".to_string(),
                    usage: None,
                }),
                None => Err(CompletionError::Status {
                    provider: "Scripted",
                    status: 500,
                    body: "no script".to_string(),
                }),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn patch(file_name: &str) -> FilePatch {
        FilePatch {
            file_name: file_name.to_string(),
            patch: format!("---new_hunk---\n1: {}\n\n---old_hunk---\n", file_name),
        }
    }

    #[tokio::test]
    async fn request_review_pairs_filename_with_response_at_zero_temperature() {
        let adapter = Arc::new(ScriptedAdapter::with_responses(&[("a.rs", "LGTM!")]));
        let reviewer = Reviewer::new(adapter.clone(), PromptTemplate::default());

        let result = reviewer.request_review("PATCH-BODY", "a.rs").await.unwrap();
        assert_eq!(
            result,
            ReviewResult {
                file_name: "a.rs".to_string(),
                response: "LGTM!".to_string(),
            }
        );

        let requests = adapter.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(0.0));
        assert!(requests[0].user_prompt.contains("PATCH-BODY"));
    }

    #[tokio::test]
    async fn request_review_overrides_adapter_temperature() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "temperature": 0.0,
            })))
            .with_status(200)
            .with_body(r#"{"model":"gpt-4o-mini","choices":[{"message":{"role":"assistant","content":"LGTM!"}}]}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(ModelConfig {
            api_key: Some("sk-test".to_string()),
            base_url: Some(server.url()),
            temperature: 0.7,
            ..ModelConfig::default()
        })
        .unwrap();
        let reviewer = Reviewer::new(Arc::new(adapter), PromptTemplate::default());

        let result = reviewer.request_review("p", "a.rs").await.unwrap();
        mock.assert_async().await;
        assert_eq!(result.response, "LGTM!");
    }

    #[tokio::test]
    async fn request_review_propagates_adapter_failure() {
        let reviewer = Reviewer::new(Arc::new(ScriptedAdapter::default()), PromptTemplate::default());
        let err = reviewer.request_review("p", "missing.rs").await.unwrap_err();
        assert!(matches!(err, CompletionError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn request_review_times_out() {
        let adapter = ScriptedAdapter {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedAdapter::with_responses(&[("slow.rs", "LGTM!")])
        };
        let reviewer = Reviewer::new(Arc::new(adapter), PromptTemplate::default())
            .with_timeout(Duration::from_millis(20));

        let err = reviewer.request_review("p", "slow.rs").await.unwrap_err();
        assert!(matches!(err, CompletionError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn review_all_collects_failures_alongside_results_in_order() {
        let adapter = Arc::new(ScriptedAdapter::with_responses(&[
            ("a.rs", "1-1:\nFirst."),
            ("c.rs", "2-2:\nThird."),
        ]));
        let reviewer = Reviewer::new(adapter, PromptTemplate::default());

        let batch = reviewer
            .review_all(vec![patch("a.rs"), patch("b.rs"), patch("c.rs")], 3)
            .await;

        assert_eq!(
            batch.results.iter().map(|r| r.file_name.as_str()).collect::<Vec<_>>(),
            vec!["a.rs", "c.rs"]
        );
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].file_name, "b.rs");
        assert!(batch.failures[0].error.contains("500"));
    }

    #[tokio::test]
    async fn review_all_respects_concurrency_cap() {
        let files = ["a.rs", "b.rs", "c.rs", "d.rs", "e.rs"];
        let responses: Vec<(&str, &str)> = files.iter().map(|f| (*f, "LGTM!")).collect();
        let adapter = Arc::new(ScriptedAdapter {
            delay: Some(Duration::from_millis(20)),
            ..ScriptedAdapter::with_responses(&responses)
        });
        let reviewer = Reviewer::new(adapter.clone(), PromptTemplate::default());

        let batch = reviewer
            .review_all(files.iter().map(|f| patch(f)).collect(), 2)
            .await;

        assert_eq!(batch.results.len(), 5);
        assert!(batch.failures.is_empty());
        assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), 2);
    }
}
