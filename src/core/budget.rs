use serde::Serialize;
use std::sync::Arc;

/// Patches above this many tokens are not sent for review.
pub const DEFAULT_TOKEN_LIMIT: usize = 20_000;

/// Token estimation collaborator.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Roughly four characters per token, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Classification produced for a patch over the limit. Not an error: the
/// caller decides whether to skip, truncate or split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OversizedPatch {
    pub file_name: String,
    pub tokens: usize,
    pub limit: usize,
}

#[derive(Clone)]
pub struct TokenBudget {
    limit: usize,
    counter: Arc<dyn TokenCounter>,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicTokenCounter))
    }
}

impl TokenBudget {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            limit: DEFAULT_TOKEN_LIMIT,
            counter,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn count(&self, patch_text: &str) -> usize {
        self.counter.count(patch_text)
    }

    pub fn is_too_large(&self, patch_text: &str) -> bool {
        self.count(patch_text) > self.limit
    }

    /// Returns the token count, or the oversize classification.
    pub fn check(&self, file_name: &str, patch_text: &str) -> Result<usize, OversizedPatch> {
        let tokens = self.count(patch_text);
        if tokens > self.limit {
            return Err(OversizedPatch {
                file_name: file_name.to_string(),
                tokens,
                limit: self.limit,
            });
        }
        Ok(tokens)
    }
}
