use std::time::Duration;
use thiserror::Error;

/// Failures while retrieving a pull request from a hosting platform.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid pull request URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported hosting platform: {0}")]
    UnsupportedHost(String),

    #[error("{platform} requires authentication for this pull request. Set {env_var} or provide a token in config")]
    MissingToken {
        platform: &'static str,
        env_var: &'static str,
    },

    #[error("{platform} API error ({status}): {body}")]
    Status {
        platform: &'static str,
        status: u16,
        body: String,
    },

    #[error("Malformed {platform} payload: {message}")]
    Payload {
        platform: &'static str,
        message: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures of a single completion request.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("{provider} API key not found. Set {env_var} environment variable or provide in config")]
    MissingCredentials {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("Completion request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{provider} API error ({status}): {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),
}

/// A review segment that does not have the `<start>-<end>` / comment shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Segment has no comment line after header {header:?}")]
    MissingComment { header: String },

    #[error("Invalid line range header: {header:?}")]
    InvalidHeader { header: String },

    #[error("Line range {start}-{end} ends before it starts")]
    InvertedRange { start: u32, end: u32 },
}
