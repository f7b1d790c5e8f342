//! Pull request review pipeline: fetch a diff, normalize each file into a
//! numbered patch, ask a language model for review, and parse the reply
//! into line-anchored comments.

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;
pub mod platforms;

pub use error::{CompletionError, FetchError, ParseError};
