pub mod budget;
pub mod diff_parser;
pub mod patch;
pub mod prompt;
pub mod response;
pub mod reviewer;
pub mod run;

pub use budget::{HeuristicTokenCounter, OversizedPatch, TokenBudget, TokenCounter, DEFAULT_TOKEN_LIMIT};
pub use diff_parser::{Change, ChangeType, DiffParser, FileDiff, Hunk};
pub use patch::{build_file_patches, normalize, FilePatch};
pub use prompt::PromptTemplate;
pub use response::{parse_review, parse_segments, ReviewComment, ReviewResult, LGTM};
pub use reviewer::{FileFailure, ReviewBatch, Reviewer};
pub use run::{ReviewReport, ReviewRun};
