use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Comment text meaning "no issue here".
pub const LGTM: &str = "LGTM!";

const SEGMENT_DELIMITER: &str = "---";

// `<start>-<end>`, optionally followed by a colon or other non-numeric tail.
static LINE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*-\s*(\d+)[^\d-]*$").expect("line range pattern"));

/// Raw model output for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub file_name: String,
    pub response: String,
}

impl ReviewResult {
    /// True when the model approved the whole file.
    pub fn is_lgtm(&self) -> bool {
        self.response.trim() == LGTM
    }

    pub fn comments(&self) -> Vec<ReviewComment> {
        parse_review(&self.response, &self.file_name)
    }
}

/// One review remark anchored to a line range of the new file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub line_start: u32,
    pub line_end: u32,
    pub comment_text: String,
    /// Suggested change, usually a fenced ```diff block. Empty when absent.
    pub diff: String,
    pub file_name: String,
}

/// Parses a model response into comments, dropping `LGTM!` entries.
///
/// Malformed segments are logged and skipped; they never hide the
/// well-formed segments around them.
pub fn parse_review(response_text: &str, file_name: &str) -> Vec<ReviewComment> {
    if response_text.trim() == LGTM {
        return Vec::new();
    }

    parse_segments(response_text, file_name)
        .into_iter()
        .filter_map(|segment| match segment {
            Ok(comment) => Some(comment),
            Err(err) => {
                warn!("Skipping malformed review segment for {}: {}", file_name, err);
                None
            }
        })
        .filter(|comment| comment.comment_text != LGTM)
        .collect()
}

/// Parses every `---`-delimited segment, in input order. `LGTM!` segments
/// are kept; malformed segments come back as errors.
pub fn parse_segments(
    response_text: &str,
    file_name: &str,
) -> Vec<Result<ReviewComment, ParseError>> {
    response_text
        .split(SEGMENT_DELIMITER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| parse_segment(segment, file_name))
        .collect()
}

fn parse_segment(segment: &str, file_name: &str) -> Result<ReviewComment, ParseError> {
    let mut lines = segment
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty());

    // The caller filters empty segments, so there is always a first line.
    let header = lines.next().unwrap_or_default();
    let (line_start, line_end) = parse_line_range(header)?;

    let comment_text = lines.next().ok_or_else(|| ParseError::MissingComment {
        header: header.to_string(),
    })?;

    let diff = lines.collect::<Vec<_>>().join("\n");

    Ok(ReviewComment {
        line_start,
        line_end,
        comment_text: comment_text.to_string(),
        diff,
        file_name: file_name.to_string(),
    })
}

fn parse_line_range(header: &str) -> Result<(u32, u32), ParseError> {
    let invalid = || ParseError::InvalidHeader {
        header: header.to_string(),
    };

    let caps = LINE_RANGE.captures(header).ok_or_else(invalid)?;
    let start: u32 = caps[1].parse().map_err(|_| invalid())?;
    let end: u32 = caps[2].parse().map_err(|_| invalid())?;

    if start > end {
        return Err(ParseError::InvertedRange { start, end });
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPO_RESPONSE: &str = "31-31:
There's a typo in the component name; it should be `AppProviders` instead of `AppProvider`.
```diff
-           <AppProvider>{children}</AppProvider s>
+           <AppProviders>{children}</AppProviders>
```
---
34-34:
LGTM!
---";

    #[test]
    fn parses_typo_scenario_into_single_comment() {
        let comments = parse_review(TYPO_RESPONSE, "src/App.tsx");
        assert_eq!(
            comments,
            vec![ReviewComment {
                line_start: 31,
                line_end: 31,
                comment_text: "There's a typo in the component name; it should be `AppProviders` instead of `AppProvider`.".to_string(),
                diff: "```diff\n-           <AppProvider>{children}</AppProvider s>\n+           <AppProviders>{children}</AppProviders>\n```".to_string(),
                file_name: "src/App.tsx".to_string(),
            }]
        );
    }

    #[test]
    fn segments_keep_lgtm_entries_in_order() {
        let segments = parse_segments(TYPO_RESPONSE, "src/App.tsx");
        assert_eq!(segments.len(), 2);
        let second = segments[1].as_ref().unwrap();
        assert_eq!((second.line_start, second.line_end), (34, 34));
        assert_eq!(second.comment_text, LGTM);
        assert_eq!(second.diff, "");
    }

    #[test]
    fn lgtm_only_segment_yields_nothing() {
        assert!(parse_review("34-34:\nLGTM!\n---", "a.ts").is_empty());
    }

    #[test]
    fn whole_file_lgtm_yields_nothing() {
        assert!(parse_review("  LGTM!\n", "a.ts").is_empty());
        let result = ReviewResult {
            file_name: "a.ts".to_string(),
            response: "LGTM!".to_string(),
        };
        assert!(result.is_lgtm());
        assert!(result.comments().is_empty());
    }

    #[test]
    fn count_matches_non_lgtm_segments() {
        let response = "1-2:\nFirst issue.\n---\n5-5:\nLGTM!\n---\n7-9:\nSecond issue.\n```diff\n+fix\n```\n---\n11-11:\nThird issue.";
        let comments = parse_review(response, "lib.rs");
        assert_eq!(comments.len(), 3);
        assert_eq!(
            comments.iter().map(|c| c.line_start).collect::<Vec<_>>(),
            vec![1, 7, 11]
        );
        assert_eq!(comments[1].diff, "```diff\n+fix\n```");
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(
            parse_review(TYPO_RESPONSE, "x"),
            parse_review(TYPO_RESPONSE, "x")
        );
    }

    #[test]
    fn header_tolerates_spacing_and_trailing_colon() {
        let comments = parse_review("10 - 12:\nCheck bounds.", "x");
        assert_eq!((comments[0].line_start, comments[0].line_end), (10, 12));

        let comments = parse_review("3-4\nNo colon.", "x");
        assert_eq!((comments[0].line_start, comments[0].line_end), (3, 4));
    }

    #[test]
    fn malformed_segment_does_not_hide_siblings() {
        let response = "Overall this looks fine\n---\n8-8:\n---\n12-13:\nReal issue.";
        let segments = parse_segments(response, "x");
        assert_eq!(
            segments[0],
            Err(ParseError::InvalidHeader {
                header: "Overall this looks fine".to_string()
            })
        );
        assert_eq!(
            segments[1],
            Err(ParseError::MissingComment {
                header: "8-8:".to_string()
            })
        );

        let comments = parse_review(response, "x");
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].comment_text, "Real issue.");
    }

    #[test]
    fn inverted_and_multi_dash_ranges_are_rejected() {
        let segments = parse_segments("10-5:\nBackwards.\n---\n10-5-3:\nToo many dashes.", "x");
        assert_eq!(segments[0], Err(ParseError::InvertedRange { start: 10, end: 5 }));
        assert_eq!(
            segments[1],
            Err(ParseError::InvalidHeader {
                header: "10-5-3:".to_string()
            })
        );
    }

    #[test]
    fn oversized_line_number_is_invalid_header() {
        let segments = parse_segments("99999999999-99999999999:\nHuge.", "x");
        assert!(matches!(segments[0], Err(ParseError::InvalidHeader { .. })));
    }

    #[test]
    fn empty_response_yields_nothing() {
        assert!(parse_review("", "x").is_empty());
        assert!(parse_review("---\n---\n", "x").is_empty());
    }
}
