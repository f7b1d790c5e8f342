use crate::core::diff_parser::{ChangeType, FileDiff, Hunk};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

pub const NEW_HUNK_MARKER: &str = "---new_hunk---";
pub const OLD_HUNK_MARKER: &str = "---old_hunk---";

/// The normalized patch of one file, the unit sent for review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilePatch {
    pub file_name: String,
    pub patch: String,
}

/// Renders hunks as a `new_hunk` section (inserted and unchanged lines,
/// prefixed with their new-file line number) followed by an `old_hunk`
/// section (deleted and unchanged lines, unprefixed).
pub fn normalize(hunks: &[Hunk]) -> String {
    let old_hunks = hunks
        .iter()
        .map(|hunk| {
            hunk.changes
                .iter()
                .filter(|change| change.change_type != ChangeType::Insert)
                .map(|change| change.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let new_hunks = hunks
        .iter()
        .map(|hunk| {
            hunk.changes
                .iter()
                .filter(|change| change.change_type != ChangeType::Delete)
                .map(|change| format!("{}{}", format_line_number(change.line_number), change.content))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n");

    trace!("old hunks:\n{}", old_hunks);
    trace!("new hunks:\n{}", new_hunks);

    format!(
        "{}\n{}\n\n{}\n{}",
        NEW_HUNK_MARKER, new_hunks, OLD_HUNK_MARKER, old_hunks
    )
}

fn format_line_number(line_number: Option<u32>) -> String {
    match line_number {
        Some(n) => format!("{}: ", n),
        None => String::new(),
    }
}

/// One patch per reviewable file. Binary files and files without hunks are skipped.
pub fn build_file_patches(diffs: &[FileDiff]) -> Vec<FilePatch> {
    let mut patches = Vec::with_capacity(diffs.len());

    for diff in diffs {
        if diff.is_binary || diff.hunks.is_empty() {
            info!("Skipping non-text diff: {}", diff.file_name());
            continue;
        }

        let patch = normalize(&diff.hunks);
        debug!(
            "Normalized {} hunk(s) for {}",
            diff.hunks.len(),
            diff.file_name()
        );
        patches.push(FilePatch {
            file_name: diff.file_name().to_string(),
            patch,
        });
    }

    patches
}
