use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header pattern")
});

/// All hunks of one file in a unified diff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDiff {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
    pub is_binary: bool,
    pub is_new: bool,
    pub is_deleted: bool,
}

impl FileDiff {
    /// The path a review is filed under: the new path, or the old one for deletions.
    pub fn file_name(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub header: String,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Change {
    pub change_type: ChangeType,
    pub content: String,
    /// New-file line number. `None` for deletions.
    pub line_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Insert,
    Delete,
    Normal,
}

impl Change {
    pub fn insert(content: impl Into<String>, line_number: u32) -> Self {
        Self {
            change_type: ChangeType::Insert,
            content: content.into(),
            line_number: Some(line_number),
        }
    }

    pub fn delete(content: impl Into<String>) -> Self {
        Self {
            change_type: ChangeType::Delete,
            content: content.into(),
            line_number: None,
        }
    }

    pub fn normal(content: impl Into<String>, line_number: u32) -> Self {
        Self {
            change_type: ChangeType::Normal,
            content: content.into(),
            line_number: Some(line_number),
        }
    }
}

pub struct DiffParser;

impl DiffParser {
    pub fn parse_unified_diff(diff_content: &str) -> Result<Vec<FileDiff>> {
        let mut diffs = Vec::new();
        let lines: Vec<&str> = diff_content.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            if lines[i].starts_with("diff --git ") {
                diffs.push(Self::parse_git_file_diff(&lines, &mut i)?);
            } else if lines[i].starts_with("--- ")
                && i + 1 < lines.len()
                && lines[i + 1].starts_with("+++ ")
            {
                diffs.push(Self::parse_simple_file_diff(&lines, &mut i)?);
            } else {
                i += 1;
            }
        }

        tracing::debug!("Parsed {} file diff(s)", diffs.len());
        Ok(diffs)
    }

    fn parse_git_file_diff(lines: &[&str], i: &mut usize) -> Result<FileDiff> {
        let (old_path, new_path) = Self::paths_from_git_header(lines[*i]);
        let mut diff = FileDiff {
            old_path,
            new_path,
            hunks: Vec::new(),
            is_binary: false,
            is_new: false,
            is_deleted: false,
        };
        *i += 1;

        while *i < lines.len()
            && !lines[*i].starts_with("@@")
            && !lines[*i].starts_with("diff --git ")
        {
            let line = lines[*i];
            if line.starts_with("new file mode") {
                diff.is_new = true;
            } else if line.starts_with("deleted file mode") {
                diff.is_deleted = true;
            } else if line.starts_with("Binary files") || line.starts_with("GIT binary patch") {
                diff.is_binary = true;
            } else if let Some(path) = line.strip_prefix("rename from ") {
                diff.old_path = Some(path.trim().to_string());
            } else if let Some(path) = line.strip_prefix("rename to ") {
                diff.new_path = Some(path.trim().to_string());
            } else if line.starts_with("--- ") {
                diff.old_path = Self::path_from_header(line, "--- ")?;
            } else if line.starts_with("+++ ") {
                diff.new_path = Self::path_from_header(line, "+++ ")?;
            }
            *i += 1;
        }

        if diff.is_new {
            diff.old_path = None;
        }
        if diff.is_deleted {
            diff.new_path = None;
        }

        while *i < lines.len() && lines[*i].starts_with("@@") {
            diff.hunks.push(Self::parse_hunk(lines, i)?);
        }

        Ok(diff)
    }

    fn parse_simple_file_diff(lines: &[&str], i: &mut usize) -> Result<FileDiff> {
        let old_path = Self::path_from_header(lines[*i], "--- ")?;
        let new_path = Self::path_from_header(lines[*i + 1], "+++ ")?;
        *i += 2;

        let mut hunks = Vec::new();
        let mut is_binary = false;

        while *i < lines.len()
            && !lines[*i].starts_with("diff --git ")
            && !(lines[*i].starts_with("--- ")
                && *i + 1 < lines.len()
                && lines[*i + 1].starts_with("+++ "))
        {
            if lines[*i].starts_with("Binary files") {
                is_binary = true;
            }
            if lines[*i].starts_with("@@") {
                hunks.push(Self::parse_hunk(lines, i)?);
            } else {
                *i += 1;
            }
        }

        Ok(FileDiff {
            is_new: old_path.is_none(),
            is_deleted: new_path.is_none(),
            old_path,
            new_path,
            hunks,
            is_binary,
        })
    }

    /// `diff --git a/src/x.rs b/src/x.rs` → both paths, prefixes stripped.
    fn paths_from_git_header(line: &str) -> (Option<String>, Option<String>) {
        let rest = line.trim_start_matches("diff --git ").trim();
        match rest.find(" b/") {
            Some(split) => {
                let old = rest[..split].trim_start_matches("a/");
                let new = &rest[split + 3..];
                (Some(old.to_string()), Some(new.to_string()))
            }
            None => (None, None),
        }
    }

    fn path_from_header(line: &str, prefix: &str) -> Result<Option<String>> {
        let raw = line
            .strip_prefix(prefix)
            .with_context(|| format!("Invalid file header: {}", line))?
            .trim();
        // Some tools append a timestamp after a tab
        let path = raw.split('\t').next().unwrap_or(raw).trim();
        if path == "/dev/null" {
            return Ok(None);
        }
        let path = path
            .strip_prefix("a/")
            .or_else(|| path.strip_prefix("b/"))
            .unwrap_or(path);
        Ok(Some(path.to_string()))
    }

    fn parse_hunk(lines: &[&str], i: &mut usize) -> Result<Hunk> {
        let header = lines[*i];
        let (old_start, old_lines, new_start, new_lines) = Self::parse_hunk_header(header)?;
        *i += 1;

        let mut changes = Vec::new();
        let mut old_seen = 0;
        let mut new_seen = 0;
        let mut new_line = new_start;

        while *i < lines.len() && (old_seen < old_lines || new_seen < new_lines) {
            let line = lines[*i];
            if line.starts_with("@@") || line.starts_with("diff --git ") {
                break;
            }

            let change = match line.chars().next() {
                Some('+') => {
                    new_seen += 1;
                    new_line += 1;
                    Change::insert(&line[1..], new_line - 1)
                }
                Some('-') => {
                    old_seen += 1;
                    Change::delete(&line[1..])
                }
                Some('\\') => {
                    // "\ No newline at end of file"
                    *i += 1;
                    continue;
                }
                Some(' ') | None => {
                    old_seen += 1;
                    new_seen += 1;
                    new_line += 1;
                    Change::normal(line.get(1..).unwrap_or_default(), new_line - 1)
                }
                Some(_) => break,
            };

            changes.push(change);
            *i += 1;
        }

        // Marker can trail the last counted line
        if *i < lines.len() && lines[*i].starts_with('\\') {
            *i += 1;
        }

        Ok(Hunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
            header: header.to_string(),
            changes,
        })
    }

    fn parse_hunk_header(header: &str) -> Result<(u32, u32, u32, u32)> {
        let caps = HUNK_HEADER
            .captures(header)
            .with_context(|| format!("Invalid hunk header: {}", header))?;

        let number = |idx: usize, default: u32| -> Result<u32> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .with_context(|| format!("Invalid hunk header: {}", header)),
                None => Ok(default),
            }
        };

        Ok((number(1, 0)?, number(2, 1)?, number(3, 0)?, number(4, 1)?))
    }
}
