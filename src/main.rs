use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prreview::adapters::llm::create_adapter;
use prreview::config::Config;
use prreview::core::{
    build_file_patches, parse_review, DiffParser, ReviewComment, ReviewReport, ReviewRun,
    Reviewer, TokenBudget,
};
use prreview::platforms::fetcher_for_url;
use serde::Serialize;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prreview")]
#[command(about = "Review pull requests file by file with a language model", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    model: Option<String>,

    #[arg(long, global = true, help = "Skip files whose patch exceeds this many tokens")]
    token_limit: Option<usize>,

    #[arg(long, global = true, help = "Maximum concurrent review requests")]
    concurrency: Option<usize>,

    #[arg(long, global = true, default_value = "json")]
    output_format: OutputFormat,

    #[arg(short, long, global = true, help = "Output file path (prints to stdout if not provided)")]
    output: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch and review a GitHub, GitLab or Bitbucket pull request")]
    Pr {
        url: String,
    },
    #[command(about = "Review a local unified diff")]
    Diff {
        #[arg(long, help = "Path to diff file (reads from stdin if not provided)")]
        diff: Option<PathBuf>,
    },
    #[command(about = "Print the normalized patches that would be sent for review")]
    Patch {
        #[arg(long, help = "Path to diff file (reads from stdin if not provided)")]
        diff: Option<PathBuf>,
    },
    #[command(about = "Parse a saved model response into comments")]
    Parse {
        #[arg(long)]
        file_name: String,

        #[arg(long, help = "Path to response file (reads from stdin if not provided)")]
        response: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load().unwrap_or_else(|err| {
        tracing::warn!("Ignoring configuration: {:#}", err);
        Config::default()
    });
    config.merge_with_cli(cli.model.clone(), cli.token_limit, cli.concurrency);

    match cli.command {
        Commands::Pr { url } => pr_command(config, &url, cli.output, cli.output_format).await,
        Commands::Diff { diff } => diff_command(config, diff, cli.output, cli.output_format).await,
        Commands::Patch { diff } => {
            patch_command(config, diff, cli.output, cli.output_format).await
        }
        Commands::Parse {
            file_name,
            response,
        } => parse_command(&file_name, response, cli.output, cli.output_format).await,
    }
}

fn build_run(config: &Config) -> Result<ReviewRun> {
    let adapter = create_adapter(&config.model_config())?;
    let reviewer = Reviewer::new(Arc::from(adapter), config.prompt_template()?)
        .with_timeout(config.model_config().timeout());
    let budget = TokenBudget::default().with_limit(config.token_limit);
    Ok(ReviewRun::new(reviewer, budget, config.max_concurrency))
}

async fn pr_command(
    config: Config,
    url: &str,
    output_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    info!("Starting pull request review with model: {}", config.model);

    let platforms = config.platforms.clone().with_env_tokens();
    let fetcher = fetcher_for_url(url, &platforms)?;
    let report = build_run(&config)?
        .review_pull_request(fetcher.as_ref(), url)
        .await?;

    output_report(&report, output_path, format).await
}

async fn diff_command(
    config: Config,
    diff_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    info!("Starting diff review with model: {}", config.model);

    let diff_content = read_input(diff_path).await?;
    if diff_content.trim().is_empty() {
        println!("No changes found");
        return Ok(());
    }

    let report = build_run(&config)?.review_diff(&diff_content).await?;
    output_report(&report, output_path, format).await
}

#[derive(Serialize)]
struct PatchPreview {
    file_name: String,
    tokens: usize,
    too_large: bool,
    patch: String,
}

async fn patch_command(
    config: Config,
    diff_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let diff_content = read_input(diff_path).await?;
    let diffs = DiffParser::parse_unified_diff(&diff_content)?;
    let budget = TokenBudget::default().with_limit(config.token_limit);

    let previews: Vec<PatchPreview> = build_file_patches(&diffs)
        .into_iter()
        .map(|file| PatchPreview {
            tokens: budget.count(&file.patch),
            too_large: budget.is_too_large(&file.patch),
            file_name: file.file_name,
            patch: file.patch,
        })
        .collect();

    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&previews)?,
        OutputFormat::Markdown => format_patches_markdown(&previews),
    };
    write_output(output, output_path).await
}

async fn parse_command(
    file_name: &str,
    response_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let response = read_input(response_path).await?;
    let comments = parse_review(&response, file_name);

    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&comments)?,
        OutputFormat::Markdown => format_comments_markdown(&comments),
    };
    write_output(output, output_path).await
}

async fn read_input(path: Option<PathBuf>) -> Result<String> {
    if let Some(path) = path {
        return tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    if std::io::stdin().is_terminal() {
        anyhow::bail!("No input file given and stdin is a terminal");
    }
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

async fn output_report(
    report: &ReviewReport,
    output_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Markdown => format_report_markdown(report),
    };
    write_output(output, output_path).await
}

async fn write_output(output: String, output_path: Option<PathBuf>) -> Result<()> {
    if let Some(path) = output_path {
        tokio::fs::write(&path, output)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        println!("{}", output);
    }
    Ok(())
}

fn format_report_markdown(report: &ReviewReport) -> String {
    let mut output = String::new();

    match &report.pull_request {
        Some(pr) => output.push_str(&format!(
            "# Review of {}#{}: {}\n\n",
            pr.repository, pr.number, pr.title
        )),
        None => output.push_str("# Code Review Results\n\n"),
    }

    output.push_str(&format_comments_markdown(&report.comments));

    if !report.failures.is_empty() {
        output.push_str("\n## Failed files\n\n");
        for failure in &report.failures {
            output.push_str(&format!("- `{}`: {}\n", failure.file_name, failure.error));
        }
    }

    if !report.skipped.is_empty() {
        output.push_str("\n## Skipped files\n\n");
        for skipped in &report.skipped {
            output.push_str(&format!(
                "- `{}`: {} tokens exceeds limit of {}\n",
                skipped.file_name, skipped.tokens, skipped.limit
            ));
        }
    }

    output
}

fn format_patches_markdown(previews: &[PatchPreview]) -> String {
    if previews.is_empty() {
        return "No reviewable files.\n".to_string();
    }

    let mut output = String::new();
    for preview in previews {
        let note = if preview.too_large { ", over limit" } else { "" };
        output.push_str(&format!(
            "### `{}` ({} tokens{})\n\n```\n{}\n```\n\n",
            preview.file_name, preview.tokens, note, preview.patch
        ));
    }
    output
}

fn format_comments_markdown(comments: &[ReviewComment]) -> String {
    if comments.is_empty() {
        return "No issues found.\n".to_string();
    }

    let mut output = format!("**Total Issues:** {}\n\n", comments.len());
    for comment in comments {
        let range = if comment.line_start == comment.line_end {
            format!("line {}", comment.line_start)
        } else {
            format!("lines {}-{}", comment.line_start, comment.line_end)
        };
        output.push_str(&format!(
            "### `{}` ({})\n\n{}\n",
            comment.file_name, range, comment.comment_text
        ));
        if !comment.diff.is_empty() {
            output.push_str(&format!("\n{}\n", comment.diff));
        }
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use prreview::core::FileFailure;

    fn comment(start: u32, end: u32, diff: &str) -> ReviewComment {
        ReviewComment {
            line_start: start,
            line_end: end,
            comment_text: "Possible off-by-one.".to_string(),
            diff: diff.to_string(),
            file_name: "src/lib.rs".to_string(),
        }
    }

    #[test]
    fn markdown_lists_comments_with_ranges_and_diffs() {
        let output = format_comments_markdown(&[
            comment(4, 4, ""),
            comment(10, 12, "```diff\n-a\n+b\n```"),
        ]);
        assert!(output.contains("**Total Issues:** 2"));
        assert!(output.contains("### `src/lib.rs` (line 4)"));
        assert!(output.contains("### `src/lib.rs` (lines 10-12)"));
        assert!(output.contains("```diff\n-a\n+b\n```"));
    }

    #[test]
    fn markdown_report_includes_failures() {
        let report = ReviewReport {
            failures: vec![FileFailure {
                file_name: "src/main.rs".to_string(),
                error: "Completion request timed out after 120s".to_string(),
            }],
            ..ReviewReport::default()
        };
        let output = format_report_markdown(&report);
        assert!(output.starts_with("# Code Review Results"));
        assert!(output.contains("No issues found."));
        assert!(output.contains("- `src/main.rs`: Completion request timed out after 120s"));
    }

    #[test]
    fn markdown_patches_show_token_counts() {
        let output = format_patches_markdown(&[
            PatchPreview {
                file_name: "src/a.rs".to_string(),
                tokens: 12,
                too_large: false,
                patch: "---new_hunk---\n1: x\n\n---old_hunk---\n".to_string(),
            },
            PatchPreview {
                file_name: "big.json".to_string(),
                tokens: 25000,
                too_large: true,
                patch: "...".to_string(),
            },
        ]);
        assert!(output.contains("### `src/a.rs` (12 tokens)\n\n```\n---new_hunk---\n1: x"));
        assert!(output.contains("### `big.json` (25000 tokens, over limit)"));
        assert!(!output.trim_start().starts_with('['));
        assert_eq!(format_patches_markdown(&[]), "No reviewable files.\n");
    }
}
