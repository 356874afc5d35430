//! Quality check runner: fetches the article, runs structural heuristics and
//! the LLM review under the rate limiter, and posts the combined verdict.
//!
//! The runner only starts after admission succeeds; it owns the record's
//! PROCESSING -> COMPLETED/FAILED transitions.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{error, info, warn};

use draftcheck_core::heuristics::{run_structural_checks, CheckFinding};
use draftcheck_core::openai::{estimate_tokens, OpenAIClient};
use draftcheck_core::review::{create_user_prompt, get_system_prompt, ArticleReview};

use crate::command::ReviewOptions;
use crate::error::RateLimitError;
use crate::github::{GitHubClient, PullRequestFile};
use crate::lifecycle::{CheckJob, CheckLifecycle, CheckStatus};
use crate::rate_limit::RateLimiter;

/// Everything the runner needs to execute one admitted check.
pub struct RunnerContext {
    pub github_client: Arc<GitHubClient>,
    pub openai_client: Arc<OpenAIClient>,
    pub lifecycle: Arc<CheckLifecycle>,
    pub rate_limiter: Arc<RateLimiter>,
    pub installation_id: u64,
    pub repo_owner: String,
    pub repo_name: String,
}

/// Run an admitted check to completion, recording the terminal state.
///
/// Never returns an error: failures are written to the check record and
/// posted to the PR as a comment (best effort).
pub async fn run_quality_check(ctx: RunnerContext, job: CheckJob, options: ReviewOptions) {
    match execute(&ctx, &job, &options).await {
        Ok(()) => {}
        Err(e) => {
            error!(
                "Check failed for PR #{} in {}: {:#}",
                job.pr_number, job.repository, e
            );
            if let Err(te) = ctx
                .lifecycle
                .transition(&job, CheckStatus::Failed, Some(format!("{:#}", e)))
                .await
            {
                error!("Failed to record check failure: {}", te);
            }
            let comment = format!("❌ Draft check failed: {:#}", e);
            if let Err(ce) = ctx
                .github_client
                .post_comment(
                    ctx.installation_id,
                    &ctx.repo_owner,
                    &ctx.repo_name,
                    job.pr_number,
                    &comment,
                )
                .await
            {
                error!("Failed to post failure comment: {}", ce);
            }
        }
    }
}

async fn execute(ctx: &RunnerContext, job: &CheckJob, options: &ReviewOptions) -> Result<()> {
    ctx.lifecycle
        .transition(job, CheckStatus::Processing, None)
        .await?;

    let head_sha = ctx
        .github_client
        .get_pull_request_head(
            ctx.installation_id,
            &ctx.repo_owner,
            &ctx.repo_name,
            job.pr_number,
        )
        .await?;

    let files = ctx
        .github_client
        .list_pull_request_files(
            ctx.installation_id,
            &ctx.repo_owner,
            &ctx.repo_name,
            job.pr_number,
        )
        .await?;

    let path = select_markdown_file(&files, options.file.as_deref()).ok_or_else(|| {
        anyhow!("no markdown file found in this pull request (use `file:<path>` to pick one)")
    })?;

    info!(
        "Reviewing {} at {} for PR #{}",
        path, head_sha, job.pr_number
    );

    let markdown = ctx
        .github_client
        .get_file_content(
            ctx.installation_id,
            &ctx.repo_owner,
            &ctx.repo_name,
            &path,
            &head_sha,
        )
        .await?;

    let findings = run_structural_checks(&markdown);

    let input_estimate =
        estimate_tokens(&get_system_prompt()) + estimate_tokens(&create_user_prompt(&path, &markdown));
    match ctx.rate_limiter.reserve(input_estimate).await {
        Ok(()) => {}
        Err(RateLimitError::Exceeded(reason)) => {
            // Budget refusal is a normal outcome, not an internal error.
            let message = format!(
                "⏳ Draft check postponed: {}. Please try again in a minute.",
                reason
            );
            ctx.lifecycle
                .transition(job, CheckStatus::Failed, Some(reason))
                .await?;
            ctx.github_client
                .post_comment(
                    ctx.installation_id,
                    &ctx.repo_owner,
                    &ctx.repo_name,
                    job.pr_number,
                    &message,
                )
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let (review, raw_content) = ctx.openai_client.review_article(&path, &markdown).await?;

    // The call already happened; an exceeded output budget only gates future
    // calls, so it must not fail this one.
    if let Err(e) = ctx
        .rate_limiter
        .record_output(estimate_tokens(&raw_content))
        .await
    {
        warn!("Output token accounting: {}", e);
    }

    let comment = format_verdict_comment(&path, &findings, &review);
    ctx.github_client
        .post_comment(
            ctx.installation_id,
            &ctx.repo_owner,
            &ctx.repo_name,
            job.pr_number,
            &comment,
        )
        .await?;

    ctx.lifecycle
        .transition(
            job,
            CheckStatus::Completed,
            Some(summarize(&findings, &review)),
        )
        .await?;

    Ok(())
}

/// Pick the markdown file to review.
///
/// An explicit request wins if it names a changed markdown file; otherwise
/// the first changed (non-removed) `.md` file is used.
fn select_markdown_file(files: &[PullRequestFile], requested: Option<&str>) -> Option<String> {
    let changed_markdown = |file: &&PullRequestFile| {
        file.status != "removed" && file.filename.to_lowercase().ends_with(".md")
    };

    if let Some(requested) = requested {
        return files
            .iter()
            .filter(changed_markdown)
            .find(|file| file.filename == requested)
            .map(|file| file.filename.clone());
    }

    files
        .iter()
        .find(changed_markdown)
        .map(|file| file.filename.clone())
}

/// Render the combined verdict as a PR comment.
fn format_verdict_comment(path: &str, findings: &[CheckFinding], review: &ArticleReview) -> String {
    let mut comment = format!("## Draft check: `{}`\n\n### Structural checks\n\n", path);

    for finding in findings {
        let mark = if finding.passed { "✅" } else { "❌" };
        match &finding.details {
            Some(details) => {
                comment.push_str(&format!("- {} {} — {}\n", mark, finding.name, details))
            }
            None => comment.push_str(&format!("- {} {}\n", mark, finding.name)),
        }
    }

    comment.push_str(&format!(
        "\n### Editorial review\n\n**Verdict: {}**\n\n{}\n",
        review.verdict_line(),
        review.summary
    ));

    comment
}

/// Short result string stored on the completed check record.
fn summarize(findings: &[CheckFinding], review: &ArticleReview) -> String {
    let passed = findings.iter().filter(|f| f.passed).count();
    format!(
        "{}/{} structural checks passed; editorial verdict: {}",
        passed,
        findings.len(),
        review.verdict_line()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, status: &str) -> PullRequestFile {
        PullRequestFile {
            filename: name.to_string(),
            status: status.to_string(),
        }
    }

    fn review(publishable: bool) -> ArticleReview {
        ArticleReview {
            reasoning: "detailed working-out".to_string(),
            publishable,
            summary: "Tighten the introduction.".to_string(),
        }
    }

    #[test]
    fn test_select_first_changed_markdown_file() {
        let files = vec![
            file("src/main.rs", "modified"),
            file("posts/draft.md", "added"),
            file("posts/other.md", "modified"),
        ];
        assert_eq!(
            select_markdown_file(&files, None),
            Some("posts/draft.md".to_string())
        );
    }

    #[test]
    fn test_select_skips_removed_files() {
        let files = vec![file("posts/old.md", "removed"), file("posts/new.md", "added")];
        assert_eq!(
            select_markdown_file(&files, None),
            Some("posts/new.md".to_string())
        );
    }

    #[test]
    fn test_select_honors_explicit_request() {
        let files = vec![file("posts/a.md", "added"), file("posts/b.md", "added")];
        assert_eq!(
            select_markdown_file(&files, Some("posts/b.md")),
            Some("posts/b.md".to_string())
        );
    }

    #[test]
    fn test_select_requested_file_must_be_in_the_pr() {
        let files = vec![file("posts/a.md", "added")];
        assert_eq!(select_markdown_file(&files, Some("posts/missing.md")), None);
    }

    #[test]
    fn test_select_none_when_no_markdown() {
        let files = vec![file("src/main.rs", "modified")];
        assert_eq!(select_markdown_file(&files, None), None);
    }

    #[test]
    fn test_verdict_comment_lists_every_finding() {
        let findings = vec![
            CheckFinding {
                name: "Exactly one top-level title".to_string(),
                passed: true,
                details: None,
            },
            CheckFinding {
                name: "Minimum word count".to_string(),
                passed: false,
                details: Some("120 words of body text, expected at least 300".to_string()),
            },
        ];
        let comment = format_verdict_comment("posts/draft.md", &findings, &review(false));

        assert!(comment.contains("`posts/draft.md`"));
        assert!(comment.contains("✅ Exactly one top-level title"));
        assert!(comment.contains("❌ Minimum word count — 120 words"));
        assert!(comment.contains("**Verdict: Needs revision**"));
        assert!(comment.contains("Tighten the introduction."));
        // Reasoning stays out of the user-facing comment.
        assert!(!comment.contains("detailed working-out"));
    }

    #[test]
    fn test_summarize_counts_passes() {
        let findings = vec![
            CheckFinding {
                name: "a".to_string(),
                passed: true,
                details: None,
            },
            CheckFinding {
                name: "b".to_string(),
                passed: false,
                details: None,
            },
        ];
        assert_eq!(
            summarize(&findings, &review(true)),
            "1/2 structural checks passed; editorial verdict: Ready to publish"
        );
    }
}
