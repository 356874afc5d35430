//! Structural checks for article markdown.
//!
//! These are the cheap, deterministic half of a quality check: they run before
//! any LLM call and catch the mechanical problems an editor would bounce a
//! draft for immediately.

use serde::{Deserialize, Serialize};

/// Minimum number of words for an article to be considered substantial.
pub const MIN_WORD_COUNT: usize = 300;

/// Minimum number of `##` section headings expected in an article.
pub const MIN_SECTION_COUNT: usize = 2;

/// Outcome of a single structural check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFinding {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckFinding {
    fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            details: None,
        }
    }

    fn fail(name: &str, details: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            details: Some(details),
        }
    }
}

/// Run all structural checks against an article's markdown source.
///
/// Always returns the full list of findings, pass or fail, so the verdict
/// comment can show every check that was performed.
pub fn run_structural_checks(markdown: &str) -> Vec<CheckFinding> {
    vec![
        check_single_title(markdown),
        check_word_count(markdown),
        check_section_headings(markdown),
        check_code_fences(markdown),
        check_placeholder_markers(markdown),
    ]
}

/// Lines of the document that are not inside a fenced code block.
fn prose_lines(markdown: &str) -> Vec<&str> {
    let mut in_fence = false;
    let mut lines = Vec::new();
    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            lines.push(line);
        }
    }
    lines
}

fn check_single_title(markdown: &str) -> CheckFinding {
    let name = "Exactly one top-level title";
    let count = prose_lines(markdown)
        .iter()
        .filter(|line| line.starts_with("# "))
        .count();
    match count {
        1 => CheckFinding::pass(name),
        0 => CheckFinding::fail(name, "no `# ` title heading found".to_string()),
        n => CheckFinding::fail(name, format!("found {} top-level headings, expected 1", n)),
    }
}

fn check_word_count(markdown: &str) -> CheckFinding {
    let name = "Minimum word count";
    let words: usize = prose_lines(markdown)
        .iter()
        .filter(|line| !line.trim_start().starts_with('#'))
        .map(|line| line.split_whitespace().count())
        .sum();
    if words >= MIN_WORD_COUNT {
        CheckFinding::pass(name)
    } else {
        CheckFinding::fail(
            name,
            format!("{} words of body text, expected at least {}", words, MIN_WORD_COUNT),
        )
    }
}

fn check_section_headings(markdown: &str) -> CheckFinding {
    let name = "Article is divided into sections";
    let count = prose_lines(markdown)
        .iter()
        .filter(|line| line.starts_with("## "))
        .count();
    if count >= MIN_SECTION_COUNT {
        CheckFinding::pass(name)
    } else {
        CheckFinding::fail(
            name,
            format!(
                "found {} `## ` section headings, expected at least {}",
                count, MIN_SECTION_COUNT
            ),
        )
    }
}

fn check_code_fences(markdown: &str) -> CheckFinding {
    let name = "Code fences are balanced";
    let fence_count = markdown
        .lines()
        .filter(|line| line.trim_start().starts_with("```"))
        .count();
    if fence_count % 2 == 0 {
        CheckFinding::pass(name)
    } else {
        CheckFinding::fail(name, "unclosed ``` code fence".to_string())
    }
}

fn check_placeholder_markers(markdown: &str) -> CheckFinding {
    let name = "No placeholder markers";
    const MARKERS: [&str; 3] = ["TODO", "TBD", "FIXME"];
    for line in prose_lines(markdown) {
        for word in line.split(|c: char| !c.is_ascii_alphanumeric()) {
            if MARKERS.contains(&word) {
                return CheckFinding::fail(name, format!("`{}` marker in article text", word));
            }
        }
    }
    CheckFinding::pass(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(words: usize) -> String {
        std::iter::repeat("word").take(words).collect::<Vec<_>>().join(" ")
    }

    fn well_formed_article() -> String {
        format!(
            "# A Title\n\n## Introduction\n\n{}\n\n## Conclusion\n\n{}\n",
            body_of(200),
            body_of(200)
        )
    }

    #[test]
    fn test_well_formed_article_passes_all_checks() {
        let findings = run_structural_checks(&well_formed_article());
        assert_eq!(findings.len(), 5);
        for finding in &findings {
            assert!(finding.passed, "expected pass, got {:?}", finding);
        }
    }

    #[test]
    fn test_missing_title_fails() {
        let article = format!("## Only a section\n\n{}\n\n## Another\n\n{}", body_of(200), body_of(200));
        let findings = run_structural_checks(&article);
        let title = findings.iter().find(|f| f.name.contains("title")).unwrap();
        assert!(!title.passed);
        assert!(title.details.as_deref().unwrap().contains("no `# `"));
    }

    #[test]
    fn test_duplicate_titles_fail() {
        let article = format!("# One\n\n# Two\n\n## A\n\n## B\n\n{}", body_of(400));
        let findings = run_structural_checks(&article);
        let title = findings.iter().find(|f| f.name.contains("title")).unwrap();
        assert!(!title.passed);
        assert!(title.details.as_deref().unwrap().contains("found 2"));
    }

    #[test]
    fn test_headings_inside_code_fences_are_ignored() {
        let article = format!(
            "# Title\n\n## A\n\n```\n# not a heading\n## also not\n```\n\n## B\n\n{}",
            body_of(400)
        );
        let findings = run_structural_checks(&article);
        let title = findings.iter().find(|f| f.name.contains("title")).unwrap();
        assert!(title.passed);
    }

    #[test]
    fn test_short_article_fails_word_count() {
        let article = format!("# Title\n\n## A\n\n## B\n\n{}", body_of(50));
        let findings = run_structural_checks(&article);
        let words = findings.iter().find(|f| f.name.contains("word count")).unwrap();
        assert!(!words.passed);
    }

    #[test]
    fn test_heading_text_does_not_count_toward_words() {
        // 300 words in headings alone should not satisfy the word count check.
        let headings: String = (0..150).map(|i| format!("## section {}\n", i)).collect();
        let article = format!("# Title\n\n{}", headings);
        let findings = run_structural_checks(&article);
        let words = findings.iter().find(|f| f.name.contains("word count")).unwrap();
        assert!(!words.passed);
    }

    #[test]
    fn test_unclosed_code_fence_fails() {
        let article = format!("# Title\n\n## A\n\n## B\n\n```rust\nlet x = 1;\n\n{}", body_of(400));
        let findings = run_structural_checks(&article);
        let fences = findings.iter().find(|f| f.name.contains("fences")).unwrap();
        assert!(!fences.passed);
    }

    #[test]
    fn test_todo_marker_fails() {
        let article = format!("# Title\n\n## A\n\nTODO: write this bit\n\n## B\n\n{}", body_of(400));
        let findings = run_structural_checks(&article);
        let markers = findings.iter().find(|f| f.name.contains("placeholder")).unwrap();
        assert!(!markers.passed);
        assert!(markers.details.as_deref().unwrap().contains("TODO"));
    }

    #[test]
    fn test_todo_inside_code_fence_is_allowed() {
        let article = format!(
            "# Title\n\n## A\n\n```rust\n// TODO: example code\n```\n\n## B\n\n{}",
            body_of(400)
        );
        let findings = run_structural_checks(&article);
        let markers = findings.iter().find(|f| f.name.contains("placeholder")).unwrap();
        assert!(markers.passed);
    }

    #[test]
    fn test_lowercase_todo_is_not_flagged() {
        let article = format!(
            "# Title\n\n## A\n\nWe keep a todo list in the tracker.\n\n## B\n\n{}",
            body_of(400)
        );
        let findings = run_structural_checks(&article);
        let markers = findings.iter().find(|f| f.name.contains("placeholder")).unwrap();
        assert!(markers.passed);
    }
}
