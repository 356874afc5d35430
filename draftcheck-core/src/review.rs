use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Parsed editorial verdict from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleReview {
    /// The model's working-out. Kept for logging, not shown in the verdict comment.
    pub reasoning: String,
    /// Whether the article is ready to publish as-is.
    pub publishable: bool,
    /// One-paragraph summary of the editorial assessment.
    pub summary: String,
}

impl ArticleReview {
    /// Parse a review from the raw JSON content of a chat completion.
    ///
    /// Fails if the content is not valid JSON matching the response schema.
    pub fn from_response_content(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| anyhow!("LLM response did not match the review schema: {}", e))
    }

    pub fn verdict_line(&self) -> &'static str {
        if self.publishable {
            "Ready to publish"
        } else {
            "Needs revision"
        }
    }
}

/// System prompt for the editorial review.
pub fn get_system_prompt() -> String {
    "You are an experienced editor reviewing a draft article for publication. \
     Assess clarity, structure, factual coherence, tone, and completeness. \
     Be specific: point at sections or claims rather than speaking in generalities. \
     Respond in the required JSON format: `reasoning` is your detailed working-out, \
     `publishable` is whether the draft could be published without further editing, \
     and `summary` is a single paragraph for the author covering the most important \
     points, good and bad."
        .to_string()
}

/// Create a user prompt from an article's path and markdown source.
pub fn create_user_prompt(file_path: &str, markdown: &str) -> String {
    let mut user_prompt = String::from("Below is a draft article in markdown, submitted for review.\n");
    user_prompt.push_str(&format!("\n === {} ===\n\n{}\n", file_path, markdown));
    user_prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_review() {
        let content = r#"{"reasoning": "solid structure", "publishable": true, "summary": "Good draft."}"#;
        let review = ArticleReview::from_response_content(content).unwrap();
        assert!(review.publishable);
        assert_eq!(review.summary, "Good draft.");
        assert_eq!(review.verdict_line(), "Ready to publish");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = ArticleReview::from_response_content("the article looks fine").unwrap_err();
        assert!(err.to_string().contains("review schema"));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let content = r#"{"reasoning": "hmm"}"#;
        assert!(ArticleReview::from_response_content(content).is_err());
    }

    #[test]
    fn test_user_prompt_contains_path_and_body() {
        let prompt = create_user_prompt("posts/hello.md", "# Hello\n\nBody text.");
        assert!(prompt.contains("=== posts/hello.md ==="));
        assert!(prompt.contains("Body text."));
    }
}
