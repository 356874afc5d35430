use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::review::{create_user_prompt, get_system_prompt, ArticleReview};

/// Model used for editorial reviews.
pub const REVIEW_MODEL: &str = "gpt-5-2025-08-07";

/// Estimate the token count of a text as `ceil(len / 4)`.
///
/// A deliberately cheap proxy: rate limiting only needs a monotonic, bounded
/// cost estimate, not tokenizer-exact counts.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Async OpenAI client for article quality reviews.
#[derive(Clone)]
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: JsonSchema,
}

#[derive(Debug, Serialize)]
pub struct JsonSchema {
    pub schema: Schema,
    pub strict: bool,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: SchemaProperties,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

#[derive(Debug, Serialize)]
pub struct SchemaProperties {
    pub reasoning: SchemaProperty,
    pub publishable: SchemaProperty,
    pub summary: SchemaProperty,
}

#[derive(Debug, Serialize)]
pub struct SchemaProperty {
    #[serde(rename = "type")]
    pub property_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAIClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("draftcheck/0.1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client, api_key }
    }

    fn create_response_format() -> ResponseFormat {
        ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: JsonSchema {
                schema: Schema {
                    schema_type: "object".to_string(),
                    properties: SchemaProperties {
                        reasoning: SchemaProperty {
                            property_type: "string".to_string(),
                        },
                        publishable: SchemaProperty {
                            property_type: "boolean".to_string(),
                        },
                        summary: SchemaProperty {
                            property_type: "string".to_string(),
                        },
                    },
                    required: vec![
                        "reasoning".to_string(),
                        "publishable".to_string(),
                        "summary".to_string(),
                    ],
                    additional_properties: false,
                },
                strict: true,
                name: "DraftcheckReview".to_string(),
            },
        }
    }

    /// Run an editorial review of an article.
    ///
    /// Returns the parsed review together with the raw response content, so
    /// the caller can account for output tokens.
    pub async fn review_article(
        &self,
        file_path: &str,
        markdown: &str,
    ) -> Result<(ArticleReview, String)> {
        let request = ChatCompletionRequest {
            model: REVIEW_MODEL.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: get_system_prompt(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: create_user_prompt(file_path, markdown),
                },
            ],
            response_format: Self::create_response_format(),
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(&request)?)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            return Err(anyhow!(
                "OpenAI Chat Completions API error: {} - {}",
                status,
                error_text
            ));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Chat completion response contained no choices"))?;

        let review = ArticleReview::from_response_content(&content)?;
        Ok((review, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(4000)), 1000);
    }

    #[test]
    fn test_response_format_schema_consistency() {
        // Property names in the schema must match the required array, or the
        // API rejects the request.
        let response_format = OpenAIClient::create_response_format();
        let schema = response_format.json_schema.schema;

        let schema_json = serde_json::to_value(&schema).expect("Failed to serialize schema");
        let properties = schema_json["properties"]
            .as_object()
            .expect("Properties should be an object");

        for required_field in &schema.required {
            assert!(
                properties.contains_key(required_field),
                "Required field '{}' not found in properties. Available properties: {:?}",
                required_field,
                properties.keys().collect::<Vec<_>>()
            );
        }
    }
}
