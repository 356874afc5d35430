pub mod heuristics;
pub mod openai;
pub mod review;

pub use heuristics::{run_structural_checks, CheckFinding};
pub use openai::{estimate_tokens, OpenAIClient};
pub use review::{create_user_prompt, get_system_prompt, ArticleReview};
