pub mod command;
pub mod config;
pub mod error;
pub mod github;
pub mod lifecycle;
pub mod rate_limit;
pub mod runner;
pub mod store;
pub mod webhook;

use std::sync::Arc;

use draftcheck_core::openai::OpenAIClient;

use crate::github::GitHubClient;
use crate::lifecycle::CheckLifecycle;
use crate::rate_limit::RateLimiter;

pub struct AppState {
    pub github_client: Arc<GitHubClient>,
    pub openai_client: Arc<OpenAIClient>,
    pub lifecycle: Arc<CheckLifecycle>,
    pub rate_limiter: Arc<RateLimiter>,
    pub webhook_secret: String,
}
