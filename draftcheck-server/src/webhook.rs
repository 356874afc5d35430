use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::command::{self, BotCommand, ParseResult};
use crate::lifecycle::CheckJob;
use crate::runner::{run_quality_check, RunnerContext};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GitHubWebhookPayload {
    pub action: Option<String>,
    pub comment: Option<Comment>,
    pub issue: Option<Issue>,
    pub repository: Option<Repository>,
    pub installation: Option<Installation>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub user: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Issue {
    pub number: u64,
    pub pull_request: Option<PullRequestLink>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestLink {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub id: u64,
    pub login: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

type HmacSha256 = Hmac<Sha256>;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if !signature.starts_with("sha256=") {
        return false;
    }

    let signature_hex = &signature[7..]; // Remove "sha256=" prefix

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time verification
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(new_request).await)
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let payload: GitHubWebhookPayload =
        serde_json::from_slice(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;

    if payload.action.as_deref() != Some("created") {
        return Ok(ignored("not a comment creation event"));
    }

    let (Some(comment), Some(issue), Some(repo), Some(installation)) = (
        payload.comment,
        payload.issue,
        payload.repository,
        payload.installation,
    ) else {
        return Ok(ignored("missing comment, issue, repository or installation"));
    };

    if issue.pull_request.is_none() {
        return Ok(ignored("comment is not on a pull request"));
    }

    match command::parse_comment(&comment.body) {
        ParseResult::NoMention => Ok(ignored("no bot mention")),
        ParseResult::UnrecognizedCommand { attempted } => {
            info!(
                "Unrecognized command '{}' from {} on PR #{}",
                attempted, comment.user.login, issue.number
            );
            let help = format!(
                "Sorry, I don't understand `{}`. Try `{} review [file:<path>]`.",
                attempted,
                command::BOT_MENTION
            );
            if let Err(e) = state
                .github_client
                .post_comment(
                    installation.id,
                    &repo.owner.login,
                    &repo.name,
                    issue.number,
                    &help,
                )
                .await
            {
                error!("Failed to post help comment: {}", e);
            }
            Ok(Json(WebhookResponse {
                message: "unrecognized command".to_string(),
            }))
        }
        ParseResult::Command(BotCommand::Review(options)) => {
            info!(
                "Review requested by {} on PR #{} in {}",
                comment.user.login, issue.number, repo.full_name
            );

            // Opportunistic garbage collection; never blocks the request.
            let sweeper = state.lifecycle.clone();
            tokio::spawn(async move {
                if let Err(e) = sweeper.sweep().await {
                    warn!("Check record sweep failed: {}", e);
                }
            });

            let job = CheckJob {
                repository: repo.full_name.clone(),
                pr_number: issue.number,
                comment_id: Some(comment.id),
            };

            let admission = state.lifecycle.admit(&job).await.map_err(|e| {
                error!("Admission failed for {}: {}", job.key(), e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

            // Acknowledge on the PR itself, whether admitted or refused; the
            // HTTP response body is invisible to the commenter.
            if let Err(e) = state
                .github_client
                .post_comment(
                    installation.id,
                    &repo.owner.login,
                    &repo.name,
                    issue.number,
                    &admission.message,
                )
                .await
            {
                error!("Failed to post admission comment: {}", e);
            }

            if admission.is_new {
                let ctx = RunnerContext {
                    github_client: state.github_client.clone(),
                    openai_client: state.openai_client.clone(),
                    lifecycle: state.lifecycle.clone(),
                    rate_limiter: state.rate_limiter.clone(),
                    installation_id: installation.id,
                    repo_owner: repo.owner.login.clone(),
                    repo_name: repo.name.clone(),
                };
                tokio::spawn(run_quality_check(ctx, job, options));
            }

            Ok(Json(WebhookResponse {
                message: admission.message,
            }))
        }
    }
}

fn ignored(reason: &str) -> Json<WebhookResponse> {
    Json(WebhookResponse {
        message: format!("ignored: {}", reason),
    })
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}
