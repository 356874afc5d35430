//! GitHub App client: installation auth, PR file listing, content fetch,
//! and comment posting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    app_id: u64,
    private_key: String,
    /// Installation tokens keyed by installation id, with their expiry.
    token_cache: Arc<RwLock<HashMap<u64, (String, SystemTime)>>>,
}

#[derive(Debug, Serialize)]
struct GitHubAppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    head: PullRequestRefResponse,
}

#[derive(Debug, Deserialize)]
struct PullRequestRefResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct FileContentsResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest {
    body: String,
}

impl GitHubClient {
    pub fn new(app_id: u64, private_key: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("draftcheck/0.1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            app_id,
            private_key,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn generate_jwt(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("Failed to get current time")?
            .as_secs();

        let claims = GitHubAppClaims {
            iss: self.app_id,
            // Backdated to absorb clock drift between us and GitHub
            iat: now - 60,
            exp: now + 600,
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .context("Failed to parse GitHub App private key")?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .context("Failed to encode GitHub App JWT")
    }

    async fn get_installation_token(&self, installation_id: u64) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expires_at)) = cache.get(&installation_id) {
                // Refresh a minute early rather than risk an expired token mid-request
                if SystemTime::now() + Duration::from_secs(60) < *expires_at {
                    return Ok(token.clone());
                }
            }
        }

        let jwt = self.generate_jwt()?;
        let url = format!(
            "https://api.github.com/app/installations/{}/access_tokens",
            installation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("Failed to request installation token")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            return Err(anyhow!(
                "GitHub installation token error: {} - {}",
                status,
                error_text
            ));
        }

        let token_response: InstallationTokenResponse = response
            .json()
            .await
            .context("Failed to parse installation token response")?;

        let expires_at: SystemTime = token_response
            .expires_at
            .parse::<chrono::DateTime<chrono::Utc>>()
            .context("Failed to parse token expiry")?
            .into();

        let mut cache = self.token_cache.write().await;
        cache.insert(
            installation_id,
            (token_response.token.clone(), expires_at),
        );

        Ok(token_response.token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        installation_id: u64,
        url: &str,
        what: &str,
    ) -> Result<T> {
        let token = self.get_installation_token(installation_id).await?;

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            return Err(anyhow!(
                "GitHub API error fetching {}: {} - {}",
                what,
                status,
                error_text
            ));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    /// Head commit SHA of a pull request.
    pub async fn get_pull_request_head(
        &self,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        pr_number: u64,
    ) -> Result<String> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}",
            repo_owner, repo_name, pr_number
        );
        let pr: PullRequestResponse = self
            .get_json(installation_id, &url, "pull request")
            .await?;
        Ok(pr.head.sha)
    }

    /// Files changed in a pull request.
    pub async fn list_pull_request_files(
        &self,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        pr_number: u64,
    ) -> Result<Vec<PullRequestFile>> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}/files?per_page=100",
            repo_owner, repo_name, pr_number
        );
        self.get_json(installation_id, &url, "pull request files")
            .await
    }

    /// UTF-8 content of a file at a specific ref.
    pub async fn get_file_content(
        &self,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<String> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/contents/{}?ref={}",
            repo_owner, repo_name, path, git_ref
        );
        let contents: FileContentsResponse =
            self.get_json(installation_id, &url, "file contents").await?;

        // The contents API returns base64 with embedded newlines
        let cleaned: String = contents
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = general_purpose::STANDARD
            .decode(cleaned)
            .context("Failed to decode file content from base64")?;
        String::from_utf8(bytes).context("File content is not valid UTF-8")
    }

    /// Post a comment on an issue or pull request.
    pub async fn post_comment(
        &self,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<()> {
        let token = self.get_installation_token(installation_id).await?;
        let url = format!(
            "https://api.github.com/repos/{}/{}/issues/{}/comments",
            repo_owner, repo_name, issue_number
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
            .json(&CreateCommentRequest {
                body: body.to_string(),
            })
            .send()
            .await
            .context("Failed to post comment")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            return Err(anyhow!(
                "GitHub API error posting comment: {} - {}",
                status,
                error_text
            ));
        }

        info!(
            "Posted comment on {}/{}#{}",
            repo_owner, repo_name, issue_number
        );
        Ok(())
    }
}
