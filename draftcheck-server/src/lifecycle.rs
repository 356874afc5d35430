//! Check lifecycle manager: admission, state transitions, and staleness sweep.
//!
//! One record exists per (repository, PR) key. Admission is the dedup gate:
//! it guarantees at most one in-flight check per PR and throttles repeat
//! requests after completion via a cooldown window.
//!
//! # Concurrency
//!
//! The backing store has no compare-and-swap, so admission is a get-then-put
//! sequence with a race window: two near-simultaneous `admit` calls for the
//! same key can both observe "no record" and both write PENDING. This is a
//! known, accepted limitation of the store interface; the triggering event
//! (a human PR comment) rarely races against itself within the store's write
//! latency. A store with conditional writes could close the race with
//! insert-if-absent.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CheckError;
use crate::store::KvStore;

/// Key prefix for check records, distinguishing them from rate-limit state
/// in the shared store.
pub const CHECK_NAMESPACE: &str = "check";

/// Minimum time after a terminal state before a new check is admitted.
const COOLDOWN_SECS: i64 = 300;

/// Records older than this are deleted by the sweep regardless of status.
const STALE_AFTER_SECS: i64 = 3600;

/// Identifies the pull request a check runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckJob {
    /// "owner/name" form, as GitHub reports `full_name`.
    pub repository: String,
    pub pr_number: u64,
    /// Comment that triggered the check, if any.
    pub comment_id: Option<u64>,
}

impl CheckJob {
    pub fn key(&self) -> String {
        format!("{}:{}:{}", CHECK_NAMESPACE, self.repository, self.pr_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CheckStatus {
    /// Terminal states become re-admittable after the cooldown elapses.
    pub fn is_terminal(self) -> bool {
        matches!(self, CheckStatus::Completed | CheckStatus::Failed)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Pending => "pending",
            CheckStatus::Processing => "processing",
            CheckStatus::Completed => "completed",
            CheckStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// The per-key check record stored under `check:<repository>:<prNumber>`.
///
/// Optional fields may be absent in stored data; readers tolerate that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub repository: String,
    pub pr_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<u64>,
    pub status: CheckStatus,
    /// Set at admission only; transitions do not refresh it.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// User-facing message describing what happened.
    pub message: String,
    /// True when a fresh PENDING record was written and the runner may start.
    pub is_new: bool,
}

/// Owns the per-(repository, PR) check records in the store.
pub struct CheckLifecycle {
    store: Arc<dyn KvStore>,
}

impl CheckLifecycle {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Decide whether a new check may begin for this job's key.
    ///
    /// Admits when no record exists, or when the existing record is terminal
    /// and its cooldown has elapsed. Otherwise returns `is_new: false` with a
    /// message explaining the refusal, and writes nothing.
    pub async fn admit(&self, job: &CheckJob) -> Result<Admission, CheckError> {
        self.admit_at(job, Utc::now()).await
    }

    async fn admit_at(&self, job: &CheckJob, now: DateTime<Utc>) -> Result<Admission, CheckError> {
        let key = job.key();
        match self.load(&key).await? {
            None => self.start(job, now).await,
            Some(record) if !record.status.is_terminal() => Ok(Admission {
                message: format!(
                    "A check is already in progress for this pull request (current status: {}).",
                    record.status
                ),
                is_new: false,
            }),
            Some(record) => {
                let elapsed = now - record.timestamp;
                if elapsed < Duration::seconds(COOLDOWN_SECS) {
                    let remaining_ms = COOLDOWN_SECS * 1000 - elapsed.num_milliseconds();
                    let wait_secs = (remaining_ms as u64).div_ceil(1000);
                    let unit = if wait_secs == 1 { "second" } else { "seconds" };
                    Ok(Admission {
                        message: format!(
                            "The last check finished recently. Please wait {} {} before requesting another.",
                            wait_secs, unit
                        ),
                        is_new: false,
                    })
                } else {
                    self.start(job, now).await
                }
            }
        }
    }

    async fn start(&self, job: &CheckJob, now: DateTime<Utc>) -> Result<Admission, CheckError> {
        let record = CheckRecord {
            repository: job.repository.clone(),
            pr_number: job.pr_number,
            comment_id: job.comment_id,
            status: CheckStatus::Pending,
            timestamp: now,
            result: None,
        };
        self.save(&job.key(), &record).await?;

        info!(
            "Admitted check for PR #{} in {}",
            job.pr_number, job.repository
        );
        Ok(Admission {
            message: "Check started. Results will be posted here when the review completes."
                .to_string(),
            is_new: true,
        })
    }

    /// Move an existing record to a new status, optionally recording a result.
    ///
    /// The record's timestamp is not refreshed: the cooldown window is
    /// measured from admission time, not from completion. Fails with
    /// `NotFound` when no record exists, which means `admit` was skipped.
    pub async fn transition(
        &self,
        job: &CheckJob,
        new_status: CheckStatus,
        result: Option<String>,
    ) -> Result<(), CheckError> {
        let key = job.key();
        let mut record = self
            .load(&key)
            .await?
            .ok_or_else(|| CheckError::NotFound { key: key.clone() })?;

        info!(
            "Check for PR #{} in {}: {} -> {}",
            job.pr_number, job.repository, record.status, new_status
        );

        record.status = new_status;
        if result.is_some() {
            record.result = result;
        }
        self.save(&key, &record).await
    }

    /// Delete every check record older than the staleness threshold,
    /// regardless of status.
    ///
    /// This is the only recovery path for a check that never reached a
    /// terminal state: after an hour the key becomes admittable again.
    /// Idempotent and safe to run concurrently with admission.
    pub async fn sweep(&self) -> Result<(), CheckError> {
        self.sweep_at(Utc::now()).await
    }

    async fn sweep_at(&self, now: DateTime<Utc>) -> Result<(), CheckError> {
        let prefix = format!("{}:", CHECK_NAMESPACE);
        for key in self.store.list(&prefix).await? {
            // A concurrent delete between list and get is fine; skip the key.
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<CheckRecord>(&raw) {
                Ok(record) => {
                    if now - record.timestamp >= Duration::seconds(STALE_AFTER_SECS) {
                        self.store.delete(&key).await?;
                        info!("Swept stale check record {} (was {})", key, record.status);
                    }
                }
                Err(e) => {
                    // A record we cannot decode can never transition; reclaim it.
                    warn!("Deleting malformed check record {}: {}", key, e);
                    self.store.delete(&key).await?;
                }
            }
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<CheckRecord>, CheckError> {
        match self.store.get(key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| CheckError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    async fn save(&self, key: &str, record: &CheckRecord) -> Result<(), CheckError> {
        let raw = serde_json::to_string(record).map_err(|source| CheckError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        self.store.put(key, &raw).await?;
        Ok(())
    }
}
