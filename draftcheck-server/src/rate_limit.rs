//! Per-window budget for LLM calls.
//!
//! A single counter lives at a well-known key in the shared store and is
//! read-modify-written under a process-local mutex. Counts reset when the
//! 60-second window elapses.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RateLimitError;
use crate::store::KvStore;

/// Well-known key for the singleton counter.
pub const RATE_LIMIT_KEY: &str = "rate-limit:openai";

const WINDOW_SECS: i64 = 60;
const MAX_REQUESTS_PER_WINDOW: u32 = 5;
const MAX_INPUT_TOKENS_PER_WINDOW: u64 = 10_000;
const MAX_OUTPUT_TOKENS_PER_WINDOW: u64 = 2_000;

/// Usage counters for the current window. Monotonically non-decreasing
/// until the window rolls over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitCounter {
    pub request_count: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub window_start: DateTime<Utc>,
}

impl RateLimitCounter {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            request_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            window_start: now,
        }
    }
}

/// Guards the expensive LLM call budget.
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    /// Serializes the read-modify-write cycle; the store itself offers no
    /// atomicity for it.
    lock: Mutex<()>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Reserve budget for a call about to be made.
    ///
    /// Resets the window first if it has elapsed, then refuses if either the
    /// request count or the input-token budget would be exceeded. Nothing is
    /// persisted on refusal.
    pub async fn reserve(&self, input_estimate: u64) -> Result<(), RateLimitError> {
        self.reserve_at(input_estimate, Utc::now()).await
    }

    async fn reserve_at(
        &self,
        input_estimate: u64,
        now: DateTime<Utc>,
    ) -> Result<(), RateLimitError> {
        let _guard = self.lock.lock().await;

        let mut counter = self.load(now).await?;
        if now - counter.window_start >= Duration::seconds(WINDOW_SECS) {
            counter = RateLimitCounter::fresh(now);
        }

        if counter.request_count >= MAX_REQUESTS_PER_WINDOW {
            return Err(RateLimitError::Exceeded(format!(
                "request budget exhausted ({} per minute)",
                MAX_REQUESTS_PER_WINDOW
            )));
        }
        if counter.input_tokens + input_estimate >= MAX_INPUT_TOKENS_PER_WINDOW {
            return Err(RateLimitError::Exceeded(format!(
                "input token budget exhausted ({} per minute)",
                MAX_INPUT_TOKENS_PER_WINDOW
            )));
        }

        counter.request_count += 1;
        counter.input_tokens += input_estimate;
        self.save(&counter).await
    }

    /// Account for the output of a call that already completed.
    ///
    /// The new total is persisted regardless of the outcome, so stored state
    /// reflects spend even when the caller is told to back off. A failure
    /// here only blocks future calls; the triggering call already happened.
    /// No window reset is performed.
    pub async fn record_output(&self, output_estimate: u64) -> Result<(), RateLimitError> {
        self.record_output_at(output_estimate, Utc::now()).await
    }

    async fn record_output_at(
        &self,
        output_estimate: u64,
        now: DateTime<Utc>,
    ) -> Result<(), RateLimitError> {
        let _guard = self.lock.lock().await;

        let mut counter = self.load(now).await?;
        counter.output_tokens += output_estimate;
        self.save(&counter).await?;

        if counter.output_tokens >= MAX_OUTPUT_TOKENS_PER_WINDOW {
            return Err(RateLimitError::Exceeded(format!(
                "output token budget exhausted ({} per minute)",
                MAX_OUTPUT_TOKENS_PER_WINDOW
            )));
        }
        Ok(())
    }

    async fn load(&self, now: DateTime<Utc>) -> Result<RateLimitCounter, RateLimitError> {
        match self.store.get(RATE_LIMIT_KEY).await? {
            None => Ok(RateLimitCounter::fresh(now)),
            Some(raw) => serde_json::from_str(&raw).map_err(RateLimitError::Corrupt),
        }
    }

    async fn save(&self, counter: &RateLimitCounter) -> Result<(), RateLimitError> {
        let raw = serde_json::to_string(counter).map_err(RateLimitError::Corrupt)?;
        self.store.put(RATE_LIMIT_KEY, &raw).await?;
        Ok(())
    }
}
