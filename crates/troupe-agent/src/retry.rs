//! Retry with exponential backoff for transient model failures.

use crate::backend::{ModelBackend, ModelReply};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use troupe_core::{Message, TroupeError, TroupeResult};
use troupe_tools::ToolDescriptor;

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Configures retry behaviour for transient model failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries before the error propagates.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Determines whether an error is transient and worth retrying.
///
/// Returns `true` for rate-limit (429), request-timeout (408), server
/// errors (5xx) and connection timeouts. Client errors such as 400 (bad
/// request) and 401/403 (auth) are terminal and not retried.
pub fn is_retryable(err: &TroupeError) -> bool {
    let lower = err.to_string().to_lowercase();

    // Terminal patterns checked first
    if lower.contains("400") || lower.contains("401") || lower.contains("403") {
        return false;
    }

    lower.contains("408")
        || lower.contains("429")
        || lower.contains("timeout")
        || lower.contains("5xx")
        || lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
}

/// Computes the backoff delay for a given attempt using exponential backoff
/// capped at `backoff_max_ms`.
fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// A [`ModelBackend`] wrapper that retries transient failures.
///
/// Retries up to `max_retries` times with capped exponential backoff; a
/// non-retryable error, or exhausting the retry budget, propagates the
/// last error to the caller.
pub struct RetryingBackend {
    inner: Box<dyn ModelBackend>,
    policy: RetryPolicy,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl RetryingBackend {
    /// Wraps a backend with the given retry policy.
    pub fn new(inner: Box<dyn ModelBackend>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl ModelBackend for RetryingBackend {
    async fn invoke(
        &self,
        system_message: Option<&str>,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> TroupeResult<ModelReply> {
        let mut last_err: Option<TroupeError> = None;

        for attempt in 0..=self.policy.max_retries {
            match self.inner.invoke(system_message, history, tools).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    if !is_retryable(&e) {
                        warn!(attempt, error = %e, "Non-retryable model error");
                        return Err(e);
                    }

                    if attempt < self.policy.max_retries {
                        let delay = compute_backoff(&self.policy, attempt);
                        info!(attempt, delay_ms = delay, error = %e, "Retryable model error, backing off");
                        self.do_sleep(delay).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| TroupeError::Model("Retry budget exhausted".into())))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
