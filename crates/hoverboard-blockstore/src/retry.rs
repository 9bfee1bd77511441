//! Retry policy with exponential backoff for the index query path

use rand::{RngExt, rng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{BlockstoreError, Result};

/// Hard upper bound on retries, whatever the configuration says
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first call
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that calls once and never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Create retry policy from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Create retry policy from variables looked up by `var`
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let policy = Self {
            max_attempts: var("HOVERBOARD_MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            initial_backoff: Duration::from_millis(
                var("HOVERBOARD_RETRY_BACKOFF")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
            ),
            max_backoff: Duration::from_millis(
                var("HOVERBOARD_MAX_BACKOFF")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
            multiplier: var("HOVERBOARD_BACKOFF_MULTIPLIER")
                .and_then(|s| s.parse().ok())
                .unwrap_or(2.0),
            jitter: var("HOVERBOARD_RETRY_JITTER")
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Reject policies that could retry without bound
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(BlockstoreError::Config(format!(
                "max_attempts {} exceeds the cap of {MAX_RETRY_ATTEMPTS}",
                self.max_attempts
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BlockstoreError::Config(format!(
                "backoff multiplier {} must be finite and at least 1.0",
                self.multiplier
            )));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(BlockstoreError::Config(
                "initial_backoff exceeds max_backoff".to_string(),
            ));
        }
        Ok(())
    }

    /// Execute a function with retry logic
    ///
    /// Non-retryable errors return immediately. The attempt count is clamped
    /// to [`MAX_RETRY_ATTEMPTS`] even for policies that skipped validation.
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.min(MAX_RETRY_ATTEMPTS);
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.should_retry() || attempt >= max_attempts => {
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "Attempt failed, retrying");

                    let mut delay = e.retry_after_hint().unwrap_or(backoff).min(self.max_backoff);
                    if self.jitter {
                        let jitter = rng().random_range(0.0..0.3);
                        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
                        let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
                        delay += Duration::from_millis(jitter_ms);
                    }

                    tokio::time::sleep(delay).await;

                    backoff = Duration::from_secs_f64(
                        (backoff.as_secs_f64() * self.multiplier)
                            .min(self.max_backoff.as_secs_f64()),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(
    unsafe_code,
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::significant_drop_tightening
)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert!(policy.jitter);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unbounded_policies() {
        let mut policy = fast_policy(u32::MAX);
        assert!(matches!(policy.validate(), Err(BlockstoreError::Config(_))));

        policy.max_attempts = 2;
        policy.multiplier = f64::INFINITY;
        assert!(policy.validate().is_err());

        policy.multiplier = 0.5;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_from_vars_custom_values() {
        let policy = RetryPolicy::from_vars(|name| {
            let value = match name {
                "HOVERBOARD_MAX_RETRIES" => "5",
                "HOVERBOARD_RETRY_BACKOFF" => "200",
                "HOVERBOARD_RETRY_JITTER" => "false",
                _ => return None,
            };
            Some(value.to_string())
        })
        .expect("valid policy");
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(200));
        assert_eq!(policy.max_backoff, Duration::from_millis(5000));
        assert!(!policy.jitter);
    }

    #[test]
    fn test_from_vars_rejects_excessive_retries() {
        let result = RetryPolicy::from_vars(|name| {
            (name == "HOVERBOARD_MAX_RETRIES").then(|| "50".to_string())
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = fast_policy(3)
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(BlockstoreError::backend("unavailable"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third call succeeds"), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = fast_policy(2)
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(BlockstoreError::Timeout)
                }
            })
            .await;

        assert!(matches!(result, Err(BlockstoreError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_decode_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = fast_policy(5)
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(hoverboard_formats::FormatError::VarintOverflow.into())
                }
            })
            .await;

        assert!(matches!(result, Err(BlockstoreError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unvalidated_policy_is_clamped() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        };

        let result: Result<()> = policy
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(BlockstoreError::Timeout)
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRY_ATTEMPTS + 1);
    }
}
