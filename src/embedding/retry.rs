/// Retry policy for embedding requests
use super::EmbeddingError;
use crate::config::EmbeddingConfig;
use std::time::Duration;
use tracing::warn;

/// Fixed-backoff retry for transient provider failures
///
/// Transport failures and rate limiting are retried up to `max_retries` times.
/// Rejected requests (bad key, unknown model) fail immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Policy that never waits, for tests and local providers
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO)
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.max_retries, Duration::from_secs(config.backoff_secs))
    }

    /// Run `op`, retrying retryable failures
    ///
    /// Exhausting the retries yields [`EmbeddingError::Unavailable`].
    pub fn run<T, F>(&self, mut op: F) -> Result<T, EmbeddingError>
    where
        F: FnMut() -> Result<T, EmbeddingError>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempts > self.max_retries {
                        return Err(EmbeddingError::Unavailable {
                            attempts,
                            reason: e.to_string(),
                        });
                    }

                    let wait = self.wait_for(&e);
                    warn!(
                        "Embedding attempt {} failed ({}), retrying in {:?}",
                        attempts, e, wait
                    );
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn wait_for(&self, error: &EmbeddingError) -> Duration {
        match error {
            EmbeddingError::RateLimited {
                retry_after: Some(retry_after),
            } => (*retry_after).max(self.backoff),
            _ => self.backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_retry_then_success() {
        let policy = RetryPolicy::immediate(1);
        let mut calls = 0;

        let result = policy.run(|| {
            calls += 1;
            if calls == 1 {
                Err(EmbeddingError::Transport("connection reset".into()))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_second_failure_is_unavailable() {
        let policy = RetryPolicy::immediate(1);
        let mut calls = 0;

        let result: Result<(), _> = policy.run(|| {
            calls += 1;
            Err(EmbeddingError::Transport("connection refused".into()))
        });

        assert!(matches!(
            result,
            Err(EmbeddingError::Unavailable { attempts: 2, .. })
        ));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_rate_limit_is_retried() {
        let policy = RetryPolicy::immediate(2);
        let mut calls = 0;

        let result = policy.run(|| {
            calls += 1;
            if calls < 3 {
                Err(EmbeddingError::RateLimited { retry_after: None })
            } else {
                Ok("ok")
            }
        });

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_rejection_is_not_retried() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;

        let result: Result<(), _> = policy.run(|| {
            calls += 1;
            Err(EmbeddingError::Rejected {
                status: 401,
                message: "invalid api key".into(),
            })
        });

        assert!(matches!(result, Err(EmbeddingError::Rejected { status: 401, .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_default_matches_observed_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.backoff, Duration::from_secs(60));
    }
}
