//! Bounded retries with exponential backoff at the generation boundary.
//!
//! This is the only place the crate retries anything: the store and the
//! source browser are called once and their failures propagate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationRequest, Generator};
use crate::config::LlmConfig;
use crate::error::GenerationError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_backoff(),
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

pub struct RetryingGenerator {
    inner: Arc<dyn Generator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn Generator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Generator for RetryingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.generate(request).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.policy.max_attempts => {
                    return Err(GenerationError::Exhausted {
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Generation '{}' attempt {attempt}/{} failed: {e}; retrying in {}ms",
                        request.label,
                        self.policy.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given error for the first `failures` calls.
    struct Flaky {
        failures: u32,
        error: GenerationError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Generator for Flaky {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::text("test", vec![])
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            error: GenerationError::Transport("reset".into()),
            calls: AtomicU32::new(0),
        });
        let gen = RetryingGenerator::new(flaky.clone(), fast_policy(3));
        assert_eq!(gen.generate(&request()).await.unwrap(), "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let flaky = Arc::new(Flaky {
            failures: 10,
            error: GenerationError::Provider {
                status: 503,
                body: "busy".into(),
            },
            calls: AtomicU32::new(0),
        });
        let gen = RetryingGenerator::new(flaky.clone(), fast_policy(3));
        let err = gen.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Exhausted { attempts: 3, .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let flaky = Arc::new(Flaky {
            failures: 10,
            error: GenerationError::Provider {
                status: 401,
                body: "bad key".into(),
            },
            calls: AtomicU32::new(0),
        });
        let gen = RetryingGenerator::new(flaky.clone(), fast_policy(3));
        let err = gen.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Provider { status: 401, .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
    }
}
