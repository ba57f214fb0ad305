//! Gateway decorator: one transient retry plus the process-wide concurrency limit.
//!
//! Wraps any [`LlmGateway`]; a `Semaphore` caps in-flight provider calls so concurrent
//! requests do not trigger rate-limit storms.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{LlmError, LlmGateway};

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Retrying, concurrency-limited [`LlmGateway`] wrapper.
pub struct RetryingGateway {
    inner: Arc<dyn LlmGateway>,
    permits: Arc<Semaphore>,
    max_retries: usize,
}

impl RetryingGateway {
    /// Wraps `inner` with `concurrency` max in-flight calls and one transient retry.
    pub fn new(inner: Arc<dyn LlmGateway>, concurrency: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            max_retries: 1,
        }
    }

    async fn with_retry<T, F, Fut>(&self, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        // Closed only if the semaphore itself is dropped, which cannot happen while self lives.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let mut attempt = 0;
        loop {
            match call().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "transient llm failure, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt as u32).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl LlmGateway for RetryingGateway {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        self.with_retry(|| self.inner.chat(system, user, temperature, max_tokens))
            .await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.with_retry(|| self.inner.embed(text)).await
    }

    async fn json(&self, system: &str, user: &str, temperature: f32) -> Result<Value, LlmError> {
        self.with_retry(|| self.inner.json(system, user, temperature))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls with the given transient-ness, then succeeds.
    struct Flaky {
        failures: usize,
        transient: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmGateway for Flaky {
        async fn chat(
            &self,
            _system: &str,
            _user: &str,
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.transient {
                    Err(LlmError::Transport("reset".into()))
                } else {
                    Err(LlmError::Provider("bad".into()))
                }
            } else {
                Ok("ok".to_string())
            }
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![1.0])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_transient_failure_is_retried() {
        let flaky = Arc::new(Flaky {
            failures: 1,
            transient: true,
            calls: AtomicUsize::new(0),
        });
        let gw = RetryingGateway::new(flaky.clone(), 2);
        let out = gw.chat("s", "u", 0.0, None).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_transient_failure_surfaces() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            transient: true,
            calls: AtomicUsize::new(0),
        });
        let gw = RetryingGateway::new(flaky.clone(), 2);
        let err = gw.chat("s", "u", 0.0, None).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2, "exactly one retry");
    }

    #[tokio::test]
    async fn non_transient_failure_is_not_retried() {
        let flaky = Arc::new(Flaky {
            failures: 1,
            transient: false,
            calls: AtomicUsize::new(0),
        });
        let gw = RetryingGateway::new(flaky.clone(), 2);
        assert!(gw.chat("s", "u", 0.0, None).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
