// src/jit/retry.rs

//! Bounded exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::model::BackoffConfig;
use crate::jit::RemoteError;

/// Retry policy derived from a `[config.retry]` / `[config.poll]` section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl From<&BackoffConfig> for RetryPolicy {
    fn from(cfg: &BackoffConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_delay: cfg.initial_delay(),
            max_delay: cfg.max_delay(),
            factor: cfg.factor.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given 1-based attempt failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.factor.powi(exp);
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only [`RemoteError::Transient`] is retried; every other error is
    /// returned at once.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            factor: 2.0,
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(1));
        assert_eq!(p.delay_for(2), Duration::from_millis(2));
        assert_eq!(p.delay_for(3), Duration::from_millis(4));
        assert_eq!(p.delay_for(10), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = policy(3)
            .run("op", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RemoteError::Transient("flaky".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = policy(2)
            .run("op", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Transient("down".into()))
            })
            .await;
        assert_eq!(result.unwrap_err(), RemoteError::Transient("down".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = policy(5)
            .run("op", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Rejected {
                    status: 400,
                    message: "bad graph".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
