//! Bounded Retry
//!
//! Exponential backoff with a hard attempt limit. Retryable failures are
//! reported as transient to `backoff`; the last allowed attempt and any
//! non-retryable failure are reported as permanent.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use ci_triage_core::RetryConfig;

use crate::error::{SourceError, SourceResult};

/// Outcome of a retried operation together with the attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: SourceResult<T>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry_counted<T, F, Fut>(policy: &RetryConfig, what: &str, mut operation: F) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SourceResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let attempts = AtomicU32::new(0);

    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval())
        .with_multiplier(policy.multiplier)
        .with_max_interval(policy.max_interval())
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(None)
        .build();

    let result = backoff::future::retry_notify(
        backoff,
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let fut = operation();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_retryable() && attempt < max_attempts => {
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        },
        |err: SourceError, wait: Duration| {
            tracing::warn!(
                "{} failed ({}), retrying in {}ms",
                what,
                err,
                wait.as_millis()
            );
        },
    )
    .await;

    Attempted {
        result,
        attempts: attempts.load(Ordering::SeqCst),
    }
}

/// `retry_counted` without the attempt count.
pub async fn retry<T, F, Fut>(policy: &RetryConfig, what: &str, operation: F) -> SourceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SourceResult<T>>,
{
    retry_counted(policy, what, operation).await.result
}
