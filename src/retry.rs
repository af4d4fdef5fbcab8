//! Retry Engine
//!
//! Exponential backoff with jitter over flaky HTTP transports. Transient
//! transport failures and throttling/server statuses retry up to the
//! attempt budget; application errors abort immediately. The per-attempt
//! callback fires before each backoff sleep so presenters can surface a
//! "retrying m of n" indicator.

use std::future::Future;

use rand::Rng;
use serde::Serialize;
use tokio::time::{sleep, Duration};

use crate::error::BridgeError;

/// Retry policy
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

/// Published to the presenter on every retry callback
#[derive(Debug, Clone, Serialize)]
pub struct RetryStatus {
    pub is_retrying: bool,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: String,
}

/// Deterministic part of the backoff for a 0-indexed attempt
fn capped_delay_ms(attempt: u32, opts: &RetryOptions) -> u64 {
    let base = opts.base_delay.as_millis() as u64;
    let exponential = base.saturating_mul(1u64 << attempt.min(62));
    exponential.min(opts.max_delay.as_millis() as u64)
}

/// Backoff delay: min(base * 2^attempt, max) plus up to 50% jitter
pub fn backoff_delay(attempt: u32, opts: &RetryOptions) -> Duration {
    let capped = capped_delay_ms(attempt, opts);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2);
    Duration::from_millis(capped + jitter)
}

/// The default retry predicate for pipeline operations
pub fn default_should_retry(err: &BridgeError) -> bool {
    err.is_retryable()
}

/// Run `op` with retries.
///
/// `should_retry` decides whether an error is transient; `on_retry` is
/// invoked with (attempt + 1, max_attempts, error) before the backoff
/// sleep. The final attempt's error is returned as-is.
pub async fn with_retry<T, E, F, Fut, P, C>(
    mut op: F,
    opts: &RetryOptions,
    mut should_retry: P,
    mut on_retry: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    C: FnMut(u32, u32, &E),
{
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let is_last = attempt + 1 >= opts.max_attempts;
                if is_last || !should_retry(&err) {
                    return Err(err);
                }
                on_retry(attempt + 1, opts.max_attempts, &err);
                sleep(backoff_delay(attempt, opts)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::insight::InsightError;

    fn status_err(status: u16) -> BridgeError {
        BridgeError::Insight(InsightError::Status {
            status,
            body: String::new(),
        })
    }

    fn quick_opts() -> RetryOptions {
        RetryOptions {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_bound() {
        let opts = RetryOptions {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };

        for attempt in 0..6 {
            let capped = capped_delay_ms(attempt, &opts);
            assert_eq!(capped, (100u64 << attempt).min(1000));
            for _ in 0..50 {
                let delay = backoff_delay(attempt, &opts).as_millis() as u64;
                assert!(delay >= capped, "delay below deterministic floor");
                assert!(delay <= capped + capped / 2, "jitter above 50%");
            }
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_errors() {
        let calls = RefCell::new(0u32);
        let retries = RefCell::new(Vec::new());

        let result: Result<&str, BridgeError> = with_retry(
            || {
                let n = {
                    let mut c = calls.borrow_mut();
                    *c += 1;
                    *c
                };
                async move {
                    if n < 3 {
                        Err(status_err(503))
                    } else {
                        Ok("done")
                    }
                }
            },
            &quick_opts(),
            default_should_retry,
            |attempt, max, _| retries.borrow_mut().push((attempt, max)),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*calls.borrow(), 3);
        assert_eq!(*retries.borrow(), vec![(1, 3), (2, 3)]);
    }

    #[tokio::test]
    async fn test_application_error_aborts_immediately() {
        let calls = RefCell::new(0u32);

        let result: Result<(), BridgeError> = with_retry(
            || {
                *calls.borrow_mut() += 1;
                async { Err(status_err(404)) }
            },
            &quick_opts(),
            default_should_retry,
            |_, _, _| {},
        )
        .await;

        assert!(matches!(
            result,
            Err(BridgeError::Insight(InsightError::Status {
                status: 404,
                ..
            }))
        ));
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test]
    async fn test_mixed_sequence_stops_at_application_error() {
        // Transient, transient, then 404: two retries fire, the third
        // attempt aborts, and nothing beyond the 404 is ever requested.
        let sequence = RefCell::new(vec![status_err(503), status_err(500), status_err(404)]);
        let calls = RefCell::new(0u32);

        let result: Result<(), BridgeError> = with_retry(
            || {
                *calls.borrow_mut() += 1;
                let err = sequence.borrow_mut().remove(0);
                async move { Err(err) }
            },
            &quick_opts(),
            default_should_retry,
            |_, _, _| {},
        )
        .await;

        assert!(matches!(
            result,
            Err(BridgeError::Insight(InsightError::Status {
                status: 404,
                ..
            }))
        ));
        assert_eq!(*calls.borrow(), 3);
        assert!(sequence.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_attempt_budget_exhausted() {
        let calls = RefCell::new(0u32);

        let result: Result<(), BridgeError> = with_retry(
            || {
                *calls.borrow_mut() += 1;
                async { Err(status_err(500)) }
            },
            &quick_opts(),
            default_should_retry,
            |_, _, _| {},
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.borrow(), 3);
    }
}
