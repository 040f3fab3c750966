//! Retry logic with exponential backoff
//!
//! This module provides configurable retry functionality with
//! exponential backoff for handling transient failures, and a bounded
//! polling loop used to wait for eventually consistent remote state.

use crate::error::{BlobDiskError, Result};
use crate::utils::network::is_retryable_error;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_retries: usize,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

pub async fn retry_with_backoff<T, F, Fut>(mut operation: F, options: RetryOptions) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut interval = options.initial_interval;
    let mut last_error = None;

    for attempt in 0..=options.max_retries {
        if attempt > 0 {
            sleep(interval).await;
            interval = std::cmp::min(
                Duration::from_secs_f64(interval.as_secs_f64() * options.multiplier),
                options.max_interval,
            );
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !is_retryable_error(&error) {
                    return Err(error);
                }

                last_error = Some(error);
                if attempt == options.max_retries {
                    break;
                }
            }
        }
    }

    Err(last_error.unwrap_or(BlobDiskError::Timeout))
}

/// Exponential backoff used for polling remote convergence.
///
/// The condition is evaluated at most `steps` times; between evaluations the
/// delay starts at `initial` and grows by `factor`, never exceeding `cap`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Backoff {
    #[serde(with = "crate::utils::serde_duration")]
    pub initial: Duration,
    pub factor: f64,
    pub steps: u32,
    #[serde(with = "crate::utils::serde_duration")]
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            factor: 1.5,
            steps: 20,
            cap: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// Delays between consecutive attempts, `steps - 1` of them.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut next = self.initial;
        (1..self.steps).map(move |_| {
            let current = next.min(self.cap);
            next = Duration::from_secs_f64(next.as_secs_f64() * self.factor).min(self.cap);
            current
        })
    }
}

/// Poll `condition` until it reports `Ok(true)`.
///
/// `Ok(false)` means "not yet"; an `Err` aborts the loop and is returned as-is.
/// Exhausting the backoff yields [`BlobDiskError::Timeout`]. When a cancel
/// receiver is supplied and flips to `true`, the loop ends with
/// [`BlobDiskError::Cancelled`].
pub async fn poll_until<F, Fut>(
    backoff: &Backoff,
    mut cancel: Option<watch::Receiver<bool>>,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    if backoff.steps == 0 {
        return Err(BlobDiskError::Timeout);
    }

    let mut delays = backoff.delays();
    loop {
        if is_cancelled(&cancel) {
            return Err(BlobDiskError::Cancelled);
        }

        if condition().await? {
            return Ok(());
        }

        let Some(delay) = delays.next() else {
            return Err(BlobDiskError::Timeout);
        };

        match cancel.as_mut() {
            Some(rx) => {
                tokio::select! {
                    _ = sleep(delay) => {}
                    changed = rx.changed() => {
                        // A dropped sender can never cancel; finish the sleep.
                        if changed.is_err() {
                            sleep(delay).await;
                        }
                    }
                }
            }
            None => sleep(delay).await,
        }
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_backoff(steps: u32) -> Backoff {
        Backoff {
            initial: Duration::from_millis(1),
            factor: 2.0,
            steps,
            cap: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_delays_are_capped() {
        let delays: Vec<_> = fast_backoff(6).delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_millis(4),
                Duration::from_millis(4),
                Duration::from_millis(4),
            ]
        );
    }

    #[tokio::test]
    async fn test_poll_until_succeeds_after_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = poll_until(&fast_backoff(5), None, || {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out_after_all_steps() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = poll_until(&fast_backoff(4), None, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }
        })
        .await;

        assert!(matches!(result, Err(BlobDiskError::Timeout)));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_poll_until_stops_on_error() {
        let result = poll_until(&fast_backoff(4), None, || async {
            Err::<bool, _>(BlobDiskError::azure_api("boom"))
        })
        .await;

        assert!(matches!(result, Err(BlobDiskError::AzureApiError(_))));
    }

    #[tokio::test]
    async fn test_poll_until_honours_cancellation() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let result = poll_until(&fast_backoff(4), Some(rx), || async { Ok(false) }).await;

        assert!(matches!(result, Err(BlobDiskError::Cancelled)));
    }

    #[tokio::test]
    async fn test_retry_with_backoff_does_not_retry_permanent_errors() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let options = RetryOptions {
            max_retries: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            multiplier: 2.0,
        };
        let result: Result<()> = retry_with_backoff(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(BlobDiskError::azure_api("HTTP 400: bad request"))
                }
            },
            options,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
