//! Cancellable retry loop with pluggable backoff.

use std::{fmt::Display, future::Future, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub mod policies {
    use std::time::Duration;

    use super::Backoff;

    /// Waits the same interval between every attempt.
    #[derive(Debug, Clone, Copy)]
    pub struct ConstantBackoff {
        interval: Duration,
    }

    impl ConstantBackoff {
        pub fn new(interval: Duration) -> Self {
            Self { interval }
        }
    }

    impl Backoff for ConstantBackoff {
        fn delay(&self, _attempt: u64) -> Duration {
            self.interval
        }
    }
}

/// Decides how long to wait after a failed attempt.
pub trait Backoff {
    /// Delay after the given (1-based) failed attempt.
    fn delay(&self, attempt: u64) -> Duration;
}

/// Runs `op` until it succeeds or `cancel` fires.
///
/// Returns `None` if cancelled. Cancellation is observed both while an attempt is in flight
/// and while waiting between attempts, so in-flight work is dropped at its current await
/// point.
pub async fn retry_with_backoff_async<T, E, F, Fut>(
    name: &str,
    backoff: &impl Backoff,
    cancel: &CancellationToken,
    mut op: F,
) -> Option<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u64;
    loop {
        attempt += 1;

        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%name, %attempt, "retry cancelled");
                return None;
            }
            res = op() => res,
        };

        let err = match res {
            Ok(v) => return Some(v),
            Err(err) => err,
        };

        let delay = backoff.delay(attempt);
        error!(%name, %attempt, %err, ?delay, "attempt failed, retrying");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%name, %attempt, "retry cancelled");
                return None;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    use super::{policies::ConstantBackoff, *};

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();
        let backoff = ConstantBackoff::new(Duration::from_secs(5));

        let res = retry_with_backoff_async("test", &backoff, &cancel, || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("failure {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(res, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_interval_between_attempts() {
        let cancel = CancellationToken::new();
        let backoff = ConstantBackoff::new(Duration::from_secs(7));
        let start = tokio::time::Instant::now();
        let mut remaining = 3;

        let res = retry_with_backoff_async("test", &backoff, &cancel, || {
            remaining -= 1;
            let done = remaining == 0;
            async move {
                if done {
                    Ok(())
                } else {
                    Err("not yet")
                }
            }
        })
        .await;

        assert_eq!(res, Some(()));
        assert_eq!(start.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_retrying() {
        let cancel = CancellationToken::new();
        let backoff = ConstantBackoff::new(Duration::from_secs(1));
        let calls = Arc::new(AtomicU64::new(0));

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                cancel.cancel();
            })
        };

        let res: Option<()> = retry_with_backoff_async("test", &backoff, &cancel, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("always")
            }
        })
        .await;

        canceller.await.unwrap();
        assert_eq!(res, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_runs() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backoff = ConstantBackoff::new(Duration::from_secs(1));
        let polled = Arc::new(AtomicU64::new(0));

        let res: Option<()> = retry_with_backoff_async("test", &backoff, &cancel, || {
            let polled = polled.clone();
            async move {
                polled.fetch_add(1, Ordering::SeqCst);
                Err("ran")
            }
        })
        .await;

        assert_eq!(res, None);
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }
}
