//! Supervised loops with backoff on failure.
//!
//! Long-running services (scheduler, queue cleaner) run as a body function
//! invoked on a fixed period. A failing body does not kill the loop: the
//! supervisor logs the error and retries after an abnormal delay that
//! doubles from `min_abnormal` up to `max_abnormal`, resetting on the next
//! success.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Runs `body` every `period` until `cancellation` fires.
///
/// On `Err`, waits an abnormal delay instead of the normal period. The
/// delay starts at `min_abnormal` and doubles per consecutive failure,
/// clamped to `max_abnormal`.
pub async fn run_with_backoff<F, Fut, E>(
    name: &str,
    cancellation: CancellationToken,
    period: Duration,
    min_abnormal: Duration,
    max_abnormal: Duration,
    mut body: F,
) where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut abnormal = min_abnormal;
    loop {
        let delay = match body(cancellation.clone()).await {
            Ok(()) => {
                abnormal = min_abnormal;
                period
            }
            Err(err) => {
                tracing::error!(runner = name, error = %err, "runner iteration failed");
                let delay = abnormal;
                abnormal = (abnormal * 2).min(max_abnormal);
                delay
            }
        };
        tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!(runner = name, "runner stopped");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn runs_until_cancelled() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        let stopper = token.clone();
        let handle = tokio::spawn(run_with_backoff(
            "test",
            token,
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
            move |_| {
                let count = seen.clone();
                let stopper = stopper.clone();
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                        stopper.cancel();
                    }
                    Ok::<(), std::convert::Infallible>(())
                }
            },
        ));
        handle.await.expect("runner task");
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_delay_doubles_up_to_max() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        let stopper = token.clone();
        let started = tokio::time::Instant::now();
        let handle = tokio::spawn(run_with_backoff(
            "test",
            token,
            Duration::from_secs(60),
            Duration::from_secs(1),
            Duration::from_secs(4),
            move |_| {
                let count = seen.clone();
                let stopper = stopper.clone();
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                        stopper.cancel();
                    }
                    Err::<(), _>("boom")
                }
            },
        ));
        handle.await.expect("runner task");
        // Delays taken: 1s, 2s, 4s, 4s between the five iterations.
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(11));
    }
}
