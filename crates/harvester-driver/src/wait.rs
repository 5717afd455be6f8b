//! Bounded, cancellable polling of cluster state.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between two checks.
    pub interval: Duration,
    /// Give up after this long; `None` waits until cancelled.
    pub timeout: Option<Duration>,
}

impl WaitConfig {
    /// A timeout of zero seconds means no timeout.
    pub fn from_secs(interval_secs: u64, timeout_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }
}

/// Run `check` until it yields a value.
///
/// `check` returns `Ok(None)` for "not yet". Errors from `check` end the
/// wait and are returned unchanged. Fails with [`Error::Timeout`] once the
/// configured timeout elapses and with [`Error::Cancelled`] when `cancel`
/// fires, including while a check is in flight.
pub async fn poll_until<F, Fut, T>(
    config: &WaitConfig,
    cancel: &CancellationToken,
    what: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let polling = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match check().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => return Err(e),
            }
            debug!(what, attempt, "still waiting");
            tokio::time::sleep(config.interval).await;
        }
    };

    let bounded = async {
        match config.timeout {
            Some(after) => match tokio::time::timeout(after, polling).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    what: what.to_string(),
                    after,
                }),
            },
            None => polling.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(what.to_string())),
        result = bounded => result,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(timeout: Option<Duration>) -> WaitConfig {
        WaitConfig {
            interval: Duration::from_millis(1),
            timeout,
        }
    }

    #[test]
    fn test_from_secs() {
        let config = WaitConfig::from_secs(5, 0);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.timeout, None);

        let config = WaitConfig::from_secs(0, 30);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_returns_when_ready() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let value = poll_until(&fast(None), &CancellationToken::new(), "ready", || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n >= 3).then_some(n))
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_propagates_check_error() {
        let err = poll_until(&fast(None), &CancellationToken::new(), "ready", || async {
            Err::<Option<()>, _>(Error::SshKey("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::SshKey(_)));
    }

    #[tokio::test]
    async fn test_times_out() {
        let err = poll_until(
            &fast(Some(Duration::from_millis(20))),
            &CancellationToken::new(),
            "never",
            || async { Ok::<Option<()>, Error>(None) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref what, .. } if what == "never"));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = poll_until(&fast(None), &cancel, "never", || async {
            Ok::<Option<()>, Error>(None)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled(ref what) if what == "never"));
    }
}
