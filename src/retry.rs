//! One retry loop for every grid store call: linear backoff, a timeout per attempt and a
//! predicate that decides which failures are worth another attempt.

use crate::error::{Res, StoreError};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

/// Maximum attempts, counting the first one.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Delay unit for the linear backoff: attempt `n` waits `n * delay` before attempt `n + 1`.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// Default timeout for a single grid store call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sent to the progress hook before each backoff sleep.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RetryNotice {
    /// What was being attempted, e.g. "write Ledger!C12".
    pub operation: String,
    /// The attempt that just failed, starting at 1.
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(serialize_with = "serialize_millis")]
    pub wait: Duration,
    pub error: String,
}

fn serialize_millis<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(d.as_millis() as u64)
}

/// Caller-visible progress notifications, e.g. to edit a chat message while a write is retried.
pub type ProgressHook = Arc<dyn Fn(RetryNotice) + Send + Sync>;

/// Retry policy for grid store calls.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_DELAY, DEFAULT_CALL_TIMEOUT)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, call_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            call_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The wait after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }

    /// Runs `op` with the default transience predicate (`StoreError::is_transient_error`).
    pub async fn run<F, Fut, T>(
        &self,
        operation: &str,
        hook: Option<&ProgressHook>,
        op: F,
    ) -> Res<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Res<T>>,
    {
        self.run_with(operation, hook, StoreError::is_transient_error, op)
            .await
    }

    /// Runs `op` until it succeeds, fails with an error `is_transient` rejects, or the attempts
    /// are used up. Each attempt is bounded by the call timeout; a timeout counts as transient.
    /// `op` must be idempotent.
    pub async fn run_with<F, Fut, T, P>(
        &self,
        operation: &str,
        hook: Option<&ProgressHook>,
        is_transient: P,
        mut op: F,
    ) -> Res<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Res<T>>,
        P: Fn(&anyhow::Error) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = match timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::Error::new(StoreError::transient(format!(
                    "timed out after {}s",
                    self.call_timeout.as_secs_f64()
                )))),
            };
            let e = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !is_transient(&e) {
                error!("{operation} failed: {e:#}");
                return Err(e);
            }
            if attempt >= self.max_attempts {
                error!("{operation} failed after {attempt} attempts: {e:#}");
                return Err(e);
            }

            let wait = self.backoff(attempt);
            warn!(
                "{operation} failed (attempt {attempt}/{}), retrying in {}ms: {e:#}",
                self.max_attempts,
                wait.as_millis()
            );
            if let Some(hook) = hook {
                hook(RetryNotice {
                    operation: operation.to_string(),
                    attempt,
                    max_attempts: self.max_attempts,
                    wait,
                    error: format!("{e:#}"),
                });
            }
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_secs(5))
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(400));
        let clamped = RetryPolicy::new(0, DEFAULT_DELAY, DEFAULT_CALL_TIMEOUT);
        assert_eq!(clamped.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_fifth_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = notices.clone();
        let hook: ProgressHook = Arc::new(move |n: RetryNotice| sink.lock().unwrap().push(n));

        let result = quick(5)
            .run("write", Some(&hook), || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 5 {
                        Err(anyhow::Error::new(StoreError::transient("rate limited")))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 5);
        let notices = notices.lock().unwrap();
        assert_eq!(notices.len(), 4);
        assert_eq!(notices[0].attempt, 1);
        assert_eq!(notices[3].attempt, 4);
        assert_eq!(notices[3].wait, Duration::from_millis(4));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let e = quick(3)
            .run("write", None, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::Error::new(StoreError::transient("503")))
                }
            })
            .await
            .unwrap_err();
        assert!(StoreError::is_transient_error(&e));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let e = quick(5)
            .run("write", None, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::Error::new(StoreError::fatal("permission denied")))
                }
            })
            .await
            .unwrap_err();
        assert_eq!(StoreError::find(&e).unwrap().message(), "permission denied");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(10));
        let result = policy
            .run("read", None, || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<u32, anyhow::Error>(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 1);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let _ = quick(4)
            .run_with("op", None, |_| true, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("anything"))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
