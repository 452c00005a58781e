//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use hoard_config::RetryPolicy;
use tracing::warn;

use crate::BackupError;

/// Output of a successful retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub output: T,
    /// Invocations used, including the successful one.
    pub attempts: u32,
}

/// Delay before the attempt following failure number `failures`.
///
/// `factor * 2^failures` seconds, uncapped. Non-positive or non-finite
/// factors yield no delay.
pub fn backoff_delay(factor: f64, failures: u32) -> Duration {
    let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
    let secs = factor * 2f64.powi(exponent);
    if !secs.is_finite() || secs <= 0.0 {
        return if secs == f64::INFINITY {
            Duration::MAX
        } else {
            Duration::ZERO
        };
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Runs an operation up to `policy.attempts + 1` times.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    timeout: Duration,
    operation: String,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            policy,
            timeout,
            operation: "operation".to_string(),
        }
    }

    /// Name used in logs and timeout errors.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Invoke `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Each invocation is bounded
    /// by the timeout; an elapsed timeout counts as a failed attempt. No
    /// delay follows the final failure.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<Attempted<T>, BackupError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, BackupError>>,
    {
        let mut failures: u32 = 0;
        loop {
            let attempt = failures + 1;
            let outcome = match tokio::time::timeout(self.timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(BackupError::Timeout {
                    operation: self.operation.clone(),
                    after: self.timeout,
                }),
            };

            let error = match outcome {
                Ok(output) => {
                    return Ok(Attempted {
                        output,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            failures += 1;
            if failures > self.policy.attempts {
                return Err(BackupError::RetryExhausted {
                    attempts: failures,
                    source: Box::new(error),
                });
            }

            let delay = backoff_delay(self.policy.backoff_factor, failures);
            warn!(
                operation = %self.operation,
                attempt,
                error = %error,
                delay_secs = delay.as_secs_f64(),
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing(message: &str) -> BackupError {
        BackupError::Command {
            program: "mongodump".to_string(),
            status: "exit status: 1".to_string(),
            output: message.to_string(),
        }
    }

    fn policy(attempts: u32, backoff_factor: f64) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff_factor,
        }
    }

    // === Unit Tests ===

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(0.5, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(0.5, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(1.0, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(0.0, 5), Duration::ZERO);
        assert_eq!(backoff_delay(-1.0, 1), Duration::ZERO);
        assert_eq!(backoff_delay(f64::NAN, 1), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new(policy(3, 1.0), Duration::from_secs(60));
        let result = executor.run(|_| async { Ok::<_, BackupError>("done") }).await.unwrap();
        assert_eq!(
            result,
            Attempted {
                output: "done",
                attempts: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(policy(3, 0.5), Duration::from_secs(60));

        let started = tokio::time::Instant::now();
        let result = executor
            .run(|attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(failing("connection refused"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(result.output, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 0.5 * 2^1 + 0.5 * 2^2
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reports_attempts_and_last_error() {
        let executor = RetryExecutor::new(policy(2, 1.0), Duration::from_secs(60));

        let started = tokio::time::Instant::now();
        let err = executor
            .run(|attempt| async move {
                Err::<(), _>(failing(&format!("failure {attempt}")))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), Some(3));
        assert!(err.to_string().contains("failure 3"));
        // No sleep after the final failure: 2 + 4 seconds.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let executor = RetryExecutor::new(policy(1, 0.0), Duration::from_secs(5))
            .with_operation("dump");

        let err = executor
            .run(|attempt| async move {
                if attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Err::<(), _>(failing("still broken"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), Some(2));

        let executor = RetryExecutor::new(policy(0, 0.0), Duration::from_secs(5))
            .with_operation("dump");
        let err = executor
            .run(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, BackupError>(())
            })
            .await
            .unwrap_err();
        match err {
            BackupError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*source, BackupError::Timeout { .. }));
            }
            other => panic!("expected exhausted retry, got {other:?}"),
        }
    }

    // === Property Tests ===

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap()
    }

    proptest! {
        // An always-failing operation is invoked exactly budget + 1 times
        #[test]
        fn invocations_are_budget_plus_one(budget in 0u32..8, factor in 0.0f64..2.0) {
            let calls = Arc::new(AtomicU32::new(0));
            let executor = RetryExecutor::new(policy(budget, factor), Duration::from_secs(60));

            let err = paused_runtime().block_on(executor.run(|_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(failing("down"))
                }
            })).unwrap_err();

            prop_assert_eq!(calls.load(Ordering::SeqCst), budget + 1);
            prop_assert_eq!(err.attempts(), Some(budget + 1));
        }

        // Success on attempt k never invokes the operation again
        #[test]
        fn stops_at_first_success(budget in 0u32..8, succeed_at in 1u32..10) {
            let calls = Arc::new(AtomicU32::new(0));
            let executor = RetryExecutor::new(policy(budget, 0.1), Duration::from_secs(60));

            let result = paused_runtime().block_on(executor.run(|attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt >= succeed_at { Ok(attempt) } else { Err(failing("down")) }
                }
            }));

            if succeed_at <= budget + 1 {
                let attempted = result.unwrap();
                prop_assert_eq!(attempted.attempts, succeed_at);
                prop_assert_eq!(calls.load(Ordering::SeqCst), succeed_at);
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(calls.load(Ordering::SeqCst), budget + 1);
            }
        }

        // Delays double with every failure
        #[test]
        fn backoff_doubles(factor in 0.001f64..10.0, failures in 0u32..20) {
            let current = backoff_delay(factor, failures).as_secs_f64();
            let next = backoff_delay(factor, failures + 1).as_secs_f64();
            prop_assert!((next - 2.0 * current).abs() < 1e-6 * next.max(1.0));
        }
    }
}
