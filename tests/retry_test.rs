//! Retry Engine Tests
//!
//! Attempt counting, hook invocation and classification.
//! Runs on paused time so backoff sleeps complete instantly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anistream::error::ProviderError;
use anistream::retry::RetryPolicy;

// =============================================================================
// Attempt Counting
// =============================================================================

/// Test: fails twice then succeeds; on_retry observed exactly twice
#[tokio::test(start_paused = true)]
async fn test_fail_twice_then_succeed() {
    let attempts = Arc::new(AtomicU32::new(0));
    let mut retries = Vec::new();

    let result = RetryPolicy::critical()
        .execute_with(
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= 2 {
                        Err(ProviderError::Status(503))
                    } else {
                        Ok("payload")
                    }
                }
            },
            |attempt, error| retries.push((attempt, error.clone())),
        )
        .await;

    assert_eq!(result, Ok("payload"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(
        retries,
        vec![
            (1, ProviderError::Status(503)),
            (2, ProviderError::Status(503))
        ]
    );
}

/// Test: always fails with a retryable error; exactly max_attempts calls
#[tokio::test(start_paused = true)]
async fn test_always_fail_stops_at_max_attempts() {
    let attempts = Arc::new(AtomicU32::new(0));

    let result: Result<(), _> = RetryPolicy::critical()
        .execute(|| {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Network("connection reset".into()))
            }
        })
        .await;

    assert_eq!(
        result,
        Err(ProviderError::Network("connection reset".into()))
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

/// Test: terminal errors propagate after one attempt
#[tokio::test(start_paused = true)]
async fn test_terminal_error_not_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let mut hook_calls = 0;

    let result: Result<(), _> = RetryPolicy::critical()
        .execute_with(
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Status(404))
                }
            },
            |_, _| hook_calls += 1,
        )
        .await;

    assert_eq!(result, Err(ProviderError::Status(404)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(hook_calls, 0);
}

/// Test: the streaming policy treats 4xx as retryable
#[tokio::test(start_paused = true)]
async fn test_streaming_retries_client_errors() {
    let attempts = Arc::new(AtomicU32::new(0));

    let result: Result<(), _> = RetryPolicy::streaming()
        .execute(|| {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Status(403))
            }
        })
        .await;

    assert_eq!(result, Err(ProviderError::Status(403)));
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
}

/// Test: malformed responses are never retried, even by the streaming policy
#[tokio::test(start_paused = true)]
async fn test_malformed_is_terminal() {
    let attempts = Arc::new(AtomicU32::new(0));

    let result: Result<(), _> = RetryPolicy::streaming()
        .execute(|| {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Malformed("<html>".into()))
            }
        })
        .await;

    assert!(matches!(result, Err(ProviderError::Malformed(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Backoff Timing
// =============================================================================

/// Test: total suspension equals the sum of capped backoffs when jitter is off
#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_without_jitter() {
    let policy = RetryPolicy::critical().with_jitter(Duration::ZERO);
    let start = tokio::time::Instant::now();

    let _: Result<(), _> = policy
        .execute(|| async { Err(ProviderError::Timeout) })
        .await;

    // 1s + 2s between three attempts
    assert_eq!(start.elapsed(), Duration::from_millis(3000));
}

/// Test: jitter adds at most the configured ceiling per retry
#[tokio::test(start_paused = true)]
async fn test_jitter_bounded() {
    let policy = RetryPolicy::images();
    let start = tokio::time::Instant::now();

    let _: Result<(), _> = policy
        .execute(|| async { Err(ProviderError::Status(502)) })
        .await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(500), "elapsed {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(1500), "elapsed {:?}", elapsed);
}

/// Test: custom classifiers replace the default decision
#[tokio::test(start_paused = true)]
async fn test_custom_classifier() {
    fn never(_: &ProviderError) -> bool {
        false
    }
    let attempts = Arc::new(AtomicU32::new(0));

    let _: Result<(), _> = RetryPolicy::optional()
        .with_classifier(never)
        .execute(|| {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Status(500))
            }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
