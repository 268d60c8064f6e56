//! Retry of export calls with exponential backoff and full jitter.
//!
//! Every attempt is classified: non-retryable errors fail the batch
//! immediately, retryable errors back off exponentially from `base_delay`
//! doubling up to `max_delay`, and throttled errors honor the
//! server-provided delay (clamped to `max_delay`). A batch that exhausts
//! `max_retries` is dropped; no item is ever retried across batches.

use std::hash::{DefaultHasher, Hasher};
use std::time::{Duration, SystemTime};
use vantage::{sdk_debug, sdk_warn};

/// Classification of an export error for retry purposes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RetryErrorType {
    /// Not retryable (e.g. authentication failure, malformed request).
    NonRetryable,
    /// Retryable with exponential backoff (e.g. server overload, network
    /// timeout).
    Retryable,
    /// The server asked for a specific pause before the next attempt;
    /// overrides the backoff timing.
    Throttled(Duration),
}

/// Configuration for the retry loop.
///
/// The defaults retry up to 5 times, starting at 1s and doubling up to a
/// 30s cap.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial call.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any delay, server-provided ones included.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// A uniformly distributed duration in `0..=cap`, derived from the clock's
/// sub-second noise so the exporter needs no RNG state.
fn full_jitter(cap: Duration) -> Duration {
    let cap_ms = cap.as_millis() as u64;
    if cap_ms == 0 {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let mut hasher = DefaultHasher::default();
    hasher.write_u32(nanos);
    Duration::from_millis(hasher.finish() % (cap_ms + 1))
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts the
/// retry budget. Blocks between attempts; callers run on dedicated worker
/// threads.
pub(crate) fn retry_with_backoff<F, T, E, C>(
    policy: &RetryPolicy,
    classify: C,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Debug,
    C: Fn(&E) -> RetryErrorType,
{
    let mut attempt = 0;
    let mut delay = policy.base_delay;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => match classify(&err) {
                RetryErrorType::NonRetryable => {
                    sdk_warn!(
                        name: "OtlpRetry.NonRetryable",
                        operation = operation_name.to_string(),
                        error = format!("{err:?}")
                    );
                    return Err(err);
                }
                RetryErrorType::Retryable if attempt < policy.max_retries => {
                    attempt += 1;
                    sdk_debug!(
                        name: "OtlpRetry.Retrying",
                        operation = operation_name.to_string(),
                        attempt = attempt,
                        error = format!("{err:?}")
                    );
                    std::thread::sleep(delay.min(policy.max_delay).saturating_add(full_jitter(delay)));
                    delay = (delay * 2).min(policy.max_delay);
                }
                RetryErrorType::Throttled(server_delay) if attempt < policy.max_retries => {
                    attempt += 1;
                    sdk_debug!(
                        name: "OtlpRetry.Throttled",
                        operation = operation_name.to_string(),
                        attempt = attempt,
                        delay = format!("{server_delay:?}")
                    );
                    // The server timing overrides the backoff, clamped to
                    // the policy bound; the exponential delay is left
                    // untouched for later attempts.
                    std::thread::sleep(server_delay.min(policy.max_delay));
                }
                _ => {
                    sdk_warn!(
                        name: "OtlpRetry.Exhausted",
                        operation = operation_name.to_string(),
                        attempts = attempt,
                        error = format!("{err:?}")
                    );
                    return Err(err);
                }
            },
        }
    }
}

/// HTTP status classification with `Retry-After` support.
#[cfg(feature = "http-proto")]
pub(crate) mod http {
    use super::*;

    /// Classifies an HTTP response status.
    ///
    /// `Retry-After` accepts both delay-seconds (`"120"`) and HTTP dates.
    pub(crate) fn classify_http_error(
        status_code: u16,
        retry_after_header: Option<&str>,
    ) -> RetryErrorType {
        match status_code {
            429 | 503 => {
                if let Some(delay) = retry_after_header.and_then(parse_retry_after) {
                    return RetryErrorType::Throttled(delay);
                }
                RetryErrorType::Retryable
            }
            502 | 504 => RetryErrorType::Retryable,
            400..=499 => RetryErrorType::NonRetryable,
            _ => RetryErrorType::NonRetryable,
        }
    }

    fn parse_retry_after(retry_after: &str) -> Option<Duration> {
        let retry_after = retry_after.trim();
        if let Ok(seconds) = retry_after.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
        httpdate::parse_http_date(retry_after)
            .ok()
            .and_then(|when| when.duration_since(SystemTime::now()).ok())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn status_classification() {
            assert_eq!(classify_http_error(502, None), RetryErrorType::Retryable);
            assert_eq!(classify_http_error(503, None), RetryErrorType::Retryable);
            assert_eq!(classify_http_error(504, None), RetryErrorType::Retryable);
            assert_eq!(classify_http_error(429, None), RetryErrorType::Retryable);
            assert_eq!(classify_http_error(400, None), RetryErrorType::NonRetryable);
            assert_eq!(classify_http_error(404, None), RetryErrorType::NonRetryable);
            assert_eq!(classify_http_error(500, None), RetryErrorType::NonRetryable);
        }

        #[test]
        fn retry_after_seconds_is_honored() {
            assert_eq!(
                classify_http_error(429, Some("7")),
                RetryErrorType::Throttled(Duration::from_secs(7))
            );
            assert_eq!(
                classify_http_error(503, Some("2")),
                RetryErrorType::Throttled(Duration::from_secs(2))
            );
            // Unparseable values fall back to plain backoff.
            assert_eq!(
                classify_http_error(429, Some("soon")),
                RetryErrorType::Retryable
            );
        }
    }
}

/// gRPC status classification.
#[cfg(feature = "grpc-tonic")]
pub(crate) mod grpc {
    use super::*;

    /// Classifies a gRPC status code per the OTLP failure handling rules.
    pub(crate) fn classify_tonic_status(status: &tonic::Status) -> RetryErrorType {
        match status.code() {
            tonic::Code::Unavailable
            | tonic::Code::DeadlineExceeded
            | tonic::Code::ResourceExhausted => RetryErrorType::Retryable,
            _ => RetryErrorType::NonRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn succeeds_without_retry() {
        let policy = RetryPolicy::default();
        let result: Result<&str, ()> =
            retry_with_backoff(&policy, |_| RetryErrorType::Retryable, "test", || Ok("ok"));
        assert_eq!(result, Ok("ok"));
    }

    #[test]
    fn retries_until_success() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        let attempts = AtomicUsize::new(0);
        let started = Instant::now();

        let result: Result<&str, &str> = retry_with_backoff(
            &policy,
            |_| RetryErrorType::Retryable,
            "test",
            || {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("boom")
                } else {
                    Ok("ok")
                }
            },
        );

        assert_eq!(result, Ok("ok"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Two backoffs: base + doubled base.
        assert!(started.elapsed() >= Duration::from_millis(100 + 200));
    }

    #[test]
    fn gives_up_after_max_retries() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        };
        let attempts = AtomicUsize::new(0);
        let result: Result<(), &str> = retry_with_backoff(
            &policy,
            |_| RetryErrorType::Retryable,
            "test",
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("always")
            },
        );
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_retryable_fails_immediately() {
        let policy = RetryPolicy::default();
        let attempts = AtomicUsize::new(0);
        let result: Result<(), &str> = retry_with_backoff(
            &policy,
            |_| RetryErrorType::NonRetryable,
            "test",
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("bad request")
            },
        );
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn throttled_waits_for_server_delay() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(30),
        };
        let attempts = AtomicUsize::new(0);
        let started = Instant::now();
        let result: Result<&str, &str> = retry_with_backoff(
            &policy,
            |_| RetryErrorType::Throttled(Duration::from_millis(50)),
            "test",
            || {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("slow down")
                } else {
                    Ok("ok")
                }
            },
        );
        assert_eq!(result, Ok("ok"));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..32 {
            assert!(full_jitter(Duration::from_millis(100)) <= Duration::from_millis(100));
        }
        assert_eq!(full_jitter(Duration::ZERO), Duration::ZERO);
    }
}
