//! Rate-limited external call wrapper
//!
//! Every external-call site goes through one `RateLimitedClient` per
//! rate-limit domain ("geocoder", "elevation", "osm"). The client enforces
//! minimum inter-request spacing within its domain and retries retryable
//! failures with exponential backoff. Calls to different domains never
//! throttle each other.

use crate::config::RateLimitSettings;
use crate::error::FetchError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Enforces minimum spacing between successive calls in one domain.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to comply with the domain's rate limit.
    ///
    /// The slot is claimed while the lock is held, so concurrent workers
    /// serialize here rather than racing the timestamp.
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Retry policy: exponential backoff applied to retryable failures only.
#[derive(Debug, Clone)]
struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

/// Rate-limited, retrying wrapper around any external request closure.
///
/// One instance per domain, shared across all workers; the limiter itself
/// is the serialization point, not the worker pool.
pub struct RateLimitedClient {
    domain: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(domain: impl Into<String>, settings: &RateLimitSettings) -> Self {
        Self {
            domain: domain.into(),
            limiter: RateLimiter::new(Duration::from_millis(settings.min_interval_ms)),
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: Duration::from_millis(settings.backoff_base_ms),
                max_delay: Duration::from_millis(settings.backoff_cap_ms),
            },
        }
    }

    /// Rate-limit domain name.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Issue `request`, blocking until the domain's spacing allows it.
    ///
    /// Retryable failures (timeout, 429, 5xx, network) are retried up to
    /// `max_retries` times with doubling backoff; other failures surface
    /// immediately. Every attempt, including retries, respects the
    /// minimum-interval contract.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0u32;
        let mut backoff = self.retry.base_delay;

        loop {
            attempt += 1;
            self.limiter.wait().await;

            match request().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(
                            domain = %self.domain,
                            operation,
                            attempt,
                            "Call succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) if err.is_retryable() && attempt <= self.retry.max_retries => {
                    tracing::warn!(
                        domain = %self.domain,
                        operation,
                        attempt,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.retry.max_delay);
                }
                Err(err) => {
                    tracing::error!(
                        domain = %self.domain,
                        operation,
                        attempt,
                        error = %err,
                        "Call failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_settings(min_interval_ms: u64) -> RateLimitSettings {
        RateLimitSettings {
            min_interval_ms,
            max_retries: 3,
            backoff_base_ms: 10,
            backoff_cap_ms: 40,
        }
    }

    #[tokio::test]
    async fn test_min_interval_spacing() {
        // 5 calls with 100ms spacing and instant responses: the last four
        // each wait out the interval, so >= 400ms total.
        let client = RateLimitedClient::new("osm", &fast_settings(100));
        let start = Instant::now();

        for _ in 0..5 {
            client
                .call("noop", || async { Ok::<_, FetchError>(()) })
                .await
                .unwrap();
        }

        assert!(
            start.elapsed() >= Duration::from_millis(400),
            "5 calls took only {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_independent_domains_do_not_throttle_each_other() {
        let a = RateLimitedClient::new("geocoder", &fast_settings(200));
        let b = RateLimitedClient::new("elevation", &fast_settings(200));

        // One call in each domain back to back; neither waits for the other.
        let start = Instant::now();
        a.call("noop", || async { Ok::<_, FetchError>(()) })
            .await
            .unwrap();
        b.call("noop", || async { Ok::<_, FetchError>(()) })
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_retries_then_success() {
        let client = RateLimitedClient::new("osm", &fast_settings(1));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = client
            .call("flaky", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(FetchError::Timeout)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_surfaces_terminal_failure() {
        let client = RateLimitedClient::new("osm", &fast_settings(1));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: Result<(), _> = client
            .call("down", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Api(503, "unavailable".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Api(503, _))));
        // Initial attempt + max_retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let client = RateLimitedClient::new("osm", &fast_settings(1));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: Result<(), _> = client
            .call("bad_request", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Api(400, "bad query".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Api(400, _))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
