//! Request pacing for the service clients.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Rate limiter that enforces a maximum request rate.
///
/// Uses a minimum-interval token bucket. Services can also ask clients to
/// pause (Zotero sends `Backoff` under load and `Retry-After` with 429/503),
/// which blocks every subsequent request until the pause has elapsed.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
}

#[derive(Debug)]
struct RateLimiterInner {
    /// Maximum requests per second.
    max_per_second: f64,
    /// Time of the last request.
    last_request: Option<Instant>,
    /// Server-requested pause end.
    paused_until: Option<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given maximum requests per second.
    pub fn new(max_per_second: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiterInner {
                max_per_second,
                last_request: None,
                paused_until: None,
            })),
        }
    }

    /// Wait until a request is allowed, then mark it as sent.
    pub async fn acquire(&self) {
        let mut inner = self.inner.lock().await;

        if let Some(until) = inner.paused_until {
            let now = Instant::now();
            if now < until {
                drop(inner);
                tokio::time::sleep(until - now).await;
                inner = self.inner.lock().await;
            }
            inner.paused_until = None;
        }

        if let Some(last) = inner.last_request {
            let min_interval = Duration::from_secs_f64(1.0 / inner.max_per_second);
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                drop(inner);
                tokio::time::sleep(wait).await;
                inner = self.inner.lock().await;
            }
        }

        inner.last_request = Some(Instant::now());
    }

    /// Update the limiter from response headers.
    ///
    /// Both `Backoff` and `Retry-After` are read as whole seconds; the longer
    /// of the two wins. HTTP-date forms of `Retry-After` are ignored.
    pub async fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let pause = ["backoff", "retry-after"]
            .iter()
            .filter_map(|name| pause_from_header(headers, name))
            .max();

        if let Some(pause) = pause {
            self.pause_for(pause).await;
        }
    }

    /// Block requests for at least `pause` from now.
    pub async fn pause_for(&self, pause: Duration) {
        let mut inner = self.inner.lock().await;
        let until = Instant::now() + pause;
        if inner.paused_until.map_or(true, |current| current < until) {
            inner.paused_until = Some(until);
        }
    }
}

fn pause_from_header(headers: &reqwest::header::HeaderMap, name: &str) -> Option<Duration> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[tokio::test]
    async fn test_rate_limiter_basic() {
        let limiter = RateLimiter::new(100.0); // 100/sec = 10ms interval
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // 3 requests at 100/sec should take at least ~20ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_rate_limiter_first_request_immediate() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_header_pauses_next_request() {
        let limiter = RateLimiter::new(1000.0);
        let mut headers = HeaderMap::new();
        headers.insert("backoff", HeaderValue::from_static("2"));
        limiter.update_from_headers(&headers).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_longest_pause_wins() {
        let limiter = RateLimiter::new(1000.0);
        let mut headers = HeaderMap::new();
        headers.insert("backoff", HeaderValue::from_static("1"));
        headers.insert("retry-after", HeaderValue::from_static("5"));
        limiter.update_from_headers(&headers).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unparseable_retry_after_ignored() {
        let limiter = RateLimiter::new(1000.0);
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        limiter.update_from_headers(&headers).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
