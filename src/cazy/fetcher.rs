use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use scraper::Html;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cazy::constants;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to fetch {url} after {attempts} attempts: {last_error}")]
    FetchFailed { url: String, attempts: u32, last_error: String },

    #[error("Crawl cancelled before fetching {url}")]
    Cancelled { url: String },

    #[error("{url} is not in the page library ({path})")]
    NotArchived { url: String, path: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::FetchFailed { url, .. }
            | FetchError::Cancelled { url }
            | FetchError::NotArchived { url, .. } => url,
        }
    }
}

/// Issues a single GET and returns the body of a 2xx response.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<String, FetchError>;

    /// Local transports are never throttled.
    fn is_local(&self) -> bool {
        false
    }
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(constants::USER_AGENT)
            .build()?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let transport_error = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().map_err(transport_error)
    }
}

/// Transport-layer failures and non-2xx responses are worth another attempt.
pub fn is_transient(error: &FetchError) -> bool {
    matches!(error, FetchError::Transport { .. } | FetchError::Status { .. })
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    classify: fn(&FetchError) -> bool,
}

impl RetryPolicy {
    /// `retries` additional attempts after the first one.
    pub fn new(retries: u32) -> Self {
        RetryPolicy {
            max_attempts: retries.saturating_add(1),
            classify: is_transient,
        }
    }

    pub fn with_classifier(mut self, classify: fn(&FetchError) -> bool) -> Self {
        self.classify = classify;
        self
    }

    pub fn is_retryable(&self, error: &FetchError) -> bool {
        (self.classify)(error)
    }

    pub fn should_retry(&self, attempt: u32, error: &FetchError) -> bool {
        attempt < self.max_attempts && self.is_retryable(error)
    }
}

/// Spaces out requests from every thread sharing it.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn unlimited() -> Self {
        RateLimiter { interval: None, last: Mutex::new(None) }
    }

    pub fn every(interval: Duration) -> Self {
        RateLimiter { interval: Some(interval), last: Mutex::new(None) }
    }

    pub fn is_limited(&self) -> bool {
        self.interval.is_some()
    }

    /// Blocks until the next request may be issued.
    pub fn wait(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

/// Cooperative cancellation checked before each fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fetched page body.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

pub struct Fetcher<T: Transport> {
    transport: T,
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    cancel: CancelToken,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy, limiter: Arc<RateLimiter>, cancel: CancelToken) -> Self {
        Fetcher { transport, policy, limiter, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let mut attempt = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }

            attempt += 1;
            self.limiter.wait();
            debug!(url, attempt, "Fetching page");

            let error = match self.transport.get(url) {
                Ok(body) => return Ok(Page { url: url.to_string(), body }),
                Err(error) => error,
            };

            if self.policy.should_retry(attempt, &error) {
                warn!(url, attempt, max_attempts = self.policy.max_attempts, %error, "Fetch attempt failed, retrying");
                continue;
            }

            if !self.policy.is_retryable(&error) {
                return Err(error);
            }

            return Err(FetchError::FetchFailed {
                url: url.to_string(),
                attempts: attempt,
                last_error: error.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        status: Option<u16>,
    }

    impl Transport for Flaky {
        fn get(&self, url: &str) -> Result<String, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(match self.status {
                    Some(status) => FetchError::Status { url: url.to_string(), status },
                    None => FetchError::Transport { url: url.to_string(), message: "connection reset".to_string() },
                });
            }
            Ok("<html></html>".to_string())
        }
    }

    fn fetcher(failures: u32, retries: u32) -> Fetcher<Flaky> {
        Fetcher::new(
            Flaky { failures, calls: AtomicU32::new(0), status: None },
            RetryPolicy::new(retries),
            Arc::new(RateLimiter::unlimited()),
            CancelToken::new(),
        )
    }

    #[test]
    fn recovers_within_retry_budget() {
        let fetcher = fetcher(2, 2);
        let page = fetcher.fetch("http://example.org/a.html").unwrap();
        assert_eq!(page.url, "http://example.org/a.html");
        assert_eq!(fetcher.transport.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn gives_up_after_retries() {
        let fetcher = fetcher(10, 2);
        let err = fetcher.fetch("http://example.org/a.html").unwrap_err();
        assert!(matches!(err, FetchError::FetchFailed { attempts: 3, .. }));
        assert_eq!(fetcher.transport.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_success_status_is_retried() {
        let fetcher = Fetcher::new(
            Flaky { failures: 1, calls: AtomicU32::new(0), status: Some(503) },
            RetryPolicy::new(1),
            Arc::new(RateLimiter::unlimited()),
            CancelToken::new(),
        );
        assert!(fetcher.fetch("http://example.org/a.html").is_ok());
    }

    #[test]
    fn classifier_can_refuse_retries() {
        let fetcher = Fetcher::new(
            Flaky { failures: 5, calls: AtomicU32::new(0), status: Some(404) },
            RetryPolicy::new(3).with_classifier(|_| false),
            Arc::new(RateLimiter::unlimited()),
            CancelToken::new(),
        );
        let err = fetcher.fetch("http://example.org/a.html").unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(fetcher.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_fetch_never_hits_transport() {
        let fetcher = fetcher(0, 0);
        fetcher.cancel_token().cancel();
        let err = fetcher.fetch("http://example.org/a.html").unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
        assert_eq!(fetcher.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::every(Duration::from_millis(40));
        let start = Instant::now();
        limiter.wait();
        limiter.wait();
        limiter.wait();
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert!(limiter.is_limited());
        assert!(!RateLimiter::unlimited().is_limited());
    }
}
