//! Network access for the pipeline: a reusable retry policy, a generic retry
//! combinator, and the reqwest-backed fetcher the collector and auxiliary
//! sources share.
//!
//! Redirects are followed manually inside a single attempt: every hop shares
//! the attempt's timeout and none of them consumes retry budget. A chain longer
//! than `max_redirects` fails the attempt with a non-retryable redirect error.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderValue, ACCEPT, LOCATION};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the random delay added to every backoff.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately; used where waiting has no value (tests, local files).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Exponential part of the wait after the `failed_attempt`-th failure (1-based):
    /// `2^(failed_attempt-1) * base_delay`.
    pub fn exponential_delay(&self, failed_attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    pub fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        self.exponential_delay(failed_attempt) + self.jitter()
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy's
/// attempt budget is spent. `op` receives the 1-based attempt number.
///
/// Exhaustion is reported as [`FetchError::Exhausted`] carrying `label` and the
/// number of attempts made; non-retryable errors are returned unchanged.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                warn!(url = %label, attempts = attempt, error = %err, "retries exhausted");
                return Err(FetchError::Exhausted {
                    url: label.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                let delay = policy.backoff(attempt);
                warn!(
                    url = %label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "fetch failed; backing off"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Capability to fetch and decode a JSON document. The collector depends on this
/// rather than on a concrete HTTP client.
#[async_trait]
pub trait JsonFetch: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    policy: RetryPolicy,
    timeout: Duration,
    max_redirects: u32,
}

impl HttpFetcher {
    pub fn new(policy: RetryPolicy, timeout: Duration, max_redirects: u32) -> anyhow::Result<Self> {
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(timeout)
            .user_agent(concat!("vehicle-pricing/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            policy,
            timeout,
            max_redirects,
        })
    }

    pub fn from_config(cfg: &PipelineConfig) -> anyhow::Result<Self> {
        Self::new(cfg.retry.clone(), cfg.request_timeout, cfg.max_redirects)
    }

    /// Fetch a body as text with retry, timeout and redirect handling.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        execute_with_retry(&self.policy, url, |attempt| async move {
            debug!(url = %url, attempt, "GET");
            match tokio::time::timeout(self.timeout, self.get_following_redirects(url)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    url: url.to_string(),
                    after: self.timeout,
                }),
            }
        })
        .await
    }

    async fn get_following_redirects(&self, url: &str) -> Result<String, FetchError> {
        let mut current = url.to_string();
        for hop in 0..=self.max_redirects {
            let resp = self
                .http
                .get(&current)
                .header(ACCEPT, HeaderValue::from_static("application/json, text/html;q=0.9"))
                .send()
                .await
                .map_err(|e| classify(&current, e, self.timeout))?;
            let status = resp.status();

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| FetchError::Redirect {
                        url: current.clone(),
                        reason: format!("{} without Location header", status.as_u16()),
                    })?;
                let next = Url::parse(&current)
                    .and_then(|base| base.join(location))
                    .map_err(|e| FetchError::Redirect {
                        url: current.clone(),
                        reason: format!("bad Location {location:?}: {e}"),
                    })?;
                debug!(from = %current, to = %next, hop, "following redirect");
                current = next.to_string();
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status {
                    url: current,
                    status: status.as_u16(),
                });
            }

            return resp
                .text()
                .await
                .map_err(|e| classify(&current, e, self.timeout));
        }
        Err(FetchError::Redirect {
            url: url.to_string(),
            reason: format!("more than {} redirects", self.max_redirects),
        })
    }
}

fn classify(url: &str, err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            after: timeout,
        }
    } else {
        FetchError::Connection {
            url: url.to_string(),
            source: err,
        }
    }
}

#[async_trait]
impl JsonFetch for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let body = self.fetch_text(url).await?;
        serde_json::from_str(&body).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_support::{http_response, spawn_scripted_http};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status_err(url: &str) -> FetchError {
        FetchError::Status {
            url: url.into(),
            status: 503,
        }
    }

    #[test]
    fn backoff_doubles_per_failed_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_jitter: Duration::from_millis(5),
        };
        for _ in 0..200 {
            let d = policy.backoff(1);
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(15));
        }
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            execute_with_retry(&RetryPolicy::immediate(3), "http://x/a", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(status_err("http://x/a")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(FetchError::Exhausted { url, attempts, last }) => {
                assert_eq!(url, "http://x/a");
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::Status { status: 503, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_on_a_later_attempt() {
        let result = execute_with_retry(&RetryPolicy::immediate(3), "u", |attempt| async move {
            if attempt < 2 {
                Err(status_err("u"))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn parse_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&RetryPolicy::immediate(3), "u", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::Parse {
                    url: "u".into(),
                    source: serde_json::from_str::<Value>("{").unwrap_err(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::Parse { .. })));
    }

    #[tokio::test]
    async fn http_fetcher_retries_then_follows_redirect() {
        let (base, server) = spawn_scripted_http(vec![
            http_response(500, &[], "boom"),
            http_response(302, &[("Location", "/final")], ""),
            http_response(200, &[("Content-Type", "application/json")], r#"{"ok":true}"#),
        ])
        .await;
        let fetcher =
            HttpFetcher::new(RetryPolicy::immediate(3), Duration::from_secs(5), 5).unwrap();
        let value = fetcher.fetch_json(&format!("{base}/start")).await.unwrap();
        assert_eq!(value["ok"], true);

        let paths = server.await.unwrap();
        assert_eq!(paths, vec!["/start", "/start", "/final"]);
    }

    #[tokio::test]
    async fn http_fetcher_reports_exhaustion_with_attempt_count() {
        let (base, _server) = spawn_scripted_http(vec![
            http_response(404, &[], ""),
            http_response(404, &[], ""),
            http_response(404, &[], ""),
        ])
        .await;
        let fetcher =
            HttpFetcher::new(RetryPolicy::immediate(3), Duration::from_secs(5), 5).unwrap();
        let err = fetcher
            .fetch_json(&format!("{base}/missing"))
            .await
            .unwrap_err();
        match err {
            FetchError::Exhausted { attempts, url, .. } => {
                assert_eq!(attempts, 3);
                assert!(url.ends_with("/missing"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let (base, _server) =
            spawn_scripted_http(vec![http_response(200, &[], "not json")]).await;
        let fetcher =
            HttpFetcher::new(RetryPolicy::immediate(3), Duration::from_secs(5), 5).unwrap();
        let err = fetcher.fetch_json(&format!("{base}/x")).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[tokio::test]
    async fn redirect_loops_are_cut_off() {
        let (base, _server) = spawn_scripted_http(vec![
            http_response(301, &[("Location", "/b")], ""),
            http_response(301, &[("Location", "/a")], ""),
        ])
        .await;
        let fetcher =
            HttpFetcher::new(RetryPolicy::immediate(3), Duration::from_secs(5), 1).unwrap();
        let err = fetcher.fetch_text(&format!("{base}/a")).await.unwrap_err();
        assert!(matches!(err, FetchError::Redirect { .. }));
    }

    #[tokio::test]
    async fn hung_server_times_out_each_attempt() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let fetcher =
            HttpFetcher::new(RetryPolicy::immediate(2), Duration::from_millis(150), 5).unwrap();

        let started = std::time::Instant::now();
        let err = fetcher
            .fetch_json(&format!("http://{addr}/slow"))
            .await
            .unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(300));
        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                match *last {
                    FetchError::Timeout { after, .. } => {
                        assert_eq!(after, Duration::from_millis(150))
                    }
                    other => panic!("unexpected last error {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
