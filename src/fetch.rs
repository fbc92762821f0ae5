/// file: src/fetch.rs
/// description: HTTP fetcher for the source site with typed failures.
/// One GET per call, browser-like headers, redirects followed, caching
/// disabled. The interactive path fails fast; batch callers go through
/// `fetch_with_retry`, which retries network-level failures only.
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA};
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::models::AppError;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const BODY_SAMPLE_LEN: usize = 160;

pub struct Fetcher {
    client: Client,
    accept_language: String,
}

impl Fetcher {
    pub fn new(cfg: &SourceConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(&cfg.user_agent)
            .timeout(Duration::from_secs(cfg.request_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| AppError::Network {
                url: cfg.base_url.clone(),
                reason: format!("HTTP client build failed: {e}"),
                timeout: false,
            })?;

        Ok(Self {
            client,
            accept_language: cfg.accept_language.clone(),
        })
    }

    /// Fetch live HTML. Non-2xx → `HttpStatus` with a short body sample;
    /// timeout/connect errors → `Network` with the timeout flag set.
    pub async fn fetch(&self, url: &str) -> Result<String, AppError> {
        debug!(url, "Fetching source page");
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
                body_sample: body.chars().take(BODY_SAMPLE_LEN).collect(),
            });
        }

        resp.text().await.map_err(|e| classify(url, e))
    }

    /// Batch variant: up to `extra_attempts` additional tries with backoff,
    /// but only when the failure is network-level. HTTP error statuses are
    /// returned immediately — retrying a 404 just hammers the site.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        extra_attempts: u32,
    ) -> Result<String, AppError> {
        let mut backoff = Duration::from_millis(500);
        let mut attempt = 0;
        loop {
            match self.fetch(url).await {
                Ok(html) => return Ok(html),
                Err(e) if e.is_retryable() && attempt < extra_attempts => {
                    attempt += 1;
                    warn!(url, attempt, error = %e, "Fetch failed; retrying after backoff");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(4));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reachability probe for health checks: any HTTP response counts as
    /// reachable, only transport errors do not.
    pub async fn probe(&self, url: &str) -> Result<(), AppError> {
        self.client
            .head(url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify(url, e))
    }
}

fn classify(url: &str, e: reqwest::Error) -> AppError {
    AppError::Network {
        url: url.to_owned(),
        reason: e.to_string(),
        timeout: e.is_timeout(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher_for(base_url: &str) -> Fetcher {
        let cfg = SourceConfig {
            base_url: base_url.to_owned(),
            search_path: "/catalogsearch/result/?q=".into(),
            user_agent: "test-agent".into(),
            accept_language: "en-US,en;q=0.9".into(),
            request_timeout_seconds: 5,
            brand: "abm".into(),
        };
        Fetcher::new(&cfg).expect("fetcher")
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/cas9-nuclease-t3189.html")
            .with_status(200)
            .with_body("<html><h1>Cas9 Nuclease</h1></html>")
            .create_async()
            .await;

        let fetcher = fetcher_for(&server.url());
        let html = fetcher
            .fetch(&format!("{}/cas9-nuclease-t3189.html", server.url()))
            .await
            .expect("fetch");
        assert!(html.contains("Cas9 Nuclease"));
    }

    #[tokio::test]
    async fn non_2xx_becomes_http_status_with_body_sample() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing.html")
            .with_status(404)
            .with_body("page vanished")
            .create_async()
            .await;

        let fetcher = fetcher_for(&server.url());
        let err = fetcher
            .fetch(&format!("{}/missing.html", server.url()))
            .await
            .expect_err("should fail");

        match err {
            AppError::HttpStatus {
                status,
                body_sample,
                ..
            } => {
                assert_eq!(status, 404);
                assert_eq!(body_sample, "page vanished");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_statuses_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        // expect(1): a retry would trip the mock's call-count assertion.
        let m = server
            .mock("GET", "/flaky.html")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher_for(&server.url());
        let err = fetcher
            .fetch_with_retry(&format!("{}/flaky.html", server.url()), 2)
            .await
            .expect_err("should fail");
        assert!(matches!(err, AppError::HttpStatus { status: 503, .. }));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn connect_failures_classify_as_network() {
        // Nothing listens on port 9; the connect error must map to Network.
        let fetcher = fetcher_for("http://127.0.0.1:9");
        let err = fetcher
            .fetch("http://127.0.0.1:9/anything.html")
            .await
            .expect_err("should fail");
        assert!(err.is_retryable());
        assert!(matches!(err, AppError::Network { .. }));
    }

    #[tokio::test]
    async fn sends_browser_like_headers() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/check-headers.html")
            .match_header("accept-language", "en-US,en;q=0.9")
            .match_header("cache-control", "no-cache")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let fetcher = fetcher_for(&server.url());
        fetcher
            .fetch(&format!("{}/check-headers.html", server.url()))
            .await
            .expect("fetch");
        m.assert_async().await;
    }
}
