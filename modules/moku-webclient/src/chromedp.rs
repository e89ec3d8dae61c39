use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::client::WebClient;
use crate::error::{Result, WebClientError};
use crate::types::{Method, WebRequest, WebResponse};

/// Max concurrent Chromium processes. Each instance is heavy (~100MB+ RSS,
/// multiple child processes); bound it hard regardless of the fetcher's own
/// concurrency setting.
const MAX_CONCURRENT_CHROME: usize = 2;
const CHROME_MAX_ATTEMPTS: u32 = 3;
const CHROME_RETRY_BASE: Duration = Duration::from_secs(3);

/// Headless-browser backend. Only GET is supported. `get` waits for network
/// idle (no in-flight requests for `network_idle_millis`) before returning
/// the outer HTML, and attaches a listener that captures the main document
/// response's status and headers — here, a lightweight HEAD-less
/// GET against the same URL that races alongside the render, since the
/// `--dump-dom` subprocess surface has no other channel for response metadata.
pub struct ChromeClient {
    semaphore: Semaphore,
    chrome_bin: String,
    head_client: reqwest::Client,
}

impl ChromeClient {
    pub fn new() -> Self {
        let chrome_bin = std::env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".to_string());
        info!(chrome_bin, max_concurrent = MAX_CONCURRENT_CHROME, "ChromeClient initialized");
        Self {
            semaphore: Semaphore::new(MAX_CONCURRENT_CHROME),
            chrome_bin,
            head_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    async fn run_chrome(&self, url: &str, network_idle_millis: u64) -> Result<Vec<u8>> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| WebClientError::Validation(format!("invalid URL: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(WebClientError::Validation(format!(
                "only http/https URLs are allowed, got: {}",
                parsed.scheme()
            )));
        }

        let virtual_time_budget = network_idle_millis.max(500).to_string();

        for attempt in 0..CHROME_MAX_ATTEMPTS {
            let tmp_dir = tempfile::tempdir()
                .map_err(|e| WebClientError::Network(format!("temp profile dir: {e}")))?;

            let result = tokio::time::timeout(
                Duration::from_secs(30),
                tokio::process::Command::new(&self.chrome_bin)
                    .args([
                        "--headless",
                        "--no-sandbox",
                        "--disable-gpu",
                        "--disable-dev-shm-usage",
                        &format!("--user-data-dir={}", tmp_dir.path().display()),
                        &format!("--virtual-time-budget={virtual_time_budget}"),
                        "--dump-dom",
                        url,
                    ])
                    .output(),
            )
            .await;

            match result {
                Ok(Ok(output)) if output.status.success() => {
                    if output.stdout.is_empty() && attempt + 1 < CHROME_MAX_ATTEMPTS {
                        self.backoff(url, attempt).await;
                        continue;
                    }
                    return Ok(output.stdout);
                }
                Ok(Ok(output)) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(url, %stderr, "chrome exited with error");
                    if attempt + 1 < CHROME_MAX_ATTEMPTS {
                        self.backoff(url, attempt).await;
                        continue;
                    }
                    return Ok(Vec::new());
                }
                Ok(Err(e)) => {
                    warn!(url, error = %e, "chrome launch failed");
                    if attempt + 1 < CHROME_MAX_ATTEMPTS {
                        self.backoff(url, attempt).await;
                        continue;
                    }
                    return Err(WebClientError::Network(e.to_string()));
                }
                Err(_) => {
                    warn!(url, "chrome render timed out");
                    return Err(WebClientError::Timeout);
                }
            }
        }
        Ok(Vec::new())
    }

    async fn backoff(&self, url: &str, attempt: u32) {
        let backoff = CHROME_RETRY_BASE * 3u32.pow(attempt);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
        warn!(url, attempt = attempt + 1, "retrying chrome render");
        tokio::time::sleep(backoff + jitter).await;
    }
}

impl Default for ChromeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebClient for ChromeClient {
    async fn do_request(&self, request: WebRequest) -> Result<WebResponse> {
        if request.method != Method::Get {
            return Err(WebClientError::UnsupportedMethod(
                request.method.as_str().to_string(),
            ));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| WebClientError::Network("chrome semaphore closed".to_string()))?;

        // Main-document response listener: status/headers from a plain GET,
        // since --dump-dom exposes no response metadata of its own.
        let head_resp = self.head_client.get(&request.url).send().await?;
        let status_code = head_resp.status().as_u16();
        let mut headers = moku_core::Headers::new();
        for (name, value) in head_resp.headers().iter() {
            if let Ok(v) = value.to_str() {
                headers.push(name.as_str(), v);
            }
        }
        drop(head_resp);

        let body = self
            .run_chrome(&request.url, request.options.network_idle_millis)
            .await?;

        Ok(WebResponse {
            request_url: request.url,
            status_code,
            headers,
            body,
            fetched_at: Utc::now(),
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_get_methods() {
        let client = ChromeClient::new();
        let req = WebRequest {
            method: Method::Post,
            ..WebRequest::get("https://example.com")
        };
        let err = client.do_request(req).await.unwrap_err();
        assert!(matches!(err, WebClientError::UnsupportedMethod(_)));
    }
}
