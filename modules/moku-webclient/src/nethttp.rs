use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use moku_core::Headers;

use crate::client::WebClient;
use crate::error::{Result, WebClientError};
use crate::types::{Method, WebRequest, WebResponse};

/// Plain static HTTP backend. Fast, no JavaScript execution.
pub struct NetHttpClient {
    client: reqwest::Client,
}

impl NetHttpClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }
}

impl Default for NetHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebClient for NetHttpClient {
    async fn do_request(&self, request: WebRequest) -> Result<WebResponse> {
        if request.url.trim().is_empty() {
            return Err(WebClientError::Validation("empty URL".to_string()));
        }

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Head => reqwest::Method::HEAD,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(Duration::from_secs(request.options.timeout_secs));

        for name in request.headers.names() {
            for value in request.headers.get_all(name) {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status_code = resp.status().as_u16();

        let mut headers = Headers::new();
        for (name, value) in resp.headers().iter() {
            if let Ok(v) = value.to_str() {
                headers.push(name.as_str(), v);
            }
        }

        let body = resp.bytes().await?.to_vec();

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
    async fn rejects_empty_url() {
        let client = NetHttpClient::new();
        let err = client.do_request(WebRequest::get("")).await.unwrap_err();
        assert!(matches!(err, WebClientError::Validation(_)));
    }
}
