use chrono::{DateTime, Utc};
use moku_core::Headers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
        }
    }
}

/// Per-request tuning, independent of which backend handles it.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub timeout_secs: u64,
    /// How long the browser backend waits for no in-flight requests before
    /// treating the page as settled.
    pub network_idle_millis: u64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            network_idle_millis: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub options: RequestOptions,
}

impl WebRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            options: RequestOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebResponse {
    pub request_url: String,
    pub status_code: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}
