use async_trait::async_trait;

use crate::error::Result;
use crate::types::{WebRequest, WebResponse};

/// The capability the fetcher and enumerator depend on. Two
/// concrete backends exist — `NetHttpClient` (fast, static) and
/// `ChromeClient` (renders JavaScript, GET only) — and nothing downstream
/// distinguishes them beyond this trait.
#[async_trait]
pub trait WebClient: Send + Sync {
    async fn do_request(&self, request: WebRequest) -> Result<WebResponse>;

    /// Convenience for a plain GET.
    async fn get(&self, url: &str) -> Result<WebResponse> {
        self.do_request(WebRequest::get(url)).await
    }

    async fn close(&self) -> Result<()>;
}
