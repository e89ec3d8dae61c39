use std::sync::Arc;

use moku_core::WebClientBackend;

use crate::chromedp::ChromeClient;
use crate::client::WebClient;
use crate::error::{Result, WebClientError};
use crate::nethttp::NetHttpClient;

/// Construct the configured `WebClient` backend.
pub fn new(backend: WebClientBackend) -> Arc<dyn WebClient> {
    match backend {
        WebClientBackend::NetHttp => Arc::new(NetHttpClient::new()),
        WebClientBackend::Chromedp => Arc::new(ChromeClient::new()),
    }
}

/// Construct by the raw config string (an unrecognized
/// backend name is a validation error, not a panic).
pub fn new_from_str(name: &str) -> Result<Arc<dyn WebClient>> {
    match name {
        "nethttp" => Ok(Arc::new(NetHttpClient::new())),
        "chromedp" => Ok(Arc::new(ChromeClient::new())),
        other => Err(WebClientError::UnknownBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_name_is_an_error() {
        let err = new_from_str("bogus").unwrap_err();
        assert!(matches!(err, WebClientError::UnknownBackend(name) if name == "bogus"));
    }
}
