pub mod chromedp;
pub mod client;
pub mod error;
pub mod factory;
pub mod nethttp;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use chromedp::ChromeClient;
pub use client::WebClient;
pub use error::{Result, WebClientError};
pub use nethttp::NetHttpClient;
pub use types::{Method, RequestOptions, WebRequest, WebResponse};
