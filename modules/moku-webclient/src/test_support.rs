//! A minimal in-process HTTP server for exercising `WebClient` backends and
//! the fetcher/orchestrator without hitting real origins, gated behind the
//! `test-support` cargo feature.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

#[derive(Clone, Default)]
struct ServerState {
    routes: Arc<Mutex<std::collections::HashMap<String, StubResponse>>>,
}

#[derive(Clone)]
pub struct StubResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StubResponse {
    pub fn ok_html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: body.into(),
        }
    }
}

/// A single-process test server that serves canned responses per path.
pub struct TestServer {
    pub addr: SocketAddr,
    state: ServerState,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = ServerState::default();
        let app = Router::new()
            .route("/*path", get(handler))
            .route("/", get(handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown: tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn set(&self, path: &str, response: StubResponse) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }

    pub fn stop(self) {
        let _ = self.shutdown.send(());
    }
}

async fn handler(
    State(state): State<ServerState>,
    uri: axum::http::Uri,
) -> impl IntoResponse {
    let path = uri.path().to_string();
    let routes = state.routes.lock().unwrap();
    match routes.get(&path) {
        Some(stub) => {
            let mut headers = HeaderMap::new();
            for (name, value) in &stub.headers {
                if let (Ok(name), Ok(value)) = (
                    axum::http::HeaderName::try_from(name.as_str()),
                    axum::http::HeaderValue::from_str(value),
                ) {
                    headers.insert(name, value);
                }
            }
            (
                StatusCode::from_u16(stub.status).unwrap_or(StatusCode::OK),
                headers,
                stub.body.clone(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_configured_stub_response() {
        let server = TestServer::start().await;
        server.set("/page", StubResponse::ok_html("<html></html>"));
        let resp = reqwest::get(server.url("/page")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body = resp.text().await.unwrap();
        assert_eq!(body, "<html></html>");
        server.stop();
    }
}
