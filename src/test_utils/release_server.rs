//! Scripted loopback HTTP server.

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const DEFAULT_ROUTE: &str = "*";
const BODY_PIECE: usize = 4 * 1024;

/// One canned HTTP response.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    piece_delay: Option<Duration>,
}

impl ScriptedResponse {
    /// Empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            piece_delay: None,
        }
    }

    /// JSON body with `status`.
    pub fn json(status: u16, body: &str) -> Self {
        Self::status(status)
            .with_header("content-type", "application/json")
            .with_body(body.as_bytes().to_vec())
    }

    /// `200 OK` with a binary body.
    pub fn bytes(body: Vec<u8>) -> Self {
        Self::status(200)
            .with_header("content-type", "application/octet-stream")
            .with_body(body)
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Send the body in 4 KiB pieces, pausing between them.
    #[must_use]
    pub fn with_piece_delay(mut self, delay: Duration) -> Self {
        self.piece_delay = Some(delay);
        self
    }
}

impl IntoResponse for ScriptedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let length = self.body.len();

        let body = match self.piece_delay {
            Some(delay) => {
                let pieces: Vec<Vec<u8>> = self.body.chunks(BODY_PIECE).map(<[u8]>::to_vec).collect();
                let stream = futures::stream::iter(pieces.into_iter().enumerate()).then(
                    move |(index, piece)| async move {
                        if index > 0 {
                            tokio::time::sleep(delay).await;
                        }
                        Ok::<_, std::io::Error>(piece)
                    },
                );
                Body::from_stream(stream)
            }
            None => Body::from(self.body),
        };

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}

#[derive(Clone, Default)]
struct Scripts {
    routes: Arc<Mutex<HashMap<String, VecDeque<ScriptedResponse>>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    total: Arc<AtomicUsize>,
}

impl Scripts {
    fn next_for(&self, path: &str) -> ScriptedResponse {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.hits.lock().unwrap().entry(path.to_string()).or_insert(0) += 1;

        let mut routes = self.routes.lock().unwrap();
        let queue = if routes.contains_key(path) {
            routes.get_mut(path)
        } else {
            routes.get_mut(DEFAULT_ROUTE)
        };
        let next = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        next.unwrap_or_else(|| ScriptedResponse::status(404))
    }
}

async fn answer(State(scripts): State<Scripts>, uri: Uri) -> ScriptedResponse {
    scripts.next_for(uri.path())
}

/// Loopback axum server answering requests from per-path scripts.
///
/// Each path serves its queue in order; the last response of a queue is
/// repeated once the others are used up. Paths without a queue fall back to the
/// script passed to [`ReleaseServer::start`], and to `404` without one.
pub struct ReleaseServer {
    addr: SocketAddr,
    scripts: Scripts,
    task: JoinHandle<()>,
}

impl ReleaseServer {
    /// Start serving `default_script` for every path.
    pub async fn start(default_script: Vec<ScriptedResponse>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");

        let scripts = Scripts::default();
        if !default_script.is_empty() {
            scripts
                .routes
                .lock()
                .unwrap()
                .insert(DEFAULT_ROUTE.to_string(), default_script.into());
        }

        let app = Router::new().fallback(answer).with_state(scripts.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            scripts,
            task,
        }
    }

    /// Script the responses for `path`.
    pub fn route(&self, path: &str, script: Vec<ScriptedResponse>) {
        self.scripts
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), script.into());
    }

    /// Absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests received on every path.
    pub fn request_count(&self) -> usize {
        self.scripts.total.load(Ordering::SeqCst)
    }

    /// Requests received on `path`.
    pub fn requests_for(&self, path: &str) -> usize {
        self.scripts.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Drop for ReleaseServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A "latest release" JSON document with the given assets (`(name, url)`).
pub fn release_json(tag: &str, notes: &str, assets: &[(&str, &str)]) -> String {
    let assets: Vec<_> = assets
        .iter()
        .map(|(name, url)| {
            serde_json::json!({
                "name": name,
                "browser_download_url": url,
            })
        })
        .collect();

    serde_json::json!({
        "tag_name": tag,
        "name": format!("Release {tag}"),
        "body": notes,
        "assets": assets,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripts_advance_and_repeat_last() {
        let server = ReleaseServer::start(vec![]).await;
        server.route(
            "/latest",
            vec![ScriptedResponse::status(503), ScriptedResponse::json(200, "{}")],
        );
        let client = reqwest::Client::new();

        let statuses = [
            client.get(server.url("/latest")).send().await.unwrap().status(),
            client.get(server.url("/latest")).send().await.unwrap().status(),
            client.get(server.url("/latest")).send().await.unwrap().status(),
        ];
        assert_eq!(statuses.map(|s| s.as_u16()), [503, 200, 200]);

        let missing = client.get(server.url("/other")).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 404);
        assert_eq!(server.requests_for("/latest"), 3);
        assert_eq!(server.request_count(), 4);
    }

    #[tokio::test]
    async fn test_paced_body_arrives_whole() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let server = ReleaseServer::start(vec![
            ScriptedResponse::bytes(payload.clone()).with_piece_delay(Duration::from_millis(1)),
        ])
        .await;

        let response = reqwest::get(server.url("/pkg")).await.unwrap();
        assert_eq!(response.content_length(), Some(payload.len() as u64));
        assert_eq!(response.bytes().await.unwrap().to_vec(), payload);
    }
}
