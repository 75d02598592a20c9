//! In-process HTTP server standing in for ERDDAP and Axiom Search.
//!
//! Routes are matched on the request path plus optional fragments that must
//! appear in the (percent-decoded) query string. The first matching route
//! wins, so mount specific routes before general ones.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A canned response for matching requests.
#[derive(Debug, Clone)]
pub struct MockRoute {
    pub path: String,
    pub query_contains: Vec<String>,
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl MockRoute {
    pub fn json(path: &str, body: serde_json::Value) -> Self {
        Self {
            path: path.to_string(),
            query_contains: Vec::new(),
            status: 200,
            content_type: "application/json".to_string(),
            body: body.to_string().into_bytes(),
        }
    }

    pub fn bytes(path: &str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            query_contains: Vec::new(),
            status: 200,
            content_type: content_type.to_string(),
            body,
        }
    }

    /// Only match when the decoded query contains `fragment`.
    pub fn when_query(mut self, fragment: &str) -> Self {
        self.query_contains.push(fragment.to_string());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn matches(&self, path: &str, query: &str) -> bool {
        self.path == path && self.query_contains.iter().all(|f| query.contains(f.as_str()))
    }
}

#[derive(Default)]
struct ServerState {
    routes: Mutex<Vec<MockRoute>>,
    requests: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A running mock server. The server task stops when this is dropped.
pub struct MockCatalogServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl MockCatalogServer {
    /// Bind to an ephemeral localhost port and start serving.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ServerState::default());

        let app = Router::new()
            .fallback(handle_request)
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// Base URL, e.g. `http://127.0.0.1:54321`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn mount(&self, route: MockRoute) {
        lock(&self.state.routes).push(route);
    }

    /// Every request seen so far as `path?decoded-query`.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state.requests).clone()
    }

    /// Number of requests whose path and query contain `fragment`.
    pub fn request_count(&self, fragment: &str) -> usize {
        lock(&self.state.requests)
            .iter()
            .filter(|r| r.contains(fragment))
            .count()
    }
}

impl Drop for MockCatalogServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_request(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let query = percent_decode(uri.query().unwrap_or(""));
    lock(&state.requests).push(format!("{}?{}", path, query));

    let route = lock(&state.routes)
        .iter()
        .find(|r| r.matches(&path, &query))
        .cloned();

    match route {
        Some(route) => {
            let status = StatusCode::from_u16(route.status).unwrap_or(StatusCode::OK);
            (status, [(header::CONTENT_TYPE, route.content_type)], route.body).into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("no mock route for {}", path)).into_response(),
    }
}

/// Decode `%XX` escapes; `+` is left as is since ERDDAP and Axiom use it
/// literally.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
