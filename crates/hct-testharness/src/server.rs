//! ---
//! hct_section: "15-testing-qa-runbook"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Loopback fixtures shared by unit and integration tests."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Scripted reply of a stub route.
#[derive(Debug, Clone)]
pub enum StubResponse {
    Json(Value),
    Bytes(Vec<u8>),
    Status(u16),
    /// The n-th request gets the n-th reply; the last one repeats.
    Sequence(Vec<StubResponse>),
}

/// A request observed by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub user_agent: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Request body decoded as JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct StubState {
    routes: HashMap<String, StubResponse>,
    requests: Mutex<Vec<RecordedRequest>>,
}

#[derive(Debug, Default)]
pub struct StubServerBuilder {
    routes: HashMap<String, StubResponse>,
}

impl StubServerBuilder {
    pub fn route(mut self, path: impl Into<String>, response: StubResponse) -> Self {
        self.routes.insert(path.into(), response);
        self
    }

    /// Bind `127.0.0.1:0` and serve the routes. Unknown paths answer 404.
    pub async fn spawn(self) -> Result<StubServer> {
        let state = Arc::new(StubState {
            routes: self.routes,
            requests: Mutex::new(Vec::new()),
        });
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let app = Router::new().fallback(serve).with_state(state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %err, "stub server terminated");
            }
        });
        debug!(%addr, "stub server listening");
        Ok(StubServer {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Loopback HTTP server answering with scripted responses.
#[derive(Debug)]
pub struct StubServer {
    addr: SocketAddr,
    state: Arc<StubState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub fn builder() -> StubServerBuilder {
        StubServerBuilder::default()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// Number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    pub fn last_request(&self, path: &str) -> Option<RecordedRequest> {
        self.state
            .requests
            .lock()
            .iter()
            .rev()
            .find(|request| request.path == path)
            .cloned()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.abort();
    }
}

async fn serve(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_owned();
    let query = uri
        .query()
        .map(|raw| url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    let user_agent = header_value(header::USER_AGENT);
    let authorization = header_value(header::AUTHORIZATION);

    let hit = {
        let mut requests = state.requests.lock();
        let hit = requests.iter().filter(|request| request.path == path).count();
        requests.push(RecordedRequest {
            method: method.to_string(),
            path: path.clone(),
            query,
            user_agent,
            authorization,
            body: body.to_vec(),
        });
        hit
    };

    match state.routes.get(&path) {
        Some(response) => render(response, hit),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn render(response: &StubResponse, hit: usize) -> Response {
    match response {
        StubResponse::Json(body) => Json(body.clone()).into_response(),
        StubResponse::Bytes(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes.clone(),
        )
            .into_response(),
        StubResponse::Status(code) => StatusCode::from_u16(*code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        StubResponse::Sequence(replies) => match replies.get(hit).or_else(|| replies.last()) {
            Some(reply) => render(reply, hit),
            None => StatusCode::NOT_FOUND.into_response(),
        },
    }
}
