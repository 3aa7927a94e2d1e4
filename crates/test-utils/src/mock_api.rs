//! Synthetic remote table API.
//!
//! Serves the two endpoints the table client consumes:
//!
//! - `GET /api/v1/tables/{id}` returns `{"hash": <version>}`
//! - `GET /api/v1/tables/{id}/rows?selectedVariables=a,b&maxResults=N&startIndex=K`
//!   returns newline-delimited JSON arrays projected onto the selected columns
//!
//! Every request is counted per endpoint, the table version can be changed
//! between calls, and failures can be queued for either endpoint.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One table served by [`MockTableServer`].
#[derive(Debug, Clone)]
pub struct MockTable {
    pub version: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Served verbatim by the rows endpoint instead of the projected rows.
    pub raw_body: Option<String>,
}

impl MockTable {
    pub fn new(version: &str, columns: &[&str]) -> Self {
        Self {
            version: version.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            raw_body: None,
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_raw_body(mut self, body: impl Into<String>) -> Self {
        self.raw_body = Some(body.into());
        self
    }
}

struct InjectedFailure {
    /// Only requests with this `startIndex` (absent means 0) are affected.
    start_index: Option<usize>,
    status: StatusCode,
    message: String,
}

#[derive(Default)]
struct ServerState {
    tables: Mutex<HashMap<String, MockTable>>,
    version_requests: AtomicUsize,
    row_requests: AtomicUsize,
    row_failures: Mutex<VecDeque<InjectedFailure>>,
    version_failures: Mutex<VecDeque<InjectedFailure>>,
    row_queries: Mutex<Vec<HashMap<String, String>>>,
    authorizations: Mutex<Vec<String>>,
}

impl ServerState {
    fn record_auth(&self, headers: &HeaderMap) {
        if let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        {
            lock(&self.authorizations).push(value.to_string());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running synthetic table server bound to an ephemeral local port.
///
/// The server task is aborted when this value is dropped.
pub struct MockTableServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl MockTableServer {
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .route("/api/v1/tables/:id", get(table_handler))
            .route("/api/v1/tables/:id/rows", get(rows_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock table server");
        let addr = listener.local_addr().expect("mock server address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    /// Base URL to configure the client with.
    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub fn add_table(&self, id: &str, table: MockTable) {
        lock(&self.state.tables).insert(id.to_string(), table);
    }

    /// Change the version hash reported for `id`.
    pub fn set_version(&self, id: &str, version: &str) {
        if let Some(table) = lock(&self.state.tables).get_mut(id) {
            table.version = version.to_string();
        }
    }

    /// Replace the rows of `id` without touching its version.
    pub fn set_rows(&self, id: &str, rows: Vec<Vec<Value>>) {
        if let Some(table) = lock(&self.state.tables).get_mut(id) {
            table.rows = rows;
        }
    }

    /// Answer the next rows request with `status` and `message` as the body.
    pub fn fail_next_rows(&self, status: u16, message: &str) {
        self.push_failure(None, status, message);
    }

    /// Answer the next rows request for page offset `start_index` with
    /// `status` and `message`.
    pub fn fail_rows_at(&self, start_index: usize, status: u16, message: &str) {
        self.push_failure(Some(start_index), status, message);
    }

    /// Answer the next version request with `status` and `message`.
    pub fn fail_next_version(&self, status: u16, message: &str) {
        lock(&self.state.version_failures).push_back(injected(None, status, message));
    }

    fn push_failure(&self, start_index: Option<usize>, status: u16, message: &str) {
        lock(&self.state.row_failures).push_back(injected(start_index, status, message));
    }

    pub fn version_requests(&self) -> usize {
        self.state.version_requests.load(Ordering::SeqCst)
    }

    pub fn row_requests(&self) -> usize {
        self.state.row_requests.load(Ordering::SeqCst)
    }

    /// Query parameters of every rows request, in arrival order.
    pub fn row_queries(&self) -> Vec<HashMap<String, String>> {
        lock(&self.state.row_queries).clone()
    }

    /// `Authorization` header values received on either endpoint.
    pub fn authorizations(&self) -> Vec<String> {
        lock(&self.state.authorizations).clone()
    }

    pub fn reset_counters(&self) {
        self.state.version_requests.store(0, Ordering::SeqCst);
        self.state.row_requests.store(0, Ordering::SeqCst);
        lock(&self.state.row_queries).clear();
        lock(&self.state.authorizations).clear();
    }
}

impl Drop for MockTableServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A base URL on a local port with nothing listening behind it.
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    format!("http://{}/api/v1", addr)
}

fn injected(start_index: Option<usize>, status: u16, message: &str) -> InjectedFailure {
    InjectedFailure {
        start_index,
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        message: message.to_string(),
    }
}

fn take_failure(state: &ServerState, start_index: usize) -> Option<InjectedFailure> {
    let mut failures = lock(&state.row_failures);
    let position = failures
        .iter()
        .position(|f| f.start_index.map_or(true, |s| s == start_index))?;
    failures.remove(position)
}

async fn table_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.version_requests.fetch_add(1, Ordering::SeqCst);
    state.record_auth(&headers);

    let failure = lock(&state.version_failures).pop_front();
    if let Some(failure) = failure {
        return (failure.status, failure.message).into_response();
    }

    match lock(&state.tables).get(&id) {
        Some(table) => Json(json!({ "name": id, "hash": table.version })).into_response(),
        None => (StatusCode::NOT_FOUND, format!("Table {} not found", id)).into_response(),
    }
}

async fn rows_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.row_requests.fetch_add(1, Ordering::SeqCst);
    state.record_auth(&headers);
    lock(&state.row_queries).push(params.clone());

    let start_index: usize = params
        .get("startIndex")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    if let Some(failure) = take_failure(&state, start_index) {
        return (failure.status, failure.message).into_response();
    }

    let tables = lock(&state.tables);
    let Some(table) = tables.get(&id) else {
        return (StatusCode::NOT_FOUND, format!("Table {} not found", id)).into_response();
    };
    if let Some(body) = &table.raw_body {
        return body.clone().into_response();
    }

    let selected = params.get("selectedVariables").map(String::as_str).unwrap_or("");
    let mut positions = Vec::new();
    for name in selected.split(',').filter(|s| !s.is_empty()) {
        match table.columns.iter().position(|c| c.eq_ignore_ascii_case(name)) {
            Some(p) => positions.push(p),
            None => {
                return (StatusCode::BAD_REQUEST, format!("Unknown variable '{}'", name))
                    .into_response()
            }
        }
    }

    let max_results = params
        .get("maxResults")
        .and_then(|v| v.parse().ok())
        .unwrap_or(usize::MAX);
    let body = table
        .rows
        .iter()
        .skip(start_index)
        .take(max_results)
        .map(|row| {
            let cells: Vec<Value> = positions
                .iter()
                .map(|&p| row.get(p).cloned().unwrap_or(Value::Null))
                .collect();
            Value::Array(cells).to_string()
        })
        .collect::<Vec<_>>()
        .join("\n");

    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}
