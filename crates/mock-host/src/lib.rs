//! A stand-in for the per-host orchestrator the control plane talks to.
//! Exists only for this workspace's integration tests — no real device or
//! VM runs this. Grounded directly in the teacher's `mock-server` crate: a
//! spawnable `Server` returning its bound address, torn down via a oneshot
//! shutdown signal, serving a small stateful handler set plus an echo
//! fallback for anything it doesn't specifically model.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EchoResponse {
	pub method: String,
	pub path: String,
	pub headers: HashMap<String, String>,
	pub body: String,
}

#[derive(Default)]
struct HostState {
	next_id: AtomicU64,
	messages: Mutex<HashMap<String, Vec<Value>>>,
}

pub struct Server {
	address: SocketAddr,
	shutdown: tokio::sync::oneshot::Sender<()>,
	handle: tokio::task::JoinHandle<()>,
}

impl Server {
	pub async fn run() -> Self {
		Self::run_with_port(0).await
	}

	pub async fn run_with_port(port: u16) -> Self {
		let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("failed to bind");
		let address = listener.local_addr().expect("failed to get local addr");
		let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

		let state = Arc::new(HostState::default());
		let app = Router::new()
			.without_v07_checks()
			.route("/polled_connections", post(new_connection))
			.route("/polled_connections/{id}/:forward", post(forward))
			.route("/polled_connections/{id}/messages", get(messages))
			.route("/{*rest}", any(echo_handler))
			.with_state(state);

		let server = async move {
			axum::serve(listener, app)
				.with_graceful_shutdown(async move {
					let _ = shutdown_rx.await;
				})
				.await
				.expect("mock host server error");
		};
		let handle = tokio::spawn(server);

		Server {
			address,
			shutdown: shutdown_tx,
			handle,
		}
	}

	pub fn address(&self) -> SocketAddr {
		self.address
	}

	pub async fn shutdown(self) {
		let _ = self.shutdown.send(());
		let _ = self.handle.await;
	}

	pub async fn wait_for_shutdown(self) {
		let _ = self.handle.await;
	}
}

#[derive(Debug, Deserialize)]
struct NewConnectionRequest {
	#[allow(dead_code)]
	device_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct NewConnectionResponse {
	connection_id: String,
}

async fn new_connection(
	State(state): State<Arc<HostState>>,
	Json(_req): Json<NewConnectionRequest>,
) -> Json<NewConnectionResponse> {
	let id = state.next_id.fetch_add(1, Ordering::SeqCst);
	let connection_id = format!("local-{id}");
	state.messages.lock().unwrap().insert(connection_id.clone(), Vec::new());
	Json(NewConnectionResponse { connection_id })
}

async fn forward(Path(id): Path<String>, State(state): State<Arc<HostState>>, Json(payload): Json<Value>) -> StatusCode {
	state.messages.lock().unwrap().entry(id).or_default().push(payload);
	StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
	start: Option<usize>,
	count: Option<usize>,
}

async fn messages(Path(id): Path<String>, State(state): State<Arc<HostState>>, Query(q): Query<MessagesQuery>) -> Json<Value> {
	let all = state.messages.lock().unwrap().get(&id).cloned().unwrap_or_default();
	let start = q.start.unwrap_or(0).min(all.len());
	let end = q.count.map(|c| (start + c).min(all.len())).unwrap_or(all.len());
	Json(Value::Array(all[start..end].to_vec()))
}

async fn echo_handler(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<EchoResponse> {
	let headers_map: HashMap<String, String> = headers
		.iter()
		.map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
		.collect();
	let body_str = String::from_utf8(body.to_vec()).unwrap_or_else(|_| "<non-utf8 body>".to_string());
	Json(EchoResponse {
		method: method.to_string(),
		path: uri.path().to_string(),
		headers: headers_map,
		body: body_str,
	})
}
