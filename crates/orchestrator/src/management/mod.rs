//! Ambient management surface: `/healthz`, `/readyz`, `/metrics`, served on a
//! side listener separate from the client-facing API. Grounded in the
//! teacher's `management/readiness_server.rs` (readiness flag semantics) and
//! `management/metrics_server.rs` (`prometheus_client` text encoding,
//! Accept-header content negotiation), rebuilt on `axum::Router` to match the
//! rest of this crate's HTTP surface instead of the teacher's raw
//! `hyper_helpers::Server`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

/// Flips to `true` once the server has completed startup (config loaded,
/// backends constructed). `/readyz` reports `503` until then.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
	pub fn mark_ready(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_ready(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

#[derive(Clone)]
struct ManagementState {
	registry: Arc<Mutex<Registry>>,
	readiness: Readiness,
}

pub fn router(registry: Registry, readiness: Readiness) -> Router {
	let state = ManagementState {
		registry: Arc::new(Mutex::new(registry)),
		readiness,
	};
	Router::new()
		.route("/healthz", get(handle_healthz))
		.route("/readyz", get(handle_readyz))
		.route("/metrics", get(handle_metrics))
		.with_state(state)
}

async fn handle_healthz() -> impl IntoResponse {
	(StatusCode::OK, "ok\n")
}

async fn handle_readyz(State(state): State<ManagementState>) -> impl IntoResponse {
	if state.readiness.is_ready() {
		(StatusCode::OK, "ready\n")
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, "not ready\n")
	}
}

async fn handle_metrics(State(state): State<ManagementState>, headers: HeaderMap) -> impl IntoResponse {
	let mut buf = String::new();
	let registry = state.registry.lock().expect("registry mutex poisoned");
	if let Err(err) = encode(&mut buf, &registry) {
		return (StatusCode::INTERNAL_SERVER_ERROR, [(header::CONTENT_TYPE, "text/plain")], err.to_string()).into_response();
	}
	drop(registry);
	let content_type = content_type(&headers);
	(StatusCode::OK, [(header::CONTENT_TYPE, content_type)], buf).into_response()
}

fn content_type(headers: &HeaderMap) -> &'static str {
	let wants_openmetrics = headers
		.get_all(header::ACCEPT)
		.iter()
		.filter_map(|v| v.to_str().ok())
		.any(|v| v.to_lowercase().split(';').next() == Some("application/openmetrics-text"));
	if wants_openmetrics {
		"application/openmetrics-text;charset=utf-8;version=1.0.0"
	} else {
		"text/plain; charset=utf-8"
	}
}
