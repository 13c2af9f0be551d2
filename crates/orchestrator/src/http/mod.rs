//! Controller (`spec.md` §4.6): the declarative route table binding every
//! other component together. Grounded directly in the teacher's
//! `a2a::handlers::App` shape — a cloneable state struct holding `Arc`
//! collaborator handles, a `router()` method building an `axum::Router`, and
//! protected handlers gated by a `FromRequestParts` auth extractor
//! (`account::AuthenticatedUser`, mirroring `OptionalFromRequestParts<Claims>`
//! there) — plus `tower_http::trace::TraceLayer` for the ambient
//! method/URI/remote-address request log (`spec.md` §4.6).

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::info_span;

use crate::account::{AccountManager, AuthenticatedUser};
use crate::config::{OperationsConfig, WebRtcConfig};
use crate::error::Error;
use crate::instance::{self, InstanceManager};
use crate::signaling::{NewConnectionRequest, NewConnectionResponse, SignalingRelay};
use crate::types::{CreateHostRequest, InfraConfig, ListHostsRequest, ListHostsResponse, Operation};

/// The one device-file path served locally instead of proxied: the signaling
/// bootstrap script every device loads to talk WebRTC to the orchestrator.
const DEVICE_BOOTSTRAP_FILE: &str = "js/server_connector.js";

const FORWARDABLE_RESOURCES: [&str; 4] = ["devices", "operations", "cvds", "userartifacts"];

#[derive(Clone)]
pub struct AppState {
	pub instance_manager: InstanceManager,
	pub account_manager: Arc<AccountManager>,
	pub operations: OperationsConfig,
	pub webrtc: WebRtcConfig,
	pub device_files_dir: Option<PathBuf>,
}

impl AsRef<AccountManager> for AppState {
	fn as_ref(&self) -> &AccountManager {
		&self.account_manager
	}
}

impl AppState {
	async fn signaling_relay(&self, zone: &str, host: &str) -> Result<SignalingRelay, Error> {
		let client = self.instance_manager.get_host_client(zone, host).await?;
		Ok(SignalingRelay::new(
			client,
			self.webrtc.ice_servers.clone(),
			self.device_files_dir.clone(),
		))
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.without_v07_checks()
		.route("/", get(root))
		.route("/v1/zones/{zone}/hosts", post(create_host).get(list_hosts))
		.route("/v1/zones/{zone}/hosts/{host}", delete(delete_host))
		.route("/v1/zones/{zone}/operations/{operation}/:wait", post(wait_operation))
		.route("/v1/zones/{zone}/hosts/{host}/connections", post(new_connection))
		.route(
			"/v1/zones/{zone}/hosts/{host}/connections/{conn_id}/:forward",
			post(forward_connection),
		)
		.route(
			"/v1/zones/{zone}/hosts/{host}/connections/{conn_id}/messages",
			get(connection_messages),
		)
		.route("/v1/zones/{zone}/hosts/{host}/infra_config", get(infra_config))
		.route("/v1/zones/{zone}/hosts/{host}/{*rest}", any(resource_forward))
		.layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
			let remote = req
				.extensions()
				.get::<ConnectInfo<std::net::SocketAddr>>()
				.map(|c| c.0.to_string())
				.unwrap_or_else(|| "-".to_string());
			info_span!("request", method = %req.method(), uri = %req.uri(), remote)
		}))
		.with_state(state)
}

async fn root() -> impl IntoResponse {
	(StatusCode::OK, "cloudorch\n")
}

fn require_zone_and_host(zone: &str, host: &str) -> Result<(), Error> {
	if zone.is_empty() || host.is_empty() {
		return Err(Error::BadRequest("missing zone or host in request path".into()));
	}
	Ok(())
}

async fn create_host(
	Path(zone): Path<String>,
	AuthenticatedUser(user): AuthenticatedUser,
	State(state): State<AppState>,
	Json(req): Json<CreateHostRequest>,
) -> Result<Json<Operation>, Error> {
	if state.operations.create_host_disabled {
		return Err(Error::MethodNotAllowed("CreateHost is disabled".into()));
	}
	let op = state.instance_manager.create_host(&zone, &user, req).await?;
	Ok(Json(op))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListHostsQuery {
	#[serde(default)]
	max_results: Option<String>,
	#[serde(default)]
	page_token: Option<String>,
}

async fn list_hosts(
	Path(zone): Path<String>,
	AuthenticatedUser(user): AuthenticatedUser,
	State(state): State<AppState>,
	Query(q): Query<ListHostsQuery>,
) -> Result<Json<ListHostsResponse>, Error> {
	let max_results = match q.max_results {
		Some(raw) => instance::validate_max_results(&raw)?,
		None => 0,
	};
	let req = ListHostsRequest {
		max_results,
		page_token: q.page_token.unwrap_or_default(),
	};
	let resp = state.instance_manager.list_hosts(&zone, &user, req).await?;
	Ok(Json(resp))
}

async fn delete_host(
	Path((zone, host)): Path<(String, String)>,
	AuthenticatedUser(user): AuthenticatedUser,
	State(state): State<AppState>,
) -> Result<Json<Operation>, Error> {
	require_zone_and_host(&zone, &host)?;
	let op = state.instance_manager.delete_host(&zone, &user, &host).await?;
	Ok(Json(op))
}

async fn wait_operation(
	Path((zone, operation)): Path<(String, String)>,
	AuthenticatedUser(_user): AuthenticatedUser,
	State(state): State<AppState>,
) -> Result<Json<Operation>, Error> {
	let op = state
		.instance_manager
		.wait_operation(&zone, &operation, state.operations.wait_max)
		.await?;
	Ok(Json(op))
}

async fn new_connection(
	Path((zone, host)): Path<(String, String)>,
	AuthenticatedUser(_user): AuthenticatedUser,
	State(state): State<AppState>,
	Json(req): Json<NewConnectionRequest>,
) -> Result<Json<NewConnectionResponse>, Error> {
	require_zone_and_host(&zone, &host)?;
	let relay = state.signaling_relay(&zone, &host).await?;
	let resp = relay.new_connection(&req.device_id).await?;
	Ok(Json(resp))
}

async fn forward_connection(
	Path((zone, host, conn_id)): Path<(String, String, String)>,
	AuthenticatedUser(_user): AuthenticatedUser,
	State(state): State<AppState>,
	Json(payload): Json<Value>,
) -> Result<StatusCode, Error> {
	require_zone_and_host(&zone, &host)?;
	let relay = state.signaling_relay(&zone, &host).await?;
	relay.forward(&conn_id, payload).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
	start: Option<String>,
	count: Option<String>,
}

async fn connection_messages(
	Path((zone, host, conn_id)): Path<(String, String, String)>,
	AuthenticatedUser(_user): AuthenticatedUser,
	State(state): State<AppState>,
	Query(q): Query<MessagesQuery>,
) -> Result<Json<Value>, Error> {
	require_zone_and_host(&zone, &host)?;
	let relay = state.signaling_relay(&zone, &host).await?;
	let msgs = relay.messages(&conn_id, q.start.as_deref(), q.count.as_deref()).await?;
	Ok(Json(msgs))
}

/// Public: `InfraConfig()` served verbatim, no auth required.
async fn infra_config(
	Path((zone, host)): Path<(String, String)>,
	State(state): State<AppState>,
) -> Result<Json<InfraConfig>, Error> {
	require_zone_and_host(&zone, &host)?;
	let relay = state.signaling_relay(&zone, &host).await?;
	Ok(Json(relay.infra_config()))
}

/// Handles both the one intercepted device-files path and the generic
/// `devices|operations|cvds|userartifacts` forwarder, since the wire
/// behavior differs only in where the bytes for one specific path come from
/// (`spec.md` §4.5 `ServeDeviceFiles`).
async fn resource_forward(
	Path((zone, host, rest)): Path<(String, String, String)>,
	AuthenticatedUser(_user): AuthenticatedUser,
	State(state): State<AppState>,
	req: Request,
) -> Result<Response, Error> {
	require_zone_and_host(&zone, &host)?;
	let resource = rest.split('/').next().unwrap_or_default();
	if !FORWARDABLE_RESOURCES.contains(&resource) {
		return Err(Error::NotFound(format!("unknown resource {resource}")));
	}

	if resource == "devices" {
		if let Some(file_path) = rest.strip_prefix("devices/").and_then(|r| r.split_once("/files/")).map(|(_, f)| f) {
			if file_path == DEVICE_BOOTSTRAP_FILE {
				let relay = state.signaling_relay(&zone, &host).await?;
				let bytes = relay.serve_device_file(file_path).await?;
				return Ok((StatusCode::OK, [(header::CONTENT_TYPE, "application/javascript")], bytes).into_response());
			}
		}
	}

	let client = state.instance_manager.get_host_client(&zone, &host).await?;
	let mut target = rest;
	if let Some(query) = req.uri().query() {
		target.push('?');
		target.push_str(query);
	}
	let resp = client.reverse_proxy().forward(&target, req).await?;
	Ok(resp)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{AccountManagerConfig, InstanceManagerConfig, LocalBackendConfig, LocalHost};
	use axum::body::{Body, to_bytes};
	use serde_json::json;

	fn state() -> AppState {
		let instance_manager = InstanceManager::new(&InstanceManagerConfig::Local(LocalBackendConfig {
			hosts: vec![LocalHost {
				name: "cf-1".into(),
				zone: "us-central1-a".into(),
				internal_addr: "http://127.0.0.1:6520".into(),
			}],
		}));
		AppState {
			instance_manager,
			account_manager: Arc::new(AccountManager::new(&AccountManagerConfig::UnixDev)),
			operations: OperationsConfig {
				create_host_disabled: false,
				wait_max: std::time::Duration::from_secs(1),
			},
			webrtc: WebRtcConfig::default(),
			device_files_dir: None,
		}
	}

	async fn send(app: Router, req: axum::http::Request<Body>) -> axum::http::Response<Body> {
		use tower::ServiceExt;
		app.oneshot(req).await.unwrap()
	}

	#[tokio::test]
	async fn create_host_disabled_returns_405() {
		let mut s = state();
		s.operations.create_host_disabled = true;
		let app = router(s);
		let req = axum::http::Request::builder()
			.method("POST")
			.uri("/v1/zones/us-central1-a/hosts")
			.header("content-type", "application/json")
			.body(Body::from(json!({}).to_string()))
			.unwrap();
		let resp = send(app, req).await;
		assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
	}

	#[tokio::test]
	async fn create_host_then_list_round_trips() {
		let app = router(state());
		let req = axum::http::Request::builder()
			.method("POST")
			.uri("/v1/zones/us-central1-a/hosts")
			.header("content-type", "application/json")
			.body(Body::from(json!({"hostInstance": {}}).to_string()))
			.unwrap();
		let resp = send(app.clone(), req).await;
		assert_eq!(resp.status(), StatusCode::OK);

		let req = axum::http::Request::builder()
			.method("GET")
			.uri("/v1/zones/us-central1-a/hosts")
			.body(Body::empty())
			.unwrap();
		let resp = send(app, req).await;
		assert_eq!(resp.status(), StatusCode::OK);
		let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
		let parsed: ListHostsResponse = serde_json::from_slice(&body).unwrap();
		assert_eq!(parsed.items.len(), 1);
	}

	#[tokio::test]
	async fn negative_max_results_is_bad_request() {
		let app = router(state());
		let req = axum::http::Request::builder()
			.method("GET")
			.uri("/v1/zones/us-central1-a/hosts?maxResults=-1")
			.body(Body::empty())
			.unwrap();
		let resp = send(app, req).await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn infra_config_is_public_and_serves_configured_ice_servers() {
		let mut s = state();
		s.webrtc.ice_servers = vec![crate::types::IceServer {
			urls: vec!["stun:stun.example.com".into()],
		}];
		let app = router(s);
		let req = axum::http::Request::builder()
			.method("GET")
			.uri("/v1/zones/us-central1-a/hosts/cf-1/infra_config")
			.body(Body::empty())
			.unwrap();
		let resp = send(app, req).await;
		assert_eq!(resp.status(), StatusCode::OK);
		let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
		let parsed: InfraConfig = serde_json::from_slice(&body).unwrap();
		assert_eq!(parsed.ice_servers.len(), 1);
	}

	#[tokio::test]
	async fn unknown_resource_is_not_found() {
		let app = router(state());
		let req = axum::http::Request::builder()
			.method("GET")
			.uri("/v1/zones/us-central1-a/hosts/cf-1/bogus/path")
			.body(Body::empty())
			.unwrap();
		let resp = send(app, req).await;
		assert_eq!(resp.status(), StatusCode::NOT_FOUND);
	}

	/// A directory under `env::temp_dir()` holding `js/server_connector.js`,
	/// removed on drop. Exercises the device-bootstrap-file intercept with a
	/// real `device_files_dir` rather than the `None` every other test here
	/// uses, since `AppState::device_files_dir` is now reachable from
	/// `Config` instead of always hardcoded to `None`.
	struct ScratchDeviceFilesDir(std::path::PathBuf);

	impl ScratchDeviceFilesDir {
		fn with_bootstrap_script(contents: &str) -> Self {
			let dir = std::env::temp_dir().join(format!("cloudorch-http-test-{}", std::process::id()));
			std::fs::create_dir_all(dir.join("js")).unwrap();
			std::fs::write(dir.join(DEVICE_BOOTSTRAP_FILE), contents).unwrap();
			ScratchDeviceFilesDir(dir)
		}
	}

	impl Drop for ScratchDeviceFilesDir {
		fn drop(&mut self) {
			let _ = std::fs::remove_dir_all(&self.0);
		}
	}

	#[tokio::test]
	async fn device_bootstrap_file_is_served_locally_when_configured() {
		let scratch = ScratchDeviceFilesDir::with_bootstrap_script("console.log('bootstrap');");
		let mut s = state();
		s.device_files_dir = Some(scratch.0.clone());
		let app = router(s);

		let req = axum::http::Request::builder()
			.method("GET")
			.uri("/v1/zones/us-central1-a/hosts/cf-1/devices/dev-1/files/js/server_connector.js")
			.body(Body::empty())
			.unwrap();
		let resp = send(app, req).await;
		assert_eq!(resp.status(), StatusCode::OK);
		assert_eq!(
			resp.headers().get(header::CONTENT_TYPE).unwrap(),
			"application/javascript"
		);
		let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
		assert_eq!(&body[..], b"console.log('bootstrap');");
	}
}
