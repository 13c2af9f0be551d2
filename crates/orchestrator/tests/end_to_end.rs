//! Exercises the literal end-to-end scenarios from `spec.md` §8 through the
//! full `axum::Router` built by [`cloudorch::http::router`], wired to a real
//! [`mock_host::Server`] standing in for a host orchestrator and a
//! `wiremock` server standing in for the GCE Compute API.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cloudorch::account::AccountManager;
use cloudorch::config::{
	AccountManagerConfig, GceConfig, InstanceManagerConfig, LocalBackendConfig, LocalHost, OperationsConfig,
	WebRtcConfig,
};
use cloudorch::http::{self, AppState};
use cloudorch::instance::InstanceManager;
use cloudorch::types::{ListHostsResponse, Operation};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_state(instance_manager: InstanceManager) -> AppState {
	state_with_account_manager(instance_manager, AccountManagerConfig::UnixDev)
}

fn state_with_account_manager(instance_manager: InstanceManager, account_manager: AccountManagerConfig) -> AppState {
	AppState {
		instance_manager,
		account_manager: Arc::new(AccountManager::new(&account_manager)),
		operations: OperationsConfig {
			create_host_disabled: false,
			wait_max: std::time::Duration::from_secs(2),
		},
		webrtc: WebRtcConfig::default(),
		device_files_dir: None,
	}
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
	let resp = app.oneshot(req).await.unwrap();
	let status = resp.status();
	let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
	let value = if body.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&body).unwrap_or(Value::Null)
	};
	(status, value)
}

/// Scenario 1: create-host request shape reaching the GCE backend, and
/// scenario 2: explicit `name` is rejected before any backend call.
#[tokio::test]
async fn scenario_create_host_shapes_insert_request_and_rejects_explicit_name() {
	let compute = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/compute/v1/projects/my-project/zones/us-central1-a/instances"))
		.and(body_partial_json(json!({
			"machineType": "zones/us-central1-a/machineTypes/n1-standard-1",
			"labels": {"created_by": "dev", "cf-created_by": "dev"},
			"advancedMachineFeatures": {"enableNestedVirtualization": true},
		})))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "op-1", "status": "PENDING"})))
		.mount(&compute)
		.await;

	let gce_config = InstanceManagerConfig::Gce(GceConfig {
		project_id: "my-project".into(),
		default_zone: "us-central1-a".into(),
		source_image: "projects/cf/global/images/cuttlefish".into(),
		network_interface: "nic0".into(),
		poll_interval: std::time::Duration::from_millis(1),
	});
	let instance_manager = cloudorch_test_support::instance_manager_with_base_url(&gce_config, &compute.uri());
	let app = http::router(base_state(instance_manager));

	let req = Request::builder()
		.method("POST")
		.uri("/v1/zones/us-central1-a/hosts")
		.header("content-type", "application/json")
		.body(Body::from(json!({"host_instance": {"gcp": {"machine_type": "n1-standard-1"}}}).to_string()))
		.unwrap();
	let (status, body) = call(app.clone(), req).await;
	assert_eq!(status, StatusCode::OK);
	let op: Operation = serde_json::from_value(body).unwrap();
	assert_eq!(op.name, "op-1");
	assert!(!op.done);

	let req = Request::builder()
		.method("POST")
		.uri("/v1/zones/us-central1-a/hosts")
		.header("content-type", "application/json")
		.body(Body::from(
			json!({"host_instance": {"name": "foo", "gcp": {"machine_type": "n1-standard-1"}}}).to_string(),
		))
		.unwrap();
	let (status, body) = call(app, req).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], "invalid CreateHostRequest");
}

/// Scenario 3: waiting on a DONE `insert` operation resolves to the instance.
#[tokio::test]
async fn scenario_wait_on_done_insert_resolves_instance() {
	let compute = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/compute/v1/projects/my-project/zones/us-central1-a/operations/op-42"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"name": "op-42",
			"status": "DONE",
			"operationType": "insert",
			"targetLink": "https://compute.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a/instances/cf-abc",
		})))
		.mount(&compute)
		.await;
	Mock::given(method("GET"))
		.and(path("/compute/v1/projects/my-project/zones/us-central1-a/instances/cf-abc"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"name": "cf-abc",
			"labels": {"created_by": "dev"},
			"disks": [{"diskSizeGb": "20"}],
			"machineType": "zones/us-central1-a/machineTypes/n1-standard-1",
			"networkInterfaces": [{"networkIP": "10.0.0.5"}],
		})))
		.mount(&compute)
		.await;

	let gce_config = InstanceManagerConfig::Gce(GceConfig {
		project_id: "my-project".into(),
		default_zone: "us-central1-a".into(),
		source_image: "projects/cf/global/images/cuttlefish".into(),
		network_interface: "nic0".into(),
		poll_interval: std::time::Duration::from_millis(1),
	});
	let instance_manager = cloudorch_test_support::instance_manager_with_base_url(&gce_config, &compute.uri());
	let app = http::router(base_state(instance_manager));

	let req = Request::builder()
		.method("POST")
		.uri("/v1/zones/us-central1-a/operations/op-42/:wait")
		.body(Body::empty())
		.unwrap();
	let (status, body) = call(app, req).await;
	assert_eq!(status, StatusCode::OK);
	let op: Operation = serde_json::from_value(body).unwrap();
	assert!(op.done);
	match op.result.unwrap() {
		cloudorch::types::OperationResult::Response(v) => assert_eq!(v["name"], "cf-abc"),
		cloudorch::types::OperationResult::Error(e) => panic!("expected a resolved instance, got error: {e:?}"),
	}
}

/// Scenarios 4 and 5: signaling connection-id rewriting and forwarding.
#[tokio::test]
async fn scenario_signaling_rewrites_and_forwards() {
	let host = mock_host::Server::run().await;
	let instance_manager = InstanceManager::new(&InstanceManagerConfig::Local(LocalBackendConfig {
		hosts: vec![LocalHost {
			name: "H".into(),
			zone: "Z".into(),
			internal_addr: format!("http://{}/", host.address()),
		}],
	}));
	let app = http::router(base_state(instance_manager));

	let req = Request::builder()
		.method("POST")
		.uri("/v1/zones/Z/hosts/H/connections")
		.header("content-type", "application/json")
		.body(Body::from(json!({"device_id": "dev:X"}).to_string()))
		.unwrap();
	let (status, body) = call(app.clone(), req).await;
	assert_eq!(status, StatusCode::OK);
	let composite = body["connection_id"].as_str().unwrap().to_string();
	assert_eq!(composite, format!("dev:X:{}", STANDARD.encode("local-1")));

	let req = Request::builder()
		.method("POST")
		.uri(format!("/v1/zones/Z/hosts/H/connections/{composite}/:forward"))
		.header("content-type", "application/json")
		.body(Body::from(json!({"sdp": "offer"}).to_string()))
		.unwrap();
	let (status, _) = call(app.clone(), req).await;
	assert_eq!(status, StatusCode::NO_CONTENT);

	let req = Request::builder()
		.method("GET")
		.uri(format!("/v1/zones/Z/hosts/H/connections/{composite}/messages"))
		.body(Body::empty())
		.unwrap();
	let (status, body) = call(app, req).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!([{"sdp": "offer"}]));

	host.shutdown().await;
}

/// Scenario 6: deleting a host owned by someone else is reported as "not
/// found" rather than disclosing ownership. Identity here comes from the
/// `?user=` query param (`AccountManagerConfig::UrlQuery`), letting the test
/// drive two distinct callers through the real HTTP stack instead of only
/// unit-testing the backend's ownership check in isolation.
#[tokio::test]
async fn scenario_delete_by_non_owner_avoids_disclosure() {
	let instance_manager = InstanceManager::new(&InstanceManagerConfig::Local(LocalBackendConfig {
		hosts: vec![LocalHost {
			name: "cf-xyz".into(),
			zone: "Z".into(),
			internal_addr: "http://127.0.0.1:1".into(),
		}],
	}));
	let app = http::router(state_with_account_manager(instance_manager, AccountManagerConfig::UrlQuery));

	let req = Request::builder()
		.method("POST")
		.uri("/v1/zones/Z/hosts?user=alice")
		.header("content-type", "application/json")
		.body(Body::from(json!({"host_instance": {}}).to_string()))
		.unwrap();
	let (status, _) = call(app.clone(), req).await;
	assert_eq!(status, StatusCode::OK);

	let req = Request::builder()
		.method("GET")
		.uri("/v1/zones/Z/hosts?user=alice")
		.body(Body::empty())
		.unwrap();
	let (status, body) = call(app.clone(), req).await;
	assert_eq!(status, StatusCode::OK);
	let listed: ListHostsResponse = serde_json::from_value(body).unwrap();
	assert_eq!(listed.items.len(), 1);

	let req = Request::builder()
		.method("DELETE")
		.uri("/v1/zones/Z/hosts/cf-xyz?user=bob")
		.body(Body::empty())
		.unwrap();
	let (status, body) = call(app.clone(), req).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], "not found");

	let req = Request::builder()
		.method("DELETE")
		.uri("/v1/zones/Z/hosts/cf-xyz?user=alice")
		.body(Body::empty())
		.unwrap();
	let (status, _) = call(app, req).await;
	assert_eq!(status, StatusCode::OK);
}

mod cloudorch_test_support {
	use cloudorch::config::InstanceManagerConfig;
	use cloudorch::instance::InstanceManager;

	/// Builds an [`InstanceManager`] whose GCE backend points at a test
	/// double instead of the real Compute API. The production path
	/// (`InstanceManager::new`) always targets `compute.googleapis.com`;
	/// integration tests need the override, so this mirrors that
	/// construction using the same config shape.
	pub fn instance_manager_with_base_url(config: &InstanceManagerConfig, base_url: &str) -> InstanceManager {
		match config {
			InstanceManagerConfig::Gce(cfg) => {
				InstanceManager::new_gce_with_base_url(cfg.clone(), url::Url::parse(base_url).unwrap())
			},
			_ => InstanceManager::new(config),
		}
	}
}
