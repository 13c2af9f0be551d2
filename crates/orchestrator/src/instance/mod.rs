//! Instance Manager (`spec.md` §4.3): abstracts host CRUD over three
//! pluggable compute backends, selected at boot as a tagged-variant
//! discriminator — the same dispatch-over-backends pattern the teacher uses
//! for `BackendAuth`/account sources (`SPEC_FULL.md` §9).

mod docker;
mod gce;
mod local;

use std::time::Duration;

use crate::client::HostClient;
use crate::config::InstanceManagerConfig;
use crate::error::Error;
use crate::types::{CreateHostRequest, ListHostsRequest, ListHostsResponse, Operation, User};

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
	async fn create_host(&self, zone: &str, user: &User, req: CreateHostRequest) -> Result<Operation, Error>;
	async fn list_hosts(&self, zone: &str, user: &User, req: ListHostsRequest) -> Result<ListHostsResponse, Error>;
	async fn delete_host(&self, zone: &str, user: &User, name: &str) -> Result<Operation, Error>;
	async fn wait_operation(&self, zone: &str, name: &str, max_wait: Duration) -> Result<Operation, Error>;
	async fn get_host_client(&self, zone: &str, name: &str) -> Result<HostClient, Error>;
}

#[derive(Clone)]
pub struct InstanceManager {
	backend: std::sync::Arc<dyn Backend>,
}

impl InstanceManager {
	pub fn new(config: &InstanceManagerConfig) -> Self {
		let backend: std::sync::Arc<dyn Backend> = match config {
			InstanceManagerConfig::Gce(cfg) => std::sync::Arc::new(gce::GceBackend::new(cfg.clone())),
			InstanceManagerConfig::Local(cfg) => std::sync::Arc::new(local::LocalBackend::new(cfg.clone())),
			InstanceManagerConfig::Docker(cfg) => std::sync::Arc::new(docker::DockerBackend::new(cfg.clone())),
		};
		InstanceManager { backend }
	}

	/// Test-only constructor pointing the GCE backend at a stand-in Compute
	/// API server instead of `compute.googleapis.com`.
	pub fn new_gce_with_base_url(config: crate::config::GceConfig, base_url: url::Url) -> Self {
		InstanceManager {
			backend: std::sync::Arc::new(gce::GceBackend::with_base_url(
				config,
				base_url,
				std::sync::Arc::new(gce::EnvTokenProvider),
			)),
		}
	}

	pub async fn create_host(&self, zone: &str, user: &User, req: CreateHostRequest) -> Result<Operation, Error> {
		self.backend.create_host(zone, user, req).await
	}

	pub async fn list_hosts(&self, zone: &str, user: &User, req: ListHostsRequest) -> Result<ListHostsResponse, Error> {
		if req.max_results > 0 && req.max_results > i32::MAX as u32 {
			return Err(Error::BadRequest("maxResults out of range".into()));
		}
		self.backend.list_hosts(zone, user, req).await
	}

	pub async fn delete_host(&self, zone: &str, user: &User, name: &str) -> Result<Operation, Error> {
		self.backend.delete_host(zone, user, name).await
	}

	pub async fn wait_operation(&self, zone: &str, name: &str, max_wait: Duration) -> Result<Operation, Error> {
		self.backend.wait_operation(zone, name, max_wait).await
	}

	pub async fn get_host_client(&self, zone: &str, name: &str) -> Result<HostClient, Error> {
		self.backend.get_host_client(zone, name).await
	}
}

/// `maxResults=-1` arrives to the HTTP layer as a parse failure of an
/// unsigned integer, which the router turns into `BadRequest` before this
/// module is even reached (`spec.md` §8 boundary behavior).
pub fn validate_max_results(raw: &str) -> Result<u32, Error> {
	raw
		.parse::<u32>()
		.map_err(|_| Error::BadRequest(format!("invalid maxResults: {raw}")))
}
