//! Container backend: runs hosts as Docker containers on a single daemon
//! reached over its HTTP API. Lighter than [`super::gce`] because the Docker
//! Engine API has no long-running-operation concept — container create/start
//! and remove are synchronous, so `wait_operation` never actually waits.
//!
//! Talks to the daemon's TCP socket (`tcp://host:port`), not the unix socket
//! the Docker CLI defaults to — keeping the transport to plain `reqwest` HTTP
//! avoids a unix-domain-socket connector dependency the teacher's stack
//! doesn't otherwise need. Documented as a deployment requirement in
//! `DESIGN.md` rather than handled here.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::Backend;
use crate::client::HostClient;
use crate::config::DockerBackendConfig;
use crate::error::Error;
use crate::types::{BackendSpecific, CreateHostRequest, Host, ListHostsRequest, ListHostsResponse, Operation, User};

fn validate(req: &CreateHostRequest) -> Result<(), Error> {
	let spec = req
		.host_instance
		.as_ref()
		.ok_or_else(|| Error::BadRequest("invalid CreateHostRequest".into()))?;
	if spec.name.as_deref().is_some_and(|n| !n.is_empty()) {
		return Err(Error::BadRequest("invalid CreateHostRequest".into()));
	}
	if spec.boot_disk_size_gb.is_some_and(|s| s != 0) {
		return Err(Error::BadRequest("invalid CreateHostRequest".into()));
	}
	Ok(())
}

struct Container {
	name: String,
	owner: String,
}

pub struct DockerBackend {
	config: DockerBackendConfig,
	http: reqwest::Client,
	base_url: Url,
	containers: Mutex<HashMap<String, Container>>,
}

impl DockerBackend {
	pub fn new(config: DockerBackendConfig) -> Self {
		DockerBackend::with_base_url(config, Url::parse("http://127.0.0.1:2375").unwrap())
	}

	pub fn with_base_url(config: DockerBackendConfig, base_url: Url) -> Self {
		DockerBackend {
			config,
			http: reqwest::Client::new(),
			base_url,
			containers: Mutex::new(HashMap::new()),
		}
	}

	fn containers_url(&self) -> Url {
		self.base_url.join("containers/create").expect("well-formed create URL")
	}

	fn start_url(&self, id: &str) -> Url {
		self.base_url.join(&format!("containers/{id}/start")).expect("well-formed start URL")
	}

	fn inspect_url(&self, id: &str) -> Url {
		self.base_url.join(&format!("containers/{id}/json")).expect("well-formed inspect URL")
	}

	fn remove_url(&self, id: &str) -> Url {
		self.base_url.join(&format!("containers/{id}?force=true")).expect("well-formed remove URL")
	}
}

#[derive(Serialize)]
struct CreateContainerBody {
	#[serde(rename = "Image")]
	image: String,
	#[serde(rename = "Labels")]
	labels: HashMap<String, String>,
	#[serde(rename = "HostConfig")]
	host_config: HostConfig,
}

#[derive(Serialize)]
struct HostConfig {
	#[serde(rename = "NetworkMode")]
	network_mode: String,
	#[serde(rename = "PublishAllPorts")]
	publish_all_ports: bool,
}

#[derive(Deserialize)]
struct CreateContainerResponse {
	#[serde(rename = "Id")]
	id: String,
}

#[derive(Deserialize)]
struct InspectResponse {
	#[serde(rename = "NetworkSettings")]
	network_settings: InspectNetworkSettings,
}

#[derive(Deserialize)]
struct InspectNetworkSettings {
	#[serde(rename = "IPAddress")]
	ip_address: String,
}

#[async_trait::async_trait]
impl Backend for DockerBackend {
	async fn create_host(&self, zone: &str, user: &User, req: CreateHostRequest) -> Result<Operation, Error> {
		validate(&req)?;
		let name = format!("cf-{}", Uuid::new_v4());
		let body = CreateContainerBody {
			image: self.config.image.clone(),
			labels: [
				("created_by".to_string(), user.username.clone()),
				("cf-created_by".to_string(), user.username.clone()),
			]
			.into_iter()
			.collect(),
			host_config: HostConfig {
				network_mode: self.config.network.clone(),
				publish_all_ports: true,
			},
		};

		let resp = self
			.http
			.post(self.containers_url())
			.query(&[("name", name.as_str())])
			.json(&body)
			.send()
			.await
			.map_err(|e| Error::internal(format!("creating container: {e}")))?;
		if !resp.status().is_success() {
			let status = resp.status().as_u16();
			let message = resp.text().await.unwrap_or_default();
			return Err(Error::Backend { code: status, message });
		}
		let created: CreateContainerResponse = resp
			.json()
			.await
			.map_err(|e| Error::internal(format!("decoding container create response: {e}")))?;

		let start_resp = self
			.http
			.post(self.start_url(&created.id))
			.send()
			.await
			.map_err(|e| Error::internal(format!("starting container: {e}")))?;
		if !start_resp.status().is_success() {
			let status = start_resp.status().as_u16();
			let message = start_resp.text().await.unwrap_or_default();
			return Err(Error::Backend { code: status, message });
		}

		self.containers.lock().unwrap().insert(
			name.clone(),
			Container {
				name: created.id,
				owner: user.username.clone(),
			},
		);

		let host = Host {
			name: name.clone(),
			zone: zone.to_string(),
			boot_disk_size_gb: 0,
			backend_specific: BackendSpecific::Container {
				image: self.config.image.clone(),
			},
		};
		let host_json = serde_json::to_value(&host).map_err(Error::internal)?;
		Ok(Operation::done_ok(format!("operation-{name}"), host_json))
	}

	async fn list_hosts(&self, zone: &str, user: &User, req: ListHostsRequest) -> Result<ListHostsResponse, Error> {
		let cap = req.clamped_max_results();
		let containers = self.containers.lock().unwrap();
		let mut items: Vec<Host> = containers
			.iter()
			.filter(|(_, c)| c.owner == user.username)
			.map(|(name, _)| Host {
				name: name.clone(),
				zone: zone.to_string(),
				boot_disk_size_gb: 0,
				backend_specific: BackendSpecific::Container {
					image: self.config.image.clone(),
				},
			})
			.collect();
		if cap > 0 {
			items.truncate(cap as usize);
		}
		Ok(ListHostsResponse {
			items,
			next_page_token: String::new(),
		})
	}

	async fn delete_host(&self, _zone: &str, user: &User, name: &str) -> Result<Operation, Error> {
		let id = {
			let containers = self.containers.lock().unwrap();
			match containers.get(name) {
				Some(c) if c.owner == user.username => c.name.clone(),
				_ => return Err(Error::BadRequest("not found".into())),
			}
		};
		let resp = self
			.http
			.delete(self.remove_url(&id))
			.send()
			.await
			.map_err(|e| Error::internal(format!("removing container: {e}")))?;
		if !resp.status().is_success() && resp.status().as_u16() != 404 {
			let status = resp.status().as_u16();
			let message = resp.text().await.unwrap_or_default();
			return Err(Error::Backend { code: status, message });
		}
		self.containers.lock().unwrap().remove(name);
		Ok(Operation::done_ok(format!("operation-delete-{name}"), serde_json::json!({})))
	}

	async fn wait_operation(&self, _zone: &str, name: &str, _max_wait: Duration) -> Result<Operation, Error> {
		// Container create/start/remove are synchronous on this backend.
		Ok(Operation::done_ok(name.to_string(), serde_json::json!({})))
	}

	async fn get_host_client(&self, _zone: &str, name: &str) -> Result<HostClient, Error> {
		let id = {
			let containers = self.containers.lock().unwrap();
			containers
				.get(name)
				.map(|c| c.name.clone())
				.ok_or_else(|| Error::NotFound(format!("host {name} not found")))?
		};
		let resp = self
			.http
			.get(self.inspect_url(&id))
			.send()
			.await
			.map_err(|e| Error::internal(format!("inspecting container: {e}")))?;
		if !resp.status().is_success() {
			let status = resp.status().as_u16();
			let message = resp.text().await.unwrap_or_default();
			return Err(Error::Backend { code: status, message });
		}
		let inspect: InspectResponse = resp
			.json()
			.await
			.map_err(|e| Error::internal(format!("decoding container inspect: {e}")))?;
		let url = Url::parse(&format!("http://{}/", inspect.network_settings.ip_address))
			.map_err(|e| Error::internal(format!("invalid container address: {e}")))?;
		HostClient::new(url)
	}
}
