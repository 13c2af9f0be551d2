//! Cloud-VM (GCE) backend. Talks to the Compute Engine REST API directly
//! over `reqwest` rather than a generated SDK — the teacher takes the same
//! approach for its own cloud integrations (`http/auth.rs::gcp` fetches a
//! bearer token and attaches it to plain REST calls rather than depending on
//! a full GCP client library).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::Backend;
use crate::client::HostClient;
use crate::config::GceConfig;
use crate::error::Error;
use crate::operation::{self, InstanceFetcher, NativeOperation, TargetInstance};
use crate::types::{BackendSpecific, CreateHostRequest, Host, ListHostsResponse, Operation, ListHostsRequest, User};

const COMPUTE_API_BASE: &str = "https://compute.googleapis.com";
/// Port the per-host orchestrator listens on internally. Not configurable in
/// this spec's scope — every host image runs the same orchestrator build.
const HOST_ORCHESTRATOR_PORT: u16 = 1080;

#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
	async fn token(&self) -> Result<Option<String>, Error>;
}

/// Reads a pre-fetched access token from the environment. Real deployments
/// swap this for a provider backed by `google-cloud-auth`; doing the ADC
/// dance is out of this crate's scope (`SPEC_FULL.md` §4.1 takes the same
/// stance for IAP key fetching).
pub struct EnvTokenProvider;

#[async_trait::async_trait]
impl TokenProvider for EnvTokenProvider {
	async fn token(&self) -> Result<Option<String>, Error> {
		Ok(std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok())
	}
}

pub struct GceBackend {
	config: GceConfig,
	http: reqwest::Client,
	base_url: Url,
	token: Arc<dyn TokenProvider>,
}

impl GceBackend {
	pub fn new(config: GceConfig) -> Self {
		GceBackend::with_base_url(config, Url::parse(COMPUTE_API_BASE).unwrap(), Arc::new(EnvTokenProvider))
	}

	pub fn with_base_url(config: GceConfig, base_url: Url, token: Arc<dyn TokenProvider>) -> Self {
		GceBackend {
			config,
			http: reqwest::Client::new(),
			base_url,
			token,
		}
	}

	fn instances_url(&self, zone: &str) -> Url {
		self
			.base_url
			.join(&format!(
				"compute/v1/projects/{}/zones/{zone}/instances",
				self.config.project_id
			))
			.expect("well-formed instances URL")
	}

	fn instance_url(&self, zone: &str, name: &str) -> Url {
		self
			.base_url
			.join(&format!(
				"compute/v1/projects/{}/zones/{zone}/instances/{name}",
				self.config.project_id
			))
			.expect("well-formed instance URL")
	}

	fn operation_url(&self, zone: &str, name: &str) -> Url {
		self
			.base_url
			.join(&format!(
				"compute/v1/projects/{}/zones/{zone}/operations/{name}",
				self.config.project_id
			))
			.expect("well-formed operation URL")
	}

	async fn authed(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, Error> {
		Ok(match self.token.token().await? {
			Some(tok) => builder.bearer_auth(tok),
			None => builder,
		})
	}

	async fn send_for_operation(&self, builder: reqwest::RequestBuilder) -> Result<NativeOperation, Error> {
		let resp = self
			.authed(builder)
			.await?
			.send()
			.await
			.map_err(|e| Error::internal(format!("compute API call failed: {e}")))?;
		if !resp.status().is_success() {
			let status = resp.status().as_u16();
			let body = resp.text().await.unwrap_or_default();
			return Err(Error::Backend { code: status, message: body });
		}
		resp
			.json::<NativeOperation>()
			.await
			.map_err(|e| Error::internal(format!("decoding compute operation: {e}")))
	}

	async fn get_instance(&self, zone: &str, name: &str) -> Result<GceInstance, Error> {
		let resp = self
			.authed(self.http.get(self.instance_url(zone, name)))
			.await?
			.send()
			.await
			.map_err(|e| Error::internal(format!("fetching instance {name}: {e}")))?;
		if !resp.status().is_success() {
			let status = resp.status().as_u16();
			let body = resp.text().await.unwrap_or_default();
			return Err(Error::Backend { code: status, message: body });
		}
		resp
			.json::<GceInstance>()
			.await
			.map_err(|e| Error::internal(format!("decoding instance {name}: {e}")))
	}
}

fn validate(req: &CreateHostRequest) -> Result<&crate::types::GcpInstanceSpec, Error> {
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
	spec
		.gcp
		.as_ref()
		.ok_or_else(|| Error::BadRequest("invalid CreateHostRequest".into()))
}

#[async_trait::async_trait]
impl Backend for GceBackend {
	async fn create_host(&self, zone: &str, user: &User, req: CreateHostRequest) -> Result<Operation, Error> {
		let gcp = validate(&req)?;
		let name = format!("cf-{}", Uuid::new_v4());
		let body = InsertInstanceBody {
			name: name.clone(),
			machine_type: format!("zones/{zone}/machineTypes/{}", gcp.machine_type),
			min_cpu_platform: gcp.min_cpu_platform.clone(),
			labels: [
				("created_by".to_string(), user.username.clone()),
				("cf-created_by".to_string(), user.username.clone()),
			]
			.into_iter()
			.collect(),
			disks: vec![Disk {
				boot: true,
				initialize_params: InitializeParams {
					source_image: self.config.source_image.clone(),
				},
			}],
			advanced_machine_features: AdvancedMachineFeatures {
				enable_nested_virtualization: true,
			},
			network_interfaces: vec![NetworkInterface {
				name: self.config.network_interface.clone(),
			}],
		};
		let native = self
			.send_for_operation(self.http.post(self.instances_url(zone)).json(&body))
			.await?;
		operation::translate(native, self).await
	}

	async fn list_hosts(&self, zone: &str, user: &User, req: ListHostsRequest) -> Result<ListHostsResponse, Error> {
		let cap = req.clamped_max_results();
		let filter = format!("labels.created_by:{} AND status=RUNNING", user.username);
		let mut query = vec![("filter".to_string(), filter)];
		if cap > 0 {
			query.push(("maxResults".to_string(), cap.to_string()));
		}
		if !req.page_token.is_empty() {
			query.push(("pageToken".to_string(), req.page_token.clone()));
		}
		let resp = self
			.authed(self.http.get(self.instances_url(zone)).query(&query))
			.await?
			.send()
			.await
			.map_err(|e| Error::internal(format!("listing instances failed: {e}")))?;
		if !resp.status().is_success() {
			let status = resp.status().as_u16();
			let body = resp.text().await.unwrap_or_default();
			return Err(Error::Backend { code: status, message: body });
		}
		let page: InstanceListPage = resp
			.json()
			.await
			.map_err(|e| Error::internal(format!("decoding instance list: {e}")))?;

		let items = page
			.items
			.into_iter()
			// Defense in depth: the backend filter already restricts to this
			// user, but the invariant in `spec.md` §8 is enforced here too.
			.filter(|i| i.labels.get("created_by").map(String::as_str) == Some(user.username.as_str()))
			.map(|i| i.into_host(zone))
			.collect();

		Ok(ListHostsResponse {
			items,
			next_page_token: page.next_page_token.unwrap_or_default(),
		})
	}

	async fn delete_host(&self, zone: &str, user: &User, name: &str) -> Result<Operation, Error> {
		let instance = match self.get_instance(zone, name).await {
			Ok(i) => i,
			Err(_) => return Err(Error::BadRequest("not found".into())),
		};
		if instance.labels.get("created_by").map(String::as_str) != Some(user.username.as_str()) {
			// Avoid disclosing existence of a host owned by someone else.
			return Err(Error::BadRequest("not found".into()));
		}
		let native = self.send_for_operation(self.http.delete(self.instance_url(zone, name))).await?;
		operation::translate(native, self).await
	}

	async fn wait_operation(&self, zone: &str, name: &str, max_wait: Duration) -> Result<Operation, Error> {
		let zone = zone.to_string();
		let name_owned = name.to_string();
		let native = operation::wait(max_wait, self.config.poll_interval, || {
			let url = self.operation_url(&zone, &name_owned);
			async move {
				let resp = self
					.authed(self.http.get(url))
					.await?
					.send()
					.await
					.map_err(|e| Error::internal(format!("polling operation: {e}")))?;
				if !resp.status().is_success() {
					let status = resp.status().as_u16();
					let body = resp.text().await.unwrap_or_default();
					return Err(Error::Backend { code: status, message: body });
				}
				resp
					.json::<NativeOperation>()
					.await
					.map_err(|e| Error::internal(format!("decoding operation: {e}")))
			}
		})
		.await?;
		operation::translate(native, self).await
	}

	async fn get_host_client(&self, zone: &str, name: &str) -> Result<HostClient, Error> {
		let instance = self.get_instance(zone, name).await?;
		let nic = instance
			.network_interfaces
			.first()
			.ok_or_else(|| Error::internal(format!("host {name} has no network interface")))?;
		let url = Url::parse(&format!("http://{}:{HOST_ORCHESTRATOR_PORT}/", nic.network_ip))
			.map_err(|e| Error::internal(format!("invalid internal address: {e}")))?;
		HostClient::new(url)
	}
}

#[async_trait::async_trait]
impl InstanceFetcher for GceBackend {
	async fn fetch_instance(&self, target: &TargetInstance) -> Result<serde_json::Value, Error> {
		let instance = self.get_instance(&target.zone, &target.name).await?;
		let host = instance.into_host(&target.zone);
		serde_json::to_value(host).map_err(Error::internal)
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertInstanceBody {
	name: String,
	machine_type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	min_cpu_platform: Option<String>,
	labels: std::collections::HashMap<String, String>,
	disks: Vec<Disk>,
	advanced_machine_features: AdvancedMachineFeatures,
	network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Disk {
	boot: bool,
	initialize_params: InitializeParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
	source_image: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvancedMachineFeatures {
	enable_nested_virtualization: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
	name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceListPage {
	#[serde(default)]
	items: Vec<GceInstance>,
	#[serde(default)]
	next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GceInstance {
	name: String,
	#[serde(default)]
	labels: std::collections::HashMap<String, String>,
	#[serde(default)]
	disks: Vec<InstanceDisk>,
	#[serde(default)]
	machine_type: String,
	#[serde(default)]
	min_cpu_platform: Option<String>,
	#[serde(default)]
	network_interfaces: Vec<InstanceNetworkInterface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceDisk {
	#[serde(default)]
	disk_size_gb: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceNetworkInterface {
	#[serde(default)]
	network_ip: String,
}

impl GceInstance {
	fn into_host(self, zone: &str) -> Host {
		let boot_disk_size_gb = self
			.disks
			.first()
			.and_then(|d| d.disk_size_gb.as_ref())
			.and_then(|s| s.parse().ok())
			.unwrap_or(0);
		if self.disks.len() > 1 {
			tracing::info!(instance = %self.name, "instance has more than one disk, using the first as boot disk");
		}
		let machine_type = self.machine_type.rsplit('/').next().unwrap_or(&self.machine_type).to_string();
		Host {
			name: self.name,
			zone: zone.to_string(),
			boot_disk_size_gb,
			backend_specific: BackendSpecific::Gce {
				machine_type,
				min_cpu_platform: self.min_cpu_platform,
			},
		}
	}
}
