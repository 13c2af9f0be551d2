//! Local/dev backend: treats a configured list of hosts as an already
//! running fleet and never calls out to a real cloud API. This is what the
//! integration tests exercise (`SPEC_FULL.md` §4.3 supplement), grounded in
//! the teacher's dev/test-only server components (`mock-server`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use url::Url;

use super::Backend;
use crate::client::HostClient;
use crate::config::LocalBackendConfig;
use crate::error::Error;
use crate::types::{BackendSpecific, CreateHostRequest, Host, ListHostsRequest, ListHostsResponse, Operation, User};

struct Entry {
	host: Host,
	internal_addr: String,
	owner: Option<String>,
}

pub struct LocalBackend {
	hosts: Mutex<HashMap<String, Entry>>,
}

impl LocalBackend {
	pub fn new(config: LocalBackendConfig) -> Self {
		let hosts = config
			.hosts
			.into_iter()
			.map(|h| {
				(
					h.name.clone(),
					Entry {
						host: Host {
							name: h.name,
							zone: h.zone,
							boot_disk_size_gb: 0,
							backend_specific: BackendSpecific::Local,
						},
						internal_addr: h.internal_addr,
						owner: None,
					},
				)
			})
			.collect();
		LocalBackend {
			hosts: Mutex::new(hosts),
		}
	}
}

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

#[async_trait::async_trait]
impl Backend for LocalBackend {
	async fn create_host(&self, zone: &str, user: &User, req: CreateHostRequest) -> Result<Operation, Error> {
		validate(&req)?;
		let mut hosts = self.hosts.lock().unwrap();
		let entry = hosts
			.values_mut()
			.find(|e| e.host.zone == zone && e.owner.is_none())
			.ok_or_else(|| Error::ServiceUnavailable("no local hosts available".into()))?;
		entry.owner = Some(user.username.clone());
		let host_json = serde_json::to_value(&entry.host).map_err(Error::internal)?;
		Ok(Operation::done_ok(format!("operation-{}", entry.host.name), host_json))
	}

	async fn list_hosts(&self, zone: &str, user: &User, req: ListHostsRequest) -> Result<ListHostsResponse, Error> {
		let cap = req.clamped_max_results();
		let hosts = self.hosts.lock().unwrap();
		let mut items: Vec<Host> = hosts
			.values()
			.filter(|e| e.host.zone == zone && e.owner.as_deref() == Some(user.username.as_str()))
			.map(|e| e.host.clone())
			.collect();
		if cap > 0 {
			items.truncate(cap as usize);
		}
		Ok(ListHostsResponse {
			items,
			next_page_token: String::new(),
		})
	}

	async fn delete_host(&self, zone: &str, user: &User, name: &str) -> Result<Operation, Error> {
		let mut hosts = self.hosts.lock().unwrap();
		match hosts.get_mut(name) {
			Some(entry) if entry.host.zone == zone && entry.owner.as_deref() == Some(user.username.as_str()) => {
				entry.owner = None;
				Ok(Operation::done_ok(format!("operation-delete-{name}"), serde_json::json!({})))
			},
			// Avoid disclosing whether the host exists but is owned by someone else.
			_ => Err(Error::BadRequest("not found".into())),
		}
	}

	async fn wait_operation(&self, _zone: &str, name: &str, _max_wait: Duration) -> Result<Operation, Error> {
		// All local operations complete synchronously; `Wait` has nothing to
		// block on.
		Ok(Operation::done_ok(name.to_string(), serde_json::json!({})))
	}

	async fn get_host_client(&self, zone: &str, name: &str) -> Result<HostClient, Error> {
		let hosts = self.hosts.lock().unwrap();
		let entry = hosts
			.get(name)
			.filter(|e| e.host.zone == zone)
			.ok_or_else(|| Error::NotFound(format!("host {name} not found")))?;
		let url = Url::parse(&entry.internal_addr).map_err(|e| Error::internal(format!("invalid host address: {e}")))?;
		HostClient::new(url)
	}
}
