//! The public data model (`spec.md` §3). Kept deliberately flat and
//! serde-derived: these shapes are the wire contract, not an internal
//! representation, so they carry no behavior beyond (de)serialization.

use serde::{Deserialize, Serialize};

/// Produced solely by the account manager from one inbound request. Never
/// persisted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub username: String,
	pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
	pub name: String,
	pub zone: String,
	pub boot_disk_size_gb: u32,
	pub backend_specific: BackendSpecific,
}

/// The tagged variant selecting one compute backend. `Gce` is the cloud-VM
/// backend named throughout `spec.md` §4.3; `Local` and `Container` are the
/// dev/test backends named in `spec.md` §4.3's backend list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSpecific {
	Gce {
		machine_type: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		min_cpu_platform: Option<String>,
	},
	Local,
	Container {
		image: String,
	},
}

/// Request body for `POST /v1/zones/{zone}/hosts`. The inner instance block
/// is intentionally permissive at the wire level — validation of what is and
/// isn't acceptable happens in the instance manager, per backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHostRequest {
	pub host_instance: Option<HostInstanceSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInstanceSpec {
	/// Rejected if non-empty: names are always server-generated.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub boot_disk_size_gb: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gcp: Option<GcpInstanceSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpInstanceSpec {
	pub machine_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min_cpu_platform: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListHostsRequest {
	#[serde(default)]
	pub max_results: u32,
	#[serde(default)]
	pub page_token: String,
}

impl ListHostsRequest {
	pub const MAX_RESULTS_CAP: u32 = 500;

	/// Clamps `maxResults` into `[0, 500]`; `0` keeps the backend default.
	pub fn clamped_max_results(&self) -> u32 {
		self.max_results.min(Self::MAX_RESULTS_CAP)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListHostsResponse {
	pub items: Vec<Host>,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub next_page_token: String,
}

/// `{name, done, result?}`. `result` is present iff `done`; enforced by the
/// constructors rather than by the wire shape so serde stays straightforward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
	pub name: String,
	pub done: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<OperationResult>,
}

impl Operation {
	pub fn pending(name: impl Into<String>) -> Self {
		Operation {
			name: name.into(),
			done: false,
			result: None,
		}
	}

	pub fn done_ok(name: impl Into<String>, response: serde_json::Value) -> Self {
		Operation {
			name: name.into(),
			done: true,
			result: Some(OperationResult::Response(response)),
		}
	}

	pub fn done_err(name: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
		Operation {
			name: name.into(),
			done: true,
			result: Some(OperationResult::Error(ErrorBody {
				code,
				message: message.into(),
			})),
		}
	}
}

/// Either-variant: `{error}` XOR `{response}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationResult {
	Error(ErrorBody),
	Response(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
	pub code: u16,
	pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
	pub urls: Vec<String>,
}

/// Immutable after construction; served verbatim per host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfraConfig {
	pub ice_servers: Vec<IceServer>,
}

/// `{compositeId, hostAddr, localConnId}` (`spec.md` §3). `hostAddr` is not
/// serialized to clients: it is internal routing state used by the relay to
/// know which host to forward subsequent calls to.
#[derive(Debug, Clone)]
pub struct PolledConnection {
	pub composite_id: String,
	pub host_addr: String,
	pub local_conn_id: String,
}
