//! Signaling Relay (`spec.md` §4.5): bridges the client-facing polled
//! connection protocol to the host's own `/polled_connections` API, rewriting
//! the connection ID to an opaque composite form on the way out and decoding
//! it back on the way in. Grounded in the teacher's `base64::STANDARD` usage
//! (`rbac.rs`) for the encode/decode half and its relay/forwarding split
//! (`mcp/relay/mod.rs`) for the request-translation half.

use std::path::{Path as FsPath, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::HostClient;
use crate::error::Error;
use crate::types::{IceServer, InfraConfig};

/// Separates the device portion from the base64-encoded local connection ID
/// in a composite ID. Splitting happens at the *last* occurrence so a device
/// ID containing `:` still round-trips (`spec.md` §3, §8 invariant).
const SEPARATOR: char = ':';

pub fn encode_composite_id(device_id: &str, local_conn_id: &str) -> String {
	format!("{device_id}{SEPARATOR}{}", STANDARD.encode(local_conn_id))
}

pub fn decode_composite_id(composite_id: &str) -> Result<(String, String), Error> {
	let idx = composite_id
		.rfind(SEPARATOR)
		.ok_or_else(|| Error::NotFound("Invalid connection Id".into()))?;
	let (device_id, encoded) = (&composite_id[..idx], &composite_id[idx + 1..]);
	let local_conn_id = STANDARD
		.decode(encoded)
		.map_err(|_| Error::NotFound("Invalid connection Id".into()))?;
	let local_conn_id =
		String::from_utf8(local_conn_id).map_err(|_| Error::NotFound("Invalid connection Id".into()))?;
	Ok((device_id.to_string(), local_conn_id))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewConnectionRequest {
	pub device_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewConnectionResponse {
	pub connection_id: String,
}

/// One orchestrator per host: owns the host's [`HostClient`] and the
/// configured ICE server list served from [`SignalingRelay::infra_config`].
pub struct SignalingRelay {
	client: HostClient,
	ice_servers: Vec<IceServer>,
	device_files_dir: Option<PathBuf>,
}

impl SignalingRelay {
	pub fn new(client: HostClient, ice_servers: Vec<IceServer>, device_files_dir: Option<PathBuf>) -> Self {
		SignalingRelay {
			client,
			ice_servers,
			device_files_dir,
		}
	}

	pub fn infra_config(&self) -> InfraConfig {
		InfraConfig {
			ice_servers: self.ice_servers.clone(),
		}
	}

	/// `POST /connections` → `POST /polled_connections`, rewriting the host's
	/// `connection_id` reply into the client-visible composite form.
	pub async fn new_connection(&self, device_id: &str) -> Result<NewConnectionResponse, Error> {
		let req = NewConnectionRequest {
			device_id: device_id.to_string(),
		};
		let resp: NewConnectionResponse = self.client.post("polled_connections", &[], &req).await?;
		Ok(NewConnectionResponse {
			connection_id: encode_composite_id(device_id, &resp.connection_id),
		})
	}

	/// `POST /connections/{cid}/:forward` → decodes the composite ID and
	/// forwards to `POST /polled_connections/{localId}/:forward`.
	pub async fn forward(&self, composite_id: &str, payload: Value) -> Result<(), Error> {
		let (_, local_conn_id) = decode_composite_id(composite_id)?;
		self
			.client
			.post_discard(&format!("polled_connections/{local_conn_id}/:forward"), &[], &payload)
			.await
	}

	/// `GET /connections/{cid}/messages?start&count` → decodes the composite
	/// ID and delegates to `GET /polled_connections/{localId}/messages`. This
	/// is one of the handler's defined suspension points (`spec.md` §5): the
	/// host may long-poll before replying.
	pub async fn messages(&self, composite_id: &str, start: Option<&str>, count: Option<&str>) -> Result<Value, Error> {
		let (_, local_conn_id) = decode_composite_id(composite_id)?;
		let mut query = Vec::new();
		if let Some(start) = start {
			query.push(("start", start));
		}
		if let Some(count) = count {
			query.push(("count", count));
		}
		self
			.client
			.get(&format!("polled_connections/{local_conn_id}/messages"), &query)
			.await
	}

	/// Serves the one intercepted device-files path (the signaling bootstrap
	/// script) from a local static directory instead of proxying it, per
	/// `spec.md` §4.5. Every other device-files path is a pure forward and
	/// never reaches this method.
	pub async fn serve_device_file(&self, relative_path: &str) -> Result<Vec<u8>, Error> {
		let dir = self
			.device_files_dir
			.as_deref()
			.ok_or_else(|| Error::NotFound("no device files directory configured".into()))?;
		let full_path = resolve_under(dir, relative_path)?;
		tokio::fs::read(&full_path)
			.await
			.map_err(|_| Error::NotFound(format!("device file {relative_path} not found")))
	}
}

/// Joins `relative_path` under `dir`, refusing anything that would escape it
/// via `..` traversal.
fn resolve_under(dir: &FsPath, relative_path: &str) -> Result<PathBuf, Error> {
	let relative_path = relative_path.trim_start_matches('/');
	let candidate = dir.join(relative_path);
	if relative_path.split('/').any(|seg| seg == "..") {
		return Err(Error::BadRequest(format!("invalid device file path {relative_path}")));
	}
	Ok(candidate)
}
