//! Config loading. Follows the teacher's `parse_config` idiom: a raw,
//! all-`Option` struct is deserialized from the config file, then each field
//! is resolved as `env_var.or(raw_field).unwrap_or(default)` through the
//! small `parse`/`parse_default` helpers below.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::IceServer;

#[derive(Debug, Clone)]
pub struct Config {
	pub port: u16,
	pub instance_manager: InstanceManagerConfig,
	pub account_manager: AccountManagerConfig,
	pub webrtc: WebRtcConfig,
	pub operations: OperationsConfig,
	pub secrets: Arc<SecretsConfig>,
	/// Directory `ServeDeviceFiles` serves `js/server_connector.js` from
	/// instead of proxying it to the host (`spec.md` §4.5). `None` disables
	/// the local-serve intercept entirely, falling back to always proxying.
	pub device_files_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum InstanceManagerConfig {
	Gce(GceConfig),
	Local(LocalBackendConfig),
	Docker(DockerBackendConfig),
}

#[derive(Debug, Clone)]
pub struct GceConfig {
	pub project_id: String,
	pub default_zone: String,
	pub source_image: String,
	pub network_interface: String,
	/// Delay between `operations.get` polls in `WaitOperation`. Keeps the
	/// backend from busy-polling the Compute API while an operation is still
	/// `RUNNING`.
	pub poll_interval: std::time::Duration,
}

#[derive(Debug, Clone, Default)]
pub struct LocalBackendConfig {
	/// Statically configured fleet: `(name, internal URL)` pairs the dev
	/// backend treats as already-running hosts.
	pub hosts: Vec<LocalHost>,
}

#[derive(Debug, Clone)]
pub struct LocalHost {
	pub name: String,
	pub zone: String,
	pub internal_addr: String,
}

#[derive(Debug, Clone)]
pub struct DockerBackendConfig {
	pub image: String,
	pub network: String,
}

#[derive(Debug, Clone)]
pub enum AccountManagerConfig {
	HttpBasic,
	UrlQuery,
	UsernameOnly,
	Iap { audience: String },
	AppEngine { header: String },
	UnixDev,
}

#[derive(Debug, Clone, Default)]
pub struct WebRtcConfig {
	pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, Default)]
pub struct OperationsConfig {
	pub create_host_disabled: bool,
	pub wait_max: std::time::Duration,
}

#[derive(Debug, Clone)]
pub enum SecretsConfig {
	File {
		oauth2_client_id_path: PathBuf,
		oauth2_client_secret_path: PathBuf,
	},
	Env,
}

/// All-optional mirror of [`Config`], deserialized straight from the config
/// file contents (YAML or JSON — both parse through `serde_yaml`, which
/// accepts JSON as a YAML subset, the same trick the teacher uses for its
/// `NestedRawConfig`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
	pub port: Option<u16>,
	pub instance_manager: Option<RawInstanceManager>,
	pub account_manager: Option<RawAccountManager>,
	pub webrtc: Option<RawWebRtc>,
	pub operations: Option<RawOperations>,
	pub secrets: Option<RawSecrets>,
	pub device_files_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum RawInstanceManager {
	Gce {
		project_id: String,
		default_zone: String,
		source_image: String,
		#[serde(default = "default_network_interface")]
		network_interface: String,
		#[serde(default)]
		poll_interval: Option<String>,
	},
	Local {
		#[serde(default)]
		hosts: Vec<RawLocalHost>,
	},
	Docker {
		image: String,
		#[serde(default = "default_docker_network")]
		network: String,
	},
}

fn default_network_interface() -> String {
	"nic0".to_string()
}

fn default_docker_network() -> String {
	"bridge".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocalHost {
	pub name: String,
	pub zone: String,
	pub internal_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawAccountManager {
	HttpBasic,
	UrlQuery,
	UsernameOnly,
	Iap { audience: Option<String> },
	AppEngine { header: Option<String> },
	UnixDev,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWebRtc {
	#[serde(default)]
	pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperations {
	pub create_host_disabled: Option<bool>,
	pub wait_max: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum RawSecrets {
	File {
		oauth2_client_id_path: PathBuf,
		oauth2_client_secret_path: PathBuf,
	},
	Env,
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
	let raw: RawConfig = if contents.trim().is_empty() {
		RawConfig::default()
	} else {
		serde_yaml::from_str(contents)?
	};

	let port = parse::<u16>("PORT")?.or(raw.port).unwrap_or(8080);

	let instance_manager = match raw.instance_manager {
		Some(RawInstanceManager::Gce {
			project_id,
			default_zone,
			source_image,
			network_interface,
			poll_interval,
		}) => InstanceManagerConfig::Gce(GceConfig {
			project_id,
			default_zone,
			source_image,
			network_interface,
			poll_interval: parse::<String>("GCE_POLL_INTERVAL")?
				.or(poll_interval)
				.map(|s| duration_str::parse(&s))
				.transpose()
				.map_err(|e| anyhow::anyhow!("invalid instanceManager.pollInterval: {e}"))?
				.unwrap_or(std::time::Duration::from_secs(2)),
		}),
		Some(RawInstanceManager::Local { hosts }) => InstanceManagerConfig::Local(LocalBackendConfig {
			hosts: hosts
				.into_iter()
				.map(|h| LocalHost {
					name: h.name,
					zone: h.zone,
					internal_addr: h.internal_addr,
				})
				.collect(),
		}),
		Some(RawInstanceManager::Docker { image, network }) => {
			InstanceManagerConfig::Docker(DockerBackendConfig { image, network })
		},
		None => InstanceManagerConfig::Local(LocalBackendConfig::default()),
	};

	let account_manager = match raw.account_manager {
		Some(RawAccountManager::HttpBasic) => AccountManagerConfig::HttpBasic,
		Some(RawAccountManager::UrlQuery) => AccountManagerConfig::UrlQuery,
		Some(RawAccountManager::UsernameOnly) => AccountManagerConfig::UsernameOnly,
		Some(RawAccountManager::Iap { audience }) => AccountManagerConfig::Iap {
			audience: parse::<String>("IAP_AUDIENCE")?
				.or(audience)
				.ok_or_else(|| anyhow::anyhow!("IAP_AUDIENCE is required for the iap account manager"))?,
		},
		Some(RawAccountManager::AppEngine { header }) => AccountManagerConfig::AppEngine {
			header: header.unwrap_or_else(|| "X-Appengine-User-Email".to_string()),
		},
		Some(RawAccountManager::UnixDev) => AccountManagerConfig::UnixDev,
		None => AccountManagerConfig::UnixDev,
	};

	let webrtc = WebRtcConfig {
		ice_servers: raw.webrtc.map(|w| w.ice_servers).unwrap_or_default(),
	};

	let operations = raw.operations.unwrap_or_default();
	let operations = OperationsConfig {
		create_host_disabled: operations.create_host_disabled.unwrap_or(false),
		wait_max: operations
			.wait_max
			.map(|s| duration_str::parse(&s))
			.transpose()
			.map_err(|e| anyhow::anyhow!("invalid operations.waitMax: {e}"))?
			.unwrap_or(std::time::Duration::from_secs(120)),
	};

	let secrets = match raw.secrets {
		Some(RawSecrets::File {
			oauth2_client_id_path,
			oauth2_client_secret_path,
		}) => SecretsConfig::File {
			oauth2_client_id_path,
			oauth2_client_secret_path,
		},
		Some(RawSecrets::Env) | None => SecretsConfig::Env,
	};

	let device_files_dir = parse::<PathBuf>("CVDR_DEVICE_FILES_DIR")?.or(raw.device_files_dir);

	Ok(Config {
		port,
		instance_manager,
		account_manager,
		webrtc,
		operations,
		secrets: Arc::new(secrets),
		device_files_dir,
	})
}

/// Loads config from `CVDR_SYSTEM_CONFIG_PATH`/`CVDR_USER_CONFIG_PATH` (user
/// overrides system) if present, falling back to an empty document so every
/// field still resolves from env vars and defaults.
pub fn load_config() -> anyhow::Result<Config> {
	let mut contents = String::new();
	if let Some(path) = parse::<PathBuf>("CVDR_SYSTEM_CONFIG_PATH")? {
		contents = std::fs::read_to_string(&path)
			.map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
	}
	if let Some(path) = parse::<PathBuf>("CVDR_USER_CONFIG_PATH")? {
		contents = std::fs::read_to_string(&path)
			.map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
	}
	parse_config(&contents)
}

fn parse<T: FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
	<T as FromStr>::Err: ToString,
{
	match env::var(name) {
		Ok(val) => val
			.parse()
			.map(Some)
			.map_err(|e: <T as FromStr>::Err| anyhow::anyhow!("invalid env var {name}={val} ({})", e.to_string())),
		Err(_) => Ok(None),
	}
}
