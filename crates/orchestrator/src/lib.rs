//! `cloudorch`: the Cloud Orchestrator control plane. See each module for
//! the component it implements; `http::router` assembles all of them into
//! one `axum::Router`.

pub mod account;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod instance;
pub mod management;
pub mod operation;
pub mod secrets;
pub mod signaling;
pub mod types;

use std::sync::Arc;

use crate::account::AccountManager;
use crate::config::Config;
use crate::http::AppState;
use crate::instance::InstanceManager;

/// Builds the full application state from a loaded [`Config`]. Split out of
/// `cloudorch-cli` so integration tests can construct the same wiring the
/// binary does without going through `main`.
pub fn build_app_state(config: &Config) -> AppState {
	let instance_manager = InstanceManager::new(&config.instance_manager);
	let account_manager = Arc::new(AccountManager::new(&config.account_manager));
	AppState {
		instance_manager,
		account_manager,
		operations: config.operations.clone(),
		webrtc: config.webrtc.clone(),
		device_files_dir: config.device_files_dir.clone(),
	}
}
