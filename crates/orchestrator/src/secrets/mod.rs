//! Secret providers (`spec.md` §4.7). The Controller never reads these
//! directly — only the account manager does, and only lazily, on the OAuth
//! code path.

use secrecy::SecretString;
use std::env;

use crate::config::SecretsConfig;
use crate::error::Error;

pub trait SecretProvider: Send + Sync {
	fn oauth2_client_id(&self) -> Result<SecretString, Error>;
	fn oauth2_client_secret(&self) -> Result<SecretString, Error>;
}

pub fn build(config: &SecretsConfig) -> Box<dyn SecretProvider> {
	match config {
		SecretsConfig::File {
			oauth2_client_id_path,
			oauth2_client_secret_path,
		} => Box::new(FileSecretProvider {
			client_id_path: oauth2_client_id_path.clone(),
			client_secret_path: oauth2_client_secret_path.clone(),
		}),
		SecretsConfig::Env => Box::new(EnvSecretProvider),
	}
}

struct FileSecretProvider {
	client_id_path: std::path::PathBuf,
	client_secret_path: std::path::PathBuf,
}

impl SecretProvider for FileSecretProvider {
	fn oauth2_client_id(&self) -> Result<SecretString, Error> {
		read_secret_file(&self.client_id_path)
	}

	fn oauth2_client_secret(&self) -> Result<SecretString, Error> {
		read_secret_file(&self.client_secret_path)
	}
}

fn read_secret_file(path: &std::path::Path) -> Result<SecretString, Error> {
	std::fs::read_to_string(path)
		.map(|s| SecretString::from(s.trim().to_string()))
		.map_err(|e| Error::internal(format!("reading secret {}: {e}", path.display())))
}

/// Stands in for a cloud secret manager integration: reads from the
/// process environment instead of calling out to a real service.
struct EnvSecretProvider;

impl SecretProvider for EnvSecretProvider {
	fn oauth2_client_id(&self) -> Result<SecretString, Error> {
		read_secret_env("OAUTH2_CLIENT_ID")
	}

	fn oauth2_client_secret(&self) -> Result<SecretString, Error> {
		read_secret_env("OAUTH2_CLIENT_SECRET")
	}
}

fn read_secret_env(name: &str) -> Result<SecretString, Error> {
	env::var(name)
		.map(SecretString::from)
		.map_err(|_| Error::internal(format!("{name} is not set")))
}
