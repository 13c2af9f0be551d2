use http::request::Parts;

use crate::error::Error;
use crate::types::User;

/// Trusts a header injected by a front-end proxy (App Engine's identity-aware
/// front end historically set `X-Appengine-User-Email`). The orchestrator
/// never validates the header's provenance — that trust boundary is the
/// deployment's responsibility, same as the source system.
pub fn user_from_request(parts: &Parts, header: &str) -> Result<Option<User>, Error> {
	let Some(value) = parts.headers.get(header) else {
		return Ok(None);
	};
	let email = value
		.to_str()
		.map_err(|e| Error::BadRequest(format!("invalid {header} header: {e}")))?
		.to_string();
	if email.is_empty() {
		return Ok(None);
	}
	let username = email.split('@').next().unwrap_or(&email).to_string();
	Ok(Some(User { username, email }))
}
