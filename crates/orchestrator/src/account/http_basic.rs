use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::request::Parts;
use http::header::AUTHORIZATION;

use crate::error::Error;
use crate::types::User;

pub fn user_from_request(parts: &Parts) -> Result<Option<User>, Error> {
	let Some(value) = parts.headers.get(AUTHORIZATION) else {
		return Ok(None);
	};
	let value = value
		.to_str()
		.map_err(|e| Error::BadRequest(format!("invalid Authorization header: {e}")))?;
	let Some(encoded) = value.strip_prefix("Basic ") else {
		return Ok(None);
	};
	let decoded = STANDARD
		.decode(encoded.trim())
		.map_err(|e| Error::BadRequest(format!("invalid basic auth encoding: {e}")))?;
	let decoded = String::from_utf8(decoded)
		.map_err(|e| Error::BadRequest(format!("invalid basic auth utf8: {e}")))?;
	let Some((username, _password)) = decoded.split_once(':') else {
		return Ok(None);
	};
	if username.is_empty() {
		return Ok(None);
	}
	Ok(Some(User {
		username: username.to_string(),
		email: String::new(),
	}))
}
