use http::request::Parts;

use crate::error::Error;
use crate::types::User;

pub fn user_from_request(parts: &Parts) -> Result<Option<User>, Error> {
	let Some(query) = parts.uri.query() else {
		return Ok(None);
	};
	let username = url::form_urlencoded::parse(query.as_bytes())
		.find_map(|(k, v)| (k == "user").then(|| v.into_owned()));
	match username {
		Some(username) if !username.is_empty() => Ok(Some(User {
			username,
			email: String::new(),
		})),
		_ => Ok(None),
	}
}
