use headers::{Cookie, Header};
use http::request::Parts;

use super::http_basic;
use crate::error::Error;
use crate::types::User;

const COOKIE_NAME: &str = "accountUsername";

pub fn user_from_request(parts: &Parts) -> Result<Option<User>, Error> {
	if let Some(username) = cookie_username(parts)? {
		return Ok(Some(User {
			username,
			email: String::new(),
		}));
	}
	http_basic::user_from_request(parts)
}

fn cookie_username(parts: &Parts) -> Result<Option<String>, Error> {
	let values = parts.headers.get_all(http::header::COOKIE);
	let cookie = match Cookie::decode(&mut values.iter()) {
		Ok(cookie) => cookie,
		Err(_) => return Ok(None),
	};
	Ok(cookie.get(COOKIE_NAME).filter(|v| !v.is_empty()).map(str::to_string))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cookie_wins_over_basic_auth() {
		let req = http::Request::builder()
			.uri("/")
			.header(http::header::COOKIE, "accountUsername=janedoe")
			.body(())
			.unwrap();
		let user = user_from_request(&req.into_parts().0).unwrap().unwrap();
		assert_eq!(user.username, "janedoe");
	}

	#[test]
	fn falls_back_to_basic_auth() {
		use base64::Engine;
		let creds = base64::engine::general_purpose::STANDARD.encode("johndoe:pw");
		let req = http::Request::builder()
			.uri("/")
			.header(http::header::AUTHORIZATION, format!("Basic {creds}"))
			.body(())
			.unwrap();
		let user = user_from_request(&req.into_parts().0).unwrap().unwrap();
		assert_eq!(user.username, "johndoe");
	}

	#[test]
	fn neither_present_is_unauthenticated() {
		let req = http::Request::builder().uri("/").body(()).unwrap();
		assert!(user_from_request(&req.into_parts().0).unwrap().is_none());
	}
}
