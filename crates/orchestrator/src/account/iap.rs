use http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::Error;
use crate::types::User;

const IAP_HEADER: &str = "x-goog-iap-jwt-assertion";

/// Supplies the public key Google signs IAP assertions with, keyed by JWT
/// `kid`. Fetching the real keys (from Google's JWK endpoint) is outside the
/// core's scope per `SPEC_FULL.md` §4.1; production deployments plug in a
/// real implementation, tests use a fixed key pair.
pub trait IapKeyProvider: Send + Sync {
	fn key_for(&self, kid: &str) -> Option<DecodingKey>;
}

/// Default when no keys are configured: every assertion is rejected.
pub struct NoKeys;

impl IapKeyProvider for NoKeys {
	fn key_for(&self, _kid: &str) -> Option<DecodingKey> {
		None
	}
}

#[derive(Debug, Deserialize)]
struct IapClaims {
	email: String,
	#[allow(dead_code)]
	sub: String,
}

pub fn user_from_request(
	parts: &Parts,
	audience: &str,
	keys: &dyn IapKeyProvider,
) -> Result<Option<User>, Error> {
	let Some(value) = parts.headers.get(IAP_HEADER) else {
		return Ok(None);
	};
	let token = value
		.to_str()
		.map_err(|e| Error::BadRequest(format!("invalid {IAP_HEADER} header: {e}")))?;

	let header = jsonwebtoken::decode_header(token)
		.map_err(|e| Error::Unauthenticated(format!("malformed IAP assertion: {e}")))?;
	let kid = header
		.kid
		.ok_or_else(|| Error::Unauthenticated("IAP assertion missing kid".into()))?;
	let key = keys
		.key_for(&kid)
		.ok_or_else(|| Error::Unauthenticated("unknown IAP signing key".into()))?;

	let mut validation = Validation::new(Algorithm::ES256);
	validation.set_audience(&[audience]);
	let data = jsonwebtoken::decode::<IapClaims>(token, &key, &validation)
		.map_err(|e| Error::Unauthenticated(format!("invalid IAP assertion: {e}")))?;

	let username = data
		.claims
		.email
		.split('@')
		.next()
		.unwrap_or(&data.claims.email)
		.to_string();
	Ok(Some(User {
		username,
		email: data.claims.email,
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use jsonwebtoken::{EncodingKey, Header, encode};
	use std::collections::HashMap;

	struct StaticKeys(HashMap<String, DecodingKey>);

	impl IapKeyProvider for StaticKeys {
		fn key_for(&self, kid: &str) -> Option<DecodingKey> {
			self.0.get(kid).cloned()
		}
	}

	fn es256_keypair() -> (EncodingKey, DecodingKey) {
		// A fixed P-256 test key pair (not used anywhere else).
		const PKCS8: &str = include_str!("../../testdata/iap_test_key.pem");
		let encoding = EncodingKey::from_ec_pem(PKCS8.as_bytes()).unwrap();
		const PUB: &str = include_str!("../../testdata/iap_test_key.pub.pem");
		let decoding = DecodingKey::from_ec_pem(PUB.as_bytes()).unwrap();
		(encoding, decoding)
	}

	#[test]
	fn valid_token_with_known_key_authenticates() {
		let (enc, dec) = es256_keypair();
		let mut header = Header::new(Algorithm::ES256);
		header.kid = Some("test-kid".to_string());
		let claims = serde_json::json!({
			"email": "jane@example.com",
			"sub": "12345",
			"aud": "my-audience",
			"exp": 9999999999u64,
		});
		let token = encode(&header, &claims, &enc).unwrap();

		let mut keys = HashMap::new();
		keys.insert("test-kid".to_string(), dec);
		let provider = StaticKeys(keys);

		let req = http::Request::builder()
			.uri("/")
			.header(IAP_HEADER, token)
			.body(())
			.unwrap();
		let user = user_from_request(&req.into_parts().0, "my-audience", &provider)
			.unwrap()
			.unwrap();
		assert_eq!(user.username, "jane");
		assert_eq!(user.email, "jane@example.com");
	}

	#[test]
	fn wrong_audience_is_rejected() {
		let (enc, dec) = es256_keypair();
		let mut header = Header::new(Algorithm::ES256);
		header.kid = Some("test-kid".to_string());
		let claims = serde_json::json!({
			"email": "jane@example.com",
			"sub": "12345",
			"aud": "someone-else",
			"exp": 9999999999u64,
		});
		let token = encode(&header, &claims, &enc).unwrap();

		let mut keys = HashMap::new();
		keys.insert("test-kid".to_string(), dec);
		let provider = StaticKeys(keys);

		let req = http::Request::builder()
			.uri("/")
			.header(IAP_HEADER, token)
			.body(())
			.unwrap();
		assert!(user_from_request(&req.into_parts().0, "my-audience", &provider).is_err());
	}

	#[test]
	fn missing_header_is_unauthenticated() {
		let req = http::Request::builder().uri("/").body(()).unwrap();
		assert!(user_from_request(&req.into_parts().0, "aud", &NoKeys).unwrap().is_none());
	}
}
