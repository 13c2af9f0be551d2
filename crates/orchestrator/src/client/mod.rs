//! Host Client (`spec.md` §4.2): a typed HTTP client plus a reverse-proxy
//! factory for one host's internal URL. Grounded in the teacher's
//! `client::Client`/transport-sharing discipline (`src/client/mod.rs`,
//! `DESIGN NOTES` §9): a dedicated transport is built fresh when opting into
//! self-signed TLS rather than cloned from a shared default, because the
//! default transport carries an internal connection-pool mutex whose
//! duplication is undefined.

mod proxy;

pub use proxy::ReverseProxy;

use reqwest::Client as HttpClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::types::ErrorBody;

#[derive(Clone)]
pub struct HostClient {
	base_url: Url,
	http: HttpClient,
}

impl HostClient {
	/// Builds a client trusting the ambient certificate store.
	pub fn new(base_url: Url) -> Result<Self, Error> {
		let http = HttpClient::builder()
			.build()
			.map_err(|e| Error::internal(format!("building host client: {e}")))?;
		Ok(HostClient { base_url, http })
	}

	/// Builds a client that accepts the host's self-signed certificate. A
	/// fresh [`reqwest::Client`] (and thus a fresh underlying transport) is
	/// constructed per call site rather than mutating a shared one, per
	/// `spec.md` §4.2/§9.
	pub fn new_self_signed(base_url: Url) -> Result<Self, Error> {
		let http = HttpClient::builder()
			.danger_accept_invalid_certs(true)
			.build()
			.map_err(|e| Error::internal(format!("building host client: {e}")))?;
		Ok(HostClient { base_url, http })
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, Error> {
		let url = self.join(path)?;
		let resp = self
			.http
			.get(url)
			.query(query)
			.send()
			.await
			.map_err(|e| Error::internal(format!("GET {path} failed: {e}")))?;
		decode(resp).await
	}

	pub async fn post<B: Serialize, T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[(&str, &str)],
		body: &B,
	) -> Result<T, Error> {
		let url = self.join(path)?;
		let resp = self
			.http
			.post(url)
			.query(query)
			.json(body)
			.send()
			.await
			.map_err(|e| Error::internal(format!("POST {path} failed: {e}")))?;
		decode(resp).await
	}

	/// Like [`HostClient::post`] but discards the response body, for calls
	/// whose caller passed no `out`.
	pub async fn post_discard<B: Serialize>(&self, path: &str, query: &[(&str, &str)], body: &B) -> Result<(), Error> {
		let url = self.join(path)?;
		let resp = self
			.http
			.post(url)
			.query(query)
			.json(body)
			.send()
			.await
			.map_err(|e| Error::internal(format!("POST {path} failed: {e}")))?;
		if resp.status().is_success() {
			Ok(())
		} else {
			Err(backend_error(resp).await)
		}
	}

	pub fn reverse_proxy(&self) -> ReverseProxy {
		ReverseProxy::new(self.http.clone(), self.base_url.clone())
	}

	fn join(&self, path: &str) -> Result<Url, Error> {
		self
			.base_url
			.join(path.trim_start_matches('/'))
			.map_err(|e| Error::internal(format!("invalid path {path}: {e}")))
	}
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
	if resp.status().is_success() {
		resp
			.json::<T>()
			.await
			.map_err(|e| Error::internal(format!("decoding host response: {e}")))
	} else {
		Err(backend_error(resp).await)
	}
}

/// Adopts a non-2xx host response verbatim: status code and message are
/// preserved so the client sees the host's original error (`spec.md` §7).
async fn backend_error(resp: reqwest::Response) -> Error {
	let status = resp.status().as_u16();
	let body = resp.bytes().await.unwrap_or_default();
	let message = serde_json::from_slice::<ErrorBody>(&body)
		.map(|e| e.message)
		.unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string());
	Error::Backend { code: status, message }
}
