//! The reverse-proxy half of the Host Client. Bodies stream end to end in
//! both directions — neither the request nor the response is buffered in
//! full, per `spec.md` §4.6 "the forwarder never buffers full bodies".

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::response::Response;
use futures::TryStreamExt;
use http::header::{CONTENT_LENGTH, HOST};
use http::{HeaderMap, StatusCode};
use reqwest::Client as HttpClient;
use url::Url;

use crate::error::Error;

#[derive(Clone)]
pub struct ReverseProxy {
	http: HttpClient,
	base_url: Url,
}

impl ReverseProxy {
	pub fn new(http: HttpClient, base_url: Url) -> Self {
		ReverseProxy { http, base_url }
	}

	/// Forwards `req` to `rest_path_and_query` on the host, streaming both
	/// the request and response bodies. Headers other than `Host` and
	/// `Content-Length` pass through unchanged in both directions.
	pub async fn forward(&self, rest_path_and_query: &str, req: Request) -> Result<Response, Error> {
		let target = self
			.base_url
			.join(rest_path_and_query.trim_start_matches('/'))
			.map_err(|e| Error::internal(format!("invalid forward target {rest_path_and_query}: {e}")))?;

		let (parts, body) = req.into_parts();
		let method = to_reqwest_method(&parts.method)?;
		let body_stream = body.into_data_stream();
		let out_body = reqwest::Body::wrap_stream(body_stream.map_err(std::io::Error::other));

		let mut builder = self.http.request(method, target).body(out_body);
		for (name, value) in parts.headers.iter() {
			if name == HOST || name == CONTENT_LENGTH {
				continue;
			}
			builder = builder.header(name, value);
		}

		let resp = builder
			.send()
			.await
			.map_err(|e| Error::internal(format!("forwarding to host failed: {e}")))?;

		let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
		let mut headers = HeaderMap::new();
		for (name, value) in resp.headers().iter() {
			if name == CONTENT_LENGTH {
				continue;
			}
			headers.insert(name.clone(), value.clone());
		}
		let body = Body::from_stream(resp.bytes_stream().map_ok(Bytes::from));

		let mut response = Response::new(body);
		*response.status_mut() = status;
		*response.headers_mut() = headers;
		Ok(response)
	}
}

fn to_reqwest_method(method: &http::Method) -> Result<reqwest::Method, Error> {
	reqwest::Method::from_bytes(method.as_str().as_bytes())
		.map_err(|e| Error::BadRequest(format!("unsupported method {method}: {e}")))
}
