//! Operation Engine (`spec.md` §4.4): translates the compute backend's
//! native long-running operation shape into the public [`Operation`].
//! Grounded in the teacher's result-projection idiom (`llm/universal.rs`
//! translates one provider's wire shape into a canonical one) and its
//! `once_cell::sync::Lazy<Regex>` convention for URL parsing
//! (`client/dns.rs`, `http/authorization.rs`).

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::Error;
use crate::types::Operation;

/// `^https?://.+/compute/v1/projects/([^/]+)/zones/([^/]+)/instances/([^/]+)$`
static INSTANCE_URL_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^https?://.+/compute/v1/projects/([^/]+)/zones/([^/]+)/instances/([^/]+)$").unwrap());

/// The shape the native backend operation takes on the wire. Not all fields
/// are present on every backend; it is intentionally permissive.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeOperation {
	pub name: String,
	pub status: String,
	#[serde(default)]
	pub operation_type: Option<String>,
	#[serde(default)]
	pub target_link: Option<String>,
	#[serde(default)]
	pub http_error_status_code: Option<u16>,
	#[serde(default)]
	pub error: Option<NativeOperationError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeOperationError {
	#[serde(default)]
	pub errors: Vec<NativeOperationErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeOperationErrorDetail {
	pub message: String,
}

impl NativeOperation {
	fn is_done(&self) -> bool {
		self.status == "DONE"
	}

	fn error_message(&self) -> Option<String> {
		self
			.error
			.as_ref()
			.and_then(|e| e.errors.first())
			.map(|e| e.message.clone())
	}
}

/// The instance identity parsed out of a `targetLink`, per the canonical
/// pattern in `spec.md` §4.4.
pub struct TargetInstance {
	pub project: String,
	pub zone: String,
	pub name: String,
}

pub fn parse_instance_url(target_link: &str) -> Option<TargetInstance> {
	let caps = INSTANCE_URL_RE.captures(target_link)?;
	Some(TargetInstance {
		project: caps[1].to_string(),
		zone: caps[2].to_string(),
		name: caps[3].to_string(),
	})
}

/// Fetches the resolved instance as a JSON value for an `insert` operation's
/// `result.response`. Implemented by the backend, since only it knows how to
/// reach the compute API.
#[async_trait::async_trait]
pub trait InstanceFetcher: Send + Sync {
	async fn fetch_instance(&self, target: &TargetInstance) -> Result<serde_json::Value, Error>;
}

/// Applies the five translation rules in `spec.md` §4.4.
pub async fn translate(native: NativeOperation, fetcher: &dyn InstanceFetcher) -> Result<Operation, Error> {
	if !native.is_done() {
		return Ok(Operation::pending(native.name));
	}

	if let Some(message) = native.error_message() {
		let code = native.http_error_status_code.unwrap_or(500);
		return Ok(Operation::done_err(native.name, code, message));
	}

	let op_type = native.operation_type.as_deref().unwrap_or_default();
	let target_link = native.target_link.as_deref();

	match (op_type, target_link.and_then(parse_instance_url)) {
		("insert", Some(target)) => {
			let instance = fetcher.fetch_instance(&target).await?;
			Ok(Operation::done_ok(native.name, instance))
		},
		("delete", Some(_)) => Ok(Operation::done_ok(native.name, serde_json::json!({}))),
		_ => Err(Error::NotFound("operation result not found".into())),
	}
}

/// Polling primitive used by `WaitOperation`. `poll` is called repeatedly
/// until it reports a terminal native operation or `max_wait` elapses; on
/// elapsing the engine surfaces `ServiceUnavailable` so the client can
/// retry, per `spec.md` §4.4. `poll_interval` is slept between a non-terminal
/// poll and the next one, so a backend whose `poll` returns immediately
/// (a plain `GET` rather than a blocking long-poll) doesn't hammer it.
pub async fn wait<F, Fut>(max_wait: Duration, poll_interval: Duration, mut poll: F) -> Result<NativeOperation, Error>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<NativeOperation, Error>>,
{
	let deadline = tokio::time::Instant::now() + max_wait;
	loop {
		let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
		if remaining.is_zero() {
			return Err(Error::ServiceUnavailable("Wait for operation timed out".into()));
		}
		let native = tokio::time::timeout(remaining, poll())
			.await
			.map_err(|_| Error::ServiceUnavailable("Wait for operation timed out".into()))??;
		if native.is_done() {
			return Ok(native);
		}
		let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
		if remaining.is_zero() {
			return Err(Error::ServiceUnavailable("Wait for operation timed out".into()));
		}
		tokio::time::sleep(poll_interval.min(remaining)).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct StubFetcher;

	#[async_trait::async_trait]
	impl InstanceFetcher for StubFetcher {
		async fn fetch_instance(&self, target: &TargetInstance) -> Result<serde_json::Value, Error> {
			Ok(serde_json::json!({"name": target.name}))
		}
	}

	fn native(status: &str) -> NativeOperation {
		NativeOperation {
			name: "op-1".into(),
			status: status.into(),
			operation_type: None,
			target_link: None,
			http_error_status_code: None,
			error: None,
		}
	}

	#[tokio::test]
	async fn not_done_yields_pending() {
		let op = translate(native("RUNNING"), &StubFetcher).await.unwrap();
		assert!(!op.done);
		assert!(op.result.is_none());
	}

	#[tokio::test]
	async fn done_with_error_yields_error_result() {
		let mut n = native("DONE");
		n.http_error_status_code = Some(412);
		n.error = Some(NativeOperationError {
			errors: vec![NativeOperationErrorDetail {
				message: "quota exceeded".into(),
			}],
		});
		let op = translate(n, &StubFetcher).await.unwrap();
		assert!(op.done);
		match op.result.unwrap() {
			crate::types::OperationResult::Error(e) => {
				assert_eq!(e.code, 412);
				assert_eq!(e.message, "quota exceeded");
			},
			_ => panic!("expected error result"),
		}
	}

	#[tokio::test]
	async fn done_insert_fetches_instance() {
		let mut n = native("DONE");
		n.operation_type = Some("insert".into());
		n.target_link = Some("https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/cf-abc".into());
		let op = translate(n, &StubFetcher).await.unwrap();
		assert!(op.done);
		match op.result.unwrap() {
			crate::types::OperationResult::Response(v) => assert_eq!(v, serde_json::json!({"name": "cf-abc"})),
			_ => panic!("expected response result"),
		}
	}

	#[tokio::test]
	async fn done_delete_yields_empty_object() {
		let mut n = native("DONE");
		n.operation_type = Some("delete".into());
		n.target_link = Some("https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/cf-abc".into());
		let op = translate(n, &StubFetcher).await.unwrap();
		match op.result.unwrap() {
			crate::types::OperationResult::Response(v) => assert_eq!(v, serde_json::json!({})),
			_ => panic!("expected response result"),
		}
	}

	#[tokio::test]
	async fn unrecognized_operation_is_not_found() {
		let mut n = native("DONE");
		n.operation_type = Some("insert".into());
		n.target_link = Some("https://compute.googleapis.com/not/a/match".into());
		let err = translate(n, &StubFetcher).await.unwrap_err();
		assert_eq!(err.code(), 404);
	}

	#[tokio::test]
	async fn wait_times_out_as_service_unavailable() {
		let err = wait(Duration::from_millis(50), Duration::from_millis(10), || async {
			Ok(native("RUNNING"))
		})
		.await
		.unwrap_err();
		assert_eq!(err.code(), 503);
	}

	#[tokio::test]
	async fn wait_returns_once_done() {
		let mut calls = 0;
		let native_done = wait(Duration::from_secs(5), Duration::from_millis(1), || {
			calls += 1;
			let status = if calls < 3 { "RUNNING" } else { "DONE" };
			async move { Ok(native(status)) }
		})
		.await
		.unwrap();
		assert!(native_done.is_done());
	}

	#[tokio::test]
	async fn wait_sleeps_poll_interval_between_non_terminal_polls() {
		let start = tokio::time::Instant::now();
		let mut calls = 0;
		wait(Duration::from_secs(5), Duration::from_millis(30), || {
			calls += 1;
			let status = if calls < 3 { "RUNNING" } else { "DONE" };
			async move { Ok(native(status)) }
		})
		.await
		.unwrap();
		assert!(start.elapsed() >= Duration::from_millis(60));
	}

	#[test]
	fn parses_canonical_instance_url() {
		let target =
			parse_instance_url("https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/cf-abc").unwrap();
		assert_eq!(target.project, "p");
		assert_eq!(target.zone, "z");
		assert_eq!(target.name, "cf-abc");
	}

	#[test]
	fn rejects_non_instance_url() {
		assert!(parse_instance_url("https://compute.googleapis.com/compute/v1/projects/p/zones/z/disks/d").is_none());
	}
}
