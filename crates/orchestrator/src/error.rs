use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

/// The structured error kind carried both in `Operation.result.error` and as
/// the body of non-2xx HTTP responses. Each variant maps to a fixed HTTP
/// status; backend-originated errors that already carry their own status
/// are adopted verbatim via [`Error::Backend`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
	#[error("{0}")]
	BadRequest(String),
	#[error("{0}")]
	Unauthenticated(String),
	#[error("{0}")]
	NotFound(String),
	#[error("{0}")]
	MethodNotAllowed(String),
	#[error("{0}")]
	Internal(String),
	#[error("{0}")]
	ServiceUnavailable(String),
	/// A backend (compute API or host orchestrator) returned its own HTTP
	/// status and message; both are preserved unchanged.
	#[error("{message}")]
	Backend { code: u16, message: String },
}

impl Error {
	pub fn internal(err: impl std::fmt::Display) -> Self {
		Error::Internal(err.to_string())
	}

	pub fn code(&self) -> u16 {
		match self {
			Error::BadRequest(_) => 400,
			Error::Unauthenticated(_) => 401,
			Error::NotFound(_) => 404,
			Error::MethodNotAllowed(_) => 405,
			Error::Internal(_) => 500,
			Error::ServiceUnavailable(_) => 503,
			Error::Backend { code, .. } => *code,
		}
	}

	pub fn message(&self) -> String {
		match self {
			Error::Backend { message, .. } => message.clone(),
			other => other.to_string(),
		}
	}

	fn status(&self) -> StatusCode {
		StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
	}
}

#[derive(Serialize)]
struct ErrorBody {
	code: u16,
	error: String,
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		tracing::error!(code = self.code(), message = %self.message(), "request failed");
		let status = self.status();
		let body = ErrorBody {
			code: self.code(),
			error: self.message(),
		};
		(status, Json(body)).into_response()
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		Error::internal(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::internal(err)
	}
}
