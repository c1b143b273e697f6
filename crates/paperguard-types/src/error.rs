//! Service error taxonomy
//!
//! Infrastructure errors stay inside the service and are surfaced through
//! logging; only policy decisions cross the public API boundary. The
//! variants here cover the internal taxonomy: backend outages, corrupted
//! state, configuration problems and plain lookup failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Requested entity (policy, key, ...) does not exist
	NotFound,
	/// Caller is not allowed to perform the operation
	PermissionDenied,
	/// Invalid input from the caller
	ValidationError(String),
	/// Invalid static configuration; fatal at startup
	ConfigError(String),
	/// Shared store or other backend is unreachable
	ServiceUnavailable(String),
	/// Stored blob or wire payload failed to decode
	Parse(String),
	/// Internal invariant violation
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Parse(err.to_string())
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "Not found"),
			Error::PermissionDenied => write!(f, "Permission denied"),
			Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
			Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
			Error::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
			Error::Parse(msg) => write!(f, "Parse error: {}", msg),
			Error::Internal(msg) => write!(f, "Internal error: {}", msg),
			Error::Io(err) => write!(f, "I/O error: {}", err),
		}
	}
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let (status, code, message) = match &self {
			Error::NotFound => (StatusCode::NOT_FOUND, "E-NOT-FOUND", "Not found".to_string()),
			Error::PermissionDenied => {
				(StatusCode::FORBIDDEN, "E-PERMISSION", "Permission denied".to_string())
			}
			Error::ValidationError(msg) => (StatusCode::BAD_REQUEST, "E-VALIDATION", msg.clone()),
			Error::ServiceUnavailable(_) => (
				StatusCode::SERVICE_UNAVAILABLE,
				"E-UNAVAILABLE",
				"Service temporarily unavailable".to_string(),
			),
			_ => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-INTERNAL",
				"Internal server error".to_string(),
			),
		};

		if status.is_server_error() {
			tracing::warn!(error = %self, "request failed");
		}

		let body = serde_json::json!({
			"error": {
				"code": code,
				"message": message
			}
		});
		(status, Json(body)).into_response()
	}
}

// vim: ts=4
