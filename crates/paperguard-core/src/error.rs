//! Admission Error Types
//!
//! The structured reasons a rejected caller receives. Infrastructure
//! failures never reach this type; only genuine policy decisions cross the
//! public API boundary.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::prelude::*;

/// Why a request was rejected.
#[derive(Debug)]
pub enum RateLimitError {
	/// The window ceiling was exceeded
	RateLimited {
		/// Request ceiling of the policy
		limit: u32,
		/// Remaining requests in this window
		remaining: u32,
		/// Start of the next window
		reset_at: Timestamp,
	},
	/// A verified challenge token is required before admission
	CaptchaRequired,
	/// The caller is blocked by a matched abuse pattern
	Blocked {
		/// Remaining block duration, where known
		retry_after: Option<Duration>,
	},
}

impl std::fmt::Display for RateLimitError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			RateLimitError::RateLimited { limit, reset_at, .. } => {
				write!(f, "Rate limited ({} per window), resets at {}", limit, reset_at)
			}
			RateLimitError::CaptchaRequired => {
				write!(f, "Challenge verification required")
			}
			RateLimitError::Blocked { retry_after } => {
				if let Some(dur) = retry_after {
					write!(f, "Blocked for {:?}", dur)
				} else {
					write!(f, "Blocked")
				}
			}
		}
	}
}

impl std::error::Error for RateLimitError {}

impl IntoResponse for RateLimitError {
	fn into_response(self) -> Response {
		match self {
			RateLimitError::RateLimited { limit, remaining, reset_at } => {
				let now = Timestamp::now();
				let retry_secs = (reset_at.millis_since(now).max(0) + 999) / 1000;
				let body = serde_json::json!({
					"error": {
						"code": "E-RATE-LIMITED",
						"message": "Too many requests. Please slow down.",
						"details": {
							"limit": limit,
							"remaining": remaining,
							"resetAt": reset_at.0
						}
					}
				});

				let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

				// Standard rate limit headers
				if let Ok(val) = retry_secs.to_string().parse() {
					response.headers_mut().insert("Retry-After", val);
				}
				if let Ok(val) = limit.to_string().parse() {
					response.headers_mut().insert("X-RateLimit-Limit", val);
				}
				if let Ok(val) = remaining.to_string().parse() {
					response.headers_mut().insert("X-RateLimit-Remaining", val);
				}
				if let Ok(val) = reset_at.0.to_string().parse() {
					response.headers_mut().insert("X-RateLimit-Reset", val);
				}

				response
			}
			RateLimitError::CaptchaRequired => {
				let body = serde_json::json!({
					"error": {
						"code": "E-RATE-CAPTCHA",
						"message": "Challenge verification required before this request can proceed"
					}
				});
				// HTTP 428 Precondition Required
				(StatusCode::PRECONDITION_REQUIRED, Json(body)).into_response()
			}
			RateLimitError::Blocked { retry_after } => {
				let body = serde_json::json!({
					"error": {
						"code": "E-RATE-BLOCKED",
						"message": "Access temporarily blocked due to abusive request patterns.",
						"details": {
							"retryAfterSecs": retry_after.map(|d| d.as_secs())
						}
					}
				});
				let mut response = (StatusCode::FORBIDDEN, Json(body)).into_response();
				if let Some(dur) = retry_after {
					if let Ok(val) = dur.as_secs().to_string().parse() {
						response.headers_mut().insert("Retry-After", val);
					}
				}
				response
			}
		}
	}
}

// vim: ts=4
