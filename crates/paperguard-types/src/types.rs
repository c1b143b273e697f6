//! Core value types shared across the workspace

use serde::{Deserialize, Serialize};

/// Millisecond-precision Unix timestamp.
///
/// All window arithmetic in the service is done in milliseconds, so the
/// canonical timestamp type carries millis rather than seconds.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Self {
		Self(chrono::Utc::now().timestamp_millis())
	}

	pub fn add_millis(self, millis: i64) -> Self {
		Self(self.0 + millis)
	}

	pub fn add_seconds(self, seconds: i64) -> Self {
		Self(self.0 + seconds * 1000)
	}

	/// Milliseconds elapsed since `earlier`. Negative if `earlier` is in the future.
	pub fn millis_since(self, earlier: Timestamp) -> i64 {
		self.0 - earlier.0
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Standard API response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
	pub data: T,
}

impl<T> ApiResponse<T> {
	pub fn new(data: T) -> Self {
		Self { data }
	}
}


// vim: ts=4
